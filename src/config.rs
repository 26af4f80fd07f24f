/// Immutable proxy settings, supplied once at startup and shared by every
/// debug session.
#[derive(Debug, Clone)]
pub struct Config {
    /// Flow application context (e.g. `Development`). Compiled proxy classes
    /// live in a per-context temporary directory, so the context is part of
    /// every cache path this proxy computes.
    pub context: String,
    /// Framework convention used for path mapping (`flow` or `dummy`).
    pub framework: String,
    /// Log every mapping registration.
    pub verbose: bool,
    /// Additionally log reverse-mapping recoveries read from disk.
    pub very_verbose: bool,
}

impl Config {
    /// Mapping registrations are logged at either verbosity level; the
    /// higher level only adds the reverse recoveries on top.
    pub fn log_mappings(&self) -> bool {
        self.verbose || self.very_verbose
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            context: "Development".to_string(),
            framework: "flow".to_string(),
            verbose: false,
            very_verbose: false,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_log_mappings_at_any_verbosity() {
        let quiet = Config::default();
        assert!(!quiet.log_mappings());

        let verbose = Config {
            verbose: true,
            ..Config::default()
        };
        assert!(verbose.log_mappings());

        // The higher verbosity level alone must not silence the base
        // mapping diagnostics.
        let very_verbose = Config {
            very_verbose: true,
            ..Config::default()
        };
        assert!(very_verbose.log_mappings());
    }
}
