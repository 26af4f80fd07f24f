pub mod dummy;
pub mod flow;

use crate::config::Config;
use crate::pathmapping::PathMapping;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("read compiled class file `{path}`: {source}")]
    CacheRead {
        path: String,
        source: std::io::Error,
    },
    #[error("malformed message framing: {0}")]
    Framing(&'static str),
    #[error("message length field is not a number: {0}")]
    LengthField(#[from] std::num::ParseIntError),
    #[error("message is not valid utf-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
}

impl Error {
    /// Return a hint to the session loop - forward the message unmodified or
    /// drop the whole session.
    pub fn is_fatal(&self) -> bool {
        match self {
            // An unreadable compiled class means the cache layout assumption
            // is broken for this debuggee; later rewrites cannot be trusted.
            Error::CacheRead { .. } => true,
            Error::Framing(_) => false,
            Error::LengthField(_) => false,
            Error::Utf8(_) => false,
        }
    }
}

/// Bidirectional message rewriter for one framework convention.
///
/// Outbound is IDE -> debug engine traffic (text commands), inbound is
/// engine -> IDE traffic (length-prefixed XML responses). Both directions
/// share one [`PathMapping`] store, populated by whichever direction sees a
/// path first.
pub trait PathMapper: Send + Sync {
    /// Rewrite a command message so the engine receives compiled proxy-class
    /// paths. Paths outside the framework convention pass through unchanged.
    fn apply_to_outbound(&self, message: &[u8]) -> Vec<u8>;

    /// Rewrite a response message so the IDE receives original source paths,
    /// and repair the declared message length afterwards.
    fn apply_to_inbound(&self, message: &[u8]) -> Result<Vec<u8>, Error>;
}

type MapperFactory = fn(Config, Arc<PathMapping>) -> Box<dyn PathMapper>;

/// Registry of available path mappers, keyed by framework name.
///
/// Built once at startup and handed to the connection layer; a new framework
/// convention is added by implementing [`PathMapper`] and registering a
/// factory under a new name.
pub struct MapperRegistry {
    factories: HashMap<&'static str, MapperFactory>,
}

impl MapperRegistry {
    pub fn new() -> Self {
        MapperRegistry {
            factories: HashMap::new(),
        }
    }

    /// Registry with all built-in mappers.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("flow", |config, mapping| {
            Box::new(flow::FlowPathMapper::new(config, mapping))
        });
        registry.register("dummy", |_, _| Box::new(dummy::DummyPathMapper));
        registry
    }

    pub fn register(&mut self, framework: &'static str, factory: MapperFactory) {
        self.factories.insert(framework, factory);
    }

    pub fn contains(&self, framework: &str) -> bool {
        self.factories.contains_key(framework)
    }

    /// Instantiate a mapper for `framework`, or `None` if no convention is
    /// registered under that name.
    pub fn create(
        &self,
        framework: &str,
        config: Config,
        mapping: Arc<PathMapping>,
    ) -> Option<Box<dyn PathMapper>> {
        self.factories.get(framework).map(|f| f(config, mapping))
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.factories.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl Default for MapperRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_registry_defaults() {
        let registry = MapperRegistry::with_defaults();
        assert_eq!(registry.names(), vec!["dummy", "flow"]);
        assert!(registry.contains("flow"));
        assert!(!registry.contains("symfony"));

        let mapping = Arc::new(PathMapping::new());
        assert!(registry
            .create("flow", Config::default(), mapping.clone())
            .is_some());
        assert!(registry
            .create("symfony", Config::default(), mapping)
            .is_none());
    }
}
