//! Path mapper for the Neos Flow framework.
//!
//! Flow executes generated proxy classes from a per-context code cache
//! instead of the files under `Packages/`. The debug engine therefore
//! reports cache paths while the IDE only knows the original sources. This
//! mapper rewrites both directions: original path -> cache path for
//! commands, cache path -> original path for responses. Every cache file
//! carries a `# PathAndFilename:` marker naming its origin, which is used to
//! recover mappings the proxy never computed itself.

use super::{Error, PathMapper};
use crate::config::Config;
use crate::pathmapping::PathMapping;
use log::{debug, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

const CACHE_PATH_TEMPLATE: &str =
    "@base@/Data/Temporary/@context@/Cache/Code/Flow_Object_Classes/@filename@.php";

/// Absolute php file reference inside a command, optionally preceded by the
/// tail of a `file://` scheme.
static RE_PHP_FILE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?://)?(/[^ ]*\.php)").expect("must compile"));

/// `filename` attribute holding a code-cache path. The context segment is a
/// wildcard: only the directory shape is checked.
static RE_CACHE_FILENAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"filename=["]?file://(\S+)/Data/Temporary/[^/]*/Cache/Code/Flow_Object_Classes/([^"]*)\.php"#,
    )
    .expect("must compile")
});

/// Origin marker embedded in every generated proxy class.
static RE_PATH_AND_FILENAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^# PathAndFilename: (.*)$").expect("must compile"));

/// Package layout convention for original sources.
static RE_PACKAGE_CLASS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(.*?)/Packages/[^/]*/(.*?)/Classes/(.*).php").expect("must compile"));

static RE_DOT_OR_SLASH: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\./]").expect("must compile"));

pub struct FlowPathMapper {
    config: Config,
    mapping: Arc<PathMapping>,
}

impl FlowPathMapper {
    pub fn new(config: Config, mapping: Arc<PathMapping>) -> Self {
        FlowPathMapper { config, mapping }
    }

    /// Compose the cache path for a class under the configured context.
    /// Pure string composition, the result is not checked for existence.
    fn cache_path(&self, base: &str, class_name: &str) -> String {
        CACHE_PATH_TEMPLATE
            .replacen("@base@", base, 1)
            .replacen("@context@", &self.config.context, 1)
            .replacen("@filename@", class_name, 1)
    }

    /// Map an original source path to its compiled class path. Paths outside
    /// the package convention, vendor packages and classes that have no cache
    /// file yet come back unchanged.
    fn map_path(&self, original_path: &str) -> String {
        if original_path.contains("/Packages/") {
            debug!(target: "mapper", "flow package detected: {original_path}");
            let (base, class_name) = path_to_class_path(original_path);
            if class_name.is_empty() {
                warn!(target: "mapper", "vendor package detected, class mapping disabled: {original_path}");
                return original_path.to_string();
            }
            let cache_path = self.cache_path(&base, &class_name);
            let real_path = strip_scheme(&cache_path);
            if Path::new(real_path).exists() {
                return self.register_mapping(real_path, original_path);
            }
        }

        original_path.to_string()
    }

    /// Register cache path -> original path, first writer wins.
    fn register_mapping(&self, path: &str, original_path: &str) -> String {
        if self.config.log_mappings() {
            info!(target: "mapper", "mapping registered: {path} -> {original_path}");
        }
        self.mapping.set(path, original_path);
        path.to_string()
    }

    /// Recover the original path from the marker inside a cache file. A file
    /// without the marker resolves to itself; an unreadable file is an error
    /// that ends the session.
    fn read_original_path_from_cache(&self, path: &str) -> Result<String, Error> {
        let content = std::fs::read_to_string(path).map_err(|source| Error::CacheRead {
            path: path.to_string(),
            source,
        })?;
        if let Some(captures) = RE_PATH_AND_FILENAME.captures(&content) {
            let original_path = captures[1].to_string();
            if self.config.very_verbose {
                info!(target: "mapper", "reverse mapping recovered from {path}: {original_path}");
            }
            self.register_mapping(path, &original_path);
            return Ok(original_path);
        }

        Ok(path.to_string())
    }

    fn rewrite_text(&self, message: &[u8]) -> Vec<u8> {
        let text = String::from_utf8_lossy(message);
        let mut substitutions: HashMap<String, String> = HashMap::new();
        for captures in RE_PHP_FILE.captures_iter(&text) {
            let original_path = &captures[1];
            if substitutions.contains_key(original_path) {
                continue;
            }
            let path = self.map_path(original_path);
            debug!(target: "mapper", "text protocol: {original_path} -> {path}");
            substitutions.insert(original_path.to_string(), path);
        }

        // Substitutions are applied only after the whole message was scanned,
        // so one replacement cannot corrupt a path a later match relies on.
        let mut message = message.to_vec();
        for (original_path, path) in &substitutions {
            if path != original_path {
                message = replace_all(
                    &message,
                    strip_scheme(original_path).as_bytes(),
                    strip_scheme(path).as_bytes(),
                );
            }
        }
        message
    }

    fn rewrite_xml(&self, message: &[u8]) -> Result<Vec<u8>, Error> {
        let text = String::from_utf8_lossy(message);
        let mut substitutions: HashMap<String, String> = HashMap::new();
        for captures in RE_CACHE_FILENAME.captures_iter(&text) {
            // Rebuild the cache path with the configured context, whatever
            // context the engine reported.
            let path = self.cache_path(&captures[1], &captures[2]);
            if substitutions.contains_key(&path) {
                continue;
            }
            let original_path = match self.mapping.get(&path) {
                Some(original_path) => {
                    debug!(target: "mapper", "xml protocol: {path} -> {original_path}");
                    original_path
                }
                None => {
                    let original_path = self.read_original_path_from_cache(&path)?;
                    debug!(target: "mapper", "xml protocol, missing mapping: {path} -> {original_path}");
                    original_path
                }
            };
            substitutions.insert(path, original_path);
        }

        let mut message = message.to_vec();
        for (path, original_path) in &substitutions {
            message = replace_all(
                &message,
                strip_scheme(path).as_bytes(),
                strip_scheme(original_path).as_bytes(),
            );
        }
        Ok(message)
    }
}

impl PathMapper for FlowPathMapper {
    fn apply_to_outbound(&self, message: &[u8]) -> Vec<u8> {
        self.rewrite_text(message)
    }

    fn apply_to_inbound(&self, message: &[u8]) -> Result<Vec<u8>, Error> {
        let message = self.rewrite_xml(message)?;
        repair_length(message)
    }
}

/// Split an original source path into the application base path and the
/// compiled class name.
///
/// `/srv/app/Packages/Application/Acme.Demo/Classes/Controller/FooController.php`
/// becomes `("/srv/app", "Acme_Demo_Controller_FooController")`. Paths
/// outside the `Packages/<vendor>/<package>/Classes` convention return
/// `(path, "")`: an empty class name means "no mapping possible", not an
/// error.
pub fn path_to_class_path(path: &str) -> (String, String) {
    match RE_PACKAGE_CLASS.captures(path) {
        Some(captures) => {
            let package_path = RE_DOT_OR_SLASH.replace_all(&captures[2], "/").into_owned();
            let mut class_path = captures[3].to_string();
            // PSR-4 layouts omit the package segments on disk. Plain
            // substring test, kept for compatibility with existing caches.
            if !class_path.contains(&package_path) {
                class_path = format!("{package_path}/{class_path}");
            }
            let base_path = captures[1].to_string();
            let class_name = RE_DOT_OR_SLASH.replace_all(&class_path, "_").into_owned();
            (base_path, class_name)
        }
        None => (path.to_string(), String::new()),
    }
}

/// Restore the declared length of a `<length>\0<payload>\0` frame after the
/// payload was rewritten. Only the first textual occurrence of the old
/// length is touched, which is the length field itself.
fn repair_length(message: Vec<u8>) -> Result<Vec<u8>, Error> {
    let mut fields = message.split(|&b| b == 0);
    let declared = fields.next().ok_or(Error::Framing("missing length field"))?;
    let payload = fields.next().ok_or(Error::Framing("missing payload"))?;

    let declared_len: usize = std::str::from_utf8(declared)?.parse()?;
    let actual_len = payload.len();
    if declared_len != actual_len {
        let old = declared_len.to_string();
        let new = actual_len.to_string();
        return Ok(replace_first(&message, old.as_bytes(), new.as_bytes()));
    }
    Ok(message)
}

/// Strip the `file://` scheme, if present.
fn strip_scheme(path: &str) -> &str {
    path.strip_prefix("file://").unwrap_or(path)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn replace_all(haystack: &[u8], needle: &[u8], replacement: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(haystack.len());
    let mut rest = haystack;
    while let Some(pos) = find(rest, needle) {
        out.extend_from_slice(&rest[..pos]);
        out.extend_from_slice(replacement);
        rest = &rest[pos + needle.len()..];
    }
    out.extend_from_slice(rest);
    out
}

fn replace_first(haystack: &[u8], needle: &[u8], replacement: &[u8]) -> Vec<u8> {
    match find(haystack, needle) {
        Some(pos) => {
            let mut out = Vec::with_capacity(haystack.len());
            out.extend_from_slice(&haystack[..pos]);
            out.extend_from_slice(replacement);
            out.extend_from_slice(&haystack[pos + needle.len()..]);
            out
        }
        None => haystack.to_vec(),
    }
}
