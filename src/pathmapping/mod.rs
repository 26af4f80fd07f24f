use std::collections::HashMap;
use std::sync::Mutex;

/// Shared mapping from a compiled proxy-class path to the original source
/// path.
///
/// One instance is shared by all debug sessions. Writes use insert-if-absent
/// semantics: the first writer wins and later writes for the same key are
/// ignored, so two sessions racing to resolve the same class always end up
/// observing the same mapping. Entries are never evicted; the mapping count
/// is bounded by the number of distinct classes touched while debugging.
#[derive(Debug, Default)]
pub struct PathMapping {
    inner: Mutex<HashMap<String, String>>,
}

impl PathMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has(&self, path: &str) -> bool {
        self.inner.lock().unwrap().contains_key(path)
    }

    pub fn get(&self, path: &str) -> Option<String> {
        self.inner.lock().unwrap().get(path).cloned()
    }

    /// Store `original` under `path` unless a mapping already exists.
    /// The check and the write happen under one lock.
    pub fn set(&self, path: &str, original: &str) {
        self.inner
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_insert_with(|| original.to_string());
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().is_empty()
    }
}
