//! Persisted key layout.
//!
//! Everything lives under one namespace prefix:
//! - `<ns>:pending_actions` - the queue snapshot
//! - `<ns>:last_sync` - epoch millis of the last successful drain
//! - `<ns>:cache_<key>` - one entry per cached item

/// Builds the persisted keys for one namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageKeys {
    namespace: String,
}

impl StorageKeys {
    /// Keys under `namespace`.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    /// The namespace prefix.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Key holding the queue snapshot.
    pub fn pending_actions(&self) -> String {
        format!("{}:pending_actions", self.namespace)
    }

    /// Key holding a queue snapshot this build could not read.
    pub fn unreadable_actions(&self) -> String {
        format!("{}:pending_actions_unreadable", self.namespace)
    }

    /// Key holding the last successful sync time.
    pub fn last_sync(&self) -> String {
        format!("{}:last_sync", self.namespace)
    }

    /// Key holding one cache entry.
    pub fn cache(&self, key: &str) -> String {
        format!("{}{}", self.cache_prefix(), key)
    }

    /// Prefix shared by all cache entry keys.
    pub fn cache_prefix(&self) -> String {
        format!("{}:cache_", self.namespace)
    }

    /// Recover the cache key from a persisted key, if it is one.
    pub fn cache_key_of<'a>(&self, stored: &'a str) -> Option<&'a str> {
        stored
            .strip_prefix(self.namespace.as_str())?
            .strip_prefix(":cache_")
    }
}
