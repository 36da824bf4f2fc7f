//! Cache entries as held in memory and persisted per key.

use serde::{Deserialize, Serialize};

/// A cached value plus the metadata needed to expire it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T = serde_json::Value> {
    /// Caller-chosen key, unique within the store's namespace.
    pub key: String,
    /// Opaque cached payload.
    pub data: T,
    /// Epoch millis when the entry was last written (or touched).
    #[serde(alias = "writtenAt")]
    pub written_at: u64,
    /// Milliseconds until the entry is considered expired.
    pub ttl: u64,
}

impl<T> CacheEntry<T> {
    /// Create a new entry written at `now_millis`.
    pub fn new(key: impl Into<String>, data: T, now_millis: u64, ttl_millis: u64) -> Self {
        Self {
            key: key.into(),
            data,
            written_at: now_millis,
            ttl: ttl_millis,
        }
    }

    /// Epoch millis after which the entry is expired.
    pub fn expires_at(&self) -> u64 {
        self.written_at.saturating_add(self.ttl)
    }

    /// An entry is expired once `written_at + ttl < now`.
    pub fn is_expired(&self, now_millis: u64) -> bool {
        self.expires_at() < now_millis
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_is_live_up_to_its_deadline() {
        let entry = CacheEntry::new("k", 1, 1_000, 500);
        assert!(!entry.is_expired(1_000));
        assert!(!entry.is_expired(1_500));
        assert!(entry.is_expired(1_501));
    }

    #[test]
    fn huge_ttl_does_not_overflow() {
        let entry = CacheEntry::new("k", (), u64::MAX - 1, u64::MAX);
        assert_eq!(entry.expires_at(), u64::MAX);
        assert!(!entry.is_expired(u64::MAX));
    }
}
