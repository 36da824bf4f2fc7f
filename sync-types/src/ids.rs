//! Identity types for offline-sync.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

/// Number of random bytes in an [`ActionId`] suffix.
const SUFFIX_BYTES: usize = 5;

/// Fallback suffix source when the OS RNG is unavailable.
static FALLBACK_COUNTER: AtomicU32 = AtomicU32::new(0);

/// A unique identifier for a queued offline action.
///
/// Formatted as `<enqueue millis>-<random hex suffix>`, e.g.
/// `1718000000000-9f3a01c2be`. Immutable once generated.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(String);

impl ActionId {
    /// Generate a new ActionId for an action enqueued at `now_millis`.
    pub fn generate(now_millis: u64) -> Self {
        let mut bytes = [0u8; SUFFIX_BYTES];
        if getrandom::getrandom(&mut bytes).is_err() {
            let n = FALLBACK_COUNTER.fetch_add(1, Ordering::Relaxed);
            bytes[..4].copy_from_slice(&n.to_le_bytes());
        }
        Self(format!("{}-{}", now_millis, hex::encode(bytes)))
    }

    /// Wrap an existing identifier string (e.g. one read back from storage).
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The timestamp prefix, if the id was produced by [`ActionId::generate`].
    pub fn timestamp_millis(&self) -> Option<u64> {
        self.0.split_once('-').and_then(|(ts, _)| ts.parse().ok())
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ActionId({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_id_carries_timestamp() {
        let id = ActionId::generate(1_718_000_000_000);
        assert_eq!(id.timestamp_millis(), Some(1_718_000_000_000));
        assert!(id.as_str().starts_with("1718000000000-"));
    }

    #[test]
    fn action_id_suffix_is_hex() {
        let id = ActionId::generate(42);
        let (_, suffix) = id.as_str().split_once('-').unwrap();
        assert_eq!(suffix.len(), SUFFIX_BYTES * 2);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn action_ids_generated_in_same_millisecond_differ() {
        let a = ActionId::generate(7);
        let b = ActionId::generate(7);
        assert_ne!(a, b);
    }

    #[test]
    fn action_id_serializes_as_plain_string() {
        let id = ActionId::from_string("100-abc");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"100-abc\"");
        let back: ActionId = serde_json::from_str("\"100-abc\"").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn foreign_id_has_no_timestamp() {
        let id = ActionId::from_string("legacy");
        assert_eq!(id.timestamp_millis(), None);
    }
}
