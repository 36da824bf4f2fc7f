//! Versioned on-disk layout for the two persisted record types.
//!
//! The queue is stored as `{"version":1,"actions":[...]}` and every cache
//! entry as `{"version":1,"entry":{...}}`. Records written before versioning
//! existed (a bare action array, a bare entry object) are read as version 0
//! and migrated in memory; callers re-persist them in the current layout.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{CacheEntry, FormatError, OfflineAction};

/// Current schema version for both persisted record types.
pub const SCHEMA_VERSION: u32 = 1;

/// Schema version assigned to unversioned legacy records.
pub const LEGACY_VERSION: u32 = 0;

/// A decoded record plus the version it was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded<T> {
    /// The record in the current in-memory representation.
    pub value: T,
    /// Version found in storage.
    pub stored_version: u32,
}

impl<T> Decoded<T> {
    /// Whether the stored form is older than [`SCHEMA_VERSION`] and should be rewritten.
    pub fn needs_rewrite(&self) -> bool {
        self.stored_version < SCHEMA_VERSION
    }
}

#[derive(Serialize)]
struct QueueRecord<'a> {
    version: u32,
    actions: &'a [OfflineAction],
}

#[derive(Serialize)]
struct CacheRecord<'a> {
    version: u32,
    entry: &'a CacheEntry<Value>,
}

#[derive(Deserialize)]
struct Versioned {
    version: u32,
    #[serde(flatten)]
    body: serde_json::Map<String, Value>,
}

/// Encode the full queue snapshot.
pub fn encode_queue(actions: &[OfflineAction]) -> Result<String, FormatError> {
    serde_json::to_string(&QueueRecord {
        version: SCHEMA_VERSION,
        actions,
    })
    .map_err(FormatError::Encode)
}

/// Decode a queue snapshot, migrating legacy layouts.
pub fn decode_queue(raw: &str) -> Result<Decoded<Vec<OfflineAction>>, FormatError> {
    let value: Value = serde_json::from_str(raw).map_err(FormatError::Decode)?;

    if value.is_array() {
        return Ok(Decoded {
            value: from_value(value)?,
            stored_version: LEGACY_VERSION,
        });
    }

    let versioned = check_version(value)?;
    let actions = versioned
        .body
        .get("actions")
        .cloned()
        .unwrap_or(Value::Array(Vec::new()));

    Ok(Decoded {
        value: from_value(actions)?,
        stored_version: versioned.version,
    })
}

/// Encode one cache entry.
pub fn encode_cache_entry(entry: &CacheEntry<Value>) -> Result<String, FormatError> {
    serde_json::to_string(&CacheRecord {
        version: SCHEMA_VERSION,
        entry,
    })
    .map_err(FormatError::Encode)
}

/// Decode one cache entry, migrating the legacy bare-object layout.
pub fn decode_cache_entry(raw: &str) -> Result<Decoded<CacheEntry<Value>>, FormatError> {
    let value: Value = serde_json::from_str(raw).map_err(FormatError::Decode)?;

    if value.get("version").is_none() {
        return Ok(Decoded {
            value: from_value(value)?,
            stored_version: LEGACY_VERSION,
        });
    }

    let versioned = check_version(value)?;
    let entry = versioned
        .body
        .get("entry")
        .cloned()
        .unwrap_or(Value::Null);

    Ok(Decoded {
        value: from_value(entry)?,
        stored_version: versioned.version,
    })
}

fn check_version(value: Value) -> Result<Versioned, FormatError> {
    let versioned: Versioned = from_value(value)?;
    if versioned.version > SCHEMA_VERSION {
        return Err(FormatError::UnsupportedVersion {
            found: versioned.version,
            supported: SCHEMA_VERSION,
        });
    }
    Ok(versioned)
}

fn from_value<T: DeserializeOwned>(value: Value) -> Result<T, FormatError> {
    serde_json::from_value(value).map_err(FormatError::Decode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MutationKind, Payload};
    use serde_json::json;

    fn action(now: u64) -> OfflineAction {
        OfflineAction::new(
            MutationKind::Insert,
            "products",
            None,
            Payload::encode(&json!({ "name": "X" })).unwrap(),
            now,
            3,
        )
        .unwrap()
    }

    #[test]
    fn queue_is_written_with_version() {
        let raw = encode_queue(&[action(1)]).unwrap();
        let value: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["version"], json!(SCHEMA_VERSION));
        assert_eq!(value["actions"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn queue_decodes_current_layout() {
        let actions = vec![action(1), action(2)];
        let decoded = decode_queue(&encode_queue(&actions).unwrap()).unwrap();
        assert_eq!(decoded.value, actions);
        assert!(!decoded.needs_rewrite());
    }

    #[test]
    fn legacy_queue_array_is_migrated() {
        let raw = r#"[{
            "id": "1718000000000-ab12",
            "kind": "update",
            "collection": "products",
            "recordKey": "p-1",
            "payload": "{\"price\":3}",
            "enqueuedAt": 1718000000000,
            "retryCount": 1,
            "maxRetries": 5
        }]"#;

        let decoded = decode_queue(raw).unwrap();
        assert_eq!(decoded.stored_version, LEGACY_VERSION);
        assert!(decoded.needs_rewrite());

        let action = &decoded.value[0];
        assert_eq!(action.kind, MutationKind::Update);
        assert_eq!(action.record_key.as_deref(), Some("p-1"));
        assert_eq!(action.retry_count, 1);
        assert_eq!(action.max_retries, 5);
    }

    #[test]
    fn newer_queue_version_is_refused() {
        let raw = r#"{"version": 7, "actions": []}"#;
        assert!(matches!(
            decode_queue(raw),
            Err(FormatError::UnsupportedVersion { found: 7, .. })
        ));
    }

    #[test]
    fn garbage_queue_is_a_decode_error() {
        assert!(matches!(decode_queue("not json"), Err(FormatError::Decode(_))));
    }

    #[test]
    fn cache_entry_decodes_current_layout() {
        let entry = CacheEntry::new("products:1", json!({ "name": "X" }), 100, 5_000);
        let decoded = decode_cache_entry(&encode_cache_entry(&entry).unwrap()).unwrap();
        assert_eq!(decoded.value, entry);
        assert_eq!(decoded.stored_version, SCHEMA_VERSION);
    }

    #[test]
    fn legacy_cache_entry_is_migrated() {
        let raw = r#"{"key":"k","data":[1,2],"writtenAt":50,"ttl":10}"#;
        let decoded = decode_cache_entry(raw).unwrap();
        assert!(decoded.needs_rewrite());
        assert_eq!(decoded.value.written_at, 50);
        assert_eq!(decoded.value.data, json!([1, 2]));
    }

    #[test]
    fn newer_cache_entry_version_is_refused() {
        let raw = r#"{"version":2,"entry":{"key":"k","data":1,"written_at":0,"ttl":1}}"#;
        assert!(matches!(
            decode_cache_entry(raw),
            Err(FormatError::UnsupportedVersion { found: 2, .. })
        ));
    }
}
