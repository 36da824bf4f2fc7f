//! Offline actions - durably queued mutations awaiting delivery.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{ActionId, FormatError};

/// Default retry ceiling for a queued action.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// The mutation verb of an offline action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationKind {
    /// Create a new record.
    Insert,
    /// Modify an existing record (requires a record key).
    Update,
    /// Remove an existing record (requires a record key).
    Delete,
}

impl MutationKind {
    /// Whether actions of this kind must identify the record they target.
    pub fn requires_record_key(&self) -> bool {
        matches!(self, Self::Update | Self::Delete)
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// An opaque, already-serialized mutation payload.
///
/// The engine never looks inside; callers define and validate their own
/// typed envelopes and hand over the JSON text.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(String);

impl Payload {
    /// Serialize a typed value into a payload.
    pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Self, FormatError> {
        serde_json::to_string(value)
            .map(Self)
            .map_err(FormatError::Encode)
    }

    /// Wrap JSON text produced elsewhere. The text is not validated.
    pub fn from_json(json: impl Into<String>) -> Self {
        Self(json.into())
    }

    /// Deserialize the payload back into a typed value.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, FormatError> {
        serde_json::from_str(&self.0).map_err(FormatError::Decode)
    }

    /// The raw JSON text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Size of the payload in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Payload([{} bytes])", self.0.len())
    }
}

/// A mutation queued while the remote service was unreachable.
///
/// Created by a write call, mutated only by the sync engine (which bumps
/// `retry_count`), removed on success or once retries are exhausted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfflineAction {
    /// Unique identifier, generated at enqueue time.
    pub id: ActionId,
    /// Mutation verb.
    pub kind: MutationKind,
    /// Logical target (table / resource name).
    pub collection: String,
    /// Key of the targeted record. Always present for updates and deletes.
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "recordKey")]
    pub record_key: Option<String>,
    /// Opaque mutation body.
    pub payload: Payload,
    /// Epoch millis at enqueue time.
    #[serde(alias = "enqueuedAt")]
    pub enqueued_at: u64,
    /// Number of failed delivery attempts so far.
    #[serde(default, alias = "retryCount")]
    pub retry_count: u32,
    /// Retry ceiling; the action is dropped once it is reached.
    #[serde(default = "default_max_retries", alias = "maxRetries")]
    pub max_retries: u32,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

impl OfflineAction {
    /// Create a new action enqueued at `now_millis`.
    ///
    /// # Errors
    ///
    /// Returns [`FormatError::MissingRecordKey`] for an update or delete
    /// without a record key.
    pub fn new(
        kind: MutationKind,
        collection: impl Into<String>,
        record_key: Option<String>,
        payload: Payload,
        now_millis: u64,
        max_retries: u32,
    ) -> Result<Self, FormatError> {
        if kind.requires_record_key() && record_key.as_deref().map_or(true, str::is_empty) {
            return Err(FormatError::MissingRecordKey { kind });
        }

        Ok(Self {
            id: ActionId::generate(now_millis),
            kind,
            collection: collection.into(),
            record_key,
            payload,
            enqueued_at: now_millis,
            retry_count: 0,
            max_retries,
        })
    }

    /// Whether another failed attempt would still leave the action queued.
    pub fn can_retry(&self) -> bool {
        self.retry_count.saturating_add(1) < self.max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload() -> Payload {
        Payload::encode(&json!({ "name": "X" })).unwrap()
    }

    #[test]
    fn insert_needs_no_record_key() {
        let action =
            OfflineAction::new(MutationKind::Insert, "products", None, payload(), 10, 3).unwrap();
        assert_eq!(action.retry_count, 0);
        assert_eq!(action.enqueued_at, 10);
        assert_eq!(action.id.timestamp_millis(), Some(10));
    }

    #[test]
    fn update_without_record_key_is_rejected() {
        let result = OfflineAction::new(MutationKind::Update, "products", None, payload(), 10, 3);
        assert!(matches!(
            result,
            Err(FormatError::MissingRecordKey {
                kind: MutationKind::Update
            })
        ));
    }

    #[test]
    fn delete_with_empty_record_key_is_rejected() {
        let result = OfflineAction::new(
            MutationKind::Delete,
            "products",
            Some(String::new()),
            payload(),
            10,
            3,
        );
        assert!(result.is_err());
    }

    #[test]
    fn can_retry_respects_ceiling() {
        let mut action =
            OfflineAction::new(MutationKind::Insert, "products", None, payload(), 0, 3).unwrap();
        assert!(action.can_retry());
        action.retry_count = 1;
        assert!(action.can_retry());
        action.retry_count = 2;
        assert!(!action.can_retry());
    }

    #[test]
    fn payload_decodes_to_typed_value() {
        #[derive(Deserialize)]
        struct Product {
            name: String,
        }
        let product: Product = payload().decode().unwrap();
        assert_eq!(product.name, "X");
    }

    #[test]
    fn payload_debug_hides_contents() {
        let p = Payload::from_json(r#"{"secret":"value"}"#);
        let debug = format!("{:?}", p);
        assert!(!debug.contains("secret"));
        assert!(debug.contains("18 bytes"));
    }

    #[test]
    fn mutation_kind_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&MutationKind::Delete).unwrap(),
            "\"delete\""
        );
    }

    #[test]
    fn missing_retry_fields_use_defaults() {
        let json = r#"{
            "id": "5-aa",
            "kind": "insert",
            "collection": "products",
            "payload": "{}",
            "enqueued_at": 5
        }"#;
        let action: OfflineAction = serde_json::from_str(json).unwrap();
        assert_eq!(action.retry_count, 0);
        assert_eq!(action.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(action.record_key, None);
    }
}
