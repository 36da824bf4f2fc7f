//! Remote data service abstraction.
//!
//! The engine delivers queued actions through a [`RemoteService`]; one
//! method per mutation verb. Implementations own their own timeouts and
//! report failures as [`RemoteError`] so the retry policy can classify them.

mod mock;

pub use mock::{MockRemote, RemoteCall};

use async_trait::async_trait;
use sync_types::{MutationKind, OfflineAction, Payload, RemoteError};

/// Trait for the remote data service.
#[async_trait]
pub trait RemoteService: Send + Sync {
    /// Create a record in `collection`.
    async fn insert(&self, collection: &str, payload: &Payload) -> Result<(), RemoteError>;

    /// Modify the record `key` in `collection`.
    async fn update(&self, collection: &str, key: &str, payload: &Payload)
        -> Result<(), RemoteError>;

    /// Remove the record `key` from `collection`.
    async fn delete(&self, collection: &str, key: &str) -> Result<(), RemoteError>;
}

/// Deliver one queued action.
///
/// An update or delete without a record key can only come from a damaged
/// snapshot; it is reported as a malformed payload, which is permanent.
pub async fn execute(remote: &dyn RemoteService, action: &OfflineAction) -> Result<(), RemoteError> {
    match (action.kind, action.record_key.as_deref()) {
        (MutationKind::Insert, _) => remote.insert(&action.collection, &action.payload).await,
        (MutationKind::Update, Some(key)) => {
            remote
                .update(&action.collection, key, &action.payload)
                .await
        }
        (MutationKind::Delete, Some(key)) => remote.delete(&action.collection, key).await,
        (kind, None) => Err(RemoteError::MalformedPayload(format!(
            "{} on {} has no record key",
            kind, action.collection
        ))),
    }
}
