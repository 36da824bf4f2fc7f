//! Mock remote service for testing.
//!
//! Records every call and answers from a script of queued results.

use super::RemoteService;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use sync_types::{MutationKind, Payload, RemoteError};

/// One call received by [`MockRemote`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCall {
    /// Mutation verb.
    pub kind: MutationKind,
    /// Target collection.
    pub collection: String,
    /// Record key for updates and deletes.
    pub record_key: Option<String>,
    /// Payload for inserts and updates.
    pub payload: Option<Payload>,
}

/// Mock remote service.
///
/// Result selection per call, first match wins:
/// 1. the next scripted result (`queue_result`)
/// 2. a failure registered for the call's collection (`fail_collection`)
/// 3. the standing failure (`fail_always`)
/// 4. success
#[derive(Debug, Default)]
pub struct MockRemote {
    inner: Arc<Mutex<MockRemoteInner>>,
}

#[derive(Debug, Default)]
struct MockRemoteInner {
    calls: Vec<RemoteCall>,
    script: VecDeque<Result<(), RemoteError>>,
    collection_failures: HashMap<String, RemoteError>,
    always: Option<RemoteError>,
}

impl MockRemote {
    /// Create a mock that succeeds on every call.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the result of the next unscripted call.
    pub fn queue_result(&self, result: Result<(), RemoteError>) {
        let mut inner = self.inner.lock().unwrap();
        inner.script.push_back(result);
    }

    /// Fail every call targeting `collection` with `error`.
    pub fn fail_collection(&self, collection: &str, error: RemoteError) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .collection_failures
            .insert(collection.to_string(), error);
    }

    /// Fail every call with `error`, or stop doing so with `None`.
    pub fn fail_always(&self, error: Option<RemoteError>) {
        let mut inner = self.inner.lock().unwrap();
        inner.always = error;
    }

    /// All calls received so far.
    pub fn calls(&self) -> Vec<RemoteCall> {
        let inner = self.inner.lock().unwrap();
        inner.calls.clone()
    }

    /// Number of calls received so far.
    pub fn call_count(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.calls.len()
    }

    /// Clear all state (calls, script, failures).
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        *inner = MockRemoteInner::default();
    }

    fn record(&self, call: RemoteCall) -> Result<(), RemoteError> {
        let mut inner = self.inner.lock().unwrap();

        let result = if let Some(scripted) = inner.script.pop_front() {
            scripted
        } else if let Some(error) = inner.collection_failures.get(&call.collection) {
            Err(error.clone())
        } else if let Some(error) = &inner.always {
            Err(error.clone())
        } else {
            Ok(())
        };

        inner.calls.push(call);
        result
    }
}

impl Clone for MockRemote {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl RemoteService for MockRemote {
    async fn insert(&self, collection: &str, payload: &Payload) -> Result<(), RemoteError> {
        self.record(RemoteCall {
            kind: MutationKind::Insert,
            collection: collection.to_string(),
            record_key: None,
            payload: Some(payload.clone()),
        })
    }

    async fn update(
        &self,
        collection: &str,
        key: &str,
        payload: &Payload,
    ) -> Result<(), RemoteError> {
        self.record(RemoteCall {
            kind: MutationKind::Update,
            collection: collection.to_string(),
            record_key: Some(key.to_string()),
            payload: Some(payload.clone()),
        })
    }

    async fn delete(&self, collection: &str, key: &str) -> Result<(), RemoteError> {
        self.record(RemoteCall {
            kind: MutationKind::Delete,
            collection: collection.to_string(),
            record_key: Some(key.to_string()),
            payload: None,
        })
    }
}
