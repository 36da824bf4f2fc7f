//! Durable action queue.
//!
//! An [`ActionBuffer`] plus write-through persistence of the whole snapshot
//! under `<ns>:pending_actions` after every mutation. The queue is small
//! (tens of actions), so rewriting it each time is fine.
//!
//! An action that made it into memory is never lost because a persist
//! failed: the queue stays dirty and the next mutation (or an explicit
//! [`persist`](ActionQueue::persist)) writes the full snapshot again.
//! Actions enqueued after the last successful persist are lost on a crash.
//!
//! If [`load`](ActionQueue::load) could not read the stored snapshot, the
//! snapshot is held: nothing is written over it until a later load
//! succeeds and merges memory into it.

use std::collections::HashSet;
use std::sync::Arc;
use sync_core::{ActionBuffer, Clock};
use sync_types::schema::{decode_queue, encode_queue};
use sync_types::{ActionId, MutationKind, OfflineAction, Payload};
use tokio::sync::Mutex;

use crate::error::{QueueError, StorageError};
use crate::keys::StorageKeys;
use crate::storage::KeyValueStore;

/// Persisted FIFO of pending actions.
pub struct ActionQueue {
    inner: Mutex<QueueInner>,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    keys: StorageKeys,
    default_max_retries: u32,
}

struct QueueInner {
    buffer: ActionBuffer,
    /// Memory holds changes the store has not seen.
    dirty: bool,
    /// The stored snapshot could not be read; don't overwrite it.
    held: bool,
}

impl ActionQueue {
    /// Create an empty queue. Does no I/O; call [`load`](Self::load) to
    /// restore the persisted snapshot.
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        keys: StorageKeys,
        max_pending: usize,
        default_max_retries: u32,
    ) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                buffer: ActionBuffer::new(max_pending),
                dirty: false,
                held: false,
            }),
            store,
            clock,
            keys,
            default_max_retries,
        }
    }

    /// Append a new action and persist the queue.
    ///
    /// # Errors
    ///
    /// - [`QueueError::InvalidMutation`] for an update or delete without a
    ///   record key
    /// - [`QueueError::Full`] when `max_pending` actions are already queued
    ///
    /// A failed persist is not an error; the action stays queued in memory.
    pub async fn enqueue(
        &self,
        kind: MutationKind,
        collection: &str,
        record_key: Option<String>,
        payload: Payload,
        max_retries: Option<u32>,
    ) -> Result<ActionId, QueueError> {
        let action = OfflineAction::new(
            kind,
            collection,
            record_key,
            payload,
            self.clock.now_millis(),
            max_retries.unwrap_or(self.default_max_retries),
        )
        .map_err(QueueError::InvalidMutation)?;
        let id = action.id.clone();

        let mut inner = self.inner.lock().await;
        inner.buffer.push(action)?;
        tracing::debug!(action_id = %id, %kind, collection, "action enqueued");

        self.persist_locked(&mut inner).await;
        Ok(id)
    }

    /// Fail with [`QueueError::Full`] if another action would not fit.
    pub async fn ensure_room(&self) -> Result<(), QueueError> {
        let inner = self.inner.lock().await;
        if inner.buffer.len() >= inner.buffer.capacity() {
            return Err(QueueError::Full {
                capacity: inner.buffer.capacity(),
            });
        }
        Ok(())
    }

    /// Copy of the queued actions in FIFO order.
    pub async fn drainable(&self) -> Vec<OfflineAction> {
        self.inner.lock().await.buffer.snapshot()
    }

    /// Increment an action's retry count and persist. Returns the new count.
    pub async fn mark_retried(&self, id: &ActionId) -> Option<u32> {
        let mut inner = self.inner.lock().await;
        let count = inner.buffer.mark_retried(id)?;
        self.persist_locked(&mut inner).await;
        Some(count)
    }

    /// Remove an action and persist.
    pub async fn remove(&self, id: &ActionId) -> Option<OfflineAction> {
        let mut inner = self.inner.lock().await;
        let action = inner.buffer.remove(id)?;
        self.persist_locked(&mut inner).await;
        Some(action)
    }

    /// Apply one drain cycle's results and persist once.
    ///
    /// Ids no longer queued are ignored. Actions enqueued while the cycle
    /// ran are left alone.
    pub async fn apply_cycle(&self, removed: &[ActionId], retried: &[ActionId]) {
        let mut inner = self.inner.lock().await;
        for id in removed {
            inner.buffer.remove(id);
        }
        for id in retried {
            inner.buffer.mark_retried(id);
        }
        if !removed.is_empty() || !retried.is_empty() || inner.dirty {
            self.persist_locked(&mut inner).await;
        }
    }

    /// Number of queued actions.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.buffer.len()
    }

    /// Whether the queue is empty.
    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.buffer.is_empty()
    }

    /// Whether memory holds changes the store has not seen.
    pub async fn is_dirty(&self) -> bool {
        self.inner.lock().await.dirty
    }

    /// Write the full snapshot. Returns whether the write succeeded.
    pub async fn persist(&self) -> bool {
        let mut inner = self.inner.lock().await;
        self.persist_locked(&mut inner).await
    }

    /// Restore the persisted snapshot. Returns the number of actions queued
    /// afterwards.
    ///
    /// Actions already in memory (enqueued before the load ran) are kept
    /// after the restored ones. A snapshot in an older layout is rewritten.
    /// A snapshot this build cannot read is copied to
    /// `<ns>:pending_actions_unreadable` and the queue starts from memory.
    ///
    /// # Errors
    ///
    /// Returns the storage error if the snapshot could not be read. The
    /// queue keeps working in memory but holds the stored snapshot until a
    /// later call succeeds.
    pub async fn load(&self) -> Result<usize, StorageError> {
        let key = self.keys.pending_actions();
        let raw = match self.store.get(&key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return Ok(self.release().await),
            Err(e) => {
                tracing::warn!(error = %e, "queue load: read failed, holding stored snapshot");
                self.inner.lock().await.held = true;
                return Err(e);
            }
        };

        let decoded = match decode_queue(&raw) {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::warn!(error = %e, "queue load: snapshot unreadable, set aside");
                if let Err(e) = self.store.set(&self.keys.unreadable_actions(), &raw).await {
                    tracing::error!(error = %e, "queue load: could not set snapshot aside");
                }
                return Ok(self.release().await);
            }
        };

        let mut inner = self.inner.lock().await;
        inner.held = false;
        let restored = decoded.value.len();
        let known: HashSet<ActionId> = decoded.value.iter().map(|a| a.id.clone()).collect();
        let mut actions = decoded.value;
        let pending_in_memory: Vec<OfflineAction> = inner
            .buffer
            .iter()
            .filter(|a| !known.contains(&a.id))
            .cloned()
            .collect();
        let merged = !pending_in_memory.is_empty();
        actions.extend(pending_in_memory);
        inner.buffer.replace_all(actions);

        tracing::info!(
            restored,
            version = decoded.stored_version,
            "queue loaded"
        );

        if decoded.stored_version < sync_types::SCHEMA_VERSION || merged || inner.dirty {
            self.persist_locked(&mut inner).await;
        }
        Ok(inner.buffer.len())
    }

    /// Stop holding the stored snapshot and flush anything held back.
    async fn release(&self) -> usize {
        let mut inner = self.inner.lock().await;
        if inner.held {
            inner.held = false;
            if inner.dirty {
                self.persist_locked(&mut inner).await;
            }
        }
        inner.buffer.len()
    }

    async fn persist_locked(&self, inner: &mut QueueInner) -> bool {
        if inner.held {
            tracing::debug!(
                pending = inner.buffer.len(),
                "queue persist held until the stored snapshot is loaded"
            );
            inner.dirty = true;
            return false;
        }
        let snapshot = inner.buffer.snapshot();
        let raw = match encode_queue(&snapshot) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::error!(error = %e, "queue snapshot could not be encoded");
                inner.dirty = true;
                return false;
            }
        };

        match self.store.set(&self.keys.pending_actions(), &raw).await {
            Ok(()) => {
                if inner.dirty {
                    tracing::info!(pending = snapshot.len(), "queue persisted after earlier failure");
                }
                inner.dirty = false;
                true
            }
            Err(e) => {
                tracing::warn!(
                    pending = snapshot.len(),
                    error = %e,
                    "queue persist failed, will retry on next mutation"
                );
                inner.dirty = true;
                false
            }
        }
    }
}
