//! In-memory action buffer.
//!
//! Holds queued [`OfflineAction`]s with:
//! - FIFO ordering by enqueue order, across all collections
//! - Max size limit so an offline client cannot grow without bound
//! - Lookup by [`ActionId`] for the per-action bookkeeping a drain cycle does
//!
//! The buffer is the in-memory half of the durable queue; `sync-client`
//! persists a snapshot of it after every mutation.

use std::collections::VecDeque;
use sync_types::{ActionId, OfflineAction};
use thiserror::Error;

/// Error type for buffer operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BufferError {
    /// Buffer is at capacity.
    #[error("buffer full (capacity: {capacity})")]
    Full {
        /// Current buffer capacity.
        capacity: usize,
    },
}

/// FIFO buffer of pending actions.
#[derive(Debug)]
pub struct ActionBuffer {
    max_size: usize,
    actions: VecDeque<OfflineAction>,
}

impl ActionBuffer {
    /// Create a new buffer with the given maximum size.
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            actions: VecDeque::new(),
        }
    }

    /// Append an action.
    ///
    /// Returns an error if the buffer already holds `max_size` actions.
    pub fn push(&mut self, action: OfflineAction) -> Result<(), BufferError> {
        if self.actions.len() >= self.max_size {
            return Err(BufferError::Full {
                capacity: self.max_size,
            });
        }
        self.actions.push_back(action);
        Ok(())
    }

    /// Copy of all actions in FIFO order.
    pub fn snapshot(&self) -> Vec<OfflineAction> {
        self.actions.iter().cloned().collect()
    }

    /// Increment an action's retry count. Returns the new count.
    pub fn mark_retried(&mut self, id: &ActionId) -> Option<u32> {
        let action = self.actions.iter_mut().find(|a| &a.id == id)?;
        action.retry_count = action.retry_count.saturating_add(1);
        Some(action.retry_count)
    }

    /// Remove an action by id.
    pub fn remove(&mut self, id: &ActionId) -> Option<OfflineAction> {
        let pos = self.actions.iter().position(|a| &a.id == id)?;
        self.actions.remove(pos)
    }

    /// Replace the contents wholesale (used when loading from storage).
    ///
    /// Capacity is not enforced here; restored actions are never dropped.
    pub fn replace_all(&mut self, actions: Vec<OfflineAction>) {
        self.actions = actions.into();
    }

    /// Iterate in FIFO order.
    pub fn iter(&self) -> impl Iterator<Item = &OfflineAction> {
        self.actions.iter()
    }

    /// Number of queued actions.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        self.max_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sync_types::{MutationKind, Payload};

    fn make_action(name: &str) -> OfflineAction {
        OfflineAction::new(
            MutationKind::Insert,
            "products",
            None,
            Payload::from_json(format!(r#"{{"name":"{}"}}"#, name)),
            1_000,
            3,
        )
        .unwrap()
    }

    #[test]
    fn buffer_queues_actions() {
        let mut buffer = ActionBuffer::new(100);
        buffer.push(make_action("a")).unwrap();
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn buffer_respects_max_size() {
        let mut buffer = ActionBuffer::new(2);

        buffer.push(make_action("a")).unwrap();
        buffer.push(make_action("b")).unwrap();
        let overflow = buffer.push(make_action("c"));

        assert_eq!(overflow, Err(BufferError::Full { capacity: 2 }));
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn snapshot_is_fifo() {
        let mut buffer = ActionBuffer::new(100);
        let a = make_action("a");
        let b = make_action("b");
        let c = make_action("c");
        let ids = vec![a.id.clone(), b.id.clone(), c.id.clone()];

        buffer.push(a).unwrap();
        buffer.push(b).unwrap();
        buffer.push(c).unwrap();

        let snapshot: Vec<_> = buffer.snapshot().into_iter().map(|a| a.id).collect();
        assert_eq!(snapshot, ids);
    }

    #[test]
    fn snapshot_is_a_copy() {
        let mut buffer = ActionBuffer::new(100);
        buffer.push(make_action("a")).unwrap();

        let mut snapshot = buffer.snapshot();
        snapshot[0].retry_count = 99;

        assert_eq!(buffer.iter().next().map(|a| a.retry_count), Some(0));
    }

    #[test]
    fn mark_retried_increments() {
        let mut buffer = ActionBuffer::new(100);
        let action = make_action("a");
        let id = action.id.clone();
        buffer.push(action).unwrap();

        assert_eq!(buffer.mark_retried(&id), Some(1));
        assert_eq!(buffer.mark_retried(&id), Some(2));
    }

    #[test]
    fn remove_frees_space_and_keeps_order() {
        let mut buffer = ActionBuffer::new(2);
        let a = make_action("a");
        let b = make_action("b");
        let a_id = a.id.clone();
        let b_id = b.id.clone();

        buffer.push(a).unwrap();
        buffer.push(b).unwrap();
        assert!(buffer.remove(&a_id).is_some());

        let c = make_action("c");
        let c_id = c.id.clone();
        buffer.push(c).unwrap();

        let ids: Vec<_> = buffer.iter().map(|a| a.id.clone()).collect();
        assert_eq!(ids, vec![b_id, c_id]);
    }

    #[test]
    fn unknown_id_is_no_op() {
        let mut buffer = ActionBuffer::new(100);
        let fake = ActionId::from_string("0-none");

        assert_eq!(buffer.mark_retried(&fake), None);
        assert!(buffer.remove(&fake).is_none());
    }

    #[test]
    fn replace_all_ignores_capacity() {
        let mut buffer = ActionBuffer::new(1);
        buffer.replace_all(vec![make_action("a"), make_action("b")]);
        assert_eq!(buffer.len(), 2);
        assert!(buffer.push(make_action("c")).is_err());
    }
}
