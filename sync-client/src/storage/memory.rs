//! In-memory storage backend.
//!
//! Clones share the same map, so a "restart" in tests is a new client
//! built on a clone of the old store. Failures can be injected to exercise
//! the storage-fault paths.

use super::KeyValueStore;
use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// In-memory key-value store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<MemoryStoreInner>,
}

#[derive(Debug, Default)]
struct MemoryStoreInner {
    entries: DashMap<String, String>,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write (`set`, `remove`, `multi_remove`) fail.
    pub fn fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent read (`get`, `get_all_keys`) fail.
    pub fn fail_reads(&self, fail: bool) {
        self.inner.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Number of successful `set` calls so far.
    pub fn write_count(&self) -> usize {
        self.inner.writes.load(Ordering::SeqCst)
    }

    /// Read a value directly, bypassing failure injection.
    pub fn peek(&self, key: &str) -> Option<String> {
        self.inner.entries.get(key).map(|v| v.value().clone())
    }

    /// Write a value directly, bypassing failure injection.
    pub fn insert_raw(&self, key: impl Into<String>, value: impl Into<String>) {
        self.inner.entries.insert(key.into(), value.into());
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    fn check_write(&self) -> StorageResult<()> {
        if self.inner.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("injected write failure".into()));
        }
        Ok(())
    }

    fn check_read(&self) -> StorageResult<()> {
        if self.inner.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("injected read failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        self.check_read()?;
        Ok(self.peek(key))
    }

    async fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.check_write()?;
        self.inner
            .entries
            .insert(key.to_string(), value.to_string());
        self.inner.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        self.check_write()?;
        self.inner.entries.remove(key);
        Ok(())
    }

    async fn get_all_keys(&self) -> StorageResult<Vec<String>> {
        self.check_read()?;
        Ok(self
            .inner
            .entries
            .iter()
            .map(|entry| entry.key().clone())
            .collect())
    }

    async fn multi_remove(&self, keys: &[String]) -> StorageResult<()> {
        self.check_write()?;
        for key in keys {
            self.inner.entries.remove(key);
        }
        Ok(())
    }
}
