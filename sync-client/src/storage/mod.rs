//! Key-value storage for sync-client.
//!
//! The engine's only I/O primitive: a scoped, asynchronous, durable
//! key → string store. Hosts supply their own implementation or use one of
//! the bundled backends.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::StorageResult;
use async_trait::async_trait;

/// Trait for key-value storage backends.
///
/// All operations are fallible. The cache and queue log failures and keep
/// going; they never surface them to callers.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value.
    async fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Write a value, replacing any previous one.
    async fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Delete a value. Deleting a missing key is not an error.
    async fn remove(&self, key: &str) -> StorageResult<()>;

    /// List every stored key.
    async fn get_all_keys(&self) -> StorageResult<Vec<String>>;

    /// Delete several values.
    async fn multi_remove(&self, keys: &[String]) -> StorageResult<()>;
}
