//! Persisted TTL + LRU cache.
//!
//! Wraps a [`CacheIndex`] with write-through persistence: each entry is
//! stored under its own key (`<ns>:cache_<key>`) in the versioned entry
//! layout. The in-memory index is authoritative for the life of the
//! process; persistence failures are logged and swallowed.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use sync_core::{CacheIndex, CacheStats, Clock, InsertOutcome, Lookup};
use sync_types::schema::{decode_cache_entry, encode_cache_entry};
use sync_types::{CacheEntry, FormatError};
use tokio::sync::Mutex;

use crate::keys::StorageKeys;
use crate::storage::KeyValueStore;

/// Persisted cache of JSON values.
pub struct CacheStore {
    index: Mutex<CacheIndex<Value>>,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    keys: StorageKeys,
    default_ttl: Duration,
}

impl CacheStore {
    /// Create an empty cache. Does no I/O; call [`load`](Self::load) to
    /// restore persisted entries.
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        keys: StorageKeys,
        default_ttl: Duration,
        max_size: usize,
    ) -> Self {
        Self {
            index: Mutex::new(CacheIndex::new(max_size)),
            store,
            clock,
            keys,
            default_ttl,
        }
    }

    /// Restore persisted entries.
    ///
    /// Expired, unreadable and over-capacity entries are deleted from
    /// storage. Entries from an older layout are rewritten in the current
    /// one. Entries from a newer layout are skipped and left in place.
    pub async fn load(&self) {
        let stored_keys = match self.store.get_all_keys().await {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!(error = %e, "cache load: failed to list keys");
                return;
            }
        };

        let mut entries = Vec::new();
        let mut migrated = Vec::new();
        let mut doomed = Vec::new();

        for stored in stored_keys {
            let Some(key) = self.keys.cache_key_of(&stored) else {
                continue;
            };
            let raw = match self.store.get(&stored).await {
                Ok(Some(raw)) => raw,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(key, error = %e, "cache load: read failed");
                    continue;
                }
            };

            match decode_cache_entry(&raw) {
                Ok(decoded) if decoded.value.key == key => {
                    if decoded.needs_rewrite() {
                        migrated.push(decoded.value.key.clone());
                    }
                    entries.push(decoded.value);
                }
                Ok(_) => {
                    tracing::warn!(key, "cache load: entry key does not match storage key");
                    doomed.push(stored);
                }
                Err(FormatError::UnsupportedVersion { found, supported }) => {
                    tracing::warn!(key, found, supported, "cache load: skipping newer entry");
                }
                Err(e) => {
                    tracing::warn!(key, error = %e, "cache load: dropping unreadable entry");
                    doomed.push(stored);
                }
            }
        }

        let mut index = self.index.lock().await;
        let now = self.clock.now_millis();
        let dropped = index.restore(entries, now);
        doomed.extend(dropped.iter().map(|key| self.keys.cache(key)));

        for key in migrated.iter().filter(|key| !dropped.contains(key)) {
            if let Some(entry) = index.entry(key) {
                self.persist_entry(entry).await;
            }
        }

        tracing::debug!(
            restored = index.len(),
            removed = doomed.len(),
            "cache loaded"
        );
        drop(index);
        self.remove_persisted(&doomed).await;
    }

    /// Insert or overwrite `key` with a serializable value.
    ///
    /// Uses the default TTL when `ttl` is `None`. The only error is failing
    /// to serialize `data`.
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        data: &T,
        ttl: Option<Duration>,
    ) -> Result<(), FormatError> {
        let value = serde_json::to_value(data).map_err(FormatError::Encode)?;
        self.set_value(key, value, ttl).await;
        Ok(())
    }

    /// Insert or overwrite `key` with a JSON value.
    pub async fn set_value(&self, key: &str, data: Value, ttl: Option<Duration>) {
        let ttl = millis(ttl.unwrap_or(self.default_ttl));
        let now = self.clock.now_millis();

        let mut index = self.index.lock().await;
        let outcome = index.insert(CacheEntry::new(key, data, now, ttl), now);
        if let Some(entry) = index.entry(key) {
            self.persist_entry(entry).await;
        }
        drop(index);

        self.remove_outcome(&outcome).await;
    }

    /// Read and deserialize `key`.
    ///
    /// Absent, expired, or not of type `T` all read as `None`.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get_value(key).await?;
        match serde_json::from_value(value) {
            Ok(data) => Some(data),
            Err(e) => {
                tracing::debug!(key, error = %e, "cached value has unexpected shape");
                None
            }
        }
    }

    /// Read `key` as JSON, refreshing its recency and write time.
    pub async fn get_value(&self, key: &str) -> Option<Value> {
        let now = self.clock.now_millis();
        let expired = match self.index.lock().await.get(key, now) {
            Lookup::Hit(value) => return Some(value.clone()),
            Lookup::Expired => true,
            Lookup::Missing => false,
        };
        if expired {
            self.remove_persisted(&[self.keys.cache(key)]).await;
        }
        None
    }

    /// Whether `key` holds a live entry. Expired entries are removed;
    /// recency is left alone.
    pub async fn has(&self, key: &str) -> bool {
        let now = self.clock.now_millis();
        let expired = match self.index.lock().await.peek(key, now) {
            Lookup::Hit(_) => return true,
            Lookup::Expired => true,
            Lookup::Missing => false,
        };
        if expired {
            self.remove_persisted(&[self.keys.cache(key)]).await;
        }
        false
    }

    /// Read-modify-write `key` in one step.
    ///
    /// `reducer` sees the current live value (or `None`) and returns the new
    /// value, or `None` to remove the entry. A new value gets the default
    /// TTL. Returns the live entry that was replaced, for [`revert`](Self::revert).
    pub async fn update<F>(&self, key: &str, reducer: F) -> Option<CacheEntry<Value>>
    where
        F: FnOnce(Option<Value>) -> Option<Value> + Send,
    {
        let now = self.clock.now_millis();
        let mut index = self.index.lock().await;

        let live = index.peek(key, now).hit().is_some();
        let previous = if live { index.entry(key).cloned() } else { None };
        let current = previous.as_ref().map(|entry| entry.data.clone());
        let removed: Vec<String> = match reducer(current) {
            Some(next) => {
                let ttl = millis(self.default_ttl);
                let outcome = index.insert(CacheEntry::new(key, next, now, ttl), now);
                if let Some(entry) = index.entry(key) {
                    self.persist_entry(entry).await;
                }
                outcome.removed().map(|k| self.keys.cache(k)).collect()
            }
            None => {
                index.remove(key);
                vec![self.keys.cache(key)]
            }
        };
        drop(index);

        self.remove_persisted(&removed).await;
        previous
    }

    /// Undo an [`update`](Self::update): put `previous` back, or remove
    /// `key` if there was no live entry before.
    pub async fn revert(&self, key: &str, previous: Option<CacheEntry<Value>>) {
        let now = self.clock.now_millis();
        let mut index = self.index.lock().await;

        let removed: Vec<String> = match previous {
            Some(entry) => {
                let outcome = index.insert(entry, now);
                if let Some(entry) = index.entry(key) {
                    self.persist_entry(entry).await;
                }
                outcome.removed().map(|k| self.keys.cache(k)).collect()
            }
            None => {
                index.remove(key);
                vec![self.keys.cache(key)]
            }
        };
        drop(index);

        tracing::debug!(key, "cache patch reverted");
        self.remove_persisted(&removed).await;
    }

    /// Remove everything (`None`) or every key containing `pattern`.
    pub async fn invalidate(&self, pattern: Option<&str>) {
        let removed = self.index.lock().await.invalidate(pattern);
        tracing::debug!(pattern, removed = removed.len(), "cache invalidated");

        let stored: Vec<String> = removed.iter().map(|key| self.keys.cache(key)).collect();
        self.remove_persisted(&stored).await;
    }

    /// Remove all expired entries. Returns how many were removed.
    pub async fn sweep(&self) -> usize {
        let now = self.clock.now_millis();
        let expired = self.index.lock().await.sweep(now);
        if !expired.is_empty() {
            let stored: Vec<String> = expired.iter().map(|key| self.keys.cache(key)).collect();
            self.remove_persisted(&stored).await;
        }
        expired.len()
    }

    /// Size and capacity.
    pub async fn stats(&self) -> CacheStats {
        self.index.lock().await.stats()
    }

    async fn persist_entry(&self, entry: &CacheEntry<Value>) {
        let raw = match encode_cache_entry(entry) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(key = %entry.key, error = %e, "cache entry not persisted");
                return;
            }
        };
        if let Err(e) = self.store.set(&self.keys.cache(&entry.key), &raw).await {
            tracing::warn!(key = %entry.key, error = %e, "cache entry not persisted");
        }
    }

    async fn remove_outcome(&self, outcome: &InsertOutcome) {
        let stored: Vec<String> = outcome.removed().map(|key| self.keys.cache(key)).collect();
        self.remove_persisted(&stored).await;
    }

    async fn remove_persisted(&self, stored_keys: &[String]) {
        let result = match stored_keys {
            [] => return,
            [single] => self.store.remove(single).await,
            many => self.store.multi_remove(many).await,
        };
        if let Err(e) = result {
            tracing::warn!(count = stored_keys.len(), error = %e, "failed to delete cache keys");
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
