//! TTL + LRU cache index.
//!
//! Holds [`CacheEntry`] values keyed by string with two bounds:
//! - entries whose `written_at + ttl < now` are never returned and are
//!   physically removed when seen
//! - at most `max_size` live entries; inserting a new key into a full index
//!   evicts the least-recently-touched key first, regardless of TTL
//!
//! Recency is an access-order list (front = oldest touch). Touching a key
//! removes its prior occurrence and appends it, so ties fall back to
//! insertion order. O(n) per touch, fine at a few hundred entries.
//!
//! The index never does I/O. Every mutating call reports which keys it
//! removed so the caller can delete their persisted copies.

use std::collections::{HashMap, VecDeque};
use sync_types::CacheEntry;

/// Result of looking a key up.
#[derive(Debug, PartialEq)]
pub enum Lookup<'a, V> {
    /// Live entry.
    Hit(&'a V),
    /// Entry existed but had expired; it has now been removed.
    Expired,
    /// No entry for this key.
    Missing,
}

impl<'a, V> Lookup<'a, V> {
    /// The value, if the lookup hit.
    pub fn hit(self) -> Option<&'a V> {
        match self {
            Self::Hit(value) => Some(value),
            _ => None,
        }
    }
}

/// Keys removed as a side effect of an insert.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InsertOutcome {
    /// Keys removed by the pre-insert expiry sweep.
    pub expired: Vec<String>,
    /// Key evicted to make room, if the index was full.
    pub evicted: Option<String>,
}

impl InsertOutcome {
    /// All keys removed, expired first.
    pub fn removed(&self) -> impl Iterator<Item = &str> {
        self.expired
            .iter()
            .map(String::as_str)
            .chain(self.evicted.as_deref())
    }
}

/// Size snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Entries currently held (live or not yet swept).
    pub size: usize,
    /// Capacity.
    pub max_size: usize,
}

/// In-memory TTL + LRU index.
#[derive(Debug)]
pub struct CacheIndex<V> {
    max_size: usize,
    entries: HashMap<String, CacheEntry<V>>,
    order: VecDeque<String>,
}

impl<V> CacheIndex<V> {
    /// Create an empty index. A capacity of zero is raised to one.
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size: max_size.max(1),
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    /// Insert or overwrite an entry.
    ///
    /// Sweeps expired entries, then evicts one LRU entry if `entry.key` is
    /// new and the index is full, then inserts and marks the key most
    /// recently used.
    pub fn insert(&mut self, entry: CacheEntry<V>, now: u64) -> InsertOutcome {
        let expired = self.sweep(now);

        let mut evicted = None;
        if !self.entries.contains_key(&entry.key) && self.entries.len() >= self.max_size {
            evicted = self.evict_oldest();
        }

        self.touch(&entry.key);
        self.entries.insert(entry.key.clone(), entry);

        InsertOutcome { expired, evicted }
    }

    /// Look up a live entry, refreshing its recency and `written_at`.
    pub fn get(&mut self, key: &str, now: u64) -> Lookup<'_, V> {
        if self.purge_if_expired(key, now) {
            return Lookup::Expired;
        }
        if !self.entries.contains_key(key) {
            return Lookup::Missing;
        }

        self.touch(key);
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.written_at = now;
                Lookup::Hit(&entry.data)
            }
            None => Lookup::Missing,
        }
    }

    /// Look up a live entry without touching recency.
    ///
    /// Expired entries are still removed.
    pub fn peek(&mut self, key: &str, now: u64) -> Lookup<'_, V> {
        if self.purge_if_expired(key, now) {
            return Lookup::Expired;
        }
        match self.entries.get(key) {
            Some(entry) => Lookup::Hit(&entry.data),
            None => Lookup::Missing,
        }
    }

    /// Full entry for `key`, expired or not. No side effects.
    pub fn entry(&self, key: &str) -> Option<&CacheEntry<V>> {
        self.entries.get(key)
    }

    /// Remove one key.
    pub fn remove(&mut self, key: &str) -> Option<CacheEntry<V>> {
        let entry = self.entries.remove(key)?;
        self.forget(key);
        Some(entry)
    }

    /// Remove everything (`None`) or every key containing `pattern`.
    ///
    /// Plain substring match. Returns the removed keys.
    pub fn invalidate(&mut self, pattern: Option<&str>) -> Vec<String> {
        let doomed: Vec<String> = match pattern {
            None => self.order.iter().cloned().collect(),
            Some(pattern) => self
                .order
                .iter()
                .filter(|key| key.contains(pattern))
                .cloned()
                .collect(),
        };

        for key in &doomed {
            self.remove(key);
        }
        doomed
    }

    /// Remove every expired entry. Returns the removed keys.
    pub fn sweep(&mut self, now: u64) -> Vec<String> {
        let expired: Vec<String> = self
            .order
            .iter()
            .filter(|key| {
                self.entries
                    .get(key.as_str())
                    .is_some_and(|entry| entry.is_expired(now))
            })
            .cloned()
            .collect();

        for key in &expired {
            self.remove(key);
        }
        expired
    }

    /// Rebuild from persisted entries.
    ///
    /// Entries are replayed oldest `written_at` first so the freshest end
    /// up most recently used. Expired entries and any overflow beyond
    /// capacity are dropped; their keys are returned.
    pub fn restore(&mut self, mut entries: Vec<CacheEntry<V>>, now: u64) -> Vec<String> {
        entries.sort_by_key(|entry| entry.written_at);

        let mut dropped = Vec::new();
        for entry in entries {
            if entry.is_expired(now) {
                dropped.push(entry.key);
                continue;
            }
            let outcome = self.insert(entry, now);
            dropped.extend(outcome.expired);
            dropped.extend(outcome.evicted);
        }
        dropped
    }

    /// Keys from least to most recently used.
    pub fn keys_by_recency(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Number of entries held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Size and capacity.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.entries.len(),
            max_size: self.max_size,
        }
    }

    fn purge_if_expired(&mut self, key: &str, now: u64) -> bool {
        let expired = self
            .entries
            .get(key)
            .is_some_and(|entry| entry.is_expired(now));
        if expired {
            self.remove(key);
        }
        expired
    }

    fn evict_oldest(&mut self) -> Option<String> {
        let key = self.order.pop_front()?;
        self.entries.remove(&key);
        Some(key)
    }

    fn touch(&mut self, key: &str) {
        self.forget(key);
        self.order.push_back(key.to_string());
    }

    fn forget(&mut self, key: &str) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
    }
}
