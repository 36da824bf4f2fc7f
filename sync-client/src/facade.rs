//! The offline client: the one object application code depends on.
//!
//! Lifecycle is two-phase. [`OfflineClientBuilder::build`] wires the
//! components together without any I/O; [`OfflineClient::start`] loads
//! persisted state and spawns the scheduler. Every other entry point also
//! performs the one-time load if `start` has not run yet, so a client is
//! usable even before it is started (it just won't drain in the
//! background).

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use sync_core::{CacheStats, Clock, DrainTrigger, SystemClock};
use sync_types::{ActionId, MutationKind, Payload, RemoteError};
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;

use crate::cache::CacheStore;
use crate::config::ClientConfig;
use crate::engine::{DrainReport, FailureSink, SyncEngine};
use crate::error::{ClientResult, QueueError, StorageError};
use crate::keys::StorageKeys;
use crate::network::NetworkMonitor;
use crate::queue::ActionQueue;
use crate::remote::RemoteService;
use crate::scheduler::spawn_scheduler;
use crate::storage::KeyValueStore;

type Reducer = Box<dyn FnOnce(Option<Value>) -> Option<Value> + Send>;

/// An optimistic cache change applied alongside a write.
pub struct CachePatch {
    key: String,
    reducer: Reducer,
}

impl std::fmt::Debug for CachePatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachePatch").field("key", &self.key).finish()
    }
}

/// A mutation to deliver to the remote service.
#[derive(Debug)]
pub struct Mutation {
    kind: MutationKind,
    collection: String,
    record_key: Option<String>,
    payload: Payload,
    max_retries: Option<u32>,
    patch: Option<CachePatch>,
}

impl Mutation {
    /// Create a record.
    pub fn insert(collection: impl Into<String>, payload: Payload) -> Self {
        Self::new(MutationKind::Insert, collection, None, payload)
    }

    /// Modify the record `key`.
    pub fn update(collection: impl Into<String>, key: impl Into<String>, payload: Payload) -> Self {
        Self::new(MutationKind::Update, collection, Some(key.into()), payload)
    }

    /// Remove the record `key`.
    pub fn delete(collection: impl Into<String>, key: impl Into<String>) -> Self {
        Self::new(
            MutationKind::Delete,
            collection,
            Some(key.into()),
            Payload::from_json("null"),
        )
    }

    fn new(
        kind: MutationKind,
        collection: impl Into<String>,
        record_key: Option<String>,
        payload: Payload,
    ) -> Self {
        Self {
            kind,
            collection: collection.into(),
            record_key,
            payload,
            max_retries: None,
            patch: None,
        }
    }

    /// Override the retry ceiling if this mutation ends up queued.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Apply `reducer` to cache entry `key` so reads reflect the write
    /// before the remote service confirms it.
    pub fn with_cache_patch<F>(mut self, key: impl Into<String>, reducer: F) -> Self
    where
        F: FnOnce(Option<Value>) -> Option<Value> + Send + 'static,
    {
        self.patch = Some(CachePatch {
            key: key.into(),
            reducer: Box::new(reducer),
        });
        self
    }

    /// Mutation verb.
    pub fn kind(&self) -> MutationKind {
        self.kind
    }

    /// Target collection.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Record key, for updates and deletes.
    pub fn record_key(&self) -> Option<&str> {
        self.record_key.as_deref()
    }

    /// Serialized payload.
    pub fn payload(&self) -> &Payload {
        &self.payload
    }
}

/// What happened to a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The direct remote call succeeded.
    Delivered,
    /// The mutation was queued for a later drain.
    Queued(ActionId),
}

/// Builder for [`OfflineClient`].
pub struct OfflineClientBuilder {
    store: Arc<dyn KeyValueStore>,
    network: Arc<dyn NetworkMonitor>,
    remote: Arc<dyn RemoteService>,
    config: ClientConfig,
    clock: Arc<dyn Clock>,
    sink: Option<Arc<dyn FailureSink>>,
}

impl OfflineClientBuilder {
    /// Use this configuration instead of the defaults.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Use this clock instead of wall-clock time.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Deliver terminal failures to `sink`.
    pub fn failure_sink(mut self, sink: Arc<dyn FailureSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Wire the components together. Does no I/O.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn build(self) -> ClientResult<OfflineClient> {
        self.config.validate()?;

        let keys = StorageKeys::new(self.config.namespace.clone());
        let policy = self.config.retry_policy();

        let cache = Arc::new(CacheStore::new(
            Arc::clone(&self.store),
            Arc::clone(&self.clock),
            keys.clone(),
            self.config.cache_ttl(),
            self.config.cache.max_size,
        ));
        let queue = Arc::new(ActionQueue::new(
            Arc::clone(&self.store),
            Arc::clone(&self.clock),
            keys.clone(),
            self.config.sync.max_pending,
            policy.max_attempts,
        ));

        let mut engine = SyncEngine::new(
            Arc::clone(&queue),
            Arc::clone(&self.remote),
            Arc::clone(&self.network),
            Arc::clone(&self.store),
            Arc::clone(&self.clock),
            keys,
        )
        .with_policy(policy)
        .with_interval(self.config.sync_interval());
        if let Some(sink) = self.sink {
            engine = engine.with_failure_sink(sink);
        }

        Ok(OfflineClient {
            config: self.config,
            network: self.network,
            cache,
            queue,
            engine: Arc::new(engine),
            loaded: OnceCell::new(),
            queue_loaded: OnceCell::new(),
            scheduler: Mutex::new(None),
        })
    }
}

/// Offline-first client: cached reads, queued writes, background sync.
pub struct OfflineClient {
    config: ClientConfig,
    network: Arc<dyn NetworkMonitor>,
    cache: Arc<CacheStore>,
    queue: Arc<ActionQueue>,
    engine: Arc<SyncEngine>,
    loaded: OnceCell<()>,
    queue_loaded: OnceCell<()>,
    scheduler: Mutex<Option<JoinHandle<()>>>,
}

impl OfflineClient {
    /// Start building a client over the given collaborators.
    pub fn builder(
        store: Arc<dyn KeyValueStore>,
        network: Arc<dyn NetworkMonitor>,
        remote: Arc<dyn RemoteService>,
    ) -> OfflineClientBuilder {
        OfflineClientBuilder {
            store,
            network,
            remote,
            config: ClientConfig::default(),
            clock: Arc::new(SystemClock),
            sink: None,
        }
    }

    /// Load persisted state and start background syncing.
    ///
    /// Calling it again is a no-op. Must be called inside a tokio runtime.
    pub async fn start(&self) {
        self.ensure_loaded().await;

        let mut scheduler = match self.scheduler.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if scheduler.is_none() {
            *scheduler = Some(spawn_scheduler(
                Arc::clone(&self.engine),
                Arc::clone(&self.cache),
                self.network.subscribe(),
                self.config.sweep_interval(),
            ));
            tracing::info!(namespace = %self.config.namespace, "offline client started");
        }
    }

    /// Stop background syncing and drop the network subscription.
    ///
    /// Pending actions are not flushed; they stay persisted for the next
    /// start.
    pub fn shutdown(&self) {
        let handle = match self.scheduler.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            handle.abort();
            tracing::info!(namespace = %self.config.namespace, "offline client stopped");
        }
    }

    /// Read a cached value.
    pub async fn cache_read<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.ensure_loaded().await;
        self.cache.get(key).await
    }

    /// Write a cached value, with the default TTL when `ttl` is `None`.
    pub async fn cache_write<T: Serialize + ?Sized>(
        &self,
        key: &str,
        data: &T,
        ttl: Option<Duration>,
    ) -> ClientResult<()> {
        self.ensure_loaded().await;
        self.cache.set(key, data, ttl).await?;
        Ok(())
    }

    /// Whether `key` holds a live cache entry.
    pub async fn cache_has(&self, key: &str) -> bool {
        self.ensure_loaded().await;
        self.cache.has(key).await
    }

    /// Drop every cache entry, or those whose key contains `pattern`.
    pub async fn invalidate(&self, pattern: Option<&str>) {
        self.ensure_loaded().await;
        self.cache.invalidate(pattern).await;
    }

    /// Apply a mutation.
    ///
    /// The cache patch (if any) is applied first. When online, `remote_call`
    /// is tried directly; on success the write is done. When offline, or
    /// when the direct call fails for any reason, the mutation is queued
    /// and delivered by a later drain. If it cannot be queued either, the
    /// cache patch is reverted.
    ///
    /// # Errors
    ///
    /// Only when the mutation cannot be queued: an update or delete without
    /// a record key, or a full queue.
    pub async fn write<F, Fut>(&self, mutation: Mutation, remote_call: F) -> ClientResult<WriteOutcome>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<(), RemoteError>> + Send,
    {
        self.ensure_loaded().await;

        let Mutation {
            kind,
            collection,
            record_key,
            payload,
            max_retries,
            patch,
        } = mutation;

        if kind.requires_record_key() && record_key.as_deref().map_or(true, str::is_empty) {
            return Err(QueueError::InvalidMutation(sync_types::FormatError::MissingRecordKey {
                kind,
            })
            .into());
        }

        let online = self.network.is_online();
        if !online {
            self.queue.ensure_room().await?;
        }

        let mut patched = None;
        if let Some(CachePatch { key, reducer }) = patch {
            let previous = self.cache.update(&key, reducer).await;
            patched = Some((key, previous));
        }

        if online {
            match remote_call().await {
                Ok(()) => {
                    tracing::debug!(%kind, collection = %collection, "write delivered directly");
                    return Ok(WriteOutcome::Delivered);
                }
                Err(e) => {
                    tracing::info!(%kind, collection = %collection, error = %e, "direct write failed, queueing");
                }
            }
        }

        match self
            .queue
            .enqueue(kind, &collection, record_key, payload, max_retries)
            .await
        {
            Ok(id) => Ok(WriteOutcome::Queued(id)),
            Err(e) => {
                if let Some((key, previous)) = patched {
                    self.cache.revert(&key, previous).await;
                }
                Err(e.into())
            }
        }
    }

    /// Run a drain cycle now. A no-op while offline.
    pub async fn flush(&self) -> DrainReport {
        self.ensure_loaded().await;
        self.engine.drain(DrainTrigger::Flush).await
    }

    /// Number of queued actions.
    pub async fn pending_count(&self) -> usize {
        self.ensure_loaded().await;
        self.queue.len().await
    }

    /// Current network status.
    pub fn network_status(&self) -> bool {
        self.network.is_online()
    }

    /// Epoch millis of the last drain that delivered something.
    pub async fn last_sync_at(&self) -> Option<u64> {
        self.ensure_loaded().await;
        self.engine.last_sync_at()
    }

    /// Cache size and capacity.
    pub async fn cache_stats(&self) -> CacheStats {
        self.ensure_loaded().await;
        self.cache.stats().await
    }

    /// The configuration in use.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    async fn ensure_loaded(&self) {
        self.loaded
            .get_or_init(|| async {
                self.cache.load().await;
                self.engine.load_last_sync().await;
            })
            .await;

        // Retried by every entry point until the stored snapshot is read.
        let restored = self
            .queue_loaded
            .get_or_try_init(|| async {
                let pending = self.queue.load().await?;
                tracing::debug!(pending, "offline state loaded");
                Ok::<(), StorageError>(())
            })
            .await;
        if let Err(e) = restored {
            tracing::debug!(error = %e, "pending actions not restored yet");
        }
    }
}

impl Drop for OfflineClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}
