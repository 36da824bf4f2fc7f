//! # sync-client
//!
//! Offline-first data access for applications that talk to a remote data
//! service over an unreliable network.
//!
//! ## Features
//!
//! - **Cache**: TTL + LRU read cache, persisted through a pluggable store
//! - **Action queue**: mutations made while offline survive restarts
//! - **Sync engine**: drains the queue on reconnect, on a timer, or on demand,
//!   with retry classification and exponential backoff
//! - **Pluggable edges**: storage ([`KeyValueStore`]), connectivity
//!   ([`NetworkMonitor`]) and the remote service ([`RemoteService`]) are traits
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use offline_sync_client::{ClientConfig, Mutation, OfflineClient, Payload, SqliteStore};
//!
//! let store = Arc::new(SqliteStore::new("offline.db".as_ref()).await?);
//! let client = OfflineClient::builder(store, network, remote)
//!     .config(ClientConfig::from_file("offline.toml".as_ref())?)
//!     .build()?;
//! client.start().await;
//!
//! let payload = Payload::encode(&product)?;
//! client
//!     .write(Mutation::insert("products", payload.clone()), || api.insert(&payload))
//!     .await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod facade;
pub mod keys;
pub mod network;
pub mod queue;
pub mod remote;
pub mod scheduler;
pub mod storage;

pub use cache::CacheStore;
pub use config::{CacheConfig, ClientConfig, ConfigError, SyncConfig};
pub use engine::{DrainReport, FailureSink, SyncEngine, TerminalFailure};
pub use error::{ClientError, ClientResult, QueueError, StorageError, StorageResult};
pub use facade::{Mutation, OfflineClient, OfflineClientBuilder, WriteOutcome};
pub use keys::StorageKeys;
pub use network::{ManualNetworkMonitor, NetworkMonitor, TcpProbeMonitor};
pub use queue::ActionQueue;
pub use remote::{MockRemote, RemoteCall, RemoteService};
pub use storage::{KeyValueStore, MemoryStore, SqliteStore};

pub use sync_core::{
    CacheStats, Clock, DrainTrigger, ManualClock, RetryPolicy, RetryPreset, SystemClock,
    TerminalReason,
};
pub use sync_types::{ActionId, MutationKind, OfflineAction, Payload, RemoteError};
