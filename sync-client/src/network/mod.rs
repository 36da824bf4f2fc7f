//! Connectivity monitoring.
//!
//! A monitor exposes the current online status and a change subscription
//! backed by a `tokio::sync::watch` channel. Dropping the receiver is the
//! unsubscribe.
//!
//! - [`ManualNetworkMonitor`] is driven by the host (platform connectivity
//!   callbacks) or by tests.
//! - [`TcpProbeMonitor`] polls a TCP endpoint and publishes what it sees.

mod manual;
mod probe;

pub use manual::ManualNetworkMonitor;
pub use probe::{probe_once, TcpProbeMonitor};

use tokio::sync::watch;

/// Source of connectivity status.
pub trait NetworkMonitor: Send + Sync {
    /// Current status.
    fn is_online(&self) -> bool;

    /// Subscribe to status changes.
    ///
    /// The receiver's current value is the status at subscription time.
    fn subscribe(&self) -> watch::Receiver<bool>;
}

/// Publish `online` only if it differs from the current value.
///
/// Returns whether a change was published.
pub(crate) fn publish(tx: &watch::Sender<bool>, online: bool) -> bool {
    tx.send_if_modified(|current| {
        if *current == online {
            false
        } else {
            *current = online;
            true
        }
    })
}
