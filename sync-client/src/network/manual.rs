//! Host-driven network monitor.

use super::{publish, NetworkMonitor};
use std::sync::Arc;
use tokio::sync::watch;

/// A monitor whose status is set explicitly.
///
/// Clones share the same channel.
#[derive(Debug, Clone)]
pub struct ManualNetworkMonitor {
    tx: Arc<watch::Sender<bool>>,
}

impl ManualNetworkMonitor {
    /// Create a monitor with the given initial status.
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(online);
        Self { tx: Arc::new(tx) }
    }

    /// Report a new status. Subscribers are only woken on a real change.
    pub fn set_online(&self, online: bool) {
        if publish(&self.tx, online) {
            tracing::info!(online, "network status changed");
        }
    }
}

impl NetworkMonitor for ManualNetworkMonitor {
    fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}
