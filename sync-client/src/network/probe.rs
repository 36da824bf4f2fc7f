//! TCP reachability probe.
//!
//! Periodically attempts a TCP connect to a known endpoint (usually the
//! remote data service) and treats success as "online".

use super::{publish, NetworkMonitor};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// Attempt one TCP connect with a timeout.
pub async fn probe_once(address: &str, timeout: Duration) -> bool {
    match tokio::time::timeout(timeout, TcpStream::connect(address)).await {
        Ok(Ok(_stream)) => true,
        Ok(Err(e)) => {
            tracing::debug!(address, error = %e, "probe connect failed");
            false
        }
        Err(_) => {
            tracing::debug!(address, "probe timed out");
            false
        }
    }
}

/// Network monitor backed by a background TCP probe.
///
/// The probe task is aborted when the monitor is dropped.
pub struct TcpProbeMonitor {
    tx: Arc<watch::Sender<bool>>,
    task: JoinHandle<()>,
}

impl TcpProbeMonitor {
    /// Start probing `address` every `every`, giving each attempt `timeout`.
    ///
    /// Reports offline until the first probe completes. Must be called
    /// inside a tokio runtime.
    pub fn spawn(address: impl Into<String>, every: Duration, timeout: Duration) -> Self {
        let address = address.into();
        let (tx, _rx) = watch::channel(false);
        let tx = Arc::new(tx);

        let task_tx = Arc::clone(&tx);
        let task = tokio::spawn(async move {
            tracing::info!(address = %address, "network probe started (interval: {:?})", every);

            let mut timer = interval(every);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                timer.tick().await;
                let online = probe_once(&address, timeout).await;
                if publish(&task_tx, online) {
                    tracing::info!(address = %address, online, "network status changed");
                }
            }
        });

        Self { tx, task }
    }
}

impl NetworkMonitor for TcpProbeMonitor {
    fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Drop for TcpProbeMonitor {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn probe_succeeds_against_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        assert!(probe_once(&addr, Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn probe_fails_against_closed_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        assert!(!probe_once(&addr, Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn monitor_goes_online_when_endpoint_is_reachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let monitor =
            TcpProbeMonitor::spawn(addr, Duration::from_millis(20), Duration::from_secs(1));
        let mut rx = monitor.subscribe();

        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|online| *online))
            .await
            .expect("probe should report online")
            .unwrap();
        assert!(monitor.is_online());
    }
}
