//! Background drain scheduler.
//!
//! One task reacts to:
//! - connectivity going offline → online (drain)
//! - the periodic interval (drain when online with pending actions)
//! - a backoff wake-up armed after a cycle that deferred actions
//! - the cache sweep interval, when enabled
//!
//! The returned handle aborts the task; teardown never flushes.

use std::future::pending;
use std::sync::Arc;
use std::time::Duration;
use sync_core::{ConnectivityTracker, DrainTrigger, Transition};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep_until, Instant, Interval, MissedTickBehavior};

use crate::cache::CacheStore;
use crate::engine::{DrainReport, SyncEngine};

/// Spawn the scheduler task.
///
/// The first connectivity observation counts as a transition, so a client
/// that starts online drains whatever the previous run left behind.
pub fn spawn_scheduler(
    engine: Arc<SyncEngine>,
    cache: Arc<CacheStore>,
    mut network: watch::Receiver<bool>,
    sweep_every: Option<Duration>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = engine.interval();
        tracing::info!("Sync scheduler started (interval: {:?}, sweep: {:?})", period, sweep_every);

        let mut timer = interval_at(Instant::now() + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut sweep = sweep_every.map(|every| {
            let mut t = interval_at(Instant::now() + every, every);
            t.set_missed_tick_behavior(MissedTickBehavior::Delay);
            t
        });

        let mut tracker = ConnectivityTracker::default();
        let mut network_open = true;
        let mut backoff: Option<Instant> = None;

        let initial = *network.borrow_and_update();
        if tracker.observe(initial) == Some(Transition::WentOnline) {
            backoff = next_backoff(engine.drain(DrainTrigger::Reconnected).await);
        }

        loop {
            tokio::select! {
                changed = network.changed(), if network_open => {
                    if changed.is_err() {
                        tracing::warn!("network monitor closed, relying on timer only");
                        network_open = false;
                        continue;
                    }
                    let online = *network.borrow_and_update();
                    match tracker.observe(online) {
                        Some(Transition::WentOnline) => {
                            backoff = next_backoff(engine.drain(DrainTrigger::Reconnected).await);
                        }
                        Some(Transition::WentOffline) => {
                            tracing::info!("offline, writes will be queued");
                        }
                        None => {}
                    }
                }
                _ = timer.tick() => {
                    backoff = next_backoff(engine.drain(DrainTrigger::Timer).await);
                }
                _ = wait_until(backoff) => {
                    backoff = next_backoff(engine.drain(DrainTrigger::Timer).await);
                }
                _ = tick(&mut sweep) => {
                    let removed = cache.sweep().await;
                    if removed > 0 {
                        tracing::debug!("Cache sweep: removed {} expired entries", removed);
                    }
                }
            }
        }
    })
}

fn next_backoff(report: DrainReport) -> Option<Instant> {
    report.retry_after.map(|delay| Instant::now() + delay)
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}

async fn tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::StorageKeys;
    use crate::network::{ManualNetworkMonitor, NetworkMonitor};
    use crate::queue::ActionQueue;
    use crate::remote::MockRemote;
    use crate::storage::MemoryStore;
    use sync_core::SystemClock;
    use sync_types::{MutationKind, Payload, RemoteError};

    struct Parts {
        remote: MockRemote,
        network: ManualNetworkMonitor,
        queue: Arc<ActionQueue>,
        engine: Arc<SyncEngine>,
        cache: Arc<CacheStore>,
    }

    fn parts(online: bool, interval: Duration) -> Parts {
        let store = Arc::new(MemoryStore::new());
        let remote = MockRemote::new();
        let network = ManualNetworkMonitor::new(online);
        let keys = StorageKeys::new("@test");
        let queue = Arc::new(ActionQueue::new(
            store.clone(),
            Arc::new(SystemClock),
            keys.clone(),
            100,
            3,
        ));
        let cache = Arc::new(CacheStore::new(
            store.clone(),
            Arc::new(SystemClock),
            keys.clone(),
            Duration::from_secs(60),
            10,
        ));
        let engine = Arc::new(
            SyncEngine::new(
                Arc::clone(&queue),
                Arc::new(remote.clone()),
                Arc::new(network.clone()),
                store,
                Arc::new(SystemClock),
                keys,
            )
            .with_interval(interval),
        );
        Parts {
            remote,
            network,
            queue,
            engine,
            cache,
        }
    }

    async fn enqueue(queue: &ActionQueue) {
        queue
            .enqueue(
                MutationKind::Insert,
                "products",
                None,
                Payload::from_json("{}"),
                None,
            )
            .await
            .unwrap();
    }

    async fn wait_for_empty(queue: &ActionQueue) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !queue.is_empty().await {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("queue should drain");
    }

    #[tokio::test]
    async fn reconnect_triggers_drain() {
        let p = parts(false, Duration::from_secs(3600));
        enqueue(&p.queue).await;

        let handle = spawn_scheduler(
            Arc::clone(&p.engine),
            Arc::clone(&p.cache),
            p.network.subscribe(),
            None,
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(p.remote.call_count(), 0);

        p.network.set_online(true);
        wait_for_empty(&p.queue).await;

        handle.abort();
    }

    #[tokio::test]
    async fn starting_online_drains_leftovers() {
        let p = parts(true, Duration::from_secs(3600));
        enqueue(&p.queue).await;

        let handle = spawn_scheduler(
            Arc::clone(&p.engine),
            Arc::clone(&p.cache),
            p.network.subscribe(),
            None,
        );
        wait_for_empty(&p.queue).await;

        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_wakeup_retries_before_interval() {
        let p = parts(true, Duration::from_secs(3600));
        enqueue(&p.queue).await;
        p.remote.queue_result(Err(RemoteError::Timeout));

        let handle = spawn_scheduler(
            Arc::clone(&p.engine),
            Arc::clone(&p.cache),
            p.network.subscribe(),
            None,
        );

        // First attempt fails at start-up; standard backoff retries after 1s.
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert_eq!(p.remote.call_count(), 2);
        assert!(p.queue.is_empty().await);

        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn timer_drains_periodically() {
        let p = parts(false, Duration::from_secs(30));
        let handle = spawn_scheduler(
            Arc::clone(&p.engine),
            Arc::clone(&p.cache),
            p.network.subscribe(),
            None,
        );

        // Come online with an empty queue, then enqueue behind the
        // scheduler's back: only the timer can pick it up.
        p.network.set_online(true);
        tokio::time::sleep(Duration::from_secs(1)).await;
        enqueue(&p.queue).await;
        assert_eq!(p.remote.call_count(), 0);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(p.remote.call_count(), 1);

        handle.abort();
    }

    #[tokio::test]
    async fn abort_stops_the_task() {
        let p = parts(false, Duration::from_secs(1));
        let handle = spawn_scheduler(
            Arc::clone(&p.engine),
            Arc::clone(&p.cache),
            p.network.subscribe(),
            Some(Duration::from_secs(1)),
        );

        handle.abort();
        let result = handle.await;
        assert!(result.unwrap_err().is_cancelled());
    }
}
