//! Sync engine: drains the action queue against the remote service.
//!
//! One drain cycle is a single pass over a snapshot of the queue in FIFO
//! order, one attempt per action:
//! - success removes the action
//! - a retryable failure with attempts left bumps `retry_count` and keeps
//!   the action for a later cycle
//! - anything else removes the action and reports a [`TerminalFailure`]
//!
//! The queue is persisted once after the pass. No cycle ever sleeps; backoff
//! is expressed as [`DrainReport::retry_after`], which the scheduler uses to
//! arm its next wake-up. Concurrent drains are excluded with an atomic flag.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use sync_core::{
    decide, retry_wakeup, Clock, DrainState, DrainTrigger, Outcome, RetryPolicy, TerminalReason,
};
use sync_types::OfflineAction;
use tokio::sync::mpsc;

use crate::keys::StorageKeys;
use crate::network::NetworkMonitor;
use crate::queue::ActionQueue;
use crate::remote::{self, RemoteService};
use crate::storage::KeyValueStore;

/// An action dropped from the queue for good.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalFailure {
    /// The action as it was when it failed.
    pub action: OfflineAction,
    /// Why it will not be retried.
    pub reason: TerminalReason,
}

/// Receives terminal failures, exactly once per dropped action.
pub trait FailureSink: Send + Sync {
    /// Handle one terminal failure.
    fn report(&self, failure: TerminalFailure);
}

impl<F> FailureSink for F
where
    F: Fn(TerminalFailure) + Send + Sync,
{
    fn report(&self, failure: TerminalFailure) {
        self(failure)
    }
}

impl FailureSink for mpsc::UnboundedSender<TerminalFailure> {
    fn report(&self, failure: TerminalFailure) {
        if self.send(failure).is_err() {
            tracing::debug!("failure sink receiver dropped");
        }
    }
}

/// Summary of one drain call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Actions attempted.
    pub attempted: usize,
    /// Actions delivered and removed.
    pub succeeded: usize,
    /// Actions kept for a later cycle.
    pub retried: usize,
    /// Actions removed as terminal failures.
    pub dropped: usize,
    /// The call did nothing (offline, nothing to do, or another drain was
    /// running).
    pub skipped: bool,
    /// When the next cycle is worth running for the retried actions.
    pub retry_after: Option<Duration>,
}

impl DrainReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

/// Clears the in-progress flag when the cycle ends, however it ends.
struct DrainGuard<'a>(&'a AtomicBool);

impl<'a> DrainGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Drains the queue; owns `last_sync`.
pub struct SyncEngine {
    queue: Arc<ActionQueue>,
    remote: Arc<dyn RemoteService>,
    network: Arc<dyn NetworkMonitor>,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    keys: StorageKeys,
    policy: RetryPolicy,
    interval: Duration,
    sink: Arc<dyn FailureSink>,
    in_progress: AtomicBool,
    /// Epoch millis of the last successful drain, 0 = never.
    last_sync: AtomicU64,
}

impl SyncEngine {
    /// Create an engine with the standard retry policy, a 30s interval and
    /// a sink that discards failures (they are still logged).
    pub fn new(
        queue: Arc<ActionQueue>,
        remote: Arc<dyn RemoteService>,
        network: Arc<dyn NetworkMonitor>,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        keys: StorageKeys,
    ) -> Self {
        Self {
            queue,
            remote,
            network,
            store,
            clock,
            keys,
            policy: RetryPolicy::standard(),
            interval: Duration::from_secs(30),
            sink: Arc::new(|_: TerminalFailure| {}),
            in_progress: AtomicBool::new(false),
            last_sync: AtomicU64::new(0),
        }
    }

    /// Use this retry policy.
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Periodic drain interval; also caps backoff wake-ups.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Deliver terminal failures to `sink`.
    pub fn with_failure_sink(mut self, sink: Arc<dyn FailureSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Run one drain cycle.
    ///
    /// Never fails. Returns a skipped report when offline, when a timer
    /// fires on an empty queue, or when another cycle is already running.
    pub async fn drain(&self, trigger: DrainTrigger) -> DrainReport {
        let online = self.network.is_online();
        let pending = self.queue.len().await;
        if !trigger.should_run(online, pending) {
            tracing::debug!(%trigger, online, pending, "drain skipped");
            return DrainReport::skipped();
        }

        let Some(_guard) = DrainGuard::acquire(&self.in_progress) else {
            tracing::debug!(%trigger, "drain already in progress");
            return DrainReport::skipped();
        };

        let actions = self.queue.drainable().await;
        tracing::debug!(%trigger, pending = actions.len(), "drain started");

        let mut report = DrainReport::default();
        let mut removed = Vec::new();
        let mut retried = Vec::new();
        let mut deferred_counts = Vec::new();
        let mut failures = Vec::new();

        for action in actions {
            report.attempted += 1;
            let result = remote::execute(self.remote.as_ref(), &action).await;

            match decide(&action, result.as_ref().map(|_| ()), &self.policy) {
                Outcome::Completed => {
                    tracing::debug!(
                        action_id = %action.id,
                        collection = %action.collection,
                        "action delivered"
                    );
                    report.succeeded += 1;
                    removed.push(action.id.clone());
                }
                Outcome::Retry => {
                    let attempt = action.retry_count.saturating_add(1);
                    tracing::debug!(
                        action_id = %action.id,
                        attempt,
                        max_retries = action.max_retries,
                        error = ?result.err(),
                        "action deferred to next cycle"
                    );
                    report.retried += 1;
                    retried.push(action.id.clone());
                    deferred_counts.push(attempt);
                }
                Outcome::Drop(reason) => {
                    tracing::warn!(
                        action_id = %action.id,
                        collection = %action.collection,
                        kind = %action.kind,
                        reason = %reason,
                        "action dropped"
                    );
                    report.dropped += 1;
                    removed.push(action.id.clone());
                    failures.push(TerminalFailure { action, reason });
                }
            }
        }

        self.queue.apply_cycle(&removed, &retried).await;

        for failure in failures {
            self.sink.report(failure);
        }

        if report.succeeded > 0 {
            self.record_sync().await;
        }

        report.retry_after = retry_wakeup(deferred_counts, &self.policy, self.interval);

        tracing::info!(
            %trigger,
            attempted = report.attempted,
            succeeded = report.succeeded,
            retried = report.retried,
            dropped = report.dropped,
            "drain finished"
        );
        report
    }

    /// Restore `last_sync` from storage.
    pub async fn load_last_sync(&self) {
        match self.store.get(&self.keys.last_sync()).await {
            Ok(Some(raw)) => match raw.trim().parse::<u64>() {
                Ok(millis) => self.last_sync.store(millis, Ordering::SeqCst),
                Err(e) => tracing::warn!(raw = %raw, error = %e, "ignoring unreadable last_sync"),
            },
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "failed to read last_sync"),
        }
    }

    /// Epoch millis of the last drain that delivered at least one action.
    pub fn last_sync_at(&self) -> Option<u64> {
        match self.last_sync.load(Ordering::SeqCst) {
            0 => None,
            millis => Some(millis),
        }
    }

    /// Whether a cycle is running right now.
    pub fn drain_state(&self) -> DrainState {
        if self.in_progress.load(Ordering::Acquire) {
            DrainState::Draining
        } else {
            DrainState::Idle
        }
    }

    /// Current network status.
    pub fn is_online(&self) -> bool {
        self.network.is_online()
    }

    /// The retry policy in use.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// The periodic drain interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    async fn record_sync(&self) {
        let now = self.clock.now_millis();
        self.last_sync.store(now, Ordering::SeqCst);
        if let Err(e) = self
            .store
            .set(&self.keys.last_sync(), &now.to_string())
            .await
        {
            tracing::warn!(error = %e, "failed to persist last_sync");
        }
    }
}
