//! Drain state machine for offline-sync.
//!
//! This module provides the pure decisions behind a drain cycle: what to do
//! with one action given the result of its remote call, when a trigger
//! should start a cycle, and when connectivity changed. The sync engine in
//! `sync-client` performs the I/O and applies these decisions.
//!
//! The machine runs over the whole queue, not per action:
//!
//! ```text
//! Idle ──trigger──▶ Draining ──pass complete──▶ Idle
//! ```
//!
//! A trigger that arrives while `Draining` is a no-op.

use std::fmt;
use std::time::Duration;
use sync_types::{OfflineAction, RemoteError};

use crate::retry::RetryPolicy;

/// Whole-queue drain state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DrainState {
    /// No cycle running.
    #[default]
    Idle,
    /// A cycle is in progress; further triggers are ignored.
    Draining,
}

impl DrainState {
    /// Check if a cycle is running.
    pub fn is_draining(&self) -> bool {
        matches!(self, Self::Draining)
    }
}

/// What started a drain cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainTrigger {
    /// Connectivity went from offline to online.
    Reconnected,
    /// Periodic timer (or a backoff wake-up) fired.
    Timer,
    /// Caller asked explicitly.
    Flush,
}

impl DrainTrigger {
    /// Whether this trigger should start a cycle.
    ///
    /// Nothing runs while offline. The timer only runs when there is
    /// something to deliver.
    pub fn should_run(&self, online: bool, pending: usize) -> bool {
        match self {
            _ if !online => false,
            Self::Timer => pending > 0,
            Self::Reconnected | Self::Flush => true,
        }
    }
}

impl fmt::Display for DrainTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Reconnected => "reconnected",
            Self::Timer => "timer",
            Self::Flush => "flush",
        };
        f.write_str(name)
    }
}

/// Why an action was dropped from the queue for good.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalReason {
    /// The remote service rejected it with a non-retryable error.
    Permanent(RemoteError),
    /// Every allowed attempt failed with a retryable error.
    RetriesExhausted {
        /// Failed attempts, equal to the action's `max_retries`.
        attempts: u32,
        /// Error from the final attempt.
        last_error: RemoteError,
    },
}

impl TerminalReason {
    /// The error that ended the action.
    pub fn error(&self) -> &RemoteError {
        match self {
            Self::Permanent(error) => error,
            Self::RetriesExhausted { last_error, .. } => last_error,
        }
    }
}

impl fmt::Display for TerminalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Permanent(error) => write!(f, "permanent failure: {}", error),
            Self::RetriesExhausted {
                attempts,
                last_error,
            } => write!(f, "gave up after {} attempts: {}", attempts, last_error),
        }
    }
}

/// What to do with an action after one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Delivered; remove from the queue.
    Completed,
    /// Retryable failure with attempts left; bump `retry_count` and keep it
    /// for the next cycle.
    Retry,
    /// Remove and report a terminal failure.
    Drop(TerminalReason),
}

/// Decide the fate of one action given its remote call result.
///
/// A retryable failure keeps the action only while `retry_count + 1 <
/// max_retries`, so an always-failing action is dropped after exactly
/// `max_retries` failed cycles.
pub fn decide(
    action: &OfflineAction,
    result: Result<(), &RemoteError>,
    policy: &RetryPolicy,
) -> Outcome {
    let error = match result {
        Ok(()) => return Outcome::Completed,
        Err(error) => error,
    };

    if !policy.is_retryable(error) {
        return Outcome::Drop(TerminalReason::Permanent(error.clone()));
    }

    if action.can_retry() {
        Outcome::Retry
    } else {
        Outcome::Drop(TerminalReason::RetriesExhausted {
            attempts: action.retry_count.saturating_add(1),
            last_error: error.clone(),
        })
    }
}

/// Delay before the next cycle is worth running for deferred actions.
///
/// Uses the highest `retry_count` among the deferred actions as the attempt
/// number, capped by the periodic interval. `None` when nothing is deferred.
pub fn retry_wakeup(
    deferred_retry_counts: impl IntoIterator<Item = u32>,
    policy: &RetryPolicy,
    interval: Duration,
) -> Option<Duration> {
    let attempt = deferred_retry_counts.into_iter().max()?;
    Some(policy.backoff_delay(attempt).min(interval))
}

/// A change in connectivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Offline to online.
    WentOnline,
    /// Online to offline.
    WentOffline,
}

/// Turns a stream of connectivity observations into transitions.
///
/// Repeated observations of the same status produce nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectivityTracker {
    last: Option<bool>,
}

impl ConnectivityTracker {
    /// Create a tracker seeded with the initial status.
    ///
    /// The seed itself is not reported as a transition.
    pub fn new(initial: bool) -> Self {
        Self {
            last: Some(initial),
        }
    }

    /// Record a new observation.
    pub fn observe(&mut self, online: bool) -> Option<Transition> {
        let previous = self.last.replace(online);
        match (previous, online) {
            (Some(false), true) => Some(Transition::WentOnline),
            (Some(true), false) => Some(Transition::WentOffline),
            // First observation for an unseeded tracker.
            (None, true) => Some(Transition::WentOnline),
            (None, false) => Some(Transition::WentOffline),
            _ => None,
        }
    }
}
