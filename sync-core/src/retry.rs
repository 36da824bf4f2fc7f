//! Retry policy: failure classification and exponential backoff.
//!
//! Pure functions, no I/O. The sync engine asks [`RetryPolicy::is_retryable`]
//! whether a failed action stays queued, and uses [`RetryPolicy::backoff_delay`]
//! to decide when the next drain cycle is worth running. Backoff happens
//! across cycles, never inside one.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;
use sync_types::RemoteError;

/// How a remote failure should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Worth retrying later (network trouble, timeouts, 5xx, 408, 429).
    Transient,
    /// Will never succeed as-is (validation, conflicts, other 4xx).
    Permanent,
}

/// Named parameter sets for different classes of operation.
///
/// Presets only change the numbers, never the algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RetryPreset {
    /// 3 attempts, 1s base, factor 2.
    #[default]
    Standard,
    /// 5 attempts, 0.5s base, factor 1.5, 5s ceiling.
    NetworkHeavy,
    /// 6 attempts, 2s base, factor 2, 30s ceiling.
    Critical,
}

/// Retry parameters plus the set of service error codes treated as transient.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Attempts allowed before an action is dropped.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub base_delay: Duration,
    /// Multiplier applied per further attempt.
    pub factor: f64,
    /// Ceiling for any single delay.
    pub max_delay: Duration,
    transient_codes: BTreeSet<String>,
}

impl RetryPolicy {
    /// Create a policy from raw parameters.
    pub fn new(max_attempts: u32, base_delay: Duration, factor: f64, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            factor,
            max_delay,
            transient_codes: BTreeSet::new(),
        }
    }

    /// 3 attempts, 1s base, factor 2.
    pub fn standard() -> Self {
        Self::new(3, Duration::from_secs(1), 2.0, Duration::from_secs(30))
    }

    /// 5 attempts, 0.5s base, factor 1.5, 5s ceiling.
    pub fn network_heavy() -> Self {
        Self::new(5, Duration::from_millis(500), 1.5, Duration::from_secs(5))
    }

    /// 6 attempts, 2s base, factor 2, 30s ceiling.
    pub fn critical() -> Self {
        Self::new(6, Duration::from_secs(2), 2.0, Duration::from_secs(30))
    }

    /// Build the policy for a named preset.
    pub fn from_preset(preset: RetryPreset) -> Self {
        match preset {
            RetryPreset::Standard => Self::standard(),
            RetryPreset::NetworkHeavy => Self::network_heavy(),
            RetryPreset::Critical => Self::critical(),
        }
    }

    /// Treat these remote-service error codes as transient.
    pub fn with_transient_codes<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.transient_codes.extend(codes.into_iter().map(Into::into));
        self
    }

    /// Classify a remote failure.
    pub fn classify(&self, error: &RemoteError) -> FailureClass {
        match error {
            RemoteError::Network(_) | RemoteError::Timeout | RemoteError::ConnectionReset => {
                FailureClass::Transient
            }
            RemoteError::Service { status, code, .. } => {
                let transient_code = code
                    .as_ref()
                    .is_some_and(|c| self.transient_codes.contains(c));
                let transient_status = status.is_some_and(is_transient_status);
                if transient_code || transient_status {
                    FailureClass::Transient
                } else {
                    FailureClass::Permanent
                }
            }
            RemoteError::Validation(_)
            | RemoteError::Conflict(_)
            | RemoteError::MalformedPayload(_) => FailureClass::Permanent,
        }
    }

    /// Whether a failure should leave the action queued for another cycle.
    pub fn is_retryable(&self, error: &RemoteError) -> bool {
        self.classify(error) == FailureClass::Transient
    }

    /// Delay before the given 1-based attempt, using this policy's numbers.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        backoff_delay(attempt, self.base_delay, self.factor, self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

fn is_transient_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 500..=599)
}

/// `min(base * factor^(attempt-1), max_delay)`; `attempt` is 1-based.
///
/// Attempt 0 is treated as attempt 1.
pub fn backoff_delay(attempt: u32, base: Duration, factor: f64, max_delay: Duration) -> Duration {
    let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
    let millis = base.as_millis() as f64 * factor.powi(exponent);
    let capped = millis.min(max_delay.as_millis() as f64);

    if capped.is_finite() && capped >= 0.0 {
        Duration::from_millis(capped.round() as u64)
    } else {
        max_delay
    }
}
