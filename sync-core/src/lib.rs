//! # sync-core
//!
//! Pure logic for offline-sync (no I/O, instant tests).
//!
//! This crate implements the policies and bookkeeping of the offline-first
//! engine without any network or disk I/O, enabling fast unit tests.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce output
//! without side effects. Time is always passed in (or read through a
//! [`Clock`]) so expiry and backoff are deterministic under test.
//!
//! The actual I/O (key-value persistence, remote calls, timers) is performed
//! by `sync-client`, which drives these structures.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod buffer;
pub mod clock;
pub mod lru;
pub mod retry;
pub mod state;

pub use buffer::{ActionBuffer, BufferError};
pub use clock::{Clock, ManualClock, SystemClock};
pub use lru::{CacheIndex, CacheStats, InsertOutcome, Lookup};
pub use retry::{backoff_delay, FailureClass, RetryPolicy, RetryPreset};
pub use state::{
    decide, retry_wakeup, ConnectivityTracker, DrainState, DrainTrigger, Outcome, TerminalReason,
    Transition,
};
