//! # sync-types
//!
//! Persisted data model for the offline-first sync engine.
//!
//! This crate provides the foundational types used across all offline-sync crates:
//! - [`ActionId`] - Identity of a queued mutation
//! - [`OfflineAction`], [`MutationKind`], [`Payload`] - Durably queued mutations
//! - [`CacheEntry`] - A cached value with its TTL metadata
//! - [`schema`] - Versioned on-disk envelopes and legacy migration
//! - [`RemoteError`], [`FormatError`] - Error types
//!
//! Nothing in this crate performs I/O.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod action;
mod cache;
mod error;
mod ids;
pub mod schema;

pub use action::{MutationKind, OfflineAction, Payload, DEFAULT_MAX_RETRIES};
pub use cache::CacheEntry;
pub use error::{FormatError, RemoteError};
pub use ids::ActionId;
pub use schema::SCHEMA_VERSION;
