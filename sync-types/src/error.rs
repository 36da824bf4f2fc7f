//! Error types for offline-sync.

use thiserror::Error;

use crate::MutationKind;

/// Errors raised while encoding, decoding or validating persisted records.
#[derive(Debug, Error)]
pub enum FormatError {
    /// JSON serialization failed
    #[error("serialization failed: {0}")]
    Encode(#[source] serde_json::Error),

    /// JSON deserialization failed
    #[error("deserialization failed: {0}")]
    Decode(#[source] serde_json::Error),

    /// A persisted record was written by a newer schema
    #[error("unsupported schema version {found} (supported up to {supported})")]
    UnsupportedVersion {
        /// Version found in storage.
        found: u32,
        /// Highest version this build understands.
        supported: u32,
    },

    /// Update/delete actions must name the record they target
    #[error("{kind} action requires a record key")]
    MissingRecordKey {
        /// The offending mutation kind.
        kind: MutationKind,
    },
}

/// A classifiable failure returned by the remote data service.
///
/// The variants separate transport trouble (worth retrying) from answers
/// the service gave on purpose (usually not worth retrying).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// The service could not be reached.
    #[error("network unreachable: {0}")]
    Network(String),

    /// The call did not complete in time.
    #[error("request timed out")]
    Timeout,

    /// The connection dropped mid-request.
    #[error("connection reset")]
    ConnectionReset,

    /// The service answered with an error status and/or error code.
    #[error("service error (status {status:?}, code {code:?}): {message}")]
    Service {
        /// HTTP-like status, when the service reports one.
        status: Option<u16>,
        /// Service-specific error code, when the service reports one.
        code: Option<String>,
        /// Human-readable message.
        message: String,
    },

    /// The service rejected the payload as invalid.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The mutation conflicts with remote state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The payload could not be interpreted.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

impl RemoteError {
    /// Convenience constructor for a status-only service error.
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Service {
            status: Some(status),
            code: None,
            message: message.into(),
        }
    }

    /// Convenience constructor for a code-only service error.
    pub fn code(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Service {
            status: None,
            code: Some(code.into()),
            message: message.into(),
        }
    }
}
