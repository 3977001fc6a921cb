//! Error taxonomy shared by the core crate and every storage backend.

use thiserror::Error;

use crate::query::Query;

/// Errors produced by the store's public operations.
#[derive(Error, Debug)]
pub enum Error {
    /// An input failed a constraint check before any storage call was made.
    #[error("validation error: {field}: {reason}")]
    Validation { field: String, reason: String },

    /// An `AppendIf`/`AppendIfIsolated` condition matched, or the backend's
    /// isolation level reported a serialization conflict. `matched_query` is
    /// the condition's `fail_if_events_match` query, so callers can log or
    /// decide how to retry without having to thread it through themselves.
    #[error("concurrency error: condition matched existing events ({matched_query:?})")]
    Concurrency { matched_query: Query },

    /// The underlying connection, transport, or deadline failed.
    #[error("resource error: {0}")]
    Resource(#[from] ResourceError),

    /// `MaxConcurrentProjections` was exceeded; the caller should retry
    /// rather than queue.
    #[error("too many concurrent projections")]
    TooManyProjections,

    /// Anything that should never happen assuming correct usage and a
    /// healthy backend.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// The transport/IO layer of [`Error::Resource`].
#[derive(Error, Debug)]
pub enum ResourceError {
    #[error("operation timed out")]
    Timeout,
    #[error("operation was cancelled")]
    Cancelled,
    #[error("connection error: {0}")]
    Connection(String),
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Error::Resource(ResourceError::Timeout)
    }
}
