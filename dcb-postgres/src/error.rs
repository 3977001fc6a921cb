use dcb_core::{Error as CoreError, Query, ResourceError};
use thiserror::Error;

/// Postgres-backend errors, always convertible into the storage-agnostic
/// `dcb_core::Error` that callers of the `EventStore` trait see.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("concurrent modification: condition matched existing events ({matched_query:?})")]
    Concurrency { matched_query: Query },
    #[error("validation error: {field}: {reason}")]
    Validation { field: String, reason: String },
    #[error("operation timed out")]
    Timeout,
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Error::Timeout
    }
}

/// Postgres SQLSTATE for a serialization failure under `SERIALIZABLE`
/// isolation, raised when `AppendIfIsolated`'s transaction can't be
/// linearized against concurrent commits.
const SERIALIZATION_FAILURE: &str = "40001";
/// Deadlock detected; can surface from the lock-tag fast path if lock
/// ordering is ever violated by a caller bypassing the builder.
const DEADLOCK_DETECTED: &str = "40P01";

/// Maps a raw `sqlx::Error` from a committed or aborted transaction onto the
/// backend error taxonomy, recognizing the two SQLSTATEs that represent a
/// concurrency conflict rather than an infrastructure failure. `matched_query`
/// is the append condition's query that was in effect for this transaction,
/// reported back to the caller alongside the conflict.
pub(crate) fn map_commit_err(err: sqlx::Error, matched_query: Query) -> Error {
    if let sqlx::Error::Database(ref description) = err {
        if matches!(
            description.code().as_deref(),
            Some(SERIALIZATION_FAILURE) | Some(DEADLOCK_DETECTED)
        ) {
            return Error::Concurrency { matched_query };
        }
    }
    Error::Database(err)
}

impl From<Error> for CoreError {
    fn from(err: Error) -> Self {
        match err {
            Error::Concurrency { matched_query } => CoreError::Concurrency { matched_query },
            Error::Validation { field, reason } => CoreError::validation(field, reason),
            Error::Timeout => CoreError::Resource(ResourceError::Timeout),
            Error::Database(sqlx::Error::PoolTimedOut) => {
                CoreError::Resource(ResourceError::Timeout)
            }
            Error::Database(err) => CoreError::Resource(ResourceError::Connection(err.to_string())),
        }
    }
}
