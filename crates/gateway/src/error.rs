//! Error types for the gateway's data store and grading capabilities.

use thiserror::Error;

/// Failure reported by a [`crate::db::Database`] or [`crate::gradebook::Gradebook`].
#[derive(Error, Debug)]
pub enum StoreError {
    /// The store could not be reached (pool closed/timed out, I/O, TLS).
    #[error("database unavailable: {0}")]
    Unavailable(String),

    /// The statement failed (malformed SQL, constraint violation, ...).
    #[error("query failed: {0}")]
    Query(String),

    /// A row did not have the expected columns or column types.
    #[error("unexpected row shape: {0}")]
    Decode(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(value: sqlx::Error) -> Self {
        match value {
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_) => Self::Unavailable(value.to_string()),
            sqlx::Error::Database(e) => Self::Query(e.message().to_string()),
            sqlx::Error::ColumnDecode { .. }
            | sqlx::Error::ColumnNotFound(_)
            | sqlx::Error::ColumnIndexOutOfBounds { .. }
            | sqlx::Error::Decode(_) => Self::Decode(value.to_string()),
            other => Self::Query(other.to_string()),
        }
    }
}

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
