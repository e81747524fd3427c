//! Error types shared by the SQLite storage implementation.

use thiserror::Error;

/// Convenient result alias returning [`SqliteDaoError`] failures.
pub type SqliteResult<T> = Result<T, SqliteDaoError>;

/// Failures that can occur while interacting with SQLite.
#[derive(Debug, Error)]
pub enum SqliteDaoError {
    /// The database URL could not be parsed into connect options.
    #[error("invalid SQLite database URL")]
    InvalidUrl {
        #[source]
        source: sqlx::Error,
    },
    /// Opening the database file or its connection pool failed.
    #[error("failed to open SQLite database")]
    Connect {
        #[source]
        source: sqlx::Error,
    },
    /// Applying the table and index definitions failed.
    #[error("failed to prepare SQLite schema")]
    Schema {
        #[source]
        source: sqlx::Error,
    },
    /// A statement failed to execute.
    #[error("SQLite statement failed while trying to {operation}")]
    Query {
        operation: &'static str,
        #[source]
        source: sqlx::Error,
    },
    /// A stored row could not be mapped back to an entity.
    #[error("failed to decode SQLite row while trying to {operation}")]
    DecodeRow {
        operation: &'static str,
        #[source]
        source: sqlx::Error,
    },
    /// The unique indexes rejected an account insert.
    #[error("username or email already taken")]
    DuplicateUser,
}
