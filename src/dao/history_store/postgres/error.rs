//! Error types shared by the PostgreSQL storage implementation.

use thiserror::Error;

/// Convenient result alias returning [`PostgresDaoError`] failures.
pub type PostgresResult<T> = Result<T, PostgresDaoError>;

/// Failures that can occur while interacting with PostgreSQL.
#[derive(Debug, Error)]
pub enum PostgresDaoError {
    /// The database URL could not be parsed into connect options.
    #[error("invalid PostgreSQL database URL")]
    InvalidUrl {
        #[source]
        source: sqlx::Error,
    },
    /// Reaching the server or building the connection pool failed.
    #[error("failed to connect to PostgreSQL")]
    Connect {
        #[source]
        source: sqlx::Error,
    },
    /// Applying the table and index definitions failed.
    #[error("failed to prepare PostgreSQL schema")]
    Schema {
        #[source]
        source: sqlx::Error,
    },
    /// A statement failed to execute.
    #[error("PostgreSQL statement failed while trying to {operation}")]
    Query {
        operation: &'static str,
        #[source]
        source: sqlx::Error,
    },
    /// A stored row could not be mapped back to an entity.
    #[error("failed to decode PostgreSQL row while trying to {operation}")]
    DecodeRow {
        operation: &'static str,
        #[source]
        source: sqlx::Error,
    },
    /// The unique constraints rejected an account insert.
    #[error("username or email already taken")]
    DuplicateUser,
}
