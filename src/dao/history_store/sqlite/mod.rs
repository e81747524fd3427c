mod error;
mod store;

pub use error::SqliteDaoError;
pub use store::SqliteHistoryStore;

use crate::dao::storage::StorageError;

impl From<SqliteDaoError> for StorageError {
    fn from(err: SqliteDaoError) -> Self {
        match err {
            SqliteDaoError::DuplicateUser => StorageError::Duplicate {
                what: "username or email",
            },
            other => StorageError::unavailable(other.to_string(), other),
        }
    }
}
