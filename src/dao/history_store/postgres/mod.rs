mod error;
mod store;

pub use error::PostgresDaoError;
pub use store::PostgresHistoryStore;

use crate::dao::storage::StorageError;

impl From<PostgresDaoError> for StorageError {
    fn from(err: PostgresDaoError) -> Self {
        match err {
            PostgresDaoError::DuplicateUser => StorageError::Duplicate {
                what: "username or email",
            },
            other => StorageError::unavailable(other.to_string(), other),
        }
    }
}
