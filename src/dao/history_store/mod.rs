#[cfg(feature = "postgres-store")]
pub mod postgres;
#[cfg(feature = "sqlite-store")]
pub mod sqlite;

use std::sync::Arc;

use futures::future::BoxFuture;
use time::OffsetDateTime;

use crate::dao::models::{
    ChatMessageEntity, NewChatMessage, NewUser, SessionSummaryEntity, UserEntity, UserStatsEntity,
};
use crate::dao::storage::{StorageError, StorageResult};

/// Abstraction over the persistence layer for accounts and chat history.
pub trait HistoryStore: Send + Sync {
    /// Inserts a new account and returns the stored row.
    fn create_user(&self, user: NewUser) -> BoxFuture<'static, StorageResult<UserEntity>>;
    /// Looks an account up by username or email.
    fn find_user_by_login(
        &self,
        login: String,
    ) -> BoxFuture<'static, StorageResult<Option<UserEntity>>>;
    /// Records a successful login on the account row.
    fn touch_last_login(
        &self,
        user_id: i64,
        at: OffsetDateTime,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Appends a message to a conversation.
    fn save_message(&self, message: NewChatMessage) -> BoxFuture<'static, StorageResult<()>>;
    /// Returns the newest `limit` messages for an account, oldest first,
    /// skipping `offset` from the newest end.
    fn user_history(
        &self,
        user_id: i64,
        limit: u32,
        offset: u32,
    ) -> BoxFuture<'static, StorageResult<Vec<ChatMessageEntity>>>;
    /// Returns one conversation in chronological order, scoped to its owner.
    fn session_history(
        &self,
        user_id: i64,
        session_id: String,
    ) -> BoxFuture<'static, StorageResult<Vec<ChatMessageEntity>>>;
    /// Lists an account's conversations, most recently active first.
    fn user_sessions(
        &self,
        user_id: i64,
    ) -> BoxFuture<'static, StorageResult<Vec<SessionSummaryEntity>>>;
    /// Deletes one conversation scoped to its owner, returning the number of
    /// removed messages.
    fn delete_session(
        &self,
        user_id: i64,
        session_id: String,
    ) -> BoxFuture<'static, StorageResult<u64>>;
    /// Returns account-wide usage counters.
    fn user_stats(&self, user_id: i64) -> BoxFuture<'static, StorageResult<UserStatsEntity>>;
    /// Cheap liveness probe against the backend.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Re-establishes the connection and re-applies the schema.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}

/// Backend selected by the database URL scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Embedded SQLite file (`sqlite://`).
    Sqlite,
    /// PostgreSQL server (`postgres://` or `postgresql://`).
    Postgres,
}

impl BackendKind {
    /// Resolves the backend from a database URL.
    pub fn from_url(url: &str) -> StorageResult<Self> {
        let scheme = url.split(':').next().unwrap_or_default();
        match scheme {
            "sqlite" => Ok(BackendKind::Sqlite),
            "postgres" | "postgresql" => Ok(BackendKind::Postgres),
            other => Err(StorageError::UnsupportedScheme {
                scheme: other.to_string(),
            }),
        }
    }

    /// Canonical scheme name for log messages.
    pub fn scheme(self) -> &'static str {
        match self {
            BackendKind::Sqlite => "sqlite",
            BackendKind::Postgres => "postgres",
        }
    }
}

/// Connects to the backend selected by `url` and prepares its schema.
pub async fn connect(
    url: &str,
    max_connections: u32,
) -> StorageResult<Arc<dyn HistoryStore>> {
    match BackendKind::from_url(url)? {
        #[cfg(feature = "sqlite-store")]
        BackendKind::Sqlite => {
            let store = sqlite::SqliteHistoryStore::connect(url, max_connections).await?;
            Ok(Arc::new(store) as Arc<dyn HistoryStore>)
        }
        #[cfg(feature = "postgres-store")]
        BackendKind::Postgres => {
            let store = postgres::PostgresHistoryStore::connect(url, max_connections).await?;
            Ok(Arc::new(store) as Arc<dyn HistoryStore>)
        }
        #[allow(unreachable_patterns)]
        disabled => Err(StorageError::BackendDisabled {
            scheme: disabled.scheme(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_kind_recognizes_both_postgres_spellings() {
        assert_eq!(
            BackendKind::from_url("postgres://user:pw@host/db").unwrap(),
            BackendKind::Postgres
        );
        assert_eq!(
            BackendKind::from_url("postgresql://user:pw@host/db").unwrap(),
            BackendKind::Postgres
        );
    }

    #[test]
    fn backend_kind_recognizes_sqlite_urls() {
        assert_eq!(
            BackendKind::from_url("sqlite://space_mission_chat.db").unwrap(),
            BackendKind::Sqlite
        );
    }

    #[test]
    fn backend_kind_rejects_unknown_schemes() {
        let err = BackendKind::from_url("mysql://host/db").unwrap_err();
        assert!(matches!(
            err,
            StorageError::UnsupportedScheme { scheme } if scheme == "mysql"
        ));
    }

    #[test]
    fn scheme_error_does_not_leak_credentials() {
        let err = BackendKind::from_url("user:secret@host/db").unwrap_err();
        let rendered = err.to_string();
        assert!(!rendered.contains("secret"));
    }
}
