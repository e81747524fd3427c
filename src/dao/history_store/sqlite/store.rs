use std::str::FromStr;

use futures::future::BoxFuture;
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use time::OffsetDateTime;

use crate::dao::{
    history_store::HistoryStore,
    models::{
        ChatMessageEntity, ChatRole, NewChatMessage, NewUser, SessionSummaryEntity, UserEntity,
        UserStatsEntity,
    },
    storage::StorageResult,
};

use super::error::{SqliteDaoError, SqliteResult};

/// Statements applied on connect. All of them are idempotent so a reconnect
/// can replay the whole list.
const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL,
        email TEXT NOT NULL,
        password_hash TEXT NOT NULL,
        created_at TEXT NOT NULL,
        last_login TEXT,
        is_active INTEGER NOT NULL DEFAULT 1
    )",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_users_username ON users (username)",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_users_email ON users (email)",
    "CREATE TABLE IF NOT EXISTS chat_history (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER,
        session_id TEXT NOT NULL,
        message_type TEXT NOT NULL,
        message TEXT NOT NULL,
        sources TEXT,
        created_at TEXT NOT NULL,
        FOREIGN KEY (user_id) REFERENCES users (id)
    )",
    "CREATE INDEX IF NOT EXISTS idx_chat_history_session ON chat_history (session_id)",
    "CREATE INDEX IF NOT EXISTS idx_chat_history_user ON chat_history (user_id)",
];

#[derive(Clone)]
pub struct SqliteHistoryStore {
    pool: SqlitePool,
}

impl SqliteHistoryStore {
    /// Opens (creating if missing) the database file and prepares the schema.
    pub async fn connect(url: &str, max_connections: u32) -> SqliteResult<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|source| SqliteDaoError::InvalidUrl { source })?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|source| SqliteDaoError::Connect { source })?;

        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    async fn ensure_schema(&self) -> SqliteResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|source| SqliteDaoError::Schema { source })?;
        }
        Ok(())
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn map_user(row: &SqliteRow) -> SqliteResult<UserEntity> {
    let decode = |source| SqliteDaoError::DecodeRow {
        operation: "load account",
        source,
    };
    Ok(UserEntity {
        id: row.try_get("id").map_err(decode)?,
        username: row.try_get("username").map_err(decode)?,
        email: row.try_get("email").map_err(decode)?,
        password_hash: row.try_get("password_hash").map_err(decode)?,
        created_at: row.try_get("created_at").map_err(decode)?,
        last_login: row.try_get("last_login").map_err(decode)?,
        is_active: row.try_get("is_active").map_err(decode)?,
    })
}

fn map_message(row: &SqliteRow) -> SqliteResult<ChatMessageEntity> {
    let decode = |source| SqliteDaoError::DecodeRow {
        operation: "load chat message",
        source,
    };
    let role: String = row.try_get("message_type").map_err(decode)?;
    let sources: Option<String> = row.try_get("sources").map_err(decode)?;
    Ok(ChatMessageEntity {
        id: row.try_get("id").map_err(decode)?,
        session_id: row.try_get("session_id").map_err(decode)?,
        role: ChatRole::from_column(&role),
        message: row.try_get("message").map_err(decode)?,
        sources: sources
            .as_deref()
            .and_then(|text| serde_json::from_str(text).ok()),
        created_at: row.try_get("created_at").map_err(decode)?,
    })
}

fn map_summary(row: &SqliteRow) -> SqliteResult<SessionSummaryEntity> {
    let decode = |source| SqliteDaoError::DecodeRow {
        operation: "list conversations",
        source,
    };
    Ok(SessionSummaryEntity {
        session_id: row.try_get("session_id").map_err(decode)?,
        first_message: row.try_get("first_message").map_err(decode)?,
        last_message: row.try_get("last_message").map_err(decode)?,
        message_count: row.try_get("message_count").map_err(decode)?,
    })
}

impl HistoryStore for SqliteHistoryStore {
    fn create_user(&self, user: NewUser) -> BoxFuture<'static, StorageResult<UserEntity>> {
        let store = self.clone();
        Box::pin(async move {
            let created_at = OffsetDateTime::now_utc();
            let result = sqlx::query(
                "INSERT INTO users (username, email, password_hash, created_at, is_active) \
                 VALUES (?1, ?2, ?3, ?4, 1)",
            )
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(created_at)
            .execute(&store.pool)
            .await
            .map_err(|source| {
                if is_unique_violation(&source) {
                    SqliteDaoError::DuplicateUser
                } else {
                    SqliteDaoError::Query {
                        operation: "insert account",
                        source,
                    }
                }
            })?;

            Ok(UserEntity {
                id: result.last_insert_rowid(),
                username: user.username,
                email: user.email,
                password_hash: user.password_hash,
                created_at,
                last_login: None,
                is_active: true,
            })
        })
    }

    fn find_user_by_login(
        &self,
        login: String,
    ) -> BoxFuture<'static, StorageResult<Option<UserEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let row = sqlx::query(
                "SELECT id, username, email, password_hash, created_at, last_login, is_active \
                 FROM users WHERE username = ?1 OR email = ?1",
            )
            .bind(&login)
            .fetch_optional(&store.pool)
            .await
            .map_err(|source| SqliteDaoError::Query {
                operation: "find account",
                source,
            })?;

            match row {
                Some(row) => Ok(Some(map_user(&row)?)),
                None => Ok(None),
            }
        })
    }

    fn touch_last_login(
        &self,
        user_id: i64,
        at: OffsetDateTime,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            sqlx::query("UPDATE users SET last_login = ?2 WHERE id = ?1")
                .bind(user_id)
                .bind(at)
                .execute(&store.pool)
                .await
                .map_err(|source| SqliteDaoError::Query {
                    operation: "record login",
                    source,
                })?;
            Ok(())
        })
    }

    fn save_message(&self, message: NewChatMessage) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let sources = message.sources.as_ref().map(serde_json::Value::to_string);
            sqlx::query(
                "INSERT INTO chat_history \
                 (user_id, session_id, message_type, message, sources, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )
            .bind(message.user_id)
            .bind(&message.session_id)
            .bind(message.role.as_str())
            .bind(&message.message)
            .bind(sources)
            .bind(OffsetDateTime::now_utc())
            .execute(&store.pool)
            .await
            .map_err(|source| SqliteDaoError::Query {
                operation: "append chat message",
                source,
            })?;
            Ok(())
        })
    }

    fn user_history(
        &self,
        user_id: i64,
        limit: u32,
        offset: u32,
    ) -> BoxFuture<'static, StorageResult<Vec<ChatMessageEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let rows = sqlx::query(
                "SELECT id, session_id, message_type, message, sources, created_at \
                 FROM chat_history WHERE user_id = ?1 \
                 ORDER BY created_at DESC, id DESC LIMIT ?2 OFFSET ?3",
            )
            .bind(user_id)
            .bind(i64::from(limit))
            .bind(i64::from(offset))
            .fetch_all(&store.pool)
            .await
            .map_err(|source| SqliteDaoError::Query {
                operation: "load account history",
                source,
            })?;

            let mut messages = rows
                .iter()
                .map(map_message)
                .collect::<SqliteResult<Vec<_>>>()?;
            // Fetched newest-first to honor the limit, returned oldest-first.
            messages.reverse();
            Ok(messages)
        })
    }

    fn session_history(
        &self,
        user_id: i64,
        session_id: String,
    ) -> BoxFuture<'static, StorageResult<Vec<ChatMessageEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let rows = sqlx::query(
                "SELECT id, session_id, message_type, message, sources, created_at \
                 FROM chat_history WHERE session_id = ?1 AND user_id = ?2 \
                 ORDER BY created_at ASC, id ASC",
            )
            .bind(&session_id)
            .bind(user_id)
            .fetch_all(&store.pool)
            .await
            .map_err(|source| SqliteDaoError::Query {
                operation: "load conversation",
                source,
            })?;

            rows.iter()
                .map(map_message)
                .collect::<SqliteResult<Vec<_>>>()
                .map_err(Into::into)
        })
    }

    fn user_sessions(
        &self,
        user_id: i64,
    ) -> BoxFuture<'static, StorageResult<Vec<SessionSummaryEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let rows = sqlx::query(
                "SELECT session_id, MIN(created_at) AS first_message, \
                 MAX(created_at) AS last_message, COUNT(*) AS message_count \
                 FROM chat_history WHERE user_id = ?1 \
                 GROUP BY session_id ORDER BY MAX(created_at) DESC, MAX(id) DESC",
            )
            .bind(user_id)
            .fetch_all(&store.pool)
            .await
            .map_err(|source| SqliteDaoError::Query {
                operation: "list conversations",
                source,
            })?;

            rows.iter()
                .map(map_summary)
                .collect::<SqliteResult<Vec<_>>>()
                .map_err(Into::into)
        })
    }

    fn delete_session(
        &self,
        user_id: i64,
        session_id: String,
    ) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        Box::pin(async move {
            let result =
                sqlx::query("DELETE FROM chat_history WHERE session_id = ?1 AND user_id = ?2")
                    .bind(&session_id)
                    .bind(user_id)
                    .execute(&store.pool)
                    .await
                    .map_err(|source| SqliteDaoError::Query {
                        operation: "delete conversation",
                        source,
                    })?;
            Ok(result.rows_affected())
        })
    }

    fn user_stats(&self, user_id: i64) -> BoxFuture<'static, StorageResult<UserStatsEntity>> {
        let store = self.clone();
        Box::pin(async move {
            let total_messages: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM chat_history WHERE user_id = ?1")
                    .bind(user_id)
                    .fetch_one(&store.pool)
                    .await
                    .map_err(|source| SqliteDaoError::Query {
                        operation: "count messages",
                        source,
                    })?;

            let unique_sessions: i64 = sqlx::query_scalar(
                "SELECT COUNT(DISTINCT session_id) FROM chat_history WHERE user_id = ?1",
            )
            .bind(user_id)
            .fetch_one(&store.pool)
            .await
            .map_err(|source| SqliteDaoError::Query {
                operation: "count conversations",
                source,
            })?;

            Ok(UserStatsEntity {
                total_messages,
                unique_sessions,
            })
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let _: i64 = sqlx::query_scalar("SELECT 1")
                .fetch_one(&store.pool)
                .await
                .map_err(|source| SqliteDaoError::Query {
                    operation: "ping database",
                    source,
                })?;
            Ok(())
        })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ensure_schema().await.map_err(Into::into) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::storage::StorageError;
    use serde_json::json;

    async fn memory_store() -> SqliteHistoryStore {
        // A single connection keeps every query on the same in-memory database.
        SqliteHistoryStore::connect("sqlite::memory:", 1)
            .await
            .expect("in-memory store should open")
    }

    fn sample_user(suffix: &str) -> NewUser {
        NewUser {
            username: format!("astra_{suffix}"),
            email: format!("astra_{suffix}@example.com"),
            password_hash: "$argon2id$v=19$m=19456,t=2,p=1$c2FsdA$aGFzaA".to_string(),
        }
    }

    fn message(
        user_id: Option<i64>,
        session_id: &str,
        role: ChatRole,
        text: &str,
    ) -> NewChatMessage {
        NewChatMessage {
            user_id,
            session_id: session_id.to_string(),
            role,
            message: text.to_string(),
            sources: None,
        }
    }

    #[tokio::test]
    async fn create_user_assigns_id_and_defaults() {
        let store = memory_store().await;
        let user = store.create_user(sample_user("one")).await.unwrap();

        assert!(user.id > 0);
        assert!(user.is_active);
        assert!(user.last_login.is_none());
    }

    #[tokio::test]
    async fn duplicate_username_is_reported_as_duplicate() {
        let store = memory_store().await;
        store.create_user(sample_user("dup")).await.unwrap();

        let mut clash = sample_user("dup");
        clash.email = "different@example.com".to_string();
        let err = store.create_user(clash).await.unwrap_err();

        assert!(matches!(err, StorageError::Duplicate { .. }));
    }

    #[tokio::test]
    async fn duplicate_email_is_reported_as_duplicate() {
        let store = memory_store().await;
        store.create_user(sample_user("mail")).await.unwrap();

        let mut clash = sample_user("other");
        clash.email = "astra_mail@example.com".to_string();
        let err = store.create_user(clash).await.unwrap_err();

        assert!(matches!(err, StorageError::Duplicate { .. }));
    }

    #[tokio::test]
    async fn find_user_matches_username_and_email() {
        let store = memory_store().await;
        let created = store.create_user(sample_user("find")).await.unwrap();

        let by_name = store
            .find_user_by_login("astra_find".to_string())
            .await
            .unwrap()
            .expect("lookup by username");
        let by_mail = store
            .find_user_by_login("astra_find@example.com".to_string())
            .await
            .unwrap()
            .expect("lookup by email");

        assert_eq!(by_name.id, created.id);
        assert_eq!(by_mail.id, created.id);
        assert!(
            store
                .find_user_by_login("nobody".to_string())
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn touch_last_login_is_persisted() {
        let store = memory_store().await;
        let user = store.create_user(sample_user("login")).await.unwrap();

        let at = OffsetDateTime::now_utc();
        store.touch_last_login(user.id, at).await.unwrap();

        let reloaded = store
            .find_user_by_login(user.username.clone())
            .await
            .unwrap()
            .expect("account still there");
        assert!(reloaded.last_login.is_some());
    }

    #[tokio::test]
    async fn history_returns_newest_messages_in_chronological_order() {
        let store = memory_store().await;
        let user = store.create_user(sample_user("hist")).await.unwrap();

        for i in 0..4 {
            store
                .save_message(message(
                    Some(user.id),
                    "s-1",
                    ChatRole::User,
                    &format!("question {i}"),
                ))
                .await
                .unwrap();
        }

        let window = store.user_history(user.id, 2, 0).await.unwrap();
        let texts: Vec<_> = window.iter().map(|m| m.message.as_str()).collect();
        assert_eq!(texts, vec!["question 2", "question 3"]);

        let skipped = store.user_history(user.id, 2, 2).await.unwrap();
        let texts: Vec<_> = skipped.iter().map(|m| m.message.as_str()).collect();
        assert_eq!(texts, vec!["question 0", "question 1"]);
    }

    #[tokio::test]
    async fn session_history_is_scoped_to_the_owner() {
        let store = memory_store().await;
        let owner = store.create_user(sample_user("owner")).await.unwrap();
        let intruder = store.create_user(sample_user("intruder")).await.unwrap();

        store
            .save_message(message(Some(owner.id), "s-owned", ChatRole::User, "hello"))
            .await
            .unwrap();
        store
            .save_message(message(
                Some(owner.id),
                "s-owned",
                ChatRole::Assistant,
                "hi there",
            ))
            .await
            .unwrap();

        let own = store
            .session_history(owner.id, "s-owned".to_string())
            .await
            .unwrap();
        assert_eq!(own.len(), 2);
        assert_eq!(own[0].role, ChatRole::User);
        assert_eq!(own[1].role, ChatRole::Assistant);

        let foreign = store
            .session_history(intruder.id, "s-owned".to_string())
            .await
            .unwrap();
        assert!(foreign.is_empty());
    }

    #[tokio::test]
    async fn sources_round_trip_as_json() {
        let store = memory_store().await;
        let user = store.create_user(sample_user("src")).await.unwrap();

        let sources = json!([{ "title": "Voyager 1", "score": 0.82 }]);
        store
            .save_message(NewChatMessage {
                user_id: Some(user.id),
                session_id: "s-json".to_string(),
                role: ChatRole::Assistant,
                message: "answer".to_string(),
                sources: Some(sources.clone()),
            })
            .await
            .unwrap();

        let history = store
            .session_history(user.id, "s-json".to_string())
            .await
            .unwrap();
        assert_eq!(history[0].sources, Some(sources));
    }

    #[tokio::test]
    async fn sessions_are_aggregated_and_sorted_by_recency() {
        let store = memory_store().await;
        let user = store.create_user(sample_user("agg")).await.unwrap();

        store
            .save_message(message(Some(user.id), "s-old", ChatRole::User, "first"))
            .await
            .unwrap();
        store
            .save_message(message(Some(user.id), "s-new", ChatRole::User, "second"))
            .await
            .unwrap();
        store
            .save_message(message(
                Some(user.id),
                "s-new",
                ChatRole::Assistant,
                "third",
            ))
            .await
            .unwrap();

        let sessions = store.user_sessions(user.id).await.unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].session_id, "s-new");
        assert_eq!(sessions[0].message_count, 2);
        assert_eq!(sessions[1].session_id, "s-old");
        assert!(sessions[0].first_message <= sessions[0].last_message);
    }

    #[tokio::test]
    async fn delete_session_only_removes_the_owners_rows() {
        let store = memory_store().await;
        let owner = store.create_user(sample_user("del")).await.unwrap();
        let other = store.create_user(sample_user("keep")).await.unwrap();

        store
            .save_message(message(Some(owner.id), "s-del", ChatRole::User, "bye"))
            .await
            .unwrap();
        store
            .save_message(message(Some(other.id), "s-del", ChatRole::User, "stay"))
            .await
            .unwrap();

        let removed = store
            .delete_session(owner.id, "s-del".to_string())
            .await
            .unwrap();
        assert_eq!(removed, 1);

        let untouched = store
            .session_history(other.id, "s-del".to_string())
            .await
            .unwrap();
        assert_eq!(untouched.len(), 1);
    }

    #[tokio::test]
    async fn stats_count_messages_and_distinct_sessions() {
        let store = memory_store().await;
        let user = store.create_user(sample_user("stats")).await.unwrap();

        for session in ["s-a", "s-a", "s-b"] {
            store
                .save_message(message(Some(user.id), session, ChatRole::User, "msg"))
                .await
                .unwrap();
        }

        let stats = store.user_stats(user.id).await.unwrap();
        assert_eq!(stats.total_messages, 3);
        assert_eq!(stats.unique_sessions, 2);
    }

    #[tokio::test]
    async fn guest_messages_are_invisible_to_accounts() {
        let store = memory_store().await;
        let user = store.create_user(sample_user("guest")).await.unwrap();

        store
            .save_message(message(None, "s-guest", ChatRole::User, "anonymous"))
            .await
            .unwrap();

        let stats = store.user_stats(user.id).await.unwrap();
        assert_eq!(stats.total_messages, 0);
        assert!(store.user_sessions(user.id).await.unwrap().is_empty());
    }
}
