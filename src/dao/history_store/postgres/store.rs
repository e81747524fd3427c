use std::str::FromStr;

use futures::future::BoxFuture;
use sqlx::Row;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgRow};
use time::OffsetDateTime;

use crate::dao::{
    history_store::HistoryStore,
    models::{
        ChatMessageEntity, ChatRole, NewChatMessage, NewUser, SessionSummaryEntity, UserEntity,
        UserStatsEntity,
    },
    storage::StorageResult,
};

use super::error::{PostgresDaoError, PostgresResult};

/// Statements applied on connect. All of them are idempotent so a reconnect
/// can replay the whole list.
const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (
        id BIGSERIAL PRIMARY KEY,
        username VARCHAR(50) NOT NULL UNIQUE,
        email VARCHAR(100) NOT NULL UNIQUE,
        password_hash VARCHAR(255) NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        last_login TIMESTAMPTZ,
        is_active BOOLEAN NOT NULL DEFAULT TRUE
    )",
    "CREATE TABLE IF NOT EXISTS chat_history (
        id BIGSERIAL PRIMARY KEY,
        user_id BIGINT REFERENCES users (id),
        session_id VARCHAR(100) NOT NULL,
        message_type VARCHAR(20) NOT NULL,
        message TEXT NOT NULL,
        sources TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )",
    "CREATE INDEX IF NOT EXISTS idx_chat_history_session ON chat_history (session_id)",
    "CREATE INDEX IF NOT EXISTS idx_chat_history_user ON chat_history (user_id)",
];

#[derive(Clone)]
pub struct PostgresHistoryStore {
    pool: PgPool,
}

impl PostgresHistoryStore {
    /// Connects to the server and prepares the schema.
    pub async fn connect(url: &str, max_connections: u32) -> PostgresResult<Self> {
        let options = PgConnectOptions::from_str(url)
            .map_err(|source| PostgresDaoError::InvalidUrl { source })?;

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|source| PostgresDaoError::Connect { source })?;

        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    async fn ensure_schema(&self) -> PostgresResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|source| PostgresDaoError::Schema { source })?;
        }
        Ok(())
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn map_user(row: &PgRow) -> PostgresResult<UserEntity> {
    let decode = |source| PostgresDaoError::DecodeRow {
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

fn map_message(row: &PgRow) -> PostgresResult<ChatMessageEntity> {
    let decode = |source| PostgresDaoError::DecodeRow {
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

fn map_summary(row: &PgRow) -> PostgresResult<SessionSummaryEntity> {
    let decode = |source| PostgresDaoError::DecodeRow {
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

impl HistoryStore for PostgresHistoryStore {
    fn create_user(&self, user: NewUser) -> BoxFuture<'static, StorageResult<UserEntity>> {
        let store = self.clone();
        Box::pin(async move {
            let created_at = OffsetDateTime::now_utc();
            let id: i64 = sqlx::query_scalar(
                "INSERT INTO users (username, email, password_hash, created_at, is_active) \
                 VALUES ($1, $2, $3, $4, TRUE) RETURNING id",
            )
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(created_at)
            .fetch_one(&store.pool)
            .await
            .map_err(|source| {
                if is_unique_violation(&source) {
                    PostgresDaoError::DuplicateUser
                } else {
                    PostgresDaoError::Query {
                        operation: "insert account",
                        source,
                    }
                }
            })?;

            Ok(UserEntity {
                id,
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
                 FROM users WHERE username = $1 OR email = $1",
            )
            .bind(&login)
            .fetch_optional(&store.pool)
            .await
            .map_err(|source| PostgresDaoError::Query {
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
            sqlx::query("UPDATE users SET last_login = $2 WHERE id = $1")
                .bind(user_id)
                .bind(at)
                .execute(&store.pool)
                .await
                .map_err(|source| PostgresDaoError::Query {
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
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(message.user_id)
            .bind(&message.session_id)
            .bind(message.role.as_str())
            .bind(&message.message)
            .bind(sources)
            .bind(OffsetDateTime::now_utc())
            .execute(&store.pool)
            .await
            .map_err(|source| PostgresDaoError::Query {
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
                 FROM chat_history WHERE user_id = $1 \
                 ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3",
            )
            .bind(user_id)
            .bind(i64::from(limit))
            .bind(i64::from(offset))
            .fetch_all(&store.pool)
            .await
            .map_err(|source| PostgresDaoError::Query {
                operation: "load account history",
                source,
            })?;

            let mut messages = rows
                .iter()
                .map(map_message)
                .collect::<PostgresResult<Vec<_>>>()?;
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
                 FROM chat_history WHERE session_id = $1 AND user_id = $2 \
                 ORDER BY created_at ASC, id ASC",
            )
            .bind(&session_id)
            .bind(user_id)
            .fetch_all(&store.pool)
            .await
            .map_err(|source| PostgresDaoError::Query {
                operation: "load conversation",
                source,
            })?;

            rows.iter()
                .map(map_message)
                .collect::<PostgresResult<Vec<_>>>()
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
                 FROM chat_history WHERE user_id = $1 \
                 GROUP BY session_id ORDER BY MAX(created_at) DESC, MAX(id) DESC",
            )
            .bind(user_id)
            .fetch_all(&store.pool)
            .await
            .map_err(|source| PostgresDaoError::Query {
                operation: "list conversations",
                source,
            })?;

            rows.iter()
                .map(map_summary)
                .collect::<PostgresResult<Vec<_>>>()
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
                sqlx::query("DELETE FROM chat_history WHERE session_id = $1 AND user_id = $2")
                    .bind(&session_id)
                    .bind(user_id)
                    .execute(&store.pool)
                    .await
                    .map_err(|source| PostgresDaoError::Query {
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
                sqlx::query_scalar("SELECT COUNT(*) FROM chat_history WHERE user_id = $1")
                    .bind(user_id)
                    .fetch_one(&store.pool)
                    .await
                    .map_err(|source| PostgresDaoError::Query {
                        operation: "count messages",
                        source,
                    })?;

            let unique_sessions: i64 = sqlx::query_scalar(
                "SELECT COUNT(DISTINCT session_id) FROM chat_history WHERE user_id = $1",
            )
            .bind(user_id)
            .fetch_one(&store.pool)
            .await
            .map_err(|source| PostgresDaoError::Query {
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
            let _: i32 = sqlx::query_scalar("SELECT 1")
                .fetch_one(&store.pool)
                .await
                .map_err(|source| PostgresDaoError::Query {
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
