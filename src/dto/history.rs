//! DTOs for browsing stored conversations.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::dao::models::{ChatMessageEntity, SessionSummaryEntity, UserStatsEntity};
use crate::dto::format_timestamp;

/// Query parameters for the paginated message listing.
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct HistoryQuery {
    /// Maximum number of messages to return, newest first. Falls back
    /// to the configured history limit.
    pub limit: Option<u32>,
    /// Number of newest messages to skip before the window starts.
    pub offset: Option<u32>,
}

/// Stored message returned by the history endpoints.
#[derive(Debug, Serialize, ToSchema)]
pub struct HistoryMessage {
    /// `"user"` or `"assistant"`.
    pub role: String,
    pub content: String,
    /// Source passages attached to assistant answers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sources: Option<serde_json::Value>,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
    pub session_id: String,
}

impl From<ChatMessageEntity> for HistoryMessage {
    fn from(message: ChatMessageEntity) -> Self {
        Self {
            role: message.role.as_str().to_owned(),
            content: message.message,
            sources: message.sources,
            created_at: format_timestamp(message.created_at),
            session_id: message.session_id,
        }
    }
}

/// One conversation in the session list.
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionSummary {
    pub session_id: String,
    /// RFC 3339 timestamp of the oldest message.
    pub first_message: String,
    /// RFC 3339 timestamp of the newest message.
    pub last_message: String,
    pub message_count: i64,
}

impl From<SessionSummaryEntity> for SessionSummary {
    fn from(summary: SessionSummaryEntity) -> Self {
        Self {
            session_id: summary.session_id,
            first_message: format_timestamp(summary.first_message),
            last_message: format_timestamp(summary.last_message),
            message_count: summary.message_count,
        }
    }
}

/// Account-wide usage counters.
#[derive(Debug, Serialize, ToSchema)]
pub struct UserStats {
    pub total_messages: i64,
    pub unique_sessions: i64,
}

impl From<UserStatsEntity> for UserStats {
    fn from(stats: UserStatsEntity) -> Self {
        Self {
            total_messages: stats.total_messages,
            unique_sessions: stats.unique_sessions,
        }
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;
    use crate::dao::models::ChatRole;

    #[test]
    fn test_history_message_keeps_sources_and_formats_timestamp() {
        let message = HistoryMessage::from(ChatMessageEntity {
            id: 7,
            session_id: "abc123".into(),
            role: ChatRole::Assistant,
            message: "Voyager 1 uses hydrazine thrusters.".into(),
            sources: Some(serde_json::json!([{ "title": "Voyager", "score": 0.9 }])),
            created_at: datetime!(2024-03-01 12:30:00 UTC),
        });
        assert_eq!(message.role, "assistant");
        assert_eq!(message.created_at, "2024-03-01T12:30:00Z");
        assert!(message.sources.is_some());
    }

    #[test]
    fn test_user_message_serializes_without_sources_key() {
        let message = HistoryMessage::from(ChatMessageEntity {
            id: 1,
            session_id: "abc123".into(),
            role: ChatRole::User,
            message: "What about Voyager 1?".into(),
            sources: None,
            created_at: datetime!(2024-03-01 12:29:58 UTC),
        });
        let json = serde_json::to_value(&message).unwrap();
        assert!(json.get("sources").is_none());
    }
}
