use time::OffsetDateTime;

/// Author of a stored chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    /// Message typed by the person chatting.
    User,
    /// Answer produced by the assistant.
    Assistant,
}

impl ChatRole {
    /// Column value persisted for this role.
    pub fn as_str(self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }

    /// Maps a stored column value back to a role. Anything that is not
    /// `"user"` is treated as an assistant message.
    pub fn from_column(value: &str) -> Self {
        if value == "user" {
            ChatRole::User
        } else {
            ChatRole::Assistant
        }
    }
}

/// Registered account persisted by the storage layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserEntity {
    /// Primary key of the account.
    pub id: i64,
    /// Unique display name.
    pub username: String,
    /// Unique contact address.
    pub email: String,
    /// Password hash in PHC string format.
    pub password_hash: String,
    /// When the account was created.
    pub created_at: OffsetDateTime,
    /// Last successful login, if any.
    pub last_login: Option<OffsetDateTime>,
    /// Deactivated accounts keep their rows but cannot log in.
    pub is_active: bool,
}

/// Payload for inserting a new account.
#[derive(Debug, Clone)]
pub struct NewUser {
    /// Unique display name.
    pub username: String,
    /// Unique contact address.
    pub email: String,
    /// Password hash in PHC string format.
    pub password_hash: String,
}

/// Chat message persisted by the storage layer.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessageEntity {
    /// Primary key of the message.
    pub id: i64,
    /// Conversation the message belongs to.
    pub session_id: String,
    /// Who authored the message.
    pub role: ChatRole,
    /// Message text.
    pub message: String,
    /// Source passages attached to assistant answers, decoded from JSON.
    pub sources: Option<serde_json::Value>,
    /// When the message was stored.
    pub created_at: OffsetDateTime,
}

/// Payload for appending a message to a conversation.
#[derive(Debug, Clone)]
pub struct NewChatMessage {
    /// Owning account, absent for guest conversations.
    pub user_id: Option<i64>,
    /// Conversation the message belongs to.
    pub session_id: String,
    /// Who authored the message.
    pub role: ChatRole,
    /// Message text.
    pub message: String,
    /// Source passages to attach, serialized to JSON on write.
    pub sources: Option<serde_json::Value>,
}

/// Per-conversation aggregate used for the session list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummaryEntity {
    /// Conversation identifier.
    pub session_id: String,
    /// Timestamp of the oldest message in the conversation.
    pub first_message: OffsetDateTime,
    /// Timestamp of the newest message in the conversation.
    pub last_message: OffsetDateTime,
    /// Number of stored messages.
    pub message_count: i64,
}

/// Account-wide usage counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserStatsEntity {
    /// Messages stored across all conversations.
    pub total_messages: i64,
    /// Number of distinct conversations.
    pub unique_sessions: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_role_round_trips_through_column_values() {
        assert_eq!(ChatRole::from_column(ChatRole::User.as_str()), ChatRole::User);
        assert_eq!(
            ChatRole::from_column(ChatRole::Assistant.as_str()),
            ChatRole::Assistant
        );
    }

    #[test]
    fn unknown_column_value_falls_back_to_assistant() {
        assert_eq!(ChatRole::from_column("system"), ChatRole::Assistant);
    }
}
