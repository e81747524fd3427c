use tracing::info;

use crate::{
    auth::SessionUser,
    dto::history::{HistoryMessage, HistoryQuery, SessionSummary, UserStats},
    error::ServiceError,
    state::SharedState,
};

/// Recent messages across every conversation of the calling account,
/// oldest first inside the returned window.
pub async fn list_messages(
    state: &SharedState,
    user: &SessionUser,
    query: HistoryQuery,
) -> Result<Vec<HistoryMessage>, ServiceError> {
    let user_id = require_account(user)?;
    let store = state.require_history_store().await?;

    let limit = query.limit.unwrap_or(state.settings().chat.history_limit);
    let messages = store
        .user_history(user_id, limit, query.offset.unwrap_or(0))
        .await?;
    Ok(messages.into_iter().map(HistoryMessage::from).collect())
}

/// One conversation in chronological order.
///
/// Conversations of other accounts answer 404, exactly like
/// conversations that never existed.
pub async fn session_messages(
    state: &SharedState,
    user: &SessionUser,
    session_id: String,
) -> Result<Vec<HistoryMessage>, ServiceError> {
    let user_id = require_account(user)?;
    let store = state.require_history_store().await?;

    let messages = store.session_history(user_id, session_id.clone()).await?;
    if messages.is_empty() {
        return Err(ServiceError::NotFound(format!(
            "session `{session_id}` not found"
        )));
    }
    Ok(messages.into_iter().map(HistoryMessage::from).collect())
}

/// The calling account's conversations, most recently active first.
pub async fn list_sessions(
    state: &SharedState,
    user: &SessionUser,
) -> Result<Vec<SessionSummary>, ServiceError> {
    let user_id = require_account(user)?;
    let store = state.require_history_store().await?;

    let sessions = store.user_sessions(user_id).await?;
    Ok(sessions.into_iter().map(SessionSummary::from).collect())
}

/// Delete one conversation owned by the calling account.
pub async fn delete_session(
    state: &SharedState,
    user: &SessionUser,
    session_id: String,
) -> Result<(), ServiceError> {
    let user_id = require_account(user)?;
    let store = state.require_history_store().await?;

    let removed = store.delete_session(user_id, session_id.clone()).await?;
    if removed == 0 {
        return Err(ServiceError::NotFound(format!(
            "session `{session_id}` not found"
        )));
    }

    info!(user_id, session_id = %session_id, removed, "conversation deleted");
    Ok(())
}

/// Account-wide usage counters.
pub async fn user_stats(
    state: &SharedState,
    user: &SessionUser,
) -> Result<UserStats, ServiceError> {
    let user_id = require_account(user)?;
    let store = state.require_history_store().await?;

    let stats = store.user_stats(user_id).await?;
    Ok(UserStats::from(stats))
}

/// Account id of the caller, or [`ServiceError::Forbidden`] for guests.
pub(crate) fn require_account(user: &SessionUser) -> Result<i64, ServiceError> {
    user.id.ok_or_else(|| {
        ServiceError::Forbidden("chat history requires a registered account".into())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guests_are_rejected_before_touching_storage() {
        let err = require_account(&SessionUser::guest()).unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
    }

    #[cfg(feature = "sqlite-store")]
    mod with_store {
        use std::sync::Arc;

        use super::*;
        use crate::auth::SessionKeys;
        use crate::config::AppSettings;
        use crate::dao::history_store::HistoryStore;
        use crate::dao::history_store::sqlite::SqliteHistoryStore;
        use crate::dao::models::{ChatRole, NewChatMessage, NewUser};
        use crate::state::{AppState, SharedState};

        async fn seeded_state() -> (SharedState, SessionUser) {
            let state = AppState::new(
                AppSettings::default(),
                SessionKeys::from_secret("test-secret"),
                None,
            );
            let store = SqliteHistoryStore::connect("sqlite::memory:", 1)
                .await
                .unwrap();
            state
                .install_history_store(Arc::new(store) as Arc<dyn HistoryStore>)
                .await;

            let store = state.history_store().await.unwrap();
            let account = store
                .create_user(NewUser {
                    username: "lovell".into(),
                    email: "lovell@example.com".into(),
                    password_hash: "$argon2id$test".into(),
                })
                .await
                .unwrap();
            for (session, text) in [
                ("mission-a", "Tell me about Apollo 13."),
                ("mission-a", "Houston, we've had a problem."),
                ("mission-b", "What about Gemini?"),
            ] {
                store
                    .save_message(NewChatMessage {
                        user_id: Some(account.id),
                        session_id: session.into(),
                        role: ChatRole::User,
                        message: text.into(),
                        sources: None,
                    })
                    .await
                    .unwrap();
            }

            let user = SessionUser::registered(account.id, account.username);
            (state, user)
        }

        #[tokio::test]
        async fn list_messages_uses_the_configured_default_limit() {
            let (state, user) = seeded_state().await;
            let messages = list_messages(&state, &user, HistoryQuery::default())
                .await
                .unwrap();
            assert_eq!(messages.len(), 3);
        }

        #[tokio::test]
        async fn session_messages_are_scoped_to_one_conversation() {
            let (state, user) = seeded_state().await;
            let messages = session_messages(&state, &user, "mission-a".into())
                .await
                .unwrap();
            assert_eq!(messages.len(), 2);
            assert!(messages.iter().all(|m| m.session_id == "mission-a"));
        }

        #[tokio::test]
        async fn session_messages_answer_not_found_for_unknown_conversations() {
            let (state, user) = seeded_state().await;
            let err = session_messages(&state, &user, "mission-z".into())
                .await
                .unwrap_err();
            assert!(matches!(err, ServiceError::NotFound(_)));
        }

        #[tokio::test]
        async fn list_sessions_counts_messages_per_conversation() {
            let (state, user) = seeded_state().await;
            let sessions = list_sessions(&state, &user).await.unwrap();
            assert_eq!(sessions.len(), 2);
            let mission_a = sessions
                .iter()
                .find(|s| s.session_id == "mission-a")
                .unwrap();
            assert_eq!(mission_a.message_count, 2);
        }

        #[tokio::test]
        async fn delete_session_rejects_unknown_conversations() {
            let (state, user) = seeded_state().await;
            let err = delete_session(&state, &user, "mission-z".into())
                .await
                .unwrap_err();
            assert!(matches!(err, ServiceError::NotFound(_)));

            delete_session(&state, &user, "mission-b".into())
                .await
                .unwrap();
            let sessions = list_sessions(&state, &user).await.unwrap();
            assert_eq!(sessions.len(), 1);
        }

        #[tokio::test]
        async fn user_stats_counts_messages_and_sessions() {
            let (state, user) = seeded_state().await;
            let stats = user_stats(&state, &user).await.unwrap();
            assert_eq!(stats.total_messages, 3);
            assert_eq!(stats.unique_sessions, 2);
        }

        #[tokio::test]
        async fn degraded_mode_surfaces_as_service_error() {
            let (state, user) = seeded_state().await;
            state.clear_history_store().await;
            let err = list_messages(&state, &user, HistoryQuery::default())
                .await
                .unwrap_err();
            assert!(matches!(err, ServiceError::Degraded));
        }
    }
}
