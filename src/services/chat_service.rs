use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use crate::{
    auth::SessionUser,
    dao::models::{ChatRole, NewChatMessage},
    dto::chat::{AskRequest, AskResponse, NewSessionResponse, SourceDto},
    error::ServiceError,
    rag::{QueryOutcome, SourceDocument},
    state::{RateDecision, SharedState},
};

/// Start a fresh conversation.
pub fn create_session() -> NewSessionResponse {
    NewSessionResponse {
        session_id: Uuid::new_v4().to_string(),
    }
}

/// Answer one question against the mission knowledge base.
///
/// The caller's rate budget is charged before any network call, so a
/// failed retrieval still consumes one question. Persistence happens
/// only after a successful answer and never fails the request.
pub async fn ask(
    state: &SharedState,
    user: &SessionUser,
    request: AskRequest,
) -> Result<AskResponse, ServiceError> {
    let Some(engine) = state.query_engine() else {
        return Err(ServiceError::NotConfigured("retrieval"));
    };

    let settings = state.settings();
    let allowance = if user.guest {
        settings.chat.guest_rate_limit
    } else {
        settings.chat.user_rate_limit
    };

    let remaining = match state
        .rate_limiter()
        .check(&user.rate_limit_key(), allowance)
    {
        RateDecision::Allowed { remaining } => remaining,
        RateDecision::Limited { retry_after } => {
            return Err(ServiceError::RateLimited {
                retry_after_secs: retry_after.as_secs().max(1),
            });
        }
    };

    let outcome = engine.answer(&request.question).await?;

    persist_exchange(state, user, &request, &outcome).await;

    Ok(AskResponse {
        session_id: request.session_id,
        answer: outcome.answer,
        sources: outcome.sources.into_iter().map(SourceDto::from).collect(),
        response_time_ms: outcome.elapsed_ms,
        remaining_requests: remaining,
    })
}

/// Store the question and its answer as one exchange.
///
/// Skipped silently without a storage backend; guests are stored with
/// no owning account. A write failure is logged and the rest of the
/// exchange is dropped so the history never starts mid-pair.
async fn persist_exchange(
    state: &SharedState,
    user: &SessionUser,
    request: &AskRequest,
    outcome: &QueryOutcome,
) {
    let Some(store) = state.history_store().await else {
        return;
    };

    let question = NewChatMessage {
        user_id: user.id,
        session_id: request.session_id.clone(),
        role: ChatRole::User,
        message: request.question.clone(),
        sources: None,
    };
    let answer = NewChatMessage {
        user_id: user.id,
        session_id: request.session_id.clone(),
        role: ChatRole::Assistant,
        message: outcome.answer.clone(),
        sources: sources_json(&outcome.sources),
    };

    for message in [question, answer] {
        if let Err(err) = store.save_message(message).await {
            warn!(
                session_id = %request.session_id,
                error = %err,
                "failed to persist chat message"
            );
            return;
        }
    }
}

fn sources_json(sources: &[SourceDocument]) -> Option<serde_json::Value> {
    if sources.is_empty() {
        return None;
    }
    let entries: Vec<_> = sources
        .iter()
        .map(|source| {
            json!({
                "title": source.title,
                "text": source.text,
                "score": source.score,
            })
        })
        .collect();
    Some(json!(entries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dto::validation::validate_session_id;

    #[test]
    fn new_session_ids_pass_their_own_validation() {
        let session = create_session();
        assert!(validate_session_id(&session.session_id).is_ok());
    }

    #[test]
    fn sources_json_is_absent_for_ungrounded_answers() {
        assert!(sources_json(&[]).is_none());
    }

    #[test]
    fn sources_json_keeps_order_and_fields() {
        let value = sources_json(&[
            SourceDocument {
                title: "Voyager".into(),
                text: "Launched in 1977.".into(),
                score: 0.9,
            },
            SourceDocument {
                title: "Cassini".into(),
                text: "Arrived at Saturn in 2004.".into(),
                score: 0.6,
            },
        ])
        .unwrap();
        let entries = value.as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["title"], "Voyager");
        assert_eq!(entries[1]["score"], 0.6);
    }

    #[cfg(feature = "sqlite-store")]
    mod with_store {
        use super::*;
        use crate::auth::SessionKeys;
        use crate::config::AppSettings;
        use crate::dao::history_store::HistoryStore;
        use crate::dao::history_store::sqlite::SqliteHistoryStore;
        use crate::state::AppState;
        use std::sync::Arc;

        async fn state_with_store() -> crate::state::SharedState {
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
            state
        }

        #[tokio::test]
        async fn persist_exchange_stores_question_and_answer() {
            let state = state_with_store().await;
            let store = state.history_store().await.unwrap();
            let account = store
                .create_user(crate::dao::models::NewUser {
                    username: "kepler".into(),
                    email: "kepler@example.com".into(),
                    password_hash: "$argon2id$test".into(),
                })
                .await
                .unwrap();
            let user = SessionUser::registered(account.id, account.username);
            let request = AskRequest {
                session_id: create_session().session_id,
                question: "How did Cassini reach Saturn?".into(),
            };
            let outcome = QueryOutcome {
                answer: "Through a VVEJGA gravity assist trajectory.".into(),
                sources: vec![SourceDocument {
                    title: "Cassini".into(),
                    text: "Venus-Venus-Earth-Jupiter Gravity Assist.".into(),
                    score: 0.8,
                }],
                elapsed_ms: 1200,
            };

            persist_exchange(&state, &user, &request, &outcome).await;

            let messages = store
                .session_history(account.id, request.session_id.clone())
                .await
                .unwrap();
            assert_eq!(messages.len(), 2);
            assert_eq!(messages[0].role, ChatRole::User);
            assert_eq!(messages[1].role, ChatRole::Assistant);
            assert!(messages[1].sources.is_some());
        }
    }
}
