use axum::{
    Extension, Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    routing::get,
};

use crate::{
    auth::SessionUser,
    dto::history::{HistoryMessage, HistoryQuery, SessionSummary, UserStats},
    error::AppError,
    routes::{require_session, validated_session_id},
    services::history_service,
    state::SharedState,
};

/// Stored-conversation endpoints, registered accounts only.
pub fn router(state: SharedState) -> Router<SharedState> {
    Router::new()
        .route("/history/messages", get(list_messages))
        .route("/history/sessions", get(list_sessions))
        .route(
            "/history/sessions/{session_id}",
            get(session_messages).delete(delete_session),
        )
        .route("/history/stats", get(user_stats))
        .route_layer(middleware::from_fn_with_state(state, require_session))
}

/// Recent messages across every conversation of the calling account.
#[utoipa::path(
    get,
    path = "/history/messages",
    tag = "history",
    params(
        ("Authorization" = String, Header, description = "Bearer session token"),
        HistoryQuery
    ),
    responses(
        (status = 200, description = "Messages, oldest first inside the window", body = [HistoryMessage]),
        (status = 403, description = "Guest sessions have no stored history"),
        (status = 503, description = "Storage unavailable")
    )
)]
pub async fn list_messages(
    State(state): State<SharedState>,
    Extension(user): Extension<SessionUser>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<HistoryMessage>>, AppError> {
    Ok(Json(
        history_service::list_messages(&state, &user, query).await?,
    ))
}

/// The calling account's conversations, most recently active first.
#[utoipa::path(
    get,
    path = "/history/sessions",
    tag = "history",
    params(("Authorization" = String, Header, description = "Bearer session token")),
    responses(
        (status = 200, description = "Conversation summaries", body = [SessionSummary]),
        (status = 403, description = "Guest sessions have no stored history"),
        (status = 503, description = "Storage unavailable")
    )
)]
pub async fn list_sessions(
    State(state): State<SharedState>,
    Extension(user): Extension<SessionUser>,
) -> Result<Json<Vec<SessionSummary>>, AppError> {
    Ok(Json(history_service::list_sessions(&state, &user).await?))
}

/// One conversation in chronological order.
#[utoipa::path(
    get,
    path = "/history/sessions/{session_id}",
    tag = "history",
    params(
        ("Authorization" = String, Header, description = "Bearer session token"),
        ("session_id" = String, Path, description = "Conversation identifier")
    ),
    responses(
        (status = 200, description = "Messages of the conversation", body = [HistoryMessage]),
        (status = 403, description = "Guest sessions have no stored history"),
        (status = 404, description = "No such conversation for this account"),
        (status = 503, description = "Storage unavailable")
    )
)]
pub async fn session_messages(
    State(state): State<SharedState>,
    Extension(user): Extension<SessionUser>,
    Path(session_id): Path<String>,
) -> Result<Json<Vec<HistoryMessage>>, AppError> {
    let session_id = validated_session_id(session_id)?;
    Ok(Json(
        history_service::session_messages(&state, &user, session_id).await?,
    ))
}

/// Delete one conversation owned by the calling account.
#[utoipa::path(
    delete,
    path = "/history/sessions/{session_id}",
    tag = "history",
    params(
        ("Authorization" = String, Header, description = "Bearer session token"),
        ("session_id" = String, Path, description = "Conversation identifier")
    ),
    responses(
        (status = 204, description = "Conversation deleted"),
        (status = 404, description = "No such conversation for this account"),
        (status = 503, description = "Storage unavailable")
    )
)]
pub async fn delete_session(
    State(state): State<SharedState>,
    Extension(user): Extension<SessionUser>,
    Path(session_id): Path<String>,
) -> Result<StatusCode, AppError> {
    let session_id = validated_session_id(session_id)?;
    history_service::delete_session(&state, &user, session_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Usage counters for the calling account.
#[utoipa::path(
    get,
    path = "/history/stats",
    tag = "history",
    params(("Authorization" = String, Header, description = "Bearer session token")),
    responses(
        (status = 200, description = "Totals across all conversations", body = UserStats),
        (status = 403, description = "Guest sessions have no stored history"),
        (status = 503, description = "Storage unavailable")
    )
)]
pub async fn user_stats(
    State(state): State<SharedState>,
    Extension(user): Extension<SessionUser>,
) -> Result<Json<UserStats>, AppError> {
    Ok(Json(history_service::user_stats(&state, &user).await?))
}
