use axum::{Extension, Json, Router, extract::State, middleware, routing::post};
use axum_valid::Valid;

use crate::{
    auth::SessionUser,
    dto::chat::{AskRequest, AskResponse, NewSessionResponse},
    error::AppError,
    routes::require_session,
    services::chat_service,
    state::SharedState,
};

/// Question answering endpoints. Every route requires a session token;
/// guests get one from `/auth/guest`.
pub fn router(state: SharedState) -> Router<SharedState> {
    Router::new()
        .route("/chat/sessions", post(create_session))
        .route("/chat/ask", post(ask))
        .route_layer(middleware::from_fn_with_state(state, require_session))
}

/// Start a fresh conversation.
#[utoipa::path(
    post,
    path = "/chat/sessions",
    tag = "chat",
    params(("Authorization" = String, Header, description = "Bearer session token")),
    responses(
        (status = 200, description = "Conversation created", body = NewSessionResponse),
        (status = 401, description = "Missing or invalid session token")
    )
)]
pub async fn create_session() -> Json<NewSessionResponse> {
    Json(chat_service::create_session())
}

/// Ask the assistant a question about space missions.
#[utoipa::path(
    post,
    path = "/chat/ask",
    tag = "chat",
    params(("Authorization" = String, Header, description = "Bearer session token")),
    request_body = AskRequest,
    responses(
        (status = 200, description = "Answer with cited sources", body = AskResponse),
        (status = 401, description = "Missing or invalid session token"),
        (status = 429, description = "Question budget exhausted; see Retry-After"),
        (status = 503, description = "Retrieval pipeline not configured or unavailable")
    )
)]
pub async fn ask(
    State(state): State<SharedState>,
    Extension(user): Extension<SessionUser>,
    Valid(Json(payload)): Valid<Json<AskRequest>>,
) -> Result<Json<AskResponse>, AppError> {
    Ok(Json(chat_service::ask(&state, &user, payload).await?))
}
