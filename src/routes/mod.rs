use axum::{
    Router,
    body::Body,
    extract::State,
    http::{Request, header},
    middleware::Next,
    response::Response,
};
use validator::ValidationErrors;

use crate::{error::AppError, state::SharedState};

pub mod auth;
pub mod chat;
pub mod docs;
pub mod export;
pub mod health;
pub mod history;

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(auth::router(state.clone()))
        .merge(chat::router(state.clone()))
        .merge(history::router(state.clone()))
        .merge(export::router(state.clone()));

    let docs_router = docs::router(state.clone());

    api_router.merge(docs_router).with_state(state)
}

/// Require a valid bearer session token and attach the caller to the request.
pub(crate) async fn require_session(
    State(state): State<SharedState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::Unauthorized("missing bearer session token".into()))?;

    let user = state
        .session_keys()
        .verify(token)
        .map_err(|_| AppError::Unauthorized("invalid or expired session token".into()))?;

    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

/// Check a session id path parameter before it reaches SQL or a filename.
pub(crate) fn validated_session_id(session_id: String) -> Result<String, AppError> {
    if let Err(e) = crate::dto::validation::validate_session_id(&session_id) {
        let mut errors = ValidationErrors::new();
        errors.add("session_id", e);
        return Err(errors.into());
    }
    Ok(session_id)
}
