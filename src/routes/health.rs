use axum::{Json, Router, extract::State, routing::get};

use crate::{dto::health::HealthResponse, services::health_service, state::SharedState};

/// Liveness and dependency probes.
pub fn router() -> Router<SharedState> {
    Router::new().route("/healthcheck", get(healthcheck))
}

#[utoipa::path(
    get,
    path = "/healthcheck",
    responses((status = 200, description = "Health report for storage and retrieval", body = HealthResponse))
)]
/// Probe the storage backend and the vector store and report both.
///
/// Always answers 200; a failing dependency shows up in the body so
/// uptime monitors can alert on `status != "ok"` without losing detail.
pub async fn healthcheck(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(health_service::health_status(&state).await)
}
