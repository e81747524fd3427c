use axum::{
    Extension, Router,
    extract::{Path, Query, State},
    http::header,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};

use crate::{
    auth::SessionUser,
    dto::export::ExportQuery,
    error::AppError,
    routes::{require_session, validated_session_id},
    services::export_service,
    state::SharedState,
};

/// Conversation download endpoint, registered accounts only.
pub fn router(state: SharedState) -> Router<SharedState> {
    Router::new()
        .route("/export/sessions/{session_id}", get(export_session))
        .route_layer(middleware::from_fn_with_state(state, require_session))
}

/// Download one conversation as a file.
#[utoipa::path(
    get,
    path = "/export/sessions/{session_id}",
    tag = "export",
    params(
        ("Authorization" = String, Header, description = "Bearer session token"),
        ("session_id" = String, Path, description = "Conversation identifier"),
        ExportQuery
    ),
    responses(
        (status = 200, description = "Rendered transcript as an attachment", body = String),
        (status = 403, description = "Guest sessions have no stored history"),
        (status = 404, description = "No stored messages for this conversation"),
        (status = 503, description = "Storage unavailable")
    )
)]
pub async fn export_session(
    State(state): State<SharedState>,
    Extension(user): Extension<SessionUser>,
    Path(session_id): Path<String>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, AppError> {
    let session_id = validated_session_id(session_id)?;
    let file = export_service::export_session(&state, &user, session_id, query.format).await?;

    let headers = [
        (header::CONTENT_TYPE, file.content_type.to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", file.filename),
        ),
    ];
    Ok((headers, file.body).into_response())
}
