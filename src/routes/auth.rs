use axum::{
    Extension, Json, Router,
    extract::State,
    middleware,
    routing::{get, post},
};
use axum_valid::Valid;

use crate::{
    auth::SessionUser,
    dto::auth::{LoginRequest, MeResponse, SessionResponse, SignupRequest},
    error::AppError,
    routes::require_session,
    services::auth_service,
    state::SharedState,
};

/// Account management endpoints.
pub fn router(state: SharedState) -> Router<SharedState> {
    let open = Router::new()
        .route("/auth/signup", post(signup))
        .route("/auth/login", post(login))
        .route("/auth/guest", post(guest));

    let protected = Router::new()
        .route("/auth/me", get(me))
        .route_layer(middleware::from_fn_with_state(state, require_session));

    open.merge(protected)
}

/// Create an account and return a session for it.
#[utoipa::path(
    post,
    path = "/auth/signup",
    tag = "auth",
    request_body = SignupRequest,
    responses(
        (status = 200, description = "Account created", body = SessionResponse),
        (status = 400, description = "Validation failed"),
        (status = 409, description = "Username or email already taken"),
        (status = 503, description = "Storage unavailable")
    )
)]
pub async fn signup(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<SignupRequest>>,
) -> Result<Json<SessionResponse>, AppError> {
    Ok(Json(auth_service::signup(&state, payload).await?))
}

/// Log into an existing account.
#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session opened", body = SessionResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 503, description = "Storage unavailable")
    )
)]
pub async fn login(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<LoginRequest>>,
) -> Result<Json<SessionResponse>, AppError> {
    Ok(Json(auth_service::login(&state, payload).await?))
}

/// Open an anonymous session with a reduced question budget.
#[utoipa::path(
    post,
    path = "/auth/guest",
    tag = "auth",
    responses((status = 200, description = "Guest session opened", body = SessionResponse))
)]
pub async fn guest(State(state): State<SharedState>) -> Result<Json<SessionResponse>, AppError> {
    Ok(Json(auth_service::guest_session(&state)?))
}

/// Profile and usage counters of the calling session.
#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "auth",
    params(("Authorization" = String, Header, description = "Bearer session token")),
    responses(
        (status = 200, description = "Caller profile", body = MeResponse),
        (status = 401, description = "Missing or invalid session token")
    )
)]
pub async fn me(
    State(state): State<SharedState>,
    Extension(user): Extension<SessionUser>,
) -> Json<MeResponse> {
    Json(auth_service::current_user(&state, &user).await)
}
