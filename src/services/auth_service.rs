use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use rand::RngCore;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::{
    auth::SessionUser,
    dao::models::NewUser,
    dto::auth::{LoginRequest, MeResponse, SessionResponse, SignupRequest, UserProfile},
    dto::history::UserStats,
    error::ServiceError,
    state::SharedState,
};

/// Create an account and open a session for it.
///
/// The password is hashed with Argon2id before it reaches the storage
/// layer. Username and email collisions surface as
/// [`ServiceError::AlreadyExists`].
pub async fn signup(
    state: &SharedState,
    request: SignupRequest,
) -> Result<SessionResponse, ServiceError> {
    let store = state.require_history_store().await?;

    let password_hash = hash_password(&request.password)?;
    let user = store
        .create_user(NewUser {
            username: request.username.trim().to_owned(),
            email: request.email.trim().to_lowercase(),
            password_hash,
        })
        .await?;

    info!(user_id = user.id, username = %user.username, "account created");

    let profile = UserProfile::from(&user);
    open_session(state, SessionUser::registered(user.id, user.username), profile)
}

/// Check credentials and open a session for an existing account.
///
/// Unknown logins, wrong passwords, and deactivated accounts all fail
/// with the same message so the endpoint does not leak which accounts
/// exist.
pub async fn login(
    state: &SharedState,
    request: LoginRequest,
) -> Result<SessionResponse, ServiceError> {
    let store = state.require_history_store().await?;

    let login = request.login.trim().to_owned();
    let Some(user) = store.find_user_by_login(login).await? else {
        return Err(invalid_credentials());
    };

    if !verify_password(&request.password, &user.password_hash) || !user.is_active {
        return Err(invalid_credentials());
    }

    if let Err(err) = store
        .touch_last_login(user.id, OffsetDateTime::now_utc())
        .await
    {
        warn!(user_id = user.id, error = %err, "failed to record login time");
    }

    info!(user_id = user.id, username = %user.username, "user logged in");

    let profile = UserProfile::from(&user);
    open_session(state, SessionUser::registered(user.id, user.username), profile)
}

/// Open an anonymous session.
///
/// Guests need no storage backend, so this works in degraded mode.
/// Each guest token carries its own id and therefore its own rate
/// budget.
pub fn guest_session(state: &SharedState) -> Result<SessionResponse, ServiceError> {
    let user = SessionUser::guest();
    let profile = UserProfile::from(&user);
    open_session(state, user, profile)
}

/// Profile of the caller as seen by the session token.
///
/// Registered accounts also get their usage counters when storage is
/// reachable; a storage outage degrades to the bare profile instead of
/// failing the request.
pub async fn current_user(state: &SharedState, user: &SessionUser) -> MeResponse {
    let mut stats = None;
    if let Some(user_id) = user.id {
        if let Some(store) = state.history_store().await {
            match store.user_stats(user_id).await {
                Ok(counters) => stats = Some(UserStats::from(counters)),
                Err(err) => warn!(user_id, error = %err, "failed to load usage stats"),
            }
        }
    }

    MeResponse {
        user: UserProfile::from(user),
        stats,
    }
}

fn open_session(
    state: &SharedState,
    user: SessionUser,
    profile: UserProfile,
) -> Result<SessionResponse, ServiceError> {
    let ttl_hours = state.settings().auth.session_ttl_hours;
    let token = state.session_keys().issue(&user, ttl_hours)?;
    Ok(SessionResponse {
        token,
        user: profile,
        expires_in_secs: ttl_hours * 3600,
    })
}

fn invalid_credentials() -> ServiceError {
    ServiceError::Unauthorized("invalid username or password".into())
}

fn hash_password(password: &str) -> Result<String, ServiceError> {
    let mut salt_bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut salt_bytes);
    let salt = SaltString::encode_b64(&salt_bytes).map_err(ServiceError::PasswordHash)?;

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(ServiceError::PasswordHash)
}

fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}
