//! DTOs for account management and session issuance.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::{Validate, ValidateEmail, ValidationError, ValidationErrors};

use crate::auth::SessionUser;
use crate::dao::models::UserEntity;
use crate::dto::history::UserStats;
use crate::dto::validation::validate_password_strength;

/// Payload for creating an account.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SignupRequest {
    /// Display name, 3 to 50 characters, unique.
    pub username: String,
    /// Contact address, unique.
    pub email: String,
    /// At least 8 characters with an uppercase letter, a lowercase letter, and a digit.
    pub password: String,
    /// Must repeat `password` exactly.
    pub confirm_password: String,
    /// Terms-of-use checkbox.
    #[serde(default)]
    pub accept_terms: bool,
}

impl Validate for SignupRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        let trimmed = self.username.trim();
        if trimmed.len() < 3 || trimmed.len() > 50 {
            let mut err = ValidationError::new("username_length");
            err.message = Some("Username must be between 3 and 50 characters".into());
            errors.add("username", err);
        }

        if !self.email.validate_email() || self.email.len() > 100 {
            let mut err = ValidationError::new("email");
            err.message = Some("Please enter a valid email address (at most 100 characters)".into());
            errors.add("email", err);
        }

        if let Err(e) = validate_password_strength(&self.password) {
            errors.add("password", e);
        }

        if self.password != self.confirm_password {
            let mut err = ValidationError::new("password_mismatch");
            err.message = Some("Passwords do not match".into());
            errors.add("confirm_password", err);
        }

        if !self.accept_terms {
            let mut err = ValidationError::new("terms_not_accepted");
            err.message = Some("You must accept the terms of use".into());
            errors.add("accept_terms", err);
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

/// Payload for logging into an existing account.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct LoginRequest {
    /// Username or email address.
    #[validate(length(min = 1, message = "Username or email is required"))]
    pub login: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

/// Profile block embedded in session responses.
#[derive(Debug, Serialize, ToSchema)]
pub struct UserProfile {
    /// Account id; absent for guests.
    pub id: Option<i64>,
    pub username: String,
    /// Only known right after signup or login; tokens do not carry it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub guest: bool,
}

impl From<&UserEntity> for UserProfile {
    fn from(user: &UserEntity) -> Self {
        Self {
            id: Some(user.id),
            username: user.username.clone(),
            email: Some(user.email.clone()),
            guest: false,
        }
    }
}

impl From<&SessionUser> for UserProfile {
    fn from(user: &SessionUser) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: None,
            guest: user.guest,
        }
    }
}

/// Session handed to the client after signup, login, or guest entry.
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionResponse {
    /// Bearer token to present in the `Authorization` header.
    pub token: String,
    pub user: UserProfile,
    /// Token lifetime in seconds.
    pub expires_in_secs: u64,
}

/// Response of `GET /auth/me`.
#[derive(Debug, Serialize, ToSchema)]
pub struct MeResponse {
    pub user: UserProfile,
    /// Usage counters for registered accounts; omitted for guests and
    /// while storage is unavailable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<UserStats>,
}
