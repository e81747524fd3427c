//! Session tokens for registered users and guests.
//!
//! Tokens are HS256 JWTs signed with the `AUTH_SECRET_KEY` secret. When no key
//! is configured an ephemeral one is generated so local runs still work, at
//! the cost of invalidating every session on restart.

use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::warn;
use uuid::Uuid;

use crate::error::ServiceError;

/// Display name used for anonymous sessions.
pub const GUEST_USERNAME: &str = "Guest";

/// Claims carried inside a session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Account id; absent for guest sessions.
    pub sub: Option<i64>,
    /// Token id, used to tell anonymous callers apart.
    pub jti: String,
    /// Display name shown in the client.
    pub username: String,
    /// Whether this is an anonymous session.
    pub guest: bool,
    /// Issued-at, seconds since the epoch.
    pub iat: i64,
    /// Expiry, seconds since the epoch.
    pub exp: i64,
}

/// Authenticated caller attached to requests once the bearer token checks out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUser {
    /// Account id; absent for guest sessions.
    pub id: Option<i64>,
    /// Token id carried over from the claims.
    pub token_id: String,
    /// Display name.
    pub username: String,
    /// Whether this is an anonymous session.
    pub guest: bool,
}

impl SessionUser {
    /// Session principal for a registered account.
    pub fn registered(id: i64, username: String) -> Self {
        Self {
            id: Some(id),
            token_id: Uuid::new_v4().simple().to_string(),
            username,
            guest: false,
        }
    }

    /// Session principal for an anonymous visitor.
    pub fn guest() -> Self {
        Self {
            id: None,
            token_id: Uuid::new_v4().simple().to_string(),
            username: GUEST_USERNAME.to_string(),
            guest: true,
        }
    }

    /// Key under which this caller is rate limited. Registered users share
    /// one budget across devices; every guest token gets its own.
    pub fn rate_limit_key(&self) -> String {
        match self.id {
            Some(id) => format!("user:{id}"),
            None => format!("guest:{}", self.token_id),
        }
    }
}

impl From<Claims> for SessionUser {
    fn from(claims: Claims) -> Self {
        Self {
            id: claims.sub,
            token_id: claims.jti,
            username: claims.username,
            guest: claims.guest,
        }
    }
}

/// Signing and verification keys for session tokens.
pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SessionKeys {
    /// Build keys from a configured secret.
    pub fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Build keys from the configured secret, generating an ephemeral one
    /// when the deployment did not provide any.
    pub fn from_configured(secret: Option<&str>) -> Self {
        match secret {
            Some(secret) if !secret.is_empty() => Self::from_secret(secret),
            _ => {
                warn!(
                    "AUTH_SECRET_KEY is not configured; using an ephemeral signing key, \
                     sessions will not survive a restart"
                );
                let mut secret = [0u8; 48];
                rand::rng().fill_bytes(&mut secret);
                Self {
                    encoding: EncodingKey::from_secret(&secret),
                    decoding: DecodingKey::from_secret(&secret),
                }
            }
        }
    }

    /// Issue a signed token for `user`, valid for `ttl_hours`.
    pub fn issue(&self, user: &SessionUser, ttl_hours: u64) -> Result<String, ServiceError> {
        let iat = OffsetDateTime::now_utc().unix_timestamp();
        let claims = Claims {
            sub: user.id,
            jti: user.token_id.clone(),
            username: user.username.clone(),
            guest: user.guest,
            iat,
            exp: iat + (ttl_hours as i64) * 3600,
        };
        encode(&Header::default(), &claims, &self.encoding).map_err(ServiceError::TokenIssue)
    }

    /// Verify a token and return the caller it encodes.
    pub fn verify(&self, token: &str) -> Result<SessionUser, jsonwebtoken::errors::Error> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::default())?;
        Ok(data.claims.into())
    }
}
