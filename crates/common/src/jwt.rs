//! User token utilities shared across ticket hub components.
//!
//! Viewer and booking requests carry an HS256-signed JWT identifying the user.
//! This module owns the claims layout plus the issue/validate pair so that the
//! service and its test harness agree on the wire format.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing
//! - Only HS256 is accepted; the algorithm in the header is not trusted
//! - All validation failures map to one generic message
//! - `email` is redacted in Debug output

use crate::types::SubjectId;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum allowed JWT size in bytes (8KB).
///
/// Larger tokens are rejected before any base64 decoding or HMAC work.
pub const MAX_JWT_SIZE_BYTES: usize = 8192;

/// Default tolerance applied to `exp`, `nbf`, and `iat` checks.
pub const DEFAULT_LEEWAY: Duration = Duration::from_secs(60);

/// Lifetime of tokens minted by [`issue_user_token`] callers that don't care.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(24 * 60 * 60);

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while issuing or validating user tokens.
///
/// Validation variants share one message so callers can't tell an expired
/// token from a forged one.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtValidationError {
    #[error("The access token is invalid or expired")]
    TokenTooLarge,

    #[error("The access token is invalid or expired")]
    MalformedToken,

    #[error("The access token is invalid or expired")]
    InvalidSignature,

    #[error("The access token is invalid or expired")]
    Expired,

    #[error("The access token is invalid or expired")]
    IatTooFarInFuture,

    #[error("Token signing failed: {0}")]
    SigningFailed(String),
}

// =============================================================================
// Claims Types
// =============================================================================

/// Claims carried by a user access token.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserClaims {
    pub user_id: SubjectId,
    pub username: String,
    /// Redacted in Debug output.
    pub email: String,
    pub exp: i64,
    pub iat: i64,
    pub nbf: i64,
}

impl fmt::Debug for UserClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserClaims")
            .field("user_id", &self.user_id)
            .field("username", &self.username)
            .field("email", &"[REDACTED]")
            .field("exp", &self.exp)
            .field("iat", &self.iat)
            .field("nbf", &self.nbf)
            .finish()
    }
}

impl UserClaims {
    /// Build claims valid from now until now + `ttl`.
    #[must_use]
    pub fn new(user_id: SubjectId, username: &str, email: &str, ttl: Duration) -> Self {
        let now = chrono::Utc::now().timestamp();
        #[allow(clippy::cast_possible_wrap)]
        let ttl_secs = ttl.as_secs() as i64;
        Self {
            user_id,
            username: username.to_string(),
            email: email.to_string(),
            exp: now.saturating_add(ttl_secs),
            iat: now,
            nbf: now,
        }
    }
}

// =============================================================================
// Functions
// =============================================================================

/// Sign `claims` with the shared HS256 secret.
///
/// # Errors
///
/// Returns `JwtValidationError::SigningFailed` if encoding fails.
pub fn issue_user_token(claims: &UserClaims, secret: &[u8]) -> Result<String, JwtValidationError> {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret),
    )
    .map_err(|e| JwtValidationError::SigningFailed(e.to_string()))
}

/// Verify an HS256 user token and return its claims.
///
/// `exp` and `nbf` are enforced by `jsonwebtoken` with `leeway`; `iat` is
/// additionally bounded so tokens minted in the future are rejected.
///
/// # Errors
///
/// Returns a `JwtValidationError` validation variant; all render the same
/// generic message.
pub fn validate_user_token(
    token: &str,
    secret: &[u8],
    leeway: Duration,
) -> Result<UserClaims, JwtValidationError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtValidationError::TokenTooLarge);
    }

    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = leeway.as_secs();
    validation.validate_nbf = true;
    validation.set_required_spec_claims(&["exp", "iat", "nbf"]);

    let data = decode::<UserClaims>(token, &DecodingKey::from_secret(secret), &validation)
        .map_err(|e| {
            use jsonwebtoken::errors::ErrorKind;
            tracing::debug!(target: "common.jwt", error = %e, "Token rejected");
            match e.kind() {
                ErrorKind::InvalidSignature => JwtValidationError::InvalidSignature,
                ErrorKind::ExpiredSignature | ErrorKind::ImmatureSignature => {
                    JwtValidationError::Expired
                }
                _ => JwtValidationError::MalformedToken,
            }
        })?;

    validate_iat_at(data.claims.iat, leeway, chrono::Utc::now().timestamp())?;

    Ok(data.claims)
}

/// Deterministic `iat` check against an explicit `now`.
pub(crate) fn validate_iat_at(
    iat: i64,
    leeway: Duration,
    now: i64,
) -> Result<(), JwtValidationError> {
    #[allow(clippy::cast_possible_wrap)]
    let leeway_secs = leeway.as_secs() as i64;
    let max_iat = now.saturating_add(leeway_secs);

    if iat > max_iat {
        tracing::debug!(
            target: "common.jwt",
            iat = iat,
            now = now,
            max_allowed = max_iat,
            "Token rejected: iat too far in the future"
        );
        return Err(JwtValidationError::IatTooFarInFuture);
    }

    Ok(())
}
