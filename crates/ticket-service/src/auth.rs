//! Credential validation seam.
//!
//! Sessions and protected routes only need "token in, subject out". The
//! default implementation verifies HS256 user tokens via `common::jwt`.

use crate::errors::TicketError;
use common::jwt::{validate_user_token, UserClaims};
use common::secret::{ExposeSecret, SecretString};
use common::types::SubjectId;
use std::time::Duration;

/// Turns a bearer credential into a subject id.
pub trait Authenticator: Send + Sync {
    /// # Errors
    ///
    /// `Authentication` for any missing, malformed, or expired credential.
    fn authenticate(&self, token: &str) -> Result<SubjectId, TicketError>;
}

/// HS256 bearer token validator.
pub struct JwtAuthenticator {
    secret: SecretString,
    leeway: Duration,
}

impl JwtAuthenticator {
    #[must_use]
    pub fn new(secret: SecretString, leeway: Duration) -> Self {
        Self { secret, leeway }
    }

    /// Validate and return the full claims.
    ///
    /// # Errors
    ///
    /// `Authentication` with a generic message; the reason is logged at debug.
    pub fn validate(&self, token: &str) -> Result<UserClaims, TicketError> {
        validate_user_token(token, self.secret.expose_secret().as_bytes(), self.leeway).map_err(
            |e| {
                tracing::debug!(target: "ticket.auth", error = ?e, "Credential rejected");
                TicketError::Authentication(e.to_string())
            },
        )
    }
}

impl Authenticator for JwtAuthenticator {
    fn authenticate(&self, token: &str) -> Result<SubjectId, TicketError> {
        if token.is_empty() {
            return Err(TicketError::Authentication(
                "Missing access token".to_string(),
            ));
        }
        self.validate(token).map(|claims| claims.user_id)
    }
}
