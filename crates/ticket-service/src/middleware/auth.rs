//! Bearer authentication for protected routes.
//!
//! `require_user_auth` extracts the Bearer token from the Authorization
//! header, resolves it through the configured `Authenticator`, and inserts an
//! `AuthenticatedUser` into request extensions.

use crate::auth::Authenticator;
use crate::errors::TicketError;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::IntoResponse,
};
use common::types::SubjectId;
use std::sync::Arc;
use tracing::instrument;

#[derive(Clone)]
pub struct AuthState {
    pub authenticator: Arc<dyn Authenticator>,
}

/// The caller of a protected route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser(pub SubjectId);

fn extract_bearer_token(req: &Request) -> Result<&str, TicketError> {
    let auth_header = req
        .headers()
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            tracing::debug!(target: "ticket.auth", "Missing Authorization header");
            TicketError::Authentication("Missing Authorization header".to_string())
        })?;

    auth_header.strip_prefix("Bearer ").ok_or_else(|| {
        tracing::debug!(target: "ticket.auth", "Invalid Authorization header format");
        TicketError::Authentication("Invalid Authorization header format".to_string())
    })
}

/// Returns 401 if the token is missing or invalid.
#[instrument(skip_all, name = "ticket.middleware.user_auth")]
pub async fn require_user_auth(
    State(state): State<Arc<AuthState>>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, TicketError> {
    let token = extract_bearer_token(&req)?;
    let subject = state.authenticator.authenticate(token)?;

    req.extensions_mut().insert(AuthenticatedUser(subject));

    Ok(next.run(req).await)
}
