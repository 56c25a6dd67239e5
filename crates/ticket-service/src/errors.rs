//! Ticket service error types.
//!
//! All errors map to HTTP status codes via the `IntoResponse` impl. Client
//! messages for internal and transport failures are generic; the underlying
//! detail is logged server-side.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Ticket service error type.
///
/// Maps to HTTP status codes:
/// - Validation: 400 Bad Request
/// - Authentication: 401 Unauthorized
/// - Authorization: 403 Forbidden
/// - NotFound: 404 Not Found
/// - Capacity, Conflict: 409 Conflict
/// - Connection: 502 Bad Gateway
/// - Internal: 500 Internal Server Error
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TicketError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Not authorized: {0}")]
    Authorization(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Not enough tickets available: requested {requested}, available {available}")]
    Capacity { requested: u32, available: u32 },

    #[error("Conflict: {0}")]
    Conflict(String),

    /// Transport failure on a live session. Sessions report it through
    /// `SessionOutcome::error`.
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TicketError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            TicketError::Validation(_) => 400,
            TicketError::Authentication(_) => 401,
            TicketError::Authorization(_) => 403,
            TicketError::NotFound(_) => 404,
            TicketError::Capacity { .. } | TicketError::Conflict(_) => 409,
            TicketError::Connection(_) => 502,
            TicketError::Internal(_) => 500,
        }
    }

    /// Stable machine-readable code for the error body.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            TicketError::Validation(_) => "VALIDATION_ERROR",
            TicketError::Authentication(_) => "INVALID_TOKEN",
            TicketError::Authorization(_) => "FORBIDDEN",
            TicketError::NotFound(_) => "NOT_FOUND",
            TicketError::Capacity { .. } => "CAPACITY_EXCEEDED",
            TicketError::Conflict(_) => "CONFLICT",
            TicketError::Connection(_) => "CONNECTION_ERROR",
            TicketError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns a client-safe error message (no internal details).
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            TicketError::Validation(reason)
            | TicketError::Authentication(reason)
            | TicketError::Authorization(reason)
            | TicketError::NotFound(reason)
            | TicketError::Conflict(reason) => reason.clone(),
            TicketError::Capacity { .. } => "Not enough tickets available".to_string(),
            TicketError::Connection(_) => "A connection error occurred".to_string(),
            TicketError::Internal(_) => "An internal error occurred".to_string(),
        }
    }

    /// Hub coordinator is gone (channel closed or reply dropped).
    pub(crate) fn hub_unavailable(detail: impl std::fmt::Display) -> Self {
        tracing::error!(target: "ticket.hub", error = %detail, "Hub coordinator unreachable");
        TicketError::Internal("hub unavailable".to_string())
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl IntoResponse for TicketError {
    fn into_response(self) -> Response {
        match &self {
            TicketError::Internal(detail) => {
                tracing::error!(target: "ticket.http", error = %detail, "Request failed");
            }
            TicketError::Connection(detail) => {
                tracing::warn!(target: "ticket.http", error = %detail, "Upstream connection failed");
            }
            _ => {}
        }

        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let error_response = ErrorResponse {
            error: ErrorDetail {
                code: self.code().to_string(),
                message: self.client_message(),
            },
        };

        let mut response = (status, Json(error_response)).into_response();

        // Add WWW-Authenticate header for 401 responses
        if status == StatusCode::UNAUTHORIZED {
            if let Ok(header_value) = "Bearer realm=\"ticket-hub\", error=\"invalid_token\"".parse()
            {
                response
                    .headers_mut()
                    .insert("WWW-Authenticate", header_value);
            }
        }

        response
    }
}
