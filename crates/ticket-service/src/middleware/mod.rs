//! HTTP middleware for the ticket service.

pub mod auth;

pub use auth::{require_user_auth, AuthState, AuthenticatedUser};
