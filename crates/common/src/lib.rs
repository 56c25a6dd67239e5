//! Common utilities and types shared across ticket hub components.

#![warn(clippy::pedantic)]

/// Module for identifier types
pub mod types;

/// Module for secret types that prevent accidental logging
pub mod secret;

/// Module for user token issue/validation
pub mod jwt;
