//! Ticket Service Library
//!
//! Live ticket availability over WebSocket plus a booking engine that never
//! oversells an event.
//!
//! # Architecture
//!
//! ```text
//! handlers/*.rs -> booking::BookingEngine -> hub::HubHandle -> session::Session
//! ```
//!
//! The hub is a single actor that owns the session registry and the
//! subscription index. Sessions own their transport and talk to the hub
//! through its handle. The booking engine serializes each event behind its
//! own lock and publishes availability after every commit.
//!
//! # Modules
//!
//! - `protocol` - Client/server message types and decoding
//! - `session` - Per-connection read/write loops
//! - `hub` - Session registry, subscriptions, and fan-out
//! - `booking` - Events, bookings, and capacity enforcement
//! - `auth` - Credential validation seam
//! - `config` - Service configuration from environment
//! - `errors` - Error types with HTTP status code mapping
//! - `observability` - Metrics and health endpoints
//! - `handlers`, `middleware`, `routes` - HTTP/WebSocket surface

pub mod auth;
pub mod booking;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod hub;
pub mod middleware;
pub mod observability;
pub mod protocol;
pub mod routes;
pub mod session;
