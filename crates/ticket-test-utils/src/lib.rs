//! # Ticket Test Utilities
//!
//! Shared test utilities for the ticket service.
//!
//! This crate provides:
//! - Token fixtures signed with a fixed test secret (`test_token`, `TestTokenBuilder`)
//! - An in-memory peer that drives a `Session` without a socket (`TestPeer`)
//! - Raw hub registration for fan-out tests (`register_raw`)
//! - Application state wired for route tests (`test_app_state`)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ticket_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let hub = spawn_hub();
//!     let (mut peer, _session_id, _task) = spawn_session(&hub, SubjectId(1), fast_session_config());
//!
//!     assert_eq!(peer.expect_message().await["type"], "connection_ack");
//!     peer.send_json(&serde_json::json!({"type": "ping"}));
//!     assert_eq!(peer.expect_message().await["type"], "pong");
//! }
//! ```

pub mod app;
pub mod peer;
pub mod tokens;

// Re-export commonly used items
pub use app::*;
pub use peer::*;
pub use tokens::*;
