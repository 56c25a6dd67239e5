//! HTTP and WebSocket request handlers.

pub mod bookings;
pub mod events;
pub mod metrics;
pub mod websocket;

pub use bookings::{cancel_booking, create_booking, get_booking, list_bookings};
pub use events::{create_event, delete_event, event_availability, get_event, list_events};
pub use metrics::metrics_handler;
pub use websocket::ws_handler;
