//! Observability for the ticket service.
//!
//! All instrumentation uses `#[instrument(skip_all)]` with explicit field
//! allow-listing. Bearer tokens and email addresses are never logged.
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `ticket_sessions_active` | Gauge | none |
//! | `ticket_subscriptions_active` | Gauge | none |
//! | `ticket_hub_queue_depth` | Gauge | none |
//! | `ticket_broadcasts_total` | Counter | `scope` |
//! | `ticket_messages_delivered_total` | Counter | none |
//! | `ticket_messages_dropped_total` | Counter | none |
//! | `ticket_bookings_total` | Counter | `outcome` |
//! | `ticket_cancellations_total` | Counter | `outcome` |
//! | `ticket_booking_lock_wait_seconds` | Histogram | none |

pub mod health;
pub mod metrics;

pub use health::{health_router, HealthState};
