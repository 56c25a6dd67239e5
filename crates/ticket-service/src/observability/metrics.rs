//! Metrics definitions for the ticket service.
//!
//! All metrics follow Prometheus naming conventions:
//! - `ticket_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded by code:
//! - `scope`: 2 values (event, all)
//! - `outcome`: bounded by the booking/cancellation result enums (< 10 values)

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize the Prometheus recorder and return the handle used by `/metrics`.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if the recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        // Lock waits are expected in the sub-millisecond range
        .set_buckets_for_metric(
            Matcher::Full("ticket_booking_lock_wait_seconds".to_string()),
            &[
                0.0001, 0.0005, 0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 1.000,
            ],
        )
        .map_err(|e| format!("Failed to set lock wait buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus metrics recorder: {e}"))
}

// ============================================================================
// Hub Gauges
// ============================================================================

/// Metric: `ticket_sessions_active`
pub fn set_sessions_active(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("ticket_sessions_active").set(count as f64);
}

/// Metric: `ticket_subscriptions_active`
///
/// Total (session, event) pairs in the subscriber index.
pub fn set_subscriptions_active(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("ticket_subscriptions_active").set(count as f64);
}

/// Metric: `ticket_hub_queue_depth`
///
/// Operations waiting in the coordinator queue. High values mean the hub is
/// falling behind.
pub fn set_hub_queue_depth(depth: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("ticket_hub_queue_depth").set(depth as f64);
}

// ============================================================================
// Fan-out Counters
// ============================================================================

/// Metric: `ticket_broadcasts_total`
/// Labels: `scope` (event, all)
pub fn record_broadcast(scope: &'static str) {
    counter!("ticket_broadcasts_total", "scope" => scope).increment(1);
}

/// Metric: `ticket_messages_delivered_total`
pub fn record_messages_delivered(count: u64) {
    counter!("ticket_messages_delivered_total").increment(count);
}

/// Metric: `ticket_messages_dropped_total`
///
/// Messages discarded because a session mailbox was full.
pub fn record_messages_dropped(count: u64) {
    counter!("ticket_messages_dropped_total").increment(count);
}

// ============================================================================
// Booking Metrics
// ============================================================================

/// Metric: `ticket_bookings_total`
/// Labels: `outcome` (confirmed, capacity, validation, not_found, internal)
pub fn record_booking(outcome: &'static str) {
    counter!("ticket_bookings_total", "outcome" => outcome).increment(1);
}

/// Metric: `ticket_cancellations_total`
/// Labels: `outcome` (cancelled, not_found, forbidden, already_cancelled)
pub fn record_cancellation(outcome: &'static str) {
    counter!("ticket_cancellations_total", "outcome" => outcome).increment(1);
}

/// Metric: `ticket_booking_lock_wait_seconds`
///
/// Time spent waiting for the per-event ledger lock.
pub fn record_lock_wait(duration: Duration) {
    histogram!("ticket_booking_lock_wait_seconds").record(duration.as_secs_f64());
}
