//! In-process counters for the hub coordinator.
//!
//! Shared between every `HubHandle` clone (which records enqueues) and the
//! coordinator (which records dequeues and delivery outcomes). Values are also
//! mirrored to the Prometheus recorder.

use crate::observability::metrics as prom;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tracing::{debug, warn};

/// Queue depth above which the coordinator is considered to be falling behind.
pub const QUEUE_DEPTH_WARNING: usize = 500;

/// Queue depth at which an elevated-depth debug line is emitted once.
pub const QUEUE_DEPTH_NORMAL: usize = 100;

#[derive(Debug, Default)]
pub struct HubMetrics {
    queue_depth: AtomicUsize,
    peak_queue_depth: AtomicUsize,
    operations_processed: AtomicU64,
    messages_delivered: AtomicU64,
    messages_dropped: AtomicU64,
}

impl HubMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an operation entering the coordinator queue.
    pub fn record_enqueue(&self) {
        let new_depth = self.queue_depth.fetch_add(1, Ordering::Relaxed) + 1;
        self.peak_queue_depth.fetch_max(new_depth, Ordering::Relaxed);

        if new_depth > QUEUE_DEPTH_WARNING {
            warn!(
                target: "ticket.hub",
                depth = new_depth,
                threshold = QUEUE_DEPTH_WARNING,
                "Hub queue depth critical"
            );
        } else if new_depth == QUEUE_DEPTH_NORMAL {
            debug!(target: "ticket.hub", depth = new_depth, "Hub queue depth elevated");
        }
        prom::set_hub_queue_depth(new_depth);
    }

    /// Undo an enqueue whose send failed.
    pub fn record_enqueue_failed(&self) {
        self.decrement_depth();
    }

    /// Record an operation leaving the queue (about to be processed).
    pub fn record_dequeue(&self) {
        let depth = self.decrement_depth();
        self.operations_processed.fetch_add(1, Ordering::Relaxed);
        prom::set_hub_queue_depth(depth);
    }

    fn decrement_depth(&self) -> usize {
        // Saturating: never underflow if a dequeue races ahead of its enqueue record.
        let previous = self
            .queue_depth
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |d| {
                Some(d.saturating_sub(1))
            })
            .unwrap_or(0);
        previous.saturating_sub(1)
    }

    pub fn record_delivered(&self, count: u64) {
        if count > 0 {
            self.messages_delivered.fetch_add(count, Ordering::Relaxed);
            prom::record_messages_delivered(count);
        }
    }

    pub fn record_dropped(&self, count: u64) {
        if count > 0 {
            self.messages_dropped.fetch_add(count, Ordering::Relaxed);
            prom::record_messages_dropped(count);
        }
    }

    #[must_use]
    pub fn queue_depth(&self) -> usize {
        self.queue_depth.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn peak_queue_depth(&self) -> usize {
        self.peak_queue_depth.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn operations_processed(&self) -> u64 {
        self.operations_processed.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn messages_delivered(&self) -> u64 {
        self.messages_delivered.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn messages_dropped(&self) -> u64 {
        self.messages_dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_depth_tracking() {
        let metrics = HubMetrics::new();

        metrics.record_enqueue();
        metrics.record_enqueue();
        metrics.record_enqueue();
        assert_eq!(metrics.queue_depth(), 3);
        assert_eq!(metrics.peak_queue_depth(), 3);

        metrics.record_dequeue();
        metrics.record_dequeue();
        assert_eq!(metrics.queue_depth(), 1);
        assert_eq!(metrics.peak_queue_depth(), 3);
        assert_eq!(metrics.operations_processed(), 2);
    }

    #[test]
    fn test_dequeue_never_underflows() {
        let metrics = HubMetrics::new();
        metrics.record_dequeue();
        assert_eq!(metrics.queue_depth(), 0);
    }

    #[test]
    fn test_failed_enqueue_is_reverted() {
        let metrics = HubMetrics::new();
        metrics.record_enqueue();
        metrics.record_enqueue_failed();
        assert_eq!(metrics.queue_depth(), 0);
        assert_eq!(metrics.operations_processed(), 0);
    }

    #[test]
    fn test_delivery_counters() {
        let metrics = HubMetrics::new();
        metrics.record_delivered(4);
        metrics.record_delivered(0);
        metrics.record_dropped(1);

        assert_eq!(metrics.messages_delivered(), 4);
        assert_eq!(metrics.messages_dropped(), 1);
    }
}
