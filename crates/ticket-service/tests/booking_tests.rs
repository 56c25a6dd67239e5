//! Integration tests for the booking engine.
//!
//! Concurrency against a single event, cancellation rules, the
//! availability updates that follow each commit, and callers that give up
//! halfway through a request.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]

use std::pin::pin;
use std::sync::Arc;

use common::types::{BookingId, EventId, SubjectId};
use ticket_service::booking::{BookingEngine, BookingStatus, EventFilters, NewEvent};
use ticket_service::errors::TicketError;
use ticket_service::hub::HubHandle;
use ticket_service::protocol::ServerMessage;
use ticket_test_utils::{register_raw, spawn_hub};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const ORGANIZER: SubjectId = SubjectId(500);

fn new_event(capacity: u32) -> NewEvent {
    NewEvent {
        name: "Stadium Show".to_string(),
        description: "Night one".to_string(),
        venue: "Stadium".to_string(),
        capacity,
        unit_price_cents: 4_500,
        ..NewEvent::default()
    }
}

async fn engine_with_event(capacity: u32) -> (Arc<BookingEngine>, HubHandle, EventId) {
    let hub = spawn_hub();
    let engine = Arc::new(BookingEngine::new(hub.clone()));
    let event = engine.create_event(ORGANIZER, new_event(capacity)).await.unwrap();
    (engine, hub, event.id)
}

/// Subscribe a bare mailbox to `event_id` and skip its ack.
async fn watch(
    hub: &HubHandle,
    event_id: EventId,
) -> mpsc::Receiver<Arc<ServerMessage>> {
    let (id, mut rx) = register_raw(hub, SubjectId(999), 256).await;
    assert_eq!(rx.recv().await.unwrap().kind(), "connection_ack");
    hub.subscribe(id, event_id).await.unwrap();
    rx
}

fn available_of(message: &ServerMessage) -> u64 {
    let value = serde_json::to_value(message).unwrap();
    assert_eq!(value["type"], "availability_update");
    value["data"]["available_tickets"].as_u64().unwrap()
}

// ============================================================================
// Capacity under concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_twenty_buyers_for_ten_seats() {
    let (engine, _hub, event_id) = engine_with_event(10).await;

    let mut tasks = Vec::new();
    for buyer in 0..20 {
        let engine = Arc::clone(&engine);
        tasks.push(tokio::spawn(async move {
            engine.create_booking(SubjectId(buyer), event_id, 1).await
        }));
    }

    let mut confirmed = 0;
    let mut rejected = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => confirmed += 1,
            Err(TicketError::Capacity { requested, .. }) => {
                assert_eq!(requested, 1);
                rejected += 1;
            }
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    assert_eq!(confirmed, 10);
    assert_eq!(rejected, 10);

    let availability = engine.availability(event_id).await.unwrap();
    assert_eq!(availability.available, 0);
    assert_eq!(availability.confirmed_booked, 10);
    assert_eq!(engine.confirmed_total(event_id).await.unwrap(), 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_multi_ticket_orders_never_oversell() {
    let (engine, _hub, event_id) = engine_with_event(100).await;

    let mut tasks = Vec::new();
    for buyer in 0..50 {
        let engine = Arc::clone(&engine);
        tasks.push(tokio::spawn(async move {
            engine.create_booking(SubjectId(buyer), event_id, 3).await
        }));
    }

    let mut confirmed = 0;
    for task in tasks {
        if task.await.unwrap().is_ok() {
            confirmed += 1;
        }
    }

    assert_eq!(confirmed, 33);
    assert_eq!(engine.availability(event_id).await.unwrap().available, 1);
    assert_eq!(engine.confirmed_total(event_id).await.unwrap(), 99);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_separate_events_do_not_share_capacity() {
    let hub = spawn_hub();
    let engine = Arc::new(BookingEngine::new(hub));
    let first = engine.create_event(ORGANIZER, new_event(5)).await.unwrap();
    let second = engine.create_event(ORGANIZER, new_event(5)).await.unwrap();

    let mut tasks = Vec::new();
    for buyer in 0..10 {
        let engine = Arc::clone(&engine);
        let event_id = if buyer % 2 == 0 { first.id } else { second.id };
        tasks.push(tokio::spawn(async move {
            engine.create_booking(SubjectId(buyer), event_id, 1).await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(engine.availability(first.id).await.unwrap().available, 0);
    assert_eq!(engine.availability(second.id).await.unwrap().available, 0);
}

#[tokio::test]
async fn test_exact_fit_then_rejection() {
    let (engine, _hub, event_id) = engine_with_event(4).await;

    let booking = engine.create_booking(SubjectId(1), event_id, 4).await.unwrap();
    assert_eq!(booking.total_price_cents, 18_000);

    let err = engine
        .create_booking(SubjectId(2), event_id, 1)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        TicketError::Capacity {
            requested: 1,
            available: 0
        }
    );
}

#[tokio::test]
async fn test_zero_quantity_is_validation_error() {
    let (engine, _hub, event_id) = engine_with_event(4).await;
    let err = engine
        .create_booking(SubjectId(1), event_id, 0)
        .await
        .unwrap_err();
    assert!(matches!(err, TicketError::Validation(_)));
    assert_eq!(engine.availability(event_id).await.unwrap().available, 4);
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test]
async fn test_cancel_frees_capacity() {
    let (engine, _hub, event_id) = engine_with_event(2).await;

    let first = engine.create_booking(SubjectId(1), event_id, 1).await.unwrap();
    engine.create_booking(SubjectId(2), event_id, 1).await.unwrap();
    assert!(engine.create_booking(SubjectId(3), event_id, 1).await.is_err());

    let cancelled = engine.cancel_booking(first.id, SubjectId(1)).await.unwrap();
    assert_eq!(cancelled.status, BookingStatus::Cancelled);
    assert!(cancelled.cancelled_at.is_some());
    assert_eq!(engine.availability(event_id).await.unwrap().available, 1);

    engine.create_booking(SubjectId(3), event_id, 1).await.unwrap();
    assert_eq!(engine.availability(event_id).await.unwrap().available, 0);
}

#[tokio::test]
async fn test_double_cancel_is_conflict() {
    let (engine, _hub, event_id) = engine_with_event(5).await;
    let booking = engine.create_booking(SubjectId(1), event_id, 2).await.unwrap();

    engine.cancel_booking(booking.id, SubjectId(1)).await.unwrap();
    let err = engine
        .cancel_booking(booking.id, SubjectId(1))
        .await
        .unwrap_err();

    assert!(matches!(err, TicketError::Conflict(_)));
    // Capacity is released once, not twice.
    let availability = engine.availability(event_id).await.unwrap();
    assert_eq!(availability.available, 5);
    assert_eq!(availability.confirmed_booked, 0);
}

#[tokio::test]
async fn test_cancel_by_other_subject_is_forbidden() {
    let (engine, _hub, event_id) = engine_with_event(5).await;
    let booking = engine.create_booking(SubjectId(1), event_id, 2).await.unwrap();

    let err = engine
        .cancel_booking(booking.id, SubjectId(2))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        TicketError::Authorization("Unauthorized to cancel this booking".to_string())
    );

    let stored = engine.get_booking(booking.id).await.unwrap();
    assert_eq!(stored.status, BookingStatus::Confirmed);
    assert_eq!(engine.availability(event_id).await.unwrap().available, 3);
}

#[tokio::test]
async fn test_cancel_unknown_booking_is_not_found() {
    let (engine, _hub, _event_id) = engine_with_event(5).await;
    let err = engine
        .cancel_booking(BookingId(12_345), SubjectId(1))
        .await
        .unwrap_err();
    assert!(matches!(err, TicketError::NotFound(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_cancels_release_once() {
    let (engine, _hub, event_id) = engine_with_event(3).await;
    let booking = engine.create_booking(SubjectId(1), event_id, 3).await.unwrap();

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let engine = Arc::clone(&engine);
        tasks.push(tokio::spawn(async move {
            engine.cancel_booking(booking.id, SubjectId(1)).await
        }));
    }

    let mut succeeded = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(e) => assert!(matches!(e, TicketError::Conflict(_))),
        }
    }

    assert_eq!(succeeded, 1);
    assert_eq!(engine.availability(event_id).await.unwrap().available, 3);
}

// ============================================================================
// Availability broadcasts
// ============================================================================

#[tokio::test]
async fn test_updates_carry_post_commit_availability() {
    let (engine, hub, event_id) = engine_with_event(10).await;
    let mut rx = watch(&hub, event_id).await;

    let booking = engine.create_booking(SubjectId(1), event_id, 3).await.unwrap();
    let after_booking = rx.recv().await.unwrap();
    assert_eq!(after_booking.event_id, Some(event_id));
    assert_eq!(available_of(&after_booking), 7);

    engine.cancel_booking(booking.id, SubjectId(1)).await.unwrap();
    assert_eq!(available_of(&rx.recv().await.unwrap()), 10);
}

#[tokio::test]
async fn test_rejected_booking_publishes_nothing() {
    let (engine, hub, event_id) = engine_with_event(1).await;
    let mut rx = watch(&hub, event_id).await;

    engine.create_booking(SubjectId(1), event_id, 1).await.unwrap();
    assert_eq!(available_of(&rx.recv().await.unwrap()), 0);

    assert!(engine.create_booking(SubjectId(2), event_id, 1).await.is_err());
    hub.status().await.unwrap();
    assert!(rx.try_recv().is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_updates_arrive_in_commit_order() {
    let (engine, hub, event_id) = engine_with_event(10).await;
    let mut rx = watch(&hub, event_id).await;

    let mut tasks = Vec::new();
    for buyer in 0..10 {
        let engine = Arc::clone(&engine);
        tasks.push(tokio::spawn(async move {
            engine.create_booking(SubjectId(buyer), event_id, 1).await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let mut seen = Vec::new();
    for _ in 0..10 {
        seen.push(available_of(&rx.recv().await.unwrap()));
    }
    assert_eq!(seen, (0..10).rev().collect::<Vec<u64>>());
}

#[tokio::test]
async fn test_updates_only_reach_that_events_watchers() {
    let hub = spawn_hub();
    let engine = BookingEngine::new(hub.clone());
    let watched = engine.create_event(ORGANIZER, new_event(5)).await.unwrap();
    let other = engine.create_event(ORGANIZER, new_event(5)).await.unwrap();
    let mut rx = watch(&hub, watched.id).await;

    engine.create_booking(SubjectId(1), other.id, 1).await.unwrap();
    engine.create_booking(SubjectId(1), watched.id, 2).await.unwrap();

    let update = rx.recv().await.unwrap();
    assert_eq!(update.event_id, Some(watched.id));
    assert_eq!(available_of(&update), 3);
    hub.status().await.unwrap();
    assert!(rx.try_recv().is_err());
}

// ============================================================================
// Abandoned requests
// ============================================================================

/// Engine whose hub queue holds a single message and has not been drained,
/// so the next mutation waits for room after taking the event lock.
async fn engine_with_full_queue(capacity: u32) -> (BookingEngine, HubHandle, EventId) {
    let (hub, _task) = HubHandle::spawn(1, CancellationToken::new());
    let engine = BookingEngine::new(hub.clone());
    let event = engine
        .create_event(ORGANIZER, new_event(capacity))
        .await
        .unwrap();
    hub.publish(ServerMessage::pong()).await.unwrap();
    (engine, hub, event.id)
}

#[tokio::test]
async fn test_booking_dropped_while_waiting_on_hub_changes_nothing() {
    let (engine, _hub, event_id) = engine_with_full_queue(5).await;

    {
        let mut booking = pin!(engine.create_booking(SubjectId(1), event_id, 5));
        assert!(futures::poll!(booking.as_mut()).is_pending());
    }

    let availability = engine.availability(event_id).await.unwrap();
    assert_eq!(availability.available, 5);
    assert_eq!(availability.confirmed_booked, 0);
    assert!(engine.list_bookings(SubjectId(1)).await.is_empty());

    // The event lock was released with the dropped request.
    let booking = engine.create_booking(SubjectId(1), event_id, 5).await.unwrap();
    assert_eq!(engine.availability(event_id).await.unwrap().available, 0);
    engine.cancel_booking(booking.id, SubjectId(1)).await.unwrap();
    assert_eq!(engine.availability(event_id).await.unwrap().available, 5);
}

#[tokio::test]
async fn test_cancel_dropped_while_waiting_on_hub_changes_nothing() {
    let (engine, hub, event_id) = engine_with_full_queue(5).await;
    let booking = engine.create_booking(SubjectId(1), event_id, 2).await.unwrap();
    hub.publish(ServerMessage::pong()).await.unwrap();

    {
        let mut cancel = pin!(engine.cancel_booking(booking.id, SubjectId(1)));
        assert!(futures::poll!(cancel.as_mut()).is_pending());
    }

    let stored = engine.get_booking(booking.id).await.unwrap();
    assert_eq!(stored.status, BookingStatus::Confirmed);
    assert_eq!(engine.availability(event_id).await.unwrap().available, 3);

    let cancelled = engine.cancel_booking(booking.id, SubjectId(1)).await.unwrap();
    assert_eq!(cancelled.status, BookingStatus::Cancelled);
    assert_eq!(engine.availability(event_id).await.unwrap().available, 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_aborted_buyers_leave_consistent_state() {
    let (engine, hub, event_id) = engine_with_event(20).await;
    let mut rx = watch(&hub, event_id).await;

    let mut tasks = Vec::new();
    for buyer in 0..20 {
        let engine = Arc::clone(&engine);
        tasks.push(tokio::spawn(async move {
            engine.create_booking(SubjectId(buyer), event_id, 1).await
        }));
    }
    tokio::task::yield_now().await;
    for task in tasks.iter().step_by(2) {
        task.abort();
    }
    for task in tasks {
        if let Ok(result) = task.await {
            result.unwrap();
        }
    }

    let mut confirmed = Vec::new();
    for buyer in 0..20 {
        confirmed.extend(engine.list_bookings(SubjectId(buyer)).await);
    }
    let availability = engine.availability(event_id).await.unwrap();
    assert_eq!(availability.confirmed_booked as usize, confirmed.len());
    assert_eq!(
        engine.confirmed_total(event_id).await.unwrap(),
        confirmed.len() as u64
    );

    // One update per committed booking, none for the aborted ones.
    hub.status().await.unwrap();
    let mut updates = 0;
    while let Ok(message) = rx.try_recv() {
        available_of(&message);
        updates += 1;
    }
    assert_eq!(updates, confirmed.len());

    for booking in confirmed {
        assert_eq!(engine.get_booking(booking.id).await.unwrap().id, booking.id);
        engine.cancel_booking(booking.id, booking.subject).await.unwrap();
    }
    assert_eq!(engine.availability(event_id).await.unwrap().available, 20);
}

// ============================================================================
// Catalog and history
// ============================================================================

#[tokio::test]
async fn test_list_events_reports_live_availability() {
    let (engine, _hub, event_id) = engine_with_event(10).await;
    engine.create_booking(SubjectId(1), event_id, 4).await.unwrap();

    let page = engine.list_events(&EventFilters::default()).await;
    assert_eq!(page.total, 1);
    assert_eq!(page.events[0].event.id, event_id);
    assert_eq!(page.events[0].available_tickets, 6);
}

#[tokio::test]
async fn test_list_bookings_includes_cancelled() {
    let (engine, _hub, event_id) = engine_with_event(10).await;
    let kept = engine.create_booking(SubjectId(1), event_id, 1).await.unwrap();
    let dropped = engine.create_booking(SubjectId(1), event_id, 1).await.unwrap();
    engine.cancel_booking(dropped.id, SubjectId(1)).await.unwrap();

    let mine = engine.list_bookings(SubjectId(1)).await;
    assert_eq!(mine.len(), 2);
    assert_eq!(mine[0].id, dropped.id);
    assert_eq!(mine[0].status, BookingStatus::Cancelled);
    assert_eq!(mine[1].id, kept.id);
    assert!(engine.list_bookings(SubjectId(2)).await.is_empty());
}
