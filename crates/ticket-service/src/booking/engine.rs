//! `BookingEngine` - the only path that creates or cancels bookings.
//!
//! Each event's ledger sits behind its own `tokio::sync::Mutex`. The capacity
//! read, the check, and the insert all happen under that lock, so concurrent
//! buyers for one event are serialized while different events proceed in
//! parallel.
//!
//! # Commit discipline
//!
//! A mutation awaits only while acquiring: the event lock, then a reserved
//! slot in the hub queue. The ledger change, the booking index entry, and
//! the availability update are then applied with no await point between
//! them. Dropping the caller's future therefore either leaves no trace or
//! happens after the whole commit, never in the middle of one. Because the
//! update is enqueued before the lock is released, updates for one event
//! reach subscribers in commit order.

use crate::errors::TicketError;
use crate::hub::{HubHandle, PublishSlot};
use crate::observability::metrics as prom;
use crate::protocol::ServerMessage;

use super::catalog::{EventFilters, EventPage};
use super::models::{
    Availability, Booking, Event, EventLedger, EventListing, EventStatus, NewEvent,
};

use chrono::Utc;
use common::types::{BookingId, EventId, SubjectId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock as SyncRwLock};
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

pub struct BookingEngine {
    events: RwLock<HashMap<EventId, Arc<Mutex<EventLedger>>>>,
    /// booking id -> owning event, for cancellation lookups. Written inside
    /// a commit, so it is a blocking lock that is never held across an await.
    booking_index: SyncRwLock<HashMap<BookingId, EventId>>,
    next_event_id: AtomicU64,
    next_booking_id: AtomicU64,
    hub: HubHandle,
}

impl BookingEngine {
    #[must_use]
    pub fn new(hub: HubHandle) -> Self {
        Self {
            events: RwLock::new(HashMap::new()),
            booking_index: SyncRwLock::new(HashMap::new()),
            next_event_id: AtomicU64::new(1),
            next_booking_id: AtomicU64::new(1),
            hub,
        }
    }

    async fn ledger(&self, event_id: EventId) -> Result<Arc<Mutex<EventLedger>>, TicketError> {
        self.events
            .read()
            .await
            .get(&event_id)
            .cloned()
            .ok_or_else(|| TicketError::NotFound("Event not found".to_string()))
    }

    /// Lock a ledger, recording how long the wait took.
    async fn lock(ledger: &Mutex<EventLedger>) -> tokio::sync::MutexGuard<'_, EventLedger> {
        let started = Instant::now();
        let guard = ledger.lock().await;
        prom::record_lock_wait(started.elapsed());
        guard
    }

    fn indexed_event(&self, booking_id: BookingId) -> Option<EventId> {
        self.booking_index
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&booking_id)
            .copied()
    }

    fn index_booking(&self, booking_id: BookingId, event_id: EventId) {
        self.booking_index
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(booking_id, event_id);
    }

    /// Add an event to the catalog, organized by `organizer`.
    ///
    /// # Errors
    ///
    /// `Validation` for an empty name or zero capacity.
    #[instrument(skip_all, name = "ticket.booking.create_event")]
    pub async fn create_event(
        &self,
        organizer: SubjectId,
        new_event: NewEvent,
    ) -> Result<Event, TicketError> {
        new_event.validate()?;

        let event = Event {
            id: EventId(self.next_event_id.fetch_add(1, Ordering::Relaxed)),
            organizer_id: organizer,
            name: new_event.name.trim().to_string(),
            description: new_event.description,
            event_type: new_event.event_type,
            status: EventStatus::Published,
            venue: new_event.venue,
            city: new_event.city,
            address: new_event.address,
            starts_at: new_event.starts_at,
            capacity: new_event.capacity,
            unit_price_cents: new_event.unit_price_cents,
            image_url: new_event.image_url,
            created_at: Utc::now(),
        };

        self.events
            .write()
            .await
            .insert(event.id, Arc::new(Mutex::new(EventLedger::new(event.clone()))));

        info!(
            target: "ticket.booking",
            event_id = %event.id,
            capacity = event.capacity,
            "Event created"
        );
        Ok(event)
    }

    /// An event with its current availability.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown or deleted event.
    pub async fn get_event(&self, event_id: EventId) -> Result<EventListing, TicketError> {
        let ledger = self.ledger(event_id).await?;
        let guard = ledger.lock().await;
        if !guard.is_listed() {
            return Err(TicketError::NotFound("Event not found".to_string()));
        }
        Ok(EventListing {
            event: guard.event.clone(),
            available_tickets: guard.available(),
        })
    }

    /// One page of the catalog, filtered and sorted by `filters`.
    pub async fn list_events(&self, filters: &EventFilters) -> EventPage {
        let ledgers: Vec<Arc<Mutex<EventLedger>>> =
            self.events.read().await.values().cloned().collect();

        let mut listings = Vec::with_capacity(ledgers.len());
        for ledger in ledgers {
            let guard = ledger.lock().await;
            if guard.is_listed() {
                listings.push(EventListing {
                    event: guard.event.clone(),
                    available_tickets: guard.available(),
                });
            }
        }

        filters.apply(listings)
    }

    /// Remove an event from the catalog. Its booking history stays readable.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown or already deleted event, `Authorization`
    /// if `subject` is not the organizer, `Conflict` while bookings are
    /// still confirmed.
    #[instrument(skip_all, name = "ticket.booking.delete_event", fields(event_id = %event_id))]
    pub async fn delete_event(
        &self,
        event_id: EventId,
        subject: SubjectId,
    ) -> Result<(), TicketError> {
        let ledger = self.ledger(event_id).await?;
        let mut guard = Self::lock(&ledger).await;

        if let Err(e) = guard.delete(subject) {
            debug!(target: "ticket.booking", error = %e, "Event deletion rejected");
            return Err(e);
        }

        info!(target: "ticket.booking", "Event deleted");
        Ok(())
    }

    /// # Errors
    ///
    /// `NotFound` for an unknown or deleted event.
    pub async fn availability(&self, event_id: EventId) -> Result<Availability, TicketError> {
        let ledger = self.ledger(event_id).await?;
        let guard = ledger.lock().await;
        if !guard.is_listed() {
            return Err(TicketError::NotFound("Event not found".to_string()));
        }
        Ok(guard.availability())
    }

    /// Reserve `quantity` tickets for `subject`.
    ///
    /// # Errors
    ///
    /// `Validation` for zero quantity, `NotFound` for an unknown event,
    /// `Capacity` if not enough tickets remain.
    #[instrument(skip_all, name = "ticket.booking.create", fields(event_id = %event_id, quantity = quantity))]
    pub async fn create_booking(
        &self,
        subject: SubjectId,
        event_id: EventId,
        quantity: u32,
    ) -> Result<Booking, TicketError> {
        if quantity == 0 {
            prom::record_booking("validation");
            return Err(TicketError::Validation(
                "Quantity must be greater than zero".to_string(),
            ));
        }

        let ledger = match self.ledger(event_id).await {
            Ok(ledger) => ledger,
            Err(e) => {
                prom::record_booking("not_found");
                return Err(e);
            }
        };

        let mut guard = Self::lock(&ledger).await;
        let slot = self.publish_slot(event_id).await;

        // No await from here on.
        let booking = match guard.reserve(subject, quantity, || {
            BookingId(self.next_booking_id.fetch_add(1, Ordering::Relaxed))
        }) {
            Ok(booking) => booking,
            Err(e) => {
                let outcome = match e {
                    TicketError::Capacity { .. } => "capacity",
                    TicketError::NotFound(_) => "not_found",
                    _ => "validation",
                };
                prom::record_booking(outcome);
                debug!(target: "ticket.booking", error = %e, "Booking rejected");
                return Err(e);
            }
        };
        self.index_booking(booking.id, event_id);

        let snapshot = guard.availability();
        announce(slot, snapshot);
        drop(guard);

        prom::record_booking("confirmed");
        info!(
            target: "ticket.booking",
            booking_id = %booking.id,
            available = snapshot.available,
            "Booking confirmed"
        );
        Ok(booking)
    }

    /// Cancel a booking owned by `subject`.
    ///
    /// # Errors
    ///
    /// `NotFound`, `Authorization` (not the owner), or `Conflict` (already
    /// cancelled). The booking is unchanged on error.
    #[instrument(skip_all, name = "ticket.booking.cancel", fields(booking_id = %booking_id))]
    pub async fn cancel_booking(
        &self,
        booking_id: BookingId,
        subject: SubjectId,
    ) -> Result<Booking, TicketError> {
        let Some(event_id) = self.indexed_event(booking_id) else {
            prom::record_cancellation("not_found");
            return Err(TicketError::NotFound("Booking not found".to_string()));
        };

        let ledger = self.ledger(event_id).await.map_err(|_| {
            TicketError::Internal(format!("booking {booking_id} references missing event"))
        })?;
        let mut guard = Self::lock(&ledger).await;
        let slot = self.publish_slot(event_id).await;

        // No await from here on.
        let cancelled = match guard.cancel(booking_id, subject) {
            Ok(booking) => booking,
            Err(e) => {
                let outcome = match e {
                    TicketError::Authorization(_) => "forbidden",
                    TicketError::Conflict(_) => "already_cancelled",
                    _ => "not_found",
                };
                prom::record_cancellation(outcome);
                debug!(target: "ticket.booking", error = %e, "Cancellation rejected");
                return Err(e);
            }
        };

        let snapshot = guard.availability();
        announce(slot, snapshot);
        drop(guard);

        prom::record_cancellation("cancelled");
        info!(
            target: "ticket.booking",
            event_id = %event_id,
            available = snapshot.available,
            "Booking cancelled"
        );
        Ok(cancelled)
    }

    /// # Errors
    ///
    /// `NotFound` for an unknown booking.
    pub async fn get_booking(&self, booking_id: BookingId) -> Result<Booking, TicketError> {
        let not_found = || TicketError::NotFound("Booking not found".to_string());

        let event_id = self.indexed_event(booking_id).ok_or_else(not_found)?;
        let ledger = self.ledger(event_id).await?;
        let guard = ledger.lock().await;
        guard.get(booking_id).cloned().ok_or_else(not_found)
    }

    /// Bookings owned by `subject`, newest first.
    pub async fn list_bookings(&self, subject: SubjectId) -> Vec<Booking> {
        let ledgers: Vec<Arc<Mutex<EventLedger>>> =
            self.events.read().await.values().cloned().collect();

        let mut bookings = Vec::new();
        for ledger in ledgers {
            let guard = ledger.lock().await;
            bookings.extend(guard.bookings_for(subject).cloned());
        }

        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        bookings
    }

    /// Hold room in the hub queue for the update a commit will produce.
    /// A missing hub never fails the booking.
    async fn publish_slot(&self, event_id: EventId) -> Option<PublishSlot<'_>> {
        match self.hub.reserve_publish().await {
            Ok(slot) => Some(slot),
            Err(e) => {
                warn!(
                    target: "ticket.booking",
                    event_id = %event_id,
                    error = %e,
                    "Availability update will not be published"
                );
                None
            }
        }
    }

    /// Sum of confirmed quantities recomputed from the stored bookings.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown event.
    pub async fn confirmed_total(&self, event_id: EventId) -> Result<u64, TicketError> {
        let ledger = self.ledger(event_id).await?;
        let guard = ledger.lock().await;
        Ok(guard.confirmed_sum())
    }
}

fn announce(slot: Option<PublishSlot<'_>>, snapshot: Availability) {
    if let Some(slot) = slot {
        slot.publish(ServerMessage::availability_update(snapshot.to_update()));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::booking::catalog::EventQuery;
    use tokio_util::sync::CancellationToken;

    const ORGANIZER: SubjectId = SubjectId(100);

    fn engine() -> BookingEngine {
        let (hub, _task) = HubHandle::spawn(64, CancellationToken::new());
        BookingEngine::new(hub)
    }

    fn new_event(name: &str, capacity: u32) -> NewEvent {
        NewEvent {
            name: name.to_string(),
            capacity,
            unit_price_cents: 1_000,
            ..NewEvent::default()
        }
    }

    #[tokio::test]
    async fn test_event_ids_are_sequential() {
        let engine = engine();
        let a = engine.create_event(ORGANIZER, new_event("A", 1)).await.unwrap();
        let b = engine.create_event(ORGANIZER, new_event("B", 1)).await.unwrap();
        assert_eq!(a.id, EventId(1));
        assert_eq!(b.id, EventId(2));
        assert_eq!(a.organizer_id, ORGANIZER);
        assert_eq!(a.status, EventStatus::Published);
    }

    #[tokio::test]
    async fn test_unknown_event_is_not_found() {
        let engine = engine();
        let err = engine
            .create_booking(SubjectId(1), EventId(404), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, TicketError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_events_orders_by_start_time() {
        let engine = engine();
        let mut later = new_event("Later", 5);
        later.starts_at = Some(Utc::now() + chrono::Duration::days(2));
        let mut sooner = new_event("Sooner", 5);
        sooner.starts_at = Some(Utc::now() + chrono::Duration::days(1));

        engine.create_event(ORGANIZER, new_event("Undated", 5)).await.unwrap();
        engine.create_event(ORGANIZER, later).await.unwrap();
        engine.create_event(ORGANIZER, sooner).await.unwrap();

        let names: Vec<String> = engine
            .list_events(&EventFilters::default())
            .await
            .events
            .into_iter()
            .map(|l| l.event.name)
            .collect();
        assert_eq!(names, vec!["Sooner", "Later", "Undated"]);
    }

    #[tokio::test]
    async fn test_list_events_applies_filters() {
        let engine = engine();
        let mut rock = new_event("Rock Night", 5);
        rock.city = "Berlin".to_string();
        rock.event_type = "concert".to_string();
        engine.create_event(ORGANIZER, rock).await.unwrap();
        engine.create_event(ORGANIZER, new_event("Chess Open", 5)).await.unwrap();

        let filters = EventFilters::from_query(EventQuery {
            city: Some("berlin".to_string()),
            ..EventQuery::default()
        })
        .unwrap();
        let page = engine.list_events(&filters).await;
        assert_eq!(page.total, 1);
        assert_eq!(page.events.first().unwrap().event.name, "Rock Night");
    }

    #[tokio::test]
    async fn test_deleted_event_leaves_catalog_but_keeps_history() {
        let engine = engine();
        let event = engine.create_event(ORGANIZER, new_event("Show", 4)).await.unwrap();
        let booking = engine.create_booking(SubjectId(1), event.id, 2).await.unwrap();

        assert!(matches!(
            engine.delete_event(event.id, SubjectId(1)).await,
            Err(TicketError::Authorization(_))
        ));
        assert!(matches!(
            engine.delete_event(event.id, ORGANIZER).await,
            Err(TicketError::Conflict(_))
        ));

        engine.cancel_booking(booking.id, SubjectId(1)).await.unwrap();
        engine.delete_event(event.id, ORGANIZER).await.unwrap();

        assert!(matches!(engine.get_event(event.id).await, Err(TicketError::NotFound(_))));
        assert!(matches!(engine.availability(event.id).await, Err(TicketError::NotFound(_))));
        assert!(matches!(
            engine.create_booking(SubjectId(2), event.id, 1).await,
            Err(TicketError::NotFound(_))
        ));
        assert_eq!(engine.list_events(&EventFilters::default()).await.total, 0);
        assert_eq!(
            engine.get_booking(booking.id).await.unwrap().status,
            crate::booking::BookingStatus::Cancelled
        );
        assert_eq!(engine.list_bookings(SubjectId(1)).await.len(), 1);
    }

    #[tokio::test]
    async fn test_list_bookings_newest_first() {
        let engine = engine();
        let event = engine.create_event(ORGANIZER, new_event("Show", 10)).await.unwrap();

        let first = engine.create_booking(SubjectId(1), event.id, 1).await.unwrap();
        let _other = engine.create_booking(SubjectId(2), event.id, 1).await.unwrap();
        let second = engine.create_booking(SubjectId(1), event.id, 2).await.unwrap();

        let mine = engine.list_bookings(SubjectId(1)).await;
        assert_eq!(
            mine.iter().map(|b| b.id).collect::<Vec<_>>(),
            vec![second.id, first.id]
        );
    }

    #[tokio::test]
    async fn test_booking_survives_hub_shutdown() {
        let (hub, task) = HubHandle::spawn(8, CancellationToken::new());
        let engine = BookingEngine::new(hub.clone());
        let event = engine.create_event(ORGANIZER, new_event("Show", 3)).await.unwrap();

        hub.cancel();
        task.await.unwrap();

        let booking = engine.create_booking(SubjectId(1), event.id, 2).await.unwrap();
        assert_eq!(booking.quantity, 2);
        assert_eq!(engine.availability(event.id).await.unwrap().available, 1);
        engine.cancel_booking(booking.id, SubjectId(1)).await.unwrap();
        assert_eq!(engine.availability(event.id).await.unwrap().available, 3);
    }
}
