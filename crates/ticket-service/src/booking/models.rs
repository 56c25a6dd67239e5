//! Event, booking, and availability types plus the per-event ledger.
//!
//! `EventLedger` is only ever touched while its event's lock is held; it has
//! no synchronization of its own.

use crate::errors::TicketError;
use crate::protocol::AvailabilityUpdate;
use chrono::{DateTime, Utc};
use common::types::{BookingId, EventId, SubjectId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Confirmed,
    Cancelled,
}

/// Catalog state of an event. Deleted events stay in the ledger so their
/// booking history remains readable, but no catalog read returns them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Published,
    Deleted,
}

impl EventStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Published => "published",
            EventStatus::Deleted => "deleted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    pub id: EventId,
    pub organizer_id: SubjectId,
    pub name: String,
    pub description: String,
    pub event_type: String,
    pub status: EventStatus,
    pub venue: String,
    pub city: String,
    pub address: String,
    pub starts_at: Option<DateTime<Utc>>,
    /// Fixed at creation.
    pub capacity: u32,
    pub unit_price_cents: u64,
    pub image_url: String,
    pub created_at: DateTime<Utc>,
}

/// Request to add an event to the catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NewEvent {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub event_type: String,
    #[serde(default, alias = "venue_name")]
    pub venue: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub address: String,
    #[serde(default, alias = "date")]
    pub starts_at: Option<DateTime<Utc>>,
    pub capacity: u32,
    pub unit_price_cents: u64,
    #[serde(default)]
    pub image_url: String,
}

impl NewEvent {
    /// # Errors
    ///
    /// `Validation` for an empty name or zero capacity.
    pub fn validate(&self) -> Result<(), TicketError> {
        if self.name.trim().is_empty() {
            return Err(TicketError::Validation("Event name is required".to_string()));
        }
        if self.capacity == 0 {
            return Err(TicketError::Validation(
                "Capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Booking {
    pub id: BookingId,
    pub event_id: EventId,
    #[serde(rename = "user_id")]
    pub subject: SubjectId,
    pub quantity: u32,
    /// Captured at creation; later price changes don't apply.
    pub unit_price_cents: u64,
    pub total_price_cents: u64,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,
}

/// Point-in-time availability, recomputed from the ledger on every read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Availability {
    pub event_id: EventId,
    pub capacity: u32,
    pub confirmed_booked: u32,
    pub available: u32,
    pub last_updated: DateTime<Utc>,
}

impl Availability {
    #[must_use]
    pub fn to_update(&self) -> AvailabilityUpdate {
        AvailabilityUpdate {
            event_id: self.event_id,
            available_tickets: self.available,
            capacity: self.capacity,
            last_updated: self.last_updated,
        }
    }
}

/// Catalog entry with its current availability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventListing {
    #[serde(flatten)]
    pub event: Event,
    pub available_tickets: u32,
}

/// All bookings for one event. Invariant: `confirmed_booked <= capacity`.
#[derive(Debug)]
pub struct EventLedger {
    pub(crate) event: Event,
    bookings: HashMap<BookingId, Booking>,
    confirmed_booked: u32,
    last_updated: DateTime<Utc>,
}

impl EventLedger {
    #[must_use]
    pub fn new(event: Event) -> Self {
        let last_updated = event.created_at;
        Self {
            event,
            bookings: HashMap::new(),
            confirmed_booked: 0,
            last_updated,
        }
    }

    #[must_use]
    pub fn available(&self) -> u32 {
        self.event.capacity.saturating_sub(self.confirmed_booked)
    }

    #[must_use]
    pub fn availability(&self) -> Availability {
        Availability {
            event_id: self.event.id,
            capacity: self.event.capacity,
            confirmed_booked: self.confirmed_booked,
            available: self.available(),
            last_updated: self.last_updated,
        }
    }

    /// Check capacity and record a confirmed booking in one step.
    ///
    /// `next_id` is only called once the booking is known to fit.
    ///
    /// # Errors
    ///
    /// `Validation` for zero quantity or price overflow; `NotFound` if the
    /// event was deleted; `Capacity` if the event can't fit `quantity` more
    /// tickets. No state changes on error.
    pub fn reserve(
        &mut self,
        subject: SubjectId,
        quantity: u32,
        next_id: impl FnOnce() -> BookingId,
    ) -> Result<Booking, TicketError> {
        if quantity == 0 {
            return Err(TicketError::Validation(
                "Quantity must be greater than zero".to_string(),
            ));
        }
        if !self.is_listed() {
            return Err(TicketError::NotFound("Event not found".to_string()));
        }

        let available = self.available();
        if available < quantity {
            return Err(TicketError::Capacity {
                requested: quantity,
                available,
            });
        }

        let unit_price_cents = self.event.unit_price_cents;
        let total_price_cents = u64::from(quantity)
            .checked_mul(unit_price_cents)
            .ok_or_else(|| TicketError::Validation("Total price is too large".to_string()))?;

        let now = Utc::now();
        let booking = Booking {
            id: next_id(),
            event_id: self.event.id,
            subject,
            quantity,
            unit_price_cents,
            total_price_cents,
            status: BookingStatus::Confirmed,
            created_at: now,
            cancelled_at: None,
        };

        self.confirmed_booked += quantity;
        self.last_updated = now;
        self.bookings.insert(booking.id, booking.clone());
        Ok(booking)
    }

    /// Transition a booking to cancelled.
    ///
    /// # Errors
    ///
    /// `NotFound`, then `Authorization` if `subject` is not the owner, then
    /// `Conflict` if it is already cancelled.
    pub fn cancel(
        &mut self,
        booking_id: BookingId,
        subject: SubjectId,
    ) -> Result<Booking, TicketError> {
        let booking = self
            .bookings
            .get_mut(&booking_id)
            .ok_or_else(|| TicketError::NotFound("Booking not found".to_string()))?;

        if booking.subject != subject {
            return Err(TicketError::Authorization(
                "Unauthorized to cancel this booking".to_string(),
            ));
        }
        if booking.status == BookingStatus::Cancelled {
            return Err(TicketError::Conflict(
                "Booking is already cancelled".to_string(),
            ));
        }

        let now = Utc::now();
        booking.status = BookingStatus::Cancelled;
        booking.cancelled_at = Some(now);
        let cancelled = booking.clone();

        self.confirmed_booked = self.confirmed_booked.saturating_sub(cancelled.quantity);
        self.last_updated = now;
        Ok(cancelled)
    }

    /// False once the event has been deleted.
    #[must_use]
    pub fn is_listed(&self) -> bool {
        self.event.status == EventStatus::Published
    }

    /// Take the event out of the catalog.
    ///
    /// # Errors
    ///
    /// `NotFound` if already deleted, `Authorization` if `subject` is not
    /// the organizer, `Conflict` while any booking is still confirmed.
    pub fn delete(&mut self, subject: SubjectId) -> Result<(), TicketError> {
        if !self.is_listed() {
            return Err(TicketError::NotFound("Event not found".to_string()));
        }
        if self.event.organizer_id != subject {
            return Err(TicketError::Authorization(
                "You are not authorized to delete this event".to_string(),
            ));
        }
        if self.confirmed_booked > 0 {
            return Err(TicketError::Conflict(
                "Event has confirmed bookings".to_string(),
            ));
        }

        self.event.status = EventStatus::Deleted;
        self.last_updated = Utc::now();
        Ok(())
    }

    #[must_use]
    pub fn get(&self, booking_id: BookingId) -> Option<&Booking> {
        self.bookings.get(&booking_id)
    }

    pub fn bookings_for(&self, subject: SubjectId) -> impl Iterator<Item = &Booking> {
        self.bookings.values().filter(move |b| b.subject == subject)
    }

    /// Recount confirmed quantities from the bookings themselves.
    #[must_use]
    pub fn confirmed_sum(&self) -> u64 {
        self.bookings
            .values()
            .filter(|b| b.status == BookingStatus::Confirmed)
            .map(|b| u64::from(b.quantity))
            .sum()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn ledger(capacity: u32, unit_price_cents: u64) -> EventLedger {
        EventLedger::new(Event {
            id: EventId(1),
            organizer_id: SubjectId(1),
            name: "Arcade Fire".to_string(),
            description: String::new(),
            event_type: "concert".to_string(),
            status: EventStatus::Published,
            venue: "Main Hall".to_string(),
            city: "Montreal".to_string(),
            address: String::new(),
            starts_at: None,
            capacity,
            unit_price_cents,
            image_url: String::new(),
            created_at: Utc::now(),
        })
    }

    fn ids() -> impl FnMut() -> BookingId {
        let mut next = 0;
        move || {
            next += 1;
            BookingId(next)
        }
    }

    #[test]
    fn test_reserve_captures_price() {
        let mut ledger = ledger(10, 2_500);
        let mut next = ids();

        let booking = ledger.reserve(SubjectId(1), 3, &mut next).unwrap();
        assert_eq!(booking.unit_price_cents, 2_500);
        assert_eq!(booking.total_price_cents, 7_500);
        assert_eq!(booking.status, BookingStatus::Confirmed);
        assert_eq!(ledger.available(), 7);
    }

    #[test]
    fn test_reserve_rejects_zero_quantity() {
        let mut ledger = ledger(10, 100);
        let err = ledger.reserve(SubjectId(1), 0, ids()).unwrap_err();
        assert!(matches!(err, TicketError::Validation(_)));
        assert_eq!(ledger.available(), 10);
    }

    #[test]
    fn test_reserve_over_capacity_changes_nothing() {
        let mut ledger = ledger(5, 100);
        let mut next = ids();
        ledger.reserve(SubjectId(1), 4, &mut next).unwrap();

        let err = ledger.reserve(SubjectId(2), 2, &mut next).unwrap_err();
        assert_eq!(
            err,
            TicketError::Capacity {
                requested: 2,
                available: 1
            }
        );
        assert_eq!(ledger.availability().confirmed_booked, 4);
        assert_eq!(ledger.confirmed_sum(), 4);
    }

    #[test]
    fn test_reserve_price_overflow_is_validation() {
        let mut ledger = ledger(10, u64::MAX);
        let err = ledger.reserve(SubjectId(1), 2, ids()).unwrap_err();
        assert!(matches!(err, TicketError::Validation(_)));
        assert_eq!(ledger.available(), 10);
    }

    #[test]
    fn test_cancel_order_of_checks() {
        let mut ledger = ledger(5, 100);
        let booking = ledger.reserve(SubjectId(1), 2, ids()).unwrap();

        assert!(matches!(
            ledger.cancel(BookingId(99), SubjectId(1)),
            Err(TicketError::NotFound(_))
        ));
        assert!(matches!(
            ledger.cancel(booking.id, SubjectId(2)),
            Err(TicketError::Authorization(_))
        ));
        assert_eq!(ledger.get(booking.id).unwrap().status, BookingStatus::Confirmed);

        let cancelled = ledger.cancel(booking.id, SubjectId(1)).unwrap();
        assert_eq!(cancelled.status, BookingStatus::Cancelled);
        assert!(cancelled.cancelled_at.is_some());
        assert_eq!(ledger.available(), 5);

        assert_eq!(
            ledger.cancel(booking.id, SubjectId(1)),
            Err(TicketError::Conflict(
                "Booking is already cancelled".to_string()
            ))
        );
        assert_eq!(ledger.confirmed_sum(), 0);
    }

    #[test]
    fn test_new_event_validation() {
        let mut new_event = NewEvent {
            name: "  ".to_string(),
            capacity: 10,
            ..NewEvent::default()
        };
        assert!(new_event.validate().is_err());

        new_event.name = "Jazz Night".to_string();
        assert!(new_event.validate().is_ok());

        new_event.capacity = 0;
        assert!(new_event.validate().is_err());
    }

    #[test]
    fn test_booking_serializes_owner_as_user_id() {
        let mut ledger = ledger(5, 100);
        let booking = ledger.reserve(SubjectId(7), 1, ids()).unwrap();
        let value = serde_json::to_value(&booking).unwrap();

        assert_eq!(value["user_id"], 7);
        assert_eq!(value["status"], "confirmed");
        assert!(value.get("cancelled_at").is_none());
    }

    #[test]
    fn test_new_event_accepts_original_field_names() {
        let new_event: NewEvent = serde_json::from_value(serde_json::json!({
            "name": "Harbour Jazz",
            "venue_name": "Pier 4",
            "date": "2026-07-15T19:30:00Z",
            "event_type": "concert",
            "city": "Lisbon",
            "capacity": 40,
            "unit_price_cents": 3_000
        }))
        .unwrap();

        assert_eq!(new_event.venue, "Pier 4");
        assert_eq!(new_event.city, "Lisbon");
        assert!(new_event.starts_at.is_some());
        assert!(new_event.image_url.is_empty());
    }

    #[test]
    fn test_delete_rules() {
        let mut ledger = ledger(5, 100);
        let booking = ledger.reserve(SubjectId(2), 1, ids()).unwrap();

        assert!(matches!(
            ledger.delete(SubjectId(2)),
            Err(TicketError::Authorization(_))
        ));
        assert!(matches!(
            ledger.delete(SubjectId(1)),
            Err(TicketError::Conflict(_))
        ));

        ledger.cancel(booking.id, SubjectId(2)).unwrap();
        ledger.delete(SubjectId(1)).unwrap();
        assert!(!ledger.is_listed());
        assert!(matches!(
            ledger.reserve(SubjectId(3), 1, ids()),
            Err(TicketError::NotFound(_))
        ));
        assert!(matches!(
            ledger.delete(SubjectId(1)),
            Err(TicketError::NotFound(_))
        ));
        // History survives deletion.
        assert_eq!(ledger.get(booking.id).unwrap().status, BookingStatus::Cancelled);
    }
}
