//! Booking transaction engine, event catalog queries, and the data model.

pub mod catalog;
pub mod engine;
pub mod models;

pub use catalog::{EventFilters, EventPage, EventQuery};
pub use engine::BookingEngine;
pub use models::{
    Availability, Booking, BookingStatus, Event, EventLedger, EventListing, EventStatus, NewEvent,
};
