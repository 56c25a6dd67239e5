//! Event catalog handlers.
//!
//! - `GET /api/v1/events` - Filtered, paginated catalog (public)
//! - `GET /api/v1/events/{id}` - Single event with availability (public)
//! - `GET /api/v1/events/{id}/availability` - Availability snapshot (public)
//! - `POST /api/v1/events` - Create an event (authenticated)
//! - `DELETE /api/v1/events/{id}` - Remove an event (organizer only)

use crate::booking::{
    Availability, Event, EventFilters, EventListing, EventPage, EventQuery, NewEvent,
};
use crate::errors::TicketError;
use crate::middleware::AuthenticatedUser;
use crate::routes::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use common::types::EventId;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument};

/// Handler for GET /api/v1/events
///
/// Query parameters: `search`, `type`, `city`, `status`, `date_from`,
/// `date_to` (RFC3339), `price_min`, `price_max` (cents), `page`, `limit`,
/// `sort` (`date`, `price`, `name`, `created_at`), `order` (`asc`, `desc`).
///
/// # Response
///
/// - 200 OK: `{events, total, page, limit, total_pages, has_next, has_previous}`
/// - 400 Bad Request: malformed date, price, sort, or order
#[instrument(skip_all, name = "ticket.handlers.list_events")]
pub async fn list_events(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EventQuery>,
) -> Result<Json<EventPage>, TicketError> {
    let filters = EventFilters::from_query(query)?;
    Ok(Json(state.engine.list_events(&filters).await))
}

#[instrument(skip(state), name = "ticket.handlers.get_event")]
pub async fn get_event(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<EventId>,
) -> Result<Json<EventListing>, TicketError> {
    Ok(Json(state.engine.get_event(event_id).await?))
}

/// Handler for GET /api/v1/events/{id}/availability
///
/// Reads are served from the ledger, so the result always reflects every
/// booking committed before the call.
#[instrument(skip(state), name = "ticket.handlers.availability")]
pub async fn event_availability(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<EventId>,
) -> Result<Json<Availability>, TicketError> {
    Ok(Json(state.engine.availability(event_id).await?))
}

/// Handler for POST /api/v1/events
///
/// # Response
///
/// - 201 Created: the new event
/// - 400 Bad Request: empty name or zero capacity
/// - 401 Unauthorized: missing or invalid token
#[instrument(skip_all, name = "ticket.handlers.create_event")]
pub async fn create_event(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(new_event): Json<NewEvent>,
) -> Result<(StatusCode, Json<Event>), TicketError> {
    let event = state.engine.create_event(user.0, new_event).await?;

    info!(
        target: "ticket.http",
        event_id = %event.id,
        created_by = %user.0,
        "Event created via API"
    );

    Ok((StatusCode::CREATED, Json(event)))
}

/// Handler for DELETE /api/v1/events/{id}
///
/// # Response
///
/// - 200 OK: event removed from the catalog
/// - 403 Forbidden: caller is not the organizer
/// - 404 Not Found: unknown or already deleted event
/// - 409 Conflict: the event still has confirmed bookings
#[instrument(skip(state, user), name = "ticket.handlers.delete_event")]
pub async fn delete_event(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(event_id): Path<EventId>,
) -> Result<Json<serde_json::Value>, TicketError> {
    state.engine.delete_event(event_id, user.0).await?;

    info!(
        target: "ticket.http",
        event_id = %event_id,
        deleted_by = %user.0,
        "Event deleted via API"
    );

    Ok(Json(json!({ "message": "Event deleted successfully" })))
}
