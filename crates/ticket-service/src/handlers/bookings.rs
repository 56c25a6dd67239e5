//! Booking handlers. All routes here require a bearer token.
//!
//! - `POST /api/v1/bookings` - Reserve tickets
//! - `GET /api/v1/bookings` - Caller's bookings, newest first
//! - `GET /api/v1/bookings/{id}` - One booking (owner only)
//! - `DELETE /api/v1/bookings/{id}` - Cancel (owner only)

use crate::booking::Booking;
use crate::errors::TicketError;
use crate::middleware::AuthenticatedUser;
use crate::routes::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use common::types::{BookingId, EventId};
use serde::Deserialize;
use std::sync::Arc;
use tracing::instrument;

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CreateBookingRequest {
    pub event_id: EventId,
    pub quantity: u32,
}

/// Handler for POST /api/v1/bookings
///
/// # Response
///
/// - 201 Created: confirmed booking
/// - 400 Bad Request: zero quantity
/// - 404 Not Found: unknown event
/// - 409 Conflict: not enough tickets available
#[instrument(skip_all, name = "ticket.handlers.create_booking")]
pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(request): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<Booking>), TicketError> {
    let booking = state
        .engine
        .create_booking(user.0, request.event_id, request.quantity)
        .await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

#[instrument(skip_all, name = "ticket.handlers.list_bookings")]
pub async fn list_bookings(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Json<Vec<Booking>> {
    Json(state.engine.list_bookings(user.0).await)
}

#[instrument(skip(state, user), name = "ticket.handlers.get_booking")]
pub async fn get_booking(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(booking_id): Path<BookingId>,
) -> Result<Json<Booking>, TicketError> {
    let booking = state.engine.get_booking(booking_id).await?;
    if booking.subject != user.0 {
        return Err(TicketError::Authorization(
            "Unauthorized to view this booking".to_string(),
        ));
    }
    Ok(Json(booking))
}

/// Handler for DELETE /api/v1/bookings/{id}
///
/// Returns the cancelled booking. 403 for another subject's booking, 409 if
/// it was already cancelled.
#[instrument(skip(state, user), name = "ticket.handlers.cancel_booking")]
pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(booking_id): Path<BookingId>,
) -> Result<Json<Booking>, TicketError> {
    Ok(Json(state.engine.cancel_booking(booking_id, user.0).await?))
}
