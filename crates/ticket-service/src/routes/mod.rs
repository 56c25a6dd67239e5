//! HTTP routes for the ticket service.
//!
//! Defines the Axum router and application state.

use crate::auth::Authenticator;
use crate::booking::BookingEngine;
use crate::config::SessionConfig;
use crate::handlers;
use crate::hub::HubHandle;
use crate::middleware::{require_user_auth, AuthState};
use crate::observability::{health_router, HealthState};
use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<BookingEngine>,

    /// Hub handle for new WebSocket sessions.
    pub hub: HubHandle,

    pub authenticator: Arc<dyn Authenticator>,

    pub session_config: SessionConfig,
}

/// Build the application routes.
///
/// - `/health`, `/ready` - probes
/// - `/metrics` - Prometheus scrape endpoint
/// - `/ws` - live availability feed (token in the query string)
/// - `/api/v1/events...` - catalog reads are public, creation and deletion are authenticated
/// - `/api/v1/bookings...` - authenticated
/// - TraceLayer for request logging and a 30 second request timeout
pub fn build_routes(
    state: Arc<AppState>,
    metrics_handle: PrometheusHandle,
    health_state: Arc<HealthState>,
) -> Router {
    let auth_state = Arc::new(AuthState {
        authenticator: state.authenticator.clone(),
    });

    let public_routes = Router::new()
        .route("/ws", get(handlers::ws_handler))
        .route("/api/v1/events", get(handlers::list_events))
        .route("/api/v1/events/:id", get(handlers::get_event))
        .route(
            "/api/v1/events/:id/availability",
            get(handlers::event_availability),
        )
        .with_state(state.clone());

    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    let protected_routes = Router::new()
        .route("/api/v1/events", post(handlers::create_event))
        .route("/api/v1/events/:id", delete(handlers::delete_event))
        .route(
            "/api/v1/bookings",
            post(handlers::create_booking).get(handlers::list_bookings),
        )
        .route(
            "/api/v1/bookings/:id",
            get(handlers::get_booking).delete(handlers::cancel_booking),
        )
        .route_layer(middleware::from_fn_with_state(
            auth_state,
            require_user_auth,
        ))
        .with_state(state);

    // For /ws the timeout covers only the upgrade response.
    public_routes
        .merge(metrics_routes)
        .merge(protected_routes)
        .merge(health_router(health_state))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_state_is_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<AppState>();
    }
}
