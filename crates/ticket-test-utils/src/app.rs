//! Application state and router wired for route tests.

use crate::tokens::TEST_JWT_SECRET;
use axum::Router;
use common::jwt::DEFAULT_LEEWAY;
use common::secret::SecretString;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use ticket_service::auth::{Authenticator, JwtAuthenticator};
use ticket_service::booking::BookingEngine;
use ticket_service::hub::HubHandle;
use ticket_service::observability::HealthState;
use ticket_service::routes::{build_routes, AppState};

use crate::peer::test_session_config;

/// `JwtAuthenticator` keyed with `TEST_JWT_SECRET`.
pub fn test_authenticator() -> Arc<dyn Authenticator> {
    Arc::new(JwtAuthenticator::new(
        SecretString::from(TEST_JWT_SECRET),
        DEFAULT_LEEWAY,
    ))
}

pub fn test_app_state(hub: HubHandle) -> Arc<AppState> {
    Arc::new(AppState {
        engine: Arc::new(BookingEngine::new(hub.clone())),
        hub,
        authenticator: test_authenticator(),
        session_config: test_session_config(),
    })
}

/// Full router with a non-global Prometheus recorder and a ready health state.
pub fn test_router(state: Arc<AppState>) -> Router {
    let metrics_handle = PrometheusBuilder::new().build_recorder().handle();
    let health_state = Arc::new(HealthState::new());
    health_state.set_ready();
    build_routes(state, metrics_handle, health_state)
}
