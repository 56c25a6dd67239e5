//! Ticket Service
//!
//! Serves the live availability WebSocket feed and the booking API.
//!
//! # Startup
//!
//! 1. Load configuration (`TICKET_*` environment variables)
//! 2. Initialize tracing and the Prometheus recorder
//! 3. Spawn the hub coordinator and build the booking engine
//! 4. Serve HTTP/WebSocket until SIGINT/SIGTERM
//!
//! # Shutdown
//!
//! Readiness drops first, then the optional drain period runs, then the hub
//! is cancelled. Cancelling the hub closes every session mailbox, so open
//! sockets receive a close frame and the listener can finish.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use ticket_service::auth::{Authenticator, JwtAuthenticator};
use ticket_service::booking::BookingEngine;
use ticket_service::config::Config;
use ticket_service::hub::HubHandle;
use ticket_service::observability::metrics::init_metrics_recorder;
use ticket_service::observability::HealthState;
use ticket_service::routes::{build_routes, AppState};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = match Config::from_env() {
        Ok(config) => {
            init_tracing(config.log_json);
            config
        }
        Err(e) => {
            init_tracing(false);
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    info!("Starting Ticket Service");
    info!(
        bind_address = %config.bind_address,
        hub_queue_capacity = config.hub_queue_capacity,
        mailbox_capacity = config.session.mailbox_capacity,
        ping_interval_seconds = config.session.ping_interval.as_secs(),
        liveness_timeout_seconds = config.session.liveness_timeout.as_secs(),
        max_message_bytes = config.session.max_message_bytes,
        "Configuration loaded successfully"
    );

    // Must happen before any metrics are recorded
    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!(error = %e, "Failed to install Prometheus metrics recorder");
        e
    })?;

    let health_state = Arc::new(HealthState::new());

    let shutdown_token = CancellationToken::new();
    let (hub, hub_task) = HubHandle::spawn(config.hub_queue_capacity, shutdown_token.child_token());

    // Readiness follows the hub: if the coordinator exits, stop taking traffic.
    let hub_health = Arc::clone(&health_state);
    let hub_supervisor = tokio::spawn(async move {
        if let Err(e) = hub_task.await {
            error!(target: "ticket.hub", error = %e, "Hub coordinator task failed");
        }
        hub_health.set_not_ready();
    });

    let authenticator: Arc<dyn Authenticator> = Arc::new(JwtAuthenticator::new(
        config.jwt_secret.clone(),
        Duration::from_secs(config.jwt_leeway_seconds),
    ));
    let engine = Arc::new(BookingEngine::new(hub.clone()));

    let state = Arc::new(AppState {
        engine,
        hub,
        authenticator,
        session_config: config.session,
    });

    let app = build_routes(state, metrics_handle, Arc::clone(&health_state));

    let addr: SocketAddr = config.bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    health_state.set_ready();
    info!("Ticket Service listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(
            Arc::clone(&health_state),
            shutdown_token,
            config.drain_seconds,
        ))
        .await?;

    if let Err(e) = hub_supervisor.await {
        warn!(error = %e, "Hub supervisor task failed");
    }

    info!("Ticket Service shutdown complete");
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "ticket_service=debug,tower_http=debug".into());

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .init();
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
///
/// Returns once readiness is cleared, the drain period has elapsed, and the
/// hub has been told to stop.
async fn shutdown_signal(
    health_state: Arc<HealthState>,
    shutdown_token: CancellationToken,
    drain_secs: u64,
) {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    health_state.set_not_ready();

    if drain_secs > 0 {
        warn!("Draining connections for {} seconds...", drain_secs);
        tokio::time::sleep(Duration::from_secs(drain_secs)).await;
        info!("Drain period complete");
    } else {
        info!("Skipping drain period (TICKET_DRAIN_SECONDS=0)");
    }

    shutdown_token.cancel();
}
