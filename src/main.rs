use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use parcel_tracker::api;
use parcel_tracker::auth::StaticTokenVerifier;
use parcel_tracker::config::Config;
use parcel_tracker::error::AppError;
use parcel_tracker::gateway::LocalChargeGateway;
use parcel_tracker::state::{AppState, EngineOptions};
use parcel_tracker::store::InMemoryStore;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false)
        .compact()
        .init();

    if config.auth_tokens.is_empty() {
        tracing::warn!("AUTH_TOKENS is empty; every authenticated route will reject requests");
    }

    let store = Arc::new(InMemoryStore::new());
    let verifier = Arc::new(StaticTokenVerifier::new(config.auth_tokens.clone()));
    let state = AppState::new(
        store,
        verifier,
        Arc::new(LocalChargeGateway),
        EngineOptions {
            event_buffer_size: config.event_buffer_size,
            enforce_transitions: config.enforce_transitions,
        },
    );

    let app = api::rest::router(Arc::new(state));

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(
        http_port = config.http_port,
        enforce_transitions = config.enforce_transitions,
        "http server started"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    tracing::info!("http server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
