use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use dispatch_matcher::api;
use dispatch_matcher::config::{self, LogFormat};
use dispatch_matcher::engine::expiry::run_expiry_sweeper;
use dispatch_matcher::engine::performance::run_performance_rollup;
use dispatch_matcher::engine::queue::run_reassignment_worker;
use dispatch_matcher::error::AppError;
use dispatch_matcher::state::AppState;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = config::Config::from_env()?;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false);
    match config.log_format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Compact => subscriber.compact().init(),
    }

    let shared_state = Arc::new(AppState::in_memory(
        config.engine.clone(),
        config.event_buffer_size,
    ));
    let engine = shared_state.engine.clone();

    let active = engine.refresh_config().await;
    tracing::info!(
        config_version = active.version,
        assignment_timeout_secs = active.assignment_timeout_secs,
        "matching config loaded"
    );

    tokio::spawn(run_expiry_sweeper(
        engine.clone(),
        config.expiry_sweep_interval,
    ));
    tokio::spawn(run_reassignment_worker(
        engine.clone(),
        config.reassignment_sweep_interval,
    ));
    tokio::spawn(run_performance_rollup(
        engine.clone(),
        config.performance_rollup_interval,
    ));

    let app = api::rest::router(shared_state.clone());

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(http_port = config.http_port, "http server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
