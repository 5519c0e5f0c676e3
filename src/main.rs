use std::sync::Arc;

use ride_dispatch::api;
use ride_dispatch::config::Config;
use ride_dispatch::error::AppError;
use ride_dispatch::snapshot::{Snapshot, run_snapshot_flusher};
use ride_dispatch::state::AppState;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false)
        .compact()
        .init();

    let snapshot = match &config.data_file {
        Some(path) => Snapshot::load(path).await?,
        None => Snapshot::default(),
    };
    let shared_state = Arc::new(AppState::restore(&config, snapshot));

    let app = api::rest::router(shared_state.clone());

    let flusher = config.data_file.clone().map(|path| {
        tokio::spawn(run_snapshot_flusher(
            shared_state.clone(),
            path,
            config.snapshot_interval,
        ))
    });

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(
        http_port = config.http_port,
        lock_timeout_ms = config.lock_timeout.as_millis() as u64,
        "http server started"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    if let Some(flusher) = flusher {
        flusher.abort();
        let _ = flusher.await;
    }
    if let Some(path) = &config.data_file {
        shared_state.snapshot().await?.save(path).await?;
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
