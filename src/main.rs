use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use service_marketplace::error::AppError;
use service_marketplace::{api, config, engine, state};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = config::Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false)
        .compact()
        .init();

    let app_state = state::AppState::new(
        config.dispatch,
        config.event_buffer_size,
        config.search_radius_km,
    );
    let shared_state = Arc::new(app_state);

    let app = api::rest::router(shared_state.clone());

    let shutdown = CancellationToken::new();

    if config.sweep_interval_secs > 0 {
        tokio::spawn(engine::sweep::run_expiry_sweeper(
            shared_state.clone(),
            tokio::time::Duration::from_secs(config.sweep_interval_secs),
            shutdown.clone(),
        ));
    } else {
        tracing::warn!("expiry sweeper disabled; overdue assignments stay sent");
    }

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(
        http_port = config.http_port,
        batch_size = config.dispatch.batch_size,
        assignment_ttl_hours = config.dispatch.assignment_ttl.num_hours(),
        "http server started"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
    shutdown.cancel();
}
