use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use tokio::net::TcpListener;

use signal_hub::config::Config;
use signal_hub::hub::Hub;
use signal_hub::rate_limiter::RateLimiter;
use signal_hub::server::{build_router, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::builder().format_module_path(false).init();

    let config = Config::new();
    let hub = Hub::new();
    let rate_limiter = Arc::new(RateLimiter::default_limits());

    let room_sweeper = hub.clone().spawn_room_sweeper();
    let rate_sweeper = rate_limiter.clone().spawn_sweeper();

    let state = Arc::new(AppState {
        hub: hub.clone(),
        rate_limiter,
        config: config.clone(),
        started_at: Instant::now(),
    });

    let listener = TcpListener::bind(config.listening).await?;
    log::info!("signal-hub listening on {}", config.listening);

    let app = build_router(state).into_make_service_with_connect_info::<SocketAddr>();

    let shutdown = async {
        shutdown_signal().await;
        log::info!("shutdown signal received, draining connections");
        hub.shutdown().await;
        room_sweeper.abort();
        rate_sweeper.abort();
    };

    match tokio::time::timeout(
        std::time::Duration::from_secs(30),
        axum::serve(listener, app).with_graceful_shutdown(shutdown),
    )
    .await
    {
        Ok(Ok(())) => {}
        Ok(Err(e)) => log::error!("server error: {e}"),
        Err(_) => log::warn!("graceful shutdown exceeded 30s, exiting anyway"),
    }

    Ok(())
}

/// waits for either ctrl-c or, on unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
