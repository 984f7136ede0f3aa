use std::net::SocketAddr;
use std::sync::Arc;

use bujo_api::app::build_router;
use bujo_api::background::cleanup::CleanupJob;
use bujo_api::background::scheduler::{run_recurring, Schedule};
use bujo_api::config::ServerConfig;
use bujo_api::state::AppState;
use bujo_api::trash::TrashLedger;
use bujo_core::producers::{DEFAULT_PRODUCERS, PRODUCER_CLEANER};
use bujo_events::NotificationHub;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "bujo_api=debug,bujo_daemon=debug,bujo_events=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Notification hub ---
    let hub = Arc::new(NotificationHub::new(config.daemon.hub_config()));
    for identity in &config.daemon.subscriber_ids {
        if let Err(e) = hub.register(identity, &DEFAULT_PRODUCERS) {
            tracing::warn!(identity = %identity, error = %e, "Skipping subscriber");
        }
    }
    tracing::info!(subscriptions = hub.registry().len(), "Notification hub ready");

    // --- Producer jobs ---
    let trash = Arc::new(TrashLedger::new());
    let cleaners = config
        .daemon
        .subscriber_ids
        .iter()
        .filter_map(|identity| hub.producer(identity, PRODUCER_CLEANER))
        .collect();
    let cleanup = Arc::new(CleanupJob::new(Arc::clone(&trash), cleaners));

    let jobs_cancel = CancellationToken::new();
    let jobs_handle = tokio::spawn(run_recurring(
        cleanup,
        Schedule::from_config(&config.daemon),
        jobs_cancel.clone(),
    ));

    // --- App state ---
    let sessions = TaskTracker::new();
    let state = AppState {
        config: Arc::new(config.clone()),
        hub: Arc::clone(&hub),
        trash,
        sessions: sessions.clone(),
    };
    let app = build_router(state);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    let server_cancel = CancellationToken::new();
    let server = tokio::spawn({
        let server_cancel = server_cancel.clone();
        async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(server_cancel.cancelled_owned())
                .await
        }
    });

    shutdown_signal().await;

    // --- Shutdown ---
    // Stop accepting connections, then stop producers, then end the streams.
    server_cancel.cancel();
    let timeout = config.shutdown_timeout();

    jobs_cancel.cancel();
    if tokio::time::timeout(timeout, jobs_handle).await.is_err() {
        tracing::warn!("Producer jobs did not stop in time");
    }
    tracing::info!("Producer jobs stopped");

    hub.shutdown();

    sessions.close();
    let live = sessions.len();
    tracing::info!(live, "Waiting for stream sessions to end");
    if tokio::time::timeout(timeout, sessions.wait()).await.is_err() {
        tracing::warn!("Stream sessions did not end in time");
    }

    match tokio::time::timeout(timeout, server).await {
        Ok(Ok(Ok(()))) => tracing::info!("Server stopped"),
        Ok(Ok(Err(e))) => tracing::error!(error = %e, "Server error"),
        Ok(Err(e)) => tracing::error!(error = %e, "Server task failed"),
        Err(_) => tracing::warn!("Server did not stop in time"),
    }

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the daemon shuts
/// down cleanly whether stopped interactively or by a process manager.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
