use std::net::SocketAddr;
use std::sync::Arc;

use autodoc_core::admission::AdmissionController;
use autodoc_pipeline::ScanOrchestrator;
use autodoc_scanner::ScannerApi;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use autodoc_api::config::ServerConfig;
use autodoc_api::router::build_app_router;
use autodoc_api::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "autodoc_api=debug,autodoc_pipeline=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(
        host = %config.host,
        port = %config.port,
        scanner_url = %config.scanner_url,
        max_concurrent_scans = config.max_concurrent_scans,
        max_scans_per_tenant = config.max_scans_per_tenant,
        "Loaded server configuration",
    );

    // --- Storage ---
    let store = autodoc_db::store::connect(config.database_url.as_deref())
        .await
        .expect("Failed to initialise storage");
    tracing::info!(backend = store.backend().as_str(), "Storage ready");

    // --- Scan orchestration ---
    let worker = Arc::new(ScannerApi::new(config.scanner_url.clone()));
    let admission = Arc::new(AdmissionController::new(config.admission_config()));
    let orchestrator = ScanOrchestrator::new(
        Arc::clone(&store),
        worker,
        admission,
        config.orchestrator_config(),
    );

    // --- App state ---
    let state = AppState {
        store,
        orchestrator: orchestrator.clone(),
        config: Arc::new(config.clone()),
    };

    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    // In-flight scans are failed and queued ones withdrawn.
    let drained = orchestrator.shutdown(config.shutdown_timeout()).await;
    tracing::info!(drained, "Scan orchestrator shut down");

    tracing::info!("Graceful shutdown complete");
}

/// Wait for SIGINT (Ctrl-C) or SIGTERM (on Unix) to initiate graceful
/// shutdown.
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
