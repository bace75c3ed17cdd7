//! Application entry point and server initialization
//!
//! - Loads environment configuration
//! - Opens the record store and loads the mirror into it
//! - Starts the synchronizer and the HTTP server
//! - Stops both cleanly on SIGINT/SIGTERM

use std::sync::Arc;

use dotenvy::dotenv;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use shortmirror::config::{Config, StoreBackend};
use shortmirror::mirror::FileMirror;
use shortmirror::route::create_app;
use shortmirror::state::AppState;
use shortmirror::store::{MemoryStore, RecordStore, RedbStore};
use shortmirror::sync::Synchronizer;

#[tokio::main]
async fn main() {
    // Load environment variables from .env file if it exists
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("shortmirror=debug,tower_http=debug")),
        )
        .init();

    let config = Config::from_env();

    let store: Arc<dyn RecordStore> = match config.store_backend {
        StoreBackend::Redb => {
            Arc::new(RedbStore::open(&config.database_url).expect("Failed to initialize database"))
        }
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
    };

    let mut state = AppState::new(Arc::clone(&store), config.base_url.clone());

    let supervisor = if config.mirror_enabled {
        let mirror = Arc::new(FileMirror::new(&config.mirror_path, config.base_url.clone()));
        let synchronizer = Synchronizer::new(Arc::clone(&store), mirror);

        // A broken mirror must not keep the service from starting.
        if let Err(e) = synchronizer.bootstrap().await {
            warn!("Initial mirror load failed: {}", e);
        }

        let supervisor =
            synchronizer.start(config.file_sync_interval, config.store_sync_interval);
        state = state.with_sync_status(supervisor.status());
        Some(supervisor)
    } else {
        info!("Mirror disabled, synchronizer not started");
        None
    };

    let app = create_app(state).layer(TraceLayer::new_for_http());

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .expect("Failed to bind listener");

    info!("Server running at http://localhost:{}", config.port);
    info!(
        "Store: {}, mirror: {}",
        store.backend_name(),
        if config.mirror_enabled {
            config.mirror_path.as_str()
        } else {
            "disabled"
        }
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // Let both sync loops finish their current iteration before exiting.
    if let Some(supervisor) = supervisor {
        supervisor.shutdown().await;
    }
}

/// Resolves on SIGINT (Ctrl+C) or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, stopping server");
}
