//! Route definitions for the URL shortener API

use axum::routing::{get, post};
use axum::Router;

use crate::handler::{get_stats, health_check, redirect_url, shorten_url};
use crate::state::AppState;

/// Creates the Axum router
///
/// # Route Definitions
///
/// - `GET /{code}` - Redirects to the destination URL
/// - `POST /api/shorten` - Shortens a URL (idempotent by destination)
/// - `GET /api/stats` - Lists every entry
/// - `GET /api/health` - Store and synchronizer health
///
/// ```no_run
/// # use std::sync::Arc;
/// # use shortmirror::state::AppState;
/// # use shortmirror::store::MemoryStore;
/// # use shortmirror::route::create_app;
/// let state = AppState::new(Arc::new(MemoryStore::new()), "http://localhost:8080");
/// let app = create_app(state);
/// // axum::serve(listener, app).await.unwrap();
/// ```
pub fn create_app(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/shorten", post(shorten_url))
        .route("/stats", get(get_stats))
        .route("/health", get(health_check));

    Router::new()
        .route("/{code}", get(redirect_url))
        .nest("/api", api_routes)
        .with_state(state)
}
