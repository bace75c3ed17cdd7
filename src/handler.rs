//! HTTP request handlers
//!
//! Thin mapping between HTTP and the services. Every error is turned
//! into a status code and a JSON (or plain text) message here; nothing
//! escapes to the transport layer.

use std::time::Duration;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde_json::json;
use tracing::{debug, error};

use crate::error::Error;
use crate::model::{ShortenRequest, ShortenResponse, StatsEntry, StatsResponse};
use crate::state::AppState;

const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Creates (or returns the existing) short URL for a destination
///
/// This handler:
/// 1. Rejects a body that is not JSON or has no `url` field
/// 2. Normalizes the URL (trim, lowercase scheme, default `https://`)
/// 3. Returns the existing entry when the destination was shortened before
/// 4. Otherwise allocates a fresh 7-character code and stores the entry
///
/// # Request Body
///
/// ```json
/// { "url": "example.com/very/long/url" }
/// ```
///
/// # Response
///
/// - **201 Created** - a new entry was created
/// - **200 OK** - the destination was already shortened
/// - **400 Bad Request** - missing, empty or invalid URL
/// - **500 Internal Server Error** - code exhaustion or storage failure
pub async fn shorten_url(
    State(state): State<AppState>,
    payload: Result<Json<ShortenRequest>, JsonRejection>,
) -> Result<Response, Error> {
    let url = match payload {
        Ok(Json(ShortenRequest { url: Some(url) })) => url,
        Ok(_) | Err(_) => {
            return Ok((
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "URL is required" })),
            )
                .into_response())
        }
    };

    let shortened = state.shortener.shorten(&url).await?;
    let status = if shortened.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };

    let response = ShortenResponse {
        short_url: state.shortener.short_url(&shortened.entry),
        short_code: shortened.entry.code,
        original_url: shortened.entry.destination_url,
    };

    Ok((status, Json(response)).into_response())
}

/// Redirects a short code to its destination
///
/// When a user visits `http://localhost:8080/Ab3dE9x`, this handler:
/// 1. Rejects codes that are not 7 alphanumeric characters without a lookup
/// 2. Looks up "Ab3dE9x" in the record store
/// 3. Sends a 302 Found response with the destination as `Location`
///
/// # Path Parameters
///
/// - `code` - The short code
///
/// # Response
///
/// - **302 Found** - Redirects to the destination URL
/// - **404 Not Found** - Malformed code, unknown code or storage failure,
///   all with the same body
pub async fn redirect_url(Path(code): Path<String>, State(state): State<AppState>) -> Response {
    match state.resolver.resolve(&code).await {
        Ok(destination) => {
            debug!("Redirecting {} -> {}", code, destination);
            let location = HeaderValue::from_str(&destination)
                .or_else(|_| {
                    // Non-ASCII destinations go out in their serialized form.
                    url::Url::parse(&destination)
                        .map_err(|_| ())
                        .and_then(|u| HeaderValue::from_str(u.as_str()).map_err(|_| ()))
                });
            match location {
                Ok(location) => {
                    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
                }
                Err(()) => not_found(),
            }
        }
        Err(_) => not_found(),
    }
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "Short URL not found").into_response()
}

/// Lists every entry with its short link, sorted by code
///
/// # Response
///
/// - **200 OK** - the listing below
/// - **500 Internal Server Error** - the store could not be enumerated
///
/// ```json
/// {
///   "total_urls": 1,
///   "urls": [{ "code": "Ab3dE9x", "original_url": "https://example.com", "short_url": "..." }]
/// }
/// ```
pub async fn get_stats(State(state): State<AppState>) -> Response {
    match state.shortener.entries().await {
        Ok(entries) => {
            let urls: Vec<StatsEntry> = entries
                .into_iter()
                .map(|entry| StatsEntry {
                    short_url: state.shortener.short_url(&entry),
                    code: entry.code,
                    original_url: entry.destination_url,
                })
                .collect();
            Json(StatsResponse {
                total_urls: urls.len(),
                urls,
            })
            .into_response()
        }
        Err(e) => {
            error!("Stats failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Failed to load stats" })),
            )
                .into_response()
        }
    }
}

/// Reports store reachability and synchronizer health
///
/// This handler:
/// 1. Counts the entries in the store, giving up after 5 seconds
/// 2. Reports the state of both sync loops when the mirror is enabled
///
/// Unlike the redirect path, storage failures are reported explicitly
/// here since this is a diagnostic surface.
///
/// # Response
///
/// - **200 OK** - the store answered; a disabled sync loop is reported
///   but does not make the service unhealthy
/// - **500 Internal Server Error** - the store failed or timed out
pub async fn health_check(State(state): State<AppState>) -> Response {
    let now = Utc::now();
    let uptime = (now - state.started_at).num_seconds().max(0);
    let backend = state.store.backend_name();

    let sync = match &state.sync_status {
        Some(status) => json!({ "enabled": true, "loops": status.snapshot() }),
        None => json!({ "enabled": false }),
    };

    let count = match tokio::time::timeout(HEALTH_TIMEOUT, state.store.count()).await {
        Ok(Ok(count)) => Ok(count),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err("storage health check timed out".to_string()),
    };

    match count {
        Ok(total_urls) => (
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "timestamp": now.to_rfc3339(),
                "uptime": uptime,
                "store": { "backend": backend, "connection": "ok", "total_urls": total_urls },
                "sync": sync,
            })),
        )
            .into_response(),
        Err(error) => {
            error!("Health check failed: {}", error);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "status": "unhealthy",
                    "error": error,
                    "timestamp": now.to_rfc3339(),
                    "store": { "backend": backend, "connection": "failed" },
                    "sync": sync,
                })),
            )
                .into_response()
        }
    }
}
