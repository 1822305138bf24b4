//! REST API server module
//!
//! Exposes the orchestrator over HTTP: metadata lookups, job submission and
//! control, Server-Sent Events for live progress, and artifact downloads.

use crate::{Config, MediaDownloader, Result};
use axum::{
    Router,
    http::HeaderValue,
    routing::{get, post},
};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod error_response;
pub mod routes;
pub mod state;

pub use state::AppState;

/// Create the API router with all route definitions
///
/// # Routes
///
/// All routes live under `/api`.
///
/// ## Media
/// - `POST /info` - Title, duration, thumbnail and download options for a URL
///
/// ## Jobs
/// - `POST /downloads` - Submit a download (202 + job id)
/// - `GET /downloads` - List known jobs
/// - `GET /downloads/:id` - Job snapshot
/// - `DELETE /downloads/:id` - Cancel a job
/// - `GET /downloads/:id/events` - Server-sent events for one job
/// - `GET /downloads/:id/file` - Stream the finished artifact
///
/// ## System
/// - `GET /events` - Server-sent events for every job
/// - `GET /health` - Health check
pub fn create_router(downloader: Arc<MediaDownloader>, config: Arc<Config>) -> Router {
    let state = AppState::new(downloader, config.clone());

    let api = Router::new()
        // Media
        .route("/info", post(routes::get_info))
        // Jobs
        .route(
            "/downloads",
            get(routes::list_downloads).post(routes::submit_download),
        )
        .route(
            "/downloads/:id",
            get(routes::get_download).delete(routes::cancel_download),
        )
        .route("/downloads/:id/events", get(routes::download_events))
        .route("/downloads/:id/file", get(routes::download_file))
        // System
        .route("/events", get(routes::event_stream))
        .route("/health", get(routes::health_check))
        .with_state(state);

    let router = Router::new()
        .nest("/api", api)
        .layer(TraceLayer::new_for_http());

    if config.server.api.cors_enabled {
        let cors = build_cors_layer(&config.server.api.cors_origins);
        router.layer(cors)
    } else {
        router
    }
}

/// Build a CORS layer based on configured origins
///
/// `"*"` (or an empty list) allows any origin.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_any = origins.iter().any(|o| o == "*");

    if allow_any || origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Start the API server on the configured bind address.
///
/// Runs until the server fails. See [`start_api_server_with_shutdown`] to
/// stop it on a signal.
///
/// # Example
///
/// ```no_run
/// use media_dl::{Config, MediaDownloader};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Arc::new(Config::default());
/// let downloader = Arc::new(MediaDownloader::new((*config).clone()).await?);
///
/// media_dl::api::start_api_server(downloader, config).await?;
/// # Ok(())
/// # }
/// ```
pub async fn start_api_server(downloader: Arc<MediaDownloader>, config: Arc<Config>) -> Result<()> {
    start_api_server_with_shutdown(downloader, config, std::future::pending()).await
}

/// Start the API server and stop accepting connections once `shutdown` resolves.
pub async fn start_api_server_with_shutdown(
    downloader: Arc<MediaDownloader>,
    config: Arc<Config>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let bind_address = config.server.api.bind_address;

    tracing::info!(address = %bind_address, "Starting API server");

    let app = create_router(downloader, config);

    let listener = TcpListener::bind(bind_address)
        .await
        .map_err(crate::error::Error::Io)?;

    tracing::info!(address = %bind_address, "API server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| crate::error::Error::ApiServerError(e.to_string()))?;

    tracing::info!("API server stopped");
    Ok(())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
