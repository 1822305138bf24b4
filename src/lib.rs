//! # media-dl
//!
//! Download job orchestrator for media URLs, backed by an external fetcher
//! (yt-dlp).
//!
//! Callers submit a URL with a media kind and quality tier and get a job
//! handle back immediately. Jobs run in the background with a bounded number
//! of concurrent fetches; callers can watch ordered progress events, wait for
//! the finished file, cancel, and finally collect the artifact, which is
//! cleaned up after delivery or once it expires.
//!
//! ## Quick Start
//!
//! ```no_run
//! use media_dl::{Config, DownloadRequest, MediaDownloader, MediaKind, QualityTier};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let downloader = MediaDownloader::new(Config::default()).await?;
//!
//!     let request = DownloadRequest::new("https://www.youtube.com/watch?v=dQw4w9WgXcQ", MediaKind::Video)
//!         .with_quality(QualityTier::Tier720);
//!     let (id, mut progress) = downloader.submit_and_subscribe(request).await?;
//!
//!     while let Some(event) = progress.next().await {
//!         println!("{:?} {}/{}", event.state, event.bytes_downloaded, event.bytes_total);
//!     }
//!
//!     let handoff = downloader.fetch_artifact(id).await?;
//!     println!("ready: {}", handoff.suggested_filename);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// REST API module
pub mod api;
/// Configuration types
pub mod config;
/// Core orchestrator implementation (decomposed into focused submodules)
pub mod downloader;
/// Error types
pub mod error;
/// External fetcher integration (yt-dlp)
pub mod fetcher;
/// Title and file name handling
pub mod filename;
/// Mapping requests onto fetch specs
pub mod format;
/// Per-job progress channels
pub mod progress;
/// Output directory lifecycle
pub mod storage;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use config::{ApiConfig, Config, DownloadConfig, ToolsConfig};
pub use downloader::{ArtifactHandoff, MediaDownloader};
pub use error::{ApiError, Error, ErrorDetail, ErrorInfo, ErrorKind, Result, ToHttpStatus};
pub use fetcher::{MediaFetcher, UnavailableFetcher, YtDlpFetcher};
pub use progress::JobSubscription;
pub use storage::{ArtifactLease, ReclaimReport};
pub use types::{
    AudioCodec, DownloadRequest, FetchSpec, FormatOption, JobHandle, JobId, JobSnapshot,
    JobState, MediaInfo, MediaKind, Phase, PostProcess, ProgressEvent, QualityTier,
    StoredArtifact,
};

/// Helper function to run the downloader with graceful signal handling.
///
/// Waits for a termination signal and then calls the downloader's `shutdown()` method,
/// which cancels unfinished jobs and stops their fetcher processes.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use media_dl::{Config, MediaDownloader, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Config::default();
///     let downloader = MediaDownloader::new(config).await?;
///
///     // Run with automatic signal handling
///     run_with_shutdown(downloader).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(downloader: MediaDownloader) -> Result<()> {
    wait_for_signal().await;
    downloader.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
