//! Core orchestrator implementation split into focused submodules.
//!
//! The `MediaDownloader` struct and its methods are organized by domain:
//! - [`control`] - Submission, subscription, status and cancellation
//! - [`queue`] - FIFO queue management
//! - [`queue_processor`] - Admission gate and job spawning
//! - [`fetch_job`] - Execution of a single job
//! - [`info`] - Metadata lookups without downloading
//! - [`artifacts`] - Handing finished files to requesters
//! - [`lifecycle`] - Reclamation and shutdown

mod artifacts;
mod control;
mod fetch_job;
mod info;
mod lifecycle;
mod queue;
mod queue_processor;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use artifacts::ArtifactHandoff;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::fetcher::{MediaFetcher, UnavailableFetcher, YtDlpFetcher};
use crate::progress::JobChannel;
use crate::storage::ArtifactStore;
use crate::types::{JobId, ProgressEvent};

/// Queue and job admission state
#[derive(Clone)]
pub(crate) struct QueueState {
    /// FIFO of jobs waiting for admission (protected by Mutex)
    pub(crate) queue: Arc<tokio::sync::Mutex<VecDeque<JobId>>>,
    /// Wakes the queue processor when work arrives or shutdown starts
    pub(crate) queue_notify: Arc<tokio::sync::Notify>,
    /// Semaphore to limit concurrent jobs (respects max_concurrent_downloads config)
    pub(crate) concurrent_limit: Arc<tokio::sync::Semaphore>,
    /// Map of running jobs to their cancellation tokens
    pub(crate) active_downloads:
        Arc<tokio::sync::Mutex<HashMap<JobId, tokio_util::sync::CancellationToken>>>,
    /// Flag to indicate whether new jobs are accepted (set to false during shutdown)
    pub(crate) accepting_new: Arc<AtomicBool>,
    /// Next job ID
    pub(crate) next_id: Arc<AtomicU64>,
}

/// Registry of every job the orchestrator still remembers
pub(crate) type JobRegistry = Arc<std::sync::RwLock<HashMap<JobId, Arc<JobChannel>>>>;

/// Main orchestrator instance (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct MediaDownloader {
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// External fetcher (trait object for pluggable implementations)
    pub(crate) fetcher: Arc<dyn MediaFetcher>,
    /// Progress events of all jobs (multiple subscribers supported)
    pub(crate) event_tx: tokio::sync::broadcast::Sender<ProgressEvent>,
    /// Per-job progress channels
    pub(crate) jobs: JobRegistry,
    /// Queue and admission state
    pub(crate) queue_state: QueueState,
    /// Output directory lifecycle
    pub(crate) storage: Arc<ArtifactStore>,
    /// Set while a reclamation pass is running
    pub(crate) reclaiming: Arc<AtomicBool>,
}

impl MediaDownloader {
    /// Create a new MediaDownloader backed by yt-dlp
    ///
    /// The fetcher is chosen from `config.tools`: an explicit `ytdlp_path`,
    /// else a PATH lookup when `search_path` is set. When no binary is found
    /// the orchestrator still starts, and every job fails with
    /// [`Error::ExternalTool`].
    ///
    /// ```no_run
    /// use media_dl::{Config, DownloadRequest, MediaDownloader, MediaKind};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let downloader = MediaDownloader::new(Config::default()).await?;
    ///     let id = downloader
    ///         .submit(DownloadRequest::new("https://example.com/watch?v=1", MediaKind::AudioMp3))
    ///         .await?;
    ///     let artifact = downloader
    ///         .await_completion(id, std::time::Duration::from_secs(600))
    ///         .await?;
    ///     println!("saved {}", artifact.path.display());
    ///     Ok(())
    /// }
    /// ```
    pub async fn new(config: Config) -> Result<Self> {
        let fetcher: Arc<dyn MediaFetcher> = match YtDlpFetcher::from_config(&config.tools) {
            Some(fetcher) => Arc::new(fetcher),
            None => Arc::new(UnavailableFetcher),
        };
        Self::with_fetcher(config, fetcher).await
    }

    /// Create a MediaDownloader with a custom fetcher
    ///
    /// Validates the configuration, creates the output directory and starts
    /// the queue processor.
    pub async fn with_fetcher(config: Config, fetcher: Arc<dyn MediaFetcher>) -> Result<Self> {
        config.validate()?;

        let storage = Arc::new(ArtifactStore::new(
            config.download.output_dir.clone(),
            config.download.delete_after_handoff,
        ));
        storage.ensure_dir().await?;

        let (event_tx, _rx) = tokio::sync::broadcast::channel(config.download.event_buffer);

        let queue_state = QueueState {
            queue: Arc::new(tokio::sync::Mutex::new(VecDeque::new())),
            queue_notify: Arc::new(tokio::sync::Notify::new()),
            concurrent_limit: Arc::new(tokio::sync::Semaphore::new(
                config.download.max_concurrent_downloads,
            )),
            active_downloads: Arc::new(tokio::sync::Mutex::new(HashMap::new())),
            accepting_new: Arc::new(AtomicBool::new(true)),
            next_id: Arc::new(AtomicU64::new(1)),
        };

        tracing::info!(
            fetcher = fetcher.name(),
            output_dir = %config.download.output_dir.display(),
            max_concurrent = config.download.max_concurrent_downloads,
            "Media downloader initialized"
        );

        let downloader = Self {
            config: Arc::new(config),
            fetcher,
            event_tx,
            jobs: Arc::new(std::sync::RwLock::new(HashMap::new())),
            queue_state,
            storage,
            reclaiming: Arc::new(AtomicBool::new(false)),
        };

        downloader.start_queue_processor();

        Ok(downloader)
    }

    /// Subscribe to progress events of every job
    ///
    /// Multiple subscribers are supported. Ordering is per job; events of
    /// different jobs interleave. A subscriber that falls behind by more than
    /// `event_buffer` events receives `RecvError::Lagged`.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<ProgressEvent> {
        self.event_tx.subscribe()
    }

    /// Get the current configuration
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Name of the fetcher in use
    pub fn fetcher_name(&self) -> &'static str {
        self.fetcher.name()
    }

    /// Look up a job's channel
    pub(crate) fn job(&self, id: JobId) -> Result<Arc<JobChannel>> {
        self.jobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("job {} not found", id)))
    }
}
