//! Traits and types for media fetchers

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;

use crate::types::FetchSpec;

/// Metadata extracted from a source URL without downloading
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaMetadata {
    /// Raw media title, if the source has one
    pub title: Option<String>,
    /// Duration in whole seconds
    pub duration_seconds: Option<u64>,
    /// Thumbnail URL
    pub thumbnail: Option<String>,
    /// Tallest video stream offered, in lines
    pub max_height: Option<u32>,
}

/// What to fetch and how
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// Source URL
    pub url: String,
    /// Spec bound to the job's output stem
    pub spec: FetchSpec,
}

/// Result of a successful fetch
#[must_use]
#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    /// Final path the fetcher said it wrote, if it said anything
    pub reported_path: Option<PathBuf>,
}

/// Point-in-time reading of a [`ProgressSink`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressReading {
    /// Bytes transferred so far
    pub downloaded: u64,
    /// Expected total (0 = unknown)
    pub total: u64,
    /// Whether the fetcher has moved on to merging/transcoding
    pub post_processing: bool,
}

/// Lock-free progress counters shared between a fetcher and its reporter
///
/// Both counters only ever grow, so a reader never observes progress going
/// backwards even when the fetcher reports out of order.
#[derive(Debug, Clone, Default)]
pub struct ProgressSink {
    downloaded: Arc<AtomicU64>,
    total: Arc<AtomicU64>,
    post_processing: Arc<AtomicBool>,
}

impl ProgressSink {
    /// Create a sink with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Record transferred bytes and, if known, the expected total
    pub fn record(&self, downloaded: u64, total: Option<u64>) {
        self.downloaded.fetch_max(downloaded, Ordering::Relaxed);
        if let Some(total) = total {
            self.total.fetch_max(total, Ordering::Relaxed);
        }
    }

    /// Mark the start of the post-processing phase
    pub fn enter_post_processing(&self) {
        self.post_processing.store(true, Ordering::Relaxed);
    }

    /// Whether post-processing has started
    pub fn is_post_processing(&self) -> bool {
        self.post_processing.load(Ordering::Relaxed)
    }

    /// Read all counters
    pub fn reading(&self) -> ProgressReading {
        ProgressReading {
            downloaded: self.downloaded.load(Ordering::Relaxed),
            total: self.total.load(Ordering::Relaxed),
            post_processing: self.post_processing.load(Ordering::Relaxed),
        }
    }
}

/// Trait for the external tool that extracts metadata and downloads media
///
/// Implementations must observe `cancel` promptly and stop any child process
/// they started. Failures are classified into the crate's error kinds:
/// [`SourceUnavailable`](crate::Error::SourceUnavailable) from metadata
/// extraction, [`FetchFailed`](crate::Error::FetchFailed) or
/// [`PostProcessFailed`](crate::Error::PostProcessFailed) from fetching.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Look up title, duration and thumbnail for a URL
    async fn extract_metadata(&self, url: &str) -> crate::Result<MediaMetadata>;

    /// Download (and post-process) the media described by `request`
    ///
    /// Progress is written into `sink`. Returns
    /// [`Error::Cancelled`](crate::Error::Cancelled) when `cancel` fires.
    async fn fetch(
        &self,
        request: FetchRequest,
        sink: ProgressSink,
        cancel: CancellationToken,
    ) -> crate::Result<FetchOutcome>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sink_counters_never_decrease() {
        let sink = ProgressSink::new();
        sink.record(500, Some(1000));
        sink.record(200, None);
        sink.record(300, Some(900));

        let reading = sink.reading();
        assert_eq!(reading.downloaded, 500);
        assert_eq!(reading.total, 1000);
        assert!(!reading.post_processing);
    }

    #[test]
    fn clones_share_counters() {
        let sink = ProgressSink::new();
        let writer = sink.clone();
        writer.record(42, Some(100));
        writer.enter_post_processing();

        assert_eq!(sink.reading().downloaded, 42);
        assert!(sink.is_post_processing());
    }
}
