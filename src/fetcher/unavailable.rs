//! Fetcher used when no yt-dlp binary is available

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::traits::{FetchOutcome, FetchRequest, MediaFetcher, MediaMetadata, ProgressSink};

const MISSING_TOOL: &str = "yt-dlp binary not found. \
     Configure tools.ytdlp_path or ensure yt-dlp is in PATH.";

/// Fetcher that fails every call with [`Error::ExternalTool`](crate::Error::ExternalTool)
///
/// Lets the orchestrator and API start without yt-dlp installed; each job
/// then fails with a clear reason instead of the process refusing to run.
pub struct UnavailableFetcher;

#[async_trait]
impl MediaFetcher for UnavailableFetcher {
    async fn extract_metadata(&self, _url: &str) -> crate::Result<MediaMetadata> {
        Err(crate::Error::ExternalTool(MISSING_TOOL.into()))
    }

    async fn fetch(
        &self,
        _request: FetchRequest,
        _sink: ProgressSink,
        _cancel: CancellationToken,
    ) -> crate::Result<FetchOutcome> {
        Err(crate::Error::ExternalTool(MISSING_TOOL.into()))
    }

    fn name(&self) -> &'static str {
        "unavailable"
    }
}
