//! Fetch job context - shared state for one running job.

use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::Error;
use crate::fetcher::MediaFetcher;
use crate::progress::JobChannel;
use crate::storage::ArtifactStore;
use crate::types::{FetchSpec, JobId, JobState, Phase, StoredArtifact};

/// Shared context for a single job task, reducing parameter passing between helpers.
pub(crate) struct FetchJobContext {
    pub(crate) id: JobId,
    pub(crate) url: String,
    /// Resolved spec, not yet bound to an output stem
    pub(crate) spec: FetchSpec,
    pub(crate) channel: Arc<JobChannel>,
    pub(crate) fetcher: Arc<dyn MediaFetcher>,
    pub(crate) storage: Arc<ArtifactStore>,
    pub(crate) config: Arc<Config>,
    pub(crate) active_downloads: Arc<tokio::sync::Mutex<HashMap<JobId, CancellationToken>>>,
    pub(crate) cancel_token: CancellationToken,
}

impl FetchJobContext {
    /// Remove this job from the active downloads map.
    pub(super) async fn remove_from_active(&self) {
        let mut active = self.active_downloads.lock().await;
        active.remove(&self.id);
    }

    /// Publish Completed with the finished artifact.
    pub(super) fn mark_completed(&self, artifact: StoredArtifact) {
        tracing::info!(
            job_id = self.id.0,
            path = %artifact.path.display(),
            size_bytes = artifact.size_bytes,
            "job completed"
        );
        self.channel.update(|s| {
            s.state = JobState::Completed;
            s.phase = Phase::Done;
            s.bytes_downloaded = s.bytes_downloaded.max(s.bytes_total);
            s.artifact = Some(artifact);
        });
    }

    /// Publish Failed (or Cancelled) with the error's kind and detail.
    pub(super) fn mark_failed(&self, error: &Error) {
        let info = error.to_info();
        if matches!(error, Error::Cancelled) {
            tracing::info!(job_id = self.id.0, "job cancelled");
        } else {
            tracing::error!(
                job_id = self.id.0,
                kind = info.kind.code(),
                detail = info.detail.as_deref().unwrap_or(""),
                "job failed"
            );
        }
        self.channel.finish_with_error(info);
    }
}
