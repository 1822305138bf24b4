//! Job control - submit, subscribe, status, cancel, await.

use chrono::Utc;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::format;
use crate::progress::{JobChannel, JobSubscription};
use crate::types::{
    DownloadRequest, JobId, JobSnapshot, JobState, Phase, StoredArtifact,
};

use super::MediaDownloader;

/// Check that a URL is an absolute http(s) URL with a host
pub(crate) fn validate_url(raw: &str) -> Result<url::Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidRequest("URL is required".to_string()));
    }
    let parsed = url::Url::parse(trimmed)
        .map_err(|e| Error::InvalidRequest(format!("invalid URL '{}': {}", trimmed, e)))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(Error::InvalidRequest(format!(
            "unsupported URL scheme '{}'",
            parsed.scheme()
        )));
    }
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(Error::InvalidRequest(format!("URL '{}' has no host", trimmed)));
    }
    Ok(parsed)
}

impl MediaDownloader {
    /// Submit a download request
    ///
    /// Validates the URL, resolves the fetch spec, registers the job as
    /// Pending and queues it. Returns immediately; no network I/O happens
    /// here. Also starts an opportunistic reclamation pass in the background.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidRequest`] for a missing or malformed URL
    /// - [`Error::CapacityExceeded`] when `max_queued_jobs` jobs are already Pending
    /// - [`Error::ShuttingDown`] after [`shutdown`](Self::shutdown)
    pub async fn submit(&self, request: DownloadRequest) -> Result<JobId> {
        let (id, _) = self.submit_inner(request, false).await?;
        Ok(id)
    }

    /// Submit a request and subscribe to its progress before it can start
    ///
    /// The first event on the subscription is the Pending snapshot, so the
    /// caller sees every state the job goes through.
    pub async fn submit_and_subscribe(
        &self,
        request: DownloadRequest,
    ) -> Result<(JobId, JobSubscription)> {
        let (id, subscription) = self.submit_inner(request, true).await?;
        let subscription = subscription
            .ok_or_else(|| Error::NotFound(format!("job {} not found", id)))?;
        Ok((id, subscription))
    }

    async fn submit_inner(
        &self,
        request: DownloadRequest,
        subscribe: bool,
    ) -> Result<(JobId, Option<JobSubscription>)> {
        if !self.queue_state.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        let url = validate_url(&request.url)?;
        let spec = format::resolve(request.media_kind, request.quality_tier);

        // Held until the job is queued so concurrent submissions see each other
        let mut queue = self.queue_state.queue.lock().await;
        if let Some(limit) = self.config.download.max_queued_jobs {
            if self.pending_count() >= limit {
                tracing::warn!(limit, "rejecting submission, queue is full");
                return Err(Error::CapacityExceeded { limit });
            }
        }

        let id = JobId(self.queue_state.next_id.fetch_add(1, Ordering::SeqCst));
        let snapshot = JobSnapshot {
            id,
            url: url.to_string(),
            media_kind: request.media_kind,
            quality_tier: request.quality_tier,
            spec,
            state: JobState::Pending,
            phase: Phase::Downloading,
            bytes_downloaded: 0,
            bytes_total: 0,
            title: None,
            artifact: None,
            error: None,
            submitted_at: Utc::now(),
            finished_at: None,
            seq: 0,
        };
        let initial_event = snapshot.to_event();
        let channel = Arc::new(JobChannel::new(
            snapshot,
            request.cancel_on_disconnect,
            self.event_tx.clone(),
            self.config.download.event_buffer,
        ));
        let subscription = subscribe.then(|| channel.subscribe());

        self.jobs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, channel);
        let _ = self.event_tx.send(initial_event);

        queue.push_back(id);
        drop(queue);
        self.queue_state.queue_notify.notify_one();

        tracing::info!(
            job_id = id.0,
            url = %url,
            media_kind = ?request.media_kind,
            quality = request.quality_tier.label(),
            "job submitted"
        );

        self.spawn_reclaim();

        Ok((id, subscription))
    }

    /// Subscribe to one job's progress
    ///
    /// The first event describes the job's current state; a job that already
    /// finished yields exactly one terminal event.
    pub fn subscribe_job(&self, id: JobId) -> Result<JobSubscription> {
        Ok(self.job(id)?.subscribe())
    }

    /// Current snapshot of a job (non-blocking)
    pub fn status(&self, id: JobId) -> Result<Arc<JobSnapshot>> {
        Ok(self.job(id)?.snapshot())
    }

    /// Snapshots of every job still on record, oldest first
    pub fn list_jobs(&self) -> Vec<Arc<JobSnapshot>> {
        let mut snapshots: Vec<_> = self
            .jobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .map(|channel| channel.snapshot())
            .collect();
        snapshots.sort_by_key(|s| s.id);
        snapshots
    }

    /// Cancel a job
    ///
    /// Idempotent. A Pending job becomes Cancelled at once and leaves the
    /// queue. A Running job has its cancellation token tripped; the fetcher
    /// stops its child process and the job ends Cancelled with its partial
    /// files removed. Finished jobs are left alone.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown job.
    pub async fn cancel(&self, id: JobId) -> Result<()> {
        let channel = self.job(id)?;
        if channel.snapshot().state.is_terminal() {
            return Ok(());
        }

        if channel.request_cancel() {
            self.remove_from_queue(id).await;
            tracing::info!(job_id = id.0, "cancelled queued job");
        } else {
            tracing::info!(job_id = id.0, "cancellation requested for running job");
        }
        Ok(())
    }

    /// Wait for a job to finish
    ///
    /// # Errors
    ///
    /// - [`Error::Timeout`] if `timeout` elapses first; the job keeps running
    /// - [`Error::Cancelled`] if the job was cancelled
    /// - the job's own failure kind if it failed
    pub async fn await_completion(&self, id: JobId, timeout: Duration) -> Result<StoredArtifact> {
        let channel = self.job(id)?;
        let snapshot = tokio::time::timeout(timeout, channel.wait_terminal())
            .await
            .map_err(|_| Error::Timeout { waited: timeout })?;

        match snapshot.state {
            JobState::Completed => snapshot.artifact.clone().ok_or_else(|| {
                Error::ArtifactNotFound {
                    detail: format!("job {} completed without an artifact", id),
                }
            }),
            JobState::Cancelled => Err(Error::Cancelled),
            _ => Err(snapshot
                .error
                .clone()
                .map(Error::from)
                .unwrap_or_else(|| Error::FetchFailed {
                    detail: format!("job {} failed", id),
                })),
        }
    }
}
