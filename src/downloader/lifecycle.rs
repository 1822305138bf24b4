//! Reclamation and shutdown coordination.

use std::sync::atomic::Ordering;
use std::time::{Duration, SystemTime};

use chrono::Utc;

use crate::error::Result;
use crate::storage::ReclaimReport;

use super::MediaDownloader;

impl MediaDownloader {
    /// Delete expired artifacts and forget long-finished jobs
    ///
    /// Files older than `download.retention` are removed unless a handoff
    /// holds them or a running job owns their stem. Terminal job records
    /// older than the same window are dropped from the registry; their ids
    /// then report `NotFound`.
    pub async fn reclaim_stale(&self) -> ReclaimReport {
        let window = self.config.download.retention;
        let storage = self.storage.clone();
        let report = tokio::task::spawn_blocking(move || {
            storage.reclaim_stale(SystemTime::now(), window)
        })
        .await
        .unwrap_or_else(|e| {
            tracing::error!(error = %e, "reclamation task panicked");
            ReclaimReport {
                failed: 1,
                ..ReclaimReport::default()
            }
        });

        let pruned = self.prune_finished_jobs(window);
        if pruned > 0 {
            tracing::debug!(pruned, "forgot finished jobs");
        }
        report
    }

    /// Drop terminal job records that finished more than `window` ago
    pub(crate) fn prune_finished_jobs(&self, window: Duration) -> usize {
        let Ok(window) = chrono::Duration::from_std(window) else {
            return 0;
        };
        let cutoff = Utc::now() - window;
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        let before = jobs.len();
        jobs.retain(|_, channel| {
            let snapshot = channel.snapshot();
            !matches!(snapshot.finished_at, Some(finished) if finished < cutoff)
        });
        before - jobs.len()
    }

    /// Run a reclamation pass in the background unless one is already running
    pub(crate) fn spawn_reclaim(&self) {
        if self.reclaiming.swap(true, Ordering::AcqRel) {
            return;
        }
        let downloader = self.clone();
        tokio::spawn(async move {
            downloader.reclaim_stale().await;
            downloader.reclaiming.store(false, Ordering::Release);
        });
    }

    /// Gracefully shut down the orchestrator
    ///
    /// 1. Stops accepting new submissions
    /// 2. Cancels every Pending and Running job
    /// 3. Waits for running jobs to finish cleaning up (30 second timeout)
    /// 4. Stops the queue processor
    ///
    /// Calling it again is harmless.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        self.queue_state.accepting_new.store(false, Ordering::SeqCst);
        tracing::info!("Stopped accepting new downloads");

        let channels: Vec<_> = self
            .jobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();
        let mut cancelled = 0usize;
        for channel in channels {
            if !channel.snapshot().state.is_terminal() {
                channel.request_cancel();
                cancelled += 1;
            }
        }
        self.queue_state.queue.lock().await.clear();
        tracing::info!(cancelled, "Cancelled unfinished jobs");

        let shutdown_timeout = Duration::from_secs(30);
        match tokio::time::timeout(shutdown_timeout, self.wait_for_active_downloads()).await {
            Ok(()) => tracing::info!("All active downloads stopped"),
            Err(_) => tracing::warn!(
                "Timeout waiting for downloads to stop, proceeding with shutdown"
            ),
        }

        self.queue_state.concurrent_limit.close();
        self.queue_state.queue_notify.notify_one();

        tracing::info!("Graceful shutdown complete");
        Ok(())
    }

    /// Wait until no job holds an admission slot
    async fn wait_for_active_downloads(&self) {
        loop {
            let active_count = self.queue_state.active_downloads.lock().await.len();
            if active_count == 0 {
                return;
            }
            tracing::debug!(active_count, "Waiting for active downloads to stop");
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}
