//! FIFO queue management for job admission order.

use crate::types::{JobId, JobState};

use super::MediaDownloader;

impl MediaDownloader {
    /// Remove a job from the queue without starting it
    ///
    /// Returns true if the job was found and removed.
    pub(crate) async fn remove_from_queue(&self, id: JobId) -> bool {
        let mut queue = self.queue_state.queue.lock().await;
        let original_len = queue.len();
        queue.retain(|queued| *queued != id);
        queue.len() < original_len
    }

    /// Number of jobs waiting for an admission slot
    ///
    /// Counts Pending jobs, including one the queue processor has already
    /// taken off the queue while it waits for a free slot.
    pub fn pending_count(&self) -> usize {
        self.jobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|channel| channel.snapshot().state == JobState::Pending)
            .count()
    }

    /// Number of jobs currently holding an admission slot
    pub async fn active_count(&self) -> usize {
        self.queue_state.active_downloads.lock().await.len()
    }
}
