//! Queue processor - admits queued jobs through the concurrency gate and spawns them.

use std::sync::Arc;

use super::MediaDownloader;
use super::fetch_job::{FetchJobContext, run_fetch_job};

impl MediaDownloader {
    /// Start the queue processor task
    ///
    /// Loops until shutdown closes the admission semaphore:
    /// 1. Takes the oldest job from the FIFO queue (sleeps until notified if empty)
    /// 2. Acquires a permit from the concurrency limiter (respects max_concurrent_downloads)
    /// 3. Moves the job to Running, skipping it if it was cancelled meanwhile
    /// 4. Spawns the job task, which holds the permit until it finishes
    pub(crate) fn start_queue_processor(&self) -> tokio::task::JoinHandle<()> {
        let queue = self.queue_state.queue.clone();
        let queue_notify = self.queue_state.queue_notify.clone();
        let concurrent_limit = self.queue_state.concurrent_limit.clone();
        let active_downloads = self.queue_state.active_downloads.clone();
        let downloader = self.clone();

        tokio::spawn(async move {
            loop {
                if concurrent_limit.is_closed() {
                    break;
                }

                let next = {
                    let mut queue_guard = queue.lock().await;
                    queue_guard.pop_front()
                };

                let Some(id) = next else {
                    queue_notify.notified().await;
                    continue;
                };

                let Ok(channel) = downloader.job(id) else {
                    continue;
                };
                if channel.snapshot().state.is_terminal() {
                    // Cancelled while queued
                    continue;
                }

                // Blocks while max_concurrent_downloads jobs are running
                let permit = match concurrent_limit.clone().acquire_owned().await {
                    Ok(p) => p,
                    Err(_) => {
                        // Semaphore closed - put the job back so it isn't lost
                        queue.lock().await.push_front(id);
                        break;
                    }
                };

                if !channel.begin_running() {
                    tracing::debug!(job_id = id.0, "job cancelled before admission");
                    continue;
                }

                let cancel_token = channel.cancel_token().clone();
                active_downloads.lock().await.insert(id, cancel_token.clone());

                let snapshot = channel.snapshot();
                let ctx = FetchJobContext {
                    id,
                    url: snapshot.url.clone(),
                    spec: snapshot.spec.clone(),
                    channel,
                    fetcher: Arc::clone(&downloader.fetcher),
                    storage: Arc::clone(&downloader.storage),
                    config: Arc::clone(&downloader.config),
                    active_downloads: Arc::clone(&active_downloads),
                    cancel_token,
                };

                tokio::spawn(async move {
                    let _permit = permit;
                    run_fetch_job(ctx).await;
                });
            }

            tracing::debug!("queue processor stopped");
        })
    }
}
