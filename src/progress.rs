//! Per-job progress channel
//!
//! Each job owns a [`JobChannel`]: a `watch` cell holding the latest
//! [`JobSnapshot`] and a `broadcast` channel of [`ProgressEvent`]s. Every
//! change goes through [`JobChannel::update`], which bumps the sequence
//! number and sends the event while holding the cell's write lock, so events
//! leave in sequence order and nothing is published after a terminal state.
//!
//! A [`JobSubscription`] starts with one event describing the snapshot at
//! subscription time and then yields only newer events. Late subscribers to
//! a finished job get exactly one terminal event.

use futures::Stream;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

use crate::error::{ErrorInfo, ErrorKind};
use crate::types::{JobId, JobSnapshot, JobState, Phase, ProgressEvent};

/// Shared state of one job's progress stream
pub struct JobChannel {
    snapshot: watch::Sender<Arc<JobSnapshot>>,
    events: broadcast::Sender<ProgressEvent>,
    global: broadcast::Sender<ProgressEvent>,
    cancel: CancellationToken,
    subscribers: AtomicUsize,
    cancel_on_disconnect: bool,
}

impl JobChannel {
    /// Create a channel seeded with the job's initial snapshot
    ///
    /// Every event is also forwarded to `global`.
    pub fn new(
        initial: JobSnapshot,
        cancel_on_disconnect: bool,
        global: broadcast::Sender<ProgressEvent>,
        buffer: usize,
    ) -> Self {
        let (snapshot, _rx) = watch::channel(Arc::new(initial));
        let (events, _rx) = broadcast::channel(buffer.max(1));
        Self {
            snapshot,
            events,
            global,
            cancel: CancellationToken::new(),
            subscribers: AtomicUsize::new(0),
            cancel_on_disconnect,
        }
    }

    /// Job this channel belongs to
    pub fn job_id(&self) -> JobId {
        self.snapshot.borrow().id
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> Arc<JobSnapshot> {
        Arc::clone(&self.snapshot.borrow())
    }

    /// Token observed by the running job
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.load(Ordering::Acquire)
    }

    /// Apply a change and publish it
    ///
    /// Returns the published event, or None when the job is already terminal
    /// or the change left the snapshot as it was.
    pub fn update<F>(&self, change: F) -> Option<ProgressEvent>
    where
        F: FnOnce(&mut JobSnapshot),
    {
        let mut published = None;
        self.snapshot.send_if_modified(|current| {
            if current.state.is_terminal() {
                return false;
            }
            let mut next = JobSnapshot::clone(current);
            change(&mut next);
            if next == **current {
                return false;
            }

            next.seq = current.seq + 1;
            if next.state.is_terminal() && next.finished_at.is_none() {
                next.finished_at = Some(chrono::Utc::now());
            }
            let event = next.to_event();
            *current = Arc::new(next);

            // No receivers is fine: nobody is watching this job
            let _ = self.events.send(event.clone());
            let _ = self.global.send(event.clone());
            published = Some(event);
            true
        });
        published
    }

    /// Publish byte counters and phase, keeping both counters non-decreasing
    pub fn record_progress(&self, downloaded: u64, total: u64, phase: Phase) -> bool {
        self.update(|s| {
            s.bytes_downloaded = s.bytes_downloaded.max(downloaded);
            s.bytes_total = s.bytes_total.max(total);
            if !phase.is_terminal() {
                s.phase = phase;
            }
        })
        .is_some()
    }

    /// Move a Pending job to Running; false if it is no longer Pending
    pub fn begin_running(&self) -> bool {
        self.update(|s| {
            if s.state == JobState::Pending {
                s.state = JobState::Running;
                s.phase = Phase::Downloading;
            }
        })
        .is_some_and(|e| e.state == JobState::Running)
    }

    /// Publish a terminal failure or cancellation
    pub fn finish_with_error(&self, info: ErrorInfo) -> bool {
        let state = if info.kind == ErrorKind::Cancelled {
            JobState::Cancelled
        } else {
            JobState::Failed
        };
        self.update(|s| {
            s.state = state;
            s.phase = Phase::Errored;
            s.error = Some(info);
        })
        .is_some()
    }

    /// Cancel the job
    ///
    /// A Pending job goes straight to Cancelled. A Running job has its token
    /// cancelled and reaches Cancelled once it observes the token. Returns
    /// true if this call ended a Pending job.
    pub fn request_cancel(&self) -> bool {
        let ended = self
            .update(|s| {
                if s.state == JobState::Pending {
                    s.state = JobState::Cancelled;
                    s.phase = Phase::Errored;
                    s.error = Some(ErrorInfo::new(ErrorKind::Cancelled, None));
                }
            })
            .is_some();
        self.cancel.cancel();
        ended
    }

    /// Wait until the job reaches a terminal state
    pub async fn wait_terminal(&self) -> Arc<JobSnapshot> {
        let mut rx = self.snapshot.subscribe();
        loop {
            let current = Arc::clone(&rx.borrow_and_update());
            if current.state.is_terminal() {
                return current;
            }
            if rx.changed().await.is_err() {
                return self.snapshot();
            }
        }
    }

    /// Open a subscription to this job's progress
    pub fn subscribe(self: &Arc<Self>) -> JobSubscription {
        // Register for events before reading the snapshot so nothing newer
        // than the snapshot can be missed
        let rx = self.events.subscribe();
        self.subscribers.fetch_add(1, Ordering::AcqRel);
        let initial = self.snapshot().to_event();
        JobSubscription {
            channel: Arc::clone(self),
            rx,
            pending: Some(initial),
            last_seq: None,
            finished: false,
        }
    }
}

/// Ordered, duplicate-free stream of one job's progress events
///
/// The first event describes the job as it was when the subscription was
/// opened. The stream ends after the terminal event.
pub struct JobSubscription {
    channel: Arc<JobChannel>,
    rx: broadcast::Receiver<ProgressEvent>,
    pending: Option<ProgressEvent>,
    last_seq: Option<u64>,
    finished: bool,
}

impl JobSubscription {
    /// Job being observed
    pub fn job_id(&self) -> JobId {
        self.channel.job_id()
    }

    /// Next event, or None once the terminal event has been delivered
    pub async fn next(&mut self) -> Option<ProgressEvent> {
        if self.finished {
            return None;
        }
        if let Some(event) = self.pending.take() {
            return Some(self.deliver(event));
        }

        loop {
            match self.rx.recv().await {
                Ok(event) => {
                    if self.is_stale(event.seq) {
                        continue;
                    }
                    return Some(self.deliver(event));
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(
                        job_id = self.job_id().0,
                        skipped,
                        "progress subscriber lagged, resyncing from snapshot"
                    );
                    let current = self.channel.snapshot().to_event();
                    if !self.is_stale(current.seq) {
                        return Some(self.deliver(current));
                    }
                }
                Err(broadcast::error::RecvError::Closed) => {
                    let current = self.channel.snapshot().to_event();
                    if self.is_stale(current.seq) {
                        self.finished = true;
                        return None;
                    }
                    return Some(self.deliver(current));
                }
            }
        }
    }

    /// Convert into a [`Stream`] of events
    pub fn into_stream(self) -> impl Stream<Item = ProgressEvent> + Send {
        futures::stream::unfold(self, |mut subscription| async move {
            subscription
                .next()
                .await
                .map(|event| (event, subscription))
        })
    }

    fn is_stale(&self, seq: u64) -> bool {
        self.last_seq.is_some_and(|last| seq <= last)
    }

    fn deliver(&mut self, event: ProgressEvent) -> ProgressEvent {
        self.last_seq = Some(event.seq);
        if event.state.is_terminal() {
            self.finished = true;
        }
        event
    }
}

impl Drop for JobSubscription {
    fn drop(&mut self) {
        let remaining = self.channel.subscribers.fetch_sub(1, Ordering::AcqRel) - 1;
        if remaining == 0
            && self.channel.cancel_on_disconnect
            && !self.channel.snapshot().state.is_terminal()
        {
            tracing::info!(
                job_id = self.job_id().0,
                "last subscriber disconnected, cancelling job"
            );
            self.channel.request_cancel();
        }
    }
}
