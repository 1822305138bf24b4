//! Background task that turns fetcher counters into progress events.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::fetcher::ProgressSink;
use crate::progress::JobChannel;
use crate::types::{JobId, Phase};

/// Parameters for spawning a progress reporter background task
pub(super) struct ProgressReporterParams {
    /// Job ID
    pub id: JobId,
    /// Channel the events are published on
    pub channel: Arc<JobChannel>,
    /// Counters written by the fetcher
    pub sink: ProgressSink,
    /// Minimum spacing between events
    pub interval: Duration,
    /// Stops the reporter; the task publishes one last reading before exiting
    pub stop: CancellationToken,
}

/// Spawn a background task that periodically publishes the fetcher's progress.
///
/// At most one event per interval, and only when the counters or the phase
/// changed since the last one.
pub(super) fn spawn_progress_reporter(params: ProgressReporterParams) -> tokio::task::JoinHandle<()> {
    let ProgressReporterParams {
        id,
        channel,
        sink,
        interval,
        stop,
    } = params;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => publish(&channel, &sink),
                _ = stop.cancelled() => break,
            }
        }

        publish(&channel, &sink);
        tracing::debug!(job_id = id.0, "progress reporter stopped");
    })
}

fn publish(channel: &JobChannel, sink: &ProgressSink) {
    let reading = sink.reading();
    let phase = if reading.post_processing {
        Phase::PostProcessing
    } else {
        Phase::Downloading
    };
    channel.record_progress(reading.downloaded, reading.total, phase);
}
