//! Fetch job orchestration - top-level lifecycle for a single job.

use chrono::Utc;
use std::future::Future;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::fetcher::{FetchRequest, MediaMetadata, ProgressSink};
use crate::filename::{content_type_for, disk_stem, resolve_artifact, sanitize_display_name};
use crate::storage::StemReservation;
use crate::types::StoredArtifact;

use super::context::FetchJobContext;
use super::reporter::{ProgressReporterParams, spawn_progress_reporter};

/// Core job task -- runs an admitted job to a terminal state.
///
/// Phases:
/// 1. Extract metadata (failure is `SourceUnavailable`)
/// 2. Sanitize the title and reserve a unique output stem
/// 3. Fetch with progress reporting
/// 4. Resolve the artifact on disk
/// 5. Publish Completed, or clean up the stem's files and publish the failure
pub(crate) async fn run_fetch_job(ctx: FetchJobContext) {
    let id = ctx.id;
    tracing::info!(job_id = id.0, url = %ctx.url, fetcher = ctx.fetcher.name(), "job started");

    let mut reservation: Option<StemReservation> = None;
    match execute(&ctx, &mut reservation).await {
        Ok(artifact) => ctx.mark_completed(artifact),
        Err(e) => {
            if let Some(reserved) = &reservation {
                let removed = ctx.storage.remove_stem_files(reserved.stem()).await;
                if removed > 0 {
                    tracing::debug!(job_id = id.0, removed, "removed partial files");
                }
            }
            ctx.mark_failed(&e);
        }
    }

    drop(reservation);
    ctx.remove_from_active().await;
}

async fn execute(
    ctx: &FetchJobContext,
    reservation: &mut Option<StemReservation>,
) -> Result<StoredArtifact> {
    let metadata = cancellable(&ctx.cancel_token, ctx.fetcher.extract_metadata(&ctx.url))
        .await
        .map_err(as_source_error)?;

    let display_name = display_name_for(&metadata);
    let reserved = ctx.storage.reserve_stem(&disk_stem(&display_name)).await?;
    let spec = ctx.spec.bound_to(ctx.storage.dir(), reserved.stem());
    tracing::debug!(
        job_id = ctx.id.0,
        stem = reserved.stem(),
        selector = %spec.stream_selector,
        "output stem reserved"
    );
    *reservation = Some(reserved);

    ctx.channel.update(|s| {
        s.title = Some(display_name.clone());
        s.spec = spec.clone();
    });

    let sink = ProgressSink::new();
    let stop = CancellationToken::new();
    let reporter = spawn_progress_reporter(ProgressReporterParams {
        id: ctx.id,
        channel: ctx.channel.clone(),
        sink: sink.clone(),
        interval: ctx.config.download.progress_interval(),
        stop: stop.clone(),
    });

    let request = FetchRequest {
        url: ctx.url.clone(),
        spec: spec.clone(),
    };
    let outcome = ctx
        .fetcher
        .fetch(request, sink, ctx.cancel_token.clone())
        .await;

    // The reporter must be gone before the terminal event
    stop.cancel();
    if let Err(e) = reporter.await {
        tracing::warn!(job_id = ctx.id.0, error = %e, "progress reporter panicked");
    }

    let outcome = outcome?;
    if ctx.cancel_token.is_cancelled() {
        return Err(Error::Cancelled);
    }

    let path = resolve_artifact(&spec, outcome.reported_path.as_deref()).await?;
    let size_bytes = tokio::fs::metadata(&path).await?.len();
    let suggested = match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{}.{}", display_name, ext),
        None => display_name,
    };

    Ok(StoredArtifact {
        content_type: content_type_for(&path).to_string(),
        path,
        created_at: Utc::now(),
        display_name: suggested,
        size_bytes,
    })
}

fn display_name_for(metadata: &MediaMetadata) -> String {
    sanitize_display_name(metadata.title.as_deref().unwrap_or_default())
}

/// Metadata failures surface as `SourceUnavailable`, except cancellation
/// and a missing tool, which keep their own kind.
fn as_source_error(error: Error) -> Error {
    match error {
        Error::Cancelled | Error::ExternalTool(_) | Error::SourceUnavailable { .. } => error,
        other => Error::SourceUnavailable {
            detail: other.detail().unwrap_or_else(|| other.to_string()),
        },
    }
}

async fn cancellable<T>(
    token: &CancellationToken,
    work: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(Error::Cancelled),
        result = work => result,
    }
}
