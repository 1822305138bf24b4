//! Job handlers: submission, status, cancellation, progress and file delivery.

use super::{SubmitResponse, event_name};
use crate::api::AppState;
use crate::error::ApiError;
use crate::types::{DownloadRequest, JobId, JobSnapshot, JobState};
use axum::{
    Json,
    body::Body,
    extract::{Path, State, rejection::JsonRejection},
    http::{HeaderValue, StatusCode, header},
    response::{
        IntoResponse, Response,
        sse::{Event as SseEvent, KeepAlive, Sse},
    },
};
use futures::StreamExt;
use std::convert::Infallible;
use tokio_util::io::ReaderStream;

/// POST /downloads - Submit a download
///
/// Returns 202 with the job id; progress is available from
/// `GET /downloads/:id/events`.
pub async fn submit_download(
    State(state): State<AppState>,
    payload: Result<Json<DownloadRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => return ApiError::validation(rejection.body_text()).into_response(),
    };

    match state.downloader.submit(request).await {
        Ok(id) => (
            StatusCode::ACCEPTED,
            Json(SubmitResponse {
                id,
                state: JobState::Pending,
            }),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /downloads - List known jobs, oldest first
pub async fn list_downloads(State(state): State<AppState>) -> impl IntoResponse {
    let jobs: Vec<JobSnapshot> = state
        .downloader
        .list_jobs()
        .iter()
        .map(|snapshot| snapshot.as_ref().clone())
        .collect();
    Json(jobs)
}

/// GET /downloads/:id - Job snapshot
pub async fn get_download(State(state): State<AppState>, Path(id): Path<u64>) -> Response {
    match state.downloader.status(JobId(id)) {
        Ok(snapshot) => Json(snapshot.as_ref().clone()).into_response(),
        Err(e) => e.into_response(),
    }
}

/// DELETE /downloads/:id - Cancel a job
///
/// Idempotent: cancelling a finished job succeeds without changing it.
pub async fn cancel_download(State(state): State<AppState>, Path(id): Path<u64>) -> Response {
    match state.downloader.cancel(JobId(id)).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /downloads/:id/events - Server-sent events for one job
///
/// The first event describes the job's current state and the stream closes
/// after the terminal event. Disconnecting cancels the job only when it was
/// submitted with `cancel_on_disconnect`.
pub async fn download_events(State(state): State<AppState>, Path(id): Path<u64>) -> Response {
    let subscription = match state.downloader.subscribe_job(JobId(id)) {
        Ok(subscription) => subscription,
        Err(e) => return e.into_response(),
    };

    let stream = subscription.into_stream().filter_map(|event| async move {
        match serde_json::to_string(&event) {
            Ok(json_data) => Some(Ok::<_, Infallible>(
                SseEvent::default()
                    .event(event_name(event.state))
                    .id(event.seq.to_string())
                    .data(json_data),
            )),
            Err(e) => {
                tracing::warn!(job_id = event.job_id.0, error = %e, "Failed to serialize event");
                None
            }
        }
    });

    Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}

/// GET /downloads/:id/file - Stream the finished artifact
///
/// The file is marked delivered once the last byte has been read; with
/// `delete_after_handoff` it is removed from disk afterwards. An aborted
/// transfer leaves it for the reclamation pass.
pub async fn download_file(State(state): State<AppState>, Path(id): Path<u64>) -> Response {
    let handoff = match state.downloader.fetch_artifact(JobId(id)).await {
        Ok(handoff) => handoff,
        Err(e) => return e.into_response(),
    };

    let content_type = handoff.content_type.clone();
    let disposition = content_disposition(&handoff.suggested_filename);
    let size_bytes = handoff.size_bytes;
    let (file, lease) = handoff.into_parts();

    let body = futures::stream::unfold(
        (ReaderStream::new(file), lease),
        |(mut reader, lease)| async move {
            match reader.next().await {
                Some(chunk) => Some((chunk, (reader, lease))),
                None => {
                    lease.mark_delivered();
                    None
                }
            }
        },
    );

    let mut response = Response::new(Body::from_stream(body));
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&content_type) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(size_bytes));
    response
}

/// `attachment` disposition with an ASCII fallback and an RFC 5987 UTF-8 name
pub(crate) fn content_disposition(filename: &str) -> String {
    let fallback: String = filename
        .chars()
        .map(|c| {
            if c.is_ascii() && !c.is_ascii_control() && c != '"' && c != '\\' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        urlencoding::encode(filename)
    )
}
