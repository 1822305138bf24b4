use std::sync::Arc;
use std::time::Duration;

use super::*;
use crate::downloader::test_helpers::{
    ScriptedFetcher, ScriptedOutcome, create_test_downloader, create_test_downloader_configured,
    create_test_downloader_with, wait_until,
};
use crate::error::ErrorKind;
use crate::types::{DownloadRequest, JobState, MediaKind, Phase};

const WAIT: Duration = Duration::from_secs(5);

fn video(url: &str) -> DownloadRequest {
    DownloadRequest::new(url, MediaKind::Video)
}

// -----------------------------------------------------------------------
// submit / await_completion
// -----------------------------------------------------------------------

#[tokio::test]
async fn submitted_job_completes_with_artifact() {
    let (downloader, _temp_dir) = create_test_downloader().await;

    let id = downloader
        .submit(video("https://example.com/watch/first-clip"))
        .await
        .unwrap();
    let artifact = downloader.await_completion(id, WAIT).await.unwrap();

    assert!(artifact.path.exists());
    assert_eq!(artifact.display_name, "first-clip.mp4");
    assert_eq!(artifact.content_type, "video/mp4");
    assert_eq!(artifact.size_bytes, 1024);

    let status = downloader.status(id).unwrap();
    assert_eq!(status.state, JobState::Completed);
    assert_eq!(status.phase, Phase::Done);
    assert_eq!(status.title.as_deref(), Some("first-clip"));
    assert_eq!(status.bytes_downloaded, 1024);
    assert!(status.finished_at.is_some());
}

#[tokio::test]
async fn job_ids_are_unique_and_increasing() {
    let (downloader, _temp_dir) = create_test_downloader().await;

    let a = downloader.submit(video("https://example.com/a")).await.unwrap();
    let b = downloader.submit(video("https://example.com/b")).await.unwrap();

    assert!(b > a);
    let listed: Vec<_> = downloader.list_jobs().iter().map(|s| s.id).collect();
    assert_eq!(listed, vec![a, b]);
}

#[tokio::test]
async fn invalid_url_is_rejected_without_creating_a_job() {
    let (downloader, _temp_dir) = create_test_downloader().await;

    for bad in ["", "not a url", "ftp://example.com/file"] {
        let err = downloader.submit(video(bad)).await.unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)), "{bad:?}: {err:?}");
    }
    assert!(downloader.list_jobs().is_empty());
}

#[tokio::test]
async fn await_timeout_leaves_job_running() {
    let fetcher = Arc::new(ScriptedFetcher::gated());
    let (downloader, _temp_dir) = create_test_downloader_with(fetcher.clone(), 1).await;

    let id = downloader.submit(video("https://example.com/slow")).await.unwrap();
    let err = downloader
        .await_completion(id, Duration::from_millis(50))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout { .. }));
    assert!(!downloader.status(id).unwrap().state.is_terminal());

    fetcher.release(1);
    let artifact = downloader.await_completion(id, WAIT).await.unwrap();
    assert!(artifact.path.exists());
}

#[tokio::test]
async fn capacity_is_enforced_on_pending_jobs() {
    let fetcher = Arc::new(ScriptedFetcher::gated());
    let (downloader, _temp_dir) = create_test_downloader_configured(fetcher.clone(), |config| {
        config.download.max_concurrent_downloads = 1;
        config.download.max_queued_jobs = Some(1);
    })
    .await;

    downloader.submit(video("https://example.com/a")).await.unwrap();
    wait_until(|| fetcher.started_count() == 1).await;
    downloader.submit(video("https://example.com/b")).await.unwrap();

    let err = downloader
        .submit(video("https://example.com/c"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::CapacityExceeded { limit: 1 }));
    assert_eq!(downloader.list_jobs().len(), 2);

    fetcher.release(2);
}

// -----------------------------------------------------------------------
// cancel
// -----------------------------------------------------------------------

#[tokio::test]
async fn cancel_pending_job_never_starts_it() {
    let fetcher = Arc::new(ScriptedFetcher::gated());
    let (downloader, _temp_dir) = create_test_downloader_with(fetcher.clone(), 1).await;

    let first = downloader.submit(video("https://example.com/first")).await.unwrap();
    let second = downloader.submit(video("https://example.com/second")).await.unwrap();
    wait_until(|| fetcher.started_count() == 1).await;

    downloader.cancel(second).await.unwrap();
    let status = downloader.status(second).unwrap();
    assert_eq!(status.state, JobState::Cancelled);
    assert_eq!(status.phase, Phase::Errored);

    fetcher.release(1);
    downloader.await_completion(first, WAIT).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(fetcher.started_count(), 1);
    assert_eq!(fetcher.started_urls(), vec!["https://example.com/first"]);
}

#[tokio::test]
async fn cancel_running_job_removes_partial_files() {
    let fetcher = Arc::new(ScriptedFetcher::gated());
    let (downloader, temp_dir) = create_test_downloader_with(fetcher.clone(), 1).await;

    let id = downloader.submit(video("https://example.com/partial")).await.unwrap();
    let output_dir = temp_dir.path().join("downloads");
    let partial = output_dir.join("partial.mp4.part");
    wait_until(|| partial.exists()).await;

    downloader.cancel(id).await.unwrap();
    let err = downloader.await_completion(id, WAIT).await.unwrap_err();
    assert!(matches!(err, Error::Cancelled));

    let status = downloader.status(id).unwrap();
    assert_eq!(status.state, JobState::Cancelled);
    assert_eq!(status.error.as_ref().unwrap().kind, ErrorKind::Cancelled);
    assert_eq!(std::fs::read_dir(&output_dir).unwrap().count(), 0);
    wait_until(|| fetcher.running_count() == 0).await;
}

#[tokio::test]
async fn cancelled_job_leaves_files_of_dotted_title_alone() {
    let fetcher = Arc::new(ScriptedFetcher::gated());
    let (downloader, temp_dir) = create_test_downloader_with(fetcher.clone(), 2).await;
    let output_dir = temp_dir.path().join("downloads");

    let short = downloader.submit(video("https://example.com/v/Mr")).await.unwrap();
    let dotted = downloader.submit(video("https://example.com/v/Mr.Smith")).await.unwrap();
    let short_partial = output_dir.join("Mr.mp4.part");
    let dotted_partial = output_dir.join("Mr_Smith.mp4.part");
    wait_until(|| short_partial.exists() && dotted_partial.exists()).await;

    downloader.cancel(short).await.unwrap();
    let err = downloader.await_completion(short, WAIT).await.unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    assert!(!short_partial.exists());
    assert!(dotted_partial.exists());

    fetcher.release(1);
    let artifact = downloader.await_completion(dotted, WAIT).await.unwrap();
    assert_eq!(artifact.path, output_dir.join("Mr_Smith.mp4"));
    assert_eq!(artifact.display_name, "Mr.Smith.mp4");
}

#[tokio::test]
async fn cancel_is_idempotent() {
    let (downloader, _temp_dir) = create_test_downloader().await;

    let id = downloader.submit(video("https://example.com/done")).await.unwrap();
    downloader.await_completion(id, WAIT).await.unwrap();

    downloader.cancel(id).await.unwrap();
    downloader.cancel(id).await.unwrap();
    assert_eq!(downloader.status(id).unwrap().state, JobState::Completed);
}

#[tokio::test]
async fn unknown_job_is_not_found() {
    let (downloader, _temp_dir) = create_test_downloader().await;
    let missing = crate::types::JobId(999);

    assert!(matches!(downloader.cancel(missing).await, Err(Error::NotFound(_))));
    assert!(matches!(downloader.status(missing), Err(Error::NotFound(_))));
    assert!(matches!(
        downloader.await_completion(missing, WAIT).await,
        Err(Error::NotFound(_))
    ));
}

// -----------------------------------------------------------------------
// failures
// -----------------------------------------------------------------------

#[tokio::test]
async fn metadata_failure_is_source_unavailable() {
    let (downloader, _temp_dir) = create_test_downloader().await;

    let id = downloader
        .submit(video("https://example.com/missing-video"))
        .await
        .unwrap();
    let err = downloader.await_completion(id, WAIT).await.unwrap_err();

    assert!(matches!(err, Error::SourceUnavailable { .. }));
    let status = downloader.status(id).unwrap();
    assert_eq!(status.state, JobState::Failed);
    assert_eq!(status.phase, Phase::Errored);
    let info = status.error.as_ref().unwrap();
    assert_eq!(info.kind, ErrorKind::SourceUnavailable);
    assert!(info.detail.as_deref().unwrap().contains("Video unavailable"));
}

#[tokio::test]
async fn fetch_failure_keeps_kind_and_detail() {
    let fetcher = Arc::new(ScriptedFetcher::new(ScriptedOutcome::FetchFailed, false));
    let (downloader, temp_dir) = create_test_downloader_with(fetcher, 2).await;

    let id = downloader.submit(video("https://example.com/blocked")).await.unwrap();
    let err = downloader.await_completion(id, WAIT).await.unwrap_err();

    match err {
        Error::FetchFailed { detail } => assert!(detail.contains("403")),
        other => panic!("expected FetchFailed, got {other:?}"),
    }
    let output_dir = temp_dir.path().join("downloads");
    assert_eq!(std::fs::read_dir(&output_dir).unwrap().count(), 0);
}

#[tokio::test]
async fn post_process_failure_is_reported() {
    let fetcher = Arc::new(ScriptedFetcher::new(ScriptedOutcome::PostProcessFailed, false));
    let (downloader, _temp_dir) = create_test_downloader_with(fetcher, 2).await;

    let id = downloader
        .submit(DownloadRequest::new("https://example.com/song", MediaKind::AudioMp3))
        .await
        .unwrap();
    let err = downloader.await_completion(id, WAIT).await.unwrap_err();

    assert!(matches!(err, Error::PostProcessFailed { .. }));
    assert_eq!(
        downloader.status(id).unwrap().error.as_ref().unwrap().kind,
        ErrorKind::PostProcessFailed
    );
}

#[tokio::test]
async fn missing_output_is_artifact_not_found() {
    let fetcher = Arc::new(ScriptedFetcher::new(ScriptedOutcome::NothingWritten, false));
    let (downloader, _temp_dir) = create_test_downloader_with(fetcher, 2).await;

    let id = downloader.submit(video("https://example.com/ghost")).await.unwrap();
    let err = downloader.await_completion(id, WAIT).await.unwrap_err();

    assert!(matches!(err, Error::ArtifactNotFound { .. }));
}
