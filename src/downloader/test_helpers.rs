//! Shared test helpers for creating MediaDownloader instances in tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::tempdir;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::downloader::MediaDownloader;
use crate::error::{Error, Result};
use crate::fetcher::{FetchOutcome, FetchRequest, MediaFetcher, MediaMetadata, ProgressSink};
use crate::filename::template_parts;

/// How a scripted fetch ends
#[derive(Debug, Clone)]
pub(crate) enum ScriptedOutcome {
    /// Write `<stem>.<ext>`; report `<stem>.<reported_ext>` if set
    Write {
        ext: &'static str,
        reported_ext: Option<&'static str>,
    },
    /// Fail as a network error
    FetchFailed,
    /// Fail in the transcoding step
    PostProcessFailed,
    /// Succeed without writing anything
    NothingWritten,
}

/// In-process fetcher driven by the test
///
/// - The title is the URL's last path segment; URLs containing "missing"
///   fail metadata extraction with `SourceUnavailable`.
/// - Every fetch writes a `<stem>.mp4.part` file first, then waits on the
///   gate (if any) until the test releases it or the job is cancelled.
pub(crate) struct ScriptedFetcher {
    pub(crate) outcome: ScriptedOutcome,
    gate: Option<Arc<Semaphore>>,
    pub(crate) started: AtomicUsize,
    running: AtomicUsize,
    pub(crate) max_running: AtomicUsize,
    pub(crate) started_urls: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    /// Fetcher that completes immediately with an mp4
    pub(crate) fn instant() -> Self {
        Self::new(
            ScriptedOutcome::Write {
                ext: "mp4",
                reported_ext: None,
            },
            false,
        )
    }

    /// Fetcher whose fetches block until [`release`](Self::release) is called
    pub(crate) fn gated() -> Self {
        Self::new(
            ScriptedOutcome::Write {
                ext: "mp4",
                reported_ext: None,
            },
            true,
        )
    }

    pub(crate) fn new(outcome: ScriptedOutcome, gated: bool) -> Self {
        Self {
            outcome,
            gate: gated.then(|| Arc::new(Semaphore::new(0))),
            started: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
            max_running: AtomicUsize::new(0),
            started_urls: Mutex::new(Vec::new()),
        }
    }

    /// Let `n` blocked fetches proceed
    pub(crate) fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    pub(crate) fn started_count(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub(crate) fn running_count(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    pub(crate) fn max_running(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }

    pub(crate) fn started_urls(&self) -> Vec<String> {
        self.started_urls.lock().unwrap().clone()
    }
}

struct RunningGuard<'a>(&'a AtomicUsize);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl MediaFetcher for ScriptedFetcher {
    async fn extract_metadata(&self, url: &str) -> Result<MediaMetadata> {
        if url.contains("missing") {
            return Err(Error::SourceUnavailable {
                detail: "ERROR: [generic] Video unavailable".to_string(),
            });
        }
        let title = url
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or("clip")
            .to_string();
        Ok(MediaMetadata {
            title: Some(title),
            duration_seconds: Some(205),
            thumbnail: Some("https://img.example.com/thumb.jpg".to_string()),
            max_height: Some(720),
        })
    }

    async fn fetch(
        &self,
        request: FetchRequest,
        sink: ProgressSink,
        cancel: CancellationToken,
    ) -> Result<FetchOutcome> {
        self.started_urls.lock().unwrap().push(request.url.clone());
        self.started.fetch_add(1, Ordering::SeqCst);
        let now_running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now_running, Ordering::SeqCst);
        let _running = RunningGuard(&self.running);

        let (dir, stem) = template_parts(&request.spec).expect("bound output template");
        let partial = dir.join(format!("{}.mp4.part", stem));
        tokio::fs::write(&partial, b"partial").await?;
        sink.record(512, Some(1024));

        if let Some(gate) = &self.gate {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                permit = gate.acquire() => {
                    if let Ok(permit) = permit {
                        permit.forget();
                    }
                }
            }
        }
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let _ = tokio::fs::remove_file(&partial).await;
        sink.record(1024, Some(1024));

        match &self.outcome {
            ScriptedOutcome::Write { ext, reported_ext } => {
                let path = dir.join(format!("{}.{}", stem, ext));
                tokio::fs::write(&path, vec![7u8; 1024]).await?;
                let reported = reported_ext.map(|r| dir.join(format!("{}.{}", stem, r)));
                Ok(FetchOutcome {
                    reported_path: reported.or(Some(path)),
                })
            }
            ScriptedOutcome::FetchFailed => Err(Error::FetchFailed {
                detail: "ERROR: unable to download video data: HTTP Error 403".to_string(),
            }),
            ScriptedOutcome::PostProcessFailed => {
                sink.enter_post_processing();
                Err(Error::PostProcessFailed {
                    detail: "ERROR: Postprocessing: ffmpeg exited with code 1".to_string(),
                })
            }
            ScriptedOutcome::NothingWritten => Ok(FetchOutcome::default()),
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Test config rooted in a fresh temp dir
pub(crate) fn test_config(dir: &tempfile::TempDir, max_concurrent: usize) -> Config {
    let mut config = Config::default();
    config.download.output_dir = dir.path().join("downloads");
    config.download.max_concurrent_downloads = max_concurrent;
    config.download.progress_interval_ms = 10;
    config
}

/// Create a downloader around `fetcher` with the given concurrency bound.
/// Returns the downloader and the tempdir (which must be kept alive).
pub(crate) async fn create_test_downloader_with(
    fetcher: Arc<ScriptedFetcher>,
    max_concurrent: usize,
) -> (MediaDownloader, tempfile::TempDir) {
    create_test_downloader_configured(fetcher, |config| {
        config.download.max_concurrent_downloads = max_concurrent;
    })
    .await
}

/// Create a downloader around `fetcher`, letting the test adjust the config
pub(crate) async fn create_test_downloader_configured(
    fetcher: Arc<ScriptedFetcher>,
    configure: impl FnOnce(&mut Config),
) -> (MediaDownloader, tempfile::TempDir) {
    let temp_dir = tempdir().unwrap();
    let mut config = test_config(&temp_dir, 4);
    configure(&mut config);
    let downloader = MediaDownloader::with_fetcher(config, fetcher).await.unwrap();
    (downloader, temp_dir)
}

/// Create a downloader with an instant fetcher and 4 slots
pub(crate) async fn create_test_downloader() -> (MediaDownloader, tempfile::TempDir) {
    create_test_downloader_with(Arc::new(ScriptedFetcher::instant()), 4).await
}

/// Poll until `check` holds, failing the test after 5 seconds
pub(crate) async fn wait_until<F: Fn() -> bool>(check: F) {
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
    while !check() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached within 5s"
        );
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
}
