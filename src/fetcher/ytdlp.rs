//! yt-dlp backed fetcher

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use super::parser::{
    FILEPATH_MARKER, POST_PROCESS_MARKER, PROGRESS_MARKER, ProgressAccumulator, StdoutEvent,
    classify_fetch_failure, classify_metadata_failure, parse_metadata, parse_stdout_line,
};
use super::traits::{FetchOutcome, FetchRequest, MediaFetcher, MediaMetadata, ProgressSink};
use crate::config::ToolsConfig;
use crate::error::Error;
use crate::types::FetchSpec;

/// Stderr lines kept for error classification
const STDERR_TAIL_LINES: usize = 50;

/// Fetcher that runs the external `yt-dlp` binary
///
/// ```no_run
/// use media_dl::fetcher::{MediaFetcher, YtDlpFetcher};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let fetcher = YtDlpFetcher::from_path().expect("yt-dlp not found in PATH");
/// let meta = fetcher.extract_metadata("https://example.com/watch?v=1").await?;
/// println!("{:?}", meta.title);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct YtDlpFetcher {
    binary_path: PathBuf,
    ffmpeg_location: Option<PathBuf>,
    extra_args: Vec<String>,
}

impl YtDlpFetcher {
    /// Create a fetcher with an explicit binary path
    pub fn new(binary_path: PathBuf) -> Self {
        Self {
            binary_path,
            ffmpeg_location: None,
            extra_args: Vec::new(),
        }
    }

    /// Attempt to find yt-dlp in PATH
    pub fn from_path() -> Option<Self> {
        which::which("yt-dlp").ok().map(Self::new)
    }

    /// Build from tool configuration; None when no binary can be located
    pub fn from_config(tools: &ToolsConfig) -> Option<Self> {
        let fetcher = match &tools.ytdlp_path {
            Some(path) => Self::new(path.clone()),
            None if tools.search_path => Self::from_path()?,
            None => return None,
        };
        Some(
            fetcher
                .with_ffmpeg_location(tools.ffmpeg_location.clone())
                .with_extra_args(tools.extra_args.clone()),
        )
    }

    /// Pass `--ffmpeg-location` to every invocation
    pub fn with_ffmpeg_location(mut self, location: Option<PathBuf>) -> Self {
        self.ffmpeg_location = location;
        self
    }

    /// Append extra arguments to every invocation
    pub fn with_extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    /// Path of the yt-dlp binary
    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    fn common_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(location) = &self.ffmpeg_location {
            args.push("--ffmpeg-location".to_string());
            args.push(location.to_string_lossy().into_owned());
        }
        args.extend(self.extra_args.iter().cloned());
        args
    }

    fn metadata_args(&self, url: &str) -> Vec<String> {
        let mut args: Vec<String> = ["-J", "--no-warnings", "--no-playlist", "--skip-download"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        args.extend(self.common_args());
        args.push("--".to_string());
        args.push(url.to_string());
        args
    }

    fn fetch_args(&self, url: &str, spec: &FetchSpec) -> Vec<String> {
        let mut args = vec!["-f".to_string(), spec.stream_selector.clone()];

        if let Some(container) = &spec.merge_container {
            args.push("--merge-output-format".to_string());
            args.push(container.clone());
        }

        if let Some(pp) = &spec.post_process {
            args.push("-x".to_string());
            args.push("--audio-format".to_string());
            args.push(pp.target_codec.extension().to_string());
            args.push("--audio-quality".to_string());
            args.push(match pp.target_quality {
                Some(kbps) => format!("{}K", kbps),
                None => "0".to_string(),
            });
        }

        args.extend(
            [
                "--no-playlist",
                "--no-mtime",
                "--newline",
                "--progress",
                "--progress-template",
            ]
            .iter()
            .map(|s| s.to_string()),
        );
        args.push(format!(
            "download:{} %(progress.downloaded_bytes)s/%(progress.total_bytes)s/%(progress.total_bytes_estimate)s",
            PROGRESS_MARKER
        ));
        args.push("--print".to_string());
        args.push(format!("post_process:{} %(id)s", POST_PROCESS_MARKER));
        args.push("--print".to_string());
        args.push(format!("after_move:{} %(filepath)s", FILEPATH_MARKER));
        args.push("-o".to_string());
        args.push(spec.output_template.clone());
        args.extend(self.common_args());
        args.push("--".to_string());
        args.push(url.to_string());
        args
    }
}

#[async_trait]
impl MediaFetcher for YtDlpFetcher {
    async fn extract_metadata(&self, url: &str) -> crate::Result<MediaMetadata> {
        let output = Command::new(&self.binary_path)
            .args(self.metadata_args(url))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Error::ExternalTool(format!("Failed to execute yt-dlp: {}", e)))?;

        if !output.status.success() {
            return Err(classify_metadata_failure(&String::from_utf8_lossy(
                &output.stderr,
            )));
        }

        let json: serde_json::Value =
            serde_json::from_slice(&output.stdout).map_err(|e| Error::SourceUnavailable {
                detail: format!("yt-dlp returned invalid JSON: {}", e),
            })?;

        Ok(parse_metadata(&json))
    }

    async fn fetch(
        &self,
        request: FetchRequest,
        sink: ProgressSink,
        cancel: CancellationToken,
    ) -> crate::Result<FetchOutcome> {
        let args = self.fetch_args(&request.url, &request.spec);
        tracing::debug!(binary = %self.binary_path.display(), ?args, "spawning yt-dlp");

        let mut child = Command::new(&self.binary_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::ExternalTool(format!("Failed to execute yt-dlp: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::ExternalTool("yt-dlp stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::ExternalTool("yt-dlp stderr not captured".to_string()))?;

        let stderr_task = tokio::spawn(async move {
            let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            Vec::from(tail).join("\n")
        });

        let mut lines = BufReader::new(stdout).lines();
        let mut accumulator = ProgressAccumulator::default();
        let mut reported_path = None;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    let _ = child.kill().await;
                    stderr_task.abort();
                    return Err(Error::Cancelled);
                }
                line = lines.next_line() => match line {
                    Ok(Some(line)) => match parse_stdout_line(&line) {
                        Some(StdoutEvent::Progress(progress)) => {
                            let (downloaded, total) = accumulator.update(progress);
                            sink.record(downloaded, (total > 0).then_some(total));
                        }
                        Some(StdoutEvent::PostProcessing) => sink.enter_post_processing(),
                        Some(StdoutEvent::FinalPath(path)) => reported_path = Some(path),
                        None => {}
                    },
                    Ok(None) => break,
                    Err(e) => {
                        tracing::debug!(error = %e, "yt-dlp stdout read failed");
                        break;
                    }
                }
            }
        }

        let waited = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            status = child.wait() => Some(status),
        };
        let Some(status) = waited else {
            let _ = child.kill().await;
            stderr_task.abort();
            return Err(Error::Cancelled);
        };
        let status =
            status.map_err(|e| Error::ExternalTool(format!("yt-dlp process failed: {}", e)))?;

        let stderr_tail = stderr_task.await.unwrap_or_default();

        if !status.success() {
            return Err(classify_fetch_failure(
                &stderr_tail,
                sink.is_post_processing(),
            ));
        }

        Ok(FetchOutcome { reported_path })
    }

    fn name(&self) -> &'static str {
        "yt-dlp"
    }
}
