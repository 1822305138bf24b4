//! Parsers for yt-dlp output

use serde_json::Value;
use std::path::PathBuf;

use super::traits::MediaMetadata;
use crate::error::Error;

/// Prefix of progress lines produced by our `--progress-template`
pub const PROGRESS_MARKER: &str = "mdl-progress";
/// Prefix printed when post-processing starts
pub const POST_PROCESS_MARKER: &str = "mdl-postprocess";
/// Prefix printed with the final path after the file is moved into place
pub const FILEPATH_MARKER: &str = "mdl-filepath";

/// Longest detail text kept from stderr
const MAX_DETAIL_CHARS: usize = 2000;

/// One progress report from the fetcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressLine {
    /// Bytes of the current stream transferred
    pub downloaded: u64,
    /// Size of the current stream, exact or estimated
    pub total: Option<u64>,
}

/// A recognised stdout line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StdoutEvent {
    /// Transfer progress
    Progress(ProgressLine),
    /// Post-processing has begun
    PostProcessing,
    /// Final file location
    FinalPath(PathBuf),
}

/// Parse a single stdout line; unrelated lines yield None
pub fn parse_stdout_line(line: &str) -> Option<StdoutEvent> {
    let line = line.trim();
    if let Some(rest) = line.strip_prefix(PROGRESS_MARKER) {
        return parse_progress_fields(rest.trim()).map(StdoutEvent::Progress);
    }
    if line.starts_with(POST_PROCESS_MARKER) {
        return Some(StdoutEvent::PostProcessing);
    }
    if let Some(rest) = line.strip_prefix(FILEPATH_MARKER) {
        let path = rest.trim();
        if path.is_empty() || path == "NA" {
            return None;
        }
        return Some(StdoutEvent::FinalPath(PathBuf::from(path)));
    }
    None
}

// "<downloaded>/<total>/<estimate>", any field may be "NA"
fn parse_progress_fields(fields: &str) -> Option<ProgressLine> {
    let mut parts = fields.split('/');
    let downloaded = parse_bytes(parts.next()?)?;
    let total = parts.next().and_then(parse_bytes);
    let estimate = parts.next().and_then(parse_bytes);
    Some(ProgressLine {
        downloaded,
        total: total.or(estimate).filter(|t| *t > 0),
    })
}

fn parse_bytes(field: &str) -> Option<u64> {
    let value: f64 = field.trim().parse().ok()?;
    if value.is_finite() && value >= 0.0 {
        Some(value.round() as u64)
    } else {
        None
    }
}

/// Folds per-stream progress into job-wide totals
///
/// A format like `bestvideo+bestaudio` downloads two streams back to back,
/// each reporting from zero. When the downloaded count drops, the previous
/// stream is considered finished and its bytes are carried forward.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProgressAccumulator {
    completed_bytes: u64,
    completed_total: u64,
    current: u64,
    current_total: u64,
}

impl ProgressAccumulator {
    /// Apply a progress line and return (downloaded, total) across all streams
    pub fn update(&mut self, line: ProgressLine) -> (u64, u64) {
        if line.downloaded < self.current {
            self.completed_bytes += self.current;
            self.completed_total += self.current_total.max(self.current);
            self.current_total = 0;
        }
        self.current = line.downloaded;
        if let Some(total) = line.total {
            self.current_total = total;
        }

        let total = if self.current_total > 0 {
            self.completed_total + self.current_total
        } else {
            0
        };
        (self.completed_bytes + self.current, total)
    }
}

/// Metadata from `yt-dlp -J` output
pub fn parse_metadata(json: &Value) -> MediaMetadata {
    let title = json
        .get("title")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string);

    let duration_seconds = json
        .get("duration")
        .and_then(Value::as_f64)
        .filter(|d| d.is_finite() && *d > 0.0)
        .map(|d| d.round() as u64);

    let thumbnail = json
        .get("thumbnail")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| {
            json.get("thumbnails")
                .and_then(Value::as_array)
                .and_then(|thumbs| thumbs.last())
                .and_then(|t| t.get("url"))
                .and_then(Value::as_str)
                .map(str::to_string)
        });

    let format_heights = json
        .get("formats")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|f| f.get("height").and_then(Value::as_u64));
    let max_height = format_heights
        .chain(json.get("height").and_then(Value::as_u64))
        .max()
        .and_then(|h| u32::try_from(h).ok());

    MediaMetadata {
        title,
        duration_seconds,
        thumbnail,
        max_height,
    }
}

/// Keep the informative tail of stderr for diagnostics
///
/// Lines starting with `ERROR:` are preferred; otherwise the last lines are
/// kept. Never exceeds a fixed number of characters.
pub fn stderr_detail(stderr: &str) -> String {
    let errors: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|l| l.starts_with("ERROR:"))
        .collect();
    let text = if errors.is_empty() {
        let lines: Vec<&str> = stderr.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
        let start = lines.len().saturating_sub(5);
        lines[start..].join("\n")
    } else {
        errors.join("\n")
    };

    let char_count = text.chars().count();
    if char_count > MAX_DETAIL_CHARS {
        text.chars().skip(char_count - MAX_DETAIL_CHARS).collect()
    } else {
        text
    }
}

const UNAVAILABLE_PATTERNS: &[&str] = &[
    "unsupported url",
    "is not a valid url",
    "video unavailable",
    "private video",
    "this video is unavailable",
    "not available in your country",
    "geo restrict",
    "has been removed",
    "http error 404",
    "unable to extract",
    "no video formats found",
    "sign in to confirm",
    "members-only",
    "requested format is not available",
];

const POST_PROCESS_PATTERNS: &[&str] = &[
    "postprocessing",
    "post-processing",
    "ffmpeg",
    "ffprobe",
    "conversion failed",
];

/// Error for a failed metadata extraction
pub fn classify_metadata_failure(stderr: &str) -> Error {
    Error::SourceUnavailable {
        detail: stderr_detail(stderr),
    }
}

/// Error for a failed fetch
///
/// Post-processing complaints, or any failure after post-processing started,
/// become [`Error::PostProcessFailed`]; a source that vanished between
/// metadata extraction and download is [`Error::SourceUnavailable`];
/// everything else is [`Error::FetchFailed`].
pub fn classify_fetch_failure(stderr: &str, post_processing_started: bool) -> Error {
    let detail = stderr_detail(stderr);
    let lower = detail.to_lowercase();

    if post_processing_started || POST_PROCESS_PATTERNS.iter().any(|p| lower.contains(p)) {
        Error::PostProcessFailed { detail }
    } else if UNAVAILABLE_PATTERNS.iter().any(|p| lower.contains(p)) {
        Error::SourceUnavailable { detail }
    } else {
        Error::FetchFailed { detail }
    }
}
