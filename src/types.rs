//! Core types for media-dl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::ErrorInfo;

/// Unique identifier for a fetch job
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub u64);

/// Handle returned to callers by [`crate::MediaDownloader::submit`]
pub type JobHandle = JobId;

impl JobId {
    /// Create a new JobId
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the inner u64 value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl From<u64> for JobId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// What kind of media the requester wants back
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    /// Video with audio, merged into mp4
    #[default]
    Video,
    /// Audio only, transcoded to mp3
    #[serde(alias = "mp3")]
    AudioMp3,
    /// Audio only, transcoded to m4a
    #[serde(alias = "m4a")]
    AudioM4a,
}

impl MediaKind {
    /// Whether this kind is audio-only
    pub fn is_audio(&self) -> bool {
        matches!(self, MediaKind::AudioMp3 | MediaKind::AudioM4a)
    }
}

impl std::str::FromStr for MediaKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "video" | "mp4" => Ok(MediaKind::Video),
            "mp3" | "audio_mp3" | "audio" => Ok(MediaKind::AudioMp3),
            "m4a" | "audio_m4a" => Ok(MediaKind::AudioM4a),
            other => Err(crate::Error::InvalidRequest(format!(
                "unsupported media kind '{}'",
                other
            ))),
        }
    }
}

/// Requested quality, meaningful only relative to a [`MediaKind`]
///
/// Height tiers apply to video, bitrate tiers to audio. A tier that does not
/// fit the kind resolves to that kind's best available quality.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityTier {
    /// Best available for the media kind
    #[default]
    Highest,
    /// Video capped at 720 lines
    #[serde(rename = "720p")]
    Tier720,
    /// Video capped at 480 lines
    #[serde(rename = "480p")]
    Tier480,
    /// Video capped at 360 lines
    #[serde(rename = "360p")]
    Tier360,
    /// Audio at or below 128 kbps
    #[serde(rename = "128k")]
    Bitrate128,
    /// Audio at or below 96 kbps
    #[serde(rename = "96k")]
    Bitrate96,
    /// Audio at or below 64 kbps
    #[serde(rename = "64k")]
    Bitrate64,
}

impl QualityTier {
    /// Maximum video height for height tiers
    pub fn max_height(&self) -> Option<u32> {
        match self {
            QualityTier::Tier720 => Some(720),
            QualityTier::Tier480 => Some(480),
            QualityTier::Tier360 => Some(360),
            _ => None,
        }
    }

    /// Maximum audio bitrate (kbps) for bitrate tiers
    pub fn max_bitrate_kbps(&self) -> Option<u32> {
        match self {
            QualityTier::Bitrate128 => Some(128),
            QualityTier::Bitrate96 => Some(96),
            QualityTier::Bitrate64 => Some(64),
            _ => None,
        }
    }

    /// Short label used by front ends ("720p", "128k", "highest")
    pub fn label(&self) -> &'static str {
        match self {
            QualityTier::Highest => "highest",
            QualityTier::Tier720 => "720p",
            QualityTier::Tier480 => "480p",
            QualityTier::Tier360 => "360p",
            QualityTier::Bitrate128 => "128k",
            QualityTier::Bitrate96 => "96k",
            QualityTier::Bitrate64 => "64k",
        }
    }
}

impl std::str::FromStr for QualityTier {
    type Err = std::convert::Infallible;

    /// Unknown strings parse as [`QualityTier::Highest`]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tier = match s.trim().to_ascii_lowercase().as_str() {
            "720p" | "720" => QualityTier::Tier720,
            "480p" | "480" => QualityTier::Tier480,
            "360p" | "360" => QualityTier::Tier360,
            "128k" | "128" => QualityTier::Bitrate128,
            "96k" | "96" => QualityTier::Bitrate96,
            "64k" | "64" => QualityTier::Bitrate64,
            _ => QualityTier::Highest,
        };
        Ok(tier)
    }
}

/// A request to download one media URL
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRequest {
    /// Source URL (absolute http/https)
    pub url: String,
    /// Requested media kind
    #[serde(default)]
    pub media_kind: MediaKind,
    /// Requested quality tier
    #[serde(default)]
    pub quality_tier: QualityTier,
    /// Cancel the job once its last progress subscriber disconnects
    #[serde(default)]
    pub cancel_on_disconnect: bool,
}

impl DownloadRequest {
    /// Create a request with default quality and no disconnect cancellation
    pub fn new(url: impl Into<String>, media_kind: MediaKind) -> Self {
        Self {
            url: url.into(),
            media_kind,
            quality_tier: QualityTier::Highest,
            cancel_on_disconnect: false,
        }
    }

    /// Set the quality tier
    pub fn with_quality(mut self, quality_tier: QualityTier) -> Self {
        self.quality_tier = quality_tier;
        self
    }

    /// Cancel the job when the last subscriber goes away
    pub fn cancel_on_disconnect(mut self) -> Self {
        self.cancel_on_disconnect = true;
        self
    }
}

/// Audio codec targeted by the post-processing step
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioCodec {
    /// MPEG-1 Layer III
    Mp3,
    /// AAC in an MPEG-4 container
    M4a,
}

impl AudioCodec {
    /// File extension written by the transcoder
    pub fn extension(&self) -> &'static str {
        match self {
            AudioCodec::Mp3 => "mp3",
            AudioCodec::M4a => "m4a",
        }
    }
}

/// Post-processing requirement declared by a [`FetchSpec`]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostProcess {
    /// Codec to transcode into
    pub target_codec: AudioCodec,
    /// Target bitrate in kbps (None = best)
    pub target_quality: Option<u32>,
}

/// Concrete fetch configuration derived from a request
///
/// Immutable once created; [`FetchSpec::bound_to`] returns a new value with
/// the output template pointing at a job's reserved stem.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchSpec {
    /// Stream selection expression understood by the fetcher
    pub stream_selector: String,
    /// Transcoding step, if the requested format needs one
    pub post_process: Option<PostProcess>,
    /// Container used when separate video and audio streams are merged
    pub merge_container: Option<String>,
    /// Output path pattern; `%(ext)s` is filled in by the fetcher
    pub output_template: String,
}

impl FetchSpec {
    /// Return a copy whose output template writes `<dir>/<stem>.%(ext)s`
    pub fn bound_to(&self, dir: &std::path::Path, stem: &str) -> Self {
        let template = dir.join(format!("{}.%(ext)s", stem));
        Self {
            output_template: template.to_string_lossy().into_owned(),
            ..self.clone()
        }
    }

    /// Extension the finished artifact is expected to carry, if predictable
    pub fn expected_extension(&self) -> Option<&str> {
        match &self.post_process {
            Some(pp) => Some(pp.target_codec.extension()),
            None => self.merge_container.as_deref(),
        }
    }
}

/// Lifecycle state of a fetch job
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Waiting for an admission slot
    Pending,
    /// Admitted and executing
    Running,
    /// Finished with an artifact on disk
    Completed,
    /// Finished with an error
    Failed,
    /// Stopped on request
    Cancelled,
}

impl JobState {
    /// Terminal states admit no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Cancelled
        )
    }
}

/// Progress phase reported to subscribers
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Waiting or transferring bytes
    Downloading,
    /// Merging or transcoding
    PostProcessing,
    /// Artifact ready
    Done,
    /// Failed or cancelled
    Errored,
}

impl Phase {
    /// Done and Errored end a job's event stream
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Done | Phase::Errored)
    }
}

/// A finished download sitting in the output directory
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredArtifact {
    /// Location on disk
    pub path: PathBuf,
    /// When the job completed
    pub created_at: DateTime<Utc>,
    /// Suggested name for the requester (sanitized title plus extension)
    pub display_name: String,
    /// MIME type derived from the extension
    pub content_type: String,
    /// Size in bytes at completion time
    pub size_bytes: u64,
}

/// Read-only view of a fetch job, published whole on every update
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    /// Job ID
    pub id: JobId,
    /// Source URL
    pub url: String,
    /// Requested media kind
    pub media_kind: MediaKind,
    /// Requested quality tier
    pub quality_tier: QualityTier,
    /// Resolved fetch configuration
    pub spec: FetchSpec,
    /// Current state
    pub state: JobState,
    /// Current progress phase
    pub phase: Phase,
    /// Bytes transferred so far (non-decreasing)
    pub bytes_downloaded: u64,
    /// Expected total bytes (0 = unknown)
    pub bytes_total: u64,
    /// Sanitized media title, once metadata has been extracted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Finished artifact (Completed only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<StoredArtifact>,
    /// Terminal error (Failed and Cancelled)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    /// When the job was submitted
    pub submitted_at: DateTime<Utc>,
    /// When the job reached a terminal state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Publication sequence number, strictly increasing per job
    pub seq: u64,
}

impl JobSnapshot {
    /// Progress percentage, if the total is known
    pub fn percent(&self) -> Option<f32> {
        if self.bytes_total == 0 {
            return None;
        }
        Some((self.bytes_downloaded as f32 / self.bytes_total as f32 * 100.0).min(100.0))
    }

    /// Build the progress event that describes this snapshot
    pub fn to_event(&self) -> ProgressEvent {
        ProgressEvent {
            job_id: self.id,
            seq: self.seq,
            state: self.state,
            phase: self.phase,
            bytes_downloaded: self.bytes_downloaded,
            bytes_total: self.bytes_total,
            error: self.error.clone(),
        }
    }
}

/// Progress update delivered to subscribers
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Job the event belongs to
    pub job_id: JobId,
    /// Sequence number of the snapshot this event describes
    pub seq: u64,
    /// Job state at publication
    pub state: JobState,
    /// Progress phase
    pub phase: Phase,
    /// Bytes transferred so far
    pub bytes_downloaded: u64,
    /// Expected total bytes (0 = unknown)
    pub bytes_total: u64,
    /// Terminal error, on Errored events
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

/// A download option offered to front ends
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatOption {
    /// Media kind
    pub media_kind: MediaKind,
    /// Quality tier
    pub quality_tier: QualityTier,
    /// Human-readable label, e.g. "MP4 720p"
    pub label: String,
}

/// Metadata summary returned by [`crate::MediaDownloader::get_info`]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaInfo {
    /// Media title (or "Unknown Title")
    pub title: String,
    /// Formatted duration, e.g. "0:03:25" or "Unknown duration"
    pub duration: String,
    /// Duration in whole seconds, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<u64>,
    /// Thumbnail URL (empty if none)
    pub thumbnail: String,
    /// Download options that make sense for this source
    pub available_formats: Vec<FormatOption>,
}

/// Format a duration the way Python's `timedelta` prints it
///
/// Missing or zero durations yield "Unknown duration".
pub fn format_duration(seconds: Option<u64>) -> String {
    let Some(total) = seconds.filter(|s| *s > 0) else {
        return "Unknown duration".to_string();
    };
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let secs = total % 60;
    let clock = format!("{}:{:02}:{:02}", hours, minutes, secs);
    match days {
        0 => clock,
        1 => format!("1 day, {}", clock),
        n => format!("{} days, {}", n, clock),
    }
}
