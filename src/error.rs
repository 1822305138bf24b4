//! Error types for media-dl
//!
//! Every failure carries a stable machine-readable [`ErrorKind`] and a short
//! human message. Raw text from the external fetcher is kept apart as
//! `detail` so it never becomes the primary signal shown to users.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::types::{JobId, JobState};

/// Result type alias for media-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for media-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or malformed URL, or an unsupported kind/tier string
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Metadata extraction failed (bad URL, removed media, geo/auth block)
    #[error("media source is unavailable")]
    SourceUnavailable {
        /// Raw fetcher output
        detail: String,
    },

    /// Network or external-tool failure during download
    #[error("download failed")]
    FetchFailed {
        /// Raw fetcher output
        detail: String,
    },

    /// Transcoding or merge step failed
    #[error("post-processing failed")]
    PostProcessFailed {
        /// Raw fetcher output
        detail: String,
    },

    /// Fetcher reported success but no file could be resolved on disk
    #[error("downloaded file not found")]
    ArtifactNotFound {
        /// Where the fetcher said it wrote the file
        detail: String,
    },

    /// Job was cancelled
    #[error("download was cancelled")]
    Cancelled,

    /// Caller-side wait exceeded; the job keeps running
    #[error("timed out after {waited:?} waiting for job")]
    Timeout {
        /// How long the caller waited
        waited: Duration,
    },

    /// Queue is full
    #[error("too many queued downloads (limit {limit})")]
    CapacityExceeded {
        /// Configured queue bound
        limit: usize,
    },

    /// Job exists but has not completed
    #[error("job {id} is not ready (state {state:?})")]
    NotReady {
        /// Job ID
        id: JobId,
        /// Current state
        state: JobState,
    },

    /// Unknown job
    #[error("job not found: {0}")]
    NotFound(String),

    /// Shutdown in progress - not accepting new downloads
    #[error("shutdown in progress: not accepting new downloads")]
    ShuttingDown,

    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "output_dir")
        key: Option<String>,
    },

    /// External tool missing or could not be executed
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),
}

/// Stable classification of every failure
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// See [`Error::InvalidRequest`]
    InvalidRequest,
    /// See [`Error::SourceUnavailable`]
    SourceUnavailable,
    /// See [`Error::FetchFailed`]
    FetchFailed,
    /// See [`Error::PostProcessFailed`]
    PostProcessFailed,
    /// See [`Error::ArtifactNotFound`]
    ArtifactNotFound,
    /// See [`Error::Cancelled`]
    Cancelled,
    /// See [`Error::Timeout`]
    Timeout,
    /// See [`Error::CapacityExceeded`]
    CapacityExceeded,
    /// See [`Error::NotReady`]
    NotReady,
    /// See [`Error::NotFound`]
    NotFound,
    /// See [`Error::ShuttingDown`]
    ShuttingDown,
    /// See [`Error::ExternalTool`]
    ExternalTool,
    /// Configuration, I/O and server errors
    Internal,
}

impl ErrorKind {
    /// Machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::SourceUnavailable => "source_unavailable",
            ErrorKind::FetchFailed => "fetch_failed",
            ErrorKind::PostProcessFailed => "post_process_failed",
            ErrorKind::ArtifactNotFound => "artifact_not_found",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Timeout => "timeout",
            ErrorKind::CapacityExceeded => "capacity_exceeded",
            ErrorKind::NotReady => "not_ready",
            ErrorKind::NotFound => "not_found",
            ErrorKind::ShuttingDown => "shutting_down",
            ErrorKind::ExternalTool => "external_tool",
            ErrorKind::Internal => "internal",
        }
    }

    /// Stable human message for the kind
    pub fn message(&self) -> &'static str {
        match self {
            ErrorKind::InvalidRequest => "The request was invalid",
            ErrorKind::SourceUnavailable => "Invalid URL or media not found",
            ErrorKind::FetchFailed => "The download failed",
            ErrorKind::PostProcessFailed => "Converting the download failed",
            ErrorKind::ArtifactNotFound => "Downloaded file not found",
            ErrorKind::Cancelled => "The download was cancelled",
            ErrorKind::Timeout => "Timed out waiting for the download",
            ErrorKind::CapacityExceeded => "Too many downloads are queued",
            ErrorKind::NotReady => "The download is not finished yet",
            ErrorKind::NotFound => "No such download",
            ErrorKind::ShuttingDown => "The service is shutting down",
            ErrorKind::ExternalTool => "The media tool is unavailable",
            ErrorKind::Internal => "Internal error",
        }
    }
}

/// Serializable terminal error of a job
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Classification
    pub kind: ErrorKind,
    /// Stable human message
    pub message: String,
    /// Raw diagnostic text (fetcher stderr, paths)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ErrorInfo {
    /// Build an ErrorInfo from a kind, using its stable message
    pub fn new(kind: ErrorKind, detail: Option<String>) -> Self {
        Self {
            kind,
            message: kind.message().to_string(),
            detail,
        }
    }
}

impl Error {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Error::SourceUnavailable { .. } => ErrorKind::SourceUnavailable,
            Error::FetchFailed { .. } => ErrorKind::FetchFailed,
            Error::PostProcessFailed { .. } => ErrorKind::PostProcessFailed,
            Error::ArtifactNotFound { .. } => ErrorKind::ArtifactNotFound,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Timeout { .. } => ErrorKind::Timeout,
            Error::CapacityExceeded { .. } => ErrorKind::CapacityExceeded,
            Error::NotReady { .. } => ErrorKind::NotReady,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::ShuttingDown => ErrorKind::ShuttingDown,
            Error::ExternalTool(_) => ErrorKind::ExternalTool,
            Error::Config { .. } | Error::Io(_) | Error::ApiServerError(_) => ErrorKind::Internal,
        }
    }

    /// Diagnostic detail, if any
    pub fn detail(&self) -> Option<String> {
        match self {
            Error::SourceUnavailable { detail }
            | Error::FetchFailed { detail }
            | Error::PostProcessFailed { detail }
            | Error::ArtifactNotFound { detail } => Some(detail.clone()),
            Error::InvalidRequest(msg)
            | Error::NotFound(msg)
            | Error::ExternalTool(msg)
            | Error::ApiServerError(msg) => Some(msg.clone()),
            Error::Config { message, .. } => Some(message.clone()),
            Error::Io(e) => Some(e.to_string()),
            Error::Cancelled
            | Error::Timeout { .. }
            | Error::CapacityExceeded { .. }
            | Error::NotReady { .. }
            | Error::ShuttingDown => None,
        }
    }

    /// Capture this error as a job's terminal [`ErrorInfo`]
    pub fn to_info(&self) -> ErrorInfo {
        ErrorInfo::new(self.kind(), self.detail())
    }
}

impl From<ErrorInfo> for Error {
    fn from(info: ErrorInfo) -> Self {
        let detail = info.detail.unwrap_or_default();
        match info.kind {
            ErrorKind::InvalidRequest => Error::InvalidRequest(detail),
            ErrorKind::SourceUnavailable => Error::SourceUnavailable { detail },
            ErrorKind::FetchFailed => Error::FetchFailed { detail },
            ErrorKind::PostProcessFailed => Error::PostProcessFailed { detail },
            ErrorKind::ArtifactNotFound => Error::ArtifactNotFound { detail },
            ErrorKind::Cancelled => Error::Cancelled,
            ErrorKind::ExternalTool => Error::ExternalTool(detail),
            ErrorKind::NotFound => Error::NotFound(detail),
            ErrorKind::ShuttingDown => Error::ShuttingDown,
            // Caller-side kinds never end up in a job's terminal state
            ErrorKind::Timeout
            | ErrorKind::CapacityExceeded
            | ErrorKind::NotReady
            | ErrorKind::Internal => Error::FetchFailed { detail },
        }
    }
}

/// API error response format
///
/// ```json
/// {
///   "error": {
///     "code": "source_unavailable",
///     "message": "Invalid URL or media not found",
///     "details": { "detail": "ERROR: [youtube] abc: Video unavailable" }
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "not_found", "fetch_failed")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Create a "validation error" error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new("invalid_request", message)
    }
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            // 400 Bad Request
            Error::InvalidRequest(_) => 400,
            Error::Config { .. } => 400,

            // 404 Not Found
            Error::NotFound(_) => 404,
            Error::ArtifactNotFound { .. } => 404,

            // 409 Conflict
            Error::NotReady { .. } => 409,
            Error::Cancelled => 409,

            // 422 Unprocessable Entity - the source itself is the problem
            Error::SourceUnavailable { .. } => 422,

            // 429 Too Many Requests
            Error::CapacityExceeded { .. } => 429,

            // 502 Bad Gateway - the external tool failed
            Error::FetchFailed { .. } => 502,
            Error::PostProcessFailed { .. } => 502,

            // 503 Service Unavailable
            Error::ShuttingDown => 503,
            Error::ExternalTool(_) => 503,

            // 504 Gateway Timeout
            Error::Timeout { .. } => 504,

            // 500 Internal Server Error
            Error::Io(_) => 500,
            Error::ApiServerError(_) => 500,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Io(_) => "io_error",
            Error::ApiServerError(_) => "api_server_error",
            other => other.kind().code(),
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let code = error.error_code().to_string();
        let message = error.to_string();

        let details = match &error {
            Error::NotReady { id, state } => Some(serde_json::json!({
                "job_id": id,
                "state": state,
            })),
            Error::CapacityExceeded { limit } => Some(serde_json::json!({
                "limit": limit,
            })),
            Error::Timeout { waited } => Some(serde_json::json!({
                "waited_ms": waited.as_millis() as u64,
            })),
            Error::SourceUnavailable { detail }
            | Error::FetchFailed { detail }
            | Error::PostProcessFailed { detail }
            | Error::ArtifactNotFound { detail } => Some(serde_json::json!({
                "detail": detail,
            })),
            _ => None,
        };

        ApiError {
            error: ErrorDetail {
                code,
                message,
                details,
            },
        }
    }
}
