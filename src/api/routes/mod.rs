//! Route handlers for the REST API
//!
//! Handlers are organized by domain:
//! - [`downloads`] - Job submission, status, cancellation, progress and files
//! - [`info`] - Metadata lookups
//! - [`system`] - Health and the global event stream

use serde::{Deserialize, Serialize};

use crate::types::{JobId, JobState};

mod downloads;
mod info;
mod system;

pub use downloads::*;
pub use info::*;
pub use system::*;

/// Request body for POST /info
#[derive(Debug, Deserialize, Serialize)]
pub struct InfoRequest {
    /// Source URL
    #[serde(default)]
    pub url: String,
}

/// Response for POST /downloads
#[derive(Debug, Deserialize, Serialize)]
pub struct SubmitResponse {
    /// ID of the new job
    pub id: JobId,
    /// Always `pending` at submission
    pub state: JobState,
}

/// SSE event name for a job state
pub(crate) fn event_name(state: JobState) -> &'static str {
    match state {
        JobState::Pending => "pending",
        JobState::Running => "progress",
        JobState::Completed => "completed",
        JobState::Failed => "failed",
        JobState::Cancelled => "cancelled",
    }
}
