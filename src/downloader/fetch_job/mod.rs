//! Fetch job execution -- lifecycle of a single admitted job.
//!
//! Split into focused submodules:
//! - [`context`] - Shared state and terminal-state helpers
//! - [`orchestration`] - Metadata, stem reservation, fetch, artifact resolution
//! - [`reporter`] - Coalescing progress publisher

mod context;
mod orchestration;
mod reporter;

pub(crate) use context::FetchJobContext;
pub(crate) use orchestration::run_fetch_job;
