//! External media fetchers
//!
//! The orchestrator talks to the outside world through the [`MediaFetcher`]
//! trait. Two implementations are provided:
//!
//! - [`YtDlpFetcher`]: runs the external `yt-dlp` binary
//! - [`UnavailableFetcher`]: stand-in when yt-dlp cannot be found
//!
//! Tests plug in their own scripted implementations.

mod parser;
mod traits;
mod unavailable;
mod ytdlp;

pub use parser::{ProgressAccumulator, ProgressLine, classify_fetch_failure};
pub use traits::{
    FetchOutcome, FetchRequest, MediaFetcher, MediaMetadata, ProgressReading, ProgressSink,
};
pub use unavailable::UnavailableFetcher;
pub use ytdlp::YtDlpFetcher;
