//! Metadata lookups that never download anything.

use crate::error::{Error, Result};
use crate::format;
use crate::types::{MediaInfo, format_duration};

use super::MediaDownloader;
use super::control::validate_url;

impl MediaDownloader {
    /// Look up a URL's title, duration, thumbnail and download options
    ///
    /// Runs the fetcher's metadata extraction only; no job is created.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidRequest`] for a missing or malformed URL
    /// - [`Error::SourceUnavailable`] when the source cannot be resolved
    /// - [`Error::ExternalTool`] when no fetcher binary is available
    pub async fn get_info(&self, url: &str) -> Result<MediaInfo> {
        let url = validate_url(url)?;
        let metadata = self
            .fetcher
            .extract_metadata(url.as_str())
            .await
            .map_err(|e| match e {
                Error::ExternalTool(_) | Error::SourceUnavailable { .. } => e,
                other => Error::SourceUnavailable {
                    detail: other.detail().unwrap_or_else(|| other.to_string()),
                },
            })?;

        tracing::debug!(url = %url, title = ?metadata.title, "metadata extracted");

        Ok(MediaInfo {
            title: metadata
                .title
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| "Unknown Title".to_string()),
            duration: format_duration(metadata.duration_seconds),
            duration_seconds: metadata.duration_seconds,
            thumbnail: metadata.thumbnail.unwrap_or_default(),
            available_formats: format::available_formats(metadata.max_height),
        })
    }
}
