//! Handing finished artifacts to requesters.

use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::storage::ArtifactLease;
use crate::types::{JobId, JobState};

use super::MediaDownloader;

/// An open artifact ready to be streamed to a requester
///
/// While the handoff (or its [`ArtifactLease`]) is alive, reclamation leaves
/// the file alone. Call [`ArtifactHandoff::mark_delivered`] once the whole
/// file has been sent; with `delete_after_handoff` enabled the file is then
/// removed when the last holder lets go.
#[derive(Debug)]
pub struct ArtifactHandoff {
    /// Open read handle, positioned at the start
    pub file: tokio::fs::File,
    /// Location on disk
    pub path: PathBuf,
    /// Name to offer the requester
    pub suggested_filename: String,
    /// MIME type
    pub content_type: String,
    /// Size in bytes
    pub size_bytes: u64,
    /// In-use marker for the file
    pub lease: ArtifactLease,
}

impl ArtifactHandoff {
    /// Record that the requester received the whole file
    pub fn mark_delivered(&self) {
        self.lease.mark_delivered();
    }

    /// Split into the file handle and the lease, e.g. to move them into a stream
    pub fn into_parts(self) -> (tokio::fs::File, ArtifactLease) {
        (self.file, self.lease)
    }
}

impl MediaDownloader {
    /// Open a completed job's artifact for delivery
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] for an unknown job
    /// - [`Error::NotReady`] unless the job is Completed
    /// - [`Error::ArtifactNotFound`] if the file is gone from disk
    pub async fn fetch_artifact(&self, id: JobId) -> Result<ArtifactHandoff> {
        let snapshot = self.job(id)?.snapshot();
        let artifact = match (snapshot.state, &snapshot.artifact) {
            (JobState::Completed, Some(artifact)) => artifact.clone(),
            (state, _) => return Err(Error::NotReady { id, state }),
        };

        let lease = self.storage.mark_in_use(&artifact.path).await?;
        let file = match tokio::fs::File::open(&artifact.path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::ArtifactNotFound {
                    detail: format!("{} no longer exists", artifact.path.display()),
                });
            }
            Err(e) => return Err(e.into()),
        };
        let size_bytes = file.metadata().await?.len();

        tracing::info!(
            job_id = id.0,
            path = %artifact.path.display(),
            size_bytes,
            "artifact handed off"
        );

        Ok(ArtifactHandoff {
            file,
            path: artifact.path,
            suggested_filename: artifact.display_name,
            content_type: artifact.content_type,
            size_bytes,
            lease,
        })
    }
}
