//! Storage lifecycle for downloaded artifacts
//!
//! Files in the output directory are removed by [`ArtifactStore::reclaim_stale`]
//! once they are older than the retention window, unless a job still owns
//! their stem or a requester is still receiving them. Handing a file out
//! takes an [`ArtifactLease`]; while any lease exists the file is never
//! reclaimed.

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime};

use crate::error::{Error, Result};
use crate::filename::{disk_stem, stem_of};

#[derive(Debug, Default)]
struct InUse {
    holders: usize,
    delete_requested: bool,
}

/// Outcome of a reclamation pass
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReclaimReport {
    /// Files deleted (or already gone)
    pub removed: usize,
    /// Expired files skipped because a requester holds them
    pub in_use: usize,
    /// Expired files skipped because a running job owns their stem
    pub reserved: usize,
    /// Files that could not be deleted
    pub failed: usize,
}

/// Owner of the output directory
#[derive(Debug)]
pub struct ArtifactStore {
    dir: PathBuf,
    delete_after_handoff: bool,
    in_use: Mutex<HashMap<PathBuf, InUse>>,
    reserved: Mutex<HashSet<String>>,
}

impl ArtifactStore {
    /// Create a store for `dir`; the directory is not touched until used
    pub fn new(dir: impl Into<PathBuf>, delete_after_handoff: bool) -> Self {
        Self {
            dir: dir.into(),
            delete_after_handoff,
            in_use: Mutex::new(HashMap::new()),
            reserved: Mutex::new(HashSet::new()),
        }
    }

    /// Output directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the output directory if needed
    pub async fn ensure_dir(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!(
                    "Failed to create output directory '{}': {}",
                    self.dir.display(),
                    e
                ),
            ))
        })
    }

    // Poisoning only happens if a holder panicked; the maps stay consistent.
    fn lock_in_use(&self) -> MutexGuard<'_, HashMap<PathBuf, InUse>> {
        self.in_use.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_reserved(&self) -> MutexGuard<'_, HashSet<String>> {
        self.reserved.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn key(&self, path: &Path) -> PathBuf {
        match path.file_name() {
            Some(name) => self.dir.join(name),
            None => path.to_path_buf(),
        }
    }

    /// Reserve a stem no other job or existing file uses
    ///
    /// `base` goes through [`disk_stem`] first, so reserved stems never
    /// contain a dot and a file belongs to exactly one stem. Tries `base`,
    /// then `base (2)`, `base (3)`, and so on.
    pub async fn reserve_stem(self: &Arc<Self>, base: &str) -> Result<StemReservation> {
        let base = disk_stem(base);
        let existing: HashSet<String> = self
            .file_names()
            .await?
            .iter()
            .map(|name| stem_of(name).to_string())
            .collect();

        let mut reserved = self.lock_reserved();
        let mut n = 1usize;
        let stem = loop {
            let candidate = if n == 1 {
                base.clone()
            } else {
                format!("{} ({})", base, n)
            };
            if !reserved.contains(&candidate) && !existing.contains(&candidate) {
                break candidate;
            }
            n += 1;
        };
        reserved.insert(stem.clone());
        drop(reserved);

        Ok(StemReservation {
            store: Arc::clone(self),
            stem,
        })
    }

    async fn file_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }

    /// Whether a stem is currently reserved
    pub fn is_reserved(&self, stem: &str) -> bool {
        self.lock_reserved().contains(stem)
    }

    /// Protect a file from reclamation for the lifetime of the returned lease
    ///
    /// The lease is registered before the file is checked. A reclamation
    /// pass that removed the file first makes this return `ArtifactNotFound`;
    /// one that runs later sees the lease and skips the file.
    pub async fn mark_in_use(self: &Arc<Self>, path: &Path) -> Result<ArtifactLease> {
        let key = self.key(path);
        self.lock_in_use().entry(key.clone()).or_default().holders += 1;
        let lease = ArtifactLease {
            store: Arc::clone(self),
            path: key,
            delivered: AtomicBool::new(false),
        };

        match tokio::fs::metadata(&lease.path).await {
            Ok(meta) if meta.is_file() => Ok(lease),
            _ => Err(Error::ArtifactNotFound {
                detail: lease.path.display().to_string(),
            }),
        }
    }

    /// Whether any lease on `path` is alive
    pub fn is_in_use(&self, path: &Path) -> bool {
        self.lock_in_use().contains_key(&self.key(path))
    }

    fn release(&self, path: &Path, delivered: bool) {
        let mut in_use = self.lock_in_use();
        let Some(entry) = in_use.get_mut(path) else {
            return;
        };
        entry.delete_requested |= delivered && self.delete_after_handoff;
        entry.holders = entry.holders.saturating_sub(1);
        if entry.holders > 0 {
            return;
        }

        let delete = entry.delete_requested;
        in_use.remove(path);
        if delete {
            match std::fs::remove_file(path) {
                Ok(()) => tracing::debug!(path = %path.display(), "removed delivered artifact"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to remove delivered artifact"
                ),
            }
        }
    }

    /// Delete expired files
    ///
    /// A file is expired when its modification time is more than `window`
    /// before `now`. Files held by a lease or named after a reserved stem are
    /// skipped. The check and the delete for each file happen under the
    /// in-use lock, so a concurrent [`mark_in_use`](Self::mark_in_use)
    /// either wins and keeps the file or finds it gone. Never fails; problems
    /// are logged and counted.
    pub fn reclaim_stale(&self, now: SystemTime, window: Duration) -> ReclaimReport {
        let mut report = ReclaimReport::default();

        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return report,
            Err(e) => {
                tracing::warn!(dir = %self.dir.display(), error = %e, "cannot scan output directory");
                report.failed += 1;
                return report;
            }
        };

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(error = %e, "cannot read directory entry");
                    report.failed += 1;
                    continue;
                }
            };
            let Ok(meta) = entry.metadata() else {
                continue;
            };
            if !meta.is_file() {
                continue;
            }
            let modified = meta.modified().unwrap_or(now);
            let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
            if age <= window {
                continue;
            }

            let name = entry.file_name().to_string_lossy().into_owned();
            let owned_by_job = self.lock_reserved().contains(stem_of(&name));
            if owned_by_job {
                report.reserved += 1;
                continue;
            }

            let path = entry.path();
            let in_use = self.lock_in_use();
            if in_use.contains_key(&self.key(&path)) {
                report.in_use += 1;
                continue;
            }
            match std::fs::remove_file(&path) {
                Ok(()) => report.removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => report.removed += 1,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to reclaim file");
                    report.failed += 1;
                }
            }
            drop(in_use);
        }

        if report != ReclaimReport::default() {
            tracing::info!(
                removed = report.removed,
                in_use = report.in_use,
                reserved = report.reserved,
                failed = report.failed,
                "reclaimed stale artifacts"
            );
        }
        report
    }

    /// Remove every file belonging to `stem`, returning how many were deleted
    pub async fn remove_stem_files(&self, stem: &str) -> usize {
        let names = match self.file_names().await {
            Ok(names) => names,
            Err(e) => {
                tracing::warn!(stem, error = %e, "cannot scan for partial files");
                return 0;
            }
        };

        let mut removed = 0;
        for name in names.into_iter().filter(|n| stem_of(n) == stem) {
            let path = self.dir.join(&name);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to remove partial file")
                }
            }
        }
        removed
    }
}

/// Exclusive claim on a file stem, released on drop
#[derive(Debug)]
pub struct StemReservation {
    store: Arc<ArtifactStore>,
    stem: String,
}

impl StemReservation {
    /// The reserved stem
    pub fn stem(&self) -> &str {
        &self.stem
    }
}

impl Drop for StemReservation {
    fn drop(&mut self) {
        self.store.lock_reserved().remove(&self.stem);
    }
}

/// In-use marker on an artifact, released on drop
///
/// If [`mark_delivered`](Self::mark_delivered) was called and the store
/// deletes after handoff, the file is removed once the last lease goes.
#[derive(Debug)]
pub struct ArtifactLease {
    store: Arc<ArtifactStore>,
    path: PathBuf,
    delivered: AtomicBool,
}

impl ArtifactLease {
    /// File held by this lease
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record that the requester received the whole file
    pub fn mark_delivered(&self) {
        self.delivered.store(true, Ordering::Release);
    }
}

impl Drop for ArtifactLease {
    fn drop(&mut self) {
        self.store
            .release(&self.path, self.delivered.load(Ordering::Acquire));
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const HOUR: Duration = Duration::from_secs(3600);

    fn store(dir: &TempDir, delete_after_handoff: bool) -> Arc<ArtifactStore> {
        Arc::new(ArtifactStore::new(dir.path(), delete_after_handoff))
    }

    fn later() -> SystemTime {
        SystemTime::now() + 2 * HOUR
    }

    #[tokio::test]
    async fn reserve_stem_skips_existing_files_and_reservations() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("Clip.mp4"), b"x").unwrap();
        let store = store(&dir, true);

        let first = store.reserve_stem("Clip").await.unwrap();
        assert_eq!(first.stem(), "Clip (2)");
        let second = store.reserve_stem("Clip").await.unwrap();
        assert_eq!(second.stem(), "Clip (3)");

        drop(first);
        let third = store.reserve_stem("Clip").await.unwrap();
        assert_eq!(third.stem(), "Clip (2)");
        assert!(store.is_reserved("Clip (3)"));
    }

    #[tokio::test]
    async fn reserve_stem_does_not_collide_on_shared_prefix() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("Clip Extended.mp4"), b"x").unwrap();
        let store = store(&dir, true);
        assert_eq!(store.reserve_stem("Clip").await.unwrap().stem(), "Clip");
    }

    #[tokio::test]
    async fn dotted_titles_get_disjoint_stems() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, true);

        let short = store.reserve_stem("Mr").await.unwrap();
        let dotted = store.reserve_stem("Mr. Smith Goes").await.unwrap();
        assert_eq!(short.stem(), "Mr");
        assert_eq!(dotted.stem(), "Mr_ Smith Goes");

        let other_partial = dir.path().join(format!("{}.mp4.part", dotted.stem()));
        std::fs::write(&other_partial, b"x").unwrap();
        std::fs::write(dir.path().join("Mr.webm.part"), b"x").unwrap();

        assert_eq!(store.remove_stem_files(short.stem()).await, 1);
        assert!(other_partial.exists());
    }

    #[tokio::test]
    async fn reserve_stem_avoids_stem_of_foreign_dotted_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("Mr. Smith Goes.mp4"), b"x").unwrap();
        let store = store(&dir, true);

        assert_eq!(store.reserve_stem("Mr").await.unwrap().stem(), "Mr (2)");
    }

    #[tokio::test]
    async fn mark_in_use_missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, true);
        let gone = dir.path().join("gone.mp4");
        let err = store.mark_in_use(&gone).await.unwrap_err();
        assert!(matches!(err, Error::ArtifactNotFound { .. }));
        assert!(!store.is_in_use(&gone));
    }

    #[test]
    fn reclaim_removes_only_expired_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.mp4"), b"x").unwrap();
        std::fs::write(dir.path().join("b.mp3"), b"x").unwrap();
        let store = store(&dir, true);

        let fresh = store.reclaim_stale(SystemTime::now(), HOUR);
        assert_eq!(fresh, ReclaimReport::default());

        let report = store.reclaim_stale(later(), HOUR);
        assert_eq!(report.removed, 2);
        assert!(!dir.path().join("a.mp4").exists());
    }

    #[tokio::test]
    async fn reclaim_skips_files_in_use() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.mp4");
        std::fs::write(&path, b"x").unwrap();
        let store = store(&dir, false);

        let lease = store.mark_in_use(&path).await.unwrap();
        let report = store.reclaim_stale(later(), HOUR);
        assert_eq!(report.in_use, 1);
        assert_eq!(report.removed, 0);
        assert!(path.exists());

        drop(lease);
        assert!(path.exists(), "undelivered lease must not delete");
        assert_eq!(store.reclaim_stale(later(), HOUR).removed, 1);
    }

    #[tokio::test]
    async fn reclaim_skips_reserved_stems() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("Song.webm.part"), b"x").unwrap();
        let store = store(&dir, true);
        // reserve first, then create the job's partial file
        let reservation = store.reserve_stem("Track").await.unwrap();
        std::fs::write(dir.path().join("Track.webm.part"), b"x").unwrap();

        let report = store.reclaim_stale(later(), HOUR);
        assert_eq!(report.reserved, 1);
        assert_eq!(report.removed, 1);
        assert!(dir.path().join("Track.webm.part").exists());
        drop(reservation);
    }

    #[tokio::test]
    async fn delivered_lease_deletes_after_last_holder() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.mp4");
        std::fs::write(&path, b"x").unwrap();
        let store = store(&dir, true);

        let first = store.mark_in_use(&path).await.unwrap();
        let second = store.mark_in_use(&path).await.unwrap();
        first.mark_delivered();
        drop(first);
        assert!(path.exists());
        assert!(store.is_in_use(&path));

        drop(second);
        assert!(!path.exists());
        assert!(!store.is_in_use(&path));
    }

    #[tokio::test]
    async fn delivered_lease_keeps_file_when_handoff_deletion_disabled() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.mp4");
        std::fs::write(&path, b"x").unwrap();
        let store = store(&dir, false);

        let lease = store.mark_in_use(&path).await.unwrap();
        lease.mark_delivered();
        drop(lease);
        assert!(path.exists());
    }

    #[test]
    fn reclaim_of_missing_directory_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path().join("nope"), true);
        assert_eq!(store.reclaim_stale(later(), HOUR), ReclaimReport::default());
    }

    #[tokio::test]
    async fn remove_stem_files_clears_partials() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("Clip.mp4.part"), b"x").unwrap();
        std::fs::write(dir.path().join("Clip.f137.mp4"), b"x").unwrap();
        std::fs::write(dir.path().join("Clip (2).mp4"), b"x").unwrap();
        let store = store(&dir, true);

        assert_eq!(store.remove_stem_files("Clip").await, 2);
        assert!(dir.path().join("Clip (2).mp4").exists());
    }
}
