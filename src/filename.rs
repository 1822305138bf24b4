//! Display-name sanitization and artifact resolution
//!
//! The fetcher decides the final extension itself (merging, transcoding), so
//! the path it reports is a hint. [`resolve_artifact`] turns that hint plus
//! the job's bound [`FetchSpec`] into the file that actually exists.

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::SystemTime;

use crate::error::{Error, Result};
use crate::types::FetchSpec;

/// Maximum length of a display name, in characters
pub const MAX_DISPLAY_NAME_CHARS: usize = 100;

/// Name used when a title sanitizes to nothing
pub const FALLBACK_NAME: &str = "download";

#[allow(clippy::expect_used)]
static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

// yt-dlp format fragments: "<stem>.f137.mp4"
#[allow(clippy::expect_used)]
static FRAGMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.f\d+\.[A-Za-z0-9]+$").expect("valid regex"));

const FORBIDDEN: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Turn a media title into a name safe to show and to offer as a download name
pub fn sanitize_display_name(title: &str) -> String {
    let stripped: String = title
        .chars()
        .filter_map(|c| match c {
            c if c.is_whitespace() => Some(' '),
            c if FORBIDDEN.contains(&c) || c.is_control() => None,
            c => Some(c),
        })
        .collect();
    let collapsed = WS_RE.replace_all(&stripped, " ");
    let truncated: String = collapsed.chars().take(MAX_DISPLAY_NAME_CHARS).collect();
    let trimmed = truncated.trim();

    if trimmed.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Filesystem-safe stem for a display name
///
/// `%` is replaced because the fetcher treats it as a template sigil. Dots
/// are replaced too: a file belongs to the stem before the first dot of its
/// name (see [`stem_of`]), so a stem must never contain one.
pub fn disk_stem(display: &str) -> String {
    let safe = sanitize_filename::sanitize(display);
    let safe = safe.trim().trim_matches('.').trim();
    if safe.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        safe.replace(['%', '.'], "_")
    }
}

/// Stem a file name belongs to: everything before its first `.`
///
/// `Clip.mp4`, `Clip.mp4.part` and `Clip.f137.mp4` all belong to `Clip`.
pub fn stem_of(name: &str) -> &str {
    name.split_once('.').map_or(name, |(stem, _)| stem)
}

/// Split a bound output template `<dir>/<stem>.%(ext)s` into dir and stem
pub fn template_parts(spec: &FetchSpec) -> Option<(PathBuf, String)> {
    let without_ext = spec.output_template.strip_suffix(".%(ext)s")?;
    let path = Path::new(without_ext);
    let stem = path.file_name()?.to_str()?.to_string();
    let dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    Some((dir, stem))
}

/// Whether a file name belongs to an unfinished or intermediate download
pub fn is_partial_name(name: &str) -> bool {
    name.starts_with('.')
        || name.ends_with(".part")
        || name.ends_with(".ytdl")
        || name.ends_with(".temp")
        || name.contains(".part-Frag")
        || name.contains(".temp.")
        || FRAGMENT_RE.is_match(name)
}

/// Locate the finished artifact for a job
///
/// Tries, in order: the path the fetcher reported; the same stem with the
/// extension the spec predicts; a scan of the output directory for the
/// newest complete file named `<stem>.*`.
pub async fn resolve_artifact(spec: &FetchSpec, reported: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = reported {
        if is_file(path).await {
            return Ok(path.to_path_buf());
        }
    }

    let parts = template_parts(spec);
    let mut stems: Vec<(PathBuf, String)> = Vec::new();
    if let Some((dir, stem)) = &parts {
        stems.push((dir.clone(), stem.clone()));
    }
    if let Some(path) = reported {
        let name = path.file_name().and_then(|s| s.to_str());
        if let (Some(dir), Some(stem)) = (path.parent(), name.map(stem_of)) {
            let candidate = (dir.to_path_buf(), stem.to_string());
            if !stems.contains(&candidate) {
                stems.push(candidate);
            }
        }
    }

    if let Some(ext) = spec.expected_extension() {
        for (dir, stem) in &stems {
            let candidate = dir.join(format!("{}.{}", stem, ext));
            if is_file(&candidate).await {
                return Ok(candidate);
            }
        }
    }

    for (dir, stem) in &stems {
        if let Some(found) = newest_for_stem(dir, stem).await? {
            return Ok(found);
        }
    }

    Err(Error::ArtifactNotFound {
        detail: match reported {
            Some(path) => path.display().to_string(),
            None => spec.output_template.clone(),
        },
    })
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

async fn newest_for_stem(dir: &Path, stem: &str) -> Result<Option<PathBuf>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let mut best: Option<(PathBuf, SystemTime)> = None;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if stem_of(name) != stem || is_partial_name(name) {
            continue;
        }
        let Ok(meta) = entry.metadata().await else {
            continue;
        };
        if !meta.is_file() {
            continue;
        }
        let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        match &best {
            Some((_, best_time)) if modified <= *best_time => {}
            _ => best = Some((entry.path(), modified)),
        }
    }

    Ok(best.map(|(path, _)| path))
}

/// MIME type for an artifact, by extension
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("mp4") | Some("m4v") => "video/mp4",
        Some("webm") => "video/webm",
        Some("mkv") => "video/x-matroska",
        Some("mp3") => "audio/mpeg",
        Some("m4a") => "audio/mp4",
        Some("opus") | Some("ogg") => "audio/ogg",
        Some("wav") => "audio/wav",
        _ => "application/octet-stream",
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::resolve;
    use crate::types::{MediaKind, QualityTier};
    use std::time::Duration;
    use tempfile::TempDir;

    fn bound_spec(kind: MediaKind, dir: &Path, stem: &str) -> FetchSpec {
        resolve(kind, QualityTier::Highest).bound_to(dir, stem)
    }

    #[test]
    fn display_name_strips_forbidden_characters() {
        assert_eq!(
            sanitize_display_name("Live: \"Best\" <HD> | Part 1/2?*"),
            "Live Best HD Part 12"
        );
    }

    #[test]
    fn display_name_collapses_whitespace_and_control_chars() {
        assert_eq!(sanitize_display_name("a\t\tb\n\u{7}c   d"), "a b c d");
    }

    #[test]
    fn display_name_truncates_to_limit() {
        let long = "x".repeat(250);
        assert_eq!(sanitize_display_name(&long).chars().count(), 100);

        let multibyte = "é".repeat(150);
        assert_eq!(sanitize_display_name(&multibyte).chars().count(), 100);
    }

    #[test]
    fn display_name_empty_falls_back() {
        assert_eq!(sanitize_display_name("???"), "download");
        assert_eq!(sanitize_display_name("   "), "download");
    }

    #[test]
    fn disk_stem_escapes_template_sigil() {
        assert_eq!(disk_stem("100% Pure"), "100_ Pure");
        assert_eq!(disk_stem(".."), "download");
    }

    #[test]
    fn disk_stem_never_contains_a_dot() {
        assert_eq!(disk_stem("Mr. Smith Goes"), "Mr_ Smith Goes");
        assert_eq!(disk_stem("v1.2.3 release."), "v1_2_3 release");
        assert_eq!(disk_stem("...hidden"), "hidden");
    }

    #[test]
    fn stem_of_stops_at_first_dot() {
        assert_eq!(stem_of("Clip.mp4"), "Clip");
        assert_eq!(stem_of("Clip (2).f137.mp4"), "Clip (2)");
        assert_eq!(stem_of("Mr. Smith Goes.mp4"), "Mr");
        assert_eq!(stem_of("noext"), "noext");
    }

    #[test]
    fn template_parts_splits_bound_template() {
        let spec = bound_spec(MediaKind::Video, Path::new("/data/out"), "Clip (2)");
        let (dir, stem) = template_parts(&spec).unwrap();
        assert_eq!(dir, PathBuf::from("/data/out"));
        assert_eq!(stem, "Clip (2)");
    }

    #[test]
    fn partial_names_are_recognised() {
        assert!(is_partial_name("clip.mp4.part"));
        assert!(is_partial_name("clip.f137.mp4"));
        assert!(is_partial_name("clip.temp.mp4"));
        assert!(is_partial_name("clip.mp4.ytdl"));
        assert!(is_partial_name("clip.mp4.part-Frag3"));
        assert!(!is_partial_name("clip.mp4"));
        assert!(!is_partial_name("clip.fine.mp3"));
    }

    #[tokio::test]
    async fn resolves_exact_reported_path() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("Song.mp3");
        std::fs::write(&file, b"id3").unwrap();

        let spec = bound_spec(MediaKind::AudioMp3, dir.path(), "Song");
        let found = resolve_artifact(&spec, Some(&file)).await.unwrap();
        assert_eq!(found, file);
    }

    #[tokio::test]
    async fn resolves_transcoded_extension_when_report_names_source_container() {
        let dir = TempDir::new().unwrap();
        let final_file = dir.path().join("Song.mp3");
        std::fs::write(&final_file, b"id3").unwrap();

        let spec = bound_spec(MediaKind::AudioMp3, dir.path(), "Song");
        let reported = dir.path().join("Song.mp4");
        let found = resolve_artifact(&spec, Some(&reported)).await.unwrap();
        assert_eq!(found, final_file);
    }

    #[tokio::test]
    async fn scan_skips_partials_and_prefers_newest() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("Clip.webm.part"), b"partial").unwrap();
        std::fs::write(dir.path().join("Clip.f251.webm"), b"frag").unwrap();
        std::fs::write(dir.path().join("Clip.mkv"), b"old").unwrap();
        std::thread::sleep(Duration::from_millis(20));
        std::fs::write(dir.path().join("Clip.webm"), b"new").unwrap();
        std::fs::write(dir.path().join("Other.webm"), b"unrelated").unwrap();

        let spec = bound_spec(MediaKind::Video, dir.path(), "Clip");
        let found = resolve_artifact(&spec, None).await.unwrap();
        assert_eq!(found, dir.path().join("Clip.webm"));
    }

    #[tokio::test]
    async fn scan_ignores_files_of_other_stems_sharing_a_prefix() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("Mr_ Smith Goes.mp4"), b"other job").unwrap();
        std::fs::write(dir.path().join("Mr (2).mp4"), b"other job").unwrap();
        std::fs::write(dir.path().join("Mrs.webm"), b"other job").unwrap();

        let spec = bound_spec(MediaKind::Video, dir.path(), "Mr");
        let err = resolve_artifact(&spec, None).await.unwrap_err();
        assert!(matches!(err, Error::ArtifactNotFound { .. }));

        std::fs::write(dir.path().join("Mr.webm"), b"own").unwrap();
        let found = resolve_artifact(&spec, None).await.unwrap();
        assert_eq!(found, dir.path().join("Mr.webm"));
    }

    #[tokio::test]
    async fn all_strategies_missing_is_artifact_not_found() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("Clip.mp4.part"), b"partial").unwrap();

        let spec = bound_spec(MediaKind::Video, dir.path(), "Clip");
        let err = resolve_artifact(&spec, Some(&dir.path().join("Clip.mp4")))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ArtifactNotFound { .. }));
    }

    #[test]
    fn content_types_by_extension() {
        assert_eq!(content_type_for(Path::new("a.MP4")), "video/mp4");
        assert_eq!(content_type_for(Path::new("a.mp3")), "audio/mpeg");
        assert_eq!(content_type_for(Path::new("a.m4a")), "audio/mp4");
        assert_eq!(content_type_for(Path::new("a")), "application/octet-stream");
    }
}
