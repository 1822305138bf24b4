//! Format/quality resolution
//!
//! Maps a requested [`MediaKind`] and [`QualityTier`] onto a concrete
//! [`FetchSpec`]. Resolution is total: tiers that do not apply to a kind fall
//! back to that kind's best available quality instead of failing.

use crate::types::{AudioCodec, FetchSpec, FormatOption, MediaKind, PostProcess, QualityTier};

/// Default output template, rebound to a job's reserved stem before fetching
pub const DEFAULT_OUTPUT_TEMPLATE: &str = "%(title)s.%(ext)s";

/// Container used when separate video and audio streams are merged
pub const MERGE_CONTAINER: &str = "mp4";

const VIDEO_TIERS: [QualityTier; 4] = [
    QualityTier::Highest,
    QualityTier::Tier720,
    QualityTier::Tier480,
    QualityTier::Tier360,
];

const AUDIO_TIERS: [QualityTier; 4] = [
    QualityTier::Highest,
    QualityTier::Bitrate128,
    QualityTier::Bitrate96,
    QualityTier::Bitrate64,
];

/// Resolve a request's kind and tier into a fetch spec
pub fn resolve(kind: MediaKind, tier: QualityTier) -> FetchSpec {
    match kind {
        MediaKind::Video => FetchSpec {
            stream_selector: video_selector(tier.max_height()),
            post_process: None,
            merge_container: Some(MERGE_CONTAINER.to_string()),
            output_template: DEFAULT_OUTPUT_TEMPLATE.to_string(),
        },
        MediaKind::AudioMp3 | MediaKind::AudioM4a => {
            let target_codec = if kind == MediaKind::AudioMp3 {
                AudioCodec::Mp3
            } else {
                AudioCodec::M4a
            };
            let bitrate = tier.max_bitrate_kbps();
            FetchSpec {
                stream_selector: audio_selector(bitrate),
                post_process: Some(PostProcess {
                    target_codec,
                    target_quality: bitrate,
                }),
                merge_container: None,
                output_template: DEFAULT_OUTPUT_TEMPLATE.to_string(),
            }
        }
    }
}

// Muxed mp4 first so an equally good single stream avoids the merge step.
fn video_selector(max_height: Option<u32>) -> String {
    let cap = max_height
        .map(|h| format!("[height<={}]", h))
        .unwrap_or_default();
    format!(
        "best{cap}[ext=mp4]/bestvideo{cap}[ext=mp4]+bestaudio[ext=m4a]/bestvideo{cap}+bestaudio/best",
        cap = cap
    )
}

fn audio_selector(max_bitrate: Option<u32>) -> String {
    match max_bitrate {
        Some(k) => format!("bestaudio[abr<={}]/bestaudio/best", k),
        None => "bestaudio/best".to_string(),
    }
}

/// Download options offered for a source
///
/// Height tiers above `max_height` are left out when the source's maximum
/// height is known. `Highest` is always offered.
pub fn available_formats(max_height: Option<u32>) -> Vec<FormatOption> {
    let mut options = Vec::new();

    for tier in VIDEO_TIERS {
        let fits = match (tier.max_height(), max_height) {
            (Some(cap), Some(source)) => cap <= source,
            _ => true,
        };
        if fits {
            options.push(FormatOption {
                media_kind: MediaKind::Video,
                quality_tier: tier,
                label: format!("MP4 {}", tier_label(tier)),
            });
        }
    }

    for (kind, name) in [(MediaKind::AudioMp3, "MP3"), (MediaKind::AudioM4a, "M4A")] {
        for tier in AUDIO_TIERS {
            options.push(FormatOption {
                media_kind: kind,
                quality_tier: tier,
                label: format!("{} {}", name, tier_label(tier)),
            });
        }
    }

    options
}

fn tier_label(tier: QualityTier) -> &'static str {
    match tier {
        QualityTier::Highest => "best",
        other => other.label(),
    }
}
