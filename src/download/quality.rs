// Quality selection - declarative cap resolved against real formats
//
// The requested quality is a preference, not a format id. When the
// provider's format list is known we pick the highest resolution at or
// below the cap; when the cap has nothing underneath it (or the probe
// failed) we fall back to a generic best-effort format expression.

use serde::{Deserialize, Serialize};

use crate::engine::MediaFormat;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    #[default]
    Best,
    #[serde(rename = "1080p")]
    P1080,
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "480p")]
    P480,
    #[serde(rename = "360p")]
    P360,
    Worst,
}

impl Quality {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "1080p" => Self::P1080,
            "720p" => Self::P720,
            "480p" => Self::P480,
            "360p" => Self::P360,
            "worst" => Self::Worst,
            _ => Self::Best,
        }
    }

    /// Resolution ceiling, None for best/worst
    pub fn cap(&self) -> Option<u32> {
        match self {
            Self::P1080 => Some(1080),
            Self::P720 => Some(720),
            Self::P480 => Some(480),
            Self::P360 => Some(360),
            Self::Best | Self::Worst => None,
        }
    }
}

/// Generic format expression when no probe data is available.
pub fn fallback_spec(quality: Quality) -> String {
    match quality {
        Quality::Best => "bv*+ba/best".to_string(),
        Quality::Worst => "worst".to_string(),
        _ => match quality.cap() {
            Some(cap) => format!("bv*[height<={cap}]+ba/b[height<={cap}]/bv*+ba/best"),
            None => "bv*+ba/best".to_string(),
        },
    }
}

/// Highest available height at or below the cap.
pub fn resolve_height(cap: u32, available: &[u32]) -> Option<u32> {
    available.iter().copied().filter(|h| *h <= cap).max()
}

/// Resolve the requested quality against probed formats into a format
/// expression. Deterministic: a 720p request with only 480p and 1080p
/// on offer selects 480p, never 1080p.
pub fn spec_for(quality: Quality, formats: &[MediaFormat]) -> String {
    let cap = match quality.cap() {
        Some(cap) => cap,
        None => return fallback_spec(quality),
    };

    let heights: Vec<u32> = formats
        .iter()
        .filter(|f| f.has_video())
        .filter_map(|f| f.height)
        .collect();

    match resolve_height(cap, &heights) {
        Some(h) => format!("bv*[height<={h}]+ba/b[height<={h}]/bv*+ba/best"),
        None => fallback_spec(Quality::Best),
    }
}
