// Extraction engine boundary - the provider-facing capability
//
// Everything that talks to the external provider goes through the
// `ExtractionEngine` trait: playlist resolution, metadata probes,
// caption fetches and media downloads. The job coordinator only sees
// this seam, so the pipeline is testable with a scripted engine.

pub mod diagnostics;
pub mod errors;
pub mod playlist;
pub mod process;
pub mod ytdlp;

pub use diagnostics::{classify_skip, SkipReason};
pub use errors::EngineError;
pub use playlist::{PlaylistEntry, ResolveError};
pub use ytdlp::YtdlpEngine;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// What a job produces per item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Transcript,
    Video,
    Audio,
    Subtitle,
}

impl Mode {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "transcript" => Self::Transcript,
            "audio" => Self::Audio,
            "subtitle" => Self::Subtitle,
            _ => Self::Video,
        }
    }
}

/// Credential material forwarded to the provider, never inspected here
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CookieSource {
    #[default]
    None,
    /// Uploaded cookie file, passed through opaquely
    File(PathBuf),
    /// Cookies pulled from an installed browser profile
    Browser(String),
}

/// Metadata for one video, no content fetched
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoProbe {
    pub id: String,
    pub title: String,
    pub duration_seconds: u64,
    pub is_live: bool,
    pub availability: Option<String>,
    pub formats: Vec<MediaFormat>,
}

/// One format row from the provider's format list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaFormat {
    pub format_id: String,
    pub ext: String,
    pub height: Option<u32>,
    pub vcodec: Option<String>,
    pub acodec: Option<String>,
    pub filesize: Option<u64>,
}

impl MediaFormat {
    pub fn has_video(&self) -> bool {
        self.vcodec.as_deref().map_or(false, |v| v != "none" && !v.is_empty())
    }
}

/// A single download attempt, fully resolved (one strategy, one format spec)
#[derive(Debug, Clone)]
pub struct DownloadPlan {
    pub url: String,
    pub mode: Mode,
    /// yt-dlp format expression, already resolved against the quality cap
    pub format_spec: String,
    pub dest_dir: PathBuf,
    /// Short tag folded into the output template so repeated runs never collide
    pub output_tag: String,
    pub cookies: CookieSource,
    pub player_client: String,
}

/// File produced by a download attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadedFile {
    pub name: String,
    pub size: u64,
    pub path: String,
}

/// Provider-facing extraction capability.
#[async_trait]
pub trait ExtractionEngine: Send + Sync {
    /// Name of the engine (for logging)
    fn name(&self) -> &'static str;

    /// Resolve a playlist/video reference into an ordered, bounded
    /// sequence of entries. Metadata only.
    async fn resolve_playlist(
        &self,
        url: &str,
        cap: usize,
    ) -> Result<Vec<PlaylistEntry>, ResolveError>;

    /// Fetch metadata for one video.
    async fn probe(&self, url: &str, cookies: &CookieSource) -> Result<VideoProbe, EngineError>;

    /// Fetch the caption track for one video as raw VTT text.
    /// Intermediate files live under `workdir` and are cleaned up.
    async fn fetch_captions(
        &self,
        entry: &PlaylistEntry,
        workdir: &Path,
    ) -> Result<String, EngineError>;

    /// Execute one download attempt and return the files it produced.
    async fn download(&self, plan: &DownloadPlan) -> Result<Vec<DownloadedFile>, EngineError>;

    /// Raw provider format listing for one video.
    async fn list_formats(&self, url: &str, cookies: &CookieSource)
        -> Result<String, EngineError>;

    /// Browsers whose cookies the provider tool can read on this host.
    async fn available_browsers(&self) -> Vec<String>;
}
