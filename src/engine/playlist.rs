// Playlist resolution types and flat-playlist output parsing
//
// Resolution is a metadata-only query: one JSON object per line from
// `yt-dlp --flat-playlist --dump-json`, capped at the configured item
// limit. A bare video reference resolves to a single entry. No content
// is fetched here.

use std::fmt;

/// One video within a resolved playlist
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistEntry {
    pub id: String,
    pub title: Option<String>,
    pub url: String,
}

impl PlaylistEntry {
    /// Entry for a bare video reference whose metadata is not yet known.
    pub fn from_url(url: &str) -> Self {
        Self {
            id: video_id_from_url(url).unwrap_or_else(|| url.to_string()),
            title: None,
            url: url.to_string(),
        }
    }
}

/// Pull the watch id out of a youtube.com/youtu.be reference, if present.
pub fn video_id_from_url(url: &str) -> Option<String> {
    if let Some(idx) = url.find("v=") {
        let rest = &url[idx + 2..];
        let id: String = rest
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
            .collect();
        if !id.is_empty() {
            return Some(id);
        }
    }
    if let Some(idx) = url.find("youtu.be/") {
        let rest = &url[idx + "youtu.be/".len()..];
        let id: String = rest
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
            .collect();
        if !id.is_empty() {
            return Some(id);
        }
    }
    None
}

/// Resolution failures are job-terminal (unlike per-item failures)
#[derive(Debug, Clone)]
pub enum ResolveError {
    /// Playlist or video does not exist
    NotFound,

    /// Reference the provider cannot handle at all
    Unsupported(String),

    /// Provider-side failure fetching playlist metadata
    Provider(String),
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "Playlist or video not found"),
            Self::Unsupported(url) => write!(f, "Unsupported reference: {}", url),
            Self::Provider(msg) => write!(f, "Error fetching playlist: {}", msg),
        }
    }
}

impl std::error::Error for ResolveError {}

/// Classify flat-playlist stderr into a resolution failure.
pub fn classify_resolve_failure(stderr: &str, url: &str) -> ResolveError {
    let lower = stderr.to_lowercase();
    if lower.contains("does not exist")
        || lower.contains("not found")
        || lower.contains("404")
        || lower.contains("playlist is unviewable")
    {
        return ResolveError::NotFound;
    }
    if lower.contains("unsupported url") || lower.contains("is not a valid url") {
        return ResolveError::Unsupported(url.to_string());
    }
    ResolveError::Provider(first_error_line(stderr))
}

fn first_error_line(stderr: &str) -> String {
    stderr
        .lines()
        .find(|l| l.contains("ERROR") || l.to_lowercase().contains("error"))
        .unwrap_or_else(|| stderr.lines().next().unwrap_or("unknown provider error"))
        .trim()
        .chars()
        .take(200)
        .collect()
}

/// Parse flat-playlist output: one JSON object per line, malformed
/// lines skipped, sequence truncated at `cap`.
pub fn parse_flat_playlist(stdout: &str, cap: usize) -> Vec<PlaylistEntry> {
    let mut entries = Vec::new();
    for line in stdout.lines() {
        if entries.len() >= cap {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let json: serde_json::Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(_) => continue,
        };
        let id = match json["id"].as_str() {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => continue,
        };
        let title = json["title"]
            .as_str()
            .filter(|t| !t.is_empty())
            .map(|t| t.to_string());
        let url = json["url"]
            .as_str()
            .filter(|u| u.starts_with("http"))
            .map(|u| u.to_string())
            .unwrap_or_else(|| format!("https://www.youtube.com/watch?v={}", id));
        entries.push(PlaylistEntry { id, title, url });
    }
    entries
}
