// Artifact store - durable output files addressable by filename
//
// Filenames combine a sanitized hint with a random suffix so
// concurrent jobs (or identical re-runs) never collide. Writes go to a
// `.part` temp file and are renamed into place, so a reader never
// observes a partially written artifact. Nothing is ever expired; the
// store grows for the process lifetime.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Transcript,
    Media,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub filename: String,
    pub size_bytes: u64,
    pub kind: ArtifactKind,
}

#[derive(Clone)]
pub struct ArtifactStore {
    root: PathBuf,
    kind: ArtifactKind,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>, kind: ArtifactKind) -> std::io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root, kind })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Store bytes under a collision-resistant name derived from the hint.
    pub async fn put(&self, name_hint: &str, bytes: &[u8]) -> std::io::Result<ArtifactRef> {
        let filename = unique_name(name_hint);
        let final_path = self.root.join(&filename);
        let temp_path = self.root.join(format!("{}.part", filename));

        tokio::fs::write(&temp_path, bytes).await?;
        tokio::fs::rename(&temp_path, &final_path).await?;

        Ok(ArtifactRef {
            filename,
            size_bytes: bytes.len() as u64,
            kind: self.kind,
        })
    }

    /// Adopt a file the engine already produced inside this store's root.
    pub async fn register(&self, path: &Path) -> std::io::Result<ArtifactRef> {
        let meta = tokio::fs::metadata(path).await?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no filename")
            })?;
        Ok(ArtifactRef {
            filename,
            size_bytes: meta.len(),
            kind: self.kind,
        })
    }

    /// Resolve a client-supplied filename to a path inside the store.
    /// Rejects traversal attempts and unknown names.
    pub fn resolve(&self, filename: &str) -> Option<PathBuf> {
        if filename.is_empty()
            || filename.contains("..")
            || filename.contains('/')
            || filename.contains('\\')
            || filename.ends_with(".part")
        {
            return None;
        }
        let path = self.root.join(filename);
        if path.is_file() {
            Some(path)
        } else {
            None
        }
    }

    pub async fn size(&self, filename: &str) -> Option<u64> {
        let path = self.resolve(filename)?;
        tokio::fs::metadata(&path).await.ok().map(|m| m.len())
    }
}

/// Sanitize a name hint to a safe filename stem.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_matches(|c| c == '.' || c == '_');
    if trimmed.is_empty() {
        "file".to_string()
    } else {
        trimmed.chars().take(120).collect()
    }
}

/// Short random tag for filenames and output templates.
pub fn short_tag() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    id.chars().take(8).collect()
}

fn unique_name(name_hint: &str) -> String {
    let hint = sanitize_filename(name_hint);
    // Keep the extension at the end: "report.txt" -> "report-ab12cd34.txt"
    match hint.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => {
            format!("{}-{}.{}", stem, short_tag(), ext)
        }
        _ => format!("{}-{}", hint, short_tag()),
    }
}
