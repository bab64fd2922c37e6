// Job data model

use serde::Serialize;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use time::OffsetDateTime;

use crate::download::Quality;
use crate::engine::Mode;
use crate::store::ArtifactRef;

pub type JobId = String;

/// What a caller asked for; immutable once the job starts
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub url: String,
    pub mode: Mode,
    pub quality: Quality,
    /// Resolve the reference as a playlist (false: treat as one video)
    pub expand_playlist: bool,
    /// 1-based inclusive slice of the resolved sequence
    pub playlist_start: Option<u32>,
    pub playlist_end: Option<u32>,
    /// Explicit item selection, e.g. "1,3,5-7"
    pub playlist_items: Option<ItemSelector>,
    /// Opaque credential file forwarded to the engine
    pub cookies_path: Option<PathBuf>,
}

impl JobRequest {
    pub fn transcript(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            mode: Mode::Transcript,
            quality: Quality::Best,
            expand_playlist: true,
            playlist_start: None,
            playlist_end: None,
            playlist_items: None,
            cookies_path: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Resolving,
    Processing,
    Completing,
    Done,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemOutcome {
    Pending,
    Success,
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobItem {
    /// 1-based position within the job
    pub index: usize,
    pub url: String,
    pub title: Option<String>,
    pub outcome: ItemOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Counters {
    pub total: usize,
    pub succeeded: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: JobId,
    pub state: JobState,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub items: Vec<JobItem>,
    pub counters: Counters,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<ArtifactRef>,
}

impl Job {
    pub fn new(id: JobId) -> Self {
        Self {
            id,
            state: JobState::Pending,
            created_at: OffsetDateTime::now_utc(),
            items: Vec::new(),
            counters: Counters::default(),
            artifact: None,
        }
    }
}

/// Parsed item selection like "1,3,5-7" (1-based, inclusive ranges)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemSelector {
    ranges: Vec<RangeInclusive<u32>>,
}

impl ItemSelector {
    /// Parse a selector string. Returns None when nothing valid is in it.
    pub fn parse(s: &str) -> Option<Self> {
        let mut ranges = Vec::new();
        for part in s.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            if let Some((lo, hi)) = part.split_once('-') {
                if let (Ok(lo), Ok(hi)) = (lo.trim().parse::<u32>(), hi.trim().parse::<u32>()) {
                    if lo >= 1 && lo <= hi {
                        ranges.push(lo..=hi);
                    }
                }
            } else if let Ok(n) = part.parse::<u32>() {
                if n >= 1 {
                    ranges.push(n..=n);
                }
            }
        }
        if ranges.is_empty() {
            None
        } else {
            Some(Self { ranges })
        }
    }

    /// Whether the 1-based index is selected.
    pub fn contains(&self, index: u32) -> bool {
        self.ranges.iter().any(|r| r.contains(&index))
    }
}
