// Caption cleanup and combined transcript assembly
//
// Turns a raw VTT caption track into flowing spoken text: cue
// numbers, timestamps, styling tags, audio cues and speaker labels all
// go. A track that cleans down to almost nothing counts as "no clear
// speech" and contributes nothing to the artifact.

use lazy_static::lazy_static;
use regex::Regex;

/// Characters of the combined artifact echoed back as a preview
pub const PREVIEW_CHARS: usize = 500;

/// Minimum cleaned length to count as real speech
const MIN_SPEECH_CHARS: usize = 50;

lazy_static! {
    static ref STYLING_TAG_RE: Regex = Regex::new(r"<c[^>]*>|</c>").unwrap();
    static ref WEBVTT_RE: Regex = Regex::new(r"(?i)WEBVTT[^\n]*").unwrap();
    static ref CUE_NUMBER_RE: Regex = Regex::new(r"(?m)^\d+\s*$").unwrap();
    static ref TIMESTAMP_RE: Regex = Regex::new(
        r"\d{1,2}:\d{2}:\d{2}[.,]\d{3}\s*-->\s*\d{1,2}:\d{2}:\d{2}[.,]\d{3}[^\n]*"
    )
    .unwrap();
    static ref SHORT_TIMESTAMP_RE: Regex =
        Regex::new(r"\d{1,2}:\d{2}[.,]\d{3}\s*-->\s*\d{1,2}:\d{2}[.,]\d{3}[^\n]*").unwrap();
    static ref AUDIO_CUE_RE: Regex =
        Regex::new(r"(?i)\[(?:Music|Applause|Silence|Sound|Laughter|Crowd)[^\]]*\]").unwrap();
    static ref SPEAKER_LABEL_RE: Regex =
        Regex::new(r"(?m)^[A-Z][a-z]+(?:\s+\d+)?:\s*").unwrap();
    static ref CHEVRON_RE: Regex = Regex::new(r"(?m)^>>\s*").unwrap();
    static ref ENTITY_RE: Regex = Regex::new(r"(?i)&[a-z]+;").unwrap();
    static ref HTML_TAG_RE: Regex = Regex::new(r"<[^>]+>").unwrap();
    static ref MULTI_SPACE_RE: Regex = Regex::new(r" +").unwrap();
}

/// Extract clean spoken text from a VTT caption track.
/// Returns None when no clear speech is left after cleanup.
pub fn clean_vtt(content: &str) -> Option<String> {
    let mut text = STYLING_TAG_RE.replace_all(content, "").into_owned();
    text = WEBVTT_RE.replace_all(&text, "").into_owned();
    text = TIMESTAMP_RE.replace_all(&text, "").into_owned();
    text = SHORT_TIMESTAMP_RE.replace_all(&text, "").into_owned();
    text = CUE_NUMBER_RE.replace_all(&text, "").into_owned();
    text = AUDIO_CUE_RE.replace_all(&text, "").into_owned();
    text = SPEAKER_LABEL_RE.replace_all(&text, "").into_owned();
    text = CHEVRON_RE.replace_all(&text, "").into_owned();
    text = ENTITY_RE.replace_all(&text, "").into_owned();
    text = HTML_TAG_RE.replace_all(&text, "").into_owned();

    // Join surviving lines into a natural flow
    let joined = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    let cleaned = MULTI_SPACE_RE.replace_all(&joined, " ").trim().to_string();

    if cleaned.len() > MIN_SPEECH_CHARS {
        Some(cleaned)
    } else {
        None
    }
}

/// Combine per-item transcripts into the artifact text, each section
/// introduced by its video title.
pub fn combine(sections: &[(String, String)]) -> String {
    let mut combined = String::new();
    for (title, text) in sections {
        combined.push_str(&format!("=== {} ===\n\n{}\n\n\n", title, text));
    }
    combined
}

/// First PREVIEW_CHARS characters, ellipsized when truncated.
pub fn preview(text: &str) -> String {
    if text.chars().count() > PREVIEW_CHARS {
        let head: String = text.chars().take(PREVIEW_CHARS).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}
