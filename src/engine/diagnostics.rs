// Skip-reason diagnostics - classifies provider failures for one item
//
// Analyzes yt-dlp error output to determine:
// - Why an item could not be processed
// - Whether a retry with backoff might help
// - Whether credentials (cookies) might help
// - The human-readable reason recorded in the job's skip list

use serde::{Deserialize, Serialize};

/// Reasons an item ends up skipped instead of extracted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    /// Video has no caption tracks at all
    NoCaptions,

    /// Video deleted, removed for copyright, or otherwise gone
    VideoUnavailable,

    /// Private video requiring authorization
    PrivateVideo,

    /// Requires channel membership
    MembersOnly,

    /// Age-restricted content (needs login)
    AgeRestricted,

    /// Geographic restriction
    GeoBlocked,

    /// Live stream still in progress
    LiveStream,

    /// DRM-protected content, no workaround
    DrmProtected,

    /// Provider throttling (429 or similar)
    RateLimited,

    /// Network timeout (possible soft IP block)
    NetworkTimeout,

    /// Bot detection triggered
    BotDetection,

    /// Requested format/quality not offered for this video
    FormatUnavailable,

    /// Generic provider failure
    Provider,
}

impl SkipReason {
    /// Transient failures are worth a bounded retry with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::NetworkTimeout | Self::BotDetection
        )
    }

    /// Check if cookies might help
    pub fn cookies_might_help(&self) -> bool {
        matches!(
            self,
            Self::PrivateVideo
                | Self::MembersOnly
                | Self::AgeRestricted
                | Self::BotDetection
        )
    }

    /// Failures no alternate strategy can recover from; stop the ladder early.
    pub fn halts_strategies(&self) -> bool {
        matches!(
            self,
            Self::NoCaptions | Self::VideoUnavailable | Self::DrmProtected
        )
    }

    /// Human-readable reason recorded in `skipped_videos`
    pub fn label(&self) -> &'static str {
        match self {
            Self::NoCaptions => "no captions available",
            Self::VideoUnavailable => "video removed or unavailable",
            Self::PrivateVideo => "video is private",
            Self::MembersOnly => "members-only content",
            Self::AgeRestricted => "age-restricted content",
            Self::GeoBlocked => "not available in this region",
            Self::LiveStream => "live stream in progress",
            Self::DrmProtected => "DRM-protected content",
            Self::RateLimited => "provider rate limit",
            Self::NetworkTimeout => "provider timeout",
            Self::BotDetection => "provider blocked automated access",
            Self::FormatUnavailable => "requested format unavailable",
            Self::Provider => "provider error",
        }
    }

    /// Optional hint surfaced to the caller alongside an error envelope
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::PrivateVideo | Self::MembersOnly => {
                Some("Provide cookies from a browser logged into an account with access")
            }
            Self::AgeRestricted => Some("Age-restricted content requires cookies from a logged-in browser"),
            Self::GeoBlocked => Some("Video may be unavailable in this region"),
            Self::RateLimited => Some("Provider is rate limiting; wait a few minutes and retry"),
            Self::DrmProtected => Some("DRM-protected content cannot be downloaded"),
            Self::BotDetection => Some("Provide fresh cookies exported while logged in"),
            _ => None,
        }
    }
}

/// Classify raw provider error output into a skip reason.
///
/// Patterns are checked in order of specificity; the permanent
/// restrictions come first so a noisy multi-line stderr lands on the
/// right reason.
pub fn classify_skip(error: &str) -> SkipReason {
    let lower = error.to_lowercase();

    if lower.contains("drm")
        || lower.contains("widevine")
        || lower.contains("playready")
        || lower.contains("fairplay")
        || lower.contains("requires payment")
        || lower.contains("requires purchase")
    {
        return SkipReason::DrmProtected;
    }

    if lower.contains("members only")
        || lower.contains("members-only")
        || lower.contains("join this channel")
        || lower.contains("membership required")
        || lower.contains("available to members")
    {
        return SkipReason::MembersOnly;
    }

    if lower.contains("no subtitles")
        || lower.contains("subtitles are not available")
        || lower.contains("has no subtitles")
        || lower.contains("no closed captions")
    {
        return SkipReason::NoCaptions;
    }

    if lower.contains("age-restricted")
        || lower.contains("sign in to confirm your age")
        || lower.contains("age_verification")
    {
        return SkipReason::AgeRestricted;
    }

    if lower.contains("private video")
        || lower.contains("video is private")
        || lower.contains("sign in if you've been granted access")
    {
        return SkipReason::PrivateVideo;
    }

    if lower.contains("live event will begin")
        || lower.contains("is a live stream")
        || lower.contains("premieres in")
        || lower.contains("currently live")
    {
        return SkipReason::LiveStream;
    }

    if lower.contains("video unavailable")
        || lower.contains("video has been removed")
        || lower.contains("no longer available")
        || lower.contains("video is unavailable")
    {
        return SkipReason::VideoUnavailable;
    }

    if lower.contains("not available in your country")
        || lower.contains("blocked in your country")
        || lower.contains("geographic restriction")
        || lower.contains("geo restriction")
    {
        return SkipReason::GeoBlocked;
    }

    if lower.contains("429") || lower.contains("rate limit") || lower.contains("too many requests")
    {
        return SkipReason::RateLimited;
    }

    if lower.contains("captcha")
        || lower.contains("unusual traffic")
        || lower.contains("sign in to confirm you're not a bot")
        || lower.contains("bot detection")
    {
        return SkipReason::BotDetection;
    }

    if lower.contains("requested format is not available") {
        return SkipReason::FormatUnavailable;
    }

    if lower.contains("timeout")
        || lower.contains("timed out")
        || lower.contains("connection refused")
        || lower.contains("network unreachable")
    {
        return SkipReason::NetworkTimeout;
    }

    SkipReason::Provider
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_captions_detection() {
        let error = "ERROR: video doesn't have subtitles; Subtitles are not available";
        assert_eq!(classify_skip(error), SkipReason::NoCaptions);
    }

    #[test]
    fn test_members_only_detection() {
        let error = "This video is available to members only. Join this channel to get access";
        assert_eq!(classify_skip(error), SkipReason::MembersOnly);
    }

    #[test]
    fn test_unavailable_detection() {
        let error = "ERROR: Video unavailable. This video has been removed by the uploader";
        assert_eq!(classify_skip(error), SkipReason::VideoUnavailable);
    }

    #[test]
    fn test_live_stream_detection() {
        let error = "ERROR: This live event will begin in 2 hours";
        assert_eq!(classify_skip(error), SkipReason::LiveStream);
    }

    #[test]
    fn test_rate_limit_detection() {
        let error = "HTTP Error 429: Too Many Requests";
        assert_eq!(classify_skip(error), SkipReason::RateLimited);
    }

    #[test]
    fn test_geo_detection() {
        let error = "The uploader has not made this video available in your country";
        assert_eq!(classify_skip(error), SkipReason::GeoBlocked);
    }

    #[test]
    fn test_format_unavailable_detection() {
        let error = "ERROR: Requested format is not available";
        assert_eq!(classify_skip(error), SkipReason::FormatUnavailable);
    }

    #[test]
    fn test_timeout_detection() {
        let error = "Timed out after 45s";
        assert_eq!(classify_skip(error), SkipReason::NetworkTimeout);
    }

    #[test]
    fn test_unknown_falls_back_to_provider() {
        assert_eq!(classify_skip("something exploded"), SkipReason::Provider);
    }

    #[test]
    fn test_transient_reasons_retry() {
        assert!(SkipReason::RateLimited.is_transient());
        assert!(SkipReason::NetworkTimeout.is_transient());
        assert!(!SkipReason::NoCaptions.is_transient());
        assert!(!SkipReason::VideoUnavailable.is_transient());
    }

    #[test]
    fn test_permanent_reasons_halt_ladder() {
        assert!(SkipReason::NoCaptions.halts_strategies());
        assert!(SkipReason::DrmProtected.halts_strategies());
        assert!(!SkipReason::MembersOnly.halts_strategies());
    }
}
