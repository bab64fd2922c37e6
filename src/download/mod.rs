// Download orchestration - strategy ladder with bounded retry
//
// One item download walks a ladder of strategies: public player
// clients first, then the caller's cookie file, then any readable
// browser profile. Transient provider failures retry the same strategy
// with exponential backoff before moving on; permanent failures stop
// the ladder immediately.

pub mod quality;

pub use quality::Quality;

use std::path::{Path, PathBuf};
use tokio::time::{sleep, Duration};

use crate::engine::{
    classify_skip, CookieSource, DownloadPlan, DownloadedFile, ExtractionEngine, Mode, SkipReason,
};

/// Exponential backoff for transient provider failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Attempts per strategy, including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Delay before the next attempt, or None when attempts are spent.
    /// `attempt` is 1-based (1 = the attempt that just failed).
    pub fn backoff(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        let exp = 1u32 << attempt.saturating_sub(1).min(8);
        Some(self.base_delay.saturating_mul(exp).min(self.max_delay))
    }
}

/// One item's download request, playlist expansion already applied
#[derive(Debug, Clone)]
pub struct ItemDownload {
    pub url: String,
    pub mode: Mode,
    pub quality: Quality,
    pub cookies_path: Option<PathBuf>,
}

/// Successful download of one item
#[derive(Debug, Clone)]
pub struct DownloadOutcome {
    pub files: Vec<DownloadedFile>,
    pub strategy_used: String,
    pub warnings: Option<String>,
}

/// Terminal failure of one item after the full ladder
#[derive(Debug, Clone)]
pub struct DownloadFailure {
    pub error: String,
    pub reason: SkipReason,
    pub hints: Vec<String>,
}

struct Strategy {
    name: String,
    client: &'static str,
    cookies: CookieSource,
}

fn build_strategies(req: &ItemDownload, browsers: &[String]) -> Vec<Strategy> {
    let mut strategies = Vec::new();

    // Public attempts first: most videos need no credentials
    for client in ["web", "android", "ios"] {
        strategies.push(Strategy {
            name: format!("public ({} client)", client),
            client,
            cookies: CookieSource::None,
        });
    }

    if let Some(path) = &req.cookies_path {
        for client in ["web", "android"] {
            strategies.push(Strategy {
                name: format!("file cookies ({} client)", client),
                client,
                cookies: CookieSource::File(path.clone()),
            });
        }
    }

    for browser in browsers {
        strategies.push(Strategy {
            name: format!("auto {} cookies", browser),
            client: "web",
            cookies: CookieSource::Browser(browser.clone()),
        });
    }

    strategies
}

/// Hints mirrored back to the caller when every strategy failed.
fn hints_for(reason: SkipReason, had_cookie_file: bool, browsers: &[String]) -> Vec<String> {
    let mut hints = Vec::new();
    match reason {
        SkipReason::MembersOnly | SkipReason::PrivateVideo => {
            hints.push("This appears to be a member-only or private video".to_string());
            hints.push(
                "Provide cookies from a browser logged into an account with access".to_string(),
            );
        }
        SkipReason::VideoUnavailable | SkipReason::GeoBlocked => {
            hints.push("Video may be unavailable in your region or removed".to_string());
            hints.push("Try cookies from a browser where you can view the video".to_string());
        }
        SkipReason::AgeRestricted => {
            hints.push("Age-restricted content requires cookies".to_string());
            hints.push("Export cookies while logged into the provider".to_string());
        }
        SkipReason::DrmProtected => {
            hints.push("DRM-protected content cannot be downloaded".to_string());
        }
        _ => {
            hints.push("Try downloading without cookies first (for public videos)".to_string());
            if had_cookie_file {
                hints.push("Make sure the provided cookies are valid and fresh".to_string());
            }
        }
    }
    if !browsers.is_empty() {
        hints.push(format!("Auto-detected browsers: {}", browsers.join(", ")));
    }
    hints
}

/// Download one item through the strategy ladder.
pub async fn run(
    engine: &dyn ExtractionEngine,
    req: &ItemDownload,
    dest_dir: &Path,
    output_tag: &str,
    retry: &RetryPolicy,
) -> Result<DownloadOutcome, DownloadFailure> {
    // Resolve the quality cap against the real format list when we can;
    // a failed probe falls back to a generic expression rather than
    // failing the download outright.
    let cookies = req
        .cookies_path
        .as_ref()
        .map(|p| CookieSource::File(p.clone()))
        .unwrap_or_default();
    let format_spec = match engine.probe(&req.url, &cookies).await {
        Ok(probe) => quality::spec_for(req.quality, &probe.formats),
        Err(e) => {
            tracing::debug!(url = %req.url, error = %e, "probe failed, using fallback format spec");
            quality::fallback_spec(req.quality)
        }
    };

    let browsers = engine.available_browsers().await;
    let strategies = build_strategies(req, &browsers);

    let mut last_error = String::new();
    let mut last_reason = SkipReason::Provider;

    'ladder: for strategy in &strategies {
        let plan = DownloadPlan {
            url: req.url.clone(),
            mode: req.mode,
            format_spec: format_spec.clone(),
            dest_dir: dest_dir.to_path_buf(),
            output_tag: output_tag.to_string(),
            cookies: strategy.cookies.clone(),
            player_client: strategy.client.to_string(),
        };

        let mut attempt = 1u32;
        loop {
            tracing::debug!(strategy = %strategy.name, attempt, url = %req.url, "download attempt");
            match engine.download(&plan).await {
                Ok(files) if !files.is_empty() => {
                    return Ok(DownloadOutcome {
                        files,
                        strategy_used: strategy.name.clone(),
                        warnings: None,
                    });
                }
                Ok(_) => {
                    if last_error.is_empty() {
                        last_error = "Download produced no files".to_string();
                    }
                    continue 'ladder;
                }
                Err(e) => {
                    let message = e.message();
                    let reason = classify_skip(&message);
                    last_error = message;
                    last_reason = reason;

                    if reason.is_transient() {
                        if let Some(delay) = retry.backoff(attempt) {
                            tracing::debug!(strategy = %strategy.name, ?reason, ?delay, "transient failure, backing off");
                            sleep(delay).await;
                            attempt += 1;
                            continue;
                        }
                    }
                    if reason.halts_strategies() {
                        break 'ladder;
                    }
                    continue 'ladder;
                }
            }
        }
    }

    if last_error.is_empty() {
        last_error = "Download failed - no files were produced".to_string();
    }
    let had_cookie_file = req.cookies_path.is_some();
    Err(DownloadFailure {
        hints: hints_for(last_reason, had_cookie_file, &browsers),
        error: last_error,
        reason: last_reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(1),
        };
        assert_eq!(policy.backoff(1), Some(Duration::from_millis(500)));
        assert_eq!(policy.backoff(2), Some(Duration::from_secs(1)));
        assert_eq!(policy.backoff(3), Some(Duration::from_secs(1)));
        assert_eq!(policy.backoff(4), None);
    }

    #[test]
    fn default_allows_two_retries() {
        let policy = RetryPolicy::default();
        assert!(policy.backoff(1).is_some());
        assert!(policy.backoff(2).is_some());
        assert_eq!(policy.backoff(3), None);
    }

    #[test]
    fn ladder_starts_public_then_cookies() {
        let req = ItemDownload {
            url: "https://www.youtube.com/watch?v=x".to_string(),
            mode: Mode::Video,
            quality: Quality::Best,
            cookies_path: Some(PathBuf::from("/tmp/cookies.txt")),
        };
        let strategies = build_strategies(&req, &["chrome".to_string()]);
        assert!(strategies[0].name.starts_with("public"));
        assert!(strategies.iter().any(|s| s.name.starts_with("file cookies")));
        assert!(strategies.last().map_or(false, |s| s.name.contains("chrome")));
    }

    #[test]
    fn no_cookie_file_means_no_file_strategies() {
        let req = ItemDownload {
            url: "u".to_string(),
            mode: Mode::Audio,
            quality: Quality::Best,
            cookies_path: None,
        };
        let strategies = build_strategies(&req, &[]);
        assert_eq!(strategies.len(), 3);
        assert!(strategies.iter().all(|s| s.cookies == CookieSource::None));
    }

    #[test]
    fn member_hints_mention_cookies() {
        let hints = hints_for(SkipReason::MembersOnly, false, &[]);
        assert!(hints.iter().any(|h| h.to_lowercase().contains("cookies")));
    }
}
