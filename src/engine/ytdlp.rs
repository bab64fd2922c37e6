// yt-dlp backed extraction engine
//
// Drives the yt-dlp binary for playlist resolution, metadata probes,
// caption fetches and media downloads. Caption fetches walk a ladder
// of player-client strategies because the provider blocks clients
// unevenly; the first strategy that produces a usable track wins.

use async_trait::async_trait;
use std::path::Path;
use tokio::sync::OnceCell;
use tokio::time::{sleep, Duration};

use super::diagnostics::classify_skip;
use super::errors::EngineError;
use super::playlist::{classify_resolve_failure, parse_flat_playlist, PlaylistEntry, ResolveError};
use super::process::{find_ytdlp, run_with_timeout};
use super::{CookieSource, DownloadPlan, DownloadedFile, ExtractionEngine, MediaFormat, Mode, VideoProbe};
use crate::config::Config;

const USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36";

/// URL used only to test whether browser cookies are readable
const COOKIE_PROBE_URL: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";

pub struct YtdlpEngine {
    ytdlp_path: String,
    socket_timeout: u64,
    caption_timeout: u64,
    download_timeout: u64,
    browsers: OnceCell<Vec<String>>,
}

impl YtdlpEngine {
    pub fn new(config: &Config) -> Self {
        Self {
            ytdlp_path: find_ytdlp(config.ytdlp_path.as_deref()),
            socket_timeout: config.socket_timeout,
            caption_timeout: config.caption_timeout,
            download_timeout: config.download_timeout,
            browsers: OnceCell::new(),
        }
    }

    /// Check if the yt-dlp binary is usable on this host.
    pub async fn is_available(&self) -> bool {
        match run_with_timeout(&self.ytdlp_path, vec!["--version".to_string()], 10).await {
            Ok(out) => out.status.success(),
            Err(_) => false,
        }
    }

    fn is_youtube(url: &str) -> bool {
        let lower = url.to_lowercase();
        lower.contains("youtube.com") || lower.contains("youtu.be")
    }

    fn cookie_args(cookies: &CookieSource) -> Vec<String> {
        match cookies {
            CookieSource::None => Vec::new(),
            CookieSource::File(path) => {
                vec!["--cookies".to_string(), path.to_string_lossy().to_string()]
            }
            CookieSource::Browser(browser) => {
                vec!["--cookies-from-browser".to_string(), browser.clone()]
            }
        }
    }

    fn combined_output(output: &std::process::Output) -> String {
        let mut s = String::from_utf8_lossy(&output.stderr).to_string();
        s.push('\n');
        s.push_str(&String::from_utf8_lossy(&output.stdout));
        s
    }

    /// Find the best (largest) caption file produced for `id`, read it,
    /// and clean up every matching temp file.
    async fn collect_vtt(workdir: &Path, id: &str) -> Option<String> {
        let mut best: Option<(std::path::PathBuf, u64)> = None;
        let mut matched = Vec::new();

        let mut dir = tokio::fs::read_dir(workdir).await.ok()?;
        while let Ok(Some(entry)) = dir.next_entry().await {
            let name = entry.file_name().to_string_lossy().to_string();
            if !name.ends_with(".vtt") || !name.contains(id) {
                continue;
            }
            let size = entry.metadata().await.map(|m| m.len()).unwrap_or(0);
            // Tiny files are headers with no cues
            if size <= 50 {
                matched.push(entry.path());
                continue;
            }
            if best.as_ref().map_or(true, |(_, s)| size > *s) {
                best = Some((entry.path(), size));
            }
            matched.push(entry.path());
        }

        let content = match &best {
            Some((path, _)) => tokio::fs::read_to_string(path).await.ok(),
            None => None,
        };
        for path in matched {
            let _ = tokio::fs::remove_file(path).await;
        }
        content
    }
}

#[async_trait]
impl ExtractionEngine for YtdlpEngine {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn resolve_playlist(
        &self,
        url: &str,
        cap: usize,
    ) -> Result<Vec<PlaylistEntry>, ResolveError> {
        let args = vec![
            "--flat-playlist".to_string(),
            "--dump-json".to_string(),
            "--playlist-end".to_string(),
            cap.to_string(),
            "--no-warnings".to_string(),
            "--socket-timeout".to_string(),
            self.socket_timeout.to_string(),
            url.to_string(),
        ];

        let output = run_with_timeout(&self.ytdlp_path, args, 60)
            .await
            .map_err(|e| ResolveError::Provider(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_resolve_failure(&stderr, url));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_flat_playlist(&stdout, cap))
    }

    async fn probe(&self, url: &str, cookies: &CookieSource) -> Result<VideoProbe, EngineError> {
        let mut args = vec![
            "--dump-json".to_string(),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "--socket-timeout".to_string(),
            self.socket_timeout.to_string(),
            "--retries".to_string(),
            "2".to_string(),
            "--user-agent".to_string(),
            USER_AGENT.to_string(),
        ];
        if Self::is_youtube(url) {
            // Multiple player clients in one call bypasses uneven blocking
            args.push("--extractor-args".to_string());
            args.push("youtube:player_client=web,web_safari,ios".to_string());
        }
        args.extend(Self::cookie_args(cookies));
        args.push(url.to_string());

        let output = run_with_timeout(&self.ytdlp_path, args, self.socket_timeout * 2 + 10).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            return Err(EngineError::from(stderr));
        }

        parse_probe(&output.stdout)
    }

    async fn fetch_captions(
        &self,
        entry: &PlaylistEntry,
        workdir: &Path,
    ) -> Result<String, EngineError> {
        let output_template = workdir
            .join(format!("{}.%(ext)s", entry.id))
            .to_string_lossy()
            .to_string();

        let base_args = |client: Option<&str>, cookies: &CookieSource| -> Vec<String> {
            let mut args = vec![
                "--skip-download".to_string(),
                "--write-sub".to_string(),
                "--write-auto-sub".to_string(),
                "--sub-lang".to_string(),
                "en".to_string(),
                "--convert-subs".to_string(),
                "vtt".to_string(),
                "--no-playlist".to_string(),
                "--no-warnings".to_string(),
                "--ignore-errors".to_string(),
                "--socket-timeout".to_string(),
                self.socket_timeout.to_string(),
            ];
            if let Some(client) = client {
                args.push("--extractor-args".to_string());
                args.push(format!("youtube:player_client={}", client));
            }
            args.extend(Self::cookie_args(cookies));
            args.push("-o".to_string());
            args.push(output_template.clone());
            args.push(entry.url.clone());
            args
        };

        // Browser cookies first when a profile is readable, then the
        // plain client ladder
        let mut strategies: Vec<(String, Option<&str>, CookieSource)> = Vec::new();
        for browser in self.available_browsers().await.into_iter().take(2) {
            strategies.push((
                format!("browser_{}", browser),
                Some("web"),
                CookieSource::Browser(browser),
            ));
        }
        strategies.push(("web_client".to_string(), Some("web"), CookieSource::None));
        strategies.push(("android_client".to_string(), Some("android"), CookieSource::None));
        strategies.push(("ios_client".to_string(), Some("ios"), CookieSource::None));
        strategies.push(("default".to_string(), None, CookieSource::None));

        let mut last_error = String::new();

        for (idx, (name, client, cookies)) in strategies.iter().enumerate() {
            // Pace strategies to avoid tripping rate limits
            if idx > 0 {
                sleep(Duration::from_millis(500)).await;
            }

            let args = base_args(*client, cookies);
            tracing::debug!(video = %entry.id, strategy = %name, "fetching captions");

            let result = run_with_timeout(&self.ytdlp_path, args, self.caption_timeout).await;

            match result {
                Ok(output) => {
                    if let Some(vtt) = Self::collect_vtt(workdir, &entry.id).await {
                        tracing::debug!(video = %entry.id, strategy = %name, "caption track found");
                        return Ok(vtt);
                    }

                    let combined = Self::combined_output(&output);
                    if !combined.trim().is_empty() {
                        let reason = classify_skip(&combined);
                        last_error = combined;
                        if reason.halts_strategies() {
                            // No other client will conjure captions
                            tracing::debug!(video = %entry.id, ?reason, "stopping strategy ladder");
                            break;
                        }
                    } else if last_error.is_empty() {
                        last_error = "Command succeeded but no subtitle file was created".to_string();
                    }
                }
                Err(e) => {
                    last_error = e.message();
                }
            }
        }

        if last_error.is_empty() {
            last_error = "All subtitle strategies failed".to_string();
        }
        Err(EngineError::from(last_error))
    }

    async fn download(&self, plan: &DownloadPlan) -> Result<Vec<DownloadedFile>, EngineError> {
        let mut args = vec![
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "--no-update".to_string(),
            "--socket-timeout".to_string(),
            "30".to_string(),
            "--retries".to_string(),
            "5".to_string(),
            "--fragment-retries".to_string(),
            "50".to_string(),
            "--file-access-retries".to_string(),
            "10".to_string(),
            "--skip-unavailable-fragments".to_string(),
            "--user-agent".to_string(),
            USER_AGENT.to_string(),
            "-P".to_string(),
            plan.dest_dir.to_string_lossy().to_string(),
            "-o".to_string(),
            format!("%(title)s [{}].%(ext)s", plan.output_tag),
        ];

        match plan.mode {
            Mode::Audio => {
                args.push("-x".to_string());
                args.push("--audio-format".to_string());
                args.push("mp3".to_string());
            }
            Mode::Subtitle => {
                args.push("--write-sub".to_string());
                args.push("--write-auto-sub".to_string());
                args.push("--sub-format".to_string());
                args.push("srt".to_string());
                args.push("--sub-lang".to_string());
                args.push("en".to_string());
                args.push("--skip-download".to_string());
            }
            _ => {
                args.push("-f".to_string());
                args.push(plan.format_spec.clone());
            }
        }

        if Self::is_youtube(&plan.url) {
            // IPv6 ranges are throttled more aggressively by the CDN
            args.push("--force-ipv4".to_string());
            args.push("--extractor-args".to_string());
            args.push(format!("youtube:player_client={}", plan.player_client));
            if matches!(plan.mode, Mode::Video) {
                args.push("--merge-output-format".to_string());
                args.push("mp4".to_string());
            }
        }

        args.extend(Self::cookie_args(&plan.cookies));
        args.push(plan.url.clone());

        let output = run_with_timeout(&self.ytdlp_path, args, self.download_timeout).await?;

        // Files produced by this attempt carry the output tag
        let marker = format!("[{}]", plan.output_tag);
        let mut files = Vec::new();
        if let Ok(mut dir) = tokio::fs::read_dir(&plan.dest_dir).await {
            while let Ok(Some(entry)) = dir.next_entry().await {
                let name = entry.file_name().to_string_lossy().to_string();
                if !name.contains(&marker) || name.ends_with(".part") {
                    continue;
                }
                let size = entry.metadata().await.map(|m| m.len()).unwrap_or(0);
                files.push(DownloadedFile {
                    name,
                    size,
                    path: entry.path().to_string_lossy().to_string(),
                });
            }
        }
        files.sort_by(|a, b| a.name.cmp(&b.name));

        if files.is_empty() && !output.status.success() {
            return Err(EngineError::from(Self::combined_output(&output)));
        }
        Ok(files)
    }

    async fn list_formats(
        &self,
        url: &str,
        cookies: &CookieSource,
    ) -> Result<String, EngineError> {
        let mut args = vec![
            "-F".to_string(),
            "--no-warnings".to_string(),
            "--socket-timeout".to_string(),
            self.socket_timeout.to_string(),
        ];
        args.extend(Self::cookie_args(cookies));
        args.push(url.to_string());

        let output = run_with_timeout(&self.ytdlp_path, args, self.socket_timeout * 2 + 10).await?;
        if !output.status.success() {
            return Err(EngineError::from(
                String::from_utf8_lossy(&output.stderr).to_string(),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    async fn available_browsers(&self) -> Vec<String> {
        self.browsers
            .get_or_init(|| async {
                let mut available = Vec::new();
                for browser in ["chrome", "firefox", "edge", "brave", "opera"] {
                    let args = vec![
                        "--cookies-from-browser".to_string(),
                        browser.to_string(),
                        "--list-formats".to_string(),
                        "--no-warnings".to_string(),
                        COOKIE_PROBE_URL.to_string(),
                    ];
                    match run_with_timeout(&self.ytdlp_path, args, 8).await {
                        Ok(out)
                            if out.status.success()
                                || String::from_utf8_lossy(&out.stdout)
                                    .to_lowercase()
                                    .contains("format") =>
                        {
                            available.push(browser.to_string());
                        }
                        _ => {}
                    }
                }
                tracing::info!(browsers = ?available, "browser cookie probe complete");
                available
            })
            .await
            .clone()
    }
}

/// Parse a `--dump-json` probe into video metadata.
fn parse_probe(stdout: &[u8]) -> Result<VideoProbe, EngineError> {
    let json_str = String::from_utf8_lossy(stdout);
    let json: serde_json::Value = serde_json::from_str(&json_str)
        .map_err(|e| EngineError::ParseError(format!("Invalid JSON from probe: {}", e)))?;

    let formats = json["formats"]
        .as_array()
        .map(|arr| {
            arr.iter()
                .map(|f| MediaFormat {
                    format_id: f["format_id"].as_str().unwrap_or("").to_string(),
                    ext: f["ext"].as_str().unwrap_or("").to_string(),
                    height: f["height"].as_u64().map(|h| h as u32),
                    vcodec: f["vcodec"].as_str().map(|s| s.to_string()),
                    acodec: f["acodec"].as_str().map(|s| s.to_string()),
                    filesize: f["filesize"].as_u64().or_else(|| f["filesize_approx"].as_u64()),
                })
                .collect()
        })
        .unwrap_or_default();

    let is_live = json["is_live"].as_bool().unwrap_or(false)
        || json["live_status"].as_str() == Some("is_live");

    Ok(VideoProbe {
        id: json["id"].as_str().unwrap_or("unknown").to_string(),
        title: json["title"].as_str().unwrap_or("Unknown").to_string(),
        duration_seconds: json["duration"].as_f64().unwrap_or(0.0) as u64,
        is_live,
        availability: json["availability"].as_str().map(|s| s.to_string()),
        formats,
    })
}
