// Service configuration
//
// Defaults work out of the box; everything operational is overridable
// through environment variables:
//   TS_BIND       bind address (default 0.0.0.0:5000)
//   TS_DATA_DIR   root for artifacts, downloads, temp and cookie files
//   CORS_ORIGINS  comma-separated allowed origins, "*" for any
//   YTDLP_PATH    explicit path to the yt-dlp binary

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub data_dir: PathBuf,
    /// None means any origin (the default, matching CORS_ORIGINS="*")
    pub cors_origins: Option<Vec<String>>,
    pub ytdlp_path: Option<String>,

    /// Hard cap on resolved playlist length
    pub playlist_cap: usize,
    /// Pacing delay between items of one job
    pub item_delay: Duration,

    /// yt-dlp socket timeout in seconds
    pub socket_timeout: u64,
    /// Wall-clock limit for one caption fetch attempt
    pub caption_timeout: u64,
    /// Wall-clock limit for one download attempt
    pub download_timeout: u64,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tubescribe");
        Self {
            bind_addr: "0.0.0.0:5000".to_string(),
            data_dir,
            cors_origins: None,
            ytdlp_path: None,
            playlist_cap: 50,
            item_delay: Duration::from_secs(1),
            socket_timeout: 15,
            caption_timeout: 45,
            download_timeout: 600,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(bind) = std::env::var("TS_BIND") {
            if !bind.trim().is_empty() {
                config.bind_addr = bind;
            }
        }
        if let Ok(dir) = std::env::var("TS_DATA_DIR") {
            if !dir.trim().is_empty() {
                config.data_dir = PathBuf::from(dir);
            }
        }
        if let Ok(origins) = std::env::var("CORS_ORIGINS") {
            let origins = origins.trim();
            if !origins.is_empty() && origins != "*" {
                config.cors_origins = Some(
                    origins
                        .split(',')
                        .map(|o| o.trim().to_string())
                        .filter(|o| !o.is_empty())
                        .collect(),
                );
            }
        }
        if let Ok(path) = std::env::var("YTDLP_PATH") {
            if !path.trim().is_empty() {
                config.ytdlp_path = Some(path);
            }
        }

        config
    }

    /// Combined transcript artifacts
    pub fn output_dir(&self) -> PathBuf {
        self.data_dir.join("output")
    }

    /// Downloaded media files
    pub fn downloads_dir(&self) -> PathBuf {
        self.data_dir.join("downloads")
    }

    /// Scratch space for caption files
    pub fn temp_dir(&self) -> PathBuf {
        self.data_dir.join("temp")
    }

    /// Uploaded cookie blobs, forwarded opaquely to the engine
    pub fn cookies_dir(&self) -> PathBuf {
        self.data_dir.join("cookies")
    }

    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.output_dir())?;
        std::fs::create_dir_all(self.downloads_dir())?;
        std::fs::create_dir_all(self.temp_dir())?;
        std::fs::create_dir_all(self.cookies_dir())?;
        Ok(())
    }
}
