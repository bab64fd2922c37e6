use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tubescribe::config::Config;
use tubescribe::engine::{ExtractionEngine, YtdlpEngine};
use tubescribe::jobs::JobCoordinator;
use tubescribe::server::{self, AppState};
use tubescribe::store::{ArtifactKind, ArtifactStore};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tubescribe=info,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    if let Err(e) = config.ensure_dirs() {
        tracing::error!(error = %e, dir = %config.data_dir.display(), "failed to create data directories");
        std::process::exit(1);
    }

    let ytdlp = Arc::new(YtdlpEngine::new(&config));
    if !ytdlp.is_available().await {
        // Non-fatal: the host may install yt-dlp after startup
        tracing::warn!("yt-dlp not found; extraction requests will fail until it is installed");
    }

    let transcripts = match ArtifactStore::new(config.output_dir(), ArtifactKind::Transcript) {
        Ok(store) => store,
        Err(e) => {
            tracing::error!(error = %e, "failed to open transcript store");
            std::process::exit(1);
        }
    };
    let media = match ArtifactStore::new(config.downloads_dir(), ArtifactKind::Media) {
        Ok(store) => store,
        Err(e) => {
            tracing::error!(error = %e, "failed to open media store");
            std::process::exit(1);
        }
    };
    // Artifacts are never expired; disk usage grows for the process lifetime
    tracing::info!(dir = %config.data_dir.display(), "artifact stores ready");

    let engine: Arc<dyn ExtractionEngine> = ytdlp;
    let coordinator = JobCoordinator::new(
        engine.clone(),
        transcripts.clone(),
        media.clone(),
        config.temp_dir(),
        &config,
    );

    let state = AppState {
        coordinator,
        engine,
        transcripts,
        media,
        cookies_dir: config.cookies_dir(),
        temp_dir: config.temp_dir(),
    };

    if let Err(e) = server::serve(&config, state).await {
        tracing::error!(error = %e, "server failed");
        std::process::exit(1);
    }
}
