// HTTP transport over the job core

pub mod error;
pub mod handlers;
pub mod router;

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Config;
use crate::engine::ExtractionEngine;
use crate::jobs::JobCoordinator;
use crate::store::ArtifactStore;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: JobCoordinator,
    pub engine: Arc<dyn ExtractionEngine>,
    pub transcripts: ArtifactStore,
    pub media: ArtifactStore,
    pub cookies_dir: PathBuf,
    pub temp_dir: PathBuf,
}

pub async fn serve(config: &Config, state: AppState) -> std::io::Result<()> {
    let app = router::build_router(state, &config.cors_origins);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "server listening");
    axum::serve(listener, app).await
}
