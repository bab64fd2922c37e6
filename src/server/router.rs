// Route table and CORS

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use super::{handlers, AppState};

/// Uploaded cookie files ride along the download form
const MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

fn build_cors(origins: &Option<Vec<String>>) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);
    match origins {
        None => cors.allow_origin(Any),
        Some(origins) => {
            let origins: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            cors.allow_origin(origins)
        }
    }
}

pub fn build_router(state: AppState, cors_origins: &Option<Vec<String>>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/extract", post(handlers::extract))
        .route("/check-video", post(handlers::check_video))
        .route("/list-formats", post(handlers::list_formats))
        .route("/download-video", post(handlers::download_video))
        .route("/download/{filename}", get(handlers::download_artifact))
        .route("/download-file/{filename}", get(handlers::download_media))
        .route("/cleanup", post(handlers::cleanup))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(build_cors(cors_origins))
        .with_state(state)
}
