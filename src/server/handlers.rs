// HTTP handlers
//
// Thin layer over the coordinator and the engine: validation happens
// before a job is allocated, responses keep the wire shapes stable,
// and the SSE path simply proxies the job's progress channel.

use axum::body::Body;
use axum::extract::{Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;
use tokio_util::io::ReaderStream;

use crate::download::Quality;
use crate::engine::{classify_skip, CookieSource, Mode};
use crate::jobs::{ItemSelector, JobRequest, ProgressEvent};
use crate::store::{short_tag, ArtifactStore};

use super::error::ApiError;
use super::AppState;

fn is_provider_url(url: &str) -> bool {
    url.contains("youtube.com") || url.contains("youtu.be")
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        s.chars().take(max).collect()
    } else {
        s.to_string()
    }
}

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({"status": "ok", "message": "Server is running"}))
}

#[derive(Debug, Deserialize)]
pub struct ExtractRequest {
    #[serde(default)]
    pub playlist_url: String,
    #[serde(default)]
    pub use_sse: bool,
    #[serde(default)]
    pub job_id: Option<String>,
}

pub async fn extract(
    State(state): State<AppState>,
    Json(payload): Json<ExtractRequest>,
) -> Response {
    let url = payload.playlist_url.trim().to_string();
    if url.is_empty() {
        return ApiError::bad_request("Please provide a playlist URL").into_response();
    }
    if !is_provider_url(&url) {
        return ApiError::bad_request("Invalid YouTube URL").into_response();
    }

    let job_id = state
        .coordinator
        .create_job(JobRequest::transcript(url), payload.job_id);
    let Some(mut rx) = state.coordinator.attach_progress(&job_id) else {
        return ApiError::internal("Progress stream unavailable").into_response();
    };

    if payload.use_sse {
        let stream = UnboundedReceiverStream::new(rx).map(|event| {
            let data = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
            Ok::<_, Infallible>(Event::default().data(data))
        });
        return Sse::new(stream)
            .keep_alive(KeepAlive::default())
            .into_response();
    }

    // Synchronous path: wait for the terminal event and return it
    while let Some(event) = rx.recv().await {
        match event {
            ProgressEvent::Complete(summary) => return Json(summary).into_response(),
            ProgressEvent::Error { message } => {
                return ApiError::bad_request(message).into_response()
            }
            _ => {}
        }
    }
    ApiError::internal("Job ended without a result").into_response()
}

#[derive(Debug, Deserialize)]
pub struct VideoCheckRequest {
    #[serde(default)]
    pub video_url: String,
    #[serde(default)]
    pub use_cookies: bool,
}

pub async fn check_video(
    State(state): State<AppState>,
    Json(payload): Json<VideoCheckRequest>,
) -> Response {
    let url = payload.video_url.trim().to_string();
    if url.is_empty() {
        return ApiError::bad_request("Please provide a video URL").into_response();
    }
    if !is_provider_url(&url) {
        return ApiError::bad_request("Invalid YouTube URL").into_response();
    }

    let cookies = if payload.use_cookies {
        state
            .engine
            .available_browsers()
            .await
            .into_iter()
            .next()
            .map(CookieSource::Browser)
            .unwrap_or_default()
    } else {
        CookieSource::None
    };

    match state.engine.probe(&url, &cookies).await {
        Ok(probe) => Json(json!({
            "success": true,
            "accessible": true,
            "title": probe.title,
            "duration": probe.duration_seconds,
            "is_live": probe.is_live,
            "availability": probe.availability.unwrap_or_else(|| "public".to_string()),
            "formats_available": probe.formats.len(),
        }))
        .into_response(),
        Err(e) => {
            let message = e.message();
            let hint = classify_skip(&message).hint().unwrap_or(
                "Video may be private, member-only, or unavailable. Try with cookies if you have access.",
            );
            (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "success": false,
                    "accessible": false,
                    "error": truncate(&message, 500),
                    "hint": hint,
                })),
            )
                .into_response()
        }
    }
}

pub async fn list_formats(
    State(state): State<AppState>,
    Json(payload): Json<VideoCheckRequest>,
) -> Response {
    let url = payload.video_url.trim().to_string();
    if url.is_empty() {
        return ApiError::bad_request("Please provide a video URL").into_response();
    }

    let cookies = if payload.use_cookies {
        state
            .engine
            .available_browsers()
            .await
            .into_iter()
            .next()
            .map(CookieSource::Browser)
            .unwrap_or_default()
    } else {
        CookieSource::None
    };

    match state.engine.list_formats(&url, &cookies).await {
        Ok(formats) => Json(json!({"success": true, "formats": formats})).into_response(),
        Err(e) => ApiError::bad_request(truncate(&e.message(), 500)).into_response(),
    }
}

pub async fn download_video(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let mut video_url = String::new();
    let mut download_type = "video".to_string();
    let mut quality = Quality::Best;
    let mut expand_playlist = false;
    let mut playlist_start: Option<u32> = None;
    let mut playlist_end: Option<u32> = None;
    let mut playlist_items: Option<String> = None;
    let mut cookies_path = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                return ApiError::bad_request(format!("Malformed form data: {}", e))
                    .into_response()
            }
        };
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "video_url" => {
                video_url = field.text().await.unwrap_or_default().trim().to_string();
            }
            "download_type" => {
                download_type = field.text().await.unwrap_or_default();
            }
            "quality" => {
                quality = Quality::parse(&field.text().await.unwrap_or_default());
            }
            "yes_playlist" => {
                expand_playlist = field.text().await.unwrap_or_default().trim() == "true";
            }
            "playlist_start" => {
                playlist_start = field.text().await.unwrap_or_default().trim().parse().ok();
            }
            "playlist_end" => {
                playlist_end = field.text().await.unwrap_or_default().trim().parse().ok();
            }
            "playlist_items" => {
                let text = field.text().await.unwrap_or_default().trim().to_string();
                if !text.is_empty() {
                    playlist_items = Some(text);
                }
            }
            "cookie_file" => {
                // Opaque credential material: saved and forwarded, never parsed
                let bytes = match field.bytes().await {
                    Ok(bytes) => bytes,
                    Err(_) => continue,
                };
                if !bytes.is_empty() {
                    let path = state.cookies_dir.join(format!("cookies-{}.txt", short_tag()));
                    match tokio::fs::write(&path, &bytes).await {
                        Ok(()) => cookies_path = Some(path),
                        Err(e) => {
                            return ApiError::internal(format!(
                                "Failed to store cookie file: {}",
                                e
                            ))
                            .into_response()
                        }
                    }
                }
            }
            _ => {}
        }
    }

    if video_url.is_empty() {
        return ApiError::bad_request("Please provide a video URL").into_response();
    }
    if !is_provider_url(&video_url) {
        return ApiError::bad_request("Invalid YouTube URL").into_response();
    }

    let mode = match Mode::parse(&download_type) {
        Mode::Transcript => Mode::Video,
        mode => mode,
    };
    let request = JobRequest {
        url: video_url,
        mode,
        quality,
        expand_playlist,
        playlist_start,
        playlist_end,
        playlist_items: playlist_items.as_deref().and_then(ItemSelector::parse),
        cookies_path,
    };

    let job_id = state.coordinator.create_job(request, None);
    let Some(mut rx) = state.coordinator.attach_progress(&job_id) else {
        return ApiError::internal("Progress stream unavailable").into_response();
    };

    while let Some(event) = rx.recv().await {
        match event {
            ProgressEvent::Complete(summary) => {
                if summary.files.is_empty() {
                    let browsers = state.engine.available_browsers().await;
                    let hints = summary
                        .skipped_videos
                        .iter()
                        .map(|s| format!("{}: {}", s.title, s.reason))
                        .collect();
                    return ApiError::bad_request("Download failed - no files were downloaded")
                        .with_hints(hints)
                        .with_browsers(browsers)
                        .into_response();
                }
                let mut body = json!({
                    "success": true,
                    "message": format!("Successfully downloaded {} file(s)", summary.files.len()),
                    "files": summary.files,
                });
                if let Some(strategy) = summary.strategy_used {
                    body["strategy_used"] = json!(strategy);
                }
                if let Some(warnings) = summary.warnings {
                    body["warnings"] = json!(warnings);
                }
                return Json(body).into_response();
            }
            ProgressEvent::Error { message } => {
                return ApiError::bad_request(message).into_response()
            }
            _ => {}
        }
    }
    ApiError::internal("Job ended without a result").into_response()
}

async fn serve_from(store: &ArtifactStore, filename: &str) -> Response {
    let Some(path) = store.resolve(filename) else {
        return ApiError::not_found("File not found").into_response();
    };
    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(_) => return ApiError::not_found("File not found").into_response(),
    };

    let mime = mime_guess::from_path(&path).first_or_octet_stream();
    let disposition = format!(
        "attachment; filename=\"{}\"",
        filename.replace('"', "_")
    );
    let body = Body::from_stream(ReaderStream::new(file));
    (
        [
            (header::CONTENT_TYPE, mime.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response()
}

/// Transcript artifacts
pub async fn download_artifact(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Response {
    serve_from(&state.transcripts, &filename).await
}

/// Downloaded media files
pub async fn download_media(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Response {
    serve_from(&state.media, &filename).await
}

pub async fn cleanup(State(state): State<AppState>) -> Response {
    let mut removed = 0u64;
    if let Ok(mut dir) = tokio::fs::read_dir(&state.temp_dir).await {
        while let Ok(Some(entry)) = dir.next_entry().await {
            let is_file = entry
                .file_type()
                .await
                .map(|t| t.is_file())
                .unwrap_or(false);
            if is_file && tokio::fs::remove_file(entry.path()).await.is_ok() {
                removed += 1;
            }
        }
    }
    Json(json!({"success": true, "removed": removed})).into_response()
}
