// End-to-end pipeline tests against a scripted extraction engine.

use async_trait::async_trait;
use axum::extract::{Path as UrlPath, State};
use axum::http::StatusCode;
use axum::Json;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tubescribe::config::Config;
use tubescribe::download::Quality;
use tubescribe::engine::{
    CookieSource, DownloadPlan, DownloadedFile, EngineError, ExtractionEngine, MediaFormat, Mode,
    PlaylistEntry, ResolveError, VideoProbe,
};
use tubescribe::jobs::{JobCoordinator, JobRequest, JobState, ProgressEvent};
use tubescribe::server::{handlers, AppState};
use tubescribe::store::{ArtifactKind, ArtifactStore};

const SPEECH: &str =
    "this is a long enough stretch of spoken words to count as a real transcript for the test";

fn vtt(text: &str) -> String {
    format!("WEBVTT\n\n1\n00:00:01.000 --> 00:00:05.000\n{}\n", text)
}

fn entry(id: &str, title: &str) -> PlaylistEntry {
    PlaylistEntry {
        id: id.to_string(),
        title: Some(title.to_string()),
        url: format!("https://www.youtube.com/watch?v={}", id),
    }
}

enum CaptionScript {
    Ok(String),
    Fail(String),
    FailOnceThenOk(String, String),
}

#[derive(Default)]
struct FakeEngine {
    playlist: Option<Result<Vec<PlaylistEntry>, ResolveError>>,
    captions: HashMap<String, CaptionScript>,
    downloads_succeed: bool,
    attempts: Mutex<HashMap<String, u32>>,
    format_specs: Mutex<Vec<String>>,
}

impl FakeEngine {
    fn with_playlist(entries: Vec<PlaylistEntry>) -> Self {
        Self {
            playlist: Some(Ok(entries)),
            ..Self::default()
        }
    }

    fn caption(mut self, id: &str, script: CaptionScript) -> Self {
        self.captions.insert(id.to_string(), script);
        self
    }
}

#[async_trait]
impl ExtractionEngine for FakeEngine {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn resolve_playlist(
        &self,
        _url: &str,
        _cap: usize,
    ) -> Result<Vec<PlaylistEntry>, ResolveError> {
        match &self.playlist {
            Some(Ok(entries)) => Ok(entries.clone()),
            Some(Err(e)) => Err(e.clone()),
            None => Ok(Vec::new()),
        }
    }

    async fn probe(&self, _url: &str, _cookies: &CookieSource) -> Result<VideoProbe, EngineError> {
        let fmt = |height: u32| MediaFormat {
            format_id: format!("{}", height),
            ext: "mp4".to_string(),
            height: Some(height),
            vcodec: Some("avc1".to_string()),
            acodec: Some("mp4a".to_string()),
            filesize: None,
        };
        Ok(VideoProbe {
            id: "probe".to_string(),
            title: "Probed".to_string(),
            duration_seconds: 10,
            is_live: false,
            availability: Some("public".to_string()),
            formats: vec![fmt(480), fmt(1080)],
        })
    }

    async fn fetch_captions(
        &self,
        entry: &PlaylistEntry,
        _workdir: &Path,
    ) -> Result<String, EngineError> {
        match self.captions.get(&entry.id) {
            Some(CaptionScript::Ok(text)) => Ok(text.clone()),
            Some(CaptionScript::Fail(error)) => Err(EngineError::from(error.clone())),
            Some(CaptionScript::FailOnceThenOk(error, text)) => {
                let mut attempts = self.attempts.lock().unwrap();
                let n = attempts.entry(entry.id.clone()).or_insert(0);
                *n += 1;
                if *n == 1 {
                    Err(EngineError::from(error.clone()))
                } else {
                    Ok(text.clone())
                }
            }
            None => Err(EngineError::from(
                "ERROR: video doesn't have subtitles".to_string(),
            )),
        }
    }

    async fn download(&self, plan: &DownloadPlan) -> Result<Vec<DownloadedFile>, EngineError> {
        self.format_specs
            .lock()
            .unwrap()
            .push(plan.format_spec.clone());
        if !self.downloads_succeed || plan.url.contains("bad") {
            return Err(EngineError::from("ERROR: Video unavailable".to_string()));
        }
        let name = format!("clip [{}].mp4", plan.output_tag);
        let path = plan.dest_dir.join(&name);
        std::fs::write(&path, b"media bytes").map_err(|e| {
            EngineError::ExecutionError(format!("test file write failed: {}", e))
        })?;
        Ok(vec![DownloadedFile {
            name,
            size: 11,
            path: path.to_string_lossy().to_string(),
        }])
    }

    async fn list_formats(
        &self,
        _url: &str,
        _cookies: &CookieSource,
    ) -> Result<String, EngineError> {
        Ok("format list".to_string())
    }

    async fn available_browsers(&self) -> Vec<String> {
        Vec::new()
    }
}

fn test_config() -> Config {
    let mut config = Config::default();
    config.item_delay = Duration::ZERO;
    config
}

fn make_coordinator(engine: Arc<dyn ExtractionEngine>, dir: &Path) -> JobCoordinator {
    let transcripts = ArtifactStore::new(dir.join("output"), ArtifactKind::Transcript).unwrap();
    let media = ArtifactStore::new(dir.join("downloads"), ArtifactKind::Media).unwrap();
    std::fs::create_dir_all(dir.join("temp")).unwrap();
    JobCoordinator::new(engine, transcripts, media, dir.join("temp"), &test_config())
}

async fn run_job(
    coordinator: &JobCoordinator,
    request: JobRequest,
) -> (String, Vec<ProgressEvent>) {
    let id = coordinator.create_job(request, None);
    let mut rx = coordinator.attach_progress(&id).expect("progress stream");
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    (id, events)
}

fn assert_monotone(events: &[ProgressEvent]) {
    let mut last_pct = 0u8;
    let mut last_current = 0usize;
    for event in events {
        match event {
            ProgressEvent::Progress {
                current,
                percentage,
                ..
            } => {
                assert!(*percentage >= last_pct, "percentage regressed: {:?}", events);
                assert!(*current >= last_current, "current regressed: {:?}", events);
                last_pct = *percentage;
                last_current = *current;
            }
            ProgressEvent::Status { percentage, .. } => {
                assert!(*percentage >= last_pct, "percentage regressed: {:?}", events);
                last_pct = *percentage;
            }
            _ => {}
        }
    }
}

fn assert_single_terminal(events: &[ProgressEvent]) {
    let terminals = events.iter().filter(|e| e.is_terminal()).count();
    assert_eq!(terminals, 1, "expected exactly one terminal event");
    assert!(events.last().map_or(false, |e| e.is_terminal()));
}

fn complete_summary(events: &[ProgressEvent]) -> &tubescribe::jobs::JobSummary {
    match events.last() {
        Some(ProgressEvent::Complete(summary)) => summary,
        other => panic!("expected complete event, got {:?}", other),
    }
}

#[tokio::test]
async fn full_success_playlist() {
    let dir = tempfile::tempdir().unwrap();
    let engine = FakeEngine::with_playlist(vec![
        entry("v1", "First"),
        entry("v2", "Second"),
        entry("v3", "Third"),
    ])
    .caption("v1", CaptionScript::Ok(vtt(SPEECH)))
    .caption("v2", CaptionScript::Ok(vtt(SPEECH)))
    .caption("v3", CaptionScript::Ok(vtt(SPEECH)));

    let coordinator = make_coordinator(Arc::new(engine), dir.path());
    let (id, events) = run_job(&coordinator, JobRequest::transcript("url")).await;

    assert_monotone(&events);
    assert_single_terminal(&events);

    let summary = complete_summary(&events);
    assert!(summary.success);
    assert_eq!(summary.total_videos, 3);
    assert_eq!(summary.extracted, 3);
    assert_eq!(summary.skipped, 0);
    assert!(summary.skipped_videos.is_empty());
    let filename = summary.filename.as_ref().expect("artifact filename");
    assert!(filename.ends_with(".txt"));

    // Artifact is readable and carries every section in order
    let artifact_path = dir.path().join("output").join(filename);
    let text = std::fs::read_to_string(artifact_path).unwrap();
    let first = text.find("=== First ===").unwrap();
    let third = text.find("=== Third ===").unwrap();
    assert!(first < third);

    let job = coordinator.get_result(&id).expect("job snapshot");
    assert_eq!(job.state, JobState::Done);
    assert_eq!(job.counters.succeeded + job.counters.skipped, job.counters.total);
}

#[tokio::test]
async fn one_item_without_captions_is_skipped_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let engine = FakeEngine::with_playlist(vec![
        entry("v1", "First"),
        entry("v2", "Second"),
        entry("v3", "Third"),
    ])
    .caption("v1", CaptionScript::Ok(vtt(SPEECH)))
    .caption(
        "v2",
        CaptionScript::Fail("ERROR: Subtitles are not available for this video".to_string()),
    )
    .caption("v3", CaptionScript::Ok(vtt(SPEECH)));

    let coordinator = make_coordinator(Arc::new(engine), dir.path());
    let (_, events) = run_job(&coordinator, JobRequest::transcript("url")).await;

    assert_single_terminal(&events);
    let summary = complete_summary(&events);
    assert_eq!(summary.extracted, 2);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.skipped_videos.len(), 1);
    assert_eq!(summary.skipped_videos[0].title, "Second");
    assert_eq!(summary.skipped_videos[0].reason, "no captions available");
    assert_eq!(summary.extracted + summary.skipped, summary.total_videos);
}

#[tokio::test]
async fn empty_playlist_completes_with_zero_counts() {
    let dir = tempfile::tempdir().unwrap();
    let engine = FakeEngine::with_playlist(Vec::new());
    let coordinator = make_coordinator(Arc::new(engine), dir.path());
    let (id, events) = run_job(&coordinator, JobRequest::transcript("url")).await;

    assert_single_terminal(&events);
    let summary = complete_summary(&events);
    assert!(summary.success);
    assert_eq!(summary.total_videos, 0);
    assert_eq!(summary.extracted, 0);
    assert_eq!(summary.skipped, 0);

    let job = coordinator.get_result(&id).unwrap();
    assert_eq!(job.state, JobState::Done);
}

#[tokio::test]
async fn all_items_skipped_still_completes() {
    let dir = tempfile::tempdir().unwrap();
    let engine = FakeEngine::with_playlist(vec![entry("v1", "First"), entry("v2", "Second")])
        .caption(
            "v1",
            CaptionScript::Fail("ERROR: no subtitles".to_string()),
        )
        .caption(
            "v2",
            CaptionScript::Fail("ERROR: Video unavailable".to_string()),
        );

    let coordinator = make_coordinator(Arc::new(engine), dir.path());
    let (_, events) = run_job(&coordinator, JobRequest::transcript("url")).await;

    let summary = complete_summary(&events);
    assert!(summary.success);
    assert_eq!(summary.extracted, 0);
    assert_eq!(summary.skipped, 2);
    assert_eq!(summary.skipped_videos.len(), 2);
}

#[tokio::test]
async fn resolution_failure_emits_single_error() {
    let dir = tempfile::tempdir().unwrap();
    let engine = FakeEngine {
        playlist: Some(Err(ResolveError::NotFound)),
        ..FakeEngine::default()
    };
    let coordinator = make_coordinator(Arc::new(engine), dir.path());
    let (id, events) = run_job(&coordinator, JobRequest::transcript("url")).await;

    assert_single_terminal(&events);
    assert!(matches!(
        events.last(),
        Some(ProgressEvent::Error { .. })
    ));
    assert!(!events
        .iter()
        .any(|e| matches!(e, ProgressEvent::Complete(_))));

    let job = coordinator.get_result(&id).unwrap();
    assert_eq!(job.state, JobState::Failed);
}

#[tokio::test]
async fn transient_failure_is_retried_then_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let engine = FakeEngine::with_playlist(vec![entry("v1", "Flaky")]).caption(
        "v1",
        CaptionScript::FailOnceThenOk(
            "HTTP Error 429: Too Many Requests".to_string(),
            vtt(SPEECH),
        ),
    );

    let coordinator = make_coordinator(Arc::new(engine), dir.path());
    let (_, events) = run_job(&coordinator, JobRequest::transcript("url")).await;

    let summary = complete_summary(&events);
    assert_eq!(summary.extracted, 1);
    assert_eq!(summary.skipped, 0);
}

#[tokio::test]
async fn identical_jobs_get_distinct_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let engine: Arc<dyn ExtractionEngine> = Arc::new(
        FakeEngine::with_playlist(vec![entry("v1", "Only")])
            .caption("v1", CaptionScript::Ok(vtt(SPEECH))),
    );
    let coordinator = make_coordinator(engine, dir.path());

    let (_, first) = run_job(&coordinator, JobRequest::transcript("url")).await;
    let (_, second) = run_job(&coordinator, JobRequest::transcript("url")).await;

    let a = complete_summary(&first).filename.clone().unwrap();
    let b = complete_summary(&second).filename.clone().unwrap();
    assert_ne!(a, b);
    assert!(dir.path().join("output").join(&a).is_file());
    assert!(dir.path().join("output").join(&b).is_file());
}

#[tokio::test]
async fn second_attach_gets_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let engine = FakeEngine::with_playlist(vec![entry("v1", "Only")])
        .caption("v1", CaptionScript::Ok(vtt(SPEECH)));
    let coordinator = make_coordinator(Arc::new(engine), dir.path());

    let id = coordinator.create_job(JobRequest::transcript("url"), None);
    let first = coordinator.attach_progress(&id);
    assert!(first.is_some());
    assert!(coordinator.attach_progress(&id).is_none());
    assert!(coordinator.attach_progress("no-such-job").is_none());
}

#[tokio::test]
async fn job_completes_without_any_listener() {
    let dir = tempfile::tempdir().unwrap();
    let engine = FakeEngine::with_playlist(vec![entry("v1", "Only")])
        .caption("v1", CaptionScript::Ok(vtt(SPEECH)));
    let coordinator = make_coordinator(Arc::new(engine), dir.path());

    let id = coordinator.create_job(JobRequest::transcript("url"), None);

    // Nobody ever attaches; the job must still run to Done
    for _ in 0..200 {
        if let Some(job) = coordinator.get_result(&id) {
            if job.state == JobState::Done {
                assert_eq!(job.counters.succeeded, 1);
                assert!(job.artifact.is_some());
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job never completed without a listener");
}

#[tokio::test]
async fn caller_supplied_job_id_is_honored() {
    let dir = tempfile::tempdir().unwrap();
    let engine = FakeEngine::with_playlist(Vec::new());
    let coordinator = make_coordinator(Arc::new(engine), dir.path());

    let id = coordinator.create_job(
        JobRequest::transcript("url"),
        Some("caller-id-42".to_string()),
    );
    assert_eq!(id, "caller-id-42");
    assert!(coordinator.get_result("caller-id-42").is_some());
}

#[tokio::test]
async fn download_job_registers_files_and_caps_quality() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = FakeEngine::with_playlist(vec![
        entry("v1", "Keeper"),
        PlaylistEntry {
            id: "bad1".to_string(),
            title: Some("Gone".to_string()),
            url: "https://www.youtube.com/watch?v=bad1".to_string(),
        },
    ]);
    engine.downloads_succeed = true;
    let engine = Arc::new(engine);
    let coordinator = make_coordinator(engine.clone(), dir.path());

    let request = JobRequest {
        url: "https://www.youtube.com/playlist?list=x".to_string(),
        mode: Mode::Video,
        quality: Quality::P720,
        expand_playlist: true,
        playlist_start: None,
        playlist_end: None,
        playlist_items: None,
        cookies_path: None,
    };
    let (_, events) = run_job(&coordinator, request).await;

    let summary = complete_summary(&events);
    assert_eq!(summary.extracted, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.files.len(), 1);
    assert_eq!(summary.strategy_used.as_deref(), Some("public (web client)"));
    assert_eq!(summary.skipped_videos[0].reason, "video removed or unavailable");
    assert!(summary.filename.is_none());

    // 720p requested, fake probe offers 480p and 1080p: cap resolves to 480
    let specs = engine.format_specs.lock().unwrap();
    assert!(specs.iter().all(|s| s.contains("height<=480")), "{:?}", specs);

    // File really exists under the media store
    let file = &summary.files[0];
    assert!(std::path::Path::new(&file.path).is_file());
}

fn make_state(engine: Arc<dyn ExtractionEngine>, dir: &Path) -> AppState {
    let transcripts = ArtifactStore::new(dir.join("output"), ArtifactKind::Transcript).unwrap();
    let media = ArtifactStore::new(dir.join("downloads"), ArtifactKind::Media).unwrap();
    std::fs::create_dir_all(dir.join("temp")).unwrap();
    std::fs::create_dir_all(dir.join("cookies")).unwrap();
    let coordinator = JobCoordinator::new(
        engine.clone(),
        transcripts.clone(),
        media.clone(),
        dir.join("temp"),
        &test_config(),
    );
    AppState {
        coordinator,
        engine,
        transcripts,
        media,
        cookies_dir: dir.join("cookies"),
        temp_dir: dir.join("temp"),
    }
}

#[tokio::test]
async fn unknown_artifact_returns_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let state = make_state(Arc::new(FakeEngine::default()), dir.path());

    let resp =
        handlers::download_artifact(State(state.clone()), UrlPath("never-made.txt".to_string()))
            .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp =
        handlers::download_media(State(state), UrlPath("../escape.txt".to_string())).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn extract_rejects_missing_and_foreign_urls() {
    let dir = tempfile::tempdir().unwrap();
    let state = make_state(Arc::new(FakeEngine::default()), dir.path());

    let resp = handlers::extract(
        State(state.clone()),
        Json(handlers::ExtractRequest {
            playlist_url: "".to_string(),
            use_sse: false,
            job_id: None,
        }),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = handlers::extract(
        State(state),
        Json(handlers::ExtractRequest {
            playlist_url: "https://example.com/watch?v=x".to_string(),
            use_sse: false,
            job_id: None,
        }),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn synchronous_extract_returns_summary_json() {
    let dir = tempfile::tempdir().unwrap();
    let engine = FakeEngine::with_playlist(vec![entry("v1", "Only")])
        .caption("v1", CaptionScript::Ok(vtt(SPEECH)));
    let state = make_state(Arc::new(engine), dir.path());

    let resp = handlers::extract(
        State(state),
        Json(handlers::ExtractRequest {
            playlist_url: "https://www.youtube.com/playlist?list=abc".to_string(),
            use_sse: false,
            job_id: None,
        }),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["total_videos"], 1);
    assert_eq!(json["extracted"], 1);
    assert!(json["filename"].as_str().unwrap().ends_with(".txt"));
    assert!(json["preview"].as_str().unwrap().contains("spoken words"));
}
