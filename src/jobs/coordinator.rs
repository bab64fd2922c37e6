// Job coordinator - registry, state machine and processing pipeline
//
// One coordinator owns every in-flight job through an explicit
// registry keyed by job id; there is no "current job" global. Items
// within a job are processed sequentially to respect provider rate
// limits; distinct jobs run concurrently in independent tasks. A
// failing item becomes a skip entry and never aborts the batch; only
// resolution failures and artifact-write failures are job-terminal.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::sleep;

use crate::config::Config;
use crate::download::{self, ItemDownload, RetryPolicy};
use crate::engine::{classify_skip, DownloadedFile, ExtractionEngine, Mode, PlaylistEntry};
use crate::store::{short_tag, ArtifactStore};
use crate::transcript;

use super::events::{JobEmitter, JobSummary, ProgressEvent, SkippedVideo};
use super::model::{ItemOutcome, Job, JobId, JobItem, JobRequest, JobState};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

struct JobEntry {
    job: Mutex<Job>,
    /// Receiver side of the progress channel; handed out at most once
    events: Mutex<Option<UnboundedReceiver<ProgressEvent>>>,
}

struct Inner {
    jobs: Mutex<HashMap<JobId, Arc<JobEntry>>>,
    engine: Arc<dyn ExtractionEngine>,
    transcripts: ArtifactStore,
    media: ArtifactStore,
    workdir: PathBuf,
    playlist_cap: usize,
    item_delay: Duration,
    retry: RetryPolicy,
}

#[derive(Clone)]
pub struct JobCoordinator {
    inner: Arc<Inner>,
}

impl JobCoordinator {
    pub fn new(
        engine: Arc<dyn ExtractionEngine>,
        transcripts: ArtifactStore,
        media: ArtifactStore,
        workdir: PathBuf,
        config: &Config,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                jobs: Mutex::new(HashMap::new()),
                engine,
                transcripts,
                media,
                workdir,
                playlist_cap: config.playlist_cap,
                item_delay: config.item_delay,
                retry: RetryPolicy::default(),
            }),
        }
    }

    /// Allocate a job and start processing in the background.
    /// Returns immediately with the job id.
    pub fn create_job(&self, request: JobRequest, job_id: Option<String>) -> JobId {
        let id = job_id
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let (emitter, rx) = JobEmitter::channel();
        let entry = Arc::new(JobEntry {
            job: Mutex::new(Job::new(id.clone())),
            events: Mutex::new(Some(rx)),
        });
        lock(&self.inner.jobs).insert(id.clone(), entry.clone());

        let inner = self.inner.clone();
        tokio::spawn(async move {
            process_job(inner, entry, request, emitter).await;
        });

        id
    }

    /// Take the job's progress stream. At most one live listener is
    /// supported; a second attach gets None. The job runs to
    /// completion whether or not anyone attaches.
    pub fn attach_progress(&self, job_id: &str) -> Option<UnboundedReceiver<ProgressEvent>> {
        let entry = lock(&self.inner.jobs).get(job_id).cloned()?;
        let rx = lock(&entry.events).take();
        rx
    }

    /// Snapshot of the job's current state.
    pub fn get_result(&self, job_id: &str) -> Option<Job> {
        let entry = lock(&self.inner.jobs).get(job_id).cloned()?;
        let job = lock(&entry.job).clone();
        Some(job)
    }
}

fn set_state(entry: &JobEntry, state: JobState) {
    lock(&entry.job).state = state;
}

fn mark_success(entry: &JobEntry, idx0: usize) {
    let mut job = lock(&entry.job);
    if let Some(item) = job.items.get_mut(idx0) {
        item.outcome = ItemOutcome::Success;
    }
    job.counters.succeeded += 1;
}

fn mark_skipped(entry: &JobEntry, idx0: usize, reason: &str) {
    let mut job = lock(&entry.job);
    if let Some(item) = job.items.get_mut(idx0) {
        item.outcome = ItemOutcome::Skipped;
        item.skip_reason = Some(reason.to_string());
    }
    job.counters.skipped += 1;
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        s.chars().take(max).collect()
    } else {
        s.to_string()
    }
}

/// Apply the request's playlist slice and item selector to the
/// resolved sequence (positions are 1-based, pre-slice).
fn apply_selection(entries: Vec<PlaylistEntry>, request: &JobRequest) -> Vec<PlaylistEntry> {
    entries
        .into_iter()
        .enumerate()
        .filter(|(i, _)| {
            let pos = (*i + 1) as u32;
            if let Some(start) = request.playlist_start {
                if pos < start {
                    return false;
                }
            }
            if let Some(end) = request.playlist_end {
                if pos > end {
                    return false;
                }
            }
            if let Some(selector) = &request.playlist_items {
                if !selector.contains(pos) {
                    return false;
                }
            }
            true
        })
        .map(|(_, e)| e)
        .collect()
}

enum ItemResult {
    Transcript(String),
    Files {
        files: Vec<DownloadedFile>,
        strategy: String,
    },
    Skip(String),
}

async fn process_item(inner: &Inner, request: &JobRequest, item: &PlaylistEntry) -> ItemResult {
    match request.mode {
        Mode::Transcript => {
            let mut attempt = 1u32;
            loop {
                match inner.engine.fetch_captions(item, &inner.workdir).await {
                    Ok(vtt) => {
                        return match transcript::clean_vtt(&vtt) {
                            Some(text) => ItemResult::Transcript(text),
                            None => ItemResult::Skip("no clear speech detected".to_string()),
                        };
                    }
                    Err(e) => {
                        let message = e.message();
                        let reason = classify_skip(&message);
                        if reason.is_transient() {
                            if let Some(delay) = inner.retry.backoff(attempt) {
                                tracing::debug!(video = %item.id, ?reason, "transient failure, retrying");
                                sleep(delay).await;
                                attempt += 1;
                                continue;
                            }
                        }
                        tracing::debug!(video = %item.id, ?reason, "item skipped");
                        return ItemResult::Skip(reason.label().to_string());
                    }
                }
            }
        }
        mode => {
            let item_req = ItemDownload {
                url: item.url.clone(),
                mode,
                quality: request.quality,
                cookies_path: request.cookies_path.clone(),
            };
            let tag = short_tag();
            match download::run(
                inner.engine.as_ref(),
                &item_req,
                inner.media.root(),
                &tag,
                &inner.retry,
            )
            .await
            {
                Ok(outcome) => ItemResult::Files {
                    files: outcome.files,
                    strategy: outcome.strategy_used,
                },
                Err(failure) => {
                    tracing::debug!(video = %item.id, reason = ?failure.reason, "download skipped");
                    ItemResult::Skip(failure.reason.label().to_string())
                }
            }
        }
    }
}

async fn process_job(
    inner: Arc<Inner>,
    entry: Arc<JobEntry>,
    request: JobRequest,
    mut emitter: JobEmitter,
) {
    let job_id = lock(&entry.job).id.clone();
    tracing::info!(
        job = %job_id,
        url = %request.url,
        mode = ?request.mode,
        engine = %inner.engine.name(),
        "job started"
    );

    set_state(&entry, JobState::Resolving);
    emitter.status("Fetching playlist information...", 5);

    let resolved = if request.expand_playlist {
        match inner
            .engine
            .resolve_playlist(&request.url, inner.playlist_cap)
            .await
        {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(job = %job_id, error = %e, "resolution failed");
                set_state(&entry, JobState::Failed);
                emitter.error(e.to_string());
                return;
            }
        }
    } else {
        vec![PlaylistEntry::from_url(&request.url)]
    };

    let selected = apply_selection(resolved, &request);
    let total = selected.len();

    {
        let mut job = lock(&entry.job);
        job.counters.total = total;
        job.items = selected
            .iter()
            .enumerate()
            .map(|(i, e)| JobItem {
                index: i + 1,
                url: e.url.clone(),
                title: e.title.clone(),
                outcome: ItemOutcome::Pending,
                skip_reason: None,
            })
            .collect();
        job.state = JobState::Processing;
    }

    if total == 0 {
        // An empty playlist is a normal completion, not an error
        set_state(&entry, JobState::Done);
        emitter.complete(JobSummary {
            success: true,
            total_videos: 0,
            extracted: 0,
            skipped: 0,
            preview: String::new(),
            filename: None,
            skipped_videos: Vec::new(),
            files: Vec::new(),
            strategy_used: None,
            warnings: None,
        });
        tracing::info!(job = %job_id, "job finished (empty playlist)");
        return;
    }

    emitter.progress(0, total, 0, "Starting...", "");

    let mut sections: Vec<(String, String)> = Vec::new();
    let mut skipped_videos: Vec<SkippedVideo> = Vec::new();
    let mut all_files: Vec<DownloadedFile> = Vec::new();
    let mut strategy_used: Option<String> = None;

    for (idx0, item) in selected.iter().enumerate() {
        let index = idx0 + 1;
        let title = item
            .title
            .clone()
            .unwrap_or_else(|| "Fetching metadata...".to_string());
        let working_status = match request.mode {
            Mode::Transcript => "Downloading subtitle",
            _ => "Downloading media",
        };

        let pct_before = (((index - 1) * 100) / total) as u8;
        emitter.progress(index - 1, total, pct_before, working_status, title.clone());

        let result = process_item(&inner, &request, item).await;

        let pct_after = ((index * 100) / total) as u8;
        match result {
            ItemResult::Transcript(text) => {
                sections.push((title.clone(), text));
                mark_success(&entry, idx0);
                emitter.progress(index, total, pct_after, "Extracted transcript", title);
            }
            ItemResult::Files { files, strategy } => {
                for file in &files {
                    if let Err(e) = inner.media.register(Path::new(&file.path)).await {
                        tracing::warn!(job = %job_id, file = %file.name, error = %e, "failed to register downloaded file");
                    }
                }
                all_files.extend(files);
                if strategy_used.is_none() {
                    strategy_used = Some(strategy);
                }
                mark_success(&entry, idx0);
                emitter.progress(index, total, pct_after, "Downloaded", title);
            }
            ItemResult::Skip(reason) => {
                skipped_videos.push(SkippedVideo {
                    title: title.clone(),
                    reason: reason.clone(),
                });
                mark_skipped(&entry, idx0, &reason);
                emitter.progress(
                    index,
                    total,
                    pct_after,
                    format!("Skipped: {}", truncate(&reason, 50)),
                    title,
                );
            }
        }

        // Pacing between provider calls
        if index < total && !inner.item_delay.is_zero() {
            sleep(inner.item_delay).await;
        }
    }

    set_state(&entry, JobState::Completing);

    let summary = match request.mode {
        Mode::Transcript => {
            emitter.status("Combining transcripts...", 95);
            let combined = transcript::combine(&sections);
            match inner
                .transcripts
                .put("playlist_transcripts.txt", combined.as_bytes())
                .await
            {
                Ok(artifact) => {
                    let filename = artifact.filename.clone();
                    lock(&entry.job).artifact = Some(artifact);
                    JobSummary {
                        success: true,
                        total_videos: total,
                        extracted: sections.len(),
                        skipped: skipped_videos.len(),
                        preview: transcript::preview(&combined),
                        filename: Some(filename),
                        skipped_videos,
                        files: Vec::new(),
                        strategy_used: None,
                        warnings: None,
                    }
                }
                Err(e) => {
                    tracing::error!(job = %job_id, error = %e, "failed to write transcript artifact");
                    set_state(&entry, JobState::Failed);
                    emitter.error(format!("Failed to write transcript artifact: {}", e));
                    return;
                }
            }
        }
        _ => {
            let counters = lock(&entry.job).counters;
            JobSummary {
                success: true,
                total_videos: total,
                extracted: counters.succeeded,
                skipped: counters.skipped,
                preview: String::new(),
                filename: None,
                skipped_videos,
                files: all_files,
                strategy_used,
                warnings: None,
            }
        }
    };

    set_state(&entry, JobState::Done);
    emitter.complete(summary);
    tracing::info!(job = %job_id, "job finished");
}
