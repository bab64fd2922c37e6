// Progress events - the wire format streamed to a waiting client
//
// Events for one job are totally ordered; the terminal event
// (`complete` or `error`) is unique and always last. The emitter
// enforces those invariants so no pipeline bug can leak a regressing
// percentage or a second terminal frame to a client.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::engine::DownloadedFile;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    Status {
        message: String,
        percentage: u8,
    },
    Progress {
        current: usize,
        total: usize,
        percentage: u8,
        status: String,
        video_title: String,
    },
    Complete(JobSummary),
    Error {
        message: String,
    },
}

impl ProgressEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete(_) | Self::Error { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedVideo {
    pub title: String,
    pub reason: String,
}

/// Full job result carried by the terminal `complete` event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSummary {
    pub success: bool,
    pub total_videos: usize,
    pub extracted: usize,
    pub skipped: usize,
    pub preview: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    pub skipped_videos: Vec<SkippedVideo>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<DownloadedFile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy_used: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warnings: Option<String>,
}

/// Producer side of one job's progress channel.
///
/// Emission is fire-and-forget into an unbounded queue: the job never
/// blocks on a slow or absent consumer. Percentages and item counters
/// are clamped non-decreasing, and nothing goes out after the terminal
/// event.
pub struct JobEmitter {
    tx: mpsc::UnboundedSender<ProgressEvent>,
    last_percentage: u8,
    last_current: usize,
    terminal_sent: bool,
}

impl JobEmitter {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                last_percentage: 0,
                last_current: 0,
                terminal_sent: false,
            },
            rx,
        )
    }

    pub fn emit(&mut self, event: ProgressEvent) {
        if self.terminal_sent {
            tracing::warn!("dropping progress event emitted after terminal event");
            return;
        }

        let event = match event {
            ProgressEvent::Status {
                message,
                percentage,
            } => {
                let percentage = percentage.max(self.last_percentage).min(100);
                self.last_percentage = percentage;
                ProgressEvent::Status {
                    message,
                    percentage,
                }
            }
            ProgressEvent::Progress {
                current,
                total,
                percentage,
                status,
                video_title,
            } => {
                let percentage = percentage.max(self.last_percentage).min(100);
                let current = current.max(self.last_current);
                self.last_percentage = percentage;
                self.last_current = current;
                ProgressEvent::Progress {
                    current,
                    total,
                    percentage,
                    status,
                    video_title,
                }
            }
            terminal => {
                self.terminal_sent = true;
                terminal
            }
        };

        // A consumer may never attach; that's fine
        let _ = self.tx.send(event);
    }

    pub fn status(&mut self, message: impl Into<String>, percentage: u8) {
        self.emit(ProgressEvent::Status {
            message: message.into(),
            percentage,
        });
    }

    pub fn progress(
        &mut self,
        current: usize,
        total: usize,
        percentage: u8,
        status: impl Into<String>,
        video_title: impl Into<String>,
    ) {
        self.emit(ProgressEvent::Progress {
            current,
            total,
            percentage,
            status: status.into(),
            video_title: video_title.into(),
        });
    }

    pub fn complete(&mut self, summary: JobSummary) {
        self.emit(ProgressEvent::Complete(summary));
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.emit(ProgressEvent::Error {
            message: message.into(),
        });
    }
}
