// Job orchestration core

pub mod coordinator;
pub mod events;
pub mod model;

pub use coordinator::JobCoordinator;
pub use events::{JobEmitter, JobSummary, ProgressEvent, SkippedVideo};
pub use model::{Counters, ItemOutcome, ItemSelector, Job, JobId, JobItem, JobRequest, JobState};
