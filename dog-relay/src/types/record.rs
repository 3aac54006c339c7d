use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{JobId, OwnerId};

/// Job status lifecycle
///
/// `Pending -> Downloading -> Uploading -> Completed`, with `Error`
/// reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job is persisted and waiting for a worker
    Pending,

    /// Worker is retrieving the source
    Downloading,

    /// Worker is relaying the artifact to the requester
    Uploading,

    /// Artifact was delivered
    Completed,

    /// Job failed permanently
    Error,
}

impl JobStatus {
    /// Statuses that survive a crash and must be recovered on start
    pub const RECOVERABLE: [JobStatus; 3] = [Self::Pending, Self::Downloading, Self::Uploading];

    /// Check if the job is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    /// Check if a worker currently owns the job
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Downloading | Self::Uploading)
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Downloading => 1,
            Self::Uploading => 2,
            Self::Completed => 3,
            Self::Error => 3,
        }
    }

    /// Check whether moving to `next` keeps the lifecycle monotonic
    ///
    /// Re-entering `Downloading` from `Uploading` is allowed: an inline
    /// retry restarts the whole download-then-upload sequence.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            Self::Error => true,
            Self::Downloading => self.is_active() || *self == Self::Pending,
            _ => next.rank() == self.rank() + 1,
        }
    }

    /// Get the status name as a string
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Downloading => "downloading",
            Self::Uploading => "uploading",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Submission data for a new job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewJob {
    /// Requester that owns the job
    pub owner: OwnerId,

    /// Opaque source reference, usually a URL
    pub source: String,

    /// Human-readable title used as delivery caption
    pub title: String,

    /// Target-format selector understood by the fetcher
    pub format: String,
}

impl NewJob {
    pub fn new(owner: OwnerId, source: impl Into<String>) -> Self {
        Self {
            owner,
            source: source.into(),
            title: String::new(),
            format: "best".to_string(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }
}

/// Job record - persisted state owned by the job store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Store-assigned identifier
    pub id: JobId,

    pub owner: OwnerId,

    pub source: String,

    pub title: String,

    pub format: String,

    /// Current job status
    pub status: JobStatus,

    /// Progress percentage (0-100)
    pub progress: u8,

    /// When the job was created
    pub created_at: DateTime<Utc>,

    /// When the job was last updated
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    /// Create a pending record for a submission
    pub fn new(id: JobId, job: NewJob) -> Self {
        let now = Utc::now();
        Self {
            id,
            owner: job.owner,
            source: job.source,
            title: job.title,
            format: job.format,
            status: JobStatus::Pending,
            progress: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Caption used when delivering the artifact
    pub fn caption(&self) -> &str {
        if self.title.is_empty() {
            &self.source
        } else {
            &self.title
        }
    }

    /// Update the job status and timestamp
    pub fn update_status(&mut self, status: JobStatus) {
        self.status = status;
        if status == JobStatus::Completed {
            self.progress = 100;
        }
        self.updated_at = Utc::now();
    }

    /// Update progress, clamped to 100
    pub fn update_progress(&mut self, percent: u8) {
        self.progress = percent.min(100);
        self.updated_at = Utc::now();
    }
}
