use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{JobId, JobStatus, OwnerId, RetryId};

/// Minimal stable event protocol for structured observability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JobEvent {
    /// Job was persisted and appended to the pending list
    Enqueued {
        job_id: JobId,
        owner: OwnerId,
        position: usize,
        at: DateTime<Utc>,
    },

    /// Non-terminal job found in the store on start
    Recovered {
        job_id: JobId,
        owner: OwnerId,
        previous: JobStatus,
        at: DateTime<Utc>,
    },

    /// Owner slot was denied, job went back to the tail
    Requeued {
        job_id: JobId,
        owner: OwnerId,
        at: DateTime<Utc>,
    },

    /// Job changed status
    StatusChanged {
        job_id: JobId,
        status: JobStatus,
        at: DateTime<Utc>,
    },

    /// An inline attempt failed and another will follow
    Retrying {
        job_id: JobId,
        attempt: u32,
        error: String,
        at: DateTime<Utc>,
    },

    /// Job completed successfully
    Completed {
        job_id: JobId,
        at: DateTime<Utc>,
    },

    /// Job failed permanently
    Failed {
        job_id: JobId,
        error: String,
        at: DateTime<Utc>,
    },

    /// Job was handed to the retry scheduler
    Deferred {
        job_id: JobId,
        retry_id: RetryId,
        at: DateTime<Utc>,
    },

    /// Retry scheduler gave up and notified the operator
    Escalated {
        retry_id: RetryId,
        owner: OwnerId,
        attempts: u32,
        at: DateTime<Utc>,
    },
}

impl JobEvent {
    /// Get event type name as string
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Enqueued { .. } => "enqueued",
            Self::Recovered { .. } => "recovered",
            Self::Requeued { .. } => "requeued",
            Self::StatusChanged { .. } => "status_changed",
            Self::Retrying { .. } => "retrying",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
            Self::Deferred { .. } => "deferred",
            Self::Escalated { .. } => "escalated",
        }
    }

    /// Get the job ID, when the event concerns a queued job
    pub fn job_id(&self) -> Option<JobId> {
        match self {
            Self::Enqueued { job_id, .. }
            | Self::Recovered { job_id, .. }
            | Self::Requeued { job_id, .. }
            | Self::StatusChanged { job_id, .. }
            | Self::Retrying { job_id, .. }
            | Self::Completed { job_id, .. }
            | Self::Failed { job_id, .. }
            | Self::Deferred { job_id, .. } => Some(*job_id),
            Self::Escalated { .. } => None,
        }
    }

    /// Get the timestamp from any event
    pub fn timestamp(&self) -> &DateTime<Utc> {
        match self {
            Self::Enqueued { at, .. }
            | Self::Recovered { at, .. }
            | Self::Requeued { at, .. }
            | Self::StatusChanged { at, .. }
            | Self::Retrying { at, .. }
            | Self::Completed { at, .. }
            | Self::Failed { at, .. }
            | Self::Deferred { at, .. }
            | Self::Escalated { at, .. } => at,
        }
    }

    /// Encode the event for log shipping
    #[cfg(feature = "json")]
    pub fn to_json(&self) -> crate::RelayResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}
