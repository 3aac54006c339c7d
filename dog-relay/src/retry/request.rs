use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::{Destination, OwnerId, RetryId};

/// A failed request handed to the slow retry tier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryRequest {
    pub owner: OwnerId,
    /// Where the artifact and notices go
    pub destination: Destination,
    pub source: String,
    pub format: String,
    pub caption: String,
    /// Error that made the caller give up
    pub last_error: Option<String>,
    /// Overrides the scheduler's default attempt budget
    pub max_attempts: Option<u32>,
}

impl RetryRequest {
    pub fn new(owner: OwnerId, destination: Destination, source: impl Into<String>) -> Self {
        Self {
            owner,
            destination,
            source: source.into(),
            format: "best".to_string(),
            caption: String::new(),
            last_error: None,
            max_attempts: None,
        }
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = caption.into();
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.last_error = Some(error.into());
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }
}

/// Scheduler-side state of a parked request
#[derive(Debug, Clone)]
pub struct PendingRetry {
    pub id: RetryId,
    pub request: RetryRequest,
    /// Attempts made by the scheduler so far
    pub attempt: u32,
    pub max_attempts: u32,
    pub created_at: DateTime<Utc>,
    /// Creation time until the first attempt
    pub last_attempt: Instant,
    pub last_error: Option<String>,
}

impl PendingRetry {
    pub(crate) fn new(request: RetryRequest, default_max_attempts: u32) -> Self {
        let max_attempts = request.max_attempts.unwrap_or(default_max_attempts).max(1);
        let last_error = request.last_error.clone();
        Self {
            id: RetryId::new(),
            request,
            attempt: 0,
            max_attempts,
            created_at: Utc::now(),
            last_attempt: Instant::now(),
            last_error,
        }
    }

    /// No attempts left; the request must be escalated
    pub fn is_exhausted(&self) -> bool {
        self.attempt >= self.max_attempts
    }
}
