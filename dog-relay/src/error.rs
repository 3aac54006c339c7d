use std::time::Duration;
use thiserror::Error;

use crate::types::{JobId, JobStatus, OwnerId};

/// Result type for relay operations
pub type RelayResult<T> = Result<T, RelayError>;

/// Infrastructure and admission errors surfaced to callers
#[derive(Error, Debug, Clone)]
pub enum RelayError {
    #[error("Queue is full ({max} pending jobs)")]
    QueueFull { max: usize },

    #[error("Owner {owner} already has {max} pending jobs")]
    OwnerLimit { owner: OwnerId, max: usize },

    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("Job store error: {0}")]
    Store(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Worker shutdown")]
    WorkerShutdown,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RelayError {
    /// Capacity rejections are never retried automatically
    pub fn is_capacity_rejection(&self) -> bool {
        matches!(self, Self::QueueFull { .. } | Self::OwnerLimit { .. })
    }
}

/// Job execution outcome - determines retry behavior
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    /// Network blip, timeout: retried inline, then optionally by the retry tier
    #[error("Transient error: {0}")]
    Transient(String),

    /// Bad source, no artifact produced: fail immediately, no retry
    #[error("Permanent error: {0}")]
    Permanent(String),

    /// Dependency known to be broken (circuit open): no further inline attempts
    #[error("Dependency unavailable: {0}")]
    Unavailable(String),
}

impl JobError {
    /// Create a transient error
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    /// Create a permanent error
    pub fn permanent(msg: impl Into<String>) -> Self {
        Self::Permanent(msg.into())
    }

    /// Create an unavailable error
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    /// Check if an inline retry may change the outcome
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Check if the slower retry tier may change the outcome
    pub fn is_deferrable(&self) -> bool {
        !matches!(self, Self::Permanent(_))
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        match self {
            Self::Transient(msg) | Self::Permanent(msg) | Self::Unavailable(msg) => msg,
        }
    }

    /// Short explanation suitable for the requester
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Transient(_) => "the source could not be reached right now",
            Self::Permanent(_) => "this link could not be processed",
            Self::Unavailable(_) => "the service is temporarily unavailable",
        }
    }
}

/// Error returned by a circuit-guarded call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CircuitError<E> {
    /// Rejected without invoking the operation
    #[error("Circuit '{name}' is open (retry in {retry_in:?})")]
    Open { name: String, retry_in: Duration },

    /// The operation ran and failed
    #[error(transparent)]
    Inner(E),
}

impl<E> CircuitError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open { .. })
    }

    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(e) => Some(e),
            Self::Open { .. } => None,
        }
    }
}

impl From<CircuitError<JobError>> for JobError {
    fn from(err: CircuitError<JobError>) -> Self {
        match err {
            CircuitError::Open { name, .. } => {
                JobError::Unavailable(format!("circuit '{}' is open", name))
            }
            CircuitError::Inner(e) => e,
        }
    }
}

#[cfg(feature = "json")]
impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}
