#[cfg(feature = "memory")]
pub mod memory;

use async_trait::async_trait;
use futures_core::Stream;
use std::pin::Pin;

use crate::{JobId, JobRecord, JobStatus, NewJob, RelayResult};

/// Type alias for boxed streams (stable Rust compatible)
pub type BoxStream<T> = Pin<Box<dyn Stream<Item = T> + Send + 'static>>;

/// Persistent job store consumed by the queue
///
/// The store is authoritative for which work still needs doing across
/// restarts; the queue itself only holds in-memory scheduling state.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a new job as `pending` and assign its identifier
    async fn create_job(&self, job: NewJob) -> RelayResult<JobId>;

    /// Move a job to a new status
    async fn update_job_status(&self, id: JobId, status: JobStatus) -> RelayResult<()>;

    /// Persist a progress percentage
    async fn update_job_progress(&self, id: JobId, percent: u8) -> RelayResult<()>;

    /// All jobs in any of the given statuses, oldest first
    async fn query_jobs_by_status(&self, statuses: &[JobStatus]) -> RelayResult<Vec<JobRecord>>;

    /// Get full job record (optional - for observability/debugging)
    async fn get_job(&self, id: JobId) -> RelayResult<JobRecord>;
}
