use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use crate::{
    RelayResult, RelayError, JobId, JobRecord, JobStatus, NewJob,
    backend::JobStore,
};

/// In-memory job store for testing and development
#[derive(Clone)]
pub struct MemoryJobStore {
    /// Job records indexed by id
    jobs: Arc<RwLock<HashMap<JobId, JobRecord>>>,

    /// Last assigned identifier
    next_id: Arc<AtomicI64>,

    /// When set, every call fails with a store error
    offline: Arc<AtomicBool>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            next_id: Arc::new(AtomicI64::new(0)),
            offline: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Insert a record as-is, e.g. to simulate state left by a previous process
    pub fn insert_record(&self, record: JobRecord) {
        self.next_id.fetch_max(record.id.get(), Ordering::SeqCst);
        self.jobs.write().insert(record.id, record);
    }

    /// Simulate an unreachable store
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of stored jobs
    pub fn len(&self) -> usize {
        self.jobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.read().is_empty()
    }

    fn check_online(&self) -> RelayResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(RelayError::Store("store is offline".to_string()));
        }
        Ok(())
    }
}

impl Default for MemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create_job(&self, job: NewJob) -> RelayResult<JobId> {
        self.check_online()?;

        let id = JobId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.jobs.write().insert(id, JobRecord::new(id, job));

        debug!("Created job {}", id);
        Ok(id)
    }

    async fn update_job_status(&self, id: JobId, status: JobStatus) -> RelayResult<()> {
        self.check_online()?;

        let mut jobs = self.jobs.write();
        let record = jobs.get_mut(&id).ok_or(RelayError::JobNotFound(id))?;

        if record.status == status {
            return Ok(());
        }
        if !record.status.can_transition_to(status) {
            return Err(RelayError::InvalidTransition {
                from: record.status,
                to: status,
            });
        }

        record.update_status(status);
        Ok(())
    }

    async fn update_job_progress(&self, id: JobId, percent: u8) -> RelayResult<()> {
        self.check_online()?;

        let mut jobs = self.jobs.write();
        let record = jobs.get_mut(&id).ok_or(RelayError::JobNotFound(id))?;
        record.update_progress(percent);
        Ok(())
    }

    async fn query_jobs_by_status(&self, statuses: &[JobStatus]) -> RelayResult<Vec<JobRecord>> {
        self.check_online()?;

        let jobs = self.jobs.read();
        let mut matching: Vec<JobRecord> = jobs
            .values()
            .filter(|record| statuses.contains(&record.status))
            .cloned()
            .collect();

        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(matching)
    }

    async fn get_job(&self, id: JobId) -> RelayResult<JobRecord> {
        self.check_online()?;

        self.jobs.read().get(&id).cloned().ok_or(RelayError::JobNotFound(id))
    }
}
