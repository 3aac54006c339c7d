use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use async_trait::async_trait;
use tracing::warn;

use crate::{JobId, backend::JobStore, transport::ProgressObserver};

/// Persists fetch progress for one job, skipping changes below `step`
pub(crate) struct JobProgress {
    store: Arc<dyn JobStore>,
    job_id: JobId,
    step: u8,
    last: AtomicU8,
}

impl JobProgress {
    pub fn new(store: Arc<dyn JobStore>, job_id: JobId, step: u8) -> Self {
        Self {
            store,
            job_id,
            step: step.max(1),
            last: AtomicU8::new(0),
        }
    }

    fn worth_persisting(&self, percent: u8) -> bool {
        let last = self.last.load(Ordering::Relaxed);
        percent != last && (percent == 100 || percent.abs_diff(last) >= self.step)
    }
}

#[async_trait]
impl ProgressObserver for JobProgress {
    async fn on_progress(&self, percent: u8) {
        let percent = percent.min(100);
        if !self.worth_persisting(percent) {
            return;
        }

        match self.store.update_job_progress(self.job_id, percent).await {
            Ok(()) => self.last.store(percent, Ordering::Relaxed),
            Err(e) => warn!(job_id = %self.job_id, "Failed to persist progress: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{JobStatus, MemoryJobStore, NewJob, OwnerId};

    #[tokio::test]
    async fn test_small_changes_are_throttled() {
        let store = MemoryJobStore::new();
        let id = store.create_job(NewJob::new(OwnerId(1), "src")).await.unwrap();
        let progress = JobProgress::new(Arc::new(store.clone()), id, 10);

        progress.on_progress(4).await;
        assert_eq!(store.get_job(id).await.unwrap().progress, 0);

        progress.on_progress(12).await;
        progress.on_progress(15).await;
        assert_eq!(store.get_job(id).await.unwrap().progress, 12);

        progress.on_progress(100).await;
        assert_eq!(store.get_job(id).await.unwrap().progress, 100);
    }

    #[tokio::test]
    async fn test_store_failures_are_swallowed() {
        let store = MemoryJobStore::new();
        let id = store.create_job(NewJob::new(OwnerId(1), "src")).await.unwrap();
        store.set_offline(true);

        let progress = JobProgress::new(Arc::new(store.clone()), id, 5);
        progress.on_progress(50).await;

        store.set_offline(false);
        let record = store.get_job(id).await.unwrap();
        assert_eq!(record.progress, 0);
        assert_eq!(record.status, JobStatus::Pending);
    }
}
