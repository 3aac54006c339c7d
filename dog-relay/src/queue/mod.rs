//! Durable-intent job queue with a bounded worker pool.
//!
//! Jobs are persisted through a [`JobStore`] before they are queued in
//! memory, so the store stays authoritative across restarts. On start the
//! queue recovers every job that was still `pending`, `downloading` or
//! `uploading`, tells its owner, and queues it again in creation order.
//!
//! Workers pull from a single FIFO. A job whose owner is already at the
//! per-owner cap goes back on the tail so other owners keep moving; the
//! worker then waits for that owner to release a slot, bounded by
//! `requeue_backoff`, instead of spinning.

mod pending;
mod progress;
mod worker;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::{
    AdmissionController, JobEvent, JobId, JobRecord, JobStatus, NewJob, OwnerId, QueueConfig,
    RelayError, RelayResult,
    backend::{BoxStream, JobStore},
    observability::ObservabilityLayer,
    pipeline::RelayPipeline,
    retry::RetryScheduler,
    transport::{notify_quietly, Notifier},
};
use pending::{PendingList, QueuedJob};
use worker::Worker;

/// Result of a successful submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enqueued {
    pub job_id: JobId,
    /// 1-based position in the pending list at the time of submission
    pub position: usize,
}

/// Snapshot of admission and backlog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub capacity: usize,
    pub active: usize,
    pub waiting: usize,
    pub available: usize,
    /// Jobs submitted but not yet picked up by a worker
    pub pending: usize,
}

/// Handle for the running worker pool
pub struct WorkerPool {
    shutdown: CancellationToken,
    admission: AdmissionController,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Token cancelled on shutdown, for tasks that should stop with the pool
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Stop every worker and wait for them to exit
    ///
    /// In-flight jobs are abandoned and their slots released; the store
    /// still lists them for the next recovery. The global gate is closed,
    /// so anything still waiting on it fails with `WorkerShutdown`.
    pub async fn shutdown(self) -> RelayResult<()> {
        self.shutdown.cancel();
        self.admission.close();
        for result in join_all(self.handles).await {
            result.map_err(|e| RelayError::Internal(format!("Worker join error: {}", e)))?;
        }
        info!("Worker pool stopped");
        Ok(())
    }
}

/// Job queue front end shared by submitters and workers
#[derive(Clone)]
pub struct RelayQueue {
    store: Arc<dyn JobStore>,
    pipeline: RelayPipeline,
    notifier: Arc<dyn Notifier>,
    admission: AdmissionController,
    config: QueueConfig,
    pending: Arc<PendingList>,
    recovered: Arc<AtomicBool>,
    retry: Option<RetryScheduler>,
    observability: ObservabilityLayer,
}

impl RelayQueue {
    pub fn new(
        store: Arc<dyn JobStore>,
        pipeline: RelayPipeline,
        notifier: Arc<dyn Notifier>,
        admission: AdmissionController,
        config: QueueConfig,
    ) -> Self {
        Self {
            store,
            pipeline,
            notifier,
            admission,
            config,
            pending: Arc::new(PendingList::default()),
            recovered: Arc::new(AtomicBool::new(false)),
            retry: None,
            observability: ObservabilityLayer::new(),
        }
    }

    /// Hand jobs that fail inline with a non-permanent error to `scheduler`
    pub fn with_retry_scheduler(mut self, scheduler: RetryScheduler) -> Self {
        self.retry = Some(scheduler);
        self
    }

    pub fn with_observability(mut self, observability: ObservabilityLayer) -> Self {
        self.observability = observability;
        self
    }

    /// Persist a job and queue it, returning its position
    #[instrument(skip(self, job), fields(owner = %job.owner))]
    pub async fn enqueue(&self, job: NewJob) -> RelayResult<Enqueued> {
        self.check_backlog(job.owner)?;

        let job_id = self.store.create_job(job.clone()).await?;
        let record = JobRecord::new(job_id, job);
        let position = self.pending.push_back(QueuedJob::from(&record));

        self.observability.record_enqueued(job_id, record.owner, position);
        info!(job_id = %job_id, "Enqueued {} at position {}", record.source, position);
        Ok(Enqueued { job_id, position })
    }

    fn check_backlog(&self, owner: OwnerId) -> RelayResult<()> {
        if let Some(max) = self.config.max_pending {
            if self.pending.len() >= max {
                return Err(RelayError::QueueFull { max });
            }
        }
        if let Some(max) = self.config.max_pending_per_owner {
            if self.pending.count_for(owner) >= max {
                return Err(RelayError::OwnerLimit { owner, max });
            }
        }
        Ok(())
    }

    /// 1-based position of a waiting job, or 0 if it is not waiting
    pub fn get_position(&self, job_id: JobId) -> usize {
        self.pending.position(job_id)
    }

    /// Ids of waiting jobs in dispatch order
    pub fn pending_jobs(&self) -> Vec<JobId> {
        self.pending.ids()
    }

    pub fn get_queue_stats(&self) -> QueueStats {
        let admission = self.admission.stats();
        QueueStats {
            capacity: admission.capacity,
            active: admission.active,
            waiting: admission.waiting,
            available: admission.available,
            pending: self.pending.len(),
        }
    }

    /// Re-queue every job a previous process left unfinished
    ///
    /// Runs once per queue; later calls return 0. Jobs this process has
    /// already queued are skipped. Each owner is told before their job is
    /// queued again. Returns how many jobs were recovered.
    #[instrument(skip(self))]
    pub async fn recover(&self) -> RelayResult<usize> {
        if self.recovered.swap(true, Ordering::SeqCst) {
            return Ok(0);
        }

        let orphans = match self.store.query_jobs_by_status(&JobStatus::RECOVERABLE).await {
            Ok(orphans) => orphans,
            Err(e) => {
                self.recovered.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };
        let orphans: Vec<JobRecord> = orphans
            .into_iter()
            .filter(|record| !self.pending.contains(record.id))
            .collect();
        if orphans.is_empty() {
            return Ok(0);
        }

        info!("Recovering {} unfinished jobs", orphans.len());
        for record in &orphans {
            let job = QueuedJob::from(record);
            notify_quietly(
                self.notifier.as_ref(),
                job.destination(),
                &format!(
                    "Your request {} was interrupted by a restart and has been queued again.",
                    record.source
                ),
            )
            .await;

            let position = self.pending.push_back(job);
            self.observability.record_recovered(record.id, record.owner, record.status);
            info!(job_id = %record.id, "Recovered {} job at position {}", record.status, position);
        }
        Ok(orphans.len())
    }

    /// Recover unfinished jobs, then start the worker pool
    pub async fn start(&self) -> RelayResult<WorkerPool> {
        self.config.validate()?;
        if self.admission.capacity() < self.config.workers {
            warn!(
                "Global capacity {} is below worker count {}; extra workers will wait",
                self.admission.capacity(),
                self.config.workers
            );
        }

        self.recover().await?;

        let shutdown = CancellationToken::new();
        let handles = (0..self.config.workers)
            .map(|id| {
                let worker = Worker {
                    id,
                    queue: self.clone(),
                    shutdown: shutdown.clone(),
                };
                tokio::spawn(worker.run())
            })
            .collect();

        info!("Started {} workers", self.config.workers);
        Ok(WorkerPool {
            shutdown,
            admission: self.admission.clone(),
            handles,
        })
    }

    pub fn event_stream(&self) -> BoxStream<JobEvent> {
        self.observability.event_stream()
    }

    pub fn observability(&self) -> &ObservabilityLayer {
        &self.observability
    }

    pub fn admission(&self) -> &AdmissionController {
        &self.admission
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tracing_test::traced_test;
    use crate::{
        Destination, JobError, MemoryJobStore,
        transport::{Artifact, Deliverer, Fetcher, ProgressObserver},
    };

    struct Unused;

    #[async_trait]
    impl Fetcher for Unused {
        async fn fetch(&self, _: &str, _: &str, _: &dyn ProgressObserver) -> Result<Artifact, JobError> {
            Err(JobError::permanent("unused"))
        }
    }

    #[async_trait]
    impl Deliverer for Unused {
        async fn deliver(&self, _: Destination, _: &Artifact, _: &str) -> Result<(), JobError> {
            Ok(())
        }
    }

    #[async_trait]
    impl Notifier for Unused {
        async fn notify(&self, _: Destination, _: &str) -> Result<(), JobError> {
            Ok(())
        }
    }

    fn queue(config: QueueConfig) -> RelayQueue {
        queue_with_store(MemoryJobStore::new(), config)
    }

    fn queue_with_store(store: MemoryJobStore, config: QueueConfig) -> RelayQueue {
        let pipeline = RelayPipeline::new(Arc::new(Unused), Arc::new(Unused));
        RelayQueue::new(
            Arc::new(store),
            pipeline,
            Arc::new(Unused),
            AdmissionController::new(config.global_capacity),
            config,
        )
    }

    #[tokio::test]
    async fn test_backlog_limits_reject_submissions() {
        let queue = queue(
            QueueConfig::default()
                .with_max_pending(3)
                .with_max_pending_per_owner(2),
        );

        queue.enqueue(NewJob::new(OwnerId(1), "a")).await.unwrap();
        queue.enqueue(NewJob::new(OwnerId(1), "b")).await.unwrap();
        let err = queue.enqueue(NewJob::new(OwnerId(1), "c")).await.unwrap_err();
        assert!(matches!(err, RelayError::OwnerLimit { max: 2, .. }));

        queue.enqueue(NewJob::new(OwnerId(2), "d")).await.unwrap();
        let err = queue.enqueue(NewJob::new(OwnerId(3), "e")).await.unwrap_err();
        assert!(matches!(err, RelayError::QueueFull { max: 3 }));
        assert!(err.is_capacity_rejection());
        assert_eq!(queue.get_queue_stats().pending, 3);
    }

    #[tokio::test]
    async fn test_recover_with_empty_store() {
        let queue = queue(QueueConfig::default());
        assert_eq!(queue.recover().await.unwrap(), 0);
        assert!(queue.pending_jobs().is_empty());
    }

    #[tokio::test]
    #[traced_test]
    async fn test_recover_logs_requeued_jobs() {
        let store = MemoryJobStore::new();
        let mut record = JobRecord::new(JobId(3), NewJob::new(OwnerId(1), "src"));
        record.status = JobStatus::Downloading;
        store.insert_record(record);

        let queue = queue_with_store(store, QueueConfig::default());
        assert_eq!(queue.recover().await.unwrap(), 1);
        assert_eq!(queue.pending_jobs(), vec![JobId(3)]);
        assert_eq!(queue.get_position(JobId(3)), 1);
        assert!(logs_contain("Recovering 1 unfinished jobs"));
    }

    #[tokio::test]
    async fn test_recover_skips_jobs_already_queued() {
        let queue = queue(QueueConfig::default());
        let receipt = queue.enqueue(NewJob::new(OwnerId(1), "fresh")).await.unwrap();

        assert_eq!(queue.recover().await.unwrap(), 0);
        assert_eq!(queue.pending_jobs(), vec![receipt.job_id]);
        assert_eq!(queue.get_position(receipt.job_id), 1);
    }

    #[tokio::test]
    async fn test_recover_runs_once() {
        let store = MemoryJobStore::new();
        let mut record = JobRecord::new(JobId(5), NewJob::new(OwnerId(2), "src"));
        record.status = JobStatus::Uploading;
        store.insert_record(record);

        let queue = queue_with_store(store, QueueConfig::default());
        assert_eq!(queue.recover().await.unwrap(), 1);
        assert_eq!(queue.recover().await.unwrap(), 0);
        assert_eq!(queue.pending_jobs(), vec![JobId(5)]);
    }
}
