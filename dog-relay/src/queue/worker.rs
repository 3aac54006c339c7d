use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    JobError, JobStatus, RelayError, RelayResult,
    retry::RetryRequest,
    transport::notify_quietly,
};
use super::{pending::QueuedJob, progress::JobProgress, RelayQueue};

/// Why an attempt stopped short of completion
enum AttemptError {
    /// The pipeline failed
    Job(JobError),
    /// The store no longer holds a runnable record for the job
    Stale(RelayError),
}

impl From<JobError> for AttemptError {
    fn from(err: JobError) -> Self {
        Self::Job(err)
    }
}

/// One worker task pulling from the shared pending list
pub(crate) struct Worker {
    pub id: usize,
    pub queue: RelayQueue,
    pub shutdown: CancellationToken,
}

impl Worker {
    /// Run the worker loop
    pub async fn run(self) {
        info!(worker = self.id, "Worker started");

        loop {
            let job = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                job = self.queue.pending.next() => job,
            };

            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    // Slots held by the dropped future are released here; the
                    // store still has the job for the next recovery.
                    warn!(worker = self.id, job_id = %job.id, "Worker stopped with job in flight");
                    break;
                }
                _ = self.dispatch(&job) => {}
            }
        }

        info!(worker = self.id, "Worker stopped");
    }

    /// Admit `job` through both gates, or put it back on the tail
    async fn dispatch(&self, job: &QueuedJob) {
        let admission = &self.queue.admission;

        // Registered before the owner check so a release in between is not missed
        let released = admission.owner_released();
        tokio::pin!(released);
        released.as_mut().enable();

        let Some(owner_slot) = admission.reserve_owner(job.owner, self.queue.config.per_owner_limit) else {
            debug!(job_id = %job.id, owner = %job.owner, "Owner at capacity, re-queueing");
            self.queue.pending.push_back(job.clone());
            self.queue.observability.record_requeued(job.id, job.owner);
            let _ = tokio::time::timeout(self.queue.config.requeue_backoff, released).await;
            return;
        };

        let global_slot = match admission.reserve_global().await {
            Ok(slot) => slot,
            Err(e) => {
                warn!(job_id = %job.id, "Global gate unavailable, job put back: {}", e);
                self.queue.pending.push_back(job.clone());
                // A closed gate never reopens; idle until the pool stops
                self.shutdown.cancelled().await;
                return;
            }
        };

        self.queue.observability.record_dispatched();
        self.execute(job).await;

        global_slot.release();
        owner_slot.release();
    }

    /// Run the job with inline retries, then record its final outcome
    #[instrument(skip(self, job), fields(worker = self.id, job_id = %job.id, owner = %job.owner))]
    async fn execute(&self, job: &QueuedJob) {
        let config = &self.queue.config;
        let mut failures = 0;

        let outcome = loop {
            match self.attempt(job).await {
                Ok(()) => break Ok(()),
                Err(AttemptError::Stale(e)) => {
                    warn!("Job dropped, store record is not runnable: {}", e);
                    return;
                }
                Err(AttemptError::Job(err)) => {
                    failures += 1;
                    if !err.is_retryable() || failures >= config.max_attempts {
                        break Err(err);
                    }

                    let delay = config.backoff_for(failures - 1);
                    warn!(
                        "Attempt {}/{} failed, retrying in {:?}: {}",
                        failures, config.max_attempts, delay, err
                    );
                    self.queue.observability.record_retrying(job.id, failures, err.message());
                    tokio::time::sleep(delay).await;
                }
            }
        };

        match outcome {
            Ok(()) => {
                self.queue.observability.record_completed(job.id);
                info!("Job completed");
            }
            Err(err) => self.fail(job, err).await,
        }
    }

    async fn attempt(&self, job: &QueuedJob) -> Result<(), AttemptError> {
        let queue = &self.queue;

        // A missing or terminal record means another run already owns the outcome
        if let Err(e @ (RelayError::JobNotFound(_) | RelayError::InvalidTransition { .. })) =
            self.set_status(job, JobStatus::Downloading).await
        {
            return Err(AttemptError::Stale(e));
        }
        let progress = JobProgress::new(Arc::clone(&queue.store), job.id, queue.config.progress_step);
        let artifact = queue.pipeline.fetch(&job.source, &job.format, &progress).await?;

        let _ = self.set_status(job, JobStatus::Uploading).await;
        queue.pipeline.deliver(job.destination(), &artifact, &job.caption).await?;

        let _ = self.set_status(job, JobStatus::Completed).await;
        Ok(())
    }

    /// Mark the job failed and tell its owner once
    async fn fail(&self, job: &QueuedJob, err: JobError) {
        let queue = &self.queue;
        let _ = self.set_status(job, JobStatus::Error).await;

        if let Some(retry) = queue.retry.as_ref().filter(|_| err.is_deferrable()) {
            let request = RetryRequest::new(job.owner, job.destination(), job.source.clone())
                .with_format(job.format.clone())
                .with_caption(job.caption.clone())
                .with_error(err.to_string());
            let retry_id = retry.add(request);

            warn!(retry_id = %retry_id, "Job handed to retry tier: {}", err);
            queue.observability.record_deferred(job.id, retry_id);
            notify_quietly(
                queue.notifier.as_ref(),
                job.destination(),
                &format!(
                    "We hit a temporary problem with {}. It will be retried automatically.",
                    job.source
                ),
            )
            .await;
            return;
        }

        error!("Job failed: {}", err);
        queue.observability.record_failed(job.id, err.message());
        notify_quietly(
            queue.notifier.as_ref(),
            job.destination(),
            &format!("Could not process {}: {}", job.source, err.user_message()),
        )
        .await;
    }

    async fn set_status(&self, job: &QueuedJob, status: JobStatus) -> RelayResult<()> {
        let result = self.queue.store.update_job_status(job.id, status).await;
        match &result {
            Ok(()) => self.queue.observability.record_status(job.id, status),
            Err(e) => warn!(job_id = %job.id, "Failed to persist status {}: {}", status, e),
        }
        result
    }
}
