use std::sync::Arc;
use chrono::Utc;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::debug;

use crate::{JobEvent, JobId, JobStatus, OwnerId, RetryId};
use crate::backend::BoxStream;
use super::LiveMetrics;

/// Event broadcast plus live counters, shared by the queue and retry tier
#[derive(Clone)]
pub struct ObservabilityLayer {
    event_broadcaster: broadcast::Sender<JobEvent>,
    metrics: Arc<LiveMetrics>,
}

impl ObservabilityLayer {
    /// Create new observability layer
    pub fn new() -> Self {
        let (event_broadcaster, _) = broadcast::channel(10000);

        Self {
            event_broadcaster,
            metrics: Arc::new(LiveMetrics::new()),
        }
    }

    fn emit(&self, event: JobEvent) {
        debug!("Recorded {} event", event.event_name());
        let _ = self.event_broadcaster.send(event);
    }

    pub fn record_enqueued(&self, job_id: JobId, owner: OwnerId, position: usize) {
        self.metrics.increment_enqueued();
        self.emit(JobEvent::Enqueued { job_id, owner, position, at: Utc::now() });
    }

    pub fn record_recovered(&self, job_id: JobId, owner: OwnerId, previous: JobStatus) {
        self.metrics.increment_recovered();
        self.emit(JobEvent::Recovered { job_id, owner, previous, at: Utc::now() });
    }

    pub fn record_dispatched(&self) {
        self.metrics.increment_dispatched();
    }

    pub fn record_requeued(&self, job_id: JobId, owner: OwnerId) {
        self.metrics.increment_requeued();
        self.emit(JobEvent::Requeued { job_id, owner, at: Utc::now() });
    }

    pub fn record_status(&self, job_id: JobId, status: JobStatus) {
        self.emit(JobEvent::StatusChanged { job_id, status, at: Utc::now() });
    }

    pub fn record_retrying(&self, job_id: JobId, attempt: u32, error: &str) {
        self.metrics.increment_inline_retries();
        self.emit(JobEvent::Retrying {
            job_id,
            attempt,
            error: error.to_string(),
            at: Utc::now(),
        });
    }

    pub fn record_completed(&self, job_id: JobId) {
        self.metrics.increment_completed();
        self.emit(JobEvent::Completed { job_id, at: Utc::now() });
    }

    pub fn record_failed(&self, job_id: JobId, error: &str) {
        self.metrics.increment_failed();
        self.emit(JobEvent::Failed { job_id, error: error.to_string(), at: Utc::now() });
    }

    pub fn record_deferred(&self, job_id: JobId, retry_id: RetryId) {
        self.metrics.increment_deferred();
        self.emit(JobEvent::Deferred { job_id, retry_id, at: Utc::now() });
    }

    pub fn record_retry_succeeded(&self) {
        self.metrics.increment_retries_succeeded();
    }

    pub fn record_escalated(&self, retry_id: RetryId, owner: OwnerId, attempts: u32) {
        self.metrics.increment_retries_escalated();
        self.emit(JobEvent::Escalated { retry_id, owner, attempts, at: Utc::now() });
    }

    /// Raw receiver for the event broadcast
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.event_broadcaster.subscribe()
    }

    /// Event stream for observability; lagged receivers skip missed events
    pub fn event_stream(&self) -> BoxStream<JobEvent> {
        let stream = BroadcastStream::new(self.event_broadcaster.subscribe())
            .filter_map(|event| event.ok());
        Box::pin(stream)
    }

    /// Get live metrics
    pub fn metrics(&self) -> &LiveMetrics {
        &self.metrics
    }
}

impl Default for ObservabilityLayer {
    fn default() -> Self {
        Self::new()
    }
}
