//! Slow retry tier with operator escalation.
//!
//! Requests that exhausted their inline attempts are parked here and
//! re-attempted on an ascending delay schedule. A request that fails
//! every scheduled attempt is escalated exactly once: the operator gets
//! the details, the requester gets an apology, and the request is dropped.

mod request;

pub use request::{PendingRetry, RetryRequest};

use std::sync::Arc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    JobError, RetryConfig, RetryId,
    observability::ObservabilityLayer,
    pipeline::RelayPipeline,
    transport::{notify_quietly, Notifier},
};

/// Outcome counts for one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub escalated: usize,
    /// Due requests that hit an open circuit; their attempt was not counted
    pub unavailable: usize,
}

/// Schedules re-attempts for parked requests
#[derive(Clone)]
pub struct RetryScheduler {
    config: RetryConfig,
    entries: Arc<Mutex<Vec<PendingRetry>>>,
    pipeline: RelayPipeline,
    notifier: Arc<dyn Notifier>,
    observability: ObservabilityLayer,
}

impl RetryScheduler {
    pub fn new(config: RetryConfig, pipeline: RelayPipeline, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            config,
            entries: Arc::new(Mutex::new(Vec::new())),
            pipeline,
            notifier,
            observability: ObservabilityLayer::new(),
        }
    }

    /// Share events and counters with an existing layer
    pub fn with_observability(mut self, observability: ObservabilityLayer) -> Self {
        self.observability = observability;
        self
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Park a request; its first attempt is due after the first tier
    pub fn add(&self, request: RetryRequest) -> RetryId {
        let entry = PendingRetry::new(request, self.config.max_attempts);
        let id = entry.id.clone();
        info!(
            retry_id = %id,
            owner = %entry.request.owner,
            "Scheduled retry for {} ({} attempts)",
            entry.request.source,
            entry.max_attempts
        );
        self.entries.lock().push(entry);
        id
    }

    /// Requests whose next attempt is due now
    pub fn pending_due(&self) -> Vec<PendingRetry> {
        self.pending_due_at(Instant::now())
    }

    /// Requests whose next attempt is due at `now`
    ///
    /// Exhausted requests are never due; they are awaiting escalation.
    pub fn pending_due_at(&self, now: Instant) -> Vec<PendingRetry> {
        self.entries
            .lock()
            .iter()
            .filter(|entry| !entry.is_exhausted())
            .filter(|entry| {
                now.saturating_duration_since(entry.last_attempt) >= self.config.delay_for(entry.attempt)
            })
            .cloned()
            .collect()
    }

    /// Snapshot of one parked request
    pub fn get(&self, id: &RetryId) -> Option<PendingRetry> {
        self.entries.lock().iter().find(|entry| &entry.id == id).cloned()
    }

    /// Drop a parked request without escalating it
    pub fn remove(&self, id: &RetryId) -> Option<PendingRetry> {
        let mut entries = self.entries.lock();
        let idx = entries.iter().position(|entry| &entry.id == id)?;
        Some(entries.remove(idx))
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Attempt every due request once, escalating those that run out
    #[instrument(skip(self))]
    pub async fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();

        for due in self.pending_due() {
            let Some(attempt) = self.begin_attempt(&due.id) else {
                continue;
            };

            let request = &due.request;
            let result = self
                .pipeline
                .relay(&request.source, &request.format, request.destination, &request.caption)
                .await;

            match result {
                Err(err @ JobError::Unavailable(_)) => {
                    self.refund_attempt(&due.id, &err);
                    report.unavailable += 1;
                    warn!(retry_id = %due.id, "Retry skipped, attempt not counted: {}", err);
                }
                Ok(()) => {
                    self.remove(&due.id);
                    report.attempted += 1;
                    report.succeeded += 1;
                    self.observability.record_retry_succeeded();
                    info!(retry_id = %due.id, attempt, "Retry delivered {}", request.source);
                    notify_quietly(
                        self.notifier.as_ref(),
                        request.destination,
                        &format!("Your request {} went through on retry.", request.source),
                    )
                    .await;
                }
                Err(err) => {
                    report.attempted += 1;
                    warn!(retry_id = %due.id, attempt, "Retry failed: {}", err);
                    if let Some(exhausted) = self.record_failure(&due.id, &err) {
                        self.escalate(exhausted).await;
                        report.escalated += 1;
                    }
                }
            }
        }

        if report.attempted > 0 || report.unavailable > 0 {
            debug!(
                "Sweep attempted {}, succeeded {}, escalated {}, unavailable {}",
                report.attempted, report.succeeded, report.escalated, report.unavailable
            );
        }
        report
    }

    /// Run `sweep` every `sweep_interval` until `shutdown` fires
    pub fn spawn(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        let scheduler = self.clone();
        tokio::spawn(async move {
            let mut ticker = time::interval(scheduler.config.sweep_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("Retry scheduler stopped with {} parked", scheduler.len());
                        break;
                    }
                    _ = ticker.tick() => {
                        scheduler.sweep().await;
                    }
                }
            }
        })
    }

    fn begin_attempt(&self, id: &RetryId) -> Option<u32> {
        let mut entries = self.entries.lock();
        let entry = entries.iter_mut().find(|entry| &entry.id == id)?;
        entry.attempt += 1;
        entry.last_attempt = Instant::now();
        Some(entry.attempt)
    }

    /// Undo `begin_attempt` for a call that never reached the dependency
    ///
    /// `last_attempt` keeps the new timestamp, so the same tier is waited
    /// out again before the next try.
    fn refund_attempt(&self, id: &RetryId, err: &JobError) {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.iter_mut().find(|entry| &entry.id == id) {
            entry.attempt = entry.attempt.saturating_sub(1);
            entry.last_error = Some(err.to_string());
        }
    }

    /// Store the failure; returns the entry if it is now due for escalation
    fn record_failure(&self, id: &RetryId, err: &JobError) -> Option<PendingRetry> {
        let mut entries = self.entries.lock();
        let idx = entries.iter().position(|entry| &entry.id == id)?;
        entries[idx].last_error = Some(err.to_string());

        // Retrying cannot change a permanent outcome
        if entries[idx].is_exhausted() || matches!(err, JobError::Permanent(_)) {
            Some(entries.remove(idx))
        } else {
            None
        }
    }

    async fn escalate(&self, entry: PendingRetry) {
        let request = &entry.request;
        let last_error = entry.last_error.as_deref().unwrap_or("unknown error");

        error!(
            retry_id = %entry.id,
            owner = %request.owner,
            attempts = entry.attempt,
            "Escalating {}: {}",
            request.source,
            last_error
        );

        match self.config.operator {
            Some(operator) => {
                let report = format!(
                    "Delivery gave up after {} retries\nowner: {}\nsource: {}\nqueued at: {}\nlast error: {}",
                    entry.attempt,
                    request.owner,
                    request.source,
                    entry.created_at.to_rfc3339(),
                    last_error
                );
                notify_quietly(self.notifier.as_ref(), operator, &report).await;
            }
            None => warn!("No operator destination configured; escalation logged only"),
        }

        notify_quietly(
            self.notifier.as_ref(),
            request.destination,
            &format!(
                "Sorry, we could not deliver {} after several attempts. The team has been notified.",
                request.source
            ),
        )
        .await;

        self.observability
            .record_escalated(entry.id.clone(), request.owner, entry.attempt);
    }
}
