#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::time::Instant;

use dog_relay::{
    AdmissionController, Artifact, Deliverer, Destination, Fetcher, JobError, JobId, JobStatus,
    JobStore, MemoryJobStore, Notifier, ProgressObserver, QueueConfig, RelayPipeline, RelayQueue,
};

/// Fetcher with per-source scripted failures and an optional hold gate
#[derive(Default)]
pub struct ScriptedFetcher {
    scripts: Mutex<HashMap<String, VecDeque<JobError>>>,
    always_fail: Mutex<HashMap<String, JobError>>,
    calls: Mutex<Vec<(String, Instant)>>,
    in_flight: Mutex<HashSet<String>>,
    max_in_flight: Mutex<HashMap<String, usize>>,
    gate: Option<Semaphore>,
}

impl ScriptedFetcher {
    /// Every fetch blocks until `release` hands out a permit
    pub fn held() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::default()
        }
    }

    /// Fail the next fetches of `source` with `errors`, in order
    pub fn fail_next(&self, source: &str, errors: Vec<JobError>) {
        self.scripts.lock().entry(source.to_string()).or_default().extend(errors);
    }

    pub fn fail_always(&self, source: &str, error: JobError) {
        self.always_fail.lock().insert(source.to_string(), error);
    }

    pub fn recover(&self, source: &str) {
        self.always_fail.lock().remove(source);
    }

    pub fn release(&self, permits: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(permits);
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn calls_for(&self, source: &str) -> Vec<Instant> {
        self.calls
            .lock()
            .iter()
            .filter(|(s, _)| s == source)
            .map(|(_, at)| *at)
            .collect()
    }

    pub fn in_flight(&self) -> HashSet<String> {
        self.in_flight.lock().clone()
    }

    /// Highest number of concurrent fetches whose source starts with `prefix`
    pub fn max_in_flight(&self, prefix: &str) -> usize {
        self.max_in_flight.lock().get(prefix).copied().unwrap_or(0)
    }

    fn enter(&self, source: &str) {
        let mut in_flight = self.in_flight.lock();
        in_flight.insert(source.to_string());
        if let Some((prefix, _)) = source.split_once('/') {
            let current = in_flight.iter().filter(|s| s.starts_with(prefix)).count();
            let mut max = self.max_in_flight.lock();
            let entry = max.entry(prefix.to_string()).or_insert(0);
            *entry = (*entry).max(current);
        }
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(
        &self,
        source: &str,
        _format: &str,
        progress: &dyn ProgressObserver,
    ) -> Result<Artifact, JobError> {
        self.calls.lock().push((source.to_string(), Instant::now()));
        self.enter(source);

        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        self.in_flight.lock().remove(source);

        if let Some(err) = self.always_fail.lock().get(source).cloned() {
            return Err(err);
        }
        let scripted = self.scripts.lock().get_mut(source).and_then(VecDeque::pop_front);
        if let Some(err) = scripted {
            return Err(err);
        }

        progress.on_progress(50).await;
        progress.on_progress(100).await;
        Ok(Artifact::new(format!("/tmp/{}", source.replace('/', "_"))).with_size(1024))
    }
}

/// Deliverer that records every delivery
#[derive(Default)]
pub struct RecordingDeliverer {
    deliveries: Mutex<Vec<(i64, String)>>,
    fail: AtomicBool,
}

impl RecordingDeliverer {
    pub fn deliveries(&self) -> Vec<(i64, String)> {
        self.deliveries.lock().clone()
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Deliverer for RecordingDeliverer {
    async fn deliver(
        &self,
        destination: Destination,
        _artifact: &Artifact,
        caption: &str,
    ) -> Result<(), JobError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(JobError::transient("upload rejected"));
        }
        self.deliveries.lock().push((destination.chat_id, caption.to_string()));
        Ok(())
    }
}

/// Notifier that records every notice
#[derive(Default)]
pub struct Inbox {
    messages: Mutex<Vec<(i64, String)>>,
}

impl Inbox {
    pub fn messages(&self) -> Vec<(i64, String)> {
        self.messages.lock().clone()
    }

    pub fn messages_for(&self, chat_id: i64) -> Vec<String> {
        self.messages
            .lock()
            .iter()
            .filter(|(id, _)| *id == chat_id)
            .map(|(_, text)| text.clone())
            .collect()
    }
}

#[async_trait]
impl Notifier for Inbox {
    async fn notify(&self, destination: Destination, text: &str) -> Result<(), JobError> {
        self.messages.lock().push((destination.chat_id, text.to_string()));
        Ok(())
    }
}

/// Everything a queue test needs to poke at
pub struct Harness {
    pub store: MemoryJobStore,
    pub fetcher: Arc<ScriptedFetcher>,
    pub deliverer: Arc<RecordingDeliverer>,
    pub inbox: Arc<Inbox>,
    pub pipeline: RelayPipeline,
    pub queue: RelayQueue,
}

impl Harness {
    pub fn new(config: QueueConfig) -> Self {
        Self::with_fetcher(config, ScriptedFetcher::default())
    }

    pub fn held(config: QueueConfig) -> Self {
        Self::with_fetcher(config, ScriptedFetcher::held())
    }

    pub fn with_fetcher(config: QueueConfig, fetcher: ScriptedFetcher) -> Self {
        Self::build(MemoryJobStore::new(), config, fetcher, |p| p)
    }

    pub fn build(
        store: MemoryJobStore,
        config: QueueConfig,
        fetcher: ScriptedFetcher,
        wrap: impl FnOnce(RelayPipeline) -> RelayPipeline,
    ) -> Self {
        let fetcher = Arc::new(fetcher);
        let deliverer = Arc::new(RecordingDeliverer::default());
        let inbox = Arc::new(Inbox::default());
        let pipeline = wrap(RelayPipeline::new(fetcher.clone(), deliverer.clone()));

        let queue = RelayQueue::new(
            Arc::new(store.clone()),
            pipeline.clone(),
            inbox.clone(),
            AdmissionController::new(config.global_capacity),
            config,
        );

        Self { store, fetcher, deliverer, inbox, pipeline, queue }
    }

    pub async fn status(&self, id: JobId) -> JobStatus {
        self.store.get_job(id).await.unwrap().status
    }

    /// Poll until `id` reaches `status`
    pub async fn wait_for_status(&self, id: JobId, status: JobStatus) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while self.status(id).await != status {
            assert!(Instant::now() < deadline, "job {} never reached {}", id, status);
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

/// Fast, deterministic config: small backoffs, no CPU-dependent defaults
pub fn config(workers: usize, per_owner_limit: usize) -> QueueConfig {
    QueueConfig::default()
        .with_workers(workers)
        .with_global_capacity(workers)
        .with_per_owner_limit(per_owner_limit)
        .with_requeue_backoff(Duration::from_millis(20))
}

/// Poll `check` every few milliseconds, failing after ten seconds
pub async fn eventually(mut check: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !check() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
