//! # dog-relay: Job orchestration and admission control for media relays
//!
//! **Fetch a remote source, deliver it to a requester, survive restarts**
//!
//! dog-relay is the scheduling core behind a fetch-and-deliver service.
//! Retrieval, delivery and notification are plugged in through traits; the
//! crate owns everything between a request arriving and its outcome being
//! reported.
//!
//! ## Features
//!
//! - **Durable Intent**: Jobs are persisted before they are queued and recovered in creation order after a restart
//! - **Bounded Concurrency**: A global slot gate plus a non-blocking per-owner cap so one owner cannot starve the rest
//! - **Fault Isolation**: Named circuit breakers shared per dependency
//! - **Two Retry Tiers**: Quick inline retries, then a slow tiered scheduler that escalates to an operator exactly once
//! - **Structured Observability**: Job event stream and live counters
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use dog_relay::prelude::*;
//!
//! let config = RelayConfig::from_env();
//! let circuits = CircuitManager::new();
//! let pipeline = RelayPipeline::new(fetcher, deliverer)
//!     .with_fetch_breaker(circuits.get_breaker("media", config.fetch_circuit));
//!
//! let retry = RetryScheduler::new(config.retry.clone(), pipeline.clone(), notifier.clone());
//! let queue = RelayQueue::new(
//!     Arc::new(MemoryJobStore::new()),
//!     pipeline,
//!     notifier,
//!     AdmissionController::new(config.queue.global_capacity),
//!     config.queue.clone(),
//! )
//! .with_retry_scheduler(retry.clone());
//!
//! let pool = queue.start().await?;
//! let sweeper = retry.spawn(pool.shutdown_token());
//!
//! let receipt = queue.enqueue(NewJob::new(OwnerId(42), "https://example.com/clip")).await?;
//! println!("queued at position {}", receipt.position);
//! ```

pub mod error;
pub mod types;
pub mod backend;
pub mod transport;
pub mod admission;
pub mod circuit;
pub mod pipeline;
pub mod queue;
pub mod retry;
pub mod config;
pub mod observability;

// Core API exports
pub use error::{CircuitError, JobError, RelayError, RelayResult};
pub use types::{Destination, JobEvent, JobId, JobRecord, JobStatus, NewJob, OwnerId, RetryId};
pub use backend::JobStore;
pub use transport::{Artifact, Deliverer, Fetcher, NoProgress, Notifier, ProgressObserver};
pub use admission::{AdmissionController, AdmissionStats, GlobalSlot, OwnerSlot};
pub use circuit::{CircuitBreaker, CircuitConfig, CircuitManager, CircuitState, CircuitStats};
pub use pipeline::RelayPipeline;
pub use queue::{Enqueued, QueueStats, RelayQueue, WorkerPool};
pub use retry::{PendingRetry, RetryRequest, RetryScheduler, SweepReport};
pub use config::{QueueConfig, RelayConfig, RetryConfig};

// Observability exports
pub use observability::{LiveMetrics, MetricsSnapshot, ObservabilityLayer};

#[cfg(feature = "tracing-basic")]
pub use observability::init_tracing;

// Backend implementations
#[cfg(feature = "memory")]
pub use backend::memory::MemoryJobStore;

/// Everything needed to wire up a relay
pub mod prelude {
    // Orchestration
    pub use crate::{
        AdmissionController, CircuitManager, RelayPipeline, RelayQueue, RetryScheduler, WorkerPool,
    };

    // Essential types
    pub use crate::{
        Destination, JobError, JobId, JobStatus, NewJob, OwnerId, RelayError, RelayResult,
        RetryRequest,
    };

    // Collaborators
    pub use crate::{Artifact, Deliverer, Fetcher, JobStore, Notifier, ProgressObserver};

    #[cfg(feature = "memory")]
    pub use crate::MemoryJobStore;

    // Configuration
    pub use crate::{CircuitConfig, QueueConfig, RelayConfig, RetryConfig};

    // Observability
    pub use crate::{JobEvent, ObservabilityLayer};

    // Essential traits
    pub use async_trait::async_trait;
}
