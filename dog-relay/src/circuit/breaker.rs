use std::fmt;
use std::future::Future;
use std::time::Duration;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::CircuitError;

/// Thresholds for one breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitConfig {
    /// Consecutive failures that open a closed circuit
    pub failure_threshold: u32,
    /// Consecutive half-open successes that close the circuit
    pub success_threshold: u32,
    /// How long an open circuit rejects calls after its last failure
    pub open_duration: Duration,
}

impl CircuitConfig {
    pub fn new(failure_threshold: u32, success_threshold: u32, open_duration: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            success_threshold: success_threshold.max(1),
            open_duration,
        }
    }

    /// Trips early and recovers quickly, for dependencies the relay can live without
    pub fn strict() -> Self {
        Self::new(3, 1, Duration::from_secs(30))
    }

    /// Tolerates more noise before tripping, for business-critical dependencies
    pub fn lenient() -> Self {
        Self::new(10, 3, Duration::from_secs(120))
    }
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self::new(5, 2, Duration::from_secs(60))
    }
}

/// Breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Observability snapshot of one breaker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitStats {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    /// Time spent in the current state
    pub uptime: Duration,
}

#[derive(Debug)]
struct CircuitInner {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure: Option<Instant>,
    last_transition: Instant,
}

impl CircuitInner {
    fn transition(&mut self, name: &str, to: CircuitState) {
        if self.state == to {
            return;
        }
        match to {
            CircuitState::Open => warn!(circuit = name, from = %self.state, "Circuit opened"),
            _ => info!(circuit = name, from = %self.state, to = %to, "Circuit state changed"),
        }
        self.state = to;
        self.last_transition = Instant::now();
        self.success_count = 0;
        if to == CircuitState::Closed {
            self.failure_count = 0;
        }
    }
}

/// Failure-isolation state machine for one named dependency
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitConfig,
    inner: Mutex<CircuitInner>,
}

impl CircuitBreaker {
    /// Prefer [`crate::CircuitManager::get_breaker`] so call sites share state
    pub fn new(name: impl Into<String>, config: CircuitConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(CircuitInner {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                last_failure: None,
                last_transition: Instant::now(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitConfig {
        &self.config
    }

    /// Run `operation` through the breaker
    ///
    /// An open circuit rejects without invoking `operation`. Every error
    /// counts as a failure of the dependency.
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.call_filtered(operation, |_| true).await
    }

    /// Like [`call`](Self::call), but only errors matching `is_failure` count
    /// against the dependency; others pass through without touching state
    pub async fn call_filtered<F, Fut, T, E, P>(
        &self,
        operation: F,
        is_failure: P,
    ) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: FnOnce(&E) -> bool,
    {
        self.admit()?;

        match operation().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(err) => {
                if is_failure(&err) {
                    self.record_failure();
                }
                Err(CircuitError::Inner(err))
            }
        }
    }

    fn admit<E>(&self) -> Result<(), CircuitError<E>> {
        let mut inner = self.inner.lock();
        if inner.state != CircuitState::Open {
            return Ok(());
        }

        let since_failure = inner
            .last_failure
            .map(|at| at.elapsed())
            .unwrap_or(self.config.open_duration);

        if since_failure >= self.config.open_duration {
            inner.transition(&self.name, CircuitState::HalfOpen);
            return Ok(());
        }

        Err(CircuitError::Open {
            name: self.name.clone(),
            retry_in: self.config.open_duration - since_failure,
        })
    }

    /// Record a successful call
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => inner.failure_count = 0,
            CircuitState::HalfOpen => {
                inner.success_count += 1;
                if inner.success_count >= self.config.success_threshold {
                    inner.transition(&self.name, CircuitState::Closed);
                }
            }
            // A call admitted before the circuit opened; the open window stands
            CircuitState::Open => {}
        }
    }

    /// Record a failed call
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.last_failure = Some(Instant::now());
        inner.failure_count = inner.failure_count.saturating_add(1);

        match inner.state {
            CircuitState::Closed => {
                if inner.failure_count >= self.config.failure_threshold {
                    inner.transition(&self.name, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => inner.transition(&self.name, CircuitState::Open),
            CircuitState::Open => {}
        }
    }

    /// Current state, without applying the open timeout
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Force the breaker closed
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.transition(&self.name, CircuitState::Closed);
        inner.failure_count = 0;
        inner.last_failure = None;
    }

    pub fn stats(&self) -> CircuitStats {
        let inner = self.inner.lock();
        CircuitStats {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            uptime: inner.last_transition.elapsed(),
        }
    }
}
