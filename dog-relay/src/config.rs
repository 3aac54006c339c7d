use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use crate::{CircuitConfig, Destination, RelayError, RelayResult};

/// Configuration for the job queue and its worker pool
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Number of worker tasks
    pub workers: usize,
    /// Global slots shared by every owner
    pub global_capacity: usize,
    /// Slots a single owner may hold at once
    pub per_owner_limit: usize,
    /// Total inline attempts per job, first one included
    pub max_attempts: u32,
    /// Delay before inline retry `n` is `base_backoff * 2^n`
    pub base_backoff: Duration,
    /// Longest a worker waits after re-queueing a job whose owner is at the cap
    pub requeue_backoff: Duration,
    /// Reject submissions once this many jobs are pending
    pub max_pending: Option<usize>,
    /// Reject an owner's submissions once they have this many pending
    pub max_pending_per_owner: Option<usize>,
    /// Smallest progress change worth persisting, in percent
    pub progress_step: u8,
}

impl QueueConfig {
    /// Default worker count: one per CPU, kept within [2, 8]
    pub fn default_workers() -> usize {
        num_cpus::get().clamp(2, 8)
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_global_capacity(mut self, capacity: usize) -> Self {
        self.global_capacity = capacity;
        self
    }

    pub fn with_per_owner_limit(mut self, limit: usize) -> Self {
        self.per_owner_limit = limit;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_base_backoff(mut self, backoff: Duration) -> Self {
        self.base_backoff = backoff;
        self
    }

    pub fn with_requeue_backoff(mut self, backoff: Duration) -> Self {
        self.requeue_backoff = backoff;
        self
    }

    pub fn with_max_pending(mut self, max: usize) -> Self {
        self.max_pending = Some(max);
        self
    }

    pub fn with_max_pending_per_owner(mut self, max: usize) -> Self {
        self.max_pending_per_owner = Some(max);
        self
    }

    /// Backoff before the inline attempt following `attempt` (0-based)
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.base_backoff.saturating_mul(2u32.saturating_pow(attempt))
    }

    pub fn validate(&self) -> RelayResult<()> {
        if self.workers == 0 {
            return Err(RelayError::Config("workers must be at least 1".to_string()));
        }
        if self.global_capacity == 0 {
            return Err(RelayError::Config("global_capacity must be at least 1".to_string()));
        }
        if self.per_owner_limit == 0 {
            return Err(RelayError::Config("per_owner_limit must be at least 1".to_string()));
        }
        if self.max_attempts == 0 {
            return Err(RelayError::Config("max_attempts must be at least 1".to_string()));
        }
        Ok(())
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        let workers = Self::default_workers();
        Self {
            workers,
            global_capacity: workers,
            per_owner_limit: 2,
            max_attempts: 3,
            base_backoff: Duration::from_secs(1),
            requeue_backoff: Duration::from_millis(500),
            max_pending: None,
            max_pending_per_owner: None,
            progress_step: 5,
        }
    }
}

/// Configuration for the slow retry tier
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Ascending wait before each attempt; the last tier repeats
    pub tiers: Vec<Duration>,
    /// How often due requests are swept
    pub sweep_interval: Duration,
    /// Attempts before a request is escalated
    pub max_attempts: u32,
    /// Where escalations go; logged only when unset
    pub operator: Option<Destination>,
}

impl RetryConfig {
    pub fn with_tiers(mut self, tiers: Vec<Duration>) -> Self {
        self.tiers = tiers;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_operator(mut self, operator: Destination) -> Self {
        self.operator = Some(operator);
        self
    }

    /// Wait required before the attempt following `attempt` completed ones
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let last = self.tiers.len().saturating_sub(1);
        let idx = (attempt as usize).min(last);
        self.tiers.get(idx).copied().unwrap_or(Duration::ZERO)
    }

    pub fn validate(&self) -> RelayResult<()> {
        if self.tiers.is_empty() {
            return Err(RelayError::Config("retry tiers must not be empty".to_string()));
        }
        if self.tiers.windows(2).any(|w| w[1] < w[0]) {
            return Err(RelayError::Config("retry tiers must be non-decreasing".to_string()));
        }
        if self.max_attempts == 0 {
            return Err(RelayError::Config("retry max_attempts must be at least 1".to_string()));
        }
        if self.sweep_interval.is_zero() {
            return Err(RelayError::Config("sweep_interval must be positive".to_string()));
        }
        Ok(())
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            tiers: vec![
                Duration::from_secs(120),
                Duration::from_secs(300),
                Duration::from_secs(600),
            ],
            sweep_interval: Duration::from_secs(60),
            max_attempts: 3,
            operator: None,
        }
    }
}

/// Everything needed to assemble a relay
#[derive(Debug, Clone, Default)]
pub struct RelayConfig {
    pub queue: QueueConfig,
    pub retry: RetryConfig,
    /// Thresholds for the breaker guarding retrieval
    pub fetch_circuit: CircuitConfig,
}

impl RelayConfig {
    /// Load from `RELAY_*` environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let queue_defaults = QueueConfig::default();
        let workers = env_or("RELAY_WORKERS", queue_defaults.workers);

        let queue = QueueConfig {
            workers,
            global_capacity: env_or("RELAY_GLOBAL_CAPACITY", workers),
            per_owner_limit: env_or("RELAY_PER_OWNER_LIMIT", queue_defaults.per_owner_limit),
            max_attempts: env_or("RELAY_MAX_ATTEMPTS", queue_defaults.max_attempts),
            base_backoff: Duration::from_millis(env_or(
                "RELAY_BASE_BACKOFF_MS",
                queue_defaults.base_backoff.as_millis() as u64,
            )),
            requeue_backoff: Duration::from_millis(env_or(
                "RELAY_REQUEUE_BACKOFF_MS",
                queue_defaults.requeue_backoff.as_millis() as u64,
            )),
            max_pending: env_opt("RELAY_MAX_PENDING"),
            max_pending_per_owner: env_opt("RELAY_MAX_PENDING_PER_OWNER"),
            progress_step: env_or("RELAY_PROGRESS_STEP", queue_defaults.progress_step),
        };

        let retry_defaults = RetryConfig::default();
        let tiers = env::var("RELAY_RETRY_TIERS_SECS")
            .ok()
            .and_then(|raw| parse_tiers(&raw))
            .unwrap_or(retry_defaults.tiers);

        let retry = RetryConfig {
            tiers,
            sweep_interval: Duration::from_secs(env_or(
                "RELAY_RETRY_SWEEP_SECS",
                retry_defaults.sweep_interval.as_secs(),
            )),
            max_attempts: env_or("RELAY_RETRY_MAX_ATTEMPTS", retry_defaults.max_attempts),
            operator: env_opt::<i64>("RELAY_OPERATOR_CHAT").map(Destination::new),
        };

        let circuit_defaults = CircuitConfig::default();
        let fetch_circuit = CircuitConfig::new(
            env_or("RELAY_CIRCUIT_FAILURES", circuit_defaults.failure_threshold),
            env_or("RELAY_CIRCUIT_SUCCESSES", circuit_defaults.success_threshold),
            Duration::from_secs(env_or(
                "RELAY_CIRCUIT_OPEN_SECS",
                circuit_defaults.open_duration.as_secs(),
            )),
        );

        Self { queue, retry, fetch_circuit }
    }

    pub fn validate(&self) -> RelayResult<()> {
        self.queue.validate()?;
        self.retry.validate()
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                warn!("Ignoring invalid {}={:?}, using default", key, raw);
                default
            }
        },
        Err(_) => default,
    }
}

fn env_opt<T: FromStr>(key: &str) -> Option<T> {
    let raw = env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring invalid {}={:?}", key, raw);
            None
        }
    }
}

fn parse_tiers(raw: &str) -> Option<Vec<Duration>> {
    let tiers: Result<Vec<u64>, _> = raw
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::parse)
        .collect();

    match tiers {
        Ok(secs) if !secs.is_empty() => Some(secs.into_iter().map(Duration::from_secs).collect()),
        _ => {
            warn!("Ignoring invalid RELAY_RETRY_TIERS_SECS={:?}", raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_workers_are_clamped() {
        let workers = QueueConfig::default_workers();
        assert!((2..=8).contains(&workers));
        assert_eq!(QueueConfig::default().global_capacity, workers);
    }

    #[test]
    fn test_inline_backoff_doubles() {
        let config = QueueConfig::default();
        assert_eq!(config.backoff_for(0), Duration::from_secs(1));
        assert_eq!(config.backoff_for(1), Duration::from_secs(2));
        assert_eq!(config.backoff_for(2), Duration::from_secs(4));
    }

    #[test]
    fn test_retry_delay_caps_at_last_tier() {
        let config = RetryConfig::default();
        assert_eq!(config.delay_for(0), Duration::from_secs(120));
        assert_eq!(config.delay_for(1), Duration::from_secs(300));
        assert_eq!(config.delay_for(2), Duration::from_secs(600));
        assert_eq!(config.delay_for(9), Duration::from_secs(600));
    }

    #[test]
    fn test_validation_rejects_decreasing_tiers() {
        let config = RetryConfig::default()
            .with_tiers(vec![Duration::from_secs(300), Duration::from_secs(120)]);
        assert!(matches!(config.validate(), Err(RelayError::Config(_))));

        let config = QueueConfig::default().with_per_owner_limit(0);
        assert!(config.validate().is_err());
        assert!(RelayConfig::default().validate().is_ok());
    }

    #[test]
    fn test_parse_tiers() {
        assert_eq!(
            parse_tiers("60, 120,240"),
            Some(vec![Duration::from_secs(60), Duration::from_secs(120), Duration::from_secs(240)])
        );
        assert_eq!(parse_tiers("60,soon"), None);
        assert_eq!(parse_tiers(""), None);
    }

    #[test]
    fn test_from_env_overrides() {
        env::set_var("RELAY_PER_OWNER_LIMIT", "4");
        env::set_var("RELAY_RETRY_TIERS_SECS", "10,20");
        env::set_var("RELAY_OPERATOR_CHAT", "not-a-number");

        let config = RelayConfig::from_env();
        assert_eq!(config.queue.per_owner_limit, 4);
        assert_eq!(config.retry.tiers, vec![Duration::from_secs(10), Duration::from_secs(20)]);
        assert_eq!(config.retry.operator, None);

        env::remove_var("RELAY_PER_OWNER_LIMIT");
        env::remove_var("RELAY_RETRY_TIERS_SECS");
        env::remove_var("RELAY_OPERATOR_CHAT");
    }
}
