use std::sync::Arc;
use dashmap::DashMap;
use tracing::{debug, warn};

use super::{CircuitBreaker, CircuitConfig, CircuitStats};

/// Keyed registry handing out one breaker per dependency name
#[derive(Clone, Default)]
pub struct CircuitManager {
    breakers: Arc<DashMap<String, Arc<CircuitBreaker>>>,
}

impl CircuitManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the breaker for `name`, creating it with `config` on first use
    ///
    /// The first caller's thresholds win; later callers asking for
    /// different thresholds get the existing breaker and a warning.
    pub fn get_breaker(&self, name: &str, config: CircuitConfig) -> Arc<CircuitBreaker> {
        let breaker = self
            .breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!("Creating circuit breaker '{}' with {:?}", name, config);
                Arc::new(CircuitBreaker::new(name, config))
            })
            .clone();

        if *breaker.config() != config {
            warn!(
                "Circuit '{}' already exists with {:?}; ignoring {:?}",
                name,
                breaker.config(),
                config
            );
        }
        breaker
    }

    /// Existing breaker for `name`, if any call site created it
    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).map(|entry| entry.value().clone())
    }

    /// Force one breaker closed; returns false if it does not exist
    pub fn reset(&self, name: &str) -> bool {
        match self.get(name) {
            Some(breaker) => {
                breaker.reset();
                true
            }
            None => false,
        }
    }

    /// Snapshot of every breaker, sorted by name
    pub fn all_stats(&self) -> Vec<CircuitStats> {
        let mut stats: Vec<CircuitStats> =
            self.breakers.iter().map(|entry| entry.value().stats()).collect();
        stats.sort_by(|a, b| a.name.cmp(&b.name));
        stats
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::CircuitState;

    #[tokio::test]
    async fn test_same_name_shares_state() {
        let manager = CircuitManager::new();
        let a = manager.get_breaker("media", CircuitConfig::strict());
        let b = manager.get_breaker("media", CircuitConfig::strict());

        assert!(Arc::ptr_eq(&a, &b));

        for _ in 0..3 {
            a.record_failure();
        }
        assert_eq!(b.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_names_are_independent() {
        let manager = CircuitManager::new();
        let metadata = manager.get_breaker("metadata", CircuitConfig::strict());
        let delivery = manager.get_breaker("delivery", CircuitConfig::lenient());

        for _ in 0..3 {
            metadata.record_failure();
        }
        assert_eq!(metadata.state(), CircuitState::Open);
        assert_eq!(delivery.state(), CircuitState::Closed);

        let names: Vec<String> = manager.all_stats().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["delivery".to_string(), "metadata".to_string()]);
    }

    #[tokio::test]
    async fn test_first_config_wins() {
        let manager = CircuitManager::new();
        manager.get_breaker("media", CircuitConfig::strict());
        let again = manager.get_breaker("media", CircuitConfig::lenient());

        assert_eq!(*again.config(), CircuitConfig::strict());
        assert_eq!(manager.len(), 1);
    }

    #[tokio::test]
    async fn test_reset_by_name() {
        let manager = CircuitManager::new();
        let breaker = manager.get_breaker("media", CircuitConfig::new(1, 1, std::time::Duration::from_secs(5)));
        breaker.record_failure();

        assert!(manager.reset("media"));
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(!manager.reset("unknown"));
    }
}
