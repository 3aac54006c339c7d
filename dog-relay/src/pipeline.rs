use std::sync::Arc;
use tracing::{debug, instrument};

use crate::{
    Destination, JobError,
    circuit::CircuitBreaker,
    transport::{Artifact, Deliverer, Fetcher, NoProgress, ProgressObserver},
};

/// The retrieval-and-delivery path shared by the queue and the retry tier
///
/// Either leg can be guarded by a circuit breaker. Permanent errors mean
/// the dependency answered, so they never count against its breaker.
#[derive(Clone)]
pub struct RelayPipeline {
    fetcher: Arc<dyn Fetcher>,
    deliverer: Arc<dyn Deliverer>,
    fetch_breaker: Option<Arc<CircuitBreaker>>,
    delivery_breaker: Option<Arc<CircuitBreaker>>,
}

impl RelayPipeline {
    pub fn new(fetcher: Arc<dyn Fetcher>, deliverer: Arc<dyn Deliverer>) -> Self {
        Self {
            fetcher,
            deliverer,
            fetch_breaker: None,
            delivery_breaker: None,
        }
    }

    /// Guard retrieval with a breaker obtained from the circuit manager
    pub fn with_fetch_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.fetch_breaker = Some(breaker);
        self
    }

    /// Guard delivery with a breaker obtained from the circuit manager
    pub fn with_delivery_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.delivery_breaker = Some(breaker);
        self
    }

    /// Retrieve `source` into a local artifact
    pub async fn fetch(
        &self,
        source: &str,
        format: &str,
        progress: &dyn ProgressObserver,
    ) -> Result<Artifact, JobError> {
        let fetch = || self.fetcher.fetch(source, format, progress);
        match &self.fetch_breaker {
            Some(breaker) => Ok(breaker.call_filtered(fetch, counts_against_dependency).await?),
            None => fetch().await,
        }
    }

    /// Relay a retrieved artifact to `destination`
    pub async fn deliver(
        &self,
        destination: Destination,
        artifact: &Artifact,
        caption: &str,
    ) -> Result<(), JobError> {
        let deliver = || self.deliverer.deliver(destination, artifact, caption);
        match &self.delivery_breaker {
            Some(breaker) => Ok(breaker.call_filtered(deliver, counts_against_dependency).await?),
            None => deliver().await,
        }
    }

    /// Fetch then deliver, without progress reporting
    #[instrument(skip(self, caption), fields(chat_id = destination.chat_id))]
    pub async fn relay(
        &self,
        source: &str,
        format: &str,
        destination: Destination,
        caption: &str,
    ) -> Result<(), JobError> {
        let artifact = self.fetch(source, format, &NoProgress).await?;
        debug!("Fetched {} into {}", source, artifact.path.display());
        self.deliver(destination, &artifact, caption).await
    }
}

fn counts_against_dependency(err: &JobError) -> bool {
    !matches!(err, JobError::Permanent(_))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use async_trait::async_trait;
    use crate::circuit::{CircuitConfig, CircuitState};

    struct FailingFetcher {
        error: JobError,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Fetcher for FailingFetcher {
        async fn fetch(
            &self,
            _source: &str,
            _format: &str,
            _progress: &dyn ProgressObserver,
        ) -> Result<Artifact, JobError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(self.error.clone())
        }
    }

    struct NullDeliverer;

    #[async_trait]
    impl Deliverer for NullDeliverer {
        async fn deliver(&self, _: Destination, _: &Artifact, _: &str) -> Result<(), JobError> {
            Ok(())
        }
    }

    fn pipeline(error: JobError) -> (RelayPipeline, Arc<FailingFetcher>, Arc<CircuitBreaker>) {
        let fetcher = Arc::new(FailingFetcher { error, calls: AtomicU32::new(0) });
        let breaker = Arc::new(CircuitBreaker::new(
            "media",
            CircuitConfig::new(2, 1, Duration::from_secs(60)),
        ));
        let pipeline = RelayPipeline::new(fetcher.clone(), Arc::new(NullDeliverer))
            .with_fetch_breaker(breaker.clone());
        (pipeline, fetcher, breaker)
    }

    #[tokio::test]
    async fn test_open_fetch_breaker_short_circuits() {
        let (pipeline, fetcher, breaker) = pipeline(JobError::transient("timeout"));
        let dest = Destination::new(1);

        for _ in 0..2 {
            let err = pipeline.relay("src", "best", dest, "t").await.unwrap_err();
            assert!(matches!(err, JobError::Transient(_)));
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        let err = pipeline.relay("src", "best", dest, "t").await.unwrap_err();
        assert!(matches!(err, JobError::Unavailable(_)));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_permanent_errors_keep_breaker_closed() {
        let (pipeline, _fetcher, breaker) = pipeline(JobError::permanent("unsupported url"));

        for _ in 0..5 {
            let err = pipeline.relay("src", "best", Destination::new(1), "t").await.unwrap_err();
            assert!(matches!(err, JobError::Permanent(_)));
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
    }
}
