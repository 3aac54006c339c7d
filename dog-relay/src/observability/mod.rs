pub mod metrics;
pub mod tracing;
pub mod analytics;

pub use metrics::{LiveMetrics, MetricsSnapshot};
pub use analytics::ObservabilityLayer;

#[cfg(feature = "tracing-basic")]
pub use self::tracing::init_tracing;
