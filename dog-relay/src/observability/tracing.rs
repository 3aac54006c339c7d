//! Subscriber setup for binaries embedding the relay.

/// Install a global `tracing` subscriber
///
/// Honors `RUST_LOG`, defaulting to `info`. Set `RELAY_LOG_FORMAT=json`
/// for one JSON object per line.
#[cfg(feature = "tracing-basic")]
pub fn init_tracing() -> crate::RelayResult<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("RELAY_LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let result = if json {
        fmt().with_env_filter(filter).json().try_init()
    } else {
        fmt().with_env_filter(filter).try_init()
    };

    result.map_err(|e| crate::RelayError::Internal(format!("tracing init failed: {}", e)))
}
