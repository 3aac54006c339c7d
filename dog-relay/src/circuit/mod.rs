//! Per-dependency circuit breaking.
//!
//! ```text
//! Closed   -> Open      failure_threshold consecutive failures
//! Open     -> HalfOpen  open_duration elapsed since the last failure
//! HalfOpen -> Closed    success_threshold consecutive successes
//! HalfOpen -> Open      any failure
//! ```
//!
//! Breakers are handed out by [`CircuitManager`] so every call site that
//! names the same dependency shares one failure state.

pub mod breaker;
pub mod manager;

pub use breaker::{CircuitBreaker, CircuitConfig, CircuitState, CircuitStats};
pub use manager::CircuitManager;
