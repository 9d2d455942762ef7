//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to object storage:
//!     → circuit_breaker.rs (admit, or fail fast with retry-after)
//!     → timeouts.rs (optional per-call deadline)
//!     → circuit_metrics.rs (record outcome, latency, failure time)
//!     → backoff.rs (cooldown before the next probe)
//! ```
//!
//! # Design Decisions
//! - One breaker per dependency, never per request
//! - The caller always receives the original error
//! - State is in-process only and resets on restart

pub mod backoff;
pub mod circuit_breaker;
pub mod circuit_metrics;
pub mod timeouts;

pub use circuit_breaker::{CircuitBreaker, CircuitError, CircuitSnapshot, CircuitState, ErrorKind};
pub use circuit_metrics::{CircuitMetrics, MetricsSummary};
