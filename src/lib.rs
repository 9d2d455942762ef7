//! Playlist API gateway library.
//!
//! Rate limiting for inbound traffic and a circuit breaker around object
//! storage, in front of the playlist API.

pub mod admin;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod security;
pub mod storage;

pub use config::GatewayConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use resilience::{CircuitBreaker, CircuitError, CircuitState};
pub use security::RateLimiter;
