//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, layers)
//!     → request.rs (request ID, client identity)
//!     → middleware/rate_limit.rs (admit or 429)
//!     → files.rs (object storage through the circuit breaker)
//!       or server.rs proxy_handler (forward to upstream API)
//!     → response.rs (error mapping, retry headers)
//!     → Send to client
//! ```

pub mod files;
pub mod middleware;
pub mod request;
pub mod response;
pub mod server;

pub use request::X_REQUEST_ID;
pub use server::{AppState, HttpServer, STORAGE_CIRCUIT};
