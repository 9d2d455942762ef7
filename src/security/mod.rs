//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → cost.rs (price the request by method and path)
//!     → rate_limit.rs (spend from the client's bucket for that endpoint class)
//!     → Pass to handlers, or reject with 429
//! ```
//!
//! # Design Decisions
//! - Fail closed: an unknown rule class is charged against `global`
//! - Limits are in-process only; state resets on restart

pub mod cost;
pub mod rate_limit;

pub use cost::CostModel;
pub use rate_limit::{RateLimitDecision, RateLimiter, TokenBucket};
