//! Timeout enforcement.
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Timeout errors are distinct from other errors
//! - No deadline configured means the call runs unbounded

use std::future::Future;
use std::time::Duration;

use tokio::time::error::Elapsed;

/// Await `fut`, failing with [`Elapsed`] once `deadline` has passed.
pub async fn with_deadline<F>(deadline: Option<Duration>, fut: F) -> Result<F::Output, Elapsed>
where
    F: Future,
{
    match deadline {
        Some(limit) => tokio::time::timeout(limit, fut).await,
        None => Ok(fut.await),
    }
}
