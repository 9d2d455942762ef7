//! Exponential cooldown for open circuits.

use std::time::Duration;

/// Largest exponent applied to the base cooldown (2^5 = 32x).
pub const MAX_BACKOFF_EXPONENT: u32 = 5;

/// Cooldown for an open circuit with `recent_failures` failures in its window.
///
/// `base * 2^min(recent_failures, 5)`, capped at `max`.
pub fn open_cooldown(base: Duration, recent_failures: usize, max: Duration) -> Duration {
    let exponent = u32::try_from(recent_failures)
        .unwrap_or(u32::MAX)
        .min(MAX_BACKOFF_EXPONENT);

    base.saturating_mul(2u32.pow(exponent)).min(max)
}
