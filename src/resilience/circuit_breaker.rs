//! Circuit breaker for the object store.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: dependency assumed down, calls fail fast with a retry-after
//! - Half-Open: a bounded number of probe calls test for recovery
//!
//! # State Transitions
//! ```text
//! Closed → Open: recent failures >= failure_threshold within failure_window
//! Open → Half-Open: cooldown elapsed, the admitted call is the first probe
//! Half-Open → Closed: half_open_success_threshold probes succeed
//! Half-Open → Open: any probe fails, or probe budget exhausted
//! ```
//!
//! # Design Decisions
//! - One breaker per dependency, shared by every operation against it
//! - The lock only covers bookkeeping; the guarded call runs outside it
//! - Cooldown doubles with each recent failure (capped at 32x and max_reset_timeout)
//! - Errors whose kind is listed in `ignored_errors` never affect health

use std::fmt;
use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::config::CircuitBreakerConfig;
use crate::observability::metrics;
use crate::resilience::backoff::open_cooldown;
use crate::resilience::circuit_metrics::{CircuitMetrics, MetricsSummary};
use crate::resilience::timeouts::with_deadline;

/// Circuit state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable name for an error category, matched against `ignored_errors`.
pub trait ErrorKind {
    fn error_kind(&self) -> &str;
}

/// Failure returned by [`CircuitBreaker::execute`].
#[derive(Debug, thiserror::Error)]
pub enum CircuitError<E> {
    /// The call was not attempted.
    #[error("circuit \"{circuit}\" is open, retry after {:.1}s", .retry_after.as_secs_f64())]
    Open {
        circuit: String,
        retry_after: Duration,
    },

    /// The call exceeded `call_timeout_secs` and was cancelled.
    #[error("call through circuit \"{circuit}\" timed out after {timeout:?}")]
    Timeout { circuit: String, timeout: Duration },

    /// The guarded call's own error, unchanged.
    #[error(transparent)]
    Failed(E),
}

impl<E> CircuitError<E> {
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            CircuitError::Open { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, CircuitError::Open { .. })
    }

    pub fn into_inner(self) -> Option<E> {
        match self {
            CircuitError::Failed(err) => Some(err),
            _ => None,
        }
    }
}

/// Point-in-time view of a breaker, for the admin API.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub retry_after_secs: f64,
    pub half_open_attempts: u32,
    pub half_open_successes: u32,
    pub metrics: MetricsSummary,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    last_state_change: Instant,
    half_open_attempts: u32,
    half_open_successes: u32,
    metrics: CircuitMetrics,
}

/// Async circuit breaker guarding one dependency.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let name = name.into();
        metrics::record_circuit_state(&name, CircuitState::Closed);

        // The failure history must be able to hold a full threshold's worth.
        let history = config
            .metrics_history_size
            .max(config.failure_threshold as usize);
        let metrics = CircuitMetrics::new(history);
        Self {
            name,
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                last_state_change: Instant::now(),
                half_open_attempts: 0,
                half_open_successes: 0,
                metrics,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Remaining cooldown while open, zero otherwise.
    pub fn retry_after(&self) -> Duration {
        let inner = self.lock();
        self.retry_after_locked(&inner, Instant::now())
    }

    /// Run `call` through the breaker.
    ///
    /// The original error is always returned to the caller; the breaker only
    /// decides whether the call is attempted at all.
    pub async fn execute<F, Fut, T, E>(&self, call: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: ErrorKind,
    {
        if let Err(retry_after) = self.admit() {
            metrics::record_circuit_rejected(&self.name);
            return Err(CircuitError::Open {
                circuit: self.name.clone(),
                retry_after,
            });
        }

        let timeout = self.config.call_timeout();
        let start = Instant::now();
        let outcome = with_deadline(timeout, call()).await;
        let elapsed = start.elapsed();

        match outcome {
            Ok(Ok(value)) => {
                metrics::record_circuit_call(&self.name, "success", elapsed);
                self.on_success(elapsed);
                Ok(value)
            }
            Ok(Err(err)) if self.is_ignored(&err) => {
                metrics::record_circuit_call(&self.name, "ignored", elapsed);
                self.on_ignored(elapsed);
                Err(CircuitError::Failed(err))
            }
            Ok(Err(err)) => {
                metrics::record_circuit_call(&self.name, "failure", elapsed);
                self.on_failure(elapsed, err.error_kind());
                Err(CircuitError::Failed(err))
            }
            Err(_) => {
                metrics::record_circuit_call(&self.name, "timeout", elapsed);
                self.on_failure(elapsed, "timeout");
                Err(CircuitError::Timeout {
                    circuit: self.name.clone(),
                    timeout: timeout.unwrap_or_default(),
                })
            }
        }
    }

    /// Force the breaker back to Closed and clear its counters.
    pub fn reset(&self) {
        let mut inner = self.lock();
        self.transition(&mut inner, CircuitState::Closed, Instant::now());
        inner.metrics.clear();
        tracing::info!(circuit = %self.name, "Circuit manually reset");
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        let inner = self.lock();
        let now = Instant::now();
        CircuitSnapshot {
            name: self.name.clone(),
            state: inner.state,
            retry_after_secs: self.retry_after_locked(&inner, now).as_secs_f64(),
            half_open_attempts: inner.half_open_attempts,
            half_open_successes: inner.half_open_successes,
            metrics: inner.metrics.summary(now, self.config.failure_window()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admission decision. `Err` carries the retry-after for a rejected call.
    fn admit(&self) -> Result<(), Duration> {
        let mut inner = self.lock();
        let now = Instant::now();

        match inner.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                let retry_after = self.retry_after_locked(&inner, now);
                if !retry_after.is_zero() {
                    return Err(retry_after);
                }
                self.transition(&mut inner, CircuitState::HalfOpen, now);
                inner.half_open_attempts = 1;
                Ok(())
            }
            CircuitState::HalfOpen => {
                if inner.half_open_attempts >= self.config.half_open_max_attempts {
                    self.transition(&mut inner, CircuitState::Open, now);
                    tracing::warn!(
                        circuit = %self.name,
                        attempts = self.config.half_open_max_attempts,
                        "Circuit re-OPENED, half-open probe budget exhausted"
                    );
                    return Err(self.retry_after_locked(&inner, now));
                }
                inner.half_open_attempts += 1;
                Ok(())
            }
        }
    }

    fn on_success(&self, elapsed: Duration) {
        let mut inner = self.lock();
        let now = Instant::now();

        inner.metrics.record_success(elapsed);
        if elapsed >= self.config.slow_call_threshold() {
            inner.metrics.record_slow_call();
        }

        match inner.state {
            CircuitState::HalfOpen => {
                inner.half_open_successes += 1;
                if inner.half_open_successes >= self.config.half_open_success_threshold {
                    self.transition(&mut inner, CircuitState::Closed, now);
                    tracing::info!(circuit = %self.name, "Circuit CLOSED after successful recovery");
                }
            }
            CircuitState::Closed => {
                let window = self.config.failure_window();
                if inner.metrics.recent_failures(now, window) == 0 {
                    if let Some(cutoff) = window.checked_mul(2).and_then(|w| now.checked_sub(w)) {
                        inner.metrics.prune_failures_before(cutoff);
                    }
                }
            }
            CircuitState::Open => {}
        }
    }

    fn on_failure(&self, elapsed: Duration, reason: &str) {
        let mut inner = self.lock();
        let now = Instant::now();

        inner.metrics.record_failure(elapsed, now);
        let recent = inner
            .metrics
            .recent_failures(now, self.config.failure_window());

        match inner.state {
            CircuitState::HalfOpen => {
                self.transition(&mut inner, CircuitState::Open, now);
                tracing::warn!(
                    circuit = %self.name,
                    reason,
                    "Circuit re-OPENED after failure in HALF_OPEN state"
                );
            }
            CircuitState::Closed => {
                if recent >= self.config.failure_threshold as usize {
                    self.transition(&mut inner, CircuitState::Open, now);
                    tracing::error!(
                        circuit = %self.name,
                        failures = recent,
                        window_secs = self.config.failure_window_secs,
                        reason,
                        "Circuit OPENED"
                    );
                } else {
                    tracing::debug!(circuit = %self.name, failures = recent, reason, "Call failed");
                }
            }
            CircuitState::Open => {}
        }
    }

    fn on_ignored(&self, elapsed: Duration) {
        if elapsed >= self.config.slow_call_threshold() {
            self.lock().metrics.record_slow_call();
        }
    }

    fn is_ignored<E: ErrorKind>(&self, err: &E) -> bool {
        let kind = err.error_kind();
        self.config.ignored_errors.iter().any(|ignored| ignored == kind)
    }

    fn transition(&self, inner: &mut BreakerInner, to: CircuitState, now: Instant) {
        let from = inner.state;
        if from == to {
            return;
        }

        inner.state = to;
        inner.last_state_change = now;
        if to != CircuitState::HalfOpen {
            inner.half_open_attempts = 0;
            inner.half_open_successes = 0;
        }
        if to == CircuitState::Open {
            inner.metrics.record_open();
        }

        metrics::record_circuit_transition(&self.name, from, to);
        tracing::debug!(circuit = %self.name, %from, %to, "Circuit transition");
    }

    fn retry_after_locked(&self, inner: &BreakerInner, now: Instant) -> Duration {
        if inner.state != CircuitState::Open {
            return Duration::ZERO;
        }

        let time_in_open = now.saturating_duration_since(inner.last_state_change);
        let recent = inner
            .metrics
            .recent_failures(now, self.config.failure_window());
        let cooldown = open_cooldown(
            self.config.reset_timeout(),
            recent,
            self.config.max_reset_timeout(),
        );

        cooldown.saturating_sub(time_in_open)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[derive(Debug, PartialEq, thiserror::Error)]
    enum TestError {
        #[error("broken")]
        Broken,
        #[error("bad input")]
        BadInput,
    }

    impl ErrorKind for TestError {
        fn error_kind(&self) -> &str {
            match self {
                TestError::Broken => "broken",
                TestError::BadInput => "invalid_input",
            }
        }
    }

    fn config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: 3,
            failure_window_secs: 60.0,
            reset_timeout_secs: 1.0,
            max_reset_timeout_secs: 10.0,
            slow_call_threshold_secs: 5.0,
            call_timeout_secs: None,
            half_open_max_attempts: 2,
            half_open_success_threshold: 2,
            metrics_history_size: 100,
            ignored_errors: vec!["invalid_input".to_string()],
        }
    }

    async fn fail(cb: &CircuitBreaker) -> Result<u32, CircuitError<TestError>> {
        cb.execute(|| async { Err(TestError::Broken) }).await
    }

    async fn succeed(cb: &CircuitBreaker) -> Result<u32, CircuitError<TestError>> {
        cb.execute(|| async { Ok(42) }).await
    }

    async fn trip(cb: &CircuitBreaker) {
        for _ in 0..cb.config().failure_threshold {
            let _ = fail(cb).await;
        }
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_passes_results_through() {
        let cb = CircuitBreaker::new("storage", config());
        assert_eq!(succeed(&cb).await.unwrap(), 42);

        let err = fail(&cb).await.unwrap_err();
        assert!(matches!(err, CircuitError::Failed(TestError::Broken)));
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.snapshot().metrics.total_requests, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_threshold_opens_and_short_circuits() {
        let cb = CircuitBreaker::new("storage", config());
        trip(&cb).await;

        let calls = AtomicU32::new(0);
        let err = cb
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, TestError>(1)
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        match err {
            CircuitError::Open { circuit, retry_after } => {
                assert_eq!(circuit, "storage");
                assert!(retry_after > Duration::ZERO);
            }
            other => panic!("expected open circuit, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_outside_window_do_not_open() {
        let cb = CircuitBreaker::new("storage", config());
        let _ = fail(&cb).await;
        let _ = fail(&cb).await;
        tokio::time::advance(Duration::from_secs(61)).await;
        let _ = fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_uses_exponential_cooldown() {
        let cb = CircuitBreaker::new("storage", config());
        trip(&cb).await;

        // 3 recent failures: 1s * 2^3 = 8s.
        assert_eq!(cb.retry_after(), Duration::from_secs(8));
        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(cb.retry_after(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_expiry_enters_half_open() {
        let cb = CircuitBreaker::new("storage", config());
        trip(&cb).await;

        tokio::time::advance(Duration::from_secs(8)).await;
        assert_eq!(cb.retry_after(), Duration::ZERO);

        assert_eq!(succeed(&cb).await.unwrap(), 42);
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        let snapshot = cb.snapshot();
        assert_eq!(snapshot.half_open_attempts, 1);
        assert_eq!(snapshot.half_open_successes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_recovers_after_successes() {
        let cb = CircuitBreaker::new("storage", config());
        trip(&cb).await;
        tokio::time::advance(Duration::from_secs(8)).await;

        succeed(&cb).await.unwrap();
        succeed(&cb).await.unwrap();
        assert_eq!(cb.state(), CircuitState::Closed);

        let snapshot = cb.snapshot();
        assert_eq!(snapshot.half_open_attempts, 0);
        assert_eq!(snapshot.half_open_successes, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_single_failure_reopens() {
        let cb = CircuitBreaker::new("storage", config());
        trip(&cb).await;
        tokio::time::advance(Duration::from_secs(8)).await;

        assert!(fail(&cb).await.unwrap_err().into_inner().is_some());
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(succeed(&cb).await.unwrap_err().is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_probe_budget() {
        let mut config = config();
        config.half_open_max_attempts = 2;
        config.half_open_success_threshold = 2;
        let cb = Arc::new(CircuitBreaker::new("storage", config));
        trip(&cb).await;
        tokio::time::advance(Duration::from_secs(8)).await;

        // Two slow probes hold the whole budget.
        let slow_probe = |cb: Arc<CircuitBreaker>| async move {
            cb.execute(|| async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok::<_, TestError>(0)
            })
            .await
        };
        let first = tokio::spawn(slow_probe(cb.clone()));
        let second = tokio::spawn(slow_probe(cb.clone()));
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
        assert_eq!(cb.snapshot().half_open_attempts, 2);

        // A third caller finds the budget exhausted.
        assert!(succeed(&cb).await.unwrap_err().is_open());
        assert_eq!(cb.state(), CircuitState::Open);

        let _ = first.await.unwrap();
        let _ = second.await.unwrap();
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_grows_with_continued_failures() {
        let mut config = config();
        config.failure_threshold = 1;
        config.half_open_success_threshold = 1;
        config.half_open_max_attempts = 1;
        config.max_reset_timeout_secs = 10.0;
        let cb = CircuitBreaker::new("storage", config);

        let mut previous = Duration::ZERO;
        let _ = fail(&cb).await;
        for _ in 0..6 {
            let retry_after = cb.retry_after();
            assert!(retry_after >= previous);
            assert!(retry_after <= Duration::from_secs(10));
            previous = retry_after;

            tokio::time::advance(retry_after).await;
            let _ = fail(&cb).await;
            assert_eq!(cb.state(), CircuitState::Open);
        }
        assert_eq!(previous, Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_failure() {
        let mut config = config();
        config.call_timeout_secs = Some(0.5);
        config.failure_threshold = 1;
        let cb = CircuitBreaker::new("storage", config);

        let err = cb
            .execute(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, TestError>(0)
            })
            .await
            .unwrap_err();

        assert!(matches!(err, CircuitError::Timeout { .. }));
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ignored_errors_do_not_trip() {
        let cb = CircuitBreaker::new("storage", config());
        for _ in 0..10 {
            let err = cb
                .execute(|| async { Err::<u32, _>(TestError::BadInput) })
                .await
                .unwrap_err();
            assert!(matches!(err, CircuitError::Failed(TestError::BadInput)));
        }
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.snapshot().metrics.failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_calls_are_counted() {
        let mut config = config();
        config.slow_call_threshold_secs = 1.0;
        let cb = CircuitBreaker::new("storage", config);

        cb.execute(|| async {
            tokio::time::sleep(Duration::from_secs(2)).await;
            Ok::<_, TestError>(())
        })
        .await
        .unwrap();

        assert_eq!(cb.snapshot().metrics.slow_calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_closes_circuit() {
        let cb = CircuitBreaker::new("storage", config());
        trip(&cb).await;
        cb.reset();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(succeed(&cb).await.unwrap(), 42);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_forgets_earlier_failures() {
        let mut config = config();
        config.failure_window_secs = 1000.0;
        config.max_reset_timeout_secs = 100.0;
        let cb = CircuitBreaker::new("storage", config);

        // Build up a long failure history, well past the threshold.
        trip(&cb).await;
        for _ in 0..5 {
            tokio::time::advance(cb.retry_after()).await;
            let _ = fail(&cb).await;
        }
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(cb.snapshot().metrics.recent_failures >= 8);

        cb.reset();
        assert_eq!(cb.snapshot().metrics.recent_failures, 0);

        // A single failure after a reset is below the threshold.
        let _ = fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Closed);

        // Re-tripping starts from the base cooldown: 1s * 2^3.
        let _ = fail(&cb).await;
        let _ = fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.retry_after(), Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn test_threshold_above_history_still_opens() {
        let mut config = config();
        config.failure_threshold = 5;
        config.metrics_history_size = 3;
        let cb = CircuitBreaker::new("storage", config);

        for _ in 0..5 {
            let _ = fail(&cb).await;
        }
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_durations_do_not_panic() {
        let mut config = config();
        config.failure_window_secs = 1e20;
        config.reset_timeout_secs = 1e20;
        config.max_reset_timeout_secs = 1e30;
        config.slow_call_threshold_secs = 1e20;
        let cb = CircuitBreaker::new("storage", config);

        assert_eq!(succeed(&cb).await.unwrap(), 42);
        trip(&cb).await;
        assert!(cb.retry_after() > Duration::from_secs(3600));
        assert!(fail(&cb).await.unwrap_err().is_open());
    }

    #[test]
    fn test_open_error_message() {
        let err: CircuitError<TestError> = CircuitError::Open {
            circuit: "storage".to_string(),
            retry_after: Duration::from_millis(2500),
        };
        assert_eq!(err.to_string(), "circuit \"storage\" is open, retry after 2.5s");
        assert_eq!(err.retry_after(), Some(Duration::from_millis(2500)));
    }
}
