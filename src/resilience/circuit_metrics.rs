//! Rolling call statistics for one circuit.

use std::collections::VecDeque;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct CircuitMetrics {
    total_requests: u64,
    failures: u64,
    successes: u64,
    slow_calls: u64,
    circuit_opens: u64,
    failure_times: VecDeque<Instant>,
    latencies: VecDeque<Duration>,
    history_size: usize,
}

impl CircuitMetrics {
    pub fn new(history_size: usize) -> Self {
        let history_size = history_size.max(1);
        Self {
            total_requests: 0,
            failures: 0,
            successes: 0,
            slow_calls: 0,
            circuit_opens: 0,
            failure_times: VecDeque::new(),
            latencies: VecDeque::new(),
            history_size,
        }
    }

    pub fn record_success(&mut self, latency: Duration) {
        self.total_requests += 1;
        self.successes += 1;
        self.push_latency(latency);
    }

    pub fn record_failure(&mut self, latency: Duration, at: Instant) {
        self.total_requests += 1;
        self.failures += 1;
        self.push_latency(latency);

        if self.failure_times.len() == self.history_size {
            self.failure_times.pop_front();
        }
        self.failure_times.push_back(at);
    }

    pub fn record_slow_call(&mut self) {
        self.slow_calls += 1;
    }

    pub fn record_open(&mut self) {
        self.circuit_opens += 1;
    }

    fn push_latency(&mut self, latency: Duration) {
        if self.latencies.len() == self.history_size {
            self.latencies.pop_front();
        }
        self.latencies.push_back(latency);
    }

    /// Failures recorded strictly less than `window` before `now`.
    pub fn recent_failures(&self, now: Instant, window: Duration) -> usize {
        self.failure_times
            .iter()
            .filter(|t| now.saturating_duration_since(**t) < window)
            .count()
    }

    /// Drop failure timestamps at or before `cutoff`.
    pub fn prune_failures_before(&mut self, cutoff: Instant) {
        self.failure_times.retain(|t| *t > cutoff);
    }

    pub fn failure_rate(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        self.failures as f64 / self.total_requests as f64
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        self.successes as f64 / self.total_requests as f64
    }

    pub fn average_latency(&self) -> Duration {
        if self.latencies.is_empty() {
            return Duration::ZERO;
        }
        let total: Duration = self.latencies.iter().sum();
        total / self.latencies.len() as u32
    }

    /// Reset counters and forget every failure timestamp.
    ///
    /// `circuit_opens` is lifetime history and survives.
    pub fn clear(&mut self) {
        self.total_requests = 0;
        self.failures = 0;
        self.successes = 0;
        self.slow_calls = 0;
        self.latencies.clear();
        self.failure_times.clear();
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests
    }

    pub fn failures(&self) -> u64 {
        self.failures
    }

    pub fn successes(&self) -> u64 {
        self.successes
    }

    pub fn slow_calls(&self) -> u64 {
        self.slow_calls
    }

    pub fn circuit_opens(&self) -> u64 {
        self.circuit_opens
    }

    pub fn tracked_failures(&self) -> usize {
        self.failure_times.len()
    }

    pub(crate) fn summary(&self, now: Instant, window: Duration) -> MetricsSummary {
        MetricsSummary {
            total_requests: self.total_requests,
            failures: self.failures,
            successes: self.successes,
            slow_calls: self.slow_calls,
            circuit_opens: self.circuit_opens,
            recent_failures: self.recent_failures(now, window),
            failure_rate: self.failure_rate(),
            success_rate: self.success_rate(),
            average_latency_ms: self.average_latency().as_secs_f64() * 1000.0,
        }
    }
}

/// Serializable view of [`CircuitMetrics`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSummary {
    pub total_requests: u64,
    pub failures: u64,
    pub successes: u64,
    pub slow_calls: u64,
    pub circuit_opens: u64,
    pub recent_failures: usize,
    pub failure_rate: f64,
    pub success_rate: f64,
    pub average_latency_ms: f64,
}
