//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method, status
//! - `gateway_request_duration_seconds` (histogram): latency distribution
//! - `gateway_rate_limited_total` (counter): rejections by rule class
//! - `gateway_rate_limit_buckets` (gauge): live token buckets
//! - `gateway_circuit_state` (gauge): 0=closed, 1=open, 2=half-open
//! - `gateway_circuit_transitions_total` (counter): by circuit, from, to
//! - `gateway_circuit_rejected_total` (counter): calls failed fast
//! - `gateway_circuit_call_duration_seconds` (histogram): by circuit, outcome
//!
//! Recording is a no-op until a recorder is installed, so library code and
//! tests can call these freely.

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::time::Instant;

use crate::resilience::CircuitState;

/// Install the Prometheus recorder and its scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    let status = status.to_string();
    counter!(
        "gateway_requests_total",
        "method" => method.to_string(),
        "status" => status.clone()
    )
    .increment(1);
    histogram!(
        "gateway_request_duration_seconds",
        "method" => method.to_string(),
        "status" => status
    )
    .record(start.elapsed().as_secs_f64());
}

pub fn record_rate_limited(rule: &str) {
    counter!("gateway_rate_limited_total", "rule" => rule.to_string()).increment(1);
}

pub fn record_bucket_count(count: usize) {
    gauge!("gateway_rate_limit_buckets").set(count as f64);
}

pub fn record_circuit_state(circuit: &str, state: CircuitState) {
    let value = match state {
        CircuitState::Closed => 0.0,
        CircuitState::Open => 1.0,
        CircuitState::HalfOpen => 2.0,
    };
    gauge!("gateway_circuit_state", "circuit" => circuit.to_string()).set(value);
}

pub fn record_circuit_transition(circuit: &str, from: CircuitState, to: CircuitState) {
    counter!(
        "gateway_circuit_transitions_total",
        "circuit" => circuit.to_string(),
        "from" => from.as_str(),
        "to" => to.as_str()
    )
    .increment(1);
    record_circuit_state(circuit, to);
}

pub fn record_circuit_rejected(circuit: &str) {
    counter!("gateway_circuit_rejected_total", "circuit" => circuit.to_string()).increment(1);
}

pub fn record_circuit_call(circuit: &str, outcome: &'static str, elapsed: Duration) {
    histogram!(
        "gateway_circuit_call_duration_seconds",
        "circuit" => circuit.to_string(),
        "outcome" => outcome
    )
    .record(elapsed.as_secs_f64());
}
