//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, body limits).
    pub listener: ListenerConfig,

    /// The playlist API that non-storage requests are forwarded to.
    pub upstream: UpstreamConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Circuit breaker guarding the object store.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Object store connection settings.
    pub storage: StorageConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum accepted request body in bytes (uploads included).
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_body_bytes: 50 * 1024 * 1024,
        }
    }
}

/// Upstream playlist API.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Upstream address (e.g., "127.0.0.1:8000").
    pub address: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:8000".to_string(),
        }
    }
}

/// Timeout configuration for inbound requests.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Capacity and refill rate for one rule class.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Rule {
    /// Maximum tokens a bucket can hold.
    pub capacity: f64,
    /// Tokens added per second.
    pub rate: f64,
}

/// Path fragments that select a rule class.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EndpointRule {
    /// Rule class name, must exist in `rules`.
    pub class: String,
    /// Substrings matched against the request path.
    pub paths: Vec<String>,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Minimum seconds between two idle-bucket sweeps.
    pub cleanup_interval_secs: u64,

    /// Rule definitions keyed by class. `global` is mandatory.
    pub rules: BTreeMap<String, Rule>,

    /// Ordered endpoint table. Earlier entries win ties.
    pub endpoints: Vec<EndpointRule>,

    /// Base cost per HTTP method.
    pub operations_costs: BTreeMap<String, f64>,

    /// Cost multipliers applied when a path contains the fragment.
    pub operations_costs_factors: BTreeMap<String, f64>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        let rules = BTreeMap::from([
            ("global".to_string(), Rule { capacity: 100.0, rate: 10.0 }),
            ("upload".to_string(), Rule { capacity: 10.0, rate: 0.5 }),
            ("auth".to_string(), Rule { capacity: 5.0, rate: 0.1 }),
        ]);

        let endpoints = vec![
            EndpointRule {
                class: "upload".to_string(),
                paths: vec!["/upload".to_string(), "/files".to_string()],
            },
            EndpointRule {
                class: "auth".to_string(),
                paths: vec![
                    "/login".to_string(),
                    "/register".to_string(),
                    "/token".to_string(),
                ],
            },
        ];

        let operations_costs = BTreeMap::from([
            ("GET".to_string(), 1.0),
            ("HEAD".to_string(), 1.0),
            ("POST".to_string(), 2.0),
            ("PUT".to_string(), 2.0),
            ("PATCH".to_string(), 2.0),
            ("DELETE".to_string(), 3.0),
        ]);

        let operations_costs_factors = BTreeMap::from([
            ("/upload".to_string(), 5.0),
            ("/download".to_string(), 2.0),
        ]);

        Self {
            enabled: true,
            cleanup_interval_secs: 60,
            rules,
            endpoints,
            operations_costs,
            operations_costs_factors,
        }
    }
}

/// Circuit breaker tuning.
///
/// All durations are seconds as floats so sub-second values can be used in tests.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Recent failures needed to open the circuit.
    pub failure_threshold: u32,

    /// Window used to count recent failures.
    pub failure_window_secs: f64,

    /// Base cooldown before a probe is allowed.
    pub reset_timeout_secs: f64,

    /// Upper bound for the exponential cooldown.
    pub max_reset_timeout_secs: f64,

    /// Calls at or above this duration are counted as slow.
    pub slow_call_threshold_secs: f64,

    /// Optional deadline for each guarded call.
    pub call_timeout_secs: Option<f64>,

    /// Probe calls allowed per half-open episode.
    pub half_open_max_attempts: u32,

    /// Successful probes needed to close the circuit.
    pub half_open_success_threshold: u32,

    /// Bound on stored failure timestamps and latency samples.
    pub metrics_history_size: usize,

    /// Error kinds that do not count against the dependency.
    pub ignored_errors: Vec<String>,
}

/// Seconds to a `Duration`, saturating instead of panicking.
///
/// Values too large for `Duration` become `Duration::MAX`; negative and NaN
/// values become zero.
pub fn saturating_secs(secs: f64) -> Duration {
    match Duration::try_from_secs_f64(secs) {
        Ok(duration) => duration,
        Err(_) if secs > 0.0 => Duration::MAX,
        Err(_) => Duration::ZERO,
    }
}

impl CircuitBreakerConfig {
    pub fn failure_window(&self) -> Duration {
        saturating_secs(self.failure_window_secs)
    }

    pub fn reset_timeout(&self) -> Duration {
        saturating_secs(self.reset_timeout_secs)
    }

    pub fn max_reset_timeout(&self) -> Duration {
        saturating_secs(self.max_reset_timeout_secs)
    }

    pub fn slow_call_threshold(&self) -> Duration {
        saturating_secs(self.slow_call_threshold_secs)
    }

    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_secs.map(saturating_secs)
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            failure_window_secs: 60.0,
            reset_timeout_secs: 60.0,
            max_reset_timeout_secs: 300.0,
            slow_call_threshold_secs: 5.0,
            call_timeout_secs: None,
            half_open_max_attempts: 2,
            half_open_success_threshold: 2,
            metrics_history_size: 1000,
            ignored_errors: vec!["invalid_input".to_string(), "not_found".to_string()],
        }
    }
}

/// Object store connection settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Base URL of the object store REST API.
    pub base_url: String,

    /// Bucket holding the audio files.
    pub bucket: String,

    /// Lifetime of generated download links in seconds.
    pub link_lifetime_secs: u64,

    /// Transport-level timeout for a single HTTP call in seconds.
    pub request_timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:9000".to_string(),
            bucket: "tracks".to_string(),
            link_lifetime_secs: 3600,
            request_timeout_secs: 30,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Mount the admin routes.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
        }
    }
}
