//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (endpoint classes reference existing rules)
//! - Validate value ranges (capacities > 0, thresholds > 0, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system
//! - Costs no request can ever afford are warnings, not errors

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use crate::config::schema::{CircuitBreakerConfig, GatewayConfig, RateLimitConfig};
use crate::security::{CostModel, RateLimiter};

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("rate_limit.rules must define a \"global\" rule")]
    MissingGlobalRule,

    #[error("rule \"{class}\": capacity must be positive, got {value}")]
    InvalidCapacity { class: String, value: f64 },

    #[error("rule \"{class}\": rate must be finite and non-negative, got {value}")]
    InvalidRate { class: String, value: f64 },

    #[error("endpoint class \"{0}\" has no matching rule")]
    UnknownEndpointClass(String),

    #[error("cost for \"{key}\" must be positive, got {value}")]
    InvalidCost { key: String, value: f64 },

    #[error("circuit_breaker.{field} must be greater than zero")]
    ZeroValue { field: &'static str },

    #[error("circuit_breaker.{field} is too large to represent as a duration")]
    DurationOutOfRange { field: &'static str },

    #[error("circuit_breaker.failure_threshold ({threshold}) exceeds metrics_history_size ({history})")]
    ThresholdExceedsHistory { threshold: u32, history: usize },

    #[error("circuit_breaker.half_open_success_threshold ({success}) exceeds half_open_max_attempts ({attempts})")]
    UnreachableRecovery { success: u32, attempts: u32 },

    #[error("circuit_breaker.max_reset_timeout_secs is below reset_timeout_secs")]
    InvertedResetTimeouts,

    #[error("{field}: invalid socket address \"{value}\"")]
    InvalidAddress { field: &'static str, value: String },

    #[error("storage.base_url: invalid URL \"{0}\"")]
    InvalidUrl(String),
}

/// Validate a parsed configuration, collecting every error found.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);
    check_address(&mut errors, "upstream.address", &config.upstream.address);
    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    if url::Url::parse(&config.storage.base_url).is_err() {
        errors.push(ValidationError::InvalidUrl(config.storage.base_url.clone()));
    }

    validate_rate_limit(&mut errors, &config.rate_limit);
    validate_circuit_breaker(&mut errors, &config.circuit_breaker);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}

fn validate_rate_limit(errors: &mut Vec<ValidationError>, config: &RateLimitConfig) {
    if !config.rules.contains_key("global") {
        errors.push(ValidationError::MissingGlobalRule);
    }

    for (class, rule) in &config.rules {
        if !(rule.capacity.is_finite() && rule.capacity > 0.0) {
            errors.push(ValidationError::InvalidCapacity {
                class: class.clone(),
                value: rule.capacity,
            });
        }
        if !(rule.rate.is_finite() && rule.rate >= 0.0) {
            errors.push(ValidationError::InvalidRate {
                class: class.clone(),
                value: rule.rate,
            });
        }
    }

    for endpoint in &config.endpoints {
        if !config.rules.contains_key(&endpoint.class) {
            errors.push(ValidationError::UnknownEndpointClass(endpoint.class.clone()));
        }
    }

    let costs = config
        .operations_costs
        .iter()
        .chain(config.operations_costs_factors.iter());
    for (key, value) in costs {
        if !(value.is_finite() && *value > 0.0) {
            errors.push(ValidationError::InvalidCost {
                key: key.clone(),
                value: *value,
            });
        }
    }
}

fn validate_circuit_breaker(errors: &mut Vec<ValidationError>, config: &CircuitBreakerConfig) {
    let counts = [
        ("failure_threshold", config.failure_threshold),
        ("half_open_max_attempts", config.half_open_max_attempts),
        ("half_open_success_threshold", config.half_open_success_threshold),
    ];
    for (field, value) in counts {
        if value == 0 {
            errors.push(ValidationError::ZeroValue { field });
        }
    }

    let durations = [
        ("failure_window_secs", config.failure_window_secs),
        ("reset_timeout_secs", config.reset_timeout_secs),
        ("max_reset_timeout_secs", config.max_reset_timeout_secs),
        ("slow_call_threshold_secs", config.slow_call_threshold_secs),
        ("call_timeout_secs", config.call_timeout_secs.unwrap_or(1.0)),
    ];
    for (field, value) in durations {
        if !(value.is_finite() && value > 0.0) {
            errors.push(ValidationError::ZeroValue { field });
        } else if Duration::try_from_secs_f64(value).is_err() {
            errors.push(ValidationError::DurationOutOfRange { field });
        }
    }

    if config.metrics_history_size == 0 {
        errors.push(ValidationError::ZeroValue { field: "metrics_history_size" });
    } else if config.failure_threshold as usize > config.metrics_history_size {
        errors.push(ValidationError::ThresholdExceedsHistory {
            threshold: config.failure_threshold,
            history: config.metrics_history_size,
        });
    }

    if config.half_open_success_threshold > config.half_open_max_attempts {
        errors.push(ValidationError::UnreachableRecovery {
            success: config.half_open_success_threshold,
            attempts: config.half_open_max_attempts,
        });
    }

    if config.max_reset_timeout_secs < config.reset_timeout_secs {
        errors.push(ValidationError::InvertedResetTimeouts);
    }
}

/// A method and path fragment whose cost exceeds its class capacity.
///
/// Such requests are rejected forever, whatever the bucket state.
#[derive(Debug, Clone, PartialEq)]
pub struct UnaffordableCost {
    pub method: String,
    pub path: String,
    pub cost: f64,
    pub rule_class: String,
    pub capacity: f64,
}

impl fmt::Display for UnaffordableCost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} on \"{}\" costs {} token(s) but rule \"{}\" holds at most {}",
            self.method, self.path, self.cost, self.rule_class, self.capacity
        )
    }
}

/// List every configured method and path fragment that can never be admitted.
///
/// Each cost factor fragment and endpoint fragment is priced as if it were
/// the whole path. A real path matching several factors costs more still.
pub fn unaffordable_costs(config: &RateLimitConfig) -> Vec<UnaffordableCost> {
    let limiter = RateLimiter::new(config);
    let costs = CostModel::new(config);

    let mut paths: Vec<&str> = config
        .operations_costs_factors
        .keys()
        .chain(config.endpoints.iter().flat_map(|e| e.paths.iter()))
        .map(String::as_str)
        .filter(|path| !path.is_empty())
        .collect();
    paths.sort_unstable();
    paths.dedup();

    let mut found = Vec::new();
    for path in paths {
        let rule_class = limiter.resolve_rule_class(path);
        let capacity = limiter.rule(rule_class).capacity;
        for method in config.operations_costs.keys() {
            let cost = costs.cost(method, path);
            if cost > capacity {
                found.push(UnaffordableCost {
                    method: method.to_ascii_uppercase(),
                    path: path.to_string(),
                    cost,
                    rule_class: rule_class.to_string(),
                    capacity,
                });
            }
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{EndpointRule, Rule};

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(validate_config(&GatewayConfig::default()), Ok(()));
    }

    #[test]
    fn test_collects_all_rate_limit_errors() {
        let mut config = GatewayConfig::default();
        config.rate_limit.rules.remove("global");
        config
            .rate_limit
            .rules
            .insert("broken".to_string(), Rule { capacity: 0.0, rate: -1.0 });
        config.rate_limit.endpoints.push(EndpointRule {
            class: "missing".to_string(),
            paths: vec!["/x".to_string()],
        });
        config.rate_limit.operations_costs.insert("GET".to_string(), 0.0);

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::MissingGlobalRule));
        assert!(errors.contains(&ValidationError::InvalidCapacity {
            class: "broken".to_string(),
            value: 0.0
        }));
        assert!(errors.contains(&ValidationError::InvalidRate {
            class: "broken".to_string(),
            value: -1.0
        }));
        assert!(errors.contains(&ValidationError::UnknownEndpointClass("missing".to_string())));
        assert!(errors.contains(&ValidationError::InvalidCost {
            key: "GET".to_string(),
            value: 0.0
        }));
    }

    #[test]
    fn test_zero_refill_rate_is_allowed() {
        let mut config = GatewayConfig::default();
        config
            .rate_limit
            .rules
            .insert("frozen".to_string(), Rule { capacity: 1.0, rate: 0.0 });
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_circuit_breaker_errors() {
        let mut config = GatewayConfig::default();
        config.circuit_breaker.failure_threshold = 0;
        config.circuit_breaker.half_open_max_attempts = 1;
        config.circuit_breaker.half_open_success_threshold = 3;
        config.circuit_breaker.max_reset_timeout_secs = 10.0;
        config.circuit_breaker.call_timeout_secs = Some(0.0);

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::ZeroValue { field: "failure_threshold" }));
        assert!(errors.contains(&ValidationError::ZeroValue { field: "call_timeout_secs" }));
        assert!(errors.contains(&ValidationError::UnreachableRecovery { success: 3, attempts: 1 }));
        assert!(errors.contains(&ValidationError::InvertedResetTimeouts));
    }

    #[test]
    fn test_huge_durations_are_rejected() {
        let mut config = GatewayConfig::default();
        config.circuit_breaker.failure_window_secs = 1e20;
        config.circuit_breaker.max_reset_timeout_secs = f64::MAX;

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::DurationOutOfRange {
            field: "failure_window_secs"
        }));
        assert!(errors.contains(&ValidationError::DurationOutOfRange {
            field: "max_reset_timeout_secs"
        }));
    }

    #[test]
    fn test_threshold_must_fit_history() {
        let mut config = GatewayConfig::default();
        config.circuit_breaker.failure_threshold = 5;
        config.circuit_breaker.metrics_history_size = 3;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::ThresholdExceedsHistory { threshold: 5, history: 3 }]
        );

        config.circuit_breaker.metrics_history_size = 5;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_unaffordable_costs_are_listed() {
        let config = RateLimitConfig::default();
        let found = unaffordable_costs(&config);

        // DELETE on /upload: 3 * 5 = 15 tokens against an upload capacity of 10.
        assert_eq!(
            found,
            vec![UnaffordableCost {
                method: "DELETE".to_string(),
                path: "/upload".to_string(),
                cost: 15.0,
                rule_class: "upload".to_string(),
                capacity: 10.0,
            }]
        );
        assert_eq!(
            found[0].to_string(),
            "DELETE on \"/upload\" costs 15 token(s) but rule \"upload\" holds at most 10"
        );
    }

    #[test]
    fn test_affordable_costs_are_not_listed() {
        let mut config = RateLimitConfig::default();
        config
            .rules
            .insert("upload".to_string(), Rule { capacity: 20.0, rate: 0.5 });
        assert!(unaffordable_costs(&config).is_empty());
    }

    #[test]
    fn test_bad_addresses() {
        let mut config = GatewayConfig::default();
        config.upstream.address = "not-an-address".to_string();
        config.storage.base_url = "::nope".to_string();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
    }
}
