use std::collections::BTreeMap;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;

use crate::config::{EndpointRule, Rule};
use crate::http::server::AppState;
use crate::resilience::{CircuitSnapshot, CircuitState};

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub uptime_secs: u64,
    pub rate_limiting_enabled: bool,
    pub circuits: BTreeMap<String, CircuitState>,
}

#[derive(Serialize)]
pub struct RateLimitStatus {
    pub enabled: bool,
    pub active_buckets: usize,
    pub rules: BTreeMap<String, Rule>,
    pub endpoints: Vec<EndpointRule>,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    let circuits: BTreeMap<_, _> = state
        .circuits()
        .iter()
        .map(|cb| (cb.name().to_string(), cb.state()))
        .collect();

    let status = if circuits.values().all(|s| *s == CircuitState::Closed) {
        "operational"
    } else {
        "degraded"
    };

    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status,
        uptime_secs: state.started_at.elapsed().as_secs(),
        rate_limiting_enabled: state.config.rate_limit.enabled,
        circuits,
    })
}

pub async fn get_circuits(State(state): State<AppState>) -> Json<Vec<CircuitSnapshot>> {
    Json(state.circuits().iter().map(|cb| cb.snapshot()).collect())
}

pub async fn reset_circuit(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<CircuitSnapshot>, StatusCode> {
    let breaker = state
        .circuits()
        .into_iter()
        .find(|cb| cb.name() == name)
        .ok_or(StatusCode::NOT_FOUND)?;

    breaker.reset();
    Ok(Json(breaker.snapshot()))
}

pub async fn get_rate_limits(State(state): State<AppState>) -> Json<RateLimitStatus> {
    Json(RateLimitStatus {
        enabled: state.config.rate_limit.enabled,
        active_buckets: state.rate_limiter.bucket_count(),
        rules: state.rate_limiter.rules().clone(),
        endpoints: state.config.rate_limit.endpoints.clone(),
    })
}
