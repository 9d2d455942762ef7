//! Startup orchestration.
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Metrics exporter starts before the listener
//! - Listener binds last, so traffic only arrives when the gateway is ready

use std::sync::Arc;

use tokio::net::TcpListener;

use crate::config::{unaffordable_costs, GatewayConfig};
use crate::http::HttpServer;
use crate::lifecycle::{signals, Shutdown};
use crate::observability::metrics;

/// Start every subsystem and serve until a shutdown signal arrives.
pub async fn run(config: GatewayConfig) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.address,
        storage = %config.storage.base_url,
        rate_limiting = config.rate_limit.enabled,
        failure_threshold = config.circuit_breaker.failure_threshold,
        "Configuration loaded"
    );

    for unaffordable in unaffordable_costs(&config.rate_limit) {
        tracing::warn!(
            method = %unaffordable.method,
            path = %unaffordable.path,
            cost = unaffordable.cost,
            rule_class = %unaffordable.rule_class,
            capacity = unaffordable.capacity,
            "Request cost exceeds rule capacity, these requests will always be rejected"
        );
    }

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Arc::new(Shutdown::new());
    let server = HttpServer::new(config)?;
    let signal_task = signals::spawn_signal_handler(shutdown.clone());

    server.run(listener, shutdown.subscribe()).await?;
    signal_task.abort();

    Ok(())
}
