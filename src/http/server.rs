//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (tracing, timeout, request ID, rate limiting)
//! - Serve track file routes through the guarded object store
//! - Forward every other request to the upstream playlist API
//! - Bind server to listener and shut down gracefully

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, State},
    http::{
        uri::{Authority, PathAndQuery, Scheme},
        HeaderValue, Request, StatusCode, Uri,
    },
    middleware,
    response::{IntoResponse, Response},
    routing::{post, put},
    Router,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::admin::setup_admin_router;
use crate::config::GatewayConfig;
use crate::http::files;
use crate::http::middleware::rate_limit_middleware;
use crate::http::request::{self, X_REQUEST_ID};
use crate::http::response;
use crate::observability::metrics;
use crate::resilience::CircuitBreaker;
use crate::security::{CostModel, RateLimiter};
use crate::storage::{GuardedStore, HttpObjectStore, StorageError};

/// Name of the breaker guarding object storage.
pub const STORAGE_CIRCUIT: &str = "object-storage";

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub rate_limiter: Arc<RateLimiter>,
    pub cost_model: Arc<CostModel>,
    pub storage: Arc<GuardedStore<HttpObjectStore>>,
    pub client: Client<HttpConnector, Body>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: GatewayConfig) -> Result<Self, StorageError> {
        let rate_limiter = Arc::new(RateLimiter::new(&config.rate_limit));
        let cost_model = Arc::new(CostModel::new(&config.rate_limit));

        let breaker = Arc::new(CircuitBreaker::new(
            STORAGE_CIRCUIT,
            config.circuit_breaker.clone(),
        ));
        let store = HttpObjectStore::new(&config.storage)?;
        let storage = Arc::new(GuardedStore::new(store, breaker));

        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());

        Ok(Self {
            config: Arc::new(config),
            rate_limiter,
            cost_model,
            storage,
            client,
            started_at: Instant::now(),
        })
    }

    /// Every breaker the gateway owns.
    pub fn circuits(&self) -> Vec<Arc<CircuitBreaker>> {
        vec![self.storage.breaker().clone()]
    }
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    state: AppState,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: GatewayConfig) -> Result<Self, StorageError> {
        let state = AppState::new(config)?;
        let router = Self::build_router(state.clone());
        Ok(Self { router, state })
    }

    /// Build the Axum router with all middleware layers.
    pub fn build_router(state: AppState) -> Router {
        let config = state.config.clone();

        let api = Router::new()
            .route(
                "/api/v1/files/{id}",
                put(files::upload)
                    .get(files::download_link)
                    .delete(files::delete),
            )
            .route("/api/v1/files/{id}/rename", post(files::rename))
            .fallback(proxy_handler)
            .layer(DefaultBodyLimit::max(config.listener.max_body_bytes))
            .layer(middleware::from_fn_with_state(
                state.clone(),
                rate_limit_middleware,
            ))
            .with_state(state.clone());

        let app = if config.admin.enabled {
            setup_admin_router(state).merge(api)
        } else {
            api
        };

        app.layer(request_timeout_layer(config.timeouts.request_secs))
        .layer(request::propagate_request_id_layer())
        .layer(TraceLayer::new_for_http())
        .layer(request::set_request_id_layer())
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let sweeper = spawn_bucket_sweeper(self.state.clone());

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        sweeper.abort();
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Answer 408 when a request outlives `secs`.
fn request_timeout_layer(secs: u64) -> TimeoutLayer {
    TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, Duration::from_secs(secs))
}

/// Periodically evict idle buckets even when no requests arrive.
fn spawn_bucket_sweeper(state: AppState) -> tokio::task::JoinHandle<()> {
    let every = Duration::from_secs(state.config.rate_limit.cleanup_interval_secs.max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            state.rate_limiter.cleanup();
        }
    })
}

/// Forward a request to the upstream playlist API.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let request_id = request::request_id(&request);
    let method = request.method().to_string();

    tracing::debug!(
        request_id = %request_id,
        method = %method,
        path = %request.uri().path(),
        "Proxying request"
    );

    let (mut parts, body) = request.into_parts();

    let mut uri_parts = parts.uri.clone().into_parts();
    uri_parts.scheme = Some(Scheme::HTTP);
    match Authority::from_str(&state.config.upstream.address) {
        Ok(authority) => uri_parts.authority = Some(authority),
        Err(e) => {
            tracing::error!(upstream = %state.config.upstream.address, error = %e, "Invalid upstream address");
            metrics::record_request(&method, 502, start);
            return response::error_body(StatusCode::BAD_GATEWAY, "Bad Gateway", "Invalid upstream address");
        }
    }
    if uri_parts.path_and_query.is_none() {
        uri_parts.path_and_query = Some(PathAndQuery::from_static("/"));
    }
    parts.uri = match Uri::from_parts(uri_parts) {
        Ok(uri) => uri,
        Err(e) => {
            metrics::record_request(&method, 400, start);
            return response::error_body(StatusCode::BAD_REQUEST, "Bad Request", e.to_string());
        }
    };

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        parts.headers.insert(X_REQUEST_ID, value);
    }

    match state.client.request(Request::from_parts(parts, body)).await {
        Ok(upstream) => {
            metrics::record_request(&method, upstream.status().as_u16(), start);
            let (parts, body) = upstream.into_parts();
            Response::from_parts(parts, Body::new(body)).into_response()
        }
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Upstream error");
            metrics::record_request(&method, 502, start);
            response::error_body(
                StatusCode::BAD_GATEWAY,
                "Bad Gateway",
                "Upstream request failed",
            )
        }
    }
}
