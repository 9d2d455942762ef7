//! Rate limiting middleware.
//! Prices each request and spends it from the client's token bucket.

use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, Request},
    middleware::Next,
    response::Response,
};

use crate::http::request::client_identity;
use crate::http::response::{self, X_RATELIMIT_POLICY};
use crate::http::server::AppState;
use crate::observability::metrics;

pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !state.config.rate_limit.enabled {
        return next.run(request).await;
    }

    let identity = client_identity(&request);
    let path = request.uri().path().to_string();
    let cost = state.cost_model.cost(request.method().as_str(), &path);

    let decision = state.rate_limiter.is_allowed(&identity, &path, cost);
    if !decision.allowed {
        tracing::warn!(
            client = %identity,
            path = %path,
            rule = %decision.rule_class,
            cost,
            retry_after_secs = decision.retry_after.as_secs_f64(),
            "Rate limit exceeded"
        );
        metrics::record_rate_limited(&decision.rule_class);
        return response::rate_limited(decision.retry_after);
    }

    let mut response = next.run(request).await;
    if let Ok(policy) = HeaderValue::from_str(&format!("{cost} token(s)")) {
        response.headers_mut().insert(X_RATELIMIT_POLICY, policy);
    }
    response
}
