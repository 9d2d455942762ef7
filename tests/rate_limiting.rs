mod common;

use common::{start_gateway, start_mock_backend, start_mock_store, test_config, MockStore};
use playlist_gateway::config::{EndpointRule, Rule};
use reqwest::StatusCode;

async fn gateway_with_auth_rule(capacity: f64) -> common::TestGateway {
    let upstream = start_mock_backend("playlist-api").await;
    let store = start_mock_store(MockStore::healthy()).await;

    let mut config = test_config(upstream, store);
    config.rate_limit.rules.insert(
        "auth".to_string(),
        Rule {
            capacity,
            rate: 0.01,
        },
    );
    config.rate_limit.endpoints = vec![EndpointRule {
        class: "auth".to_string(),
        paths: vec!["/login".to_string(), "/register".to_string()],
    }];
    start_gateway(config).await
}

#[tokio::test]
async fn test_exhausted_bucket_returns_429() {
    let gateway = gateway_with_auth_rule(3.0).await;
    let client = reqwest::Client::new();

    for _ in 0..3 {
        let res = client.get(gateway.url("/login")).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()["x-ratelimit-policy"], "1 token(s)");
        assert_eq!(res.text().await.unwrap(), "playlist-api");
    }

    let res = client.get(gateway.url("/login")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);

    let retry_after: u64 = res.headers()["retry-after"].to_str().unwrap().parse().unwrap();
    // One token at 0.01/s.
    assert!((99..=100).contains(&retry_after), "retry-after {retry_after}");
    assert!(res.headers().contains_key("x-ratelimit-reset"));

    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "Rate limit exceeded");
    assert!(body["message"].as_str().unwrap().starts_with("Please try again in"));

    gateway.stop();
}

#[tokio::test]
async fn test_endpoints_have_separate_buckets() {
    let gateway = gateway_with_auth_rule(1.0).await;
    let client = reqwest::Client::new();

    let res = client.get(gateway.url("/login")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let res = client.get(gateway.url("/login")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);

    // Same client and rule class, different endpoint path.
    let res = client.get(gateway.url("/register")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    // Unclassified paths use the global rule.
    let res = client.get(gateway.url("/playlists")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    gateway.stop();
}

#[tokio::test]
async fn test_request_cost_follows_method() {
    let gateway = gateway_with_auth_rule(3.0).await;
    let client = reqwest::Client::new();

    let res = client.delete(gateway.url("/login")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["x-ratelimit-policy"], "3 token(s)");

    let res = client.get(gateway.url("/login")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);

    gateway.stop();
}

#[tokio::test]
async fn test_disabled_rate_limiting_admits_everything() {
    let upstream = start_mock_backend("ok").await;
    let store = start_mock_store(MockStore::healthy()).await;
    let mut config = test_config(upstream, store);
    config.rate_limit.enabled = false;
    config.rate_limit.rules.insert(
        "global".to_string(),
        Rule {
            capacity: 1.0,
            rate: 0.0,
        },
    );
    let gateway = start_gateway(config).await;
    let client = reqwest::Client::new();

    for _ in 0..5 {
        let res = client.get(gateway.url("/playlists")).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert!(!res.headers().contains_key("x-ratelimit-policy"));
    }

    gateway.stop();
}

#[tokio::test]
async fn test_admin_reports_buckets() {
    let gateway = gateway_with_auth_rule(3.0).await;
    let client = reqwest::Client::new();

    client.get(gateway.url("/login")).send().await.unwrap();
    client.get(gateway.url("/playlists")).send().await.unwrap();

    let res = client
        .get(gateway.url("/admin/rate-limits"))
        .bearer_auth(common::TEST_ADMIN_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["enabled"], true);
    assert_eq!(body["active_buckets"], 2);
    assert_eq!(body["rules"]["auth"]["capacity"], 3.0);

    gateway.stop();
}
