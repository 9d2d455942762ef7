//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use playlist_gateway::config::GatewayConfig;
use playlist_gateway::{HttpServer, Shutdown};
use serde_json::json;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

/// Start a simple mock backend that returns a fixed response.
pub async fn start_mock_backend(response: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        let response_str = format!(
                            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            response.len(),
                            response
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Start a backend that accepts connections and never answers.
pub async fn start_silent_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    addr
}

/// Programmable object store. Answers every call with `status` unless it is 200.
pub struct MockStore {
    pub calls: AtomicU32,
    pub status: AtomicU16,
    pub healthy: AtomicBool,
}

impl MockStore {
    pub fn healthy() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU32::new(0),
            status: AtomicU16::new(200),
            healthy: AtomicBool::new(true),
        })
    }

    pub fn failing(status: u16) -> Arc<Self> {
        let store = Self::healthy();
        store.fail_with(status);
        store
    }

    pub fn fail_with(&self, status: u16) {
        self.status.store(status, Ordering::SeqCst);
        self.healthy.store(false, Ordering::SeqCst);
    }

    pub fn recover(&self) {
        self.status.store(200, Ordering::SeqCst);
        self.healthy.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn outcome(&self) -> Option<StatusCode> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.healthy.load(Ordering::SeqCst) {
            return None;
        }
        StatusCode::from_u16(self.status.load(Ordering::SeqCst)).ok()
    }
}

async fn store_upload(
    State(store): State<Arc<MockStore>>,
    Path((_bucket, name)): Path<(String, String)>,
    body: axum::body::Bytes,
) -> Response {
    if let Some(status) = store.outcome() {
        return status.into_response();
    }
    (
        StatusCode::OK,
        Json(json!({
            "id": "file-1",
            "name": name,
            "content_type": "audio/mpeg",
            "size": body.len(),
        })),
    )
        .into_response()
}

async fn store_link(
    State(store): State<Arc<MockStore>>,
    Path((_bucket, id)): Path<(String, String)>,
) -> Response {
    if let Some(status) = store.outcome() {
        return status.into_response();
    }
    Json(json!({
        "id": id,
        "name": "song.mp3",
        "url": format!("http://cdn.local/{id}?token=abc"),
        "expires_in_secs": 3600,
    }))
    .into_response()
}

async fn store_rename(
    State(store): State<Arc<MockStore>>,
    Path((_bucket, id)): Path<(String, String)>,
    Json(body): Json<serde_json::Value>,
) -> Response {
    if let Some(status) = store.outcome() {
        return status.into_response();
    }
    Json(json!({
        "id": id,
        "name": body["new_name"],
        "content_type": "audio/mpeg",
        "size": 3,
    }))
    .into_response()
}

async fn store_delete(
    State(store): State<Arc<MockStore>>,
    Path((_bucket, _id)): Path<(String, String)>,
) -> Response {
    match store.outcome() {
        Some(status) => status.into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

/// Serve `store` over the object store wire protocol.
pub async fn start_mock_store(store: Arc<MockStore>) -> SocketAddr {
    let app = Router::new()
        .route("/buckets/{bucket}/files/{id}", put(store_upload).delete(store_delete))
        .route("/buckets/{bucket}/files/{id}/link", get(store_link))
        .route("/buckets/{bucket}/files/{id}/rename", post(store_rename))
        .with_state(store);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

/// Config pointing at the given mocks, with metrics off and admin enabled.
pub fn test_config(upstream: SocketAddr, store: SocketAddr) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.upstream.address = upstream.to_string();
    config.storage.base_url = format!("http://{store}");
    config.storage.request_timeout_secs = 5;
    config.observability.metrics_enabled = false;
    config.admin.enabled = true;
    config.admin.api_key = TEST_ADMIN_KEY.to_string();
    config
}

pub const TEST_ADMIN_KEY: &str = "test-admin-key";

/// A running gateway. Dropping it does not stop the server; call `stop`.
pub struct TestGateway {
    pub addr: SocketAddr,
    shutdown: Shutdown,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn stop(&self) {
        self.shutdown.trigger();
    }
}

pub async fn start_gateway(config: GatewayConfig) -> TestGateway {
    let listener = TcpListener::bind(&config.listener.bind_address).await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    let server = HttpServer::new(config).unwrap();
    tokio::spawn(async move {
        let _ = server.run(listener, rx).await;
    });

    TestGateway { addr, shutdown }
}
