//! Local stand-in for the object store, for running the gateway by hand.
//!
//! `cargo run --example mock_store` then point `storage.base_url` at
//! http://127.0.0.1:9000. Set `MOCK_STORE_FAIL=1` to answer every call with
//! 503 and watch the storage circuit open.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde_json::json;

#[derive(Default)]
struct Store {
    next_id: AtomicU64,
    failing: bool,
}

async fn upload(
    State(store): State<Arc<Store>>,
    Path((_bucket, name)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if store.failing {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    let id = store.next_id.fetch_add(1, Ordering::Relaxed);
    let content_type = headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream");
    Json(json!({
        "id": format!("file-{id}"),
        "name": name,
        "content_type": content_type,
        "size": body.len(),
    }))
    .into_response()
}

async fn link(State(store): State<Arc<Store>>, Path((bucket, id)): Path<(String, String)>) -> Response {
    if store.failing {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    Json(json!({
        "id": id,
        "name": id,
        "url": format!("http://127.0.0.1:9000/download/{bucket}/{id}"),
        "expires_in_secs": 3600,
    }))
    .into_response()
}

async fn rename(
    State(store): State<Arc<Store>>,
    Path((_bucket, id)): Path<(String, String)>,
    Json(body): Json<serde_json::Value>,
) -> Response {
    if store.failing {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    Json(json!({
        "id": id,
        "name": body["new_name"],
        "content_type": "application/octet-stream",
        "size": 0,
    }))
    .into_response()
}

async fn delete(State(store): State<Arc<Store>>) -> StatusCode {
    if store.failing {
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    StatusCode::NO_CONTENT
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(Store {
        failing: std::env::var("MOCK_STORE_FAIL").is_ok_and(|v| v == "1"),
        ..Store::default()
    });

    let app = Router::new()
        .route("/buckets/{bucket}/files/{id}", put(upload).delete(delete))
        .route("/buckets/{bucket}/files/{id}/link", get(link))
        .route("/buckets/{bucket}/files/{id}/rename", post(rename))
        .with_state(store);

    let addr = SocketAddr::from(([127, 0, 0, 1], 9000));
    println!("Mock object store listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
