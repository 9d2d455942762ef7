//! Track file routes, served through the guarded object store.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;

use crate::http::response;
use crate::http::server::AppState;
use crate::resilience::CircuitError;
use crate::storage::{StorageError, DEFAULT_CONTENT_TYPE};

#[derive(Debug, Deserialize)]
pub struct RenameBody {
    pub name: String,
    pub new_name: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteParams {
    pub name: String,
}

fn failure(operation: &str, err: CircuitError<StorageError>) -> Response {
    match &err {
        CircuitError::Open { retry_after, .. } => tracing::warn!(
            operation,
            retry_after_secs = retry_after.as_secs_f64(),
            "Storage call rejected, circuit open"
        ),
        CircuitError::Failed(StorageError::InvalidInput(_) | StorageError::NotFound(_)) => {
            tracing::debug!(operation, error = %err, "Storage call refused")
        }
        _ => tracing::error!(operation, error = %err, "Storage call failed"),
    }
    response::storage_error(err)
}

/// `PUT /api/v1/files/{name}`
pub async fn upload(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(DEFAULT_CONTENT_TYPE);

    match state.storage.upload(&name, content_type, body.to_vec()).await {
        Ok(object) => (StatusCode::CREATED, Json(object)).into_response(),
        Err(err) => failure("upload", err),
    }
}

/// `GET /api/v1/files/{id}`
pub async fn download_link(State(state): State<AppState>, Path(file_id): Path<String>) -> Response {
    match state.storage.download_link(&file_id).await {
        Ok(link) => Json(link).into_response(),
        Err(err) => failure("download", err),
    }
}

/// `POST /api/v1/files/{id}/rename`
pub async fn rename(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
    Json(body): Json<RenameBody>,
) -> Response {
    match state
        .storage
        .rename(&file_id, &body.name, &body.new_name)
        .await
    {
        Ok(object) => Json(object).into_response(),
        Err(err) => failure("rename", err),
    }
}

/// `DELETE /api/v1/files/{id}?name=...`
pub async fn delete(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
    Query(params): Query<DeleteParams>,
) -> Response {
    match state.storage.delete(&file_id, &params.name).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => failure("delete", err),
    }
}
