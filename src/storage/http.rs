//! REST client for the object store.
//!
//! # Wire Protocol
//! ```text
//! PUT    {base}/buckets/{bucket}/files/{name}            body = file bytes
//! GET    {base}/buckets/{bucket}/files/{id}/link?lifetime={secs}
//! POST   {base}/buckets/{bucket}/files/{id}/rename       {"name", "new_name"}
//! DELETE {base}/buckets/{bucket}/files/{id}?name={name}
//! ```

use std::time::Duration;

use reqwest::{header::CONTENT_TYPE, Client, Response, StatusCode};
use serde::Serialize;
use url::Url;

use crate::config::StorageConfig;
use crate::storage::{DownloadLink, ObjectStore, StorageError, StoredObject, DEFAULT_CONTENT_TYPE};

#[derive(Debug, Clone)]
pub struct HttpObjectStore {
    client: Client,
    base_url: Url,
    bucket: String,
    link_lifetime_secs: u64,
}

#[derive(Serialize)]
struct RenameRequest<'a> {
    name: &'a str,
    new_name: &'a str,
}

impl HttpObjectStore {
    pub fn new(config: &StorageConfig) -> Result<Self, StorageError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| StorageError::InvalidInput(format!("base_url: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(StorageError::InvalidInput(format!(
                "base_url cannot be a base: {base_url}"
            )));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            bucket: config.bucket.clone(),
            link_lifetime_secs: config.link_lifetime_secs,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// URL of `segments` below this store's bucket.
    fn file_url(&self, segments: &[&str]) -> Result<Url, StorageError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| StorageError::InvalidInput("base_url cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(["buckets", self.bucket.as_str(), "files"])
            .extend(segments);
        Ok(url)
    }
}

fn require(field: &str, value: &str) -> Result<(), StorageError> {
    if value.trim().is_empty() {
        return Err(StorageError::InvalidInput(format!("{field} must not be empty")));
    }
    Ok(())
}

fn transport_error(e: reqwest::Error) -> StorageError {
    if e.is_timeout() {
        StorageError::Timeout
    } else if e.is_connect() {
        StorageError::Connection(e.to_string())
    } else if e.is_decode() {
        StorageError::Unavailable(format!("malformed response: {e}"))
    } else {
        StorageError::Unavailable(e.to_string())
    }
}

/// Map a non-success status to a [`StorageError`].
async fn check_status(response: Response, subject: &str) -> Result<Response, StorageError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    match status {
        StatusCode::NOT_FOUND => Err(StorageError::NotFound(subject.to_string())),
        StatusCode::BAD_REQUEST
        | StatusCode::CONFLICT
        | StatusCode::PAYLOAD_TOO_LARGE
        | StatusCode::UNSUPPORTED_MEDIA_TYPE
        | StatusCode::UNPROCESSABLE_ENTITY => {
            let detail = response.text().await.unwrap_or_default();
            Err(StorageError::InvalidInput(format!("{status}: {detail}")))
        }
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => Err(StorageError::Timeout),
        _ => Err(StorageError::Unavailable(format!("object store returned {status}"))),
    }
}

impl ObjectStore for HttpObjectStore {
    async fn upload(
        &self,
        name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<StoredObject, StorageError> {
        require("name", name)?;
        if bytes.is_empty() {
            return Err(StorageError::InvalidInput("file is empty".to_string()));
        }
        let content_type = if content_type.is_empty() {
            DEFAULT_CONTENT_TYPE
        } else {
            content_type
        };

        let size = bytes.len();
        let response = self
            .client
            .put(self.file_url(&[name])?)
            .header(CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await
            .map_err(transport_error)?;
        let object: StoredObject = check_status(response, name)
            .await?
            .json()
            .await
            .map_err(transport_error)?;

        tracing::debug!(file_id = %object.id, name, size, "Uploaded file");
        Ok(object)
    }

    async fn download_link(&self, file_id: &str) -> Result<DownloadLink, StorageError> {
        require("file_id", file_id)?;

        let mut url = self.file_url(&[file_id, "link"])?;
        url.query_pairs_mut()
            .append_pair("lifetime", &self.link_lifetime_secs.to_string());

        let response = self.client.get(url).send().await.map_err(transport_error)?;
        check_status(response, file_id)
            .await?
            .json()
            .await
            .map_err(transport_error)
    }

    async fn rename(
        &self,
        file_id: &str,
        name: &str,
        new_name: &str,
    ) -> Result<StoredObject, StorageError> {
        require("file_id", file_id)?;
        require("name", name)?;
        require("new_name", new_name)?;

        let response = self
            .client
            .post(self.file_url(&[file_id, "rename"])?)
            .json(&RenameRequest { name, new_name })
            .send()
            .await
            .map_err(transport_error)?;
        check_status(response, file_id)
            .await?
            .json()
            .await
            .map_err(transport_error)
    }

    async fn delete(&self, file_id: &str, name: &str) -> Result<(), StorageError> {
        require("file_id", file_id)?;
        require("name", name)?;

        let mut url = self.file_url(&[file_id])?;
        url.query_pairs_mut().append_pair("name", name);

        let response = self.client.delete(url).send().await.map_err(transport_error)?;
        check_status(response, file_id).await?;
        tracing::debug!(file_id, name, "Deleted file");
        Ok(())
    }
}
