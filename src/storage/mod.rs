//! Object storage for track files.
//!
//! # Data Flow
//! ```text
//! File route handler
//!     → guarded.rs (one circuit breaker for every storage call)
//!     → http.rs (REST client for the object store)
//! ```
//!
//! # Design Decisions
//! - The store is a trait so the breaker can wrap any backend
//! - Caller mistakes (`invalid_input`, `not_found`) are distinct kinds so
//!   they can be excluded from the breaker's failure count

pub mod guarded;
pub mod http;

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::resilience::ErrorKind;

pub use guarded::GuardedStore;
pub use http::HttpObjectStore;

/// Content type used when the client sends none.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Metadata of a stored file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredObject {
    pub id: String,
    pub name: String,
    pub content_type: String,
    pub size: u64,
}

/// Time-limited download URL for a stored file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadLink {
    pub id: String,
    pub name: String,
    pub url: String,
    pub expires_in_secs: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage request timed out")]
    Timeout,

    #[error("storage connection failed: {0}")]
    Connection(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("invalid storage request: {0}")]
    InvalidInput(String),

    #[error("file not found: {0}")]
    NotFound(String),
}

impl ErrorKind for StorageError {
    fn error_kind(&self) -> &str {
        match self {
            StorageError::Timeout => "timeout",
            StorageError::Connection(_) => "connection",
            StorageError::Unavailable(_) => "unavailable",
            StorageError::InvalidInput(_) => "invalid_input",
            StorageError::NotFound(_) => "not_found",
        }
    }
}

/// Operations the gateway performs against object storage.
pub trait ObjectStore: Send + Sync + 'static {
    fn upload(
        &self,
        name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> impl Future<Output = Result<StoredObject, StorageError>> + Send;

    fn download_link(
        &self,
        file_id: &str,
    ) -> impl Future<Output = Result<DownloadLink, StorageError>> + Send;

    fn rename(
        &self,
        file_id: &str,
        name: &str,
        new_name: &str,
    ) -> impl Future<Output = Result<StoredObject, StorageError>> + Send;

    fn delete(
        &self,
        file_id: &str,
        name: &str,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;
}
