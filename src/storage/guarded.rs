//! Object store behind a circuit breaker.

use std::sync::Arc;

use crate::resilience::{CircuitBreaker, CircuitError};
use crate::storage::{DownloadLink, ObjectStore, StorageError, StoredObject};

pub type GuardedResult<T> = Result<T, CircuitError<StorageError>>;

/// Routes every storage operation through one shared breaker, so failures of
/// any operation count against the same budget.
#[derive(Debug)]
pub struct GuardedStore<S> {
    store: S,
    breaker: Arc<CircuitBreaker>,
}

impl<S: ObjectStore> GuardedStore<S> {
    pub fn new(store: S, breaker: Arc<CircuitBreaker>) -> Self {
        Self { store, breaker }
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn inner(&self) -> &S {
        &self.store
    }

    pub async fn upload(
        &self,
        name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> GuardedResult<StoredObject> {
        self.breaker
            .execute(|| self.store.upload(name, content_type, bytes))
            .await
    }

    pub async fn download_link(&self, file_id: &str) -> GuardedResult<DownloadLink> {
        self.breaker
            .execute(|| self.store.download_link(file_id))
            .await
    }

    pub async fn rename(
        &self,
        file_id: &str,
        name: &str,
        new_name: &str,
    ) -> GuardedResult<StoredObject> {
        self.breaker
            .execute(|| self.store.rename(file_id, name, new_name))
            .await
    }

    pub async fn delete(&self, file_id: &str, name: &str) -> GuardedResult<()> {
        self.breaker
            .execute(|| self.store.delete(file_id, name))
            .await
    }
}
