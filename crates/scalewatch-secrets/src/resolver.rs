//! Cached secret resolver.

use std::collections::BTreeMap;
use std::sync::Arc;

use scalewatch_core::config::secret_ref;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::backend::SecretBackend;
use crate::error::SecretError;

type Snapshot = Arc<BTreeMap<String, String>>;

/// Resolves named secrets through a backend, caching the full key set.
///
/// Shared across cycles behind an `Arc`; readers clone the snapshot `Arc`
/// and never hold the lock across backend I/O.
pub struct SecretResolver {
    backend: Arc<dyn SecretBackend>,
    cache: RwLock<Option<Snapshot>>,
}

impl SecretResolver {
    pub fn new(backend: Arc<dyn SecretBackend>) -> Self {
        Self {
            backend,
            cache: RwLock::new(None),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Look up a secret. Missing keys fail closed.
    pub async fn get(&self, key: &str) -> Result<String, SecretError> {
        let snapshot = self.snapshot().await?;
        snapshot
            .get(key)
            .cloned()
            .ok_or_else(|| SecretError::NotFound(key.to_string()))
    }

    /// Every secret the backend holds.
    pub async fn get_all(&self) -> Result<BTreeMap<String, String>, SecretError> {
        Ok(self.snapshot().await?.as_ref().clone())
    }

    /// Write a secret. Operational tooling only; the decision loop never writes.
    pub async fn set(&self, key: &str, value: &str) -> Result<(), SecretError> {
        self.backend.write(key, value).await?;
        self.invalidate().await;
        info!(%key, backend = self.backend.name(), "secret written");
        Ok(())
    }

    /// Delete a secret. Returns true if it existed.
    pub async fn delete(&self, key: &str) -> Result<bool, SecretError> {
        let existed = self.backend.remove(key).await?;
        self.invalidate().await;
        info!(%key, existed, backend = self.backend.name(), "secret deleted");
        Ok(existed)
    }

    /// Drop the cached snapshot; the next read reloads from the backend.
    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
        debug!(backend = self.backend.name(), "secret cache invalidated");
    }

    /// Resolve a config value: `secret://KEY` is looked up, anything else is
    /// returned as-is.
    pub async fn resolve(&self, value: &str) -> Result<String, SecretError> {
        match secret_ref(value) {
            Some(key) => self.get(key).await,
            None => Ok(value.to_string()),
        }
    }

    async fn snapshot(&self) -> Result<Snapshot, SecretError> {
        if let Some(snapshot) = self.cache.read().await.as_ref() {
            return Ok(Arc::clone(snapshot));
        }

        let mut guard = self.cache.write().await;
        // Another task may have loaded while we waited for the write lock.
        if let Some(snapshot) = guard.as_ref() {
            return Ok(Arc::clone(snapshot));
        }
        let loaded: Snapshot = Arc::new(self.backend.read_all().await?);
        debug!(
            backend = self.backend.name(),
            count = loaded.len(),
            "secrets loaded"
        );
        *guard = Some(Arc::clone(&loaded));
        Ok(loaded)
    }
}
