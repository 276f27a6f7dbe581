//! Secret storage backends.

use std::collections::BTreeMap;

use scalewatch_core::BoxFuture;
use scalewatch_state::StateStore;
use tokio::sync::RwLock;

use crate::error::SecretError;

/// Where secrets live. Implementations only need whole-set reads plus
/// single-key writes; caching is the resolver's job.
pub trait SecretBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn read_all(&self) -> BoxFuture<'_, Result<BTreeMap<String, String>, SecretError>>;

    fn write<'a>(&'a self, key: &'a str, value: &'a str) -> BoxFuture<'a, Result<(), SecretError>>;

    /// Remove a key. Returns true if it existed.
    fn remove<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<bool, SecretError>>;
}

// ── Environment ────────────────────────────────────────────────────

/// Secrets from environment variables named `{prefix}{KEY}`.
pub struct EnvBackend {
    prefix: String,
    /// Fixed variable set; `None` reads the process environment.
    vars: Option<Vec<(String, String)>>,
}

impl EnvBackend {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            vars: None,
        }
    }

    /// Backend over an explicit variable set instead of the process environment.
    pub fn from_vars<I, K, V>(prefix: impl Into<String>, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            prefix: prefix.into(),
            vars: Some(vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect()),
        }
    }

    fn collect(&self) -> BTreeMap<String, String> {
        let vars: Box<dyn Iterator<Item = (String, String)>> = match &self.vars {
            Some(fixed) => Box::new(fixed.clone().into_iter()),
            None => Box::new(std::env::vars()),
        };
        vars.filter_map(|(k, v)| {
            k.strip_prefix(&self.prefix)
                .filter(|key| !key.is_empty())
                .map(|key| (key.to_string(), v))
        })
        .collect()
    }
}

impl SecretBackend for EnvBackend {
    fn name(&self) -> &'static str {
        "env"
    }

    fn read_all(&self) -> BoxFuture<'_, Result<BTreeMap<String, String>, SecretError>> {
        Box::pin(async move { Ok(self.collect()) })
    }

    fn write<'a>(&'a self, _key: &'a str, _value: &'a str) -> BoxFuture<'a, Result<(), SecretError>> {
        Box::pin(async { Err(SecretError::ReadOnly("env")) })
    }

    fn remove<'a>(&'a self, _key: &'a str) -> BoxFuture<'a, Result<bool, SecretError>> {
        Box::pin(async { Err(SecretError::ReadOnly("env")) })
    }
}

// ── State store ────────────────────────────────────────────────────

/// Secrets in the local redb state store.
pub struct StoreBackend {
    store: StateStore,
}

impl StoreBackend {
    pub fn new(store: StateStore) -> Self {
        Self { store }
    }
}

impl SecretBackend for StoreBackend {
    fn name(&self) -> &'static str {
        "local"
    }

    fn read_all(&self) -> BoxFuture<'_, Result<BTreeMap<String, String>, SecretError>> {
        Box::pin(async move { Ok(self.store.list_secrets()?) })
    }

    fn write<'a>(&'a self, key: &'a str, value: &'a str) -> BoxFuture<'a, Result<(), SecretError>> {
        Box::pin(async move { Ok(self.store.put_secret(key, value)?) })
    }

    fn remove<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<bool, SecretError>> {
        Box::pin(async move { Ok(self.store.delete_secret(key)?) })
    }
}

// ── Memory ─────────────────────────────────────────────────────────

/// In-process secrets, counting how often the full set is read.
#[derive(Default)]
pub struct MemoryBackend {
    values: RwLock<BTreeMap<String, String>>,
    reads: std::sync::atomic::AtomicUsize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_values<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: RwLock::new(values.into_iter().map(|(k, v)| (k.into(), v.into())).collect()),
            reads: Default::default(),
        }
    }

    /// Number of `read_all` calls served so far.
    pub fn read_count(&self) -> usize {
        self.reads.load(std::sync::atomic::Ordering::Relaxed)
    }
}

impl SecretBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn read_all(&self) -> BoxFuture<'_, Result<BTreeMap<String, String>, SecretError>> {
        Box::pin(async move {
            self.reads.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            Ok(self.values.read().await.clone())
        })
    }

    fn write<'a>(&'a self, key: &'a str, value: &'a str) -> BoxFuture<'a, Result<(), SecretError>> {
        Box::pin(async move {
            self.values.write().await.insert(key.to_string(), value.to_string());
            Ok(())
        })
    }

    fn remove<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<bool, SecretError>> {
        Box::pin(async move { Ok(self.values.write().await.remove(key).is_some()) })
    }
}
