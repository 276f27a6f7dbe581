//! Scaling targets: the system of record for desired counts.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use http::Method;
use scalewatch_core::{BoxFuture, JsonClient};
use scalewatch_state::StateStore;
use serde::{Deserialize, Serialize};

use crate::scaler::ScalingError;

/// Reads and writes a service's desired replica count.
pub trait ScalingTarget: Send + Sync {
    fn name(&self) -> &'static str;

    fn get_desired_count<'a>(&'a self, service_id: &'a str)
    -> BoxFuture<'a, Result<u32, ScalingError>>;

    fn set_desired_count<'a>(
        &'a self,
        service_id: &'a str,
        count: u32,
    ) -> BoxFuture<'a, Result<(), ScalingError>>;
}

// ── Local store ────────────────────────────────────────────────────

/// Desired counts kept in the local state store (standalone mode).
///
/// A service with no stored count reads as `initial`.
pub struct StoreTarget {
    store: StateStore,
    initial: u32,
}

impl StoreTarget {
    pub fn new(store: StateStore) -> Self {
        Self { store, initial: 1 }
    }

    pub fn with_initial(mut self, initial: u32) -> Self {
        self.initial = initial;
        self
    }
}

impl ScalingTarget for StoreTarget {
    fn name(&self) -> &'static str {
        "local"
    }

    fn get_desired_count<'a>(
        &'a self,
        service_id: &'a str,
    ) -> BoxFuture<'a, Result<u32, ScalingError>> {
        Box::pin(async move {
            let record = self
                .store
                .get_desired_count(service_id)
                .map_err(|e| ScalingError::read(service_id, e))?;
            Ok(record.map(|r| r.desired_count).unwrap_or(self.initial))
        })
    }

    fn set_desired_count<'a>(
        &'a self,
        service_id: &'a str,
        count: u32,
    ) -> BoxFuture<'a, Result<(), ScalingError>> {
        Box::pin(async move {
            self.store
                .put_desired_count(service_id, count)
                .map_err(|e| ScalingError::write(service_id, e))
        })
    }
}

// ── HTTP ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
struct DesiredCount {
    desired_count: u32,
}

/// Orchestrator API: `GET`/`PUT {path}/{service_id}` with
/// `{"desired_count": n}`.
pub struct HttpTarget {
    client: JsonClient,
    path: String,
}

impl HttpTarget {
    pub fn new(client: JsonClient, path: impl Into<String>) -> Self {
        Self {
            client,
            path: path.into(),
        }
    }

    fn uri(&self, service_id: &str) -> String {
        format!("{}/{}", self.path.trim_end_matches('/'), service_id)
    }
}

impl ScalingTarget for HttpTarget {
    fn name(&self) -> &'static str {
        "http"
    }

    fn get_desired_count<'a>(
        &'a self,
        service_id: &'a str,
    ) -> BoxFuture<'a, Result<u32, ScalingError>> {
        Box::pin(async move {
            let body: DesiredCount = self
                .client
                .get_json(&self.uri(service_id))
                .await
                .map_err(|e| ScalingError::read(service_id, e))?;
            Ok(body.desired_count)
        })
    }

    fn set_desired_count<'a>(
        &'a self,
        service_id: &'a str,
        count: u32,
    ) -> BoxFuture<'a, Result<(), ScalingError>> {
        Box::pin(async move {
            self.client
                .send_json(
                    Method::PUT,
                    &self.uri(service_id),
                    &DesiredCount {
                        desired_count: count,
                    },
                )
                .await
                .map_err(|e| ScalingError::write(service_id, e))
        })
    }
}

// ── Memory ─────────────────────────────────────────────────────────

/// In-process target that records every write; writes can be switched to fail.
#[derive(Default)]
pub struct MemoryTarget {
    counts: Mutex<HashMap<String, u32>>,
    writes: Mutex<Vec<(String, u32)>>,
    reject_writes: AtomicBool,
}

impl MemoryTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_counts<'s>(counts: impl IntoIterator<Item = (&'s str, u32)>) -> Self {
        Self {
            counts: Mutex::new(
                counts
                    .into_iter()
                    .map(|(id, n)| (id.to_string(), n))
                    .collect(),
            ),
            writes: Mutex::default(),
            reject_writes: AtomicBool::new(false),
        }
    }

    /// Make every `set_desired_count` fail; reads keep working.
    pub fn set_reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::Relaxed);
    }

    pub fn count(&self, service_id: &str) -> Option<u32> {
        self.counts
            .lock()
            .ok()
            .and_then(|c| c.get(service_id).copied())
    }

    /// Every `set_desired_count` call, in order.
    pub fn writes(&self) -> Vec<(String, u32)> {
        self.writes.lock().map(|w| w.clone()).unwrap_or_default()
    }
}

impl ScalingTarget for MemoryTarget {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn get_desired_count<'a>(
        &'a self,
        service_id: &'a str,
    ) -> BoxFuture<'a, Result<u32, ScalingError>> {
        let count = self.count(service_id);
        Box::pin(async move { count.ok_or_else(|| ScalingError::read(service_id, "unknown service")) })
    }

    fn set_desired_count<'a>(
        &'a self,
        service_id: &'a str,
        count: u32,
    ) -> BoxFuture<'a, Result<(), ScalingError>> {
        Box::pin(async move {
            if self.reject_writes.load(Ordering::Relaxed) {
                return Err(ScalingError::write(service_id, "target rejected the update"));
            }
            let mut counts = self
                .counts
                .lock()
                .map_err(|e| ScalingError::write(service_id, e))?;
            counts.insert(service_id.to_string(), count);
            if let Ok(mut writes) = self.writes.lock() {
                writes.push((service_id.to_string(), count));
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, State};
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::{Json, Router};
    use std::sync::Arc;

    type Counts = Arc<Mutex<HashMap<String, u32>>>;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr.to_string()
    }

    async fn get_count(
        State(counts): State<Counts>,
        Path(id): Path<String>,
    ) -> Result<Json<DesiredCount>, StatusCode> {
        let counts = counts.lock().unwrap();
        counts
            .get(&id)
            .map(|&n| Json(DesiredCount { desired_count: n }))
            .ok_or(StatusCode::NOT_FOUND)
    }

    async fn put_count(
        State(counts): State<Counts>,
        Path(id): Path<String>,
        Json(body): Json<DesiredCount>,
    ) -> StatusCode {
        counts.lock().unwrap().insert(id, body.desired_count);
        StatusCode::NO_CONTENT
    }

    #[tokio::test]
    async fn store_target_defaults_then_persists() {
        let target = StoreTarget::new(StateStore::open_in_memory().unwrap()).with_initial(2);
        assert_eq!(target.get_desired_count("api").await.unwrap(), 2);

        target.set_desired_count("api", 5).await.unwrap();
        assert_eq!(target.get_desired_count("api").await.unwrap(), 5);
    }

    #[tokio::test]
    async fn http_target_reads_and_writes() {
        let counts: Counts = Arc::new(Mutex::new(HashMap::from([("api".to_string(), 3)])));
        let app = Router::new()
            .route("/api/v1/services/{id}", get(get_count).put(put_count))
            .with_state(counts.clone());
        let addr = serve(app).await;
        let target = HttpTarget::new(JsonClient::new(addr), "/api/v1/services");

        assert_eq!(target.get_desired_count("api").await.unwrap(), 3);
        target.set_desired_count("api", 4).await.unwrap();
        assert_eq!(counts.lock().unwrap()["api"], 4);
    }

    #[tokio::test]
    async fn http_target_missing_service_is_read_error() {
        let counts: Counts = Arc::default();
        let app = Router::new()
            .route("/api/v1/services/{id}", get(get_count).put(put_count))
            .with_state(counts);
        let addr = serve(app).await;
        let target = HttpTarget::new(JsonClient::new(addr), "/api/v1/services");

        let err = target.get_desired_count("ghost").await.unwrap_err();
        assert!(matches!(err, ScalingError::Read { .. }));
        assert!(err.to_string().contains("404"));
    }

    #[tokio::test]
    async fn memory_target_records_writes() {
        let target = MemoryTarget::with_counts([("api", 1)]);
        target.set_desired_count("api", 2).await.unwrap();
        target.set_desired_count("api", 3).await.unwrap();
        assert_eq!(target.count("api"), Some(3));
        assert_eq!(
            target.writes(),
            vec![("api".to_string(), 2), ("api".to_string(), 3)]
        );
        assert!(target.get_desired_count("ghost").await.is_err());
    }
}
