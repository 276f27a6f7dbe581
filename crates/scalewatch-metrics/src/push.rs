//! Push buffer for readings reported by agents or the REST API.
//!
//! Readings are kept per service and instance until they fall out of the
//! retention horizon, measured from the newest reading of that service.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use scalewatch_core::{BoxFuture, MetricSample, ResourceReadings, Window};
use tokio::sync::RwLock;
use tracing::debug;

use crate::source::{MetricsError, MetricsSource, aggregate};

/// Instance name used for readings that do not name one.
const DEFAULT_INSTANCE: &str = "default";

#[derive(Debug, Clone)]
struct Reading {
    ts: u64,
    instance_id: String,
    readings: ResourceReadings,
}

/// In-process buffer of pushed readings.
pub struct PushSource {
    /// service_id → readings, oldest first.
    buffers: RwLock<HashMap<String, Vec<Reading>>>,
    retention: Duration,
}

impl PushSource {
    pub fn new(retention: Duration) -> Self {
        Self {
            buffers: RwLock::new(HashMap::new()),
            retention,
        }
    }

    /// Record one reading. Out-of-range values are rejected.
    pub async fn record(
        &self,
        service_id: &str,
        instance_id: Option<&str>,
        ts: u64,
        readings: ResourceReadings,
    ) -> Result<(), MetricsError> {
        // Validate with the same rules samples use.
        MetricSample::new(service_id, Window { start: ts, end: ts }, readings)?;

        let mut buffers = self.buffers.write().await;
        let buffer = buffers.entry(service_id.to_string()).or_default();
        let pos = buffer.partition_point(|r| r.ts <= ts);
        buffer.insert(
            pos,
            Reading {
                ts,
                instance_id: instance_id.unwrap_or(DEFAULT_INSTANCE).to_string(),
                readings,
            },
        );

        let newest = buffer.last().map(|r| r.ts).unwrap_or(ts);
        let cutoff = newest.saturating_sub(self.retention.as_secs());
        let before = buffer.len();
        buffer.retain(|r| r.ts >= cutoff);
        let pruned = before - buffer.len();
        if pruned > 0 {
            debug!(service = %service_id, pruned, "expired readings pruned");
        }
        Ok(())
    }

    /// Services with at least one buffered reading.
    pub async fn services(&self) -> Vec<String> {
        let buffers = self.buffers.read().await;
        let mut ids: Vec<String> = buffers
            .iter()
            .filter(|(_, b)| !b.is_empty())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Number of buffered readings for a service.
    pub async fn len(&self, service_id: &str) -> usize {
        self.buffers
            .read()
            .await
            .get(service_id)
            .map(Vec::len)
            .unwrap_or(0)
    }

    async fn in_window(&self, service_id: &str, window: Window) -> Vec<Reading> {
        let buffers = self.buffers.read().await;
        buffers
            .get(service_id)
            .map(|b| {
                b.iter()
                    .filter(|r| window.contains(r.ts))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl MetricsSource for PushSource {
    fn name(&self) -> &'static str {
        "push"
    }

    fn fetch<'a>(
        &'a self,
        service_id: &'a str,
        window: Window,
    ) -> BoxFuture<'a, Result<MetricSample, MetricsError>> {
        Box::pin(async move {
            let readings = self.in_window(service_id, window).await;
            aggregate(service_id, window, readings.iter().map(|r| &r.readings))
        })
    }

    fn fetch_batch<'a>(
        &'a self,
        service_id: &'a str,
        window: Window,
    ) -> BoxFuture<'a, Result<Vec<MetricSample>, MetricsError>> {
        Box::pin(async move {
            let readings = self.in_window(service_id, window).await;
            if readings.is_empty() {
                return Err(MetricsError::NoData {
                    service_id: service_id.to_string(),
                    start: window.start,
                    end: window.end,
                });
            }

            let mut by_instance: BTreeMap<&str, Vec<&ResourceReadings>> = BTreeMap::new();
            for r in &readings {
                by_instance
                    .entry(r.instance_id.as_str())
                    .or_default()
                    .push(&r.readings);
            }

            by_instance
                .into_iter()
                .map(|(instance, group)| {
                    aggregate(service_id, window, group).map(|s| s.with_instance(instance))
                })
                .collect()
        })
    }
}
