//! Metrics from a JSON HTTP endpoint.

use scalewatch_core::{BoxFuture, JsonClient, MetricSample, ResourceReadings, Window};
use serde::Deserialize;
use tracing::debug;

use crate::source::{MetricsError, MetricsSource, aggregate};

/// Queries `GET {path}/{service_id}?start=..&end=..`.
///
/// The endpoint answers with the per-instance readings it aggregated over the
/// window:
///
/// ```json
/// {"instances": [{"instance_id": "i-1", "cpu": 71.0, "memory": 40.2, "disk": 3.0}]}
/// ```
pub struct HttpSource {
    client: JsonClient,
    path: String,
}

#[derive(Debug, Deserialize)]
struct MetricsResponse {
    #[serde(default)]
    instances: Vec<InstanceReadings>,
}

#[derive(Debug, Deserialize)]
struct InstanceReadings {
    #[serde(default)]
    instance_id: Option<String>,
    #[serde(flatten)]
    readings: ResourceReadings,
}

impl HttpSource {
    pub fn new(client: JsonClient, path: impl Into<String>) -> Self {
        Self {
            client,
            path: path.into(),
        }
    }

    async fn query(
        &self,
        service_id: &str,
        window: Window,
    ) -> Result<Vec<InstanceReadings>, MetricsError> {
        let uri = format!(
            "{}/{}?start={}&end={}",
            self.path.trim_end_matches('/'),
            service_id,
            window.start,
            window.end
        );
        let response: MetricsResponse = self
            .client
            .get_json(&uri)
            .await
            .map_err(|e| MetricsError::Unavailable(format!("{}: {e}", self.client.address())))?;

        debug!(service = %service_id, instances = response.instances.len(), "metrics fetched");
        if response.instances.is_empty() {
            return Err(MetricsError::NoData {
                service_id: service_id.to_string(),
                start: window.start,
                end: window.end,
            });
        }
        Ok(response.instances)
    }
}

impl MetricsSource for HttpSource {
    fn name(&self) -> &'static str {
        "http"
    }

    fn fetch<'a>(
        &'a self,
        service_id: &'a str,
        window: Window,
    ) -> BoxFuture<'a, Result<MetricSample, MetricsError>> {
        Box::pin(async move {
            let instances = self.query(service_id, window).await?;
            aggregate(service_id, window, instances.iter().map(|i| &i.readings))
        })
    }

    fn fetch_batch<'a>(
        &'a self,
        service_id: &'a str,
        window: Window,
    ) -> BoxFuture<'a, Result<Vec<MetricSample>, MetricsError>> {
        Box::pin(async move {
            let instances = self.query(service_id, window).await?;
            instances
                .into_iter()
                .map(|i| {
                    let sample = MetricSample::new(service_id, window, i.readings)?;
                    Ok(match i.instance_id {
                        Some(id) => sample.with_instance(id),
                        None => sample,
                    })
                })
                .collect()
        })
    }
}
