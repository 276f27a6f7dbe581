//! The `MetricsSource` seam and shared aggregation.

use scalewatch_core::{BoxFuture, CycleError, MetricSample, ResourceReadings, SampleError, Window};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("no readings for {service_id} in window {start}..{end}")]
    NoData {
        service_id: String,
        start: u64,
        end: u64,
    },

    #[error("metrics backend unavailable: {0}")]
    Unavailable(String),

    #[error("invalid reading: {0}")]
    Invalid(#[from] SampleError),
}

impl From<MetricsError> for CycleError {
    fn from(e: MetricsError) -> Self {
        CycleError::MetricsUnavailable(e.to_string())
    }
}

/// Produces windowed utilization samples for a service.
pub trait MetricsSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// One aggregate sample for the whole service.
    fn fetch<'a>(
        &'a self,
        service_id: &'a str,
        window: Window,
    ) -> BoxFuture<'a, Result<MetricSample, MetricsError>>;

    /// Samples grouped however the source can observe them (typically one per
    /// instance). Sources without per-instance data return the single
    /// service-level sample.
    fn fetch_batch<'a>(
        &'a self,
        service_id: &'a str,
        window: Window,
    ) -> BoxFuture<'a, Result<Vec<MetricSample>, MetricsError>> {
        Box::pin(async move { Ok(vec![self.fetch(service_id, window).await?]) })
    }
}

/// Average each dimension over the readings that report it.
///
/// Fails with `NoData` when there are no readings at all.
pub fn aggregate<'r>(
    service_id: &str,
    window: Window,
    readings: impl IntoIterator<Item = &'r ResourceReadings>,
) -> Result<MetricSample, MetricsError> {
    let mut cpu = Mean::default();
    let mut memory = Mean::default();
    let mut disk = Mean::default();
    let mut seen = 0usize;

    for r in readings {
        seen += 1;
        cpu.push(r.cpu);
        memory.push(r.memory);
        disk.push(r.disk);
    }

    if seen == 0 {
        return Err(MetricsError::NoData {
            service_id: service_id.to_string(),
            start: window.start,
            end: window.end,
        });
    }

    let combined = ResourceReadings {
        cpu: cpu.value(),
        memory: memory.value(),
        disk: disk.value(),
    };
    Ok(MetricSample::new(service_id, window, combined)?)
}

#[derive(Default)]
struct Mean {
    sum: f64,
    n: u32,
}

impl Mean {
    fn push(&mut self, v: Option<f64>) {
        if let Some(v) = v {
            self.sum += v;
            self.n += 1;
        }
    }

    fn value(&self) -> Option<f64> {
        (self.n > 0).then(|| self.sum / f64::from(self.n))
    }
}
