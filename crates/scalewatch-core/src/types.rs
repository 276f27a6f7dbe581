//! Domain types for one decision cycle.
//!
//! Samples, verdicts, and decisions are created once per cycle and never
//! mutated afterwards. Nothing here is persisted; the scaling target is the
//! system of record for replica counts.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, CycleError, SampleError};
use crate::time::epoch_secs;

/// Identifier of a scaled service.
pub type ServiceId = String;

// ── Window ──────────────────────────────────────────────────────────

/// Closed time window `[start, end]` in unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub start: u64,
    pub end: u64,
}

impl Window {
    /// Window of the given length ending at `end`.
    pub fn ending_at(end: u64, length: Duration) -> Self {
        Self {
            start: end.saturating_sub(length.as_secs()),
            end,
        }
    }

    /// Window of the given length ending now.
    pub fn last(length: Duration) -> Self {
        Self::ending_at(epoch_secs(), length)
    }

    pub fn contains(&self, ts: u64) -> bool {
        ts >= self.start && ts <= self.end
    }
}

// ── Samples ─────────────────────────────────────────────────────────

/// Raw utilization readings as a source observed them.
///
/// Any dimension may be absent; absent dimensions score as 0.0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceReadings {
    #[serde(default)]
    pub cpu: Option<f64>,
    #[serde(default)]
    pub memory: Option<f64>,
    #[serde(default)]
    pub disk: Option<f64>,
}

impl ResourceReadings {
    pub fn new(cpu: f64, memory: f64, disk: f64) -> Self {
        Self {
            cpu: Some(cpu),
            memory: Some(memory),
            disk: Some(disk),
        }
    }
}

/// Windowed aggregate utilization for one service (or one of its instances).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub service_id: ServiceId,
    /// Instance the sample was taken from, when the source reports per instance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
    pub window_start: u64,
    pub window_end: u64,
    /// CPU utilization percent (0–100).
    pub cpu_utilization: f64,
    /// Memory utilization percent (0–100).
    pub memory_utilization: f64,
    /// Disk utilization percent (0–100).
    pub disk_utilization: f64,
}

impl MetricSample {
    /// Build a validated sample; absent readings default to 0.0.
    pub fn new(
        service_id: impl Into<String>,
        window: Window,
        readings: ResourceReadings,
    ) -> Result<Self, SampleError> {
        let service_id = service_id.into();
        if service_id.is_empty() {
            return Err(SampleError::EmptyServiceId);
        }
        if window.start > window.end {
            return Err(SampleError::InvertedWindow {
                start: window.start,
                end: window.end,
            });
        }
        Ok(Self {
            service_id,
            instance_id: None,
            window_start: window.start,
            window_end: window.end,
            cpu_utilization: percent("cpu", readings.cpu)?,
            memory_utilization: percent("memory", readings.memory)?,
            disk_utilization: percent("disk", readings.disk)?,
        })
    }

    pub fn with_instance(mut self, instance_id: impl Into<String>) -> Self {
        self.instance_id = Some(instance_id.into());
        self
    }

    pub fn window(&self) -> Window {
        Window {
            start: self.window_start,
            end: self.window_end,
        }
    }

    /// Model input: `(cpu, memory, disk)` in that order.
    pub fn features(&self) -> [f64; 3] {
        [
            self.cpu_utilization,
            self.memory_utilization,
            self.disk_utilization,
        ]
    }
}

fn percent(field: &'static str, value: Option<f64>) -> Result<f64, SampleError> {
    let value = value.unwrap_or(0.0);
    if !value.is_finite() || !(0.0..=100.0).contains(&value) {
        return Err(SampleError::OutOfRange { field, value });
    }
    Ok(value)
}

// ── Verdict ─────────────────────────────────────────────────────────

/// Binary outlier classification of a sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyVerdict {
    pub sample: MetricSample,
    pub is_anomalous: bool,
    /// Anomalous samples seen for this service in the evaluated batch.
    pub severity_count: u32,
    /// Raw model score, when the backend exposes one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl AnomalyVerdict {
    pub fn normal(sample: MetricSample) -> Self {
        Self {
            sample,
            is_anomalous: false,
            severity_count: 0,
            score: None,
        }
    }

    pub fn anomalous(sample: MetricSample, severity_count: u32) -> Self {
        Self {
            sample,
            is_anomalous: true,
            severity_count,
            score: None,
        }
    }

    pub fn with_score(mut self, score: Option<f64>) -> Self {
        self.score = score;
        self
    }

    pub fn service_id(&self) -> &str {
        &self.sample.service_id
    }
}

// ── Scaling ─────────────────────────────────────────────────────────

/// Floor and ceiling for a service's desired count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalingBounds {
    pub min: u32,
    pub max: u32,
}

impl Default for ScalingBounds {
    fn default() -> Self {
        Self { min: 1, max: 10 }
    }
}

impl ScalingBounds {
    pub fn new(min: u32, max: u32) -> Result<Self, ConfigError> {
        if min == 0 || min > max {
            return Err(ConfigError::Bounds { min, max });
        }
        Ok(Self { min, max })
    }

    pub fn clamp(&self, count: u32) -> u32 {
        count.clamp(self.min, self.max)
    }
}

/// Outcome of the scaling policy for one service in one cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalingDecision {
    pub service_id: ServiceId,
    pub previous_count: u32,
    pub new_count: u32,
    pub bound_min: u32,
    pub bound_max: u32,
}

impl ScalingDecision {
    /// True when applying the decision changes nothing.
    pub fn is_noop(&self) -> bool {
        self.new_count == self.previous_count
    }

    pub fn bounds(&self) -> ScalingBounds {
        ScalingBounds {
            min: self.bound_min,
            max: self.bound_max,
        }
    }
}

// ── Notification ────────────────────────────────────────────────────

/// Published record of a cycle's decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub service_id: ServiceId,
    pub timestamp: u64,
    pub verdict: AnomalyVerdict,
    pub decision: ScalingDecision,
}

impl NotificationEvent {
    pub fn new(verdict: AnomalyVerdict, decision: ScalingDecision) -> Self {
        Self {
            service_id: decision.service_id.clone(),
            timestamp: epoch_secs(),
            verdict,
            decision,
        }
    }
}

// ── Report ──────────────────────────────────────────────────────────

/// Outcome of one decision cycle for one service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    pub service_id: ServiceId,
    pub started_at: u64,
    pub finished_at: u64,
    pub verdict: Option<AnomalyVerdict>,
    pub decision: Option<ScalingDecision>,
    pub notification_sent: bool,
    /// Terminal failure that stopped the cycle.
    pub error: Option<CycleError>,
    /// Non-fatal publish failure; the decision still stands.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_error: Option<CycleError>,
}

impl CycleReport {
    pub fn begin(service_id: impl Into<String>) -> Self {
        let now = epoch_secs();
        Self {
            service_id: service_id.into(),
            started_at: now,
            finished_at: now,
            verdict: None,
            decision: None,
            notification_sent: false,
            error: None,
            notification_error: None,
        }
    }

    /// Close the report with a terminal error.
    pub fn fail(mut self, error: CycleError) -> Self {
        self.error = Some(error);
        self.finish()
    }

    pub fn finish(mut self) -> Self {
        self.finished_at = epoch_secs();
        self
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// True when this cycle changed the desired count.
    pub fn scaled(&self) -> bool {
        self.decision.as_ref().is_some_and(|d| !d.is_noop())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window() -> Window {
        Window { start: 100, end: 400 }
    }

    #[test]
    fn sample_defaults_missing_dimensions_to_zero() {
        let readings = ResourceReadings {
            cpu: Some(72.5),
            memory: Some(40.0),
            disk: None,
        };
        let sample = MetricSample::new("api", window(), readings).unwrap();
        assert_eq!(sample.features(), [72.5, 40.0, 0.0]);
    }

    #[test]
    fn sample_rejects_out_of_range() {
        let err = MetricSample::new("api", window(), ResourceReadings::new(101.0, 1.0, 1.0))
            .unwrap_err();
        assert_eq!(
            err,
            SampleError::OutOfRange {
                field: "cpu",
                value: 101.0
            }
        );

        let err = MetricSample::new("api", window(), ResourceReadings::new(1.0, f64::NAN, 1.0))
            .unwrap_err();
        assert!(matches!(err, SampleError::OutOfRange { field: "memory", .. }));
    }

    #[test]
    fn sample_rejects_inverted_window_and_empty_id() {
        let inverted = Window { start: 10, end: 5 };
        assert!(matches!(
            MetricSample::new("api", inverted, ResourceReadings::default()),
            Err(SampleError::InvertedWindow { start: 10, end: 5 })
        ));
        assert_eq!(
            MetricSample::new("", window(), ResourceReadings::default()).unwrap_err(),
            SampleError::EmptyServiceId
        );
    }

    #[test]
    fn window_ending_at_saturates() {
        let w = Window::ending_at(30, Duration::from_secs(300));
        assert_eq!(w, Window { start: 0, end: 30 });
        assert!(w.contains(0));
        assert!(w.contains(30));
        assert!(!w.contains(31));
    }

    #[test]
    fn bounds_validation() {
        assert!(ScalingBounds::new(1, 10).is_ok());
        assert!(ScalingBounds::new(3, 3).is_ok());
        assert!(ScalingBounds::new(0, 10).is_err());
        assert!(ScalingBounds::new(5, 4).is_err());
        assert_eq!(ScalingBounds::default(), ScalingBounds { min: 1, max: 10 });
        assert_eq!(ScalingBounds::default().clamp(0), 1);
        assert_eq!(ScalingBounds::default().clamp(12), 10);
    }

    #[test]
    fn report_lifecycle() {
        let report = CycleReport::begin("api");
        assert!(report.is_success());
        assert!(!report.scaled());

        let failed = report.fail(CycleError::MetricsUnavailable("down".into()));
        assert!(!failed.is_success());
        assert!(failed.finished_at >= failed.started_at);
    }
}
