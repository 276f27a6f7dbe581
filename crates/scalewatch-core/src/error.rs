//! Error taxonomy for decision cycles, samples, and configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Machine-readable class of a [`CycleError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MetricsUnavailable,
    ScoringUnavailable,
    ScalingTargetUnavailable,
    SecretNotFound,
    NotificationFailed,
}

/// Terminal failure of one stage of a decision cycle.
///
/// Every variant except `NotificationFailed` short-circuits the cycle for
/// its service. None of them may ever be read as "no anomaly".
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum CycleError {
    #[error("metrics unavailable: {0}")]
    MetricsUnavailable(String),

    #[error("scoring unavailable: {0}")]
    ScoringUnavailable(String),

    #[error("scaling target unavailable: {0}")]
    ScalingTargetUnavailable(String),

    #[error("secret not found: {0}")]
    SecretNotFound(String),

    #[error("notification failed: {0}")]
    NotificationFailed(String),
}

impl CycleError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MetricsUnavailable(_) => ErrorKind::MetricsUnavailable,
            Self::ScoringUnavailable(_) => ErrorKind::ScoringUnavailable,
            Self::ScalingTargetUnavailable(_) => ErrorKind::ScalingTargetUnavailable,
            Self::SecretNotFound(_) => ErrorKind::SecretNotFound,
            Self::NotificationFailed(_) => ErrorKind::NotificationFailed,
        }
    }
}

/// A sample that violates the data model.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SampleError {
    #[error("{field} utilization {value} outside [0, 100]")]
    OutOfRange { field: &'static str, value: f64 },

    #[error("window start {start} is after window end {end}")]
    InvertedWindow { start: u64, end: u64 },

    #[error("empty service id")]
    EmptyServiceId,
}

/// Invalid or unreadable configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("invalid duration for {field}: {value:?}")]
    Duration { field: &'static str, value: String },

    #[error("invalid scaling bounds: min {min}, max {max}")]
    Bounds { min: u32, max: u32 },

    #[error("invalid config: {0}")]
    Invalid(String),
}
