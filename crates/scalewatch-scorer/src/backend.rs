//! The scoring backend seam.

use scalewatch_core::{BoxFuture, CycleError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Label the model assigns to outliers.
pub const ANOMALY_LABEL: i64 = -1;
/// Label the model assigns to inliers.
pub const NORMAL_LABEL: i64 = 1;

#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("scoring backend unavailable: {0}")]
    Unavailable(String),

    #[error("scoring backend returned label {0}, expected -1 or 1")]
    InvalidLabel(i64),

    #[error("invalid model: {0}")]
    Model(String),
}

impl From<ScoringError> for CycleError {
    fn from(e: ScoringError) -> Self {
        CycleError::ScoringUnavailable(e.to_string())
    }
}

/// Raw backend answer for one feature vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl Prediction {
    /// Interpret the label. Anything but `-1`/`1` is an error.
    pub fn is_anomalous(&self) -> Result<bool, ScoringError> {
        match self.label {
            ANOMALY_LABEL => Ok(true),
            NORMAL_LABEL => Ok(false),
            other => Err(ScoringError::InvalidLabel(other)),
        }
    }
}

/// A pre-trained outlier model, local or remote.
pub trait ScoringBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Classify one `(cpu, memory, disk)` vector.
    fn invoke(&self, features: [f64; 3]) -> BoxFuture<'_, Result<Prediction, ScoringError>>;
}
