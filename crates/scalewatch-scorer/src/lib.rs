//! scalewatch-scorer — binary outlier verdicts from a pre-trained model.
//!
//! [`AnomalyScorer`] turns samples into [`AnomalyVerdict`]s through an opaque
//! [`ScoringBackend`]. The backend sees only the feature vector
//! `(cpu, memory, disk)` and answers with a label: `-1` anomaly, `1` normal.
//! Any other label is treated as the backend being unavailable, never as a
//! normal reading.
//!
//! Backends:
//! - [`HttpScorer`]: JSON inference endpoint.
//! - [`IsolationForestScorer`]: model artifact evaluated in-process.
//!
//! [`AnomalyVerdict`]: scalewatch_core::AnomalyVerdict

pub mod backend;
pub mod forest;
pub mod http;
pub mod scorer;

pub use backend::{Prediction, ScoringBackend, ScoringError};
pub use forest::{IsolationForest, IsolationForestScorer};
pub use http::HttpScorer;
pub use scorer::AnomalyScorer;
