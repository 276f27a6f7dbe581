//! scalewatch-loop — one evaluation cycle per service.
//!
//! ```text
//! MetricsSource ──► AnomalyScorer ──► ScalingController ──► NotificationSink
//!     fetch            score              decide/apply          publish
//! ```
//!
//! A failing stage ends that service's cycle and becomes the report's error;
//! later stages do not run. A failed publish is recorded on the report but
//! does not fail the cycle. Cycles for different services run as separate
//! tasks and never affect each other.

pub mod cycle;
pub mod reports;

pub use cycle::{DecisionLoop, LoopSettings};
pub use reports::ReportLog;
