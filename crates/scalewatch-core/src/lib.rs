//! scalewatch-core — shared vocabulary for the anomaly-driven autoscaler.
//!
//! Every stage of a decision cycle speaks in the types defined here:
//!
//! ```text
//! MetricSample ──► AnomalyVerdict ──► ScalingDecision ──► NotificationEvent
//!                                                     └─► CycleReport
//! ```
//!
//! The crate also owns the error taxonomy surfaced in cycle reports, the
//! `scalewatch.toml` configuration model, and a small JSON-over-HTTP/1.1
//! client used by the HTTP adapters of the other crates.

pub mod config;
pub mod error;
pub mod http;
pub mod time;
pub mod types;

use std::future::Future;
use std::pin::Pin;

pub use config::WatchConfig;
pub use error::{ConfigError, CycleError, ErrorKind, SampleError};
pub use http::{HttpError, JsonClient, TokenSource};
pub use time::{epoch_secs, parse_duration};
pub use types::*;

/// Boxed, sendable future returned by the collaborator traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
