//! scalewatch-metrics — windowed utilization samples for the decision loop.
//!
//! # Architecture
//!
//! ```text
//! MetricsSource (trait)
//!   ├── fetch(service, window)       → one service-level MetricSample
//!   └── fetch_batch(service, window) → one MetricSample per instance
//!
//! PushSource  ← record() from agents or the REST API
//! CsvSource   ← newest container_metrics_*.csv export in a directory
//! HttpSource  ← GET {path}/{service}?start=&end=
//! ```
//!
//! Sources average each dimension over the readings they have; a dimension
//! with no readings at all scores as 0.0.

pub mod csv;
pub mod http;
pub mod push;
pub mod source;

pub use csv::CsvSource;
pub use http::HttpSource;
pub use push::PushSource;
pub use source::{MetricsError, MetricsSource, aggregate};
