//! scalewatch-autoscale — anomaly-driven desired-count transitions.
//!
//! Reads the current desired count from a [`ScalingTarget`], applies the
//! scaling policy to an anomaly verdict, and writes the new count back only
//! when it changed.
//!
//! # Scaling Algorithm
//!
//! ```text
//! previous = target.get_desired_count(service)     // fresh every cycle
//!
//! if !verdict.is_anomalous:
//!     new = previous                               // no automatic scale-down
//! elif verdict.severity_count > 1:
//!     new = min(previous * 2, max)
//! else:
//!     new = min(previous + 1, max)
//!
//! new = clamp(new, min, max)
//! if new != previous:
//!     target.set_desired_count(service, new)       // at most once per cycle
//! ```

pub mod scaler;
pub mod target;

pub use scaler::{ScalingController, ScalingError, plan};
pub use target::{HttpTarget, MemoryTarget, ScalingTarget, StoreTarget};
