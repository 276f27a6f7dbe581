//! ScalingController: verdict in, bounded desired count out.
//!
//! The policy itself is the pure [`plan`] function. The controller wraps it
//! with a fresh read of the current count and a single conditional write,
//! each bounded by the call timeout.

use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use scalewatch_core::{AnomalyVerdict, CycleError, ScalingBounds, ScalingDecision};
use thiserror::Error;
use tracing::{debug, info};

use crate::target::ScalingTarget;

#[derive(Debug, Error)]
pub enum ScalingError {
    #[error("reading desired count for {service_id} failed: {reason}")]
    Read { service_id: String, reason: String },

    #[error("updating desired count for {service_id} failed: {reason}")]
    Write { service_id: String, reason: String },

    #[error("{op} for {service_id} timed out after {after:?}")]
    Timeout {
        op: &'static str,
        service_id: String,
        after: Duration,
    },
}

impl ScalingError {
    pub fn read(service_id: &str, reason: impl Display) -> Self {
        Self::Read {
            service_id: service_id.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn write(service_id: &str, reason: impl Display) -> Self {
        Self::Write {
            service_id: service_id.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<ScalingError> for CycleError {
    fn from(e: ScalingError) -> Self {
        CycleError::ScalingTargetUnavailable(e.to_string())
    }
}

/// New desired count for a verdict, given the current one.
///
/// Clean verdicts keep the count; anomalies add one, or double when more
/// than one anomalous sample was seen. The result always lies within
/// `bounds`.
pub fn plan(previous: u32, verdict: &AnomalyVerdict, bounds: ScalingBounds) -> u32 {
    let proposed = if !verdict.is_anomalous {
        previous
    } else if verdict.severity_count > 1 {
        previous.saturating_mul(2).min(bounds.max)
    } else {
        previous.saturating_add(1).min(bounds.max)
    };
    bounds.clamp(proposed)
}

/// Applies [`plan`] against a live [`ScalingTarget`].
pub struct ScalingController {
    target: Arc<dyn ScalingTarget>,
    default_bounds: ScalingBounds,
    overrides: HashMap<String, ScalingBounds>,
    call_timeout: Duration,
}

impl ScalingController {
    pub fn new(target: Arc<dyn ScalingTarget>, default_bounds: ScalingBounds) -> Self {
        Self {
            target,
            default_bounds,
            overrides: HashMap::new(),
            call_timeout: Duration::from_secs(10),
        }
    }

    /// Per-service bounds replacing the default.
    pub fn with_bounds(mut self, service_id: impl Into<String>, bounds: ScalingBounds) -> Self {
        self.overrides.insert(service_id.into(), bounds);
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn target_name(&self) -> &'static str {
        self.target.name()
    }

    pub fn bounds_for(&self, service_id: &str) -> ScalingBounds {
        self.overrides
            .get(service_id)
            .copied()
            .unwrap_or(self.default_bounds)
    }

    /// Decide and apply the scaling step for one verdict.
    ///
    /// The current count is read from the target every time. The target is
    /// written only when the count changes, so repeating a decision against
    /// an unchanged target is a no-op.
    pub async fn decide(
        &self,
        service_id: &str,
        verdict: &AnomalyVerdict,
    ) -> Result<ScalingDecision, ScalingError> {
        let bounds = self.bounds_for(service_id);
        let previous = self
            .bounded("read", service_id, self.target.get_desired_count(service_id))
            .await?;
        let new_count = plan(previous, verdict, bounds);

        let decision = ScalingDecision {
            service_id: service_id.to_string(),
            previous_count: previous,
            new_count,
            bound_min: bounds.min,
            bound_max: bounds.max,
        };

        if decision.is_noop() {
            debug!(
                service = %service_id,
                count = previous,
                anomalous = verdict.is_anomalous,
                "desired count unchanged"
            );
            return Ok(decision);
        }

        self.bounded(
            "write",
            service_id,
            self.target.set_desired_count(service_id, new_count),
        )
        .await?;
        info!(
            service = %service_id,
            from = previous,
            to = new_count,
            severity = verdict.severity_count,
            target = self.target.name(),
            "desired count updated"
        );
        Ok(decision)
    }

    async fn bounded<T>(
        &self,
        op: &'static str,
        service_id: &str,
        call: impl Future<Output = Result<T, ScalingError>>,
    ) -> Result<T, ScalingError> {
        tokio::time::timeout(self.call_timeout, call)
            .await
            .map_err(|_| ScalingError::Timeout {
                op,
                service_id: service_id.to_string(),
                after: self.call_timeout,
            })?
    }
}
