//! REST API handlers.
//!
//! Every response uses the same `{success, data?, error?}` envelope.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use scalewatch_core::{ResourceReadings, ScalingBounds, epoch_secs};
use scalewatch_metrics::MetricsError;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ApiState;

const DEFAULT_REPORT_LIMIT: usize = 50;

/// Response wrapper for consistent API format.
#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

fn is_configured(state: &ApiState, id: &str) -> bool {
    state.decisions.services().iter().any(|s| s == id)
}

// ── Health ─────────────────────────────────────────────────────

/// GET /healthz
pub async fn healthz() -> impl IntoResponse {
    ApiResponse::ok("ok")
}

// ── Services ───────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceSummary {
    pub id: String,
    pub bounds: ScalingBounds,
}

/// GET /api/v1/services
pub async fn list_services(State(state): State<ApiState>) -> impl IntoResponse {
    let controller = state.decisions.controller();
    let services: Vec<ServiceSummary> = state
        .decisions
        .services()
        .iter()
        .map(|id| ServiceSummary {
            id: id.clone(),
            bounds: controller.bounds_for(id),
        })
        .collect();
    ApiResponse::ok(services)
}

/// POST /api/v1/services/{id}/cycles
///
/// Runs a cycle immediately. A failed cycle answers 500 with the report
/// still attached.
pub async fn run_cycle(State(state): State<ApiState>, Path(id): Path<String>) -> impl IntoResponse {
    if !is_configured(&state, &id) {
        return error_response("service not found", StatusCode::NOT_FOUND).into_response();
    }

    let report = state.decisions.run_cycle(&id).await;
    match report.error.as_ref().map(ToString::to_string) {
        None => ApiResponse::ok(report).into_response(),
        Some(msg) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse {
                success: false,
                data: Some(report),
                error: Some(msg),
            }),
        )
            .into_response(),
    }
}

// ── Readings ───────────────────────────────────────────────────

/// Reading pushed by an agent.
#[derive(Debug, Deserialize)]
pub struct ReadingRequest {
    #[serde(default)]
    pub instance_id: Option<String>,
    /// Unix seconds; defaults to now.
    #[serde(default)]
    pub timestamp: Option<u64>,
    #[serde(flatten)]
    pub readings: ResourceReadings,
}

/// POST /api/v1/services/{id}/readings
pub async fn push_reading(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(req): Json<ReadingRequest>,
) -> impl IntoResponse {
    let Some(push) = &state.push else {
        return error_response("metrics source is not the push buffer", StatusCode::CONFLICT)
            .into_response();
    };
    if !is_configured(&state, &id) {
        return error_response("service not found", StatusCode::NOT_FOUND).into_response();
    }

    let ts = req.timestamp.unwrap_or_else(epoch_secs);
    match push
        .record(&id, req.instance_id.as_deref(), ts, req.readings)
        .await
    {
        Ok(()) => {
            debug!(service = %id, ts, "reading accepted");
            (StatusCode::ACCEPTED, ApiResponse::ok("accepted")).into_response()
        }
        Err(e @ MetricsError::Invalid(_)) => {
            error_response(&e.to_string(), StatusCode::BAD_REQUEST).into_response()
        }
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

// ── Reports ────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct ReportQuery {
    pub service: Option<String>,
    pub limit: Option<usize>,
}

/// GET /api/v1/reports
pub async fn list_reports(
    State(state): State<ApiState>,
    Query(query): Query<ReportQuery>,
) -> impl IntoResponse {
    let limit = query.limit.unwrap_or(DEFAULT_REPORT_LIMIT);
    let reports = match &query.service {
        Some(service) => state.reports.for_service(service, limit),
        None => state.reports.recent(limit),
    };
    ApiResponse::ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use scalewatch_autoscale::{MemoryTarget, ScalingController};
    use scalewatch_core::BoxFuture;
    use scalewatch_loop::{DecisionLoop, LoopSettings, ReportLog};
    use scalewatch_metrics::PushSource;
    use scalewatch_notify::MemorySink;
    use scalewatch_scorer::{AnomalyScorer, Prediction, ScoringBackend, ScoringError};

    struct CpuModel;

    impl ScoringBackend for CpuModel {
        fn name(&self) -> &'static str {
            "cpu-model"
        }

        fn invoke(&self, features: [f64; 3]) -> BoxFuture<'_, Result<Prediction, ScoringError>> {
            let label = if features[0] > 80.0 { -1 } else { 1 };
            Box::pin(async move { Ok(Prediction { label, score: None }) })
        }
    }

    fn test_state(with_push: bool) -> ApiState {
        let push = Arc::new(PushSource::new(Duration::from_secs(3600)));
        let reports = Arc::new(ReportLog::new(16));
        let target = Arc::new(MemoryTarget::with_counts([("api", 2)]));
        let controller = ScalingController::new(target, ScalingBounds::default())
            .with_bounds("api", ScalingBounds::new(2, 6).unwrap());
        let decisions = DecisionLoop::new(
            push.clone(),
            AnomalyScorer::new(Arc::new(CpuModel)),
            Arc::new(controller),
            Arc::new(MemorySink::new()),
            LoopSettings::default(),
        )
        .with_services(vec!["api".to_string(), "web".to_string()])
        .with_report_log(reports.clone());
        ApiState {
            decisions,
            reports,
            push: with_push.then_some(push),
        }
    }

    fn reading(cpu: f64) -> ReadingRequest {
        ReadingRequest {
            instance_id: Some("i-1".into()),
            timestamp: None,
            readings: ResourceReadings::new(cpu, 30.0, 5.0),
        }
    }

    #[tokio::test]
    async fn healthz_is_ok() {
        assert_eq!(healthz().await.into_response().status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn push_then_cycle_scales() {
        let state = test_state(true);
        let resp = push_reading(State(state.clone()), Path("api".into()), Json(reading(95.0))).await;
        assert_eq!(resp.into_response().status(), StatusCode::ACCEPTED);

        let resp = run_cycle(State(state.clone()), Path("api".into())).await;
        assert_eq!(resp.into_response().status(), StatusCode::OK);

        let recent = state.reports.recent(5);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].decision.as_ref().unwrap().new_count, 3);
    }

    #[tokio::test]
    async fn failed_cycle_is_500() {
        let state = test_state(true);
        // No readings for "web".
        let resp = run_cycle(State(state.clone()), Path("web".into())).await;
        assert_eq!(resp.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!state.reports.recent(1)[0].is_success());
    }

    #[tokio::test]
    async fn unknown_service_is_404() {
        let state = test_state(true);
        let resp = run_cycle(State(state.clone()), Path("ghost".into())).await;
        assert_eq!(resp.into_response().status(), StatusCode::NOT_FOUND);

        let resp = push_reading(State(state), Path("ghost".into()), Json(reading(1.0))).await;
        assert_eq!(resp.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn out_of_range_reading_is_400() {
        let state = test_state(true);
        let resp = push_reading(State(state), Path("api".into()), Json(reading(140.0))).await;
        assert_eq!(resp.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn readings_rejected_without_push_buffer() {
        let state = test_state(false);
        let resp = push_reading(State(state), Path("api".into()), Json(reading(10.0))).await;
        assert_eq!(resp.into_response().status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn reports_filter_by_service() {
        let state = test_state(true);
        state.decisions.run_cycle("web").await;
        state.decisions.run_cycle("api").await;

        let query = ReportQuery {
            service: Some("web".into()),
            limit: None,
        };
        let resp = list_reports(State(state), Query(query)).await;
        assert_eq!(resp.into_response().status(), StatusCode::OK);
    }
}
