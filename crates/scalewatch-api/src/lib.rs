//! scalewatch-api — REST API for scalewatch.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/healthz` | Liveness |
//! | GET | `/api/v1/services` | Configured services with their bounds |
//! | POST | `/api/v1/services/{id}/cycles` | Run one decision cycle now |
//! | POST | `/api/v1/services/{id}/readings` | Push a utilization reading |
//! | GET | `/api/v1/reports` | Recent cycle reports, newest first |

pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use scalewatch_loop::{DecisionLoop, ReportLog};
use scalewatch_metrics::PushSource;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub decisions: DecisionLoop,
    pub reports: Arc<ReportLog>,
    /// Present when the metrics source is the push buffer.
    pub push: Option<Arc<PushSource>>,
}

/// Build the complete API router.
pub fn build_router(state: ApiState) -> Router {
    let api_routes = Router::new()
        .route("/services", get(handlers::list_services))
        .route("/services/{id}/cycles", post(handlers::run_cycle))
        .route("/services/{id}/readings", post(handlers::push_reading))
        .route("/reports", get(handlers::list_reports))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/healthz", get(handlers::healthz))
}
