//! REST API surface
//!
//! Health probes plus the on-demand report trigger. Handlers stay thin;
//! everything interesting happens in the reporting service.

pub mod report_routes;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::database::SilverStore;
use crate::reporting::ReportingService;

pub use report_routes::{ProblemResponse, ReportMetricsBody, ReportResponse};

/// Shared state injected into handlers
#[derive(Clone)]
pub struct ApiState {
    pub silver: Arc<dyn SilverStore>,
    pub reporting: Arc<ReportingService>,
}

/// Build the application router.
pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(report_routes::health))
        .route("/ready", get(report_routes::ready))
        .route(
            "/reports/repositories/:owner/:name",
            post(report_routes::trigger_repository_report),
        )
        .with_state(state)
}
