//! Report trigger and health endpoints

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::error;
use uuid::Uuid;

use crate::database::Report;
use crate::model::ValidationIssue;
use crate::reporting::ReportingError;

use super::ApiState;

// ============================================================================
// Response types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ReportMetricsBody {
    pub latency_ms: Option<i64>,
    pub prompt_tokens: Option<i64>,
    pub completion_tokens: Option<i64>,
    pub total_tokens: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ReportResponse {
    pub report_id: Uuid,
    pub repository: String,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub generated_at: DateTime<Utc>,
    pub status: String,
    pub model: String,
    pub metrics: ReportMetricsBody,
}

impl ReportResponse {
    fn from_report(slug: String, report: &Report) -> Self {
        Self {
            report_id: report.id,
            repository: slug,
            window_start: report.window_start,
            window_end: report.window_end,
            generated_at: report.generated_at,
            status: report.machine_summary.status.as_str().to_string(),
            model: report.model.clone(),
            metrics: ReportMetricsBody {
                latency_ms: report.model_latency_ms,
                prompt_tokens: report.prompt_tokens,
                completion_tokens: report.completion_tokens,
                total_tokens: report.total_tokens,
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProblemResponse {
    pub title: String,
    pub description: String,
}

#[derive(Debug, Serialize)]
pub struct ValidationProblemResponse {
    pub title: String,
    pub description: String,
    pub issues: Vec<ValidationIssue>,
    pub review_id: Uuid,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

pub async fn ready() -> Json<serde_json::Value> {
    Json(json!({"status": "ready"}))
}

/// POST /reports/repositories/{owner}/{name}
pub async fn trigger_repository_report(
    State(state): State<ApiState>,
    Path((owner, name)): Path<(String, String)>,
) -> Response {
    let slug = format!("{owner}/{name}");

    let repository = match state.silver.get_repository_by_slug(&owner, &name).await {
        Ok(Some(repository)) => repository,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(ProblemResponse {
                    title: "repository not found".to_string(),
                    description: format!("{slug} is not a registered repository"),
                }),
            )
                .into_response();
        }
        Err(e) => {
            error!(slug = %slug, error = %e, "repository lookup failed");
            return internal_error();
        }
    };

    match state.reporting.run_for_repository(repository.id, Utc::now()).await {
        Ok(Some(report)) => {
            (StatusCode::OK, Json(ReportResponse::from_report(slug, &report))).into_response()
        }
        Ok(None) => StatusCode::NO_CONTENT.into_response(),
        Err(ReportingError::ValidationExhausted {
            review_id,
            attempts,
            issues,
        }) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ValidationProblemResponse {
                title: "report failed validation".to_string(),
                description: format!(
                    "status model output failed validation after {attempts} attempt(s); \
                     a review marker was recorded"
                ),
                issues,
                review_id,
            }),
        )
            .into_response(),
        Err(ReportingError::RepositoryNotFound(_)) => (
            StatusCode::NOT_FOUND,
            Json(ProblemResponse {
                title: "repository not found".to_string(),
                description: format!("{slug} is not a registered repository"),
            }),
        )
            .into_response(),
        Err(e) => {
            error!(slug = %slug, error = %e, "reporting run failed");
            internal_error()
        }
    }
}

fn internal_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ProblemResponse {
            title: "internal error".to_string(),
            description: "the reporting run failed; see server logs".to_string(),
        }),
    )
        .into_response()
}
