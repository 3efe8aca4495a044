//! Reporting service orchestration
//!
//! One run per `(scope, window)`: build evidence, call the status model
//! inside a bounded validation retry loop, persist the report together with
//! its coverage, then hand the rendered Markdown to the sink. Exhausted
//! retries never persist a report; they upsert a pending review marker and
//! surface a domain failure.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use crate::database::{GoldStore, NewReportReview, Report, Repository, SilverStore, StoreError};
use crate::evidence::{
    EvidenceError, EvidenceService, ProjectEvidenceBundle, ProjectEvidenceError,
    ProjectEvidenceService, ReportWindow, RepositoryEvidenceBundle,
};
use crate::model::{MachineSummary, ReportScope, ValidationIssue};
use crate::observability::{report_run_completed, report_run_failed, report_run_started};
use crate::status_model::{InvocationMetrics, StatusModel, StatusModelError};

use super::markdown::render_report;
use super::sink::{ReportSink, ReportSinkMetadata};
use super::validator::validate;
use super::windows::compute_window;

/// Issue code recorded when the model response failed shape parsing.
const CODE_RESPONSE_SHAPE: &str = "response_shape";

/// Reporting service configuration
#[derive(Debug, Clone)]
pub struct ReportingConfig {
    pub window_days: i64,
    pub validation_max_attempts: u32,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            window_days: 7,
            validation_max_attempts: 2,
        }
    }
}

/// Reporting failures surfaced to callers
#[derive(Debug, thiserror::Error)]
pub enum ReportingError {
    #[error("repository {0} is not registered")]
    RepositoryNotFound(Uuid),

    #[error("project {0} is not in the catalogue")]
    ProjectNotFound(String),

    #[error("report validation failed after {attempts} attempt(s)")]
    ValidationExhausted {
        review_id: Uuid,
        attempts: u32,
        issues: Vec<ValidationIssue>,
    },

    #[error("status model failure: {0}")]
    Model(#[source] StatusModelError),

    #[error("catalogue unavailable: {0}")]
    Catalogue(#[from] crate::catalogue::CatalogueError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<EvidenceError> for ReportingError {
    fn from(error: EvidenceError) -> Self {
        match error {
            EvidenceError::RepositoryNotFound(id) => Self::RepositoryNotFound(id),
            EvidenceError::Store(e) => Self::Store(e),
        }
    }
}

impl From<ProjectEvidenceError> for ReportingError {
    fn from(error: ProjectEvidenceError) -> Self {
        match error {
            ProjectEvidenceError::ProjectNotFound(key) => Self::ProjectNotFound(key),
            ProjectEvidenceError::Catalogue(e) => Self::Catalogue(e),
            ProjectEvidenceError::Store(e) => Self::Store(e),
        }
    }
}

/// Borrowed evidence handed to the status model, by scope
#[derive(Clone, Copy)]
enum EvidenceRef<'a> {
    Repository(&'a RepositoryEvidenceBundle),
    Project(&'a ProjectEvidenceBundle),
}

/// The outcome of one summarize attempt
enum Attempt {
    Valid {
        summary: MachineSummary,
        latency_ms: i64,
        metrics: Option<InvocationMetrics>,
    },
    Invalid(Vec<ValidationIssue>),
}

/// Orchestrates status report generation
pub struct ReportingService {
    silver: Arc<dyn SilverStore>,
    gold: Arc<dyn GoldStore>,
    evidence: EvidenceService,
    project_evidence: ProjectEvidenceService,
    status_model: Arc<dyn StatusModel>,
    sink: Option<Arc<dyn ReportSink>>,
    config: ReportingConfig,
}

impl ReportingService {
    pub fn new(
        silver: Arc<dyn SilverStore>,
        gold: Arc<dyn GoldStore>,
        evidence: EvidenceService,
        project_evidence: ProjectEvidenceService,
        status_model: Arc<dyn StatusModel>,
        sink: Option<Arc<dyn ReportSink>>,
        config: ReportingConfig,
    ) -> Self {
        Self {
            silver,
            gold,
            evidence,
            project_evidence,
            status_model,
            sink,
            config,
        }
    }

    /// Generate the next repository report as of `as_of`.
    ///
    /// Returns `Ok(None)` when the window holds no uncovered events; nothing
    /// is persisted in that case.
    pub async fn run_for_repository(
        &self,
        repository_id: Uuid,
        as_of: DateTime<Utc>,
    ) -> Result<Option<Report>, ReportingError> {
        let repository = self
            .silver
            .get_repository(repository_id)
            .await?
            .ok_or(ReportingError::RepositoryNotFound(repository_id))?;
        let scope_key = format!("repository:{}", repository.slug());

        let previous = self.gold.latest_repository_report(repository_id).await?;
        let window = compute_window(
            previous.map(|r| r.window_end),
            as_of,
            self.config.window_days,
        );
        report_run_started(
            &scope_key,
            &window.start.to_rfc3339(),
            &window.end.to_rfc3339(),
        );

        let bundle = self.evidence.build(repository_id, window).await?;
        if bundle.is_empty() {
            info!(
                scope_key = %scope_key,
                "no uncovered events in window; skipping report"
            );
            return Ok(None);
        }

        let total_events = bundle.total_event_count();
        let outcome = self
            .attempt_loop(&scope_key, total_events, EvidenceRef::Repository(&bundle))
            .await?;

        match outcome {
            AttemptLoop::Valid {
                summary,
                latency_ms,
                metrics,
            } => {
                let report = self.build_report(
                    ReportScope::Repository,
                    Some(repository_id),
                    None,
                    window,
                    summary,
                    latency_ms,
                    metrics,
                );
                self.gold
                    .insert_report(&report, &bundle.event_fact_ids)
                    .await?;
                self.write_to_sink(&repository, &report).await;
                report_run_completed(&scope_key, report.id, latency_ms, report.total_tokens);
                Ok(Some(report))
            }
            AttemptLoop::Exhausted(issues) => {
                Err(self.exhausted(&scope_key, window, issues).await?)
            }
        }
    }

    /// Generate the next project report as of `as_of`.
    pub async fn run_for_project(
        &self,
        project_key: &str,
        as_of: DateTime<Utc>,
    ) -> Result<Option<Report>, ReportingError> {
        let scope_key = format!("project:{project_key}");

        let previous = self.gold.latest_project_report(project_key).await?;
        let window = compute_window(
            previous.map(|r| r.window_end),
            as_of,
            self.config.window_days,
        );
        report_run_started(
            &scope_key,
            &window.start.to_rfc3339(),
            &window.end.to_rfc3339(),
        );

        let bundle = self.project_evidence.build(project_key).await?;
        if bundle.is_empty() {
            info!(scope_key = %scope_key, "project has no components; skipping report");
            return Ok(None);
        }

        // A project bundle consumes component summaries, not raw facts, so
        // highlight plausibility is bounded by its component count.
        let total_events = bundle.components.len();
        let outcome = self
            .attempt_loop(&scope_key, total_events, EvidenceRef::Project(&bundle))
            .await?;

        match outcome {
            AttemptLoop::Valid {
                summary,
                latency_ms,
                metrics,
            } => {
                let report = self.build_report(
                    ReportScope::Project,
                    None,
                    Some(project_key.to_string()),
                    window,
                    summary,
                    latency_ms,
                    metrics,
                );
                self.gold.insert_report(&report, &[]).await?;
                report_run_completed(&scope_key, report.id, latency_ms, report.total_tokens);
                Ok(Some(report))
            }
            AttemptLoop::Exhausted(issues) => {
                Err(self.exhausted(&scope_key, window, issues).await?)
            }
        }
    }

    async fn summarize(
        &self,
        evidence: EvidenceRef<'_>,
    ) -> Result<MachineSummary, StatusModelError> {
        match evidence {
            EvidenceRef::Repository(bundle) => {
                self.status_model.summarize_repository(bundle).await
            }
            EvidenceRef::Project(bundle) => self.status_model.summarize_project(bundle).await,
        }
    }

    /// Bounded validation retry loop around the status model call.
    async fn attempt_loop(
        &self,
        scope_key: &str,
        total_events: usize,
        evidence: EvidenceRef<'_>,
    ) -> Result<AttemptLoop, ReportingError> {
        let mut all_issues: Vec<ValidationIssue> = Vec::new();

        for attempt in 1..=self.config.validation_max_attempts {
            match self.attempt_once(total_events, evidence).await {
                Ok(Attempt::Valid {
                    summary,
                    latency_ms,
                    metrics,
                }) => {
                    return Ok(AttemptLoop::Valid {
                        summary,
                        latency_ms,
                        metrics,
                    });
                }
                Ok(Attempt::Invalid(issues)) => {
                    warn!(
                        scope_key = %scope_key,
                        attempt,
                        issues = issues.len(),
                        "report attempt failed validation"
                    );
                    all_issues.extend(issues);
                }
                Err(e) => {
                    let kind = match &e {
                        StatusModelError::Api { kind, .. } => kind.as_str(),
                        StatusModelError::ResponseShape(_) => "response_shape",
                    };
                    report_run_failed(scope_key, kind, &e.to_string());
                    return Err(ReportingError::Model(e));
                }
            }
        }

        Ok(AttemptLoop::Exhausted(all_issues))
    }

    /// One model invocation plus validation.
    ///
    /// Shape failures count as validation failures toward the retry budget;
    /// API failures abort the run.
    async fn attempt_once(
        &self,
        total_events: usize,
        evidence: EvidenceRef<'_>,
    ) -> Result<Attempt, StatusModelError> {
        let started = Instant::now();
        let result = self.summarize(evidence).await;
        let latency_ms = started.elapsed().as_millis() as i64;

        match result {
            Ok(summary) => {
                let validation = validate(&summary, total_events);
                if validation.valid {
                    Ok(Attempt::Valid {
                        summary,
                        latency_ms,
                        metrics: self.status_model.last_invocation_metrics(),
                    })
                } else {
                    Ok(Attempt::Invalid(validation.issues))
                }
            }
            Err(StatusModelError::ResponseShape(message)) => Ok(Attempt::Invalid(vec![
                ValidationIssue::new(CODE_RESPONSE_SHAPE, message),
            ])),
            Err(api @ StatusModelError::Api { .. }) => Err(api),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn build_report(
        &self,
        scope: ReportScope,
        repository_id: Option<Uuid>,
        project_key: Option<String>,
        window: ReportWindow,
        summary: MachineSummary,
        latency_ms: i64,
        metrics: Option<InvocationMetrics>,
    ) -> Report {
        Report {
            id: Uuid::now_v7(),
            scope,
            repository_id,
            project_key,
            window_start: window.start,
            window_end: window.end,
            generated_at: Utc::now(),
            model: self.status_model.model_id(),
            human_text: None,
            machine_summary: summary,
            model_latency_ms: Some(latency_ms),
            prompt_tokens: metrics.and_then(|m| m.prompt_tokens),
            completion_tokens: metrics.and_then(|m| m.completion_tokens),
            total_tokens: metrics.and_then(|m| m.total_tokens),
        }
    }

    /// Upsert the pending review marker and build the exhaustion error.
    async fn exhausted(
        &self,
        scope_key: &str,
        window: ReportWindow,
        issues: Vec<ValidationIssue>,
    ) -> Result<ReportingError, StoreError> {
        let attempts = self.config.validation_max_attempts;
        let review = self
            .gold
            .upsert_pending_review(&NewReportReview {
                scope_key: scope_key.to_string(),
                window_start: window.start,
                window_end: window.end,
                model: self.status_model.model_id(),
                attempt_count: attempts as i32,
                validation_issues: issues.clone(),
            })
            .await?;

        report_run_failed(scope_key, "validation_exhausted", "retry budget exhausted");
        Ok(ReportingError::ValidationExhausted {
            review_id: review.id,
            attempts,
            issues,
        })
    }

    /// Sink failures are logged, never fatal: the report is already durable.
    async fn write_to_sink(&self, repository: &Repository, report: &Report) {
        let Some(sink) = &self.sink else {
            return;
        };

        let markdown = render_report(&repository.github_owner, &repository.github_name, report);
        let metadata = ReportSinkMetadata {
            owner: repository.github_owner.clone(),
            name: repository.github_name.clone(),
            report_id: report.id,
            window_end: report.window_end,
        };
        if let Err(e) = sink.write_report(&markdown, &metadata).await {
            warn!(report_id = %report.id, error = %e, "report sink write failed");
        }
    }
}

/// Result of the whole retry loop
enum AttemptLoop {
    Valid {
        summary: MachineSummary,
        latency_ms: i64,
        metrics: Option<InvocationMetrics>,
    },
    Exhausted(Vec<ValidationIssue>),
}
