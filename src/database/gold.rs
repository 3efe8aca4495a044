//! Gold store: reports, coverage, review markers, and report metrics
//!
//! A report and its coverage rows commit in one transaction so a report can
//! never exist without the coverage that makes subsequent windows idempotent.
//! Pending review markers are unique per `(scope_key, window)` via a partial
//! unique index; repeats upsert into the existing pending row.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::model::{MachineSummary, ReportScope, ValidationIssue};

use super::{StoreError, StoreResult};

// ============================================================================
// Types
// ============================================================================

/// Persisted status report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub id: Uuid,
    pub scope: ReportScope,
    pub repository_id: Option<Uuid>,
    pub project_key: Option<String>,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub generated_at: DateTime<Utc>,
    pub model: String,
    pub human_text: Option<String>,
    pub machine_summary: MachineSummary,
    pub model_latency_ms: Option<i64>,
    pub prompt_tokens: Option<i64>,
    pub completion_tokens: Option<i64>,
    pub total_tokens: Option<i64>,
}

/// Review marker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ReviewState {
    Pending,
    Resolved,
}

/// Human-review marker for exhausted validation retries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportReview {
    pub id: Uuid,
    pub scope_key: String,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub model: String,
    pub attempt_count: i32,
    pub validation_issues: Vec<ValidationIssue>,
    pub state: ReviewState,
    pub created_at: DateTime<Utc>,
}

/// Fields for upserting a pending review marker
#[derive(Debug, Clone)]
pub struct NewReportReview {
    pub scope_key: String,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub model: String,
    pub attempt_count: i32,
    pub validation_issues: Vec<ValidationIssue>,
}

/// Nullable metric columns of one report, for aggregation
#[derive(Debug, Clone, Copy, Default, FromRow)]
pub struct ReportMetricRow {
    pub model_latency_ms: Option<i64>,
    pub prompt_tokens: Option<i64>,
    pub completion_tokens: Option<i64>,
    pub total_tokens: Option<i64>,
}

// ============================================================================
// Trait
// ============================================================================

/// Report artifact storage
#[async_trait]
pub trait GoldStore: Send + Sync {
    /// Persist a report and its coverage rows in one transaction.
    async fn insert_report(&self, report: &Report, coverage: &[Uuid]) -> StoreResult<()>;

    /// Most recent repository-scoped report for a repository, by window end.
    async fn latest_repository_report(&self, repository_id: Uuid) -> StoreResult<Option<Report>>;

    /// Most recent project-scoped report for a project key.
    async fn latest_project_report(&self, project_key: &str) -> StoreResult<Option<Report>>;

    /// Latest repository-scoped report per repository, resolved in one pass.
    async fn latest_reports_for_repositories(
        &self,
        repository_ids: &[Uuid],
    ) -> StoreResult<HashMap<Uuid, Report>>;

    /// Subset of `fact_ids` already covered by a repository-scoped report for
    /// this repository. Coverage from other scopes does not count.
    async fn covered_fact_ids(
        &self,
        repository_id: Uuid,
        fact_ids: &[Uuid],
    ) -> StoreResult<HashSet<Uuid>>;

    /// Upsert the pending review marker for `(scope_key, window)`.
    async fn upsert_pending_review(&self, review: &NewReportReview) -> StoreResult<ReportReview>;

    async fn list_reviews(&self, state: Option<ReviewState>) -> StoreResult<Vec<ReportReview>>;

    /// Metric columns of reports generated within a period, optionally
    /// filtered by scope.
    async fn report_metric_rows(
        &self,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
        scope: Option<ReportScope>,
    ) -> StoreResult<Vec<ReportMetricRow>>;
}

// ============================================================================
// Postgres implementation
// ============================================================================

#[derive(FromRow)]
struct ReportRow {
    id: Uuid,
    scope: ReportScope,
    repository_id: Option<Uuid>,
    project_key: Option<String>,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    generated_at: DateTime<Utc>,
    model: String,
    human_text: Option<String>,
    machine_summary: JsonValue,
    model_latency_ms: Option<i64>,
    prompt_tokens: Option<i64>,
    completion_tokens: Option<i64>,
    total_tokens: Option<i64>,
}

impl ReportRow {
    fn into_report(self) -> StoreResult<Report> {
        Ok(Report {
            id: self.id,
            scope: self.scope,
            repository_id: self.repository_id,
            project_key: self.project_key,
            window_start: self.window_start,
            window_end: self.window_end,
            generated_at: self.generated_at,
            model: self.model,
            human_text: self.human_text,
            machine_summary: serde_json::from_value(self.machine_summary)?,
            model_latency_ms: self.model_latency_ms,
            prompt_tokens: self.prompt_tokens,
            completion_tokens: self.completion_tokens,
            total_tokens: self.total_tokens,
        })
    }
}

#[derive(FromRow)]
struct ReviewRow {
    id: Uuid,
    scope_key: String,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    model: String,
    attempt_count: i32,
    validation_issues: JsonValue,
    state: ReviewState,
    created_at: DateTime<Utc>,
}

impl ReviewRow {
    fn into_review(self) -> StoreResult<ReportReview> {
        Ok(ReportReview {
            id: self.id,
            scope_key: self.scope_key,
            window_start: self.window_start,
            window_end: self.window_end,
            model: self.model,
            attempt_count: self.attempt_count,
            validation_issues: serde_json::from_value(self.validation_issues)?,
            state: self.state,
            created_at: self.created_at,
        })
    }
}

const REPORT_COLUMNS: &str = "id, scope, repository_id, project_key, window_start, window_end, \
                              generated_at, model, human_text, machine_summary, model_latency_ms, \
                              prompt_tokens, completion_tokens, total_tokens";

const REVIEW_COLUMNS: &str = "id, scope_key, window_start, window_end, model, attempt_count, \
                              validation_issues, state, created_at";

/// Postgres-backed Gold store
pub struct PgGoldStore {
    pool: PgPool,
}

impl PgGoldStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GoldStore for PgGoldStore {
    async fn insert_report(&self, report: &Report, coverage: &[Uuid]) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO "ghillie".gold_reports
                (id, scope, repository_id, project_key, window_start, window_end, generated_at,
                 model, human_text, machine_summary, model_latency_ms, prompt_tokens,
                 completion_tokens, total_tokens)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(report.id)
        .bind(report.scope)
        .bind(report.repository_id)
        .bind(&report.project_key)
        .bind(report.window_start)
        .bind(report.window_end)
        .bind(report.generated_at)
        .bind(&report.model)
        .bind(&report.human_text)
        .bind(serde_json::to_value(&report.machine_summary)?)
        .bind(report.model_latency_ms)
        .bind(report.prompt_tokens)
        .bind(report.completion_tokens)
        .bind(report.total_tokens)
        .execute(&mut *tx)
        .await?;

        for fact_id in coverage {
            sqlx::query(
                r#"
                INSERT INTO "ghillie".gold_report_coverage (report_id, event_fact_id)
                VALUES ($1, $2)
                ON CONFLICT (report_id, event_fact_id) DO NOTHING
                "#,
            )
            .bind(report.id)
            .bind(fact_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn latest_repository_report(&self, repository_id: Uuid) -> StoreResult<Option<Report>> {
        let row = sqlx::query_as::<_, ReportRow>(&format!(
            r#"
            SELECT {REPORT_COLUMNS}
            FROM "ghillie".gold_reports
            WHERE scope = 'repository' AND repository_id = $1
            ORDER BY window_end DESC, generated_at DESC
            LIMIT 1
            "#
        ))
        .bind(repository_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ReportRow::into_report).transpose()
    }

    async fn latest_project_report(&self, project_key: &str) -> StoreResult<Option<Report>> {
        let row = sqlx::query_as::<_, ReportRow>(&format!(
            r#"
            SELECT {REPORT_COLUMNS}
            FROM "ghillie".gold_reports
            WHERE scope = 'project' AND project_key = $1
            ORDER BY window_end DESC, generated_at DESC
            LIMIT 1
            "#
        ))
        .bind(project_key)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ReportRow::into_report).transpose()
    }

    async fn latest_reports_for_repositories(
        &self,
        repository_ids: &[Uuid],
    ) -> StoreResult<HashMap<Uuid, Report>> {
        if repository_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = sqlx::query_as::<_, ReportRow>(&format!(
            r#"
            SELECT DISTINCT ON (repository_id) {REPORT_COLUMNS}
            FROM "ghillie".gold_reports
            WHERE scope = 'repository' AND repository_id = ANY($1)
            ORDER BY repository_id, window_end DESC, generated_at DESC
            "#
        ))
        .bind(repository_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut latest = HashMap::new();
        for row in rows {
            let report = row.into_report()?;
            if let Some(repo_id) = report.repository_id {
                latest.insert(repo_id, report);
            }
        }
        Ok(latest)
    }

    async fn covered_fact_ids(
        &self,
        repository_id: Uuid,
        fact_ids: &[Uuid],
    ) -> StoreResult<HashSet<Uuid>> {
        if fact_ids.is_empty() {
            return Ok(HashSet::new());
        }

        let rows = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT c.event_fact_id
            FROM "ghillie".gold_report_coverage c
            JOIN "ghillie".gold_reports r ON r.id = c.report_id
            WHERE r.scope = 'repository'
              AND r.repository_id = $1
              AND c.event_fact_id = ANY($2)
            "#,
        )
        .bind(repository_id)
        .bind(fact_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().collect())
    }

    async fn upsert_pending_review(&self, review: &NewReportReview) -> StoreResult<ReportReview> {
        let row = sqlx::query_as::<_, ReviewRow>(&format!(
            r#"
            INSERT INTO "ghillie".gold_report_reviews
                (id, scope_key, window_start, window_end, model, attempt_count,
                 validation_issues, state, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending', $8)
            ON CONFLICT (scope_key, window_start, window_end) WHERE state = 'pending'
            DO UPDATE SET
                model = EXCLUDED.model,
                attempt_count = EXCLUDED.attempt_count,
                validation_issues = EXCLUDED.validation_issues
            RETURNING {REVIEW_COLUMNS}
            "#
        ))
        .bind(Uuid::now_v7())
        .bind(&review.scope_key)
        .bind(review.window_start)
        .bind(review.window_end)
        .bind(&review.model)
        .bind(review.attempt_count)
        .bind(serde_json::to_value(&review.validation_issues)?)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        row.into_review()
    }

    async fn list_reviews(&self, state: Option<ReviewState>) -> StoreResult<Vec<ReportReview>> {
        let rows = match state {
            Some(state) => {
                sqlx::query_as::<_, ReviewRow>(&format!(
                    r#"
                    SELECT {REVIEW_COLUMNS}
                    FROM "ghillie".gold_report_reviews
                    WHERE state = $1
                    ORDER BY created_at
                    "#
                ))
                .bind(state)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, ReviewRow>(&format!(
                    r#"
                    SELECT {REVIEW_COLUMNS}
                    FROM "ghillie".gold_report_reviews
                    ORDER BY created_at
                    "#
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.into_iter().map(ReviewRow::into_review).collect()
    }

    async fn report_metric_rows(
        &self,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
        scope: Option<ReportScope>,
    ) -> StoreResult<Vec<ReportMetricRow>> {
        let rows = match scope {
            Some(scope) => {
                sqlx::query_as::<_, ReportMetricRow>(
                    r#"
                    SELECT model_latency_ms, prompt_tokens, completion_tokens, total_tokens
                    FROM "ghillie".gold_reports
                    WHERE generated_at >= $1 AND generated_at < $2 AND scope = $3
                    "#,
                )
                .bind(period_start)
                .bind(period_end)
                .bind(scope)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, ReportMetricRow>(
                    r#"
                    SELECT model_latency_ms, prompt_tokens, completion_tokens, total_tokens
                    FROM "ghillie".gold_reports
                    WHERE generated_at >= $1 AND generated_at < $2
                    "#,
                )
                .bind(period_start)
                .bind(period_end)
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(rows)
    }
}
