//! Structured lifecycle events for ingestion and reporting
//!
//! Events are plain `tracing` records with stable `event` names and targets so
//! downstream log pipelines can filter on them without parsing free text.

use tracing::{info, warn};
use uuid::Uuid;

/// Classification of upstream failures for retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Worth retrying on the next scheduled pass (5xx, 429, network, timeout).
    Transient,
    /// Not retried automatically (other 4xx, contract violations).
    Permanent,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::Permanent => "permanent",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn ingestion_run_started(repo_slug: &str) {
    info!(
        target: "ghillie::ingestion",
        event = "ingestion.run.started",
        repo_slug,
    );
}

pub fn ingestion_run_completed(repo_slug: &str, events_ingested: usize, latency_ms: u64) {
    info!(
        target: "ghillie::ingestion",
        event = "ingestion.run.completed",
        repo_slug,
        events_ingested,
        latency_ms,
    );
}

pub fn ingestion_run_failed(repo_slug: &str, category: ErrorCategory, message: &str) {
    warn!(
        target: "ghillie::ingestion",
        event = "ingestion.run.failed",
        repo_slug,
        error_category = category.as_str(),
        message,
    );
}

pub fn report_run_started(scope_key: &str, window_start: &str, window_end: &str) {
    info!(
        target: "ghillie::reporting",
        event = "reporting.report.started",
        scope_key,
        window_start,
        window_end,
    );
}

pub fn report_run_completed(
    scope_key: &str,
    report_id: Uuid,
    latency_ms: i64,
    total_tokens: Option<i64>,
) {
    info!(
        target: "ghillie::reporting",
        event = "reporting.report.completed",
        scope_key,
        report_id = %report_id,
        latency_ms,
        total_tokens,
    );
}

pub fn report_run_failed(scope_key: &str, error_kind: &str, message: &str) {
    warn!(
        target: "ghillie::reporting",
        event = "reporting.report.failed",
        scope_key,
        error_kind,
        message,
    );
}
