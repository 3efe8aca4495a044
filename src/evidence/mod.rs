//! Evidence bundles: immutable per-window aggregates for the status model
//!
//! A bundle is assembled once per `(scope, window)` and never mutated; two
//! builds at the same coordinates with no intervening ingestion or coverage
//! are identical, including ordering.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalogue::{EdgeKind, LifecycleStage};
use crate::model::{ItemState, MachineSummary, WorkType};

pub mod classify;
pub mod project;
pub mod repository;

pub use classify::{classify_commit, classify_issue, classify_pull_request};
pub use project::{ProjectEvidenceError, ProjectEvidenceService};
pub use repository::{EvidenceError, EvidenceService};

/// Half-open reporting window: start inclusive, end exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ReportWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at < self.end
    }
}

/// Identity of the repository a bundle describes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryRef {
    pub id: Uuid,
    pub owner: String,
    pub name: String,
}

impl RepositoryRef {
    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

/// Commit evidence with its work classification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitEvidence {
    pub sha: String,
    pub message: String,
    pub author_login: Option<String>,
    pub authored_at: DateTime<Utc>,
    pub work_type: WorkType,
}

/// Pull request evidence with its work classification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestEvidence {
    pub number: i64,
    pub title: String,
    pub state: ItemState,
    pub labels: Vec<String>,
    pub author_login: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub work_type: WorkType,
}

/// Issue evidence with its work classification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueEvidence {
    pub number: i64,
    pub title: String,
    pub state: ItemState,
    pub labels: Vec<String>,
    pub author_login: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub work_type: WorkType,
}

/// Documentation change evidence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocChangeEvidence {
    pub commit_sha: String,
    pub path: String,
    pub changed_at: DateTime<Utc>,
}

/// Count of entities per work type across a bundle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkBreakdown {
    pub bug: usize,
    pub feature: usize,
    pub docs: usize,
    pub chore: usize,
    pub other: usize,
}

impl WorkBreakdown {
    pub fn record(&mut self, work_type: WorkType) {
        match work_type {
            WorkType::Bug => self.bug += 1,
            WorkType::Feature => self.feature += 1,
            WorkType::Docs => self.docs += 1,
            WorkType::Chore => self.chore += 1,
            WorkType::Other => self.other += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.bug + self.feature + self.docs + self.chore + self.other
    }
}

/// Carried-forward context from the most recent report of the same scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviousReportContext {
    pub generated_at: DateTime<Utc>,
    pub summary: MachineSummary,
}

/// Immutable per-repository evidence bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryEvidenceBundle {
    pub repository: RepositoryRef,
    pub window: ReportWindow,
    pub commits: Vec<CommitEvidence>,
    pub pull_requests: Vec<PullRequestEvidence>,
    pub issues: Vec<IssueEvidence>,
    pub doc_changes: Vec<DocChangeEvidence>,
    pub work_breakdown: WorkBreakdown,
    pub previous_report: Option<PreviousReportContext>,
    /// Uncovered facts consumed by this bundle, sorted by `(occurred_at, id)`.
    pub event_fact_ids: Vec<Uuid>,
}

impl RepositoryEvidenceBundle {
    pub fn total_event_count(&self) -> usize {
        self.event_fact_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.event_fact_ids.is_empty()
    }

    pub fn open_pull_requests(&self) -> usize {
        self.pull_requests
            .iter()
            .filter(|pr| pr.state.is_open())
            .count()
    }

    pub fn open_issues(&self) -> usize {
        self.issues.iter().filter(|i| i.state.is_open()).count()
    }
}

/// Project identity inside a project bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectInfo {
    pub key: String,
    pub name: String,
}

/// Latest repository report attached to a component
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentRepositorySummary {
    pub repository_id: Uuid,
    pub slug: String,
    pub latest_report: Option<PreviousReportContext>,
}

/// Per-component evidence inside a project bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentEvidence {
    pub key: String,
    pub name: String,
    pub lifecycle: LifecycleStage,
    /// Absent for components without a resolved repository; they contribute
    /// lifecycle status only.
    pub repository: Option<ComponentRepositorySummary>,
}

/// A dependency edge between two components of the same project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentDependencyEvidence {
    pub from_component: String,
    pub to_component: String,
    pub kind: EdgeKind,
}

/// Immutable per-project evidence bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectEvidenceBundle {
    pub project: ProjectInfo,
    pub components: Vec<ComponentEvidence>,
    pub dependencies: Vec<ComponentDependencyEvidence>,
}

impl ProjectEvidenceBundle {
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn window_is_start_inclusive_end_exclusive() {
        let start = Utc.with_ymd_and_hms(2024, 7, 7, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 7, 14, 0, 0, 0).unwrap();
        let window = ReportWindow::new(start, end);

        assert!(window.contains(start));
        assert!(window.contains(end - chrono::Duration::seconds(1)));
        assert!(!window.contains(end));
    }

    #[test]
    fn work_breakdown_totals() {
        let mut breakdown = WorkBreakdown::default();
        breakdown.record(WorkType::Bug);
        breakdown.record(WorkType::Bug);
        breakdown.record(WorkType::Docs);
        assert_eq!(breakdown.bug, 2);
        assert_eq!(breakdown.total(), 3);
    }
}
