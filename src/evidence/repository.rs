//! Repository evidence bundle service
//!
//! Selection works off the canonical facts: facts inside the half-open
//! window, minus facts already covered by a repository-scoped report, grouped
//! into identifier sets that drive entity lookups. Entities are fetched by
//! identifier, never by time, so an entity created before the window but
//! touched inside it still appears.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::database::{EventFact, GoldStore, SilverStore, StoreError};

use super::classify::{classify_commit, classify_issue, classify_pull_request};
use super::{
    CommitEvidence, DocChangeEvidence, IssueEvidence, PreviousReportContext, PullRequestEvidence,
    ReportWindow, RepositoryEvidenceBundle, RepositoryRef, WorkBreakdown,
};

/// Evidence assembly failures
#[derive(Debug, thiserror::Error)]
pub enum EvidenceError {
    #[error("repository {0} not found in silver")]
    RepositoryNotFound(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Identifier sets extracted from uncovered facts
#[derive(Debug, Default)]
struct IdentifierSets {
    commit_shas: BTreeSet<String>,
    pull_request_numbers: BTreeSet<i64>,
    issue_numbers: BTreeSet<i64>,
    doc_change_keys: BTreeSet<(String, String)>,
}

impl IdentifierSets {
    fn absorb(&mut self, fact: &EventFact) {
        let payload = &fact.payload;

        if let Some(shas) = payload.get("commit_shas").and_then(JsonValue::as_array) {
            self.commit_shas
                .extend(shas.iter().filter_map(JsonValue::as_str).map(str::to_string));
        }
        if let Some(number) = payload.get("pull_request_number").and_then(JsonValue::as_i64) {
            self.pull_request_numbers.insert(number);
        }
        if let Some(number) = payload.get("issue_number").and_then(JsonValue::as_i64) {
            self.issue_numbers.insert(number);
        }
        if let Some(changes) = payload.get("doc_changes").and_then(JsonValue::as_array) {
            for change in changes {
                let sha = change.get("commit_sha").and_then(JsonValue::as_str);
                let path = change.get("path").and_then(JsonValue::as_str);
                if let (Some(sha), Some(path)) = (sha, path) {
                    self.doc_change_keys
                        .insert((sha.to_string(), path.to_string()));
                }
            }
        }
    }
}

/// Builds immutable repository evidence bundles
pub struct EvidenceService {
    silver: Arc<dyn SilverStore>,
    gold: Arc<dyn GoldStore>,
}

impl EvidenceService {
    pub fn new(silver: Arc<dyn SilverStore>, gold: Arc<dyn GoldStore>) -> Self {
        Self { silver, gold }
    }

    /// Build the evidence bundle for a repository and window.
    pub async fn build(
        &self,
        repository_id: Uuid,
        window: ReportWindow,
    ) -> Result<RepositoryEvidenceBundle, EvidenceError> {
        let repository = self
            .silver
            .get_repository(repository_id)
            .await?
            .ok_or(EvidenceError::RepositoryNotFound(repository_id))?;

        // 1. Facts inside the half-open window.
        let facts = self
            .silver
            .list_facts_in_window(repository_id, window.start, window.end)
            .await?;

        // 2. Scope-specific coverage exclusion: only repository-scoped
        //    reports suppress facts here.
        let fact_ids: Vec<Uuid> = facts.iter().map(|f| f.id).collect();
        let covered = self.gold.covered_fact_ids(repository_id, &fact_ids).await?;
        let mut uncovered: Vec<&EventFact> =
            facts.iter().filter(|f| !covered.contains(&f.id)).collect();
        uncovered.sort_by_key(|f| (f.occurred_at, f.id));

        // 3. Identifier sets per event kind.
        let mut identifiers = IdentifierSets::default();
        for fact in &uncovered {
            identifiers.absorb(fact);
        }

        // 4. Entities by identifier set.
        let commit_shas: Vec<String> = identifiers.commit_shas.iter().cloned().collect();
        let pr_numbers: Vec<i64> = identifiers.pull_request_numbers.iter().copied().collect();
        let issue_numbers: Vec<i64> = identifiers.issue_numbers.iter().copied().collect();
        let doc_keys: Vec<(String, String)> =
            identifiers.doc_change_keys.iter().cloned().collect();

        let commits = self.silver.get_commits(repository_id, &commit_shas).await?;
        let pull_requests = self
            .silver
            .get_pull_requests(repository_id, &pr_numbers)
            .await?;
        let issues = self.silver.get_issues(repository_id, &issue_numbers).await?;
        let doc_changes = self.silver.get_doc_changes(repository_id, &doc_keys).await?;

        // 5. Classification: labels, then title patterns, then doc paths.
        let doc_shas: BTreeSet<&str> =
            doc_changes.iter().map(|d| d.commit_sha.as_str()).collect();

        let mut work_breakdown = WorkBreakdown::default();

        let mut commit_evidence: Vec<CommitEvidence> = commits
            .into_iter()
            .map(|commit| {
                let work_type =
                    classify_commit(&commit.message, doc_shas.contains(commit.sha.as_str()));
                work_breakdown.record(work_type);
                CommitEvidence {
                    sha: commit.sha,
                    message: commit.message,
                    author_login: commit.author_login,
                    authored_at: commit.authored_at,
                    work_type,
                }
            })
            .collect();
        commit_evidence.sort_by(|a, b| (a.authored_at, &a.sha).cmp(&(b.authored_at, &b.sha)));

        let mut pr_evidence: Vec<PullRequestEvidence> = pull_requests
            .into_iter()
            .map(|pr| {
                let work_type = classify_pull_request(&pr.labels, &pr.title);
                work_breakdown.record(work_type);
                PullRequestEvidence {
                    number: pr.number,
                    title: pr.title,
                    state: pr.state,
                    labels: pr.labels,
                    author_login: pr.author_login,
                    updated_at: pr.updated_at,
                    work_type,
                }
            })
            .collect();
        pr_evidence.sort_by_key(|pr| pr.number);

        let mut issue_evidence: Vec<IssueEvidence> = issues
            .into_iter()
            .map(|issue| {
                let work_type = classify_issue(&issue.labels, &issue.title);
                work_breakdown.record(work_type);
                IssueEvidence {
                    number: issue.number,
                    title: issue.title,
                    state: issue.state,
                    labels: issue.labels,
                    author_login: issue.author_login,
                    updated_at: issue.updated_at,
                    work_type,
                }
            })
            .collect();
        issue_evidence.sort_by_key(|issue| issue.number);

        let mut doc_evidence: Vec<DocChangeEvidence> = doc_changes
            .into_iter()
            .map(|change| DocChangeEvidence {
                commit_sha: change.commit_sha,
                path: change.path,
                changed_at: change.changed_at,
            })
            .collect();
        doc_evidence.sort_by(|a, b| {
            (&a.commit_sha, &a.path).cmp(&(&b.commit_sha, &b.path))
        });

        // 6. Previous repository-scoped report context.
        let previous_report = self
            .gold
            .latest_repository_report(repository_id)
            .await?
            .map(|report| PreviousReportContext {
                generated_at: report.generated_at,
                summary: report.machine_summary,
            });

        // 7. Deterministic fact ordering.
        let event_fact_ids: Vec<Uuid> = uncovered.iter().map(|f| f.id).collect();

        Ok(RepositoryEvidenceBundle {
            repository: RepositoryRef {
                id: repository.id,
                owner: repository.github_owner,
                name: repository.github_name,
            },
            window,
            commits: commit_evidence,
            pull_requests: pr_evidence,
            issues: issue_evidence,
            doc_changes: doc_evidence,
            work_breakdown,
            previous_report,
            event_fact_ids,
        })
    }
}
