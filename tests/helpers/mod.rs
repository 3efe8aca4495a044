//! In-memory store doubles and fixtures for integration tests
//!
//! The doubles implement the same store traits as the Postgres
//! implementations with matching upsert semantics, so the services under
//! test behave identically against either backend.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value as JsonValue};
use uuid::Uuid;

use ghillie::database::{
    BronzeStore, Commit, DocumentationChange, EntityTouch, EventFact, GoldStore, Hydration,
    IngestOutcome, IngestionCheckpoint, Issue, NewRawEvent, NewReportReview, PullRequest,
    RawEvent, RawEventState, Report, ReportMetricRow, ReportReview, Repository, ReviewState,
    SilverStore, StoreResult,
};
use ghillie::evidence::{ProjectEvidenceBundle, RepositoryEvidenceBundle};
use ghillie::model::{MachineSummary, ReportScope, StatusCode};
use ghillie::status_model::{InvocationMetrics, StatusModel, StatusModelError};

// ============================================================================
// In-memory stores
// ============================================================================

#[derive(Default)]
struct StoreState {
    raw_events: Vec<RawEvent>,
    facts: Vec<EventFact>,
    repositories: Vec<Repository>,
    commits: Vec<Commit>,
    pull_requests: Vec<PullRequest>,
    issues: Vec<Issue>,
    doc_changes: Vec<DocumentationChange>,
    checkpoints: HashMap<Uuid, IngestionCheckpoint>,
    reports: Vec<Report>,
    coverage: Vec<(Uuid, Uuid)>,
    reviews: Vec<ReportReview>,
}

/// One struct backing all three store traits, like a single database
#[derive(Default)]
pub struct InMemoryStores {
    state: Mutex<StoreState>,
}

impl InMemoryStores {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite a Bronze payload in place, simulating external corruption.
    pub fn corrupt_payload(&self, raw_event_id: Uuid, new_payload: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(event) = state.raw_events.iter_mut().find(|e| e.id == raw_event_id) {
            event.payload = new_payload.to_string();
        }
    }

    pub fn raw_event_ids(&self) -> Vec<Uuid> {
        self.state
            .lock()
            .unwrap()
            .raw_events
            .iter()
            .map(|e| e.id)
            .collect()
    }

    pub fn raw_event(&self, id: Uuid) -> Option<RawEvent> {
        self.state
            .lock()
            .unwrap()
            .raw_events
            .iter()
            .find(|e| e.id == id)
            .cloned()
    }

    pub fn commit_count(&self) -> usize {
        self.state.lock().unwrap().commits.len()
    }

    pub fn report_count(&self) -> usize {
        self.state.lock().unwrap().reports.len()
    }

    pub fn review_count(&self) -> usize {
        self.state.lock().unwrap().reviews.len()
    }

    pub fn reports(&self) -> Vec<Report> {
        self.state.lock().unwrap().reports.clone()
    }
}

#[async_trait]
impl BronzeStore for InMemoryStores {
    async fn insert_event(&self, event: &NewRawEvent) -> StoreResult<IngestOutcome> {
        let mut state = self.state.lock().unwrap();
        let duplicate = state
            .raw_events
            .iter()
            .any(|e| e.source == event.source && e.external_id == event.external_id);
        if duplicate {
            return Ok(IngestOutcome::Duplicate);
        }
        state.raw_events.push(RawEvent {
            id: event.id,
            source: event.source.clone(),
            event_type: event.event_type.clone(),
            external_id: event.external_id.clone(),
            payload: event.payload.clone(),
            received_at: event.received_at,
            occurred_at: event.occurred_at,
            state: RawEventState::Pending,
            failure_reason: None,
        });
        Ok(IngestOutcome::Inserted)
    }

    async fn fetch_pending(&self, limit: i64) -> StoreResult<Vec<RawEvent>> {
        self.fetch_by_state(RawEventState::Pending, limit).await
    }

    async fn fetch_by_state(
        &self,
        wanted: RawEventState,
        limit: i64,
    ) -> StoreResult<Vec<RawEvent>> {
        let state = self.state.lock().unwrap();
        let mut rows: Vec<RawEvent> = state
            .raw_events
            .iter()
            .filter(|e| e.state == wanted)
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            (a.occurred_at, &a.external_id).cmp(&(b.occurred_at, &b.external_id))
        });
        rows.truncate(limit as usize);
        Ok(rows)
    }

    async fn get_event(&self, id: Uuid) -> StoreResult<Option<RawEvent>> {
        Ok(self.raw_event(id))
    }

    async fn mark_failed(&self, id: Uuid, reason: &str) -> StoreResult<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(event) = state.raw_events.iter_mut().find(|e| e.id == id) {
            event.state = RawEventState::Failed;
            event.failure_reason = Some(reason.to_string());
        }
        Ok(())
    }

    async fn count_by_state(&self, wanted: RawEventState) -> StoreResult<i64> {
        let state = self.state.lock().unwrap();
        Ok(state.raw_events.iter().filter(|e| e.state == wanted).count() as i64)
    }
}

#[async_trait]
impl SilverStore for InMemoryStores {
    async fn upsert_repository(
        &self,
        owner: &str,
        name: &str,
        documentation_paths: Option<&[String]>,
        ingestion_enabled: bool,
    ) -> StoreResult<Repository> {
        let mut state = self.state.lock().unwrap();
        if let Some(existing) = state
            .repositories
            .iter_mut()
            .find(|r| r.github_owner == owner && r.github_name == name)
        {
            existing.documentation_paths = documentation_paths.map(|p| p.to_vec());
            existing.ingestion_enabled = ingestion_enabled;
            return Ok(existing.clone());
        }
        let repository = Repository {
            id: Uuid::now_v7(),
            github_owner: owner.to_string(),
            github_name: name.to_string(),
            documentation_paths: documentation_paths.map(|p| p.to_vec()),
            ingestion_enabled,
        };
        state.repositories.push(repository.clone());
        Ok(repository)
    }

    async fn get_repository(&self, id: Uuid) -> StoreResult<Option<Repository>> {
        let state = self.state.lock().unwrap();
        Ok(state.repositories.iter().find(|r| r.id == id).cloned())
    }

    async fn get_repository_by_slug(
        &self,
        owner: &str,
        name: &str,
    ) -> StoreResult<Option<Repository>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .repositories
            .iter()
            .find(|r| r.github_owner == owner && r.github_name == name)
            .cloned())
    }

    async fn list_repositories(&self) -> StoreResult<Vec<Repository>> {
        let state = self.state.lock().unwrap();
        let mut rows = state.repositories.clone();
        rows.sort_by(|a, b| a.slug().cmp(&b.slug()));
        Ok(rows)
    }

    async fn set_ingestion_enabled(&self, id: Uuid, enabled: bool) -> StoreResult<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(repository) = state.repositories.iter_mut().find(|r| r.id == id) {
            repository.ingestion_enabled = enabled;
        }
        Ok(())
    }

    async fn apply_transformation(
        &self,
        raw_event_id: Uuid,
        hydration: &Hydration,
    ) -> StoreResult<()> {
        let mut state = self.state.lock().unwrap();

        if !state.facts.iter().any(|f| f.raw_event_id == raw_event_id) {
            let fact = &hydration.fact;
            state.facts.push(EventFact {
                id: fact.id,
                raw_event_id,
                repo_id: fact.repo_id,
                event_type: fact.event_type.clone(),
                occurred_at: fact.occurred_at,
                payload_digest: fact.payload_digest.clone(),
                payload: fact.payload.clone(),
            });
        }

        for commit in &hydration.writes.commits {
            let exists = state
                .commits
                .iter()
                .any(|c| c.repo_id == commit.repo_id && c.sha == commit.sha);
            if !exists {
                state.commits.push(commit.clone());
            }
        }

        for change in &hydration.writes.doc_changes {
            let exists = state.doc_changes.iter().any(|d| {
                d.repo_id == change.repo_id
                    && d.commit_sha == change.commit_sha
                    && d.path == change.path
            });
            if !exists {
                state.doc_changes.push(change.clone());
            }
        }

        if let Some(pr) = &hydration.writes.pull_request {
            if let Some(existing) = state
                .pull_requests
                .iter_mut()
                .find(|p| p.repo_id == pr.repo_id && p.number == pr.number)
            {
                existing.title = pr.title.clone();
                existing.state = pr.state;
                existing.labels = pr.labels.clone();
                existing.updated_at = pr.updated_at;
                existing.closed_at = pr.closed_at;
                existing.merged_at = pr.merged_at;
            } else {
                state.pull_requests.push(pr.clone());
            }
        }

        if let Some(issue) = &hydration.writes.issue {
            if let Some(existing) = state
                .issues
                .iter_mut()
                .find(|i| i.repo_id == issue.repo_id && i.number == issue.number)
            {
                existing.title = issue.title.clone();
                existing.state = issue.state;
                existing.labels = issue.labels.clone();
                existing.updated_at = issue.updated_at;
                existing.closed_at = issue.closed_at;
            } else {
                state.issues.push(issue.clone());
            }
        }

        let repo_id = hydration.fact.repo_id;
        for touch in &hydration.writes.touches {
            match touch {
                EntityTouch::PullRequest { number, at } => {
                    if let Some(pr) = state
                        .pull_requests
                        .iter_mut()
                        .find(|p| p.repo_id == repo_id && p.number == *number)
                    {
                        pr.updated_at = pr.updated_at.max(*at);
                    }
                }
                EntityTouch::Issue { number, at } => {
                    if let Some(issue) = state
                        .issues
                        .iter_mut()
                        .find(|i| i.repo_id == repo_id && i.number == *number)
                    {
                        issue.updated_at = issue.updated_at.max(*at);
                    }
                }
            }
        }

        if let Some(event) = state.raw_events.iter_mut().find(|e| e.id == raw_event_id) {
            event.state = RawEventState::Transformed;
            event.failure_reason = None;
        }
        Ok(())
    }

    async fn get_fact_for_raw_event(&self, raw_event_id: Uuid) -> StoreResult<Option<EventFact>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .facts
            .iter()
            .find(|f| f.raw_event_id == raw_event_id)
            .cloned())
    }

    async fn list_facts_in_window(
        &self,
        repo_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<EventFact>> {
        let state = self.state.lock().unwrap();
        let mut rows: Vec<EventFact> = state
            .facts
            .iter()
            .filter(|f| f.repo_id == repo_id && f.occurred_at >= start && f.occurred_at < end)
            .cloned()
            .collect();
        rows.sort_by_key(|f| (f.occurred_at, f.id));
        Ok(rows)
    }

    async fn count_facts(&self) -> StoreResult<i64> {
        Ok(self.state.lock().unwrap().facts.len() as i64)
    }

    async fn get_commits(&self, repo_id: Uuid, shas: &[String]) -> StoreResult<Vec<Commit>> {
        let state = self.state.lock().unwrap();
        let wanted: HashSet<&str> = shas.iter().map(String::as_str).collect();
        let mut rows: Vec<Commit> = state
            .commits
            .iter()
            .filter(|c| c.repo_id == repo_id && wanted.contains(c.sha.as_str()))
            .cloned()
            .collect();
        rows.sort_by(|a, b| (a.authored_at, &a.sha).cmp(&(b.authored_at, &b.sha)));
        Ok(rows)
    }

    async fn get_pull_requests(
        &self,
        repo_id: Uuid,
        numbers: &[i64],
    ) -> StoreResult<Vec<PullRequest>> {
        let state = self.state.lock().unwrap();
        let wanted: HashSet<i64> = numbers.iter().copied().collect();
        let mut rows: Vec<PullRequest> = state
            .pull_requests
            .iter()
            .filter(|p| p.repo_id == repo_id && wanted.contains(&p.number))
            .cloned()
            .collect();
        rows.sort_by_key(|p| p.number);
        Ok(rows)
    }

    async fn get_issues(&self, repo_id: Uuid, numbers: &[i64]) -> StoreResult<Vec<Issue>> {
        let state = self.state.lock().unwrap();
        let wanted: HashSet<i64> = numbers.iter().copied().collect();
        let mut rows: Vec<Issue> = state
            .issues
            .iter()
            .filter(|i| i.repo_id == repo_id && wanted.contains(&i.number))
            .cloned()
            .collect();
        rows.sort_by_key(|i| i.number);
        Ok(rows)
    }

    async fn get_doc_changes(
        &self,
        repo_id: Uuid,
        keys: &[(String, String)],
    ) -> StoreResult<Vec<DocumentationChange>> {
        let state = self.state.lock().unwrap();
        let wanted: HashSet<(&str, &str)> = keys
            .iter()
            .map(|(sha, path)| (sha.as_str(), path.as_str()))
            .collect();
        let mut rows: Vec<DocumentationChange> = state
            .doc_changes
            .iter()
            .filter(|d| {
                d.repo_id == repo_id && wanted.contains(&(d.commit_sha.as_str(), d.path.as_str()))
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| (&a.commit_sha, &a.path).cmp(&(&b.commit_sha, &b.path)));
        Ok(rows)
    }

    async fn load_checkpoint(&self, repo_id: Uuid) -> StoreResult<Option<IngestionCheckpoint>> {
        let state = self.state.lock().unwrap();
        Ok(state.checkpoints.get(&repo_id).copied())
    }

    async fn save_checkpoint(
        &self,
        repo_id: Uuid,
        checkpoint: &IngestionCheckpoint,
    ) -> StoreResult<()> {
        let mut state = self.state.lock().unwrap();
        let merged = match state.checkpoints.get(&repo_id) {
            Some(previous) => IngestionCheckpoint {
                last_success_at: checkpoint.last_success_at,
                last_event_at: match (previous.last_event_at, checkpoint.last_event_at) {
                    (Some(a), Some(b)) => Some(a.max(b)),
                    (a, b) => a.or(b),
                },
            },
            None => *checkpoint,
        };
        state.checkpoints.insert(repo_id, merged);
        Ok(())
    }
}

#[async_trait]
impl GoldStore for InMemoryStores {
    async fn insert_report(&self, report: &Report, coverage: &[Uuid]) -> StoreResult<()> {
        let mut state = self.state.lock().unwrap();
        state.reports.push(report.clone());
        for fact_id in coverage {
            state.coverage.push((report.id, *fact_id));
        }
        Ok(())
    }

    async fn latest_repository_report(&self, repository_id: Uuid) -> StoreResult<Option<Report>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .reports
            .iter()
            .filter(|r| {
                r.scope == ReportScope::Repository && r.repository_id == Some(repository_id)
            })
            .max_by_key(|r| (r.window_end, r.generated_at))
            .cloned())
    }

    async fn latest_project_report(&self, project_key: &str) -> StoreResult<Option<Report>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .reports
            .iter()
            .filter(|r| {
                r.scope == ReportScope::Project && r.project_key.as_deref() == Some(project_key)
            })
            .max_by_key(|r| (r.window_end, r.generated_at))
            .cloned())
    }

    async fn latest_reports_for_repositories(
        &self,
        repository_ids: &[Uuid],
    ) -> StoreResult<HashMap<Uuid, Report>> {
        let mut latest = HashMap::new();
        for &repo_id in repository_ids {
            if let Some(report) = self.latest_repository_report(repo_id).await? {
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
        let state = self.state.lock().unwrap();
        let wanted: HashSet<Uuid> = fact_ids.iter().copied().collect();
        let repository_reports: HashSet<Uuid> = state
            .reports
            .iter()
            .filter(|r| {
                r.scope == ReportScope::Repository && r.repository_id == Some(repository_id)
            })
            .map(|r| r.id)
            .collect();
        Ok(state
            .coverage
            .iter()
            .filter(|(report_id, fact_id)| {
                repository_reports.contains(report_id) && wanted.contains(fact_id)
            })
            .map(|(_, fact_id)| *fact_id)
            .collect())
    }

    async fn upsert_pending_review(&self, review: &NewReportReview) -> StoreResult<ReportReview> {
        let mut state = self.state.lock().unwrap();
        if let Some(existing) = state.reviews.iter_mut().find(|r| {
            r.state == ReviewState::Pending
                && r.scope_key == review.scope_key
                && r.window_start == review.window_start
                && r.window_end == review.window_end
        }) {
            existing.model = review.model.clone();
            existing.attempt_count = review.attempt_count;
            existing.validation_issues = review.validation_issues.clone();
            return Ok(existing.clone());
        }
        let row = ReportReview {
            id: Uuid::now_v7(),
            scope_key: review.scope_key.clone(),
            window_start: review.window_start,
            window_end: review.window_end,
            model: review.model.clone(),
            attempt_count: review.attempt_count,
            validation_issues: review.validation_issues.clone(),
            state: ReviewState::Pending,
            created_at: Utc::now(),
        };
        state.reviews.push(row.clone());
        Ok(row)
    }

    async fn list_reviews(&self, wanted: Option<ReviewState>) -> StoreResult<Vec<ReportReview>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .reviews
            .iter()
            .filter(|r| wanted.map_or(true, |w| r.state == w))
            .cloned()
            .collect())
    }

    async fn report_metric_rows(
        &self,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
        scope: Option<ReportScope>,
    ) -> StoreResult<Vec<ReportMetricRow>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .reports
            .iter()
            .filter(|r| r.generated_at >= period_start && r.generated_at < period_end)
            .filter(|r| scope.map_or(true, |s| r.scope == s))
            .map(|r| ReportMetricRow {
                model_latency_ms: r.model_latency_ms,
                prompt_tokens: r.prompt_tokens,
                completion_tokens: r.completion_tokens,
                total_tokens: r.total_tokens,
            })
            .collect())
    }
}

// ============================================================================
// Scripted status model
// ============================================================================

/// One scripted model response
pub enum ScriptedResponse {
    Summary(MachineSummary),
    Shape(String),
}

/// Status model that replays a scripted response sequence
pub struct ScriptedStatusModel {
    responses: Mutex<VecDeque<ScriptedResponse>>,
    invocations: AtomicUsize,
    metrics: Option<InvocationMetrics>,
}

impl ScriptedStatusModel {
    pub fn new(responses: Vec<ScriptedResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            invocations: AtomicUsize::new(0),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: InvocationMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }

    fn next(&self) -> Result<MachineSummary, StatusModelError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        let mut responses = self.responses.lock().unwrap();
        match responses.pop_front() {
            Some(ScriptedResponse::Summary(summary)) => Ok(summary),
            Some(ScriptedResponse::Shape(message)) => {
                Err(StatusModelError::ResponseShape(message))
            }
            None => panic!("scripted status model ran out of responses"),
        }
    }
}

#[async_trait]
impl StatusModel for ScriptedStatusModel {
    fn model_id(&self) -> String {
        "scripted".to_string()
    }

    async fn summarize_repository(
        &self,
        _bundle: &RepositoryEvidenceBundle,
    ) -> Result<MachineSummary, StatusModelError> {
        self.next()
    }

    async fn summarize_project(
        &self,
        _bundle: &ProjectEvidenceBundle,
    ) -> Result<MachineSummary, StatusModelError> {
        self.next()
    }

    fn last_invocation_metrics(&self) -> Option<InvocationMetrics> {
        self.metrics
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub fn valid_summary(text: &str) -> MachineSummary {
    MachineSummary {
        status: StatusCode::OnTrack,
        summary: text.to_string(),
        highlights: Vec::new(),
        risks: Vec::new(),
        next_steps: Vec::new(),
    }
}

pub fn empty_summary() -> MachineSummary {
    MachineSummary {
        status: StatusCode::OnTrack,
        summary: String::new(),
        highlights: Vec::new(),
        risks: Vec::new(),
        next_steps: Vec::new(),
    }
}

/// Push event payload with a single commit.
pub fn push_payload(owner: &str, name: &str, sha: &str, message: &str, paths: &[&str]) -> JsonValue {
    json!({
        "repository": {"owner": owner, "name": name},
        "commits": [{
            "sha": sha,
            "message": message,
            "timestamp": "2024-07-10T12:00:00Z",
            "author": {"login": "mallory"},
            "added": paths,
            "modified": [],
        }],
    })
}

/// Pull request event payload.
pub fn pull_request_payload(
    owner: &str,
    name: &str,
    number: i64,
    title: &str,
    state: &str,
    labels: &[&str],
) -> JsonValue {
    json!({
        "repository": {"owner": owner, "name": name},
        "action": "synchronize",
        "pull_request": {
            "number": number,
            "title": title,
            "state": state,
            "labels": labels,
            "user": {"login": "sam"},
            "created_at": "2024-07-09T09:00:00Z",
            "updated_at": "2024-07-10T12:00:00Z",
        },
    })
}
