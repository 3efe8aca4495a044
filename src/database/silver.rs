//! Silver store: refined entities and canonical event facts
//!
//! All entity upserts are keyed by natural identifiers (commit sha, PR/issue
//! number, doc change `(commit_sha, path)`), never by surrogate ids, so
//! replaying the same raw events is a no-op. A transformation is applied in a
//! single transaction together with the Bronze state flip, which keeps the
//! RawEvent/EventFact pairing invariant enforceable per transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::model::ItemState;

use super::{StoreError, StoreResult};

// ============================================================================
// Types
// ============================================================================

/// Silver repository row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub id: Uuid,
    pub github_owner: String,
    pub github_name: String,
    pub documentation_paths: Option<Vec<String>>,
    pub ingestion_enabled: bool,
}

impl Repository {
    pub fn slug(&self) -> String {
        format!("{}/{}", self.github_owner, self.github_name)
    }
}

/// Canonical per-raw-event record
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EventFact {
    pub id: Uuid,
    pub raw_event_id: Uuid,
    pub repo_id: Uuid,
    pub event_type: String,
    pub occurred_at: DateTime<Utc>,
    pub payload_digest: String,
    pub payload: JsonValue,
}

/// Fields for inserting an event fact
#[derive(Debug, Clone)]
pub struct NewEventFact {
    pub id: Uuid,
    pub repo_id: Uuid,
    pub event_type: String,
    pub occurred_at: DateTime<Utc>,
    pub payload_digest: String,
    pub payload: JsonValue,
}

/// Commit entity, keyed by `(repo_id, sha)`
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Commit {
    pub repo_id: Uuid,
    pub sha: String,
    pub message: String,
    pub author_login: Option<String>,
    pub author_is_bot: bool,
    pub authored_at: DateTime<Utc>,
}

/// Pull request entity, keyed by `(repo_id, number)`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequest {
    pub repo_id: Uuid,
    pub number: i64,
    pub title: String,
    pub state: ItemState,
    pub labels: Vec<String>,
    pub author_login: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub merged_at: Option<DateTime<Utc>>,
}

/// Issue entity, keyed by `(repo_id, number)`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub repo_id: Uuid,
    pub number: i64,
    pub title: String,
    pub state: ItemState,
    pub labels: Vec<String>,
    pub author_login: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

/// Documentation change entity, keyed by `(repo_id, commit_sha, path)`
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DocumentationChange {
    pub repo_id: Uuid,
    pub commit_sha: String,
    pub path: String,
    pub changed_at: DateTime<Utc>,
}

/// Per-repository ingestion checkpoint
#[derive(Debug, Clone, Copy, Serialize, Deserialize, FromRow)]
pub struct IngestionCheckpoint {
    pub last_success_at: DateTime<Utc>,
    pub last_event_at: Option<DateTime<Utc>>,
}

/// Touch instructions for comment-style events that only bump timestamps
#[derive(Debug, Clone)]
pub enum EntityTouch {
    PullRequest { number: i64, at: DateTime<Utc> },
    Issue { number: i64, at: DateTime<Utc> },
}

/// The Silver writes produced by one hydrator invocation
#[derive(Debug, Clone, Default)]
pub struct SilverWrites {
    pub commits: Vec<Commit>,
    pub doc_changes: Vec<DocumentationChange>,
    pub pull_request: Option<PullRequest>,
    pub issue: Option<Issue>,
    pub touches: Vec<EntityTouch>,
}

/// A complete transformation: the canonical fact plus its Silver writes
#[derive(Debug, Clone)]
pub struct Hydration {
    pub fact: NewEventFact,
    pub writes: SilverWrites,
}

// ============================================================================
// Trait
// ============================================================================

/// Refined entity storage
#[async_trait]
pub trait SilverStore: Send + Sync {
    // Repositories
    async fn upsert_repository(
        &self,
        owner: &str,
        name: &str,
        documentation_paths: Option<&[String]>,
        ingestion_enabled: bool,
    ) -> StoreResult<Repository>;
    async fn get_repository(&self, id: Uuid) -> StoreResult<Option<Repository>>;
    async fn get_repository_by_slug(&self, owner: &str, name: &str)
        -> StoreResult<Option<Repository>>;
    async fn list_repositories(&self) -> StoreResult<Vec<Repository>>;
    async fn set_ingestion_enabled(&self, id: Uuid, enabled: bool) -> StoreResult<()>;

    // Transformation
    /// Apply a hydration and flip the Bronze row to `transformed`, atomically.
    async fn apply_transformation(&self, raw_event_id: Uuid, hydration: &Hydration)
        -> StoreResult<()>;
    async fn get_fact_for_raw_event(&self, raw_event_id: Uuid) -> StoreResult<Option<EventFact>>;
    async fn list_facts_in_window(
        &self,
        repo_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<EventFact>>;
    async fn count_facts(&self) -> StoreResult<i64>;

    // Entity lookups by identifier set (not by time)
    async fn get_commits(&self, repo_id: Uuid, shas: &[String]) -> StoreResult<Vec<Commit>>;
    async fn get_pull_requests(&self, repo_id: Uuid, numbers: &[i64])
        -> StoreResult<Vec<PullRequest>>;
    async fn get_issues(&self, repo_id: Uuid, numbers: &[i64]) -> StoreResult<Vec<Issue>>;
    async fn get_doc_changes(
        &self,
        repo_id: Uuid,
        keys: &[(String, String)],
    ) -> StoreResult<Vec<DocumentationChange>>;

    // Ingestion checkpoints
    async fn load_checkpoint(&self, repo_id: Uuid) -> StoreResult<Option<IngestionCheckpoint>>;
    async fn save_checkpoint(
        &self,
        repo_id: Uuid,
        checkpoint: &IngestionCheckpoint,
    ) -> StoreResult<()>;
}

// ============================================================================
// Postgres implementation
// ============================================================================

#[derive(FromRow)]
struct RepositoryRow {
    id: Uuid,
    github_owner: String,
    github_name: String,
    documentation_paths: Option<JsonValue>,
    ingestion_enabled: bool,
}

impl RepositoryRow {
    fn into_repository(self) -> StoreResult<Repository> {
        let documentation_paths = self
            .documentation_paths
            .map(serde_json::from_value)
            .transpose()?;
        Ok(Repository {
            id: self.id,
            github_owner: self.github_owner,
            github_name: self.github_name,
            documentation_paths,
            ingestion_enabled: self.ingestion_enabled,
        })
    }
}

#[derive(FromRow)]
struct PullRequestRow {
    repo_id: Uuid,
    number: i64,
    title: String,
    state: ItemState,
    labels: JsonValue,
    author_login: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
    merged_at: Option<DateTime<Utc>>,
}

impl PullRequestRow {
    fn into_pull_request(self) -> StoreResult<PullRequest> {
        Ok(PullRequest {
            repo_id: self.repo_id,
            number: self.number,
            title: self.title,
            state: self.state,
            labels: serde_json::from_value(self.labels)?,
            author_login: self.author_login,
            created_at: self.created_at,
            updated_at: self.updated_at,
            closed_at: self.closed_at,
            merged_at: self.merged_at,
        })
    }
}

#[derive(FromRow)]
struct IssueRow {
    repo_id: Uuid,
    number: i64,
    title: String,
    state: ItemState,
    labels: JsonValue,
    author_login: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
}

impl IssueRow {
    fn into_issue(self) -> StoreResult<Issue> {
        Ok(Issue {
            repo_id: self.repo_id,
            number: self.number,
            title: self.title,
            state: self.state,
            labels: serde_json::from_value(self.labels)?,
            author_login: self.author_login,
            created_at: self.created_at,
            updated_at: self.updated_at,
            closed_at: self.closed_at,
        })
    }
}

const REPOSITORY_COLUMNS: &str =
    "id, github_owner, github_name, documentation_paths, ingestion_enabled";

/// Postgres-backed Silver store
pub struct PgSilverStore {
    pool: PgPool,
}

impl PgSilverStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SilverStore for PgSilverStore {
    async fn upsert_repository(
        &self,
        owner: &str,
        name: &str,
        documentation_paths: Option<&[String]>,
        ingestion_enabled: bool,
    ) -> StoreResult<Repository> {
        let paths_json = documentation_paths
            .map(serde_json::to_value)
            .transpose()?;

        let row = sqlx::query_as::<_, RepositoryRow>(&format!(
            r#"
            INSERT INTO "ghillie".silver_repositories
                (id, github_owner, github_name, documentation_paths, ingestion_enabled)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (github_owner, github_name)
            DO UPDATE SET
                documentation_paths = EXCLUDED.documentation_paths,
                ingestion_enabled = EXCLUDED.ingestion_enabled
            RETURNING {REPOSITORY_COLUMNS}
            "#
        ))
        .bind(Uuid::now_v7())
        .bind(owner)
        .bind(name)
        .bind(paths_json)
        .bind(ingestion_enabled)
        .fetch_one(&self.pool)
        .await?;

        row.into_repository()
    }

    async fn get_repository(&self, id: Uuid) -> StoreResult<Option<Repository>> {
        let row = sqlx::query_as::<_, RepositoryRow>(&format!(
            r#"
            SELECT {REPOSITORY_COLUMNS}
            FROM "ghillie".silver_repositories
            WHERE id = $1
            "#
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(RepositoryRow::into_repository).transpose()
    }

    async fn get_repository_by_slug(
        &self,
        owner: &str,
        name: &str,
    ) -> StoreResult<Option<Repository>> {
        let row = sqlx::query_as::<_, RepositoryRow>(&format!(
            r#"
            SELECT {REPOSITORY_COLUMNS}
            FROM "ghillie".silver_repositories
            WHERE github_owner = $1 AND github_name = $2
            "#
        ))
        .bind(owner)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.map(RepositoryRow::into_repository).transpose()
    }

    async fn list_repositories(&self) -> StoreResult<Vec<Repository>> {
        let rows = sqlx::query_as::<_, RepositoryRow>(&format!(
            r#"
            SELECT {REPOSITORY_COLUMNS}
            FROM "ghillie".silver_repositories
            ORDER BY github_owner, github_name
            "#
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(RepositoryRow::into_repository)
            .collect()
    }

    async fn set_ingestion_enabled(&self, id: Uuid, enabled: bool) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE "ghillie".silver_repositories
            SET ingestion_enabled = $2
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(enabled)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn apply_transformation(
        &self,
        raw_event_id: Uuid,
        hydration: &Hydration,
    ) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        let fact = &hydration.fact;
        sqlx::query(
            r#"
            INSERT INTO "ghillie".silver_event_facts
                (id, raw_event_id, repo_id, event_type, occurred_at, payload_digest, payload)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (raw_event_id) DO NOTHING
            "#,
        )
        .bind(fact.id)
        .bind(raw_event_id)
        .bind(fact.repo_id)
        .bind(&fact.event_type)
        .bind(fact.occurred_at)
        .bind(&fact.payload_digest)
        .bind(&fact.payload)
        .execute(&mut *tx)
        .await?;

        for commit in &hydration.writes.commits {
            sqlx::query(
                r#"
                INSERT INTO "ghillie".silver_commits
                    (repo_id, sha, message, author_login, author_is_bot, authored_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (repo_id, sha) DO NOTHING
                "#,
            )
            .bind(commit.repo_id)
            .bind(&commit.sha)
            .bind(&commit.message)
            .bind(&commit.author_login)
            .bind(commit.author_is_bot)
            .bind(commit.authored_at)
            .execute(&mut *tx)
            .await?;
        }

        for change in &hydration.writes.doc_changes {
            sqlx::query(
                r#"
                INSERT INTO "ghillie".silver_doc_changes (repo_id, commit_sha, path, changed_at)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (repo_id, commit_sha, path) DO NOTHING
                "#,
            )
            .bind(change.repo_id)
            .bind(&change.commit_sha)
            .bind(&change.path)
            .bind(change.changed_at)
            .execute(&mut *tx)
            .await?;
        }

        if let Some(pr) = &hydration.writes.pull_request {
            sqlx::query(
                r#"
                INSERT INTO "ghillie".silver_pull_requests
                    (repo_id, number, title, state, labels, author_login,
                     created_at, updated_at, closed_at, merged_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                ON CONFLICT (repo_id, number)
                DO UPDATE SET
                    title = EXCLUDED.title,
                    state = EXCLUDED.state,
                    labels = EXCLUDED.labels,
                    updated_at = EXCLUDED.updated_at,
                    closed_at = EXCLUDED.closed_at,
                    merged_at = EXCLUDED.merged_at
                "#,
            )
            .bind(pr.repo_id)
            .bind(pr.number)
            .bind(&pr.title)
            .bind(pr.state)
            .bind(serde_json::to_value(&pr.labels)?)
            .bind(&pr.author_login)
            .bind(pr.created_at)
            .bind(pr.updated_at)
            .bind(pr.closed_at)
            .bind(pr.merged_at)
            .execute(&mut *tx)
            .await?;
        }

        if let Some(issue) = &hydration.writes.issue {
            sqlx::query(
                r#"
                INSERT INTO "ghillie".silver_issues
                    (repo_id, number, title, state, labels, author_login,
                     created_at, updated_at, closed_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                ON CONFLICT (repo_id, number)
                DO UPDATE SET
                    title = EXCLUDED.title,
                    state = EXCLUDED.state,
                    labels = EXCLUDED.labels,
                    updated_at = EXCLUDED.updated_at,
                    closed_at = EXCLUDED.closed_at
                "#,
            )
            .bind(issue.repo_id)
            .bind(issue.number)
            .bind(&issue.title)
            .bind(issue.state)
            .bind(serde_json::to_value(&issue.labels)?)
            .bind(&issue.author_login)
            .bind(issue.created_at)
            .bind(issue.updated_at)
            .bind(issue.closed_at)
            .execute(&mut *tx)
            .await?;
        }

        for touch in &hydration.writes.touches {
            match touch {
                EntityTouch::PullRequest { number, at } => {
                    sqlx::query(
                        r#"
                        UPDATE "ghillie".silver_pull_requests
                        SET updated_at = GREATEST(updated_at, $3)
                        WHERE repo_id = $1 AND number = $2
                        "#,
                    )
                    .bind(fact.repo_id)
                    .bind(number)
                    .bind(at)
                    .execute(&mut *tx)
                    .await?;
                }
                EntityTouch::Issue { number, at } => {
                    sqlx::query(
                        r#"
                        UPDATE "ghillie".silver_issues
                        SET updated_at = GREATEST(updated_at, $3)
                        WHERE repo_id = $1 AND number = $2
                        "#,
                    )
                    .bind(fact.repo_id)
                    .bind(number)
                    .bind(at)
                    .execute(&mut *tx)
                    .await?;
                }
            }
        }

        sqlx::query(
            r#"
            UPDATE "ghillie".bronze_raw_events
            SET state = 'transformed', failure_reason = NULL
            WHERE id = $1
            "#,
        )
        .bind(raw_event_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_fact_for_raw_event(&self, raw_event_id: Uuid) -> StoreResult<Option<EventFact>> {
        let row = sqlx::query_as::<_, EventFact>(
            r#"
            SELECT id, raw_event_id, repo_id, event_type, occurred_at, payload_digest, payload
            FROM "ghillie".silver_event_facts
            WHERE raw_event_id = $1
            "#,
        )
        .bind(raw_event_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn list_facts_in_window(
        &self,
        repo_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<EventFact>> {
        let rows = sqlx::query_as::<_, EventFact>(
            r#"
            SELECT id, raw_event_id, repo_id, event_type, occurred_at, payload_digest, payload
            FROM "ghillie".silver_event_facts
            WHERE repo_id = $1 AND occurred_at >= $2 AND occurred_at < $3
            ORDER BY occurred_at, id
            "#,
        )
        .bind(repo_id)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn count_facts(&self) -> StoreResult<i64> {
        let count =
            sqlx::query_scalar::<_, i64>(r#"SELECT COUNT(*) FROM "ghillie".silver_event_facts"#)
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }

    async fn get_commits(&self, repo_id: Uuid, shas: &[String]) -> StoreResult<Vec<Commit>> {
        if shas.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, Commit>(
            r#"
            SELECT repo_id, sha, message, author_login, author_is_bot, authored_at
            FROM "ghillie".silver_commits
            WHERE repo_id = $1 AND sha = ANY($2)
            ORDER BY authored_at, sha
            "#,
        )
        .bind(repo_id)
        .bind(shas)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn get_pull_requests(
        &self,
        repo_id: Uuid,
        numbers: &[i64],
    ) -> StoreResult<Vec<PullRequest>> {
        if numbers.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, PullRequestRow>(
            r#"
            SELECT repo_id, number, title, state, labels, author_login,
                   created_at, updated_at, closed_at, merged_at
            FROM "ghillie".silver_pull_requests
            WHERE repo_id = $1 AND number = ANY($2)
            ORDER BY number
            "#,
        )
        .bind(repo_id)
        .bind(numbers)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(PullRequestRow::into_pull_request)
            .collect()
    }

    async fn get_issues(&self, repo_id: Uuid, numbers: &[i64]) -> StoreResult<Vec<Issue>> {
        if numbers.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, IssueRow>(
            r#"
            SELECT repo_id, number, title, state, labels, author_login,
                   created_at, updated_at, closed_at
            FROM "ghillie".silver_issues
            WHERE repo_id = $1 AND number = ANY($2)
            ORDER BY number
            "#,
        )
        .bind(repo_id)
        .bind(numbers)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(IssueRow::into_issue).collect()
    }

    async fn get_doc_changes(
        &self,
        repo_id: Uuid,
        keys: &[(String, String)],
    ) -> StoreResult<Vec<DocumentationChange>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let shas: Vec<String> = keys.iter().map(|(sha, _)| sha.clone()).collect();
        let rows = sqlx::query_as::<_, DocumentationChange>(
            r#"
            SELECT repo_id, commit_sha, path, changed_at
            FROM "ghillie".silver_doc_changes
            WHERE repo_id = $1 AND commit_sha = ANY($2)
            ORDER BY commit_sha, path
            "#,
        )
        .bind(repo_id)
        .bind(shas)
        .fetch_all(&self.pool)
        .await?;

        // Narrow to the exact (sha, path) pairs requested.
        let wanted: std::collections::HashSet<(&str, &str)> = keys
            .iter()
            .map(|(sha, path)| (sha.as_str(), path.as_str()))
            .collect();
        Ok(rows
            .into_iter()
            .filter(|row| wanted.contains(&(row.commit_sha.as_str(), row.path.as_str())))
            .collect())
    }

    async fn load_checkpoint(&self, repo_id: Uuid) -> StoreResult<Option<IngestionCheckpoint>> {
        let row = sqlx::query_as::<_, IngestionCheckpoint>(
            r#"
            SELECT last_success_at, last_event_at
            FROM "ghillie".silver_ingestion_checkpoints
            WHERE repo_id = $1
            "#,
        )
        .bind(repo_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn save_checkpoint(
        &self,
        repo_id: Uuid,
        checkpoint: &IngestionCheckpoint,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO "ghillie".silver_ingestion_checkpoints
                (repo_id, last_success_at, last_event_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (repo_id)
            DO UPDATE SET
                last_success_at = EXCLUDED.last_success_at,
                last_event_at = GREATEST(
                    "ghillie".silver_ingestion_checkpoints.last_event_at,
                    EXCLUDED.last_event_at
                )
            "#,
        )
        .bind(repo_id)
        .bind(checkpoint.last_success_at)
        .bind(checkpoint.last_event_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
