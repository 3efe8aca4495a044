//! Bronze-to-Silver transformation
//!
//! A registry maps each raw event type to a pure hydrator that turns the
//! stored payload into Silver writes plus the canonical EventFact. Unknown
//! event types fall through to a record-only hydrator so every transformed
//! raw event still yields exactly one fact. Each raw event commits on its
//! own; one bad payload never blocks the batch.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{json, Value as JsonValue};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::database::{
    BronzeStore, Commit, DocumentationChange, EntityTouch, Hydration, Issue, NewEventFact,
    PullRequest, RawEvent, RawEventState, SilverStore, SilverWrites, StoreResult,
};
use crate::model::ItemState;

use super::payload_digest;
use super::writer::parse_event_timestamp;

/// Failure reason recorded when the post-transform digest re-check disagrees.
pub const REASON_PAYLOAD_MISMATCH: &str = "payload_mismatch";
/// Failure reason recorded when a payload names no repository at all.
pub const REASON_UNKNOWN_REPOSITORY: &str = "unknown_repository";

/// Hydration failures
#[derive(Debug, thiserror::Error)]
pub enum HydrateError {
    #[error("payload is not valid JSON: {0}")]
    Payload(String),

    #[error("payload is missing required field {0}")]
    MissingField(&'static str),

    #[error("payload timestamp {0:?} is not parseable")]
    InvalidTimestamp(String),
}

/// Context resolved by the transformer before dispatching to a hydrator
#[derive(Debug, Clone)]
pub struct HydrationContext {
    pub repo_id: Uuid,
    pub documentation_paths: Vec<String>,
}

/// A pure hydrator: payload in, Silver writes + fact out
pub type Hydrator = fn(&HydrationContext, &RawEvent, &JsonValue) -> Result<Hydration, HydrateError>;

/// Routes raw event types to their hydrators.
///
/// Keys are closed at construction; [`TransformerRegistry::standard`] carries
/// the full GitHub set.
pub struct TransformerRegistry {
    handlers: HashMap<&'static str, Hydrator>,
    fallback: Hydrator,
}

impl TransformerRegistry {
    /// Registry covering push, pull request, issue, and comment events.
    pub fn standard() -> Self {
        let mut handlers: HashMap<&'static str, Hydrator> = HashMap::new();
        handlers.insert("push", hydrate_push);
        handlers.insert("pull_request", hydrate_pull_request);
        handlers.insert("issues", hydrate_issue);
        handlers.insert("issue_comment", hydrate_issue_comment);
        handlers.insert("commit_comment", hydrate_record_only);
        Self {
            handlers,
            fallback: hydrate_record_only,
        }
    }

    pub fn hydrate(
        &self,
        ctx: &HydrationContext,
        raw: &RawEvent,
        payload: &JsonValue,
    ) -> Result<Hydration, HydrateError> {
        let handler = self
            .handlers
            .get(raw.event_type.as_str())
            .copied()
            .unwrap_or(self.fallback);
        handler(ctx, raw, payload)
    }
}

impl Default for TransformerRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

/// Outcome of one `transform_pending` pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransformOutcome {
    pub transformed: usize,
    pub failed: usize,
    /// Rows left pending because their repository is not yet in Silver.
    pub skipped: usize,
}

/// Outcome of a digest verification pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerifyOutcome {
    pub checked: usize,
    pub mismatched: usize,
}

/// Drives pending Bronze rows through the registry into Silver
pub struct EventTransformer {
    bronze: Arc<dyn BronzeStore>,
    silver: Arc<dyn SilverStore>,
    registry: TransformerRegistry,
}

impl EventTransformer {
    pub fn new(
        bronze: Arc<dyn BronzeStore>,
        silver: Arc<dyn SilverStore>,
        registry: TransformerRegistry,
    ) -> Self {
        Self {
            bronze,
            silver,
            registry,
        }
    }

    /// Transform up to `batch_size` pending raw events.
    ///
    /// Re-running over a quiescent Bronze is a no-op: transformed rows leave
    /// the pending set and every Silver write is an idempotent upsert.
    pub async fn transform_pending(&self, batch_size: i64) -> StoreResult<TransformOutcome> {
        let pending = self.bronze.fetch_pending(batch_size).await?;
        let mut outcome = TransformOutcome::default();

        for raw in pending {
            let payload: JsonValue = match serde_json::from_str(&raw.payload) {
                Ok(value) => value,
                Err(e) => {
                    self.bronze
                        .mark_failed(raw.id, &format!("unparseable payload: {e}"))
                        .await?;
                    outcome.failed += 1;
                    continue;
                }
            };

            let Some((owner, name)) = repository_slug(&payload) else {
                self.bronze
                    .mark_failed(raw.id, REASON_UNKNOWN_REPOSITORY)
                    .await?;
                outcome.failed += 1;
                continue;
            };

            let Some(repository) = self.silver.get_repository_by_slug(&owner, &name).await? else {
                // Left pending: a later catalogue sync may register the slug.
                debug!(
                    repo_slug = %format!("{owner}/{name}"),
                    raw_event_id = %raw.id,
                    "skipping raw event for unregistered repository"
                );
                outcome.skipped += 1;
                continue;
            };

            let ctx = HydrationContext {
                repo_id: repository.id,
                documentation_paths: repository.documentation_paths.clone().unwrap_or_default(),
            };

            match self.registry.hydrate(&ctx, &raw, &payload) {
                Ok(hydration) => {
                    self.silver.apply_transformation(raw.id, &hydration).await?;
                    outcome.transformed += 1;
                }
                Err(e) => {
                    warn!(raw_event_id = %raw.id, error = %e, "hydration failed");
                    self.bronze
                        .mark_failed(raw.id, &format!("hydration failed: {e}"))
                        .await?;
                    outcome.failed += 1;
                }
            }
        }

        Ok(outcome)
    }

    /// Re-check stored fact digests against Bronze payloads.
    ///
    /// A mismatch flips the Bronze row to `failed` with reason
    /// `payload_mismatch`; the fact row is left alone so the fact count never
    /// changes.
    pub async fn verify_digests(&self, limit: i64) -> StoreResult<VerifyOutcome> {
        let transformed = self
            .bronze
            .fetch_by_state(RawEventState::Transformed, limit)
            .await?;
        let mut outcome = VerifyOutcome::default();

        for raw in transformed {
            let Some(fact) = self.silver.get_fact_for_raw_event(raw.id).await? else {
                continue;
            };
            outcome.checked += 1;

            if payload_digest(&raw.payload) != fact.payload_digest {
                warn!(
                    raw_event_id = %raw.id,
                    "payload digest mismatch; marking raw event failed"
                );
                self.bronze
                    .mark_failed(raw.id, REASON_PAYLOAD_MISMATCH)
                    .await?;
                outcome.mismatched += 1;
            }
        }

        Ok(outcome)
    }
}

// ============================================================================
// Hydrators
// ============================================================================

fn hydrate_push(
    ctx: &HydrationContext,
    raw: &RawEvent,
    payload: &JsonValue,
) -> Result<Hydration, HydrateError> {
    let commits_json = payload
        .get("commits")
        .and_then(JsonValue::as_array)
        .ok_or(HydrateError::MissingField("commits"))?;

    let mut commits = Vec::new();
    let mut doc_changes = Vec::new();
    let mut shas = Vec::new();

    for entry in commits_json {
        let sha = required_str(entry, "sha")?;
        let message = entry
            .get("message")
            .and_then(JsonValue::as_str)
            .unwrap_or_default();
        let authored_at = entry
            .get("timestamp")
            .and_then(JsonValue::as_str)
            .map(parse_payload_timestamp)
            .transpose()?
            .unwrap_or(raw.occurred_at);
        let author_login = entry
            .pointer("/author/login")
            .and_then(JsonValue::as_str)
            .map(str::to_string);
        let author_is_bot = entry
            .pointer("/author/bot")
            .and_then(JsonValue::as_bool)
            .unwrap_or(false);

        let changed_paths = changed_paths(entry);
        for path in &changed_paths {
            if is_documentation_path(path, &ctx.documentation_paths) {
                doc_changes.push(DocumentationChange {
                    repo_id: ctx.repo_id,
                    commit_sha: sha.to_string(),
                    path: path.clone(),
                    changed_at: authored_at,
                });
            }
        }

        shas.push(sha.to_string());
        commits.push(Commit {
            repo_id: ctx.repo_id,
            sha: sha.to_string(),
            message: message.to_string(),
            author_login,
            author_is_bot,
            authored_at,
        });
    }

    let normalized = json!({
        "commit_shas": shas,
        "doc_changes": doc_changes
            .iter()
            .map(|d| json!({"commit_sha": d.commit_sha, "path": d.path}))
            .collect::<Vec<_>>(),
    });

    Ok(Hydration {
        fact: new_fact(ctx, raw, normalized),
        writes: SilverWrites {
            commits,
            doc_changes,
            ..Default::default()
        },
    })
}

fn hydrate_pull_request(
    ctx: &HydrationContext,
    raw: &RawEvent,
    payload: &JsonValue,
) -> Result<Hydration, HydrateError> {
    let pr = payload
        .get("pull_request")
        .ok_or(HydrateError::MissingField("pull_request"))?;
    let number = required_i64(pr, "number")?;

    let merged_at = optional_timestamp(pr, "merged_at")?;
    let state_str = pr.get("state").and_then(JsonValue::as_str).unwrap_or("open");
    let state = if merged_at.is_some() {
        ItemState::Merged
    } else {
        ItemState::parse(state_str)
    };

    let pull_request = PullRequest {
        repo_id: ctx.repo_id,
        number,
        title: pr
            .get("title")
            .and_then(JsonValue::as_str)
            .unwrap_or_default()
            .to_string(),
        state,
        labels: labels(pr),
        author_login: pr
            .pointer("/user/login")
            .and_then(JsonValue::as_str)
            .map(str::to_string),
        created_at: optional_timestamp(pr, "created_at")?.unwrap_or(raw.occurred_at),
        updated_at: optional_timestamp(pr, "updated_at")?.unwrap_or(raw.occurred_at),
        closed_at: optional_timestamp(pr, "closed_at")?,
        merged_at,
    };

    let normalized = json!({
        "pull_request_number": number,
        "action": payload.get("action").and_then(JsonValue::as_str),
    });

    Ok(Hydration {
        fact: new_fact(ctx, raw, normalized),
        writes: SilverWrites {
            pull_request: Some(pull_request),
            ..Default::default()
        },
    })
}

fn hydrate_issue(
    ctx: &HydrationContext,
    raw: &RawEvent,
    payload: &JsonValue,
) -> Result<Hydration, HydrateError> {
    let issue = payload
        .get("issue")
        .ok_or(HydrateError::MissingField("issue"))?;
    let number = required_i64(issue, "number")?;

    let issue_row = Issue {
        repo_id: ctx.repo_id,
        number,
        title: issue
            .get("title")
            .and_then(JsonValue::as_str)
            .unwrap_or_default()
            .to_string(),
        state: ItemState::parse(
            issue
                .get("state")
                .and_then(JsonValue::as_str)
                .unwrap_or("open"),
        ),
        labels: labels(issue),
        author_login: issue
            .pointer("/user/login")
            .and_then(JsonValue::as_str)
            .map(str::to_string),
        created_at: optional_timestamp(issue, "created_at")?.unwrap_or(raw.occurred_at),
        updated_at: optional_timestamp(issue, "updated_at")?.unwrap_or(raw.occurred_at),
        closed_at: optional_timestamp(issue, "closed_at")?,
    };

    let normalized = json!({
        "issue_number": number,
        "action": payload.get("action").and_then(JsonValue::as_str),
    });

    Ok(Hydration {
        fact: new_fact(ctx, raw, normalized),
        writes: SilverWrites {
            issue: Some(issue_row),
            ..Default::default()
        },
    })
}

fn hydrate_issue_comment(
    ctx: &HydrationContext,
    raw: &RawEvent,
    payload: &JsonValue,
) -> Result<Hydration, HydrateError> {
    let number = required_i64(
        payload
            .get("issue")
            .ok_or(HydrateError::MissingField("issue"))?,
        "number",
    )?;

    let normalized = json!({ "issue_number": number });

    Ok(Hydration {
        fact: new_fact(ctx, raw, normalized),
        writes: SilverWrites {
            touches: vec![EntityTouch::Issue {
                number,
                at: raw.occurred_at,
            }],
            ..Default::default()
        },
    })
}

/// Record-only hydrator for event types with no entity projection.
fn hydrate_record_only(
    ctx: &HydrationContext,
    raw: &RawEvent,
    payload: &JsonValue,
) -> Result<Hydration, HydrateError> {
    let normalized = json!({
        "event_type": raw.event_type,
        "action": payload.get("action").and_then(JsonValue::as_str),
    });

    Ok(Hydration {
        fact: new_fact(ctx, raw, normalized),
        writes: SilverWrites::default(),
    })
}

// ============================================================================
// Payload helpers
// ============================================================================

fn new_fact(ctx: &HydrationContext, raw: &RawEvent, normalized: JsonValue) -> NewEventFact {
    NewEventFact {
        id: Uuid::now_v7(),
        repo_id: ctx.repo_id,
        event_type: raw.event_type.clone(),
        occurred_at: raw.occurred_at,
        payload_digest: payload_digest(&raw.payload),
        payload: normalized,
    }
}

/// Extract the `(owner, name)` slug a payload is about, if any.
pub fn repository_slug(payload: &JsonValue) -> Option<(String, String)> {
    let repo = payload.get("repository")?;
    let owner = repo.get("owner").and_then(JsonValue::as_str)?;
    let name = repo.get("name").and_then(JsonValue::as_str)?;
    Some((owner.to_string(), name.to_string()))
}

fn required_str<'a>(value: &'a JsonValue, field: &'static str) -> Result<&'a str, HydrateError> {
    value
        .get(field)
        .and_then(JsonValue::as_str)
        .ok_or(HydrateError::MissingField(field))
}

fn required_i64(value: &JsonValue, field: &'static str) -> Result<i64, HydrateError> {
    value
        .get(field)
        .and_then(JsonValue::as_i64)
        .ok_or(HydrateError::MissingField(field))
}

fn optional_timestamp(
    value: &JsonValue,
    field: &str,
) -> Result<Option<DateTime<Utc>>, HydrateError> {
    value
        .get(field)
        .and_then(JsonValue::as_str)
        .map(parse_payload_timestamp)
        .transpose()
}

fn parse_payload_timestamp(value: &str) -> Result<DateTime<Utc>, HydrateError> {
    parse_event_timestamp(value).map_err(|_| HydrateError::InvalidTimestamp(value.to_string()))
}

/// Labels arrive either as `["bug"]` or GitHub-style `[{"name": "bug"}]`.
fn labels(value: &JsonValue) -> Vec<String> {
    value
        .get("labels")
        .and_then(JsonValue::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| {
                    entry
                        .as_str()
                        .or_else(|| entry.get("name").and_then(JsonValue::as_str))
                        .map(str::to_string)
                })
                .collect()
        })
        .unwrap_or_default()
}

fn changed_paths(commit: &JsonValue) -> Vec<String> {
    let mut paths = Vec::new();
    for key in ["added", "modified"] {
        if let Some(entries) = commit.get(key).and_then(JsonValue::as_array) {
            paths.extend(
                entries
                    .iter()
                    .filter_map(JsonValue::as_str)
                    .map(str::to_string),
            );
        }
    }
    paths
}

/// A path counts as documentation when it equals a configured prefix or sits
/// beneath one.
fn is_documentation_path(path: &str, prefixes: &[String]) -> bool {
    prefixes.iter().any(|prefix| {
        let prefix = prefix.trim_end_matches('/');
        path == prefix || path.starts_with(&format!("{prefix}/"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn raw_event(event_type: &str, payload: JsonValue) -> RawEvent {
        RawEvent {
            id: Uuid::now_v7(),
            source: "github".to_string(),
            event_type: event_type.to_string(),
            external_id: "evt-1".to_string(),
            payload: payload.to_string(),
            received_at: Utc::now(),
            occurred_at: Utc.with_ymd_and_hms(2024, 7, 10, 12, 0, 0).unwrap(),
            state: RawEventState::Pending,
            failure_reason: None,
        }
    }

    fn ctx_with_docs(paths: &[&str]) -> HydrationContext {
        HydrationContext {
            repo_id: Uuid::now_v7(),
            documentation_paths: paths.iter().map(|p| p.to_string()).collect(),
        }
    }

    #[test]
    fn push_hydration_yields_commits_and_doc_changes() {
        let payload = json!({
            "repository": {"owner": "octo", "name": "reef"},
            "commits": [{
                "sha": "abc123",
                "message": "docs: refresh onboarding guide",
                "timestamp": "2024-07-10T11:58:00Z",
                "author": {"login": "mallory"},
                "added": ["docs/onboarding.md"],
                "modified": ["src/lib.rs"],
            }],
        });
        let raw = raw_event("push", payload.clone());
        let ctx = ctx_with_docs(&["docs/"]);

        let hydration = hydrate_push(&ctx, &raw, &payload).unwrap();
        assert_eq!(hydration.writes.commits.len(), 1);
        assert_eq!(hydration.writes.doc_changes.len(), 1);
        assert_eq!(hydration.writes.doc_changes[0].path, "docs/onboarding.md");
        assert_eq!(hydration.fact.payload["commit_shas"][0], "abc123");
    }

    #[test]
    fn push_without_commits_field_is_a_hydrate_error() {
        let payload = json!({"repository": {"owner": "octo", "name": "reef"}});
        let raw = raw_event("push", payload.clone());
        let err = hydrate_push(&ctx_with_docs(&[]), &raw, &payload).unwrap_err();
        assert!(matches!(err, HydrateError::MissingField("commits")));
    }

    #[test]
    fn pull_request_hydration_prefers_merged_state() {
        let payload = json!({
            "repository": {"owner": "octo", "name": "reef"},
            "action": "closed",
            "pull_request": {
                "number": 7,
                "title": "feat: add estuary pipeline",
                "state": "closed",
                "merged_at": "2024-07-10T12:00:00Z",
                "labels": [{"name": "enhancement"}],
                "user": {"login": "sam"},
            },
        });
        let raw = raw_event("pull_request", payload.clone());

        let hydration = hydrate_pull_request(&ctx_with_docs(&[]), &raw, &payload).unwrap();
        let pr = hydration.writes.pull_request.unwrap();
        assert_eq!(pr.number, 7);
        assert_eq!(pr.state, ItemState::Merged);
        assert_eq!(pr.labels, vec!["enhancement".to_string()]);
    }

    #[test]
    fn unknown_event_types_still_produce_a_fact() {
        let payload = json!({
            "repository": {"owner": "octo", "name": "reef"},
            "action": "starred",
        });
        let raw = raw_event("watch", payload.clone());
        let registry = TransformerRegistry::standard();

        let hydration = registry
            .hydrate(&ctx_with_docs(&[]), &raw, &payload)
            .unwrap();
        assert!(hydration.writes.commits.is_empty());
        assert!(hydration.writes.pull_request.is_none());
        assert_eq!(hydration.fact.event_type, "watch");
    }

    #[test]
    fn issue_comment_touches_the_issue() {
        let payload = json!({
            "repository": {"owner": "octo", "name": "reef"},
            "issue": {"number": 12},
            "comment": {"body": "still seeing this"},
        });
        let raw = raw_event("issue_comment", payload.clone());

        let hydration = hydrate_issue_comment(&ctx_with_docs(&[]), &raw, &payload).unwrap();
        assert!(matches!(
            hydration.writes.touches.as_slice(),
            [EntityTouch::Issue { number: 12, .. }]
        ));
    }

    #[test]
    fn documentation_prefix_matching_is_boundary_aware() {
        let prefixes = vec!["docs".to_string(), "README.md".to_string()];
        assert!(is_documentation_path("docs/guide.md", &prefixes));
        assert!(is_documentation_path("README.md", &prefixes));
        assert!(!is_documentation_path("docstrings/notes.md", &prefixes));
    }

    #[test]
    fn repository_slug_extraction() {
        let payload = json!({"repository": {"owner": "octo", "name": "reef"}});
        assert_eq!(
            repository_slug(&payload),
            Some(("octo".to_string(), "reef".to_string()))
        );
        assert_eq!(repository_slug(&json!({"action": "ping"})), None);
    }
}
