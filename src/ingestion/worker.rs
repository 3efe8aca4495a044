//! GitHub ingestion worker
//!
//! Polls the upstream client per active repository, applies per-project noise
//! filters, writes through the Bronze writer, and checkpoints successful
//! runs. The shutdown signal is checked between repositories; a run never
//! stops mid-repository.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::catalogue::CatalogueStore;
use crate::database::{IngestOutcome, IngestionCheckpoint, Repository, SilverStore};
use crate::observability::{
    self, ingestion_run_completed, ingestion_run_failed, ingestion_run_started,
};

use super::github::{ActivityClient, ActivityRecord};
use super::writer::{parse_event_timestamp, IngestError, RawEventWriter};

/// Source tag recorded on every Bronze row this worker writes.
const EVENT_SOURCE: &str = "github";

/// Worker configuration
#[derive(Debug, Clone)]
pub struct IngestionConfig {
    /// A repository with no successful run within this span reports stalled.
    pub stale_after: Duration,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            stale_after: Duration::hours(24),
        }
    }
}

/// Aggregate outcome of one pass over the active repositories
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestionRunSummary {
    pub repositories: usize,
    pub events_ingested: usize,
    pub failures: usize,
    /// Repositories skipped because shutdown was requested mid-pass.
    pub cancelled: usize,
}

/// Polls upstream activity into Bronze for every active repository
pub struct IngestionWorker {
    silver: Arc<dyn SilverStore>,
    catalogue: Arc<dyn CatalogueStore>,
    writer: RawEventWriter,
    client: Arc<dyn ActivityClient>,
    config: IngestionConfig,
    shutdown: watch::Receiver<bool>,
}

impl IngestionWorker {
    pub fn new(
        silver: Arc<dyn SilverStore>,
        catalogue: Arc<dyn CatalogueStore>,
        writer: RawEventWriter,
        client: Arc<dyn ActivityClient>,
        config: IngestionConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            silver,
            catalogue,
            writer,
            client,
            config,
            shutdown,
        }
    }

    fn shutdown_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Run one ingestion pass over all active repositories.
    pub async fn run_once(&self) -> IngestionRunSummary {
        let mut summary = IngestionRunSummary::default();

        let repositories = match self.silver.list_repositories().await {
            Ok(repositories) => repositories,
            Err(e) => {
                warn!(error = %e, "could not list repositories for ingestion");
                summary.failures += 1;
                return summary;
            }
        };
        let bot_filters = self.bot_filters().await;

        for repository in repositories.iter().filter(|r| r.ingestion_enabled) {
            if self.shutdown_requested() {
                summary.cancelled += 1;
                continue;
            }

            summary.repositories += 1;
            let filter_bots = bot_filters
                .get(&repository.slug())
                .copied()
                .unwrap_or(false);

            match self.run_repository(repository, filter_bots).await {
                Some(ingested) => summary.events_ingested += ingested,
                None => summary.failures += 1,
            }
        }

        summary
    }

    /// Ingest one repository. Returns `None` on failure; the failure has
    /// already been reported through a lifecycle event.
    async fn run_repository(
        &self,
        repository: &Repository,
        filter_bot_authors: bool,
    ) -> Option<usize> {
        let slug = repository.slug();
        ingestion_run_started(&slug);
        let started = Instant::now();

        let checkpoint = match self.silver.load_checkpoint(repository.id).await {
            Ok(checkpoint) => checkpoint,
            Err(e) => {
                ingestion_run_failed(
                    &slug,
                    observability::ErrorCategory::Transient,
                    &e.to_string(),
                );
                return None;
            }
        };
        let since = checkpoint.and_then(|c| c.last_event_at);

        let records = match self
            .client
            .fetch_activity(&repository.github_owner, &repository.github_name, since)
            .await
        {
            Ok(records) => records,
            Err(e) => {
                ingestion_run_failed(&slug, e.category(), &e.to_string());
                return None;
            }
        };

        let mut ordered: Vec<(DateTime<Utc>, ActivityRecord)> = Vec::new();
        for record in records {
            if filter_bot_authors && record.author_is_bot {
                debug!(
                    repo_slug = %slug,
                    external_id = %record.external_id,
                    "dropping bot-authored event"
                );
                continue;
            }
            match parse_event_timestamp(&record.occurred_at) {
                Ok(occurred) => ordered.push((occurred, record)),
                Err(e) => {
                    warn!(
                        repo_slug = %slug,
                        external_id = %record.external_id,
                        error = %e,
                        "dropping event with unusable timestamp"
                    );
                }
            }
        }
        // Serialized, totally ordered writes within one run.
        ordered.sort_by(|a, b| (a.0, &a.1.external_id).cmp(&(b.0, &b.1.external_id)));

        let mut ingested = 0usize;
        let mut last_event_at = since;
        for (occurred, record) in &ordered {
            match self
                .writer
                .ingest(
                    EVENT_SOURCE,
                    &record.event_type,
                    &record.external_id,
                    &record.occurred_at,
                    &record.payload,
                )
                .await
            {
                Ok(IngestOutcome::Inserted) => ingested += 1,
                Ok(IngestOutcome::Duplicate) => {}
                Err(IngestError::Store(e)) => {
                    ingestion_run_failed(
                        &slug,
                        observability::ErrorCategory::Transient,
                        &e.to_string(),
                    );
                    return None;
                }
                Err(e) => {
                    // Contract violation from the injected client; drop the
                    // event rather than the run.
                    warn!(
                        repo_slug = %slug,
                        external_id = %record.external_id,
                        error = %e,
                        "rejected event at the Bronze boundary"
                    );
                }
            }
            last_event_at = Some(last_event_at.map_or(*occurred, |prev| prev.max(*occurred)));
        }

        let checkpoint = IngestionCheckpoint {
            last_success_at: Utc::now(),
            last_event_at,
        };
        if let Err(e) = self.silver.save_checkpoint(repository.id, &checkpoint).await {
            ingestion_run_failed(
                &slug,
                observability::ErrorCategory::Transient,
                &e.to_string(),
            );
            return None;
        }

        let latency_ms = started.elapsed().as_millis() as u64;
        ingestion_run_completed(&slug, ingested, latency_ms);
        Some(ingested)
    }

    /// Slugs of active repositories with no successful ingestion inside the
    /// staleness threshold.
    pub async fn stalled_repositories(&self, now: DateTime<Utc>) -> Vec<String> {
        let Ok(repositories) = self.silver.list_repositories().await else {
            return Vec::new();
        };

        let mut stalled = Vec::new();
        for repository in repositories.iter().filter(|r| r.ingestion_enabled) {
            let fresh = match self.silver.load_checkpoint(repository.id).await {
                Ok(Some(checkpoint)) => {
                    now.signed_duration_since(checkpoint.last_success_at) <= self.config.stale_after
                }
                Ok(None) => false,
                Err(_) => false,
            };
            if !fresh {
                stalled.push(repository.slug());
            }
        }
        stalled
    }

    /// Resolve each managed repository's bot filter from its owning project.
    async fn bot_filters(&self) -> HashMap<String, bool> {
        let mut filters = HashMap::new();

        let (managed, projects) = match (
            self.catalogue.list_managed_repositories().await,
            self.catalogue.list_projects().await,
        ) {
            (Ok(managed), Ok(projects)) => (managed, projects),
            _ => {
                warn!("catalogue unavailable; ingesting without noise filters");
                return filters;
            }
        };

        let by_key: HashMap<&str, bool> = projects
            .iter()
            .map(|p| (p.key.as_str(), p.noise_filters.filter_bot_authors))
            .collect();

        for repo in managed {
            let filter = repo
                .project_key
                .as_deref()
                .and_then(|key| by_key.get(key).copied())
                .unwrap_or(false);
            filters.insert(repo.slug(), filter);
        }
        filters
    }
}
