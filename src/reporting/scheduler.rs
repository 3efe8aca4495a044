//! Background scheduling of ingestion and reporting passes
//!
//! One pass: sync the registry, ingest active repositories, transform pending
//! raw events, then report per repository sequentially. The shutdown signal
//! is honoured between repositories and between passes; an in-flight
//! repository run always completes.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::ingestion::{EventTransformer, IngestionWorker, RepositoryRegistry};

use super::service::{ReportingError, ReportingService};

/// Scheduler configuration
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Delay between passes.
    pub interval: Duration,
    /// Raw events transformed per pass.
    pub transform_batch_size: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            transform_batch_size: 500,
        }
    }
}

/// Run scheduler passes until shutdown is signalled.
pub async fn run_scheduler(
    registry: Arc<RepositoryRegistry>,
    worker: Arc<IngestionWorker>,
    transformer: Arc<EventTransformer>,
    reporting: Arc<ReportingService>,
    config: SchedulerConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        run_pass(&registry, &worker, &transformer, &reporting, &config, &shutdown).await;

        tokio::select! {
            _ = tokio::time::sleep(config.interval) => {}
            _ = shutdown.changed() => {}
        }
        if *shutdown.borrow() {
            info!("scheduler draining; no further passes");
            return;
        }
    }
}

/// One complete ingest-transform-report pass.
pub async fn run_pass(
    registry: &RepositoryRegistry,
    worker: &IngestionWorker,
    transformer: &EventTransformer,
    reporting: &ReportingService,
    config: &SchedulerConfig,
    shutdown: &watch::Receiver<bool>,
) {
    if let Err(e) = registry.sync_from_catalogue().await {
        warn!(error = %e, "catalogue sync failed; continuing with known repositories");
    }

    let ingestion = worker.run_once().await;
    info!(
        repositories = ingestion.repositories,
        events_ingested = ingestion.events_ingested,
        failures = ingestion.failures,
        "ingestion pass finished"
    );

    match transformer.transform_pending(config.transform_batch_size).await {
        Ok(outcome) => info!(
            transformed = outcome.transformed,
            failed = outcome.failed,
            skipped = outcome.skipped,
            "transformation pass finished"
        ),
        Err(e) => warn!(error = %e, "transformation pass failed"),
    }

    let repositories = match registry.list_active().await {
        Ok(repositories) => repositories,
        Err(e) => {
            warn!(error = %e, "could not list repositories for reporting");
            return;
        }
    };

    for repository in repositories {
        if *shutdown.borrow() {
            return;
        }
        match reporting
            .run_for_repository(repository.id, Utc::now())
            .await
        {
            Ok(Some(report)) => {
                info!(repo_slug = %repository.slug(), report_id = %report.id, "report persisted")
            }
            Ok(None) => {}
            Err(ReportingError::ValidationExhausted { review_id, .. }) => {
                warn!(
                    repo_slug = %repository.slug(),
                    review_id = %review_id,
                    "report needs human review"
                );
            }
            Err(e) => {
                warn!(repo_slug = %repository.slug(), error = %e, "reporting run failed");
            }
        }
    }
}
