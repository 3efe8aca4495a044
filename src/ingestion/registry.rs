//! Repository registry: Silver repositories reconciled from the catalogue
//!
//! A repository removed from the catalogue keeps its Silver row and history;
//! only `ingestion_enabled` flips off.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::info;

use crate::catalogue::{CatalogueError, CatalogueStore};
use crate::database::{Repository, SilverStore, StoreError};

/// Registry failures
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("repository {slug} is not registered")]
    NotFound { slug: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Catalogue(#[from] CatalogueError),
}

/// Result of one reconciliation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    pub synced: usize,
    pub disabled: usize,
}

/// Keeps Silver repositories in step with the estate catalogue
pub struct RepositoryRegistry {
    silver: Arc<dyn SilverStore>,
    catalogue: Arc<dyn CatalogueStore>,
}

impl RepositoryRegistry {
    pub fn new(silver: Arc<dyn SilverStore>, catalogue: Arc<dyn CatalogueStore>) -> Self {
        Self { silver, catalogue }
    }

    /// Reconcile managed repositories into Silver.
    ///
    /// Creates missing rows, enables rows present in the catalogue, and
    /// disables rows the catalogue no longer lists.
    pub async fn sync_from_catalogue(&self) -> Result<SyncOutcome, RegistryError> {
        let managed = self.catalogue.list_managed_repositories().await?;
        let mut outcome = SyncOutcome::default();

        let mut managed_slugs = HashSet::new();
        for repo in &managed {
            managed_slugs.insert(repo.slug());
            self.silver
                .upsert_repository(
                    &repo.github_owner,
                    &repo.github_name,
                    repo.documentation_paths.as_deref(),
                    true,
                )
                .await?;
            outcome.synced += 1;
        }

        for existing in self.silver.list_repositories().await? {
            if existing.ingestion_enabled && !managed_slugs.contains(&existing.slug()) {
                self.silver
                    .set_ingestion_enabled(existing.id, false)
                    .await?;
                info!(
                    repo_slug = %existing.slug(),
                    "repository left the catalogue; ingestion disabled"
                );
                outcome.disabled += 1;
            }
        }

        Ok(outcome)
    }

    pub async fn enable(&self, slug: &str) -> Result<(), RegistryError> {
        self.set_enabled(slug, true).await
    }

    pub async fn disable(&self, slug: &str) -> Result<(), RegistryError> {
        self.set_enabled(slug, false).await
    }

    /// Repositories with ingestion currently enabled.
    pub async fn list_active(&self) -> Result<Vec<Repository>, RegistryError> {
        Ok(self
            .silver
            .list_repositories()
            .await?
            .into_iter()
            .filter(|r| r.ingestion_enabled)
            .collect())
    }

    async fn set_enabled(&self, slug: &str, enabled: bool) -> Result<(), RegistryError> {
        let (owner, name) = slug.split_once('/').ok_or_else(|| RegistryError::NotFound {
            slug: slug.to_string(),
        })?;
        let repository = self
            .silver
            .get_repository_by_slug(owner, name)
            .await?
            .ok_or_else(|| RegistryError::NotFound {
                slug: slug.to_string(),
            })?;
        self.silver
            .set_ingestion_enabled(repository.id, enabled)
            .await?;
        Ok(())
    }
}
