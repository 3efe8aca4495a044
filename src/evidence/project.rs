//! Project evidence bundle service
//!
//! Components reach Silver through their catalogue repository id and from
//! there to the latest repository-scoped Gold report. Both hops resolve in
//! indexed batch passes rather than per-component queries.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use uuid::Uuid;

use crate::catalogue::{CatalogueError, CatalogueStore};
use crate::database::{GoldStore, SilverStore, StoreError};

use super::{
    ComponentDependencyEvidence, ComponentEvidence, ComponentRepositorySummary,
    PreviousReportContext, ProjectEvidenceBundle, ProjectInfo,
};

/// Project evidence assembly failures
#[derive(Debug, thiserror::Error)]
pub enum ProjectEvidenceError {
    #[error("project {0} is not in the catalogue")]
    ProjectNotFound(String),

    #[error(transparent)]
    Catalogue(#[from] CatalogueError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Builds immutable project evidence bundles
pub struct ProjectEvidenceService {
    catalogue: Arc<dyn CatalogueStore>,
    silver: Arc<dyn SilverStore>,
    gold: Arc<dyn GoldStore>,
}

impl ProjectEvidenceService {
    pub fn new(
        catalogue: Arc<dyn CatalogueStore>,
        silver: Arc<dyn SilverStore>,
        gold: Arc<dyn GoldStore>,
    ) -> Self {
        Self {
            catalogue,
            silver,
            gold,
        }
    }

    /// Build the evidence bundle for one catalogue project.
    pub async fn build(
        &self,
        project_key: &str,
    ) -> Result<ProjectEvidenceBundle, ProjectEvidenceError> {
        let project = self
            .catalogue
            .get_project(project_key)
            .await?
            .ok_or_else(|| ProjectEvidenceError::ProjectNotFound(project_key.to_string()))?;

        let mut components = self.catalogue.list_components(project_key).await?;
        components.sort_by(|a, b| a.key.cmp(&b.key));

        // First pass: catalogue repository id -> silver repository id.
        let mut silver_ids: HashMap<Uuid, Uuid> = HashMap::new();
        for component in &components {
            if let Some(catalogue_repo_id) = component.repository_id {
                if let Some(silver_id) = self
                    .catalogue
                    .resolve_silver_repository(catalogue_repo_id)
                    .await?
                {
                    silver_ids.insert(catalogue_repo_id, silver_id);
                }
            }
        }

        // Second pass: latest repository-scoped reports, resolved in batch.
        let resolved: Vec<Uuid> = silver_ids.values().copied().collect();
        let latest_reports = self.gold.latest_reports_for_repositories(&resolved).await?;

        let mut component_evidence = Vec::with_capacity(components.len());
        for component in &components {
            let repository = match component.repository_id.and_then(|id| silver_ids.get(&id)) {
                Some(&silver_id) => {
                    let slug = self
                        .silver
                        .get_repository(silver_id)
                        .await?
                        .map(|r| r.slug())
                        .unwrap_or_default();
                    let latest_report =
                        latest_reports.get(&silver_id).map(|report| PreviousReportContext {
                            generated_at: report.generated_at,
                            summary: report.machine_summary.clone(),
                        });
                    Some(ComponentRepositorySummary {
                        repository_id: silver_id,
                        slug,
                        latest_report,
                    })
                }
                None => None,
            };

            component_evidence.push(ComponentEvidence {
                key: component.key.clone(),
                name: component.name.clone(),
                lifecycle: component.lifecycle,
                repository,
            });
        }

        // Edges with any endpoint outside the project are dropped.
        let member_keys: HashSet<&str> =
            components.iter().map(|c| c.key.as_str()).collect();
        let mut dependencies: Vec<ComponentDependencyEvidence> = self
            .catalogue
            .list_component_edges(project_key)
            .await?
            .into_iter()
            .filter(|edge| {
                member_keys.contains(edge.from_component.as_str())
                    && member_keys.contains(edge.to_component.as_str())
            })
            .map(|edge| ComponentDependencyEvidence {
                from_component: edge.from_component,
                to_component: edge.to_component,
                kind: edge.kind,
            })
            .collect();
        dependencies.sort_by(|a, b| {
            (&a.from_component, &a.to_component).cmp(&(&b.from_component, &b.to_component))
        });

        Ok(ProjectEvidenceBundle {
            project: ProjectInfo {
                key: project.key,
                name: project.name,
            },
            components: component_evidence,
            dependencies,
        })
    }
}
