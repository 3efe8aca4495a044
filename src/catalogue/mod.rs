//! Estate catalogue collaborator contract
//!
//! The catalogue (projects, components, dependency edges, managed
//! repositories) is owned by an external system; the core only reads it.
//! `CatalogueStore` is the consuming contract, and `StaticCatalogue` is the
//! in-process adapter used by tests and single-node deployments where the
//! estate definition is loaded once at boot.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::database::SilverStore;

/// Per-project ingestion noise suppression flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoiseFilters {
    /// Drop events authored by bot accounts before they reach Bronze.
    #[serde(default)]
    pub filter_bot_authors: bool,
}

/// Component lifecycle stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleStage {
    Planned,
    Active,
    Maintenance,
    Retired,
}

impl LifecycleStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planned => "planned",
            Self::Active => "active",
            Self::Maintenance => "maintenance",
            Self::Retired => "retired",
        }
    }
}

/// Relation kind carried by a dependency edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    DependsOn,
    BlockedBy,
    PartOf,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DependsOn => "depends_on",
            Self::BlockedBy => "blocked_by",
            Self::PartOf => "part_of",
        }
    }
}

/// Catalogue project record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogueProject {
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub noise_filters: NoiseFilters,
}

/// Catalogue component record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogueComponent {
    pub key: String,
    pub name: String,
    pub project_key: String,
    pub lifecycle: LifecycleStage,
    /// Catalogue repository id, resolvable to a Silver repository.
    pub repository_id: Option<Uuid>,
}

/// Dependency edge between two components
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentEdge {
    pub from_component: String,
    pub to_component: String,
    pub kind: EdgeKind,
}

/// A repository the estate manages for ingestion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedRepository {
    pub catalogue_repository_id: Uuid,
    pub github_owner: String,
    pub github_name: String,
    pub documentation_paths: Option<Vec<String>>,
    pub project_key: Option<String>,
}

impl ManagedRepository {
    pub fn slug(&self) -> String {
        format!("{}/{}", self.github_owner, self.github_name)
    }
}

/// Catalogue access failures
#[derive(Debug, thiserror::Error)]
pub enum CatalogueError {
    #[error("catalogue backend error: {0}")]
    Backend(String),

    #[error("silver lookup failed: {0}")]
    Silver(#[from] crate::database::StoreError),
}

pub type CatalogueResult<T> = Result<T, CatalogueError>;

/// Read-only catalogue contract consumed by the core
#[async_trait]
pub trait CatalogueStore: Send + Sync {
    async fn list_projects(&self) -> CatalogueResult<Vec<CatalogueProject>>;
    async fn get_project(&self, key: &str) -> CatalogueResult<Option<CatalogueProject>>;
    async fn list_components(&self, project_key: &str) -> CatalogueResult<Vec<CatalogueComponent>>;
    async fn list_component_edges(&self, project_key: &str) -> CatalogueResult<Vec<ComponentEdge>>;
    /// Resolve a catalogue repository id to its Silver repository id.
    async fn resolve_silver_repository(
        &self,
        catalogue_repository_id: Uuid,
    ) -> CatalogueResult<Option<Uuid>>;
    async fn list_managed_repositories(&self) -> CatalogueResult<Vec<ManagedRepository>>;
}

/// In-process catalogue adapter over a fixed estate definition
pub struct StaticCatalogue {
    projects: Vec<CatalogueProject>,
    components: Vec<CatalogueComponent>,
    edges: HashMap<String, Vec<ComponentEdge>>,
    managed: Vec<ManagedRepository>,
    silver: Arc<dyn SilverStore>,
}

impl StaticCatalogue {
    pub fn new(
        projects: Vec<CatalogueProject>,
        components: Vec<CatalogueComponent>,
        edges: HashMap<String, Vec<ComponentEdge>>,
        managed: Vec<ManagedRepository>,
        silver: Arc<dyn SilverStore>,
    ) -> Self {
        Self {
            projects,
            components,
            edges,
            managed,
            silver,
        }
    }

    /// An estate with no projects or managed repositories.
    pub fn empty(silver: Arc<dyn SilverStore>) -> Self {
        Self::new(
            Vec::new(),
            Vec::new(),
            HashMap::new(),
            Vec::new(),
            silver,
        )
    }
}

#[async_trait]
impl CatalogueStore for StaticCatalogue {
    async fn list_projects(&self) -> CatalogueResult<Vec<CatalogueProject>> {
        Ok(self.projects.clone())
    }

    async fn get_project(&self, key: &str) -> CatalogueResult<Option<CatalogueProject>> {
        Ok(self.projects.iter().find(|p| p.key == key).cloned())
    }

    async fn list_components(
        &self,
        project_key: &str,
    ) -> CatalogueResult<Vec<CatalogueComponent>> {
        Ok(self
            .components
            .iter()
            .filter(|c| c.project_key == project_key)
            .cloned()
            .collect())
    }

    async fn list_component_edges(&self, project_key: &str) -> CatalogueResult<Vec<ComponentEdge>> {
        Ok(self.edges.get(project_key).cloned().unwrap_or_default())
    }

    async fn resolve_silver_repository(
        &self,
        catalogue_repository_id: Uuid,
    ) -> CatalogueResult<Option<Uuid>> {
        let Some(managed) = self
            .managed
            .iter()
            .find(|m| m.catalogue_repository_id == catalogue_repository_id)
        else {
            return Ok(None);
        };

        let repository = self
            .silver
            .get_repository_by_slug(&managed.github_owner, &managed.github_name)
            .await?;
        Ok(repository.map(|r| r.id))
    }

    async fn list_managed_repositories(&self) -> CatalogueResult<Vec<ManagedRepository>> {
        Ok(self.managed.clone())
    }
}
