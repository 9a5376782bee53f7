//! Read access to project and endpoint definitions.
//!
//! The dispatch engine performs no storage I/O itself; it asks an
//! [`EndpointSource`] for the project list and for a project's full
//! definition. Each project carries a revision number so the engine can
//! tell when its compiled copy is stale.

use crate::model::ProjectDefinition;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Errors reported by an endpoint source.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SourceError {
    #[error("Project not found: {0}")]
    NotFound(String),
    #[error("Endpoint source unavailable: {0}")]
    Unavailable(String),
    #[error("Invalid project definition: {0}")]
    Invalid(String),
}

/// Routing information for one project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectSummary {
    pub id: String,
    pub base_path: String,
    pub revision: u64,
}

/// A project definition at a given revision.
#[derive(Debug, Clone)]
pub struct ProjectSnapshot {
    pub project: Arc<ProjectDefinition>,
    pub revision: u64,
}

#[async_trait]
pub trait EndpointSource: Send + Sync {
    /// All projects with their base paths and current revisions.
    async fn projects(&self) -> Result<Vec<ProjectSummary>, SourceError>;

    /// The full definition of a project, endpoints included.
    async fn load_project(&self, project_id: &str) -> Result<ProjectSnapshot, SourceError>;
}

/// Endpoint source backed by a map held in memory.
pub struct InMemoryEndpointSource {
    projects: RwLock<HashMap<String, ProjectSnapshot>>,
    next_revision: AtomicU64,
}

impl Default for InMemoryEndpointSource {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryEndpointSource {
    pub fn new() -> Self {
        Self {
            projects: RwLock::new(HashMap::new()),
            next_revision: AtomicU64::new(1),
        }
    }

    pub fn with_projects(projects: impl IntoIterator<Item = ProjectDefinition>) -> Self {
        let source = Self::new();
        for project in projects {
            source.upsert_project(project);
        }
        source
    }

    /// Insert or replace a project; returns its new revision.
    pub fn upsert_project(&self, mut project: ProjectDefinition) -> u64 {
        project.assign_project_ids();
        let revision = self.next_revision.fetch_add(1, Ordering::SeqCst);
        self.projects.write().insert(
            project.id.clone(),
            ProjectSnapshot {
                project: Arc::new(project),
                revision,
            },
        );
        revision
    }

    /// Remove a project; returns whether it existed.
    pub fn remove_project(&self, project_id: &str) -> bool {
        self.projects.write().remove(project_id).is_some()
    }

    pub fn get_project(&self, project_id: &str) -> Option<ProjectSnapshot> {
        self.projects.read().get(project_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.projects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.read().is_empty()
    }
}

#[async_trait]
impl EndpointSource for InMemoryEndpointSource {
    async fn projects(&self) -> Result<Vec<ProjectSummary>, SourceError> {
        let mut summaries: Vec<ProjectSummary> = self
            .projects
            .read()
            .values()
            .map(|snapshot| ProjectSummary {
                id: snapshot.project.id.clone(),
                base_path: snapshot.project.base_path.clone(),
                revision: snapshot.revision,
            })
            .collect();
        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(summaries)
    }

    async fn load_project(&self, project_id: &str) -> Result<ProjectSnapshot, SourceError> {
        self.get_project(project_id)
            .ok_or_else(|| SourceError::NotFound(project_id.to_string()))
    }
}
