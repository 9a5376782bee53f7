//! Configuration types for the Decoy server.

mod listen;
mod runtime;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::model::{ProjectDefinition, ANY_METHOD};

pub use listen::{ListenConfig, MetricsConfig};
pub use runtime::{LogFormat, LoggingConfig, RequestLogConfig, WebhookConfig};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub listen: ListenConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub webhooks: WebhookConfig,
    #[serde(default)]
    pub request_log: RequestLogConfig,

    /// YAML file with additional project definitions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projects_file: Option<PathBuf>,

    /// Inline project definitions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub projects: Vec<ProjectDefinition>,
}

/// Layout of a standalone projects file: either a bare list or `projects: [...]`.
#[derive(Deserialize)]
#[serde(untagged)]
enum ProjectsFile {
    List(Vec<ProjectDefinition>),
    Wrapped { projects: Vec<ProjectDefinition> },
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate server settings (projects are checked by [`validate_projects`]).
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.listen.port == 0 {
            anyhow::bail!("listen.port must be a non-zero port");
        }
        self.listen.socket_addr()?;

        if self.metrics.enabled {
            if self.metrics.port == 0 {
                anyhow::bail!("metrics.port must be a non-zero port");
            }
            if self.metrics.port == self.listen.port {
                anyhow::bail!(
                    "metrics.port ({}) must differ from listen.port",
                    self.metrics.port
                );
            }
        }

        if self.webhooks.queue_capacity == 0 {
            anyhow::bail!("webhooks.queue_capacity must be greater than zero");
        }
        if self.webhooks.timeout_ms == 0 {
            anyhow::bail!("webhooks.timeout_ms must be greater than zero");
        }

        Ok(())
    }

    /// Inline projects followed by those from `projects_file`, validated together.
    pub fn load_projects(&self) -> Result<Vec<ProjectDefinition>, anyhow::Error> {
        let mut projects = self.projects.clone();
        if let Some(path) = &self.projects_file {
            projects.extend(load_projects_file(path)?);
        }
        validate_projects(&projects)?;
        Ok(projects)
    }
}

/// Read a YAML (or JSON) file of project definitions.
pub fn load_projects_file<P: AsRef<Path>>(path: P) -> Result<Vec<ProjectDefinition>, anyhow::Error> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read projects file {}", path.display()))?;
    let parsed: ProjectsFile = serde_yaml::from_str(&contents)
        .with_context(|| format!("Failed to parse projects file {}", path.display()))?;
    Ok(match parsed {
        ProjectsFile::List(projects) | ProjectsFile::Wrapped { projects } => projects,
    })
}

/// Check project definitions for conflicts the engine cannot resolve.
pub fn validate_projects(projects: &[ProjectDefinition]) -> Result<(), anyhow::Error> {
    let mut ids = HashSet::new();
    let mut base_paths = HashSet::new();

    for project in projects {
        if project.id.trim().is_empty() {
            anyhow::bail!("Project id must not be empty");
        }
        if !ids.insert(project.id.as_str()) {
            anyhow::bail!("Duplicate project id '{}'", project.id);
        }
        let base = project.normalized_base_path().to_ascii_lowercase();
        if !base_paths.insert(base) {
            anyhow::bail!(
                "Project '{}' reuses base path '{}' of another project",
                project.id,
                project.base_path
            );
        }

        let mut endpoint_ids = HashSet::new();
        for endpoint in &project.endpoints {
            if !endpoint_ids.insert(endpoint.id.as_str()) {
                anyhow::bail!(
                    "Duplicate endpoint id '{}' in project '{}'",
                    endpoint.id,
                    project.id
                );
            }
            if !is_valid_method(&endpoint.method) {
                anyhow::bail!(
                    "Endpoint '{}' in project '{}' has invalid method '{}'",
                    endpoint.id,
                    project.id,
                    endpoint.method
                );
            }
            if endpoint.default_response_count() > 1 {
                anyhow::bail!(
                    "Endpoint '{}' in project '{}' has more than one default response",
                    endpoint.id,
                    project.id
                );
            }
            for webhook in &endpoint.webhooks {
                if webhook.method.trim().is_empty()
                    || hyper::Method::from_bytes(webhook.method.trim().as_bytes()).is_err()
                {
                    anyhow::bail!(
                        "Webhook '{}' on endpoint '{}' has invalid method '{}'",
                        webhook.name,
                        endpoint.id,
                        webhook.method
                    );
                }
            }
        }
    }

    Ok(())
}

fn is_valid_method(method: &str) -> bool {
    let method = method.trim();
    !method.is_empty()
        && (method == "*"
            || method.eq_ignore_ascii_case(ANY_METHOD)
            || hyper::Method::from_bytes(method.as_bytes()).is_ok())
}
