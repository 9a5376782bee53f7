//! Per-revision compiled form of a project.

use crate::model::{Endpoint, ProjectDefinition};
use crate::routing::{CompiledRoute, RouteMatch};
use crate::selection::{rotation_key, ResponsePlan, RotationKey};
use crate::validation::RuleSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// An endpoint with its route, rules and responses ready for dispatch.
#[derive(Debug, Clone)]
pub struct CompiledEndpoint {
    pub endpoint: Endpoint,
    pub route: CompiledRoute,
    pub rules: RuleSet,
    pub plan: ResponsePlan,
    pub rotation_key: RotationKey,
}

impl CompiledEndpoint {
    pub fn compile(project_id: &str, endpoint: &Endpoint) -> Self {
        let route = CompiledRoute::compile(
            &endpoint.route,
            endpoint.wildcard,
            endpoint.regex.as_deref(),
        );
        if let Some(error) = route.compile_error() {
            warn!(
                project = %project_id,
                endpoint = %endpoint.id,
                route = %endpoint.route,
                error = %error,
                "Endpoint route failed to compile and will never match"
            );
        }

        Self {
            endpoint: endpoint.clone(),
            route,
            rules: RuleSet::compile(&endpoint.validation_rules),
            plan: ResponsePlan::compile(
                &endpoint.id,
                endpoint.selection_mode,
                &endpoint.responses,
            ),
            rotation_key: rotation_key(project_id, &endpoint.id),
        }
    }

    pub fn id(&self) -> &str {
        &self.endpoint.id
    }

    /// Method filter then route match.
    pub fn try_match(&self, method: &str, path: &str) -> Option<RouteMatch> {
        if !self.endpoint.accepts_method(method) {
            return None;
        }
        let matched = self.route.matches(path);
        matched.is_match.then_some(matched)
    }
}

/// Active endpoints of one project revision, in evaluation order.
#[derive(Debug)]
pub struct CompiledProject {
    pub project: Arc<ProjectDefinition>,
    pub revision: u64,
    pub endpoints: Vec<CompiledEndpoint>,
}

impl CompiledProject {
    pub fn compile(project: Arc<ProjectDefinition>, revision: u64) -> Self {
        let mut active: Vec<&Endpoint> = project.endpoints.iter().filter(|e| e.active).collect();
        // Stable sort: declaration order breaks priority ties.
        active.sort_by_key(|e| e.priority);

        let endpoints: Vec<CompiledEndpoint> = active
            .into_iter()
            .map(|e| CompiledEndpoint::compile(&project.id, e))
            .collect();
        debug!(
            project = %project.id,
            revision = revision,
            endpoints = endpoints.len(),
            "Compiled project"
        );

        Self {
            project,
            revision,
            endpoints,
        }
    }

    pub fn id(&self) -> &str {
        &self.project.id
    }

    /// First endpoint, in priority order, that accepts the method and path.
    pub fn find_endpoint(&self, method: &str, path: &str) -> Option<(&CompiledEndpoint, RouteMatch)> {
        self.endpoints
            .iter()
            .find_map(|e| e.try_match(method, path).map(|m| (e, m)))
    }
}
