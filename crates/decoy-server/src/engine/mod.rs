//! The dispatch pipeline.
//!
//! For every inbound request the [`DispatchEngine`]:
//!
//! 1. resolves the owning project by longest base path
//! 2. finds the first active endpoint (by priority) whose method filter and
//!    route accept the request
//! 3. runs the endpoint's validation rules; a failure short-circuits with the
//!    rule's status code and the rendered error body
//! 4. selects a response and renders its body and headers
//! 5. applies the simulated delay
//! 6. hands enabled webhooks to the [`WebhookDispatcher`] and publishes one
//!    [`RequestLogEntry`]
//!
//! Projects are compiled once per revision reported by the
//! [`EndpointSource`]. Replacing a compiled revision resets the project's
//! rotation cursors.

mod compiled;
mod types;

pub use compiled::{CompiledEndpoint, CompiledProject};
pub use types::{DispatchError, DispatchResult, InboundRequest};

use crate::delay;
use crate::metrics;
use crate::model::strip_base_path;
use crate::notify::{RequestLogEntry, RequestLogSink};
use crate::request::RequestContext;
use crate::selection::RotationStore;
use crate::source::{EndpointSource, ProjectSummary};
use crate::template::{RenderContext, TemplateRenderer};
use crate::validation::ValidationFailure;
use crate::webhook::WebhookDispatcher;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Header naming the matched endpoint on every mock response.
pub const ENDPOINT_HEADER: &str = "x-decoy-endpoint";

/// Composes matching, validation, selection, rendering, delay and webhooks.
pub struct DispatchEngine {
    source: Arc<dyn EndpointSource>,
    renderer: Arc<TemplateRenderer>,
    log_sink: Arc<dyn RequestLogSink>,
    webhooks: Option<Arc<WebhookDispatcher>>,
    rotation: RotationStore,
    compiled: RwLock<HashMap<String, Arc<CompiledProject>>>,
}

impl DispatchEngine {
    pub fn new(
        source: Arc<dyn EndpointSource>,
        renderer: Arc<TemplateRenderer>,
        log_sink: Arc<dyn RequestLogSink>,
    ) -> Self {
        Self {
            source,
            renderer,
            log_sink,
            webhooks: None,
            rotation: RotationStore::new(),
            compiled: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_webhooks(mut self, dispatcher: Arc<WebhookDispatcher>) -> Self {
        self.webhooks = Some(dispatcher);
        self
    }

    pub fn rotation(&self) -> &RotationStore {
        &self.rotation
    }

    pub fn webhooks(&self) -> Option<&Arc<WebhookDispatcher>> {
        self.webhooks.as_ref()
    }

    /// Drop a project's compiled form and its rotation cursors.
    pub fn invalidate(&self, project_id: &str) {
        self.compiled.write().remove(project_id);
        self.rotation.reset_project(project_id);
    }

    /// The compiled project for `summary`, compiling it if the cached
    /// revision is missing or stale.
    pub async fn compiled_project(
        &self,
        summary: &ProjectSummary,
    ) -> Result<Arc<CompiledProject>, DispatchError> {
        let cached = self.compiled.read().get(&summary.id).cloned();
        if let Some(cached) = cached.filter(|c| c.revision == summary.revision) {
            return Ok(cached);
        }

        let snapshot = self.source.load_project(&summary.id).await?;
        let fresh = Arc::new(CompiledProject::compile(snapshot.project, snapshot.revision));

        let mut compiled = self.compiled.write();
        let previous = compiled.get(&summary.id).map(|p| p.revision);
        match previous {
            // Another request already installed this revision or a newer one.
            Some(revision) if revision >= fresh.revision => {
                Ok(Arc::clone(&compiled[&summary.id]))
            }
            _ => {
                if previous.is_some() {
                    info!(
                        project = %summary.id,
                        revision = fresh.revision,
                        "Project definitions changed, recompiled and reset rotation"
                    );
                    self.rotation.reset_project(&summary.id);
                }
                compiled.insert(summary.id.clone(), Arc::clone(&fresh));
                Ok(fresh)
            }
        }
    }

    /// Find the project whose base path is the longest prefix of `path`.
    pub async fn resolve_project(
        &self,
        path: &str,
    ) -> Result<Option<ProjectSummary>, DispatchError> {
        let projects = self.source.projects().await?;
        let best = projects
            .into_iter()
            .filter(|p| strip_base_path(&p.base_path, path).is_some())
            .max_by_key(|p| p.base_path.trim_matches('/').len());
        Ok(best)
    }

    /// Dispatch a request arriving at the server.
    pub async fn dispatch(&self, request: InboundRequest) -> DispatchResult {
        let start = Instant::now();

        let summary = match self.resolve_project(&request.path).await {
            Ok(Some(summary)) => summary,
            Ok(None) => {
                let error = DispatchError::ProjectNotFound(request.path.clone());
                return self.finish_error(None, &request, error, start);
            }
            Err(error) => return self.finish_error(None, &request, error, start),
        };

        let project = match self.compiled_project(&summary).await {
            Ok(project) => project,
            Err(error) => return self.finish_error(Some(summary.id), &request, error, start),
        };

        let relative = project
            .project
            .strip_base_path(&request.path)
            .unwrap_or("/")
            .to_string();
        let mut ctx = RequestContext::new(
            &request.method,
            &relative,
            request.query.as_deref(),
            &request.headers,
            request.body.as_deref(),
        );
        if let Some(addr) = request.client_addr {
            ctx = ctx.with_client_addr(addr);
        }

        self.dispatch_in_project(&project, ctx, start).await
    }

    /// Dispatch a request whose path is already relative to the project.
    pub async fn dispatch_in_project(
        &self,
        project: &CompiledProject,
        ctx: RequestContext,
        start: Instant,
    ) -> DispatchResult {
        let Some((endpoint, route_match)) = project.find_endpoint(&ctx.method, &ctx.path) else {
            debug!(
                project = %project.id(),
                method = %ctx.method,
                path = %ctx.path,
                "No endpoint matched"
            );
            let error = DispatchError::NoRouteMatch {
                method: ctx.method.clone(),
                path: ctx.path.clone(),
            };
            let mut result = DispatchResult::from_error(Some(project.id().to_string()), error);
            result.elapsed = start.elapsed();
            self.publish(&result, &ctx);
            return result;
        };

        let ctx = Arc::new(ctx.with_params(route_match.params.clone()));
        let mut result = DispatchResult {
            project_id: Some(project.id().to_string()),
            endpoint_id: Some(endpoint.id().to_string()),
            params: route_match.params,
            response_id: None,
            status: 200,
            content_type: "application/json".to_string(),
            headers: Vec::new(),
            body: String::new(),
            delay: Duration::ZERO,
            elapsed: Duration::ZERO,
            error: None,
            webhooks: Vec::new(),
        };

        if let Err(failure) = endpoint.rules.validate(&ctx) {
            debug!(
                project = %project.id(),
                endpoint = %endpoint.id(),
                field = %failure.field,
                reason = failure.reason.code(),
                "Validation failed"
            );
            metrics::record_validation_failure(project.id(), endpoint.id(), failure.reason.code());
            self.render_validation_failure(endpoint, &ctx, failure, &mut result);
            result.elapsed = start.elapsed();
            self.publish(&result, &ctx);
            return result;
        }

        let Some(response) = endpoint.plan.select(&endpoint.rotation_key, &ctx, &self.rotation)
        else {
            let error = DispatchError::NoResponseConfigured(endpoint.id().to_string());
            result.status = error.status_code();
            result.body = error.to_json_body();
            result.error = Some(error);
            result.elapsed = start.elapsed();
            self.publish(&result, &ctx);
            return result;
        };

        let render_ctx = RenderContext::for_request(&ctx);
        result.response_id = Some(response.id.clone()).filter(|id| !id.is_empty());
        result.status = response.status_code;
        result.content_type = response.content_type.clone();
        result.body = self.renderer.render(&response.body, &render_ctx);
        let mut headers: Vec<(String, String)> = self
            .renderer
            .render_map(&response.headers, &render_ctx)
            .into_iter()
            .collect();
        headers.sort();
        result.headers = headers;

        result.delay = delay::compute_delay(&endpoint.endpoint, &project.project);
        delay::apply_delay(result.delay).await;

        if let Some(dispatcher) = &self.webhooks {
            let enabled: Vec<_> = endpoint
                .endpoint
                .webhooks
                .iter()
                .filter(|w| w.enabled)
                .cloned()
                .collect();
            if !enabled.is_empty() {
                dispatcher.enqueue(project.id(), endpoint.id(), &enabled, &ctx);
                result.webhooks = enabled;
            }
        }

        result.elapsed = start.elapsed();
        self.publish(&result, &ctx);
        result
    }

    fn render_validation_failure(
        &self,
        endpoint: &CompiledEndpoint,
        ctx: &RequestContext,
        failure: ValidationFailure,
        result: &mut DispatchResult,
    ) {
        let base = RenderContext::for_request(ctx)
            .with_extra("validation.field", failure.field.clone())
            .with_extra("validation.location", failure.location.as_str())
            .with_extra("validation.value", failure.value.clone().unwrap_or_default())
            .with_extra("validation.reason", failure.reason.code());
        let message = self.renderer.render(&failure.message, &base);
        let render_ctx = base.with_extra("validation.message", message.clone());

        let failure = ValidationFailure { message, ..failure };
        result.status = failure.status_code;
        result.body = match &endpoint.endpoint.validation_error_body {
            Some(template) if !template.trim().is_empty() => {
                self.renderer.render(template, &render_ctx)
            }
            _ => DispatchError::Validation(failure.clone()).to_json_body(),
        };
        result.error = Some(DispatchError::Validation(failure));
    }

    fn finish_error(
        &self,
        project_id: Option<String>,
        request: &InboundRequest,
        error: DispatchError,
        start: Instant,
    ) -> DispatchResult {
        let mut result = DispatchResult::from_error(project_id, error);
        result.elapsed = start.elapsed();
        let ctx = RequestContext::new(
            &request.method,
            &request.path,
            request.query.as_deref(),
            &request.headers,
            None,
        );
        let ctx = match request.client_addr {
            Some(addr) => ctx.with_client_addr(addr),
            None => ctx,
        };
        self.publish(&result, &ctx);
        result
    }

    /// Emit the log entry and metrics for a finished dispatch.
    fn publish(&self, result: &DispatchResult, ctx: &RequestContext) {
        let project_id = result.project_id.clone().unwrap_or_default();
        metrics::record_request(&project_id, result.status, result.matched(), result.elapsed);
        self.log_sink.publish(RequestLogEntry {
            project_id,
            endpoint_id: result.endpoint_id.clone(),
            method: ctx.method.clone(),
            path: ctx.path.clone(),
            query_string: ctx.query_string.clone(),
            status_code: result.status,
            duration_ms: result.elapsed.as_millis() as u64,
            matched: result.matched(),
            error: result.error.as_ref().map(|e| e.to_string()),
            client_addr: ctx.client_addr,
            timestamp: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ProjectDefinition;
    use crate::notify::BroadcastLogSink;
    use crate::source::InMemoryEndpointSource;
    use crate::template::{FixedClock, SeededFaker};
    use chrono::TimeZone;

    const SHOP: &str = r#"
id: shop
basePath: /shop
endpoints:
  - id: ping
    route: /api/ping
    responses:
      - id: pong
        body: '{"at": "{{now}}"}'
        default: true
  - id: user
    route: "/api/users/{id:int}"
    responses:
      - id: user-ok
        body: '{"id": {{request.params.id}}}'
        headers:
          X-User: "{{request.params.id}}"
  - id: secure
    route: /api/secure
    validationRules:
      - name: token
        location: query
        required: true
        statusCode: 401
        errorMessage: "{{validation.field}} is required"
    validationErrorBody: '{"denied": "{{validation.message}}"}'
    responses:
      - body: ok
  - id: empty
    route: /api/empty
    responses: []
  - id: rotate
    route: /api/rotate
    responses:
      - {id: a, body: a, order: 1}
      - {id: b, body: b, order: 2}
      - {id: c, body: c, order: 3}
"#;

    struct Harness {
        engine: DispatchEngine,
        source: Arc<InMemoryEndpointSource>,
        log: Arc<BroadcastLogSink>,
    }

    fn harness() -> Harness {
        let project: ProjectDefinition = serde_yaml::from_str(SHOP).unwrap();
        let source = Arc::new(InMemoryEndpointSource::with_projects(vec![project]));
        let log = Arc::new(BroadcastLogSink::new(100, 16));
        let at = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let renderer = Arc::new(TemplateRenderer::new(
            Arc::new(SeededFaker::new(3)),
            Arc::new(FixedClock(at)),
        ));
        let engine = DispatchEngine::new(source.clone(), renderer, log.clone());
        Harness {
            engine,
            source,
            log,
        }
    }

    #[tokio::test]
    async fn test_ping_renders_now_and_logs_once() {
        let h = harness();
        let result = h.engine.dispatch(InboundRequest::new("GET", "/shop/api/ping")).await;
        assert_eq!(result.status, 200);
        assert_eq!(result.body, r#"{"at": "2024-01-02T03:04:05.000Z"}"#);
        assert_eq!(result.endpoint_id.as_deref(), Some("ping"));

        let entries = h.log.recent();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].matched);
        assert_eq!(entries[0].project_id, "shop");
        assert_eq!(entries[0].path, "/api/ping");
    }

    #[tokio::test]
    async fn test_path_params_flow_into_body_and_headers() {
        let h = harness();
        let result = h.engine.dispatch(InboundRequest::new("GET", "/shop/api/users/42")).await;
        assert_eq!(result.status, 200);
        assert_eq!(result.body, r#"{"id": 42}"#);
        assert_eq!(result.headers, vec![("X-User".to_string(), "42".to_string())]);
        assert_eq!(result.response_id.as_deref(), Some("user-ok"));
    }

    #[tokio::test]
    async fn test_no_route_is_404_and_logged_unmatched() {
        let h = harness();
        let result = h.engine.dispatch(InboundRequest::new("GET", "/shop/api/users/abc")).await;
        assert_eq!(result.status, 404);
        assert!(matches!(result.error, Some(DispatchError::NoRouteMatch { .. })));
        let entries = h.log.recent();
        assert_eq!(entries.len(), 1);
        assert!(!entries[0].matched);
        assert!(entries[0].error.is_some());
    }

    #[tokio::test]
    async fn test_unknown_project() {
        let h = harness();
        let result = h.engine.dispatch(InboundRequest::new("GET", "/other/api/ping")).await;
        assert_eq!(result.status, 404);
        assert!(matches!(result.error, Some(DispatchError::ProjectNotFound(_))));
        assert_eq!(h.log.recent().len(), 1);
    }

    #[tokio::test]
    async fn test_validation_failure_uses_rule_status_and_template() {
        let h = harness();
        let result = h.engine.dispatch(InboundRequest::new("GET", "/shop/api/secure")).await;
        assert_eq!(result.status, 401);
        assert_eq!(result.body, r#"{"denied": "token is required"}"#);
        assert!(result.webhooks.is_empty());

        let ok = h
            .engine
            .dispatch(InboundRequest::new("GET", "/shop/api/secure").with_query("token=abc"))
            .await;
        assert_eq!(ok.status, 200);
        assert_eq!(ok.body, "ok");
    }

    #[tokio::test]
    async fn test_no_active_responses_is_500() {
        let h = harness();
        let result = h.engine.dispatch(InboundRequest::new("GET", "/shop/api/empty")).await;
        assert_eq!(result.status, 500);
        assert!(matches!(
            result.error,
            Some(DispatchError::NoResponseConfigured(_))
        ));
    }

    async fn rotate_body(engine: &DispatchEngine) -> String {
        engine
            .dispatch(InboundRequest::new("GET", "/shop/api/rotate"))
            .await
            .body
    }

    #[tokio::test]
    async fn test_upsert_recompiles_and_resets_rotation() {
        let h = harness();
        assert_eq!(rotate_body(&h.engine).await, "a");
        assert_eq!(rotate_body(&h.engine).await, "b");

        let project: ProjectDefinition = serde_yaml::from_str(SHOP).unwrap();
        h.source.upsert_project(project);
        assert_eq!(rotate_body(&h.engine).await, "a");
    }

    #[tokio::test]
    async fn test_base_path_is_case_insensitive() {
        let h = harness();
        let result = h.engine.dispatch(InboundRequest::new("GET", "/SHOP/api/users/9")).await;
        assert_eq!(result.status, 200);
        assert_eq!(result.endpoint_id.as_deref(), Some("user"));
        assert_eq!(result.body, r#"{"id": 9}"#);

        assert!(h.engine.resolve_project("/Shop").await.unwrap().is_some());
        assert!(h.engine.resolve_project("/shopping/api/ping").await.unwrap().is_none());
    }
}
