//! Dispatch inputs, outputs and errors.

use crate::model::WebhookDefinition;
use crate::source::SourceError;
use crate::validation::ValidationFailure;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

/// A request as it arrives at the server, before project resolution.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: String,
    /// Full request path, including the project base path
    pub path: String,
    pub query: Option<String>,
    pub headers: hyper::HeaderMap,
    pub body: Option<String>,
    pub client_addr: Option<SocketAddr>,
}

impl InboundRequest {
    pub fn new(method: &str, path: &str) -> Self {
        Self {
            method: method.to_string(),
            path: path.to_string(),
            query: None,
            headers: hyper::HeaderMap::new(),
            body: None,
            client_addr: None,
        }
    }

    pub fn with_query(mut self, query: &str) -> Self {
        self.query = Some(query.to_string());
        self
    }

    pub fn with_body(mut self, body: &str) -> Self {
        self.body = Some(body.to_string());
        self
    }

    /// Add a header; invalid names or values are skipped.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            hyper::header::HeaderName::from_bytes(name.as_bytes()),
            hyper::header::HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }
}

/// Client-visible dispatch failures. Each maps to a status code and a body.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DispatchError {
    #[error("No project serves path {0}")]
    ProjectNotFound(String),
    #[error("No endpoint matches {method} {path}")]
    NoRouteMatch { method: String, path: String },
    #[error("Validation failed: {0}")]
    Validation(ValidationFailure),
    #[error("Endpoint {0} has no active responses")]
    NoResponseConfigured(String),
    #[error(transparent)]
    Source(#[from] SourceError),
}

impl DispatchError {
    pub fn status_code(&self) -> u16 {
        match self {
            DispatchError::ProjectNotFound(_) | DispatchError::NoRouteMatch { .. } => 404,
            DispatchError::Validation(failure) => failure.status_code,
            DispatchError::NoResponseConfigured(_) => 500,
            DispatchError::Source(SourceError::NotFound(_)) => 404,
            DispatchError::Source(_) => 503,
        }
    }

    /// Short machine-readable code used in error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            DispatchError::ProjectNotFound(_) => "project_not_found",
            DispatchError::NoRouteMatch { .. } => "no_route",
            DispatchError::Validation(_) => "validation_failed",
            DispatchError::NoResponseConfigured(_) => "no_response_configured",
            DispatchError::Source(_) => "source_unavailable",
        }
    }

    /// The built-in JSON error body.
    pub fn to_json_body(&self) -> String {
        let mut body = serde_json::json!({
            "error": self.code(),
            "message": self.to_string(),
        });
        if let DispatchError::Validation(failure) = self {
            body["field"] = failure.field.clone().into();
            body["location"] = failure.location.as_str().into();
            body["message"] = failure.message.clone().into();
        }
        body.to_string()
    }
}

/// Everything the server needs to write a response, plus what happened.
#[derive(Debug, Clone)]
pub struct DispatchResult {
    pub project_id: Option<String>,
    pub endpoint_id: Option<String>,
    /// Path parameters extracted by the route
    pub params: HashMap<String, String>,
    pub response_id: Option<String>,
    pub status: u16,
    pub content_type: String,
    /// Rendered custom headers
    pub headers: Vec<(String, String)>,
    pub body: String,
    pub delay: Duration,
    pub elapsed: Duration,
    pub error: Option<DispatchError>,
    /// Webhooks handed to the dispatcher
    pub webhooks: Vec<WebhookDefinition>,
}

impl DispatchResult {
    pub fn matched(&self) -> bool {
        self.endpoint_id.is_some()
    }

    pub(crate) fn from_error(project_id: Option<String>, error: DispatchError) -> Self {
        Self {
            project_id,
            endpoint_id: None,
            params: HashMap::new(),
            response_id: None,
            status: error.status_code(),
            content_type: "application/json".to_string(),
            headers: Vec::new(),
            body: error.to_json_body(),
            delay: Duration::ZERO,
            elapsed: Duration::ZERO,
            error: Some(error),
            webhooks: Vec::new(),
        }
    }
}
