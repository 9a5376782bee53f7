use super::Endpoint;
use serde::{Deserialize, Serialize};

/// A project groups endpoints under a shared base path.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDefinition {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Path prefix under which the project's endpoints are served, e.g. `/acme`
    pub base_path: String,
    /// Delay applied to endpoints that declare no window of their own
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_delay_min_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_delay_max_ms: Option<u64>,
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
}

impl ProjectDefinition {
    /// Base path without leading or trailing separators (`""` for the root).
    pub fn normalized_base_path(&self) -> &str {
        self.base_path.trim_matches('/')
    }

    /// Strip this project's base path from a request path.
    ///
    /// See [`strip_base_path`].
    pub fn strip_base_path<'a>(&self, path: &'a str) -> Option<&'a str> {
        strip_base_path(&self.base_path, path)
    }

    /// Fill in `project_id` on endpoints that left it empty.
    pub fn assign_project_ids(&mut self) {
        for endpoint in &mut self.endpoints {
            if endpoint.project_id.is_empty() {
                endpoint.project_id = self.id.clone();
            }
        }
    }
}

/// Strip `base_path` from a request path.
///
/// Returns the remaining path (always starting with `/`) when the request
/// path lies under the base path on a segment boundary. The base path is
/// compared ASCII case-insensitively, the same way duplicate base paths are
/// detected when projects are loaded.
pub fn strip_base_path<'a>(base_path: &str, path: &'a str) -> Option<&'a str> {
    let base = base_path.trim_matches('/');
    if base.is_empty() {
        return Some(if path.is_empty() { "/" } else { path });
    }

    let trimmed = path.strip_prefix('/').unwrap_or(path);
    let head = trimmed.get(..base.len())?;
    if !head.eq_ignore_ascii_case(base) {
        return None;
    }
    let rest = &trimmed[base.len()..];
    if rest.is_empty() {
        Some("/")
    } else if rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}
