use super::default_true;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One candidate reply belonging to an endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseDefinition {
    #[serde(default)]
    pub id: String,
    #[serde(default = "default_status_code")]
    pub status_code: u16,
    /// Body template
    #[serde(default, deserialize_with = "super::body_text::deserialize")]
    pub body: String,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    /// Header templates
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default = "default_true")]
    pub active: bool,
    /// Rotation order; need not be contiguous
    #[serde(default)]
    pub order: i32,
    /// Condition expression used by condition-based selection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default, rename = "default")]
    pub is_default: bool,
}

fn default_status_code() -> u16 {
    200
}

fn default_content_type() -> String {
    "application/json".to_string()
}

impl ResponseDefinition {
    /// The trimmed condition expression, if one is set and non-empty.
    pub fn condition_expr(&self) -> Option<&str> {
        self.condition
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }
}
