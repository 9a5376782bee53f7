use super::{default_true, ResponseDefinition, ValidationRule, WebhookDefinition};
use serde::{Deserialize, Serialize};

/// Method value that makes an endpoint accept every HTTP method.
pub const ANY_METHOD: &str = "ANY";

/// Policy used to pick among an endpoint's response definitions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SelectionMode {
    /// Rotate through non-default responses by order
    #[default]
    Sequential,
    /// Uniform random pick among active responses
    Random,
    /// First response whose condition holds, else the default
    #[serde(alias = "condition", alias = "conditional")]
    ConditionBased,
}

/// A configured route plus its responses, validation rules and webhooks.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    pub id: String,
    /// Owning project. Filled in by the endpoint source when left empty.
    #[serde(default)]
    pub project_id: String,
    /// Route pattern, e.g. `/api/users/{id:int}` or `/files/**`
    pub route: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default = "default_true")]
    pub active: bool,
    /// Lower values are evaluated first
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub wildcard: bool,
    /// Raw regex that replaces `route` for matching
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,
    #[serde(default)]
    pub selection_mode: SelectionMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_min_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_max_ms: Option<u64>,
    #[serde(default)]
    pub responses: Vec<ResponseDefinition>,
    #[serde(default)]
    pub validation_rules: Vec<ValidationRule>,
    #[serde(default)]
    pub webhooks: Vec<WebhookDefinition>,
    /// Body template emitted when a validation rule fails
    #[serde(
        default,
        deserialize_with = "super::body_text::deserialize_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub validation_error_body: Option<String>,
}

fn default_method() -> String {
    "GET".to_string()
}

impl Endpoint {
    /// Exact, case-insensitive method comparison; `ANY` and `*` accept everything.
    pub fn accepts_method(&self, method: &str) -> bool {
        let declared = self.method.trim();
        declared == "*"
            || declared.eq_ignore_ascii_case(ANY_METHOD)
            || declared.eq_ignore_ascii_case(method)
    }

    /// Number of responses flagged as the unconditional fallback.
    pub fn default_response_count(&self) -> usize {
        self.responses.iter().filter(|r| r.is_default).count()
    }
}
