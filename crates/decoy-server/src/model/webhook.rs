use super::default_true;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Outbound call fired after a successful dispatch.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookDefinition {
    pub name: String,
    /// Target URL template
    pub url: String,
    #[serde(default = "default_webhook_method")]
    pub method: String,
    #[serde(
        default,
        deserialize_with = "super::body_text::deserialize_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub body: Option<String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Wait before delivering, counted from enqueue
    #[serde(default)]
    pub delay_ms: u64,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_webhook_method() -> String {
    "POST".to_string()
}
