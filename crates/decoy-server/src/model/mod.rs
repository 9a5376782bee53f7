//! Definitions of projects, endpoints and everything nested under them.
//!
//! These types are what the persistence collaborator hands to the dispatch
//! engine. They deserialize from the YAML/JSON project files accepted by the
//! `decoy` binary (camelCase keys), and the engine never mutates them.
//!
//! ## Module Structure
//!
//! - `endpoint`: `Endpoint` and `SelectionMode`
//! - `response`: `ResponseDefinition`
//! - `validation`: `ValidationRule`, `ParameterLocation`, `DataType`
//! - `webhook`: `WebhookDefinition`
//! - `project`: `ProjectDefinition`

mod endpoint;
mod project;
mod response;
mod validation;
mod webhook;

pub use endpoint::{Endpoint, SelectionMode, ANY_METHOD};
pub use project::{strip_base_path, ProjectDefinition};
pub use response::ResponseDefinition;
pub use validation::{DataType, ParameterLocation, ValidationRule};
pub use webhook::WebhookDefinition;

/// Accept either a string or any structured JSON/YAML value for a body field.
///
/// Structured values are stored as their compact JSON serialization so a
/// project file can write `body: {"ok": true}` instead of an escaped string.
pub(crate) mod body_text {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(into_text(value))
    }

    pub fn deserialize_opt<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<serde_json::Value>::deserialize(deserializer)?;
        Ok(value.map(into_text))
    }

    fn into_text(value: serde_json::Value) -> String {
        match value {
            serde_json::Value::String(s) => s,
            serde_json::Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

fn default_true() -> bool {
    true
}
