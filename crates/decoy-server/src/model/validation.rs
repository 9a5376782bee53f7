use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a validated parameter is read from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterLocation {
    #[default]
    Query,
    Path,
    #[serde(alias = "headers")]
    Header,
    Body,
}

impl ParameterLocation {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterLocation::Query => "query",
            ParameterLocation::Path => "path",
            ParameterLocation::Header => "header",
            ParameterLocation::Body => "body",
        }
    }
}

impl fmt::Display for ParameterLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared type a parameter must coerce to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    #[default]
    String,
    #[serde(alias = "integer", alias = "int")]
    Number,
    #[serde(alias = "bool")]
    Boolean,
    Email,
    #[serde(alias = "guid")]
    Uuid,
    #[serde(alias = "datetime")]
    Date,
    #[serde(alias = "uri")]
    Url,
    Array,
    Object,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::String => "string",
            DataType::Number => "number",
            DataType::Boolean => "boolean",
            DataType::Email => "email",
            DataType::Uuid => "uuid",
            DataType::Date => "date",
            DataType::Url => "url",
            DataType::Array => "array",
            DataType::Object => "object",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-parameter constraint that short-circuits dispatch when violated.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationRule {
    /// Parameter name (header name, query key, path parameter or body field)
    pub name: String,
    #[serde(default)]
    pub location: ParameterLocation,
    #[serde(default)]
    pub data_type: DataType,
    #[serde(default)]
    pub required: bool,
    /// Regex the raw value must match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// Lower bound on the numeric value, or on the length for text/collections
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_values: Vec<String>,
    /// Message template; placeholders are rendered like response bodies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default = "default_failure_status")]
    pub status_code: u16,
}

fn default_failure_status() -> u16 {
    400
}

impl Default for ValidationRule {
    fn default() -> Self {
        Self {
            name: String::new(),
            location: ParameterLocation::default(),
            data_type: DataType::default(),
            required: false,
            pattern: None,
            min: None,
            max: None,
            allowed_values: Vec::new(),
            error_message: None,
            status_code: default_failure_status(),
        }
    }
}
