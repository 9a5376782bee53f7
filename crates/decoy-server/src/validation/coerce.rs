//! Data type coercion for validation values.

use crate::model::DataType;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();

fn email_regex() -> &'static Regex {
    EMAIL_REGEX.get_or_init(|| {
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("static email regex")
    })
}

/// A value resolved from the request, before coercion.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Text(String),
    Json(Value),
}

impl RawValue {
    /// Build from a JSON body field; `null` and empty strings count as absent.
    pub fn from_json(value: Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::String(s) => Self::from_text(s),
            other => Some(RawValue::Json(other)),
        }
    }

    /// Build from a text source; empty strings count as absent.
    pub fn from_text(text: String) -> Option<Self> {
        if text.is_empty() {
            None
        } else {
            Some(RawValue::Text(text))
        }
    }

    /// The value as the raw string used for pattern and allowed-value checks.
    pub fn as_text(&self) -> String {
        match self {
            RawValue::Text(s) => s.clone(),
            RawValue::Json(v) => crate::request::json_to_text(v),
        }
    }

    fn as_json(&self) -> Option<Value> {
        match self {
            RawValue::Json(v) => Some(v.clone()),
            RawValue::Text(s) => serde_json::from_str(s.trim()).ok(),
        }
    }
}

/// Coerce a raw value to `data_type`, returning the measure used for min/max
/// bounds (numeric value, or length / element count), or `None` on failure.
pub fn coerce(data_type: DataType, value: &RawValue) -> Option<f64> {
    let text = value.as_text();
    match data_type {
        DataType::String => Some(text.chars().count() as f64),
        DataType::Number => match value {
            RawValue::Json(Value::Number(n)) => n.as_f64(),
            RawValue::Json(_) => None,
            RawValue::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        },
        DataType::Boolean => match value {
            RawValue::Json(Value::Bool(_)) => Some(text.len() as f64),
            RawValue::Json(_) => None,
            RawValue::Text(s) => {
                let s = s.trim().to_ascii_lowercase();
                matches!(s.as_str(), "true" | "false" | "1" | "0").then_some(s.len() as f64)
            }
        },
        DataType::Email => email_regex()
            .is_match(text.trim())
            .then_some(text.chars().count() as f64),
        DataType::Uuid => uuid::Uuid::parse_str(text.trim())
            .ok()
            .map(|_| text.chars().count() as f64),
        DataType::Date => is_date(text.trim()).then_some(text.chars().count() as f64),
        DataType::Url => reqwest::Url::parse(text.trim())
            .ok()
            .filter(|url| url.has_host())
            .map(|_| text.chars().count() as f64),
        DataType::Array => match value.as_json()? {
            Value::Array(items) => Some(items.len() as f64),
            _ => None,
        },
        DataType::Object => match value.as_json()? {
            Value::Object(fields) => Some(fields.len() as f64),
            _ => None,
        },
    }
}

fn is_date(text: &str) -> bool {
    DateTime::parse_from_rfc3339(text).is_ok()
        || NaiveDate::parse_from_str(text, "%Y-%m-%d").is_ok()
        || NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S").is_ok()
        || NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S").is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn text(s: &str) -> RawValue {
        RawValue::Text(s.to_string())
    }

    #[test]
    fn test_number() {
        assert_eq!(coerce(DataType::Number, &text("42")), Some(42.0));
        assert_eq!(coerce(DataType::Number, &text(" -1.5 ")), Some(-1.5));
        assert_eq!(coerce(DataType::Number, &RawValue::Json(json!(7))), Some(7.0));
        assert_eq!(coerce(DataType::Number, &text("abc")), None);
        assert_eq!(coerce(DataType::Number, &text("NaN")), None);
        assert_eq!(coerce(DataType::Number, &RawValue::Json(json!([1]))), None);
    }

    #[test]
    fn test_boolean() {
        assert!(coerce(DataType::Boolean, &text("TRUE")).is_some());
        assert!(coerce(DataType::Boolean, &text("0")).is_some());
        assert!(coerce(DataType::Boolean, &RawValue::Json(json!(false))).is_some());
        assert!(coerce(DataType::Boolean, &text("yes")).is_none());
    }

    #[test]
    fn test_formats() {
        assert!(coerce(DataType::Email, &text("ann@example.com")).is_some());
        assert!(coerce(DataType::Email, &text("ann@example")).is_none());
        assert!(coerce(DataType::Uuid, &text("67e55044-10b1-426f-9247-bb680e5fe0c8")).is_some());
        assert!(coerce(DataType::Uuid, &text("not-a-uuid")).is_none());
        assert!(coerce(DataType::Date, &text("2024-05-17")).is_some());
        assert!(coerce(DataType::Date, &text("2024-05-17T09:30:00Z")).is_some());
        assert!(coerce(DataType::Date, &text("17/05/2024")).is_none());
        assert!(coerce(DataType::Url, &text("https://example.com/a")).is_some());
        assert!(coerce(DataType::Url, &text("example.com")).is_none());
    }

    #[test]
    fn test_collections() {
        assert_eq!(coerce(DataType::Array, &text("[1, 2, 3]")), Some(3.0));
        assert_eq!(coerce(DataType::Array, &RawValue::Json(json!(["a"]))), Some(1.0));
        assert_eq!(coerce(DataType::Array, &text("{}")), None);
        assert_eq!(coerce(DataType::Object, &RawValue::Json(json!({"a": 1}))), Some(1.0));
        assert_eq!(coerce(DataType::Object, &text("[]")), None);
    }

    #[test]
    fn test_string_measure_is_char_count() {
        assert_eq!(coerce(DataType::String, &text("héllo")), Some(5.0));
    }

    #[test]
    fn test_empty_values_are_absent() {
        assert_eq!(RawValue::from_text(String::new()), None);
        assert_eq!(RawValue::from_json(json!(null)), None);
        assert_eq!(RawValue::from_json(json!("")), None);
        assert_eq!(
            RawValue::from_json(json!(3)),
            Some(RawValue::Json(json!(3)))
        );
    }
}
