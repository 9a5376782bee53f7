//! Request validation against an endpoint's rule list.
//!
//! Rules run in declared order and the first failing rule short-circuits. For
//! each rule the value is resolved from its location, then checked for
//! presence, data type, pattern, bounds and allowed values, in that order.

mod coerce;

pub use coerce::{coerce, RawValue};

use crate::model::{DataType, ParameterLocation, ValidationRule};
use crate::request::RequestContext;
use regex::Regex;
use std::fmt;
use tracing::warn;

/// Why a rule failed.
#[derive(Debug, Clone, PartialEq)]
pub enum FailureReason {
    Missing,
    InvalidType(DataType),
    PatternMismatch,
    BelowMinimum(f64),
    AboveMaximum(f64),
    NotAllowed,
}

impl FailureReason {
    /// Short machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            FailureReason::Missing => "missing",
            FailureReason::InvalidType(_) => "invalid_type",
            FailureReason::PatternMismatch => "pattern_mismatch",
            FailureReason::BelowMinimum(_) => "below_minimum",
            FailureReason::AboveMaximum(_) => "above_maximum",
            FailureReason::NotAllowed => "not_allowed",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Missing => write!(f, "is required"),
            FailureReason::InvalidType(t) => write!(f, "must be a valid {t}"),
            FailureReason::PatternMismatch => write!(f, "has an invalid format"),
            FailureReason::BelowMinimum(min) => write!(f, "must be at least {min}"),
            FailureReason::AboveMaximum(max) => write!(f, "must be at most {max}"),
            FailureReason::NotAllowed => write!(f, "is not an allowed value"),
        }
    }
}

/// The first failing rule and the value it saw.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationFailure {
    pub rule_index: usize,
    pub field: String,
    pub location: ParameterLocation,
    pub status_code: u16,
    pub reason: FailureReason,
    pub value: Option<String>,
    /// The rule's custom message, or a generated one
    pub message: String,
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

#[derive(Debug, Clone)]
struct CompiledRule {
    rule: ValidationRule,
    pattern: Option<Regex>,
}

/// Validation rules with patterns compiled once.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<CompiledRule>,
}

impl RuleSet {
    pub fn compile(rules: &[ValidationRule]) -> Self {
        let rules = rules
            .iter()
            .map(|rule| {
                let pattern = rule.pattern.as_deref().and_then(|p| match Regex::new(p) {
                    Ok(re) => Some(re),
                    Err(e) => {
                        warn!(field = %rule.name, pattern = %p, error = %e, "Invalid validation pattern, check skipped");
                        None
                    }
                });
                CompiledRule {
                    rule: rule.clone(),
                    pattern,
                }
            })
            .collect();
        Self { rules }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Run every rule in order; the first failure is returned.
    pub fn validate(&self, ctx: &RequestContext) -> Result<(), ValidationFailure> {
        for (index, compiled) in self.rules.iter().enumerate() {
            compiled.check(ctx).map_err(|(reason, value)| {
                let rule = &compiled.rule;
                let message = rule
                    .error_message
                    .clone()
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| format!("'{}' {}", rule.name, reason));
                ValidationFailure {
                    rule_index: index,
                    field: rule.name.clone(),
                    location: rule.location,
                    status_code: rule.status_code,
                    reason,
                    value,
                    message,
                }
            })?;
        }
        Ok(())
    }
}

impl CompiledRule {
    fn check(&self, ctx: &RequestContext) -> Result<(), (FailureReason, Option<String>)> {
        let rule = &self.rule;
        let Some(value) = resolve(rule, ctx) else {
            return if rule.required {
                Err((FailureReason::Missing, None))
            } else {
                Ok(())
            };
        };

        let text = value.as_text();
        let fail = |reason| Err((reason, Some(text.clone())));

        let Some(measure) = coerce(rule.data_type, &value) else {
            return fail(FailureReason::InvalidType(rule.data_type));
        };

        if let Some(pattern) = &self.pattern {
            if !pattern.is_match(&text) {
                return fail(FailureReason::PatternMismatch);
            }
        }

        if let Some(min) = rule.min {
            if measure < min {
                return fail(FailureReason::BelowMinimum(min));
            }
        }
        if let Some(max) = rule.max {
            if measure > max {
                return fail(FailureReason::AboveMaximum(max));
            }
        }

        if !rule.allowed_values.is_empty() && !rule.allowed_values.iter().any(|v| *v == text) {
            return fail(FailureReason::NotAllowed);
        }

        Ok(())
    }
}

fn resolve(rule: &ValidationRule, ctx: &RequestContext) -> Option<RawValue> {
    match rule.location {
        ParameterLocation::Query => ctx.query.get(&rule.name).cloned().and_then(RawValue::from_text),
        ParameterLocation::Path => ctx.params.get(&rule.name).cloned().and_then(RawValue::from_text),
        ParameterLocation::Header => ctx
            .header(&rule.name)
            .map(str::to_string)
            .and_then(RawValue::from_text),
        ParameterLocation::Body => ctx.body_field(&rule.name).and_then(RawValue::from_json),
    }
}

/// Validate a request against rules without keeping the compiled set.
pub fn validate(rules: &[ValidationRule], ctx: &RequestContext) -> Result<(), ValidationFailure> {
    RuleSet::compile(rules).validate(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::header::{HeaderName, HeaderValue};
    use hyper::HeaderMap;
    use std::collections::HashMap;

    fn rule(name: &str, location: ParameterLocation, data_type: DataType) -> ValidationRule {
        ValidationRule {
            name: name.to_string(),
            location,
            data_type,
            required: true,
            ..Default::default()
        }
    }

    fn ctx(query: &str, body: Option<&str>) -> RequestContext {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("x-api-key"),
            HeaderValue::from_static("secret"),
        );
        headers.insert(
            HeaderName::from_static("content-type"),
            HeaderValue::from_static("application/json"),
        );
        let mut params = HashMap::new();
        params.insert("id".to_string(), "42".to_string());
        RequestContext::new("POST", "/orders/42", Some(query), &headers, body).with_params(params)
    }

    #[test]
    fn test_all_locations_pass() {
        let rules = vec![
            rule("page", ParameterLocation::Query, DataType::Number),
            rule("id", ParameterLocation::Path, DataType::Number),
            rule("X-Api-Key", ParameterLocation::Header, DataType::String),
            rule("customer.email", ParameterLocation::Body, DataType::Email),
            rule("items", ParameterLocation::Body, DataType::Array),
        ];
        let body = r#"{"customer": {"email": "ann@example.com"}, "items": [1, 2]}"#;
        assert!(validate(&rules, &ctx("page=2", Some(body))).is_ok());
    }

    #[test]
    fn test_missing_required() {
        let mut token = rule("token", ParameterLocation::Query, DataType::String);
        token.status_code = 401;
        token.error_message = Some("Missing token".to_string());
        let failure = validate(&[token], &ctx("", None)).unwrap_err();
        assert_eq!(failure.reason, FailureReason::Missing);
        assert_eq!(failure.status_code, 401);
        assert_eq!(failure.message, "Missing token");
        assert_eq!(failure.value, None);
    }

    #[test]
    fn test_empty_value_counts_as_absent() {
        let token = rule("token", ParameterLocation::Query, DataType::String);
        let failure = validate(&[token], &ctx("token=", None)).unwrap_err();
        assert_eq!(failure.reason, FailureReason::Missing);
    }

    #[test]
    fn test_optional_absent_passes() {
        let mut page = rule("page", ParameterLocation::Query, DataType::Number);
        page.required = false;
        assert!(validate(&[page], &ctx("", None)).is_ok());
    }

    #[test]
    fn test_first_failing_rule_short_circuits() {
        let rules = vec![
            rule("page", ParameterLocation::Query, DataType::Number),
            rule("size", ParameterLocation::Query, DataType::Number),
            rule("sort", ParameterLocation::Query, DataType::String),
        ];
        let failure = validate(&rules, &ctx("page=1&size=abc", None)).unwrap_err();
        assert_eq!(failure.rule_index, 1);
        assert_eq!(failure.field, "size");
        assert_eq!(failure.reason, FailureReason::InvalidType(DataType::Number));
        assert_eq!(failure.value.as_deref(), Some("abc"));
        assert_eq!(failure.message, "'size' must be a valid number");
    }

    #[test]
    fn test_pattern_bounds_and_allowed_values() {
        let mut code = rule("code", ParameterLocation::Query, DataType::String);
        code.pattern = Some(r"^[A-Z]{3}$".to_string());
        assert_eq!(
            validate(&[code.clone()], &ctx("code=ab1", None)).unwrap_err().reason,
            FailureReason::PatternMismatch
        );
        assert!(validate(&[code], &ctx("code=ABC", None)).is_ok());

        let mut page = rule("page", ParameterLocation::Query, DataType::Number);
        page.min = Some(1.0);
        page.max = Some(10.0);
        assert_eq!(
            validate(&[page.clone()], &ctx("page=0", None)).unwrap_err().reason,
            FailureReason::BelowMinimum(1.0)
        );
        assert_eq!(
            validate(&[page.clone()], &ctx("page=11", None)).unwrap_err().reason,
            FailureReason::AboveMaximum(10.0)
        );

        let mut name = rule("name", ParameterLocation::Query, DataType::String);
        name.max = Some(3.0);
        assert!(validate(&[name], &ctx("name=abcd", None)).is_err());

        let mut status = rule("status", ParameterLocation::Query, DataType::String);
        status.allowed_values = vec!["open".to_string(), "closed".to_string()];
        assert!(validate(&[status.clone()], &ctx("status=open", None)).is_ok());
        assert_eq!(
            validate(&[status], &ctx("status=pending", None)).unwrap_err().reason,
            FailureReason::NotAllowed
        );
    }

    #[test]
    fn test_invalid_pattern_is_skipped() {
        let mut code = rule("code", ParameterLocation::Query, DataType::String);
        code.pattern = Some("([".to_string());
        assert!(validate(&[code], &ctx("code=anything", None)).is_ok());
    }

    #[test]
    fn test_form_body_and_jsonpath() {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("content-type"),
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        let form = RequestContext::new("POST", "/login", None, &headers, Some("user=ann&age=41"));
        let rules = vec![
            rule("user", ParameterLocation::Body, DataType::String),
            rule("age", ParameterLocation::Body, DataType::Number),
        ];
        assert!(validate(&rules, &form).is_ok());

        let json = ctx("", Some(r#"{"items": [{"sku": "A-1"}]}"#));
        let sku = rule("$.items[0].sku", ParameterLocation::Body, DataType::String);
        assert!(validate(&[sku], &json).is_ok());
    }
}
