//! Compiled route patterns and the three matching strategies.

use super::constraint::Constraint;
use regex::{Regex, RegexBuilder};
use std::collections::HashMap;
use std::sync::Arc;

/// Outcome of matching a path against a route.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteMatch {
    pub is_match: bool,
    /// Parameter name to raw segment value; empty on no-match
    pub params: HashMap<String, String>,
}

impl RouteMatch {
    pub fn no_match() -> Self {
        Self::default()
    }

    pub fn matched(params: HashMap<String, String>) -> Self {
        Self {
            is_match: true,
            params,
        }
    }
}

/// One segment of a parameterized route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Compared case-insensitively
    Literal { value: String, lower: String },
    /// `{name}`, `{name:constraint}` or `:name`
    Param {
        name: String,
        constraint: Option<Constraint>,
    },
}

/// A `{name}` placeholder inside a wildcard route. Captured under a generated
/// group name so any parameter name is accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WildcardParam {
    pub group: String,
    pub name: String,
    pub constraint: Option<Constraint>,
}

/// Strategy a route was compiled into.
#[derive(Debug, Clone)]
pub enum RouteStrategy {
    /// Explicit regex override
    Regex(Arc<Regex>),
    /// Wildcard pattern translated to a regex; constraints are checked on captures
    Wildcard {
        regex: Arc<Regex>,
        params: Vec<WildcardParam>,
    },
    /// Segment-by-segment parameterized match
    Segments(Vec<Segment>),
    /// The pattern could not be compiled; never matches
    Invalid(String),
}

/// A route pattern compiled for repeated matching.
#[derive(Debug, Clone)]
pub struct CompiledRoute {
    pattern: String,
    strategy: RouteStrategy,
}

impl CompiledRoute {
    /// Compile a route. Compilation never fails; invalid patterns become
    /// [`RouteStrategy::Invalid`].
    pub fn compile(pattern: &str, wildcard: bool, explicit_regex: Option<&str>) -> Self {
        let strategy = match explicit_regex.map(str::trim).filter(|r| !r.is_empty()) {
            Some(raw) => match build_regex(raw) {
                Ok(regex) => RouteStrategy::Regex(Arc::new(regex)),
                Err(e) => RouteStrategy::Invalid(format!("invalid regex '{raw}': {e}")),
            },
            None if wildcard || pattern.contains('*') => compile_wildcard(pattern),
            None => RouteStrategy::Segments(
                split_segments(normalize_path(pattern))
                    .map(parse_segment)
                    .collect(),
            ),
        };

        Self {
            pattern: pattern.to_string(),
            strategy,
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn strategy(&self) -> &RouteStrategy {
        &self.strategy
    }

    /// Reason the pattern failed to compile, if it did.
    pub fn compile_error(&self) -> Option<&str> {
        match &self.strategy {
            RouteStrategy::Invalid(reason) => Some(reason),
            _ => None,
        }
    }

    /// Match a request path (query suffix allowed) against this route.
    pub fn matches(&self, request_path: &str) -> RouteMatch {
        let path = normalize_path(request_path);
        match &self.strategy {
            RouteStrategy::Regex(regex) => match_regex(regex, path),
            RouteStrategy::Wildcard { regex, params } => match_wildcard(regex, path, params),
            RouteStrategy::Segments(segments) => match_segments(segments, path),
            RouteStrategy::Invalid(_) => RouteMatch::no_match(),
        }
    }
}

/// One-shot match: compile `pattern` and match `request_path` against it.
pub fn match_route(
    pattern: &str,
    request_path: &str,
    is_wildcard: bool,
    explicit_regex: Option<&str>,
) -> RouteMatch {
    CompiledRoute::compile(pattern, is_wildcard, explicit_regex).matches(request_path)
}

/// Strip any query suffix and leading/trailing separators.
pub fn normalize_path(path: &str) -> &str {
    let path = path.split_once('?').map_or(path, |(p, _)| p);
    path.trim_matches('/')
}

fn split_segments(normalized: &str) -> impl Iterator<Item = &str> {
    normalized.split('/').filter(move |_| !normalized.is_empty())
}

fn build_regex(body: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(&format!("^(?:{body})$"))
        .case_insensitive(true)
        .build()
}

fn parse_segment(segment: &str) -> Segment {
    if let Some(inner) = segment
        .strip_prefix('{')
        .and_then(|s| s.strip_suffix('}'))
    {
        let (name, constraint) = match inner.split_once(':') {
            Some((name, constraint)) => (name, Some(Constraint::parse(constraint))),
            None => (inner, None),
        };
        return Segment::Param {
            name: name.trim().to_string(),
            constraint,
        };
    }

    if let Some(name) = segment.strip_prefix(':').filter(|n| !n.is_empty()) {
        return Segment::Param {
            name: name.to_string(),
            constraint: None,
        };
    }

    Segment::Literal {
        value: segment.to_string(),
        lower: segment.to_lowercase(),
    }
}

fn match_segments(segments: &[Segment], path: &str) -> RouteMatch {
    let parts: Vec<&str> = split_segments(path).collect();
    if parts.len() != segments.len() {
        return RouteMatch::no_match();
    }

    let mut params = HashMap::new();
    for (segment, part) in segments.iter().zip(parts) {
        match segment {
            Segment::Literal { lower, .. } => {
                if part.to_lowercase() != *lower {
                    return RouteMatch::no_match();
                }
            }
            Segment::Param { name, constraint } => {
                if let Some(constraint) = constraint {
                    if !constraint.accepts(part) {
                        return RouteMatch::no_match();
                    }
                }
                params.insert(name.clone(), part.to_string());
            }
        }
    }

    RouteMatch::matched(params)
}

fn match_regex(regex: &Regex, path: &str) -> RouteMatch {
    let with_slash = format!("/{path}");
    for candidate in [path, with_slash.as_str()] {
        if let Some(caps) = regex.captures(candidate) {
            let params = regex
                .capture_names()
                .flatten()
                .filter_map(|name| {
                    caps.name(name)
                        .map(|m| (name.to_string(), m.as_str().to_string()))
                })
                .collect();
            return RouteMatch::matched(params);
        }
    }
    RouteMatch::no_match()
}

fn match_wildcard(regex: &Regex, path: &str, wildcard_params: &[WildcardParam]) -> RouteMatch {
    let with_slash = format!("/{path}");
    for candidate in [path, with_slash.as_str()] {
        let Some(caps) = regex.captures(candidate) else {
            continue;
        };

        let mut params = HashMap::new();
        for param in wildcard_params {
            let Some(value) = caps.name(&param.group).map(|m| m.as_str()) else {
                continue;
            };
            if let Some(constraint) = &param.constraint {
                if !constraint.accepts(value) {
                    return RouteMatch::no_match();
                }
            }
            params.insert(param.name.clone(), value.to_string());
        }
        return RouteMatch::matched(params);
    }
    RouteMatch::no_match()
}

enum WildcardPiece {
    /// A whole `**` segment
    AnyDepth,
    Text(String),
}

fn compile_wildcard(pattern: &str) -> RouteStrategy {
    let mut params = Vec::new();
    let pieces: Vec<WildcardPiece> = split_segments(normalize_path(pattern))
        .map(|segment| {
            if segment == "**" {
                WildcardPiece::AnyDepth
            } else {
                WildcardPiece::Text(translate_wildcard_segment(segment, &mut params))
            }
        })
        .collect();

    for (i, param) in params.iter().enumerate() {
        if params[..i].iter().any(|p| p.name == param.name) {
            return RouteStrategy::Invalid(format!(
                "duplicate parameter '{}' in wildcard pattern '{pattern}'",
                param.name
            ));
        }
    }

    let mut body = String::new();
    let count = pieces.len();
    for (i, piece) in pieces.iter().enumerate() {
        match piece {
            WildcardPiece::AnyDepth if i == 0 && count == 1 => body.push_str(".*"),
            // Leading `**/` may match nothing, including its separator
            WildcardPiece::AnyDepth if i == 0 => body.push_str("(?:.*/)?"),
            WildcardPiece::AnyDepth => body.push_str("(?:/.*)?"),
            WildcardPiece::Text(text) => {
                let after_leading_any = i == 1 && matches!(pieces[0], WildcardPiece::AnyDepth);
                if i > 0 && !after_leading_any {
                    body.push('/');
                }
                body.push_str(text);
            }
        }
    }

    match build_regex(&body) {
        Ok(regex) => RouteStrategy::Wildcard {
            regex: Arc::new(regex),
            params,
        },
        Err(e) => RouteStrategy::Invalid(format!("invalid wildcard pattern '{pattern}': {e}")),
    }
}

fn translate_wildcard_segment(segment: &str, params: &mut Vec<WildcardParam>) -> String {
    let mut out = String::new();
    let mut chars = segment.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                out.push_str(".*");
            }
            '*' => out.push_str("[^/]*"),
            '{' => {
                let mut inner = String::new();
                let mut closed = false;
                for next in chars.by_ref() {
                    if next == '}' {
                        closed = true;
                        break;
                    }
                    inner.push(next);
                }
                if !closed {
                    out.push_str(&regex::escape(&format!("{{{inner}")));
                    continue;
                }
                let (name, constraint) = match inner.split_once(':') {
                    Some((name, constraint)) => (name.trim(), Some(Constraint::parse(constraint))),
                    None => (inner.trim(), None),
                };
                let group = format!("p{}", params.len());
                out.push_str(&format!("(?P<{group}>[^/]+)"));
                params.push(WildcardParam {
                    group,
                    name: name.to_string(),
                    constraint,
                });
            }
            other => out.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }
    out
}
