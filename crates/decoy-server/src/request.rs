//! Request data shared by validation, conditions and templates.
//!
//! A `RequestContext` is built once per inbound request and then read by the
//! validation evaluator, the condition interpreter and the template renderer.
//! Field lookups use dotted names:
//!
//! - `method`, `path`, `queryString`, `body`, `ip`
//! - `query.<name>` - query parameter
//! - `headers.<name>` - header value (case-insensitive)
//! - `params.<name>` / `pathParams.<name>` - path parameter from the route
//! - `body.<field>` - field of a JSON or form-encoded body

use serde_json::Value;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::OnceLock;

/// Parsed request data for one dispatch.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// HTTP method (upper case)
    pub method: String,
    /// Request path relative to the project base path, without query string
    pub path: String,
    /// Raw query string (without `?`)
    pub query_string: String,
    /// Query parameters; the first value wins for repeated keys
    pub query: HashMap<String, String>,
    /// Request headers (keys lowercased)
    pub headers: HashMap<String, String>,
    /// Path parameters extracted by the route matcher
    pub params: HashMap<String, String>,
    /// Raw request body
    pub body: Option<String>,
    pub client_addr: Option<SocketAddr>,
    parsed_body: OnceLock<Option<Value>>,
}

impl RequestContext {
    /// Create a context from request components.
    pub fn new(
        method: &str,
        path: &str,
        query_string: Option<&str>,
        headers: &hyper::HeaderMap,
        body: Option<&str>,
    ) -> Self {
        let headers_map = headers
            .iter()
            .filter_map(|(k, v)| {
                v.to_str()
                    .ok()
                    .map(|val| (k.as_str().to_lowercase(), val.to_string()))
            })
            .collect();

        Self {
            method: method.to_uppercase(),
            path: path.to_string(),
            query_string: query_string.unwrap_or("").to_string(),
            query: parse_query_string(query_string),
            headers: headers_map,
            params: HashMap::new(),
            body: body.filter(|b| !b.is_empty()).map(str::to_string),
            client_addr: None,
            parsed_body: OnceLock::new(),
        }
    }

    pub fn with_client_addr(mut self, addr: SocketAddr) -> Self {
        self.client_addr = Some(addr);
        self
    }

    pub fn with_params(mut self, params: HashMap<String, String>) -> Self {
        self.params = params;
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }

    fn is_form_body(&self) -> bool {
        self.header("content-type")
            .map(|ct| ct.contains("application/x-www-form-urlencoded"))
            .unwrap_or(false)
    }

    /// The body parsed as JSON, or as a flat object for form-encoded bodies.
    pub fn parsed_body(&self) -> Option<&Value> {
        self.parsed_body
            .get_or_init(|| {
                let body = self.body.as_deref()?;
                if self.is_form_body() {
                    let fields = parse_query_string(Some(body))
                        .into_iter()
                        .map(|(k, v)| (k, Value::String(v)))
                        .collect();
                    return Some(Value::Object(fields));
                }
                serde_json::from_str(body).ok()
            })
            .as_ref()
    }

    /// Resolve a body field by dotted path (`user.emails[0]`) or JSONPath (`$.user.name`).
    pub fn body_field(&self, field: &str) -> Option<Value> {
        let body = self.parsed_body()?;
        if field.starts_with('$') {
            let path = serde_json_path::JsonPath::parse(field).ok()?;
            return path.query(body).first().cloned();
        }
        navigate_json(body, field).cloned()
    }

    /// Get a value by dotted name (see module docs).
    pub fn lookup(&self, name: &str) -> Option<String> {
        let parts: Vec<&str> = name.splitn(2, '.').collect();

        match parts.as_slice() {
            ["method"] => Some(self.method.clone()),
            ["path"] => Some(self.path.clone()),
            ["queryString"] | ["query_string"] => Some(self.query_string.clone()),
            ["body"] => self.body.clone(),
            ["ip"] => self.client_addr.map(|a| a.ip().to_string()),
            ["query", key] => self.query.get(*key).cloned(),
            ["headers", key] | ["header", key] => self.header(key).map(str::to_string),
            ["params", key] | ["pathParams", key] | ["path_params", key] => {
                self.params.get(*key).cloned()
            }
            ["body", field] => self.body_field(field).map(|v| json_to_text(&v)),
            _ => None,
        }
    }
}

/// Render a JSON value as plain text (strings unquoted).
pub fn json_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Parse query string into a HashMap
pub fn parse_query_string(query: Option<&str>) -> HashMap<String, String> {
    let mut params = HashMap::new();
    if let Some(q) = query {
        for pair in q.split('&') {
            let (key, value) = match pair.split_once('=') {
                Some((key, value)) => (key, value),
                None if !pair.is_empty() => (pair, ""),
                None => continue,
            };
            let key = decode_component(key);
            if !params.contains_key(&key) {
                params.insert(key, decode_component(value));
            }
        }
    }
    params
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|s| s.into_owned())
        .unwrap_or(spaced)
}

/// Navigate JSON structure following a dotted path with optional `[index]` parts.
fn navigate_json<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for part in path.split('.') {
        if part.is_empty() {
            continue;
        }

        if let Some(bracket_pos) = part.find('[') {
            let field = &part[..bracket_pos];
            if !field.is_empty() {
                current = current.get(field)?;
            }
            for index in part[bracket_pos..]
                .split(['[', ']'])
                .filter(|s| !s.is_empty())
            {
                current = current.get(index.parse::<usize>().ok()?)?;
            }
        } else {
            current = current.get(part)?;
        }
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::header::{HeaderName, HeaderValue};
    use hyper::HeaderMap;

    fn create_test_context() -> RequestContext {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("content-type"),
            HeaderValue::from_static("application/json"),
        );
        headers.insert(
            HeaderName::from_static("x-request-id"),
            HeaderValue::from_static("req-12345"),
        );

        let mut params = HashMap::new();
        params.insert("id".to_string(), "123".to_string());

        RequestContext::new(
            "post",
            "/users/123",
            Some("name=John&age=30&tag=a&tag=b"),
            &headers,
            Some(r#"{"user": {"role": "admin", "emails": ["a@x.io", "b@x.io"]}, "count": 3}"#),
        )
        .with_params(params)
        .with_client_addr("10.0.0.7:5555".parse().unwrap())
    }

    #[test]
    fn test_parse_query_string() {
        let params = parse_query_string(Some("name=John&age=30&city=New%20York&q=a+b&flag"));
        assert_eq!(params.get("name"), Some(&"John".to_string()));
        assert_eq!(params.get("city"), Some(&"New York".to_string()));
        assert_eq!(params.get("q"), Some(&"a b".to_string()));
        assert_eq!(params.get("flag"), Some(&String::new()));
    }

    #[test]
    fn test_parse_query_string_first_value_wins() {
        let params = parse_query_string(Some("tag=a&tag=b"));
        assert_eq!(params.get("tag"), Some(&"a".to_string()));
    }

    #[test]
    fn test_lookup() {
        let ctx = create_test_context();
        assert_eq!(ctx.lookup("method"), Some("POST".to_string()));
        assert_eq!(ctx.lookup("path"), Some("/users/123".to_string()));
        assert_eq!(ctx.lookup("query.age"), Some("30".to_string()));
        assert_eq!(
            ctx.lookup("headers.X-Request-Id"),
            Some("req-12345".to_string())
        );
        assert_eq!(ctx.lookup("params.id"), Some("123".to_string()));
        assert_eq!(ctx.lookup("pathParams.id"), Some("123".to_string()));
        assert_eq!(ctx.lookup("body.user.role"), Some("admin".to_string()));
        assert_eq!(ctx.lookup("body.count"), Some("3".to_string()));
        assert_eq!(ctx.lookup("ip"), Some("10.0.0.7".to_string()));
        assert_eq!(ctx.lookup("query.missing"), None);
        assert_eq!(ctx.lookup("nonsense"), None);
    }

    #[test]
    fn test_body_field_index_and_jsonpath() {
        let ctx = create_test_context();
        assert_eq!(
            ctx.body_field("user.emails[1]"),
            Some(Value::String("b@x.io".to_string()))
        );
        assert_eq!(
            ctx.body_field("$.user.emails[0]"),
            Some(Value::String("a@x.io".to_string()))
        );
        assert_eq!(ctx.body_field("user.missing"), None);
    }

    #[test]
    fn test_form_body() {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("content-type"),
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        let ctx = RequestContext::new(
            "POST",
            "/login",
            None,
            &headers,
            Some("user=jane&pass=s3cr%21t"),
        );
        assert_eq!(ctx.lookup("body.user"), Some("jane".to_string()));
        assert_eq!(ctx.lookup("body.pass"), Some("s3cr!t".to_string()));
    }

    #[test]
    fn test_empty_body_is_none() {
        let ctx = RequestContext::new("GET", "/", None, &HeaderMap::new(), Some(""));
        assert!(ctx.body.is_none());
        assert!(ctx.parsed_body().is_none());
    }
}
