//! Placeholder expansion for response bodies, headers and error messages.
//!
//! Templates contain `{{name}}` placeholders (whitespace inside the braces is
//! allowed). Each name is resolved against a flat catalog:
//!
//! - `now`, `now.iso`, `now.unix`, `now.unixMillis`, `now.date`, `now.time`
//! - `faker.*` - synthetic data, see [`faker::FAKER_KEYS`]
//! - `request.*` - request fields, see [`crate::request`]
//! - any extra value supplied for one render (e.g. `validation.message`)
//! - custom providers registered with [`TemplateRenderer::register`]
//!
//! A placeholder that cannot be resolved is left verbatim and logged; it never
//! fails the render.
//!
//! # Example
//!
//! ```yaml
//! body: '{"id": "{{faker.random.uuid}}", "user": "{{request.params.id}}", "at": "{{now}}"}'
//! ```

mod clock;
pub mod faker;

pub use clock::{Clock, FixedClock, SystemClock};
pub use faker::{FakeDataSource, RandomFaker, SeededFaker};

use crate::metrics;
use crate::request::RequestContext;
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tracing::warn;

/// Regex for matching placeholders: {{now}}, {{ request.query.name }}, etc.
static PLACEHOLDER_REGEX: OnceLock<Regex> = OnceLock::new();

fn placeholder_regex() -> &'static Regex {
    PLACEHOLDER_REGEX
        .get_or_init(|| Regex::new(r"\{\{\s*([^{}\s]+)\s*\}\}").expect("static placeholder regex"))
}

/// Check if a string contains placeholders
pub fn has_placeholders(s: &str) -> bool {
    placeholder_regex().is_match(s)
}

type ProviderFn = dyn Fn(&RenderContext<'_>) -> Option<String> + Send + Sync;

/// Data available to one render call.
#[derive(Default)]
pub struct RenderContext<'a> {
    pub request: Option<&'a RequestContext>,
    /// Values keyed by full placeholder name, checked before the catalog
    pub extras: HashMap<String, String>,
}

impl<'a> RenderContext<'a> {
    pub fn for_request(request: &'a RequestContext) -> Self {
        Self {
            request: Some(request),
            extras: HashMap::new(),
        }
    }

    pub fn with_extra(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extras.insert(name.into(), value.into());
        self
    }
}

/// Result of a render, including the placeholders that were left verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub text: String,
    pub unresolved: Vec<String>,
}

/// Expands `{{...}}` placeholders against the placeholder catalog.
#[derive(Clone)]
pub struct TemplateRenderer {
    faker: Arc<dyn FakeDataSource>,
    clock: Arc<dyn Clock>,
    custom: HashMap<String, Arc<ProviderFn>>,
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new(Arc::new(RandomFaker), Arc::new(SystemClock))
    }
}

impl std::fmt::Debug for TemplateRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateRenderer")
            .field("custom", &self.custom.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl TemplateRenderer {
    pub fn new(faker: Arc<dyn FakeDataSource>, clock: Arc<dyn Clock>) -> Self {
        Self {
            faker,
            clock,
            custom: HashMap::new(),
        }
    }

    /// Register a custom provider under an exact placeholder name.
    pub fn register<F>(&mut self, name: impl Into<String>, provider: F)
    where
        F: Fn(&RenderContext<'_>) -> Option<String> + Send + Sync + 'static,
    {
        self.custom.insert(name.into(), Arc::new(provider));
    }

    /// Render a template; unresolved placeholders stay verbatim.
    pub fn render(&self, template: &str, ctx: &RenderContext<'_>) -> String {
        self.render_detailed(template, ctx).text
    }

    /// Render a template and report which placeholders could not be resolved.
    pub fn render_detailed(&self, template: &str, ctx: &RenderContext<'_>) -> Rendered {
        if !template.contains("{{") {
            return Rendered {
                text: template.to_string(),
                unresolved: Vec::new(),
            };
        }

        let mut unresolved = Vec::new();
        let text = placeholder_regex()
            .replace_all(template, |caps: &regex::Captures| {
                let name = &caps[1];
                match self.resolve(name, ctx) {
                    Some(value) => value,
                    None => {
                        unresolved.push(name.to_string());
                        caps[0].to_string()
                    }
                }
            })
            .into_owned();

        for name in &unresolved {
            warn!(placeholder = %name, "Template placeholder could not be resolved, left verbatim");
            metrics::record_template_degraded();
        }

        Rendered { text, unresolved }
    }

    /// Render every value of a header template map.
    pub fn render_map(
        &self,
        templates: &HashMap<String, String>,
        ctx: &RenderContext<'_>,
    ) -> HashMap<String, String> {
        templates
            .iter()
            .map(|(k, v)| (k.clone(), self.render(v, ctx)))
            .collect()
    }

    /// Resolve a single placeholder name.
    pub fn resolve(&self, name: &str, ctx: &RenderContext<'_>) -> Option<String> {
        if let Some(value) = ctx.extras.get(name) {
            return Some(value.clone());
        }
        if let Some(provider) = self.custom.get(name) {
            return provider(ctx);
        }

        let (head, rest) = match name.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (name, None),
        };

        match (head, rest) {
            ("now", variant) => clock::format_now(self.clock.now(), variant),
            ("faker", Some(key)) => self.faker.generate(key),
            ("request", Some(field)) => ctx.request.and_then(|r| r.lookup(field)),
            _ => None,
        }
    }
}
