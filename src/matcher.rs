//! Structured URL patterns and match rules.
//!
//! A backend declares an ordered list of [`MatchRule`]s. A rule is either a
//! structured [`UrlPattern`] (protocol, hostname with wildcard subdomains,
//! path template with named captures) or an opaque predicate for shapes a
//! pattern cannot express. Patterns compile to regexes once, at
//! construction, and are reused for every test thereafter.

use std::collections::HashMap;
use std::sync::Arc;

use regex::Regex;
use url::Url;

use crate::backend::BackendOptions;

/// Matching expectation for a single query parameter.
#[derive(Debug, Clone)]
pub enum QueryMatch {
    /// The parameter must be present with any value.
    Present,
    /// The parameter must equal this value exactly.
    Equals(String),
    /// The parameter must be present; its value is captured under this name.
    Capture(String),
}

/// A structured URL pattern with named capture groups.
///
/// Path templates use `{name}` for a required segment, `{name?}` for an
/// optional trailing segment and `{name...}` for the required rest of the
/// path. Host templates accept `*` for any run of leading subdomain labels
/// and `{name}` to capture a single label.
#[derive(Debug, Clone)]
pub struct UrlPattern {
    protocol: String,
    host: Option<Regex>,
    path: Regex,
    query: Vec<(String, QueryMatch)>,
    fragment: Option<String>,
}

impl UrlPattern {
    /// Compile a pattern. Templates are adapter-authored constants, so a
    /// malformed template panics at registration rather than failing later.
    pub fn new(protocol: &str, host: &str, path_template: &str) -> Self {
        let host = if host.is_empty() {
            None
        } else {
            Some(compile_host(host))
        };
        Self {
            protocol: protocol.to_string(),
            host,
            path: compile_path(path_template),
            query: Vec::new(),
            fragment: None,
        }
    }

    /// Require a query parameter to match.
    pub fn with_query(mut self, key: &str, expectation: QueryMatch) -> Self {
        self.query.push((key.to_string(), expectation));
        self
    }

    /// Capture the URL fragment under `name` when present.
    pub fn with_fragment(mut self, name: &str) -> Self {
        self.fragment = Some(name.to_string());
        self
    }

    /// Whether `url` matches this pattern.
    pub fn test(&self, url: &Url) -> bool {
        self.captures(url).is_some()
    }

    /// Match `url`, returning the named captures, or `None` on mismatch.
    pub fn captures(&self, url: &Url) -> Option<HashMap<String, String>> {
        if url.scheme() != self.protocol {
            return None;
        }
        let mut fields = HashMap::new();

        match (&self.host, url.host_str()) {
            (Some(pattern), Some(host)) => {
                let caps = pattern.captures(host)?;
                collect_named(pattern, &caps, &mut fields);
            }
            (Some(_), None) => return None,
            (None, _) => {}
        }

        // Schemes like `local:` carry their payload in an opaque path with
        // no leading slash; normalize so one compiled form serves both.
        let path = if url.cannot_be_a_base() {
            format!("/{}", url.path())
        } else {
            url.path().to_string()
        };
        let caps = self.path.captures(&path)?;
        collect_named(&self.path, &caps, &mut fields);

        for (key, expectation) in &self.query {
            let value = url
                .query_pairs()
                .find(|(k, _)| k.as_ref() == key.as_str())
                .map(|(_, v)| v.into_owned());
            match (expectation, value) {
                (QueryMatch::Present, Some(_)) => {}
                (QueryMatch::Equals(expected), Some(actual)) if &actual == expected => {}
                (QueryMatch::Capture(name), Some(actual)) => {
                    fields.insert(name.clone(), actual);
                }
                _ => return None,
            }
        }

        if let Some(name) = &self.fragment {
            if let Some(fragment) = url.fragment() {
                fields.insert(name.clone(), fragment.to_string());
            }
        }

        Some(fields)
    }
}

/// A single entry in a backend's declared match list.
#[derive(Clone)]
pub enum MatchRule {
    Pattern(UrlPattern),
    Predicate(Arc<dyn Fn(&Url, &BackendOptions) -> bool + Send + Sync>),
}

impl std::fmt::Debug for MatchRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pattern(pattern) => f.debug_tuple("Pattern").field(pattern).finish(),
            Self::Predicate(_) => f.debug_tuple("Predicate").field(&"..").finish(),
        }
    }
}

impl MatchRule {
    pub fn predicate(
        test: impl Fn(&Url, &BackendOptions) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self::Predicate(Arc::new(test))
    }

    pub fn test(&self, url: &Url, options: &BackendOptions) -> bool {
        match self {
            Self::Pattern(pattern) => pattern.test(url),
            Self::Predicate(test) => test(url, options),
        }
    }

    /// Named captures for `url`. Predicates match without captures.
    pub fn captures(&self, url: &Url, options: &BackendOptions) -> Option<HashMap<String, String>> {
        match self {
            Self::Pattern(pattern) => pattern.captures(url),
            Self::Predicate(test) => test(url, options).then(HashMap::new),
        }
    }
}

fn compile_host(template: &str) -> Regex {
    let mut pattern = String::from("^");
    let mut needs_dot = false;
    for label in template.split('.') {
        if label == "*" {
            // One or more subdomain labels, dot included, so `*.x.io`
            // matches `a.x.io` and `a.b.x.io` alike.
            pattern.push_str("(?:[^.]+\\.)+");
            needs_dot = false;
            continue;
        }
        if needs_dot {
            pattern.push_str("\\.");
        }
        if let Some(name) = label.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            pattern.push_str(&format!("(?P<{name}>[^.]+)"));
        } else {
            pattern.push_str(&regex::escape(label));
        }
        needs_dot = true;
    }
    pattern.push('$');
    Regex::new(&pattern).expect("invalid host template")
}

fn compile_path(template: &str) -> Regex {
    let mut pattern = String::from("^");
    for segment in template.split('/').filter(|s| !s.is_empty()) {
        if let Some(inner) = segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            if let Some(name) = inner.strip_suffix("...") {
                pattern.push_str(&format!("/(?P<{name}>.+)"));
            } else if let Some(name) = inner.strip_suffix('?') {
                pattern.push_str(&format!("(?:/(?P<{name}>[^/]+))?"));
            } else {
                pattern.push_str(&format!("/(?P<{inner}>[^/]+)"));
            }
        } else {
            pattern.push('/');
            pattern.push_str(&regex::escape(segment));
        }
    }
    pattern.push_str("/?$");
    Regex::new(&pattern).expect("invalid path template")
}

fn collect_named(regex: &Regex, caps: &regex::Captures<'_>, out: &mut HashMap<String, String>) {
    for name in regex.capture_names().flatten() {
        if let Some(value) = caps.name(name) {
            out.insert(name.to_string(), value.as_str().to_string());
        }
    }
}
