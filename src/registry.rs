//! Backend registration and URL resolution.
//!
//! Resolution is first-match-wins in registration order. Order is the only
//! tie-break — an adapter with a broad pattern registered early shadows a
//! more specific one registered later, so the default order is documented
//! on [`BackendRegistry::with_defaults`] and guaranteed stable.

use std::collections::HashMap;
use std::sync::Arc;

use url::Url;

use crate::backend::{
    github, local, passthrough, Backend, BackendDescriptor, BackendOptions, ResolvedSource,
    StoreContext,
};
use crate::error::Result;
use crate::matcher::MatchRule;

type Constructor =
    Arc<dyn Fn(ResolvedSource, &BackendOptions, &StoreContext) -> Result<Box<dyn Backend>> + Send + Sync>;

/// An adapter "class": its static descriptor, declared match rules, and a
/// constructor. Rules are compiled once, here, and reused for every
/// resolution thereafter.
#[derive(Clone)]
pub struct BackendKind {
    pub descriptor: BackendDescriptor,
    pub rules: Vec<MatchRule>,
    constructor: Constructor,
}

impl BackendKind {
    pub fn new(
        descriptor: BackendDescriptor,
        rules: Vec<MatchRule>,
        constructor: impl Fn(ResolvedSource, &BackendOptions, &StoreContext) -> Result<Box<dyn Backend>>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            descriptor,
            rules,
            constructor: Arc::new(constructor),
        }
    }

    pub fn name(&self) -> &'static str {
        self.descriptor.name
    }

    /// Captures from the first rule matching `url`, or `None`.
    pub fn matches(&self, url: &Url, options: &BackendOptions) -> Option<HashMap<String, String>> {
        self.rules
            .iter()
            .find_map(|rule| rule.captures(url, options))
    }

    pub fn construct(
        &self,
        source: ResolvedSource,
        options: &BackendOptions,
        context: &StoreContext,
    ) -> Result<Box<dyn Backend>> {
        (self.constructor)(source, options, context)
    }
}

impl std::fmt::Debug for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendKind")
            .field("name", &self.descriptor.name)
            .field("rules", &self.rules.len())
            .finish()
    }
}

/// Ordered collection of adapter classes plus the shared context new
/// instances are constructed with.
pub struct BackendRegistry {
    kinds: Vec<BackendKind>,
    context: StoreContext,
}

impl BackendRegistry {
    /// Empty registry; nothing resolves until kinds are registered.
    pub fn new(context: StoreContext) -> Self {
        Self {
            kinds: Vec::new(),
            context,
        }
    }

    /// Registry with the built-in adapters, registered in this order:
    /// `local`, `github-api`, `github`, `http` (read-only passthrough,
    /// which absorbs any other http(s) URL and therefore goes last).
    pub fn with_defaults(context: StoreContext) -> Self {
        let mut registry = Self::new(context);
        registry.register(local::kind());
        registry.register(github::api_kind());
        registry.register(github::kind());
        registry.register(passthrough::kind());
        registry
    }

    /// Append an adapter class. Order is resolution priority.
    pub fn register(&mut self, kind: BackendKind) {
        self.kinds.push(kind);
    }

    /// Look an adapter class up by name, case-insensitively.
    pub fn kind(&self, name: &str) -> Option<&BackendKind> {
        self.kinds
            .iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(name))
    }

    /// Pick the adapter class for `url`: explicit `options.kind` bypasses
    /// matching; otherwise the first registered kind with a matching rule
    /// wins. `None` is the non-fatal "unsupported source" outcome.
    pub fn resolve(&self, url: &Url, options: &BackendOptions) -> Option<&BackendKind> {
        if let Some(name) = &options.kind {
            return self.kind(name);
        }
        self.kinds
            .iter()
            .find(|kind| kind.matches(url, options).is_some())
    }

    /// Resolve `source` and produce an instance.
    ///
    /// When `options.existing` holds an instance of the resolved class, it
    /// is updated in place and returned — same allocation, authentication
    /// state intact. An unparseable or unresolvable source yields
    /// `Ok(None)`.
    pub fn create(
        &self,
        source: &str,
        mut options: BackendOptions,
    ) -> Result<Option<Box<dyn Backend>>> {
        let url = match Url::parse(source) {
            Ok(url) => url,
            Err(_) => return Ok(None),
        };
        let Some(kind) = self.resolve(&url, &options) else {
            return Ok(None);
        };
        let captures = kind.matches(&url, &options).unwrap_or_default();
        let resolved = ResolvedSource {
            url,
            raw: source.to_string(),
            captures,
        };
        if let Some(mut existing) = options.existing.take() {
            if existing.descriptor().name == kind.descriptor.name {
                existing.update(&resolved, &options)?;
                return Ok(Some(existing));
            }
        }
        kind.construct(resolved, &options, &self.context).map(Some)
    }

    pub fn context(&self) -> &StoreContext {
        &self.context
    }

    /// Registered kind names, in resolution order.
    pub fn names(&self) -> Vec<&'static str> {
        self.kinds.iter().map(BackendKind::name).collect()
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("kinds", &self.names())
            .finish()
    }
}
