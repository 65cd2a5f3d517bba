//! Integration tests for backend resolution: first-match-wins ordering,
//! explicit kind selection, identity-preserving reuse, and the passthrough
//! fallback.

use anystore::backend::{Backend, BackendDescriptor, BackendOptions, Capabilities, StoreContext};
use anystore::error::StoreError;
use anystore::matcher::MatchRule;
use anystore::registry::{BackendKind, BackendRegistry};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn default_registry() -> BackendRegistry {
    BackendRegistry::with_defaults(StoreContext::ephemeral())
}

fn resolve_name(registry: &BackendRegistry, source: &str) -> Option<&'static str> {
    let url = url::Url::parse(source).unwrap();
    registry
        .resolve(&url, &BackendOptions::default())
        .map(|kind| kind.name())
}

/// A kind that matches everything but can never be constructed; resolution
/// tests stop before construction.
fn unconstructable(name: &'static str) -> BackendKind {
    BackendKind::new(
        BackendDescriptor {
            name,
            provider: None,
            capabilities: Capabilities::default(),
            defaults: &[],
        },
        vec![MatchRule::predicate(|_, _| true)],
        |_, _, _| Err(StoreError::UnsupportedOperation("test kind".into())),
    )
}

fn instance_ptr(backend: &dyn Backend) -> *const () {
    backend as *const dyn Backend as *const ()
}

// ---------------------------------------------------------------------------
// 1. Resolution order
// ---------------------------------------------------------------------------

#[test]
fn resolution_is_deterministic() {
    let registry = default_registry();
    for _ in 0..10 {
        assert_eq!(
            resolve_name(&registry, "https://github.com/foo/bar/blob/main/baz.json"),
            Some("github")
        );
    }
}

#[test]
fn first_registered_kind_wins_on_overlap() {
    let context = StoreContext::ephemeral();
    let mut registry = BackendRegistry::new(context);
    registry.register(unconstructable("broad"));
    registry.register(unconstructable("narrow"));
    assert_eq!(
        resolve_name(&registry, "https://example.com/anything"),
        Some("broad")
    );
}

#[test]
fn default_order_is_documented_and_stable() {
    let registry = default_registry();
    assert_eq!(
        registry.names(),
        vec!["local", "github-api", "github", "http"]
    );
}

#[test]
fn api_urls_do_not_fall_through_to_the_file_adapter() {
    let registry = default_registry();
    assert_eq!(
        resolve_name(&registry, "https://api.github.com/repos/foo/bar/issues"),
        Some("github-api")
    );
}

#[test]
fn unmatched_http_urls_fall_back_to_passthrough() {
    let registry = default_registry();
    assert_eq!(
        resolve_name(&registry, "https://example.com/data.json"),
        Some("http")
    );
}

#[test]
fn unsupported_scheme_resolves_to_none() {
    let registry = default_registry();
    assert_eq!(resolve_name(&registry, "ftp://example.com/data.json"), None);
    let created = registry
        .create("ftp://example.com/data.json", BackendOptions::default())
        .unwrap();
    assert!(created.is_none());
}

#[test]
fn unparseable_source_is_non_fatal() {
    let registry = default_registry();
    let created = registry
        .create("not a url at all", BackendOptions::default())
        .unwrap();
    assert!(created.is_none());
}

// ---------------------------------------------------------------------------
// 2. Explicit kind selection
// ---------------------------------------------------------------------------

#[test]
fn explicit_kind_bypasses_matching() {
    let registry = default_registry();
    let backend = registry
        .create(
            "https://example.com/would-be-passthrough",
            BackendOptions::builder().kind("github".into()).build(),
        )
        .unwrap()
        .unwrap();
    assert_eq!(backend.descriptor().name, "github");
}

#[test]
fn explicit_kind_is_case_insensitive() {
    let registry = default_registry();
    let backend = registry
        .create(
            "https://example.com/x",
            BackendOptions::builder().kind("GitHub".into()).build(),
        )
        .unwrap()
        .unwrap();
    assert_eq!(backend.descriptor().name, "github");
}

#[test]
fn unknown_explicit_kind_resolves_to_none() {
    let registry = default_registry();
    let created = registry
        .create(
            "https://example.com/x",
            BackendOptions::builder().kind("no-such-kind".into()).build(),
        )
        .unwrap();
    assert!(created.is_none());
}

// ---------------------------------------------------------------------------
// 3. Identity-preserving reuse
// ---------------------------------------------------------------------------

#[test]
fn existing_instance_of_same_class_is_updated_in_place() {
    let registry = default_registry();
    let first = registry
        .create(
            "https://github.com/foo/bar/blob/main/baz.json",
            BackendOptions::default(),
        )
        .unwrap()
        .unwrap();
    let ptr = instance_ptr(first.as_ref());

    let reused = registry
        .create(
            "https://github.com/foo/bar/blob/main/other.json",
            BackendOptions::builder().existing(first).build(),
        )
        .unwrap()
        .unwrap();
    assert_eq!(instance_ptr(reused.as_ref()), ptr);
    assert_eq!(
        reused.source(),
        "https://github.com/foo/bar/blob/main/other.json"
    );
}

#[test]
fn existing_instance_of_different_class_is_replaced() {
    let registry = default_registry();
    let local = registry
        .create("local:foo", BackendOptions::default())
        .unwrap()
        .unwrap();
    let ptr = instance_ptr(local.as_ref());

    let fresh = registry
        .create(
            "https://github.com/foo/bar/blob/main/baz.json",
            BackendOptions::builder().existing(local).build(),
        )
        .unwrap()
        .unwrap();
    assert_eq!(fresh.descriptor().name, "github");
    assert_ne!(instance_ptr(fresh.as_ref()), ptr);
}

// ---------------------------------------------------------------------------
// 4. Example scenarios
// ---------------------------------------------------------------------------

#[test]
fn github_blob_urls_resolve_to_the_file_adapter() {
    let registry = default_registry();
    let backend = registry
        .create(
            "https://github.com/foo/bar/blob/main/baz.json",
            BackendOptions::default(),
        )
        .unwrap()
        .unwrap();
    assert_eq!(backend.descriptor().name, "github");
}

#[test]
fn bare_github_url_resolves_with_declared_defaults() {
    let registry = default_registry();
    let backend = registry
        .create("https://github.com", BackendOptions::default())
        .unwrap()
        .unwrap();
    assert_eq!(backend.descriptor().name, "github");
    assert_eq!(backend.descriptor().default_for("repo"), Some("mv-data"));
    assert_eq!(backend.descriptor().default_for("path"), Some("data.json"));
}

#[test]
fn local_urls_resolve_to_the_local_adapter() {
    let registry = default_registry();
    let backend = registry
        .create("local:foo", BackendOptions::default())
        .unwrap()
        .unwrap();
    assert_eq!(backend.descriptor().name, "local");
    assert_eq!(backend.source(), "local:foo");
}
