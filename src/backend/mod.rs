//! The adapter contract and shared backend infrastructure.

pub mod github;
pub mod http;
pub mod local;
pub mod messages;
pub mod passthrough;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bon::Builder;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use url::Url;

use crate::auth::{
    AuthPrompt, AuthSession, KeyValueStore, LoginOptions, MemoryStore, NoUiPrompt, UserProfile,
};
use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::permissions::PermissionSet;

pub use http::{ApiClient, ApiResponse, RequestOptions, ResponseKind};
pub use messages::Messages;

/// Capability flags a backend declares at the class level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub auth: bool,
    pub put: bool,
    pub upload: bool,
}

/// Static identity of an adapter class.
#[derive(Debug, Clone)]
pub struct BackendDescriptor {
    /// Registry name, also used for explicit `kind` selection.
    pub name: &'static str,
    /// Authentication-provider identity. Sibling adapters that share an
    /// OAuth app declare the same value and thereby share a cached token.
    pub provider: Option<&'static str>,
    pub capabilities: Capabilities,
    /// Default values for ref fields the source URL leaves unset.
    pub defaults: &'static [(&'static str, &'static str)],
}

impl BackendDescriptor {
    pub fn default_for(&self, field: &str) -> Option<&'static str> {
        self.defaults
            .iter()
            .find(|(name, _)| *name == field)
            .map(|(_, value)| *value)
    }
}

/// A source URL after resolution: parsed, with the named captures produced
/// by the winning match rule.
#[derive(Debug, Clone)]
pub struct ResolvedSource {
    pub url: Url,
    pub raw: String,
    pub captures: HashMap<String, String>,
}

impl ResolvedSource {
    pub fn capture(&self, name: &str) -> Option<&str> {
        self.captures.get(name).map(String::as_str)
    }
}

/// Outcome of a `put` operation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PutOutcome {
    Create,
    Update,
    Delete,
}

/// Caller-supplied options for resolution and construction.
#[derive(Builder, Default)]
pub struct BackendOptions {
    /// Select an adapter by name, bypassing URL matching (case-insensitive).
    pub kind: Option<String>,
    /// An instance to reuse: when its class matches the resolved class, it
    /// is updated in place and returned with its auth state intact.
    pub existing: Option<Box<dyn Backend>>,
    /// Instance options overriding the adapter's declared defaults.
    #[builder(default)]
    pub extra: HashMap<String, String>,
}

impl std::fmt::Debug for BackendOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendOptions")
            .field("kind", &self.kind)
            .field("existing", &self.existing.as_ref().map(|b| b.descriptor().name))
            .field("extra", &self.extra)
            .finish()
    }
}

/// Shared collaborators injected into every adapter instance.
#[derive(Clone)]
pub struct StoreContext {
    pub store: Arc<dyn KeyValueStore>,
    pub prompt: Arc<dyn AuthPrompt>,
    pub config: StoreConfig,
}

impl StoreContext {
    /// Ephemeral context: in-memory store, no interactive prompt, global
    /// config. Good for tests and passive-only use.
    pub fn ephemeral() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            prompt: Arc::new(NoUiPrompt),
            config: StoreConfig::global().clone(),
        }
    }

    pub fn new(
        store: Arc<dyn KeyValueStore>,
        prompt: Arc<dyn AuthPrompt>,
        config: StoreConfig,
    ) -> Self {
        Self {
            store,
            prompt,
            config,
        }
    }
}

/// One-shot gate that runs an async initializer the first time it is
/// awaited and retries on failure rather than poisoning the instance.
#[derive(Debug, Default)]
pub struct ReadyGate {
    cell: tokio::sync::OnceCell<()>,
}

impl ReadyGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn ensure<F, Fut>(&self, init: F) -> Result<()>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<()>>,
    {
        self.cell.get_or_try_init(init).await.map(|_| ())
    }
}

/// The contract every service adapter implements.
///
/// Construction is cheap and synchronous; I/O waits behind
/// [`ready()`](Backend::ready), which runs passive login for authenticating
/// adapters the first time any operation needs the backend.
#[async_trait]
pub trait Backend: Send + Sync {
    fn descriptor(&self) -> &BackendDescriptor;

    /// The resolved source URL this instance serves.
    fn source(&self) -> &str;

    fn permissions(&self) -> &PermissionSet;

    fn session(&self) -> Option<&Arc<AuthSession>> {
        None
    }

    fn messages(&self) -> &Messages;

    /// Await anything the adapter needs before serving requests.
    async fn ready(&self) -> Result<()> {
        Ok(())
    }

    /// Re-point this instance at a new source URL of the same class,
    /// preserving authentication state.
    fn update(&mut self, source: &ResolvedSource, options: &BackendOptions) -> Result<()>;

    /// Read the stored data. `Ok(None)` means "does not exist yet" — a
    /// valid empty state, not an error.
    async fn get(&self) -> Result<Option<String>>;

    /// Write (`Some`) or delete (`None`) the stored data.
    async fn put(&self, _data: Option<&str>) -> Result<PutOutcome> {
        Err(StoreError::UnsupportedOperation(format!(
            "{} is read-only",
            self.descriptor().name
        )))
    }

    /// Store a binary object under `path`, returning its public URL.
    async fn upload(&self, _bytes: Vec<u8>, _path: &str) -> Result<String> {
        Err(StoreError::UnsupportedOperation(format!(
            "{} does not support uploads",
            self.descriptor().name
        )))
    }

    async fn login(&self, _options: LoginOptions) -> Result<Option<UserProfile>> {
        Ok(None)
    }

    async fn logout(&self) -> Result<()> {
        Ok(())
    }

    /// Cached user info, if authenticated.
    fn user(&self) -> Option<UserProfile> {
        self.session().and_then(|s| s.user())
    }
}
