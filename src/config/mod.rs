//! Configuration: per-provider OAuth client ids and API base overrides.
//!
//! Layered: explicit values set in code win over values read from the
//! environment. `GITHUB_CLIENT_ID=abc` configures the client id for
//! provider `github`; `GITHUB_API_BASE=https://ghe.corp/api/` overrides its
//! API domain.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

const CLIENT_ID_SUFFIX: &str = "_CLIENT_ID";
const API_BASE_SUFFIX: &str = "_API_BASE";

/// Global default config (lazy-initialized from env).
static DEFAULT_CONFIG: OnceLock<StoreConfig> = OnceLock::new();

/// Per-provider configuration, cheap to clone and share.
#[derive(Debug, Clone, Default)]
pub struct StoreConfig {
    client_ids: Arc<RwLock<HashMap<String, String>>>,
    api_bases: Arc<RwLock<HashMap<String, String>>>,
}

impl StoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from environment variables (`.env` honored if present).
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let config = Self::new();
        for (key, value) in std::env::vars() {
            if let Some(provider) = key.strip_suffix(CLIENT_ID_SUFFIX) {
                config.set_client_id(provider.to_lowercase(), value);
            } else if let Some(provider) = key.strip_suffix(API_BASE_SUFFIX) {
                config.set_api_base(provider.to_lowercase(), value);
            }
        }
        config
    }

    /// Process-wide default, initialized from env on first use.
    pub fn global() -> &'static StoreConfig {
        DEFAULT_CONFIG.get_or_init(Self::from_env)
    }

    pub fn set_client_id(&self, provider: impl Into<String>, client_id: impl Into<String>) {
        self.client_ids
            .write()
            .expect("config lock poisoned")
            .insert(provider.into().to_lowercase(), client_id.into());
    }

    pub fn client_id(&self, provider: &str) -> Option<String> {
        self.client_ids
            .read()
            .expect("config lock poisoned")
            .get(&provider.to_lowercase())
            .cloned()
    }

    pub fn set_api_base(&self, provider: impl Into<String>, base: impl Into<String>) {
        self.api_bases
            .write()
            .expect("config lock poisoned")
            .insert(provider.into().to_lowercase(), base.into());
    }

    pub fn api_base(&self, provider: &str) -> Option<String> {
        self.api_bases
            .read()
            .expect("config lock poisoned")
            .get(&provider.to_lowercase())
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_values_are_returned() {
        let config = StoreConfig::new();
        config.set_client_id("github", "abc123");
        assert_eq!(config.client_id("github").as_deref(), Some("abc123"));
        assert_eq!(config.client_id("dropbox"), None);
    }

    #[test]
    fn provider_lookup_is_case_insensitive() {
        let config = StoreConfig::new();
        config.set_client_id("GitHub", "abc123");
        assert_eq!(config.client_id("github").as_deref(), Some("abc123"));
    }

    #[test]
    fn api_base_override_is_separate_from_client_id() {
        let config = StoreConfig::new();
        config.set_api_base("github", "https://ghe.example.com/api/");
        assert_eq!(
            config.api_base("github").as_deref(),
            Some("https://ghe.example.com/api/")
        );
        assert_eq!(config.client_id("github"), None);
    }
}
