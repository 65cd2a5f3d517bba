//! `local:{key}` adapter: data lives in the injected key/value store.

use std::sync::Arc;

use async_trait::async_trait;

use crate::auth::{AuthError, KeyValueStore};
use crate::error::{Result, StoreError};
use crate::matcher::{MatchRule, UrlPattern};
use crate::permissions::{Permission, PermissionSet};
use crate::registry::BackendKind;

use super::{
    Backend, BackendDescriptor, BackendOptions, Capabilities, Messages, PutOutcome, ResolvedSource,
};

static DESCRIPTOR: BackendDescriptor = BackendDescriptor {
    name: "local",
    provider: None,
    capabilities: Capabilities {
        auth: false,
        put: true,
        upload: false,
    },
    defaults: &[],
};

static MESSAGES: Messages = Messages::generic();

pub fn kind() -> BackendKind {
    BackendKind::new(
        DESCRIPTOR.clone(),
        vec![MatchRule::Pattern(UrlPattern::new("local", "", "{key...}"))],
        |source, _options, context| {
            Ok(Box::new(Local::from_source(&source, context.store.clone())))
        },
    )
}

/// Key/value-backed store addressed as `local:{key}`.
pub struct Local {
    source: String,
    key: String,
    store: Arc<dyn KeyValueStore>,
    permissions: PermissionSet,
}

impl Local {
    fn from_source(source: &ResolvedSource, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            key: resolve_key(source),
            source: source.raw.clone(),
            store,
            permissions: PermissionSet::with_granted(&[
                Permission::Read,
                Permission::Edit,
                Permission::Add,
                Permission::Delete,
                Permission::Save,
            ]),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

fn resolve_key(source: &ResolvedSource) -> String {
    source
        .capture("key")
        .map(String::from)
        .unwrap_or_else(|| source.url.path().to_string())
}

fn storage_error(error: AuthError) -> StoreError {
    match error {
        AuthError::Storage(message) => StoreError::Io(std::io::Error::other(message)),
        other => StoreError::Authentication(other),
    }
}

#[async_trait]
impl Backend for Local {
    fn descriptor(&self) -> &BackendDescriptor {
        &DESCRIPTOR
    }

    fn source(&self) -> &str {
        &self.source
    }

    fn permissions(&self) -> &PermissionSet {
        &self.permissions
    }

    fn messages(&self) -> &Messages {
        &MESSAGES
    }

    fn update(&mut self, source: &ResolvedSource, _options: &BackendOptions) -> Result<()> {
        self.key = resolve_key(source);
        self.source = source.raw.clone();
        Ok(())
    }

    async fn get(&self) -> Result<Option<String>> {
        self.store.get(&self.key).map_err(storage_error)
    }

    async fn put(&self, data: Option<&str>) -> Result<PutOutcome> {
        match data {
            Some(data) => {
                let existed = self.store.get(&self.key).map_err(storage_error)?.is_some();
                self.store.set(&self.key, data).map_err(storage_error)?;
                Ok(if existed {
                    PutOutcome::Update
                } else {
                    PutOutcome::Create
                })
            }
            None => {
                self.store.remove(&self.key).map_err(storage_error)?;
                Ok(PutOutcome::Delete)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MemoryStore;
    use url::Url;

    fn local(key: &str) -> Local {
        let raw = format!("local:{key}");
        let source = ResolvedSource {
            url: Url::parse(&raw).unwrap(),
            raw,
            captures: [("key".to_string(), key.to_string())].into(),
        };
        Local::from_source(&source, Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn put_reports_create_then_update() {
        let backend = local("foo");
        assert_eq!(backend.put(Some("1")).await.unwrap(), PutOutcome::Create);
        assert_eq!(backend.put(Some("2")).await.unwrap(), PutOutcome::Update);
        assert_eq!(backend.get().await.unwrap().as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn put_none_deletes() {
        let backend = local("foo");
        backend.put(Some("1")).await.unwrap();
        assert_eq!(backend.put(None).await.unwrap(), PutOutcome::Delete);
        assert!(backend.get().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn absent_key_reads_none() {
        let backend = local("nothing-here");
        assert!(backend.get().await.unwrap().is_none());
    }

    #[test]
    fn local_grants_full_write_permissions() {
        let backend = local("foo");
        assert!(backend.permissions().can(Permission::Save));
        assert!(backend.permissions().can(Permission::Delete));
        assert!(!backend.permissions().can(Permission::Login));
    }
}
