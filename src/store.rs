//! `DataStore`: the caller-facing façade binding a backend to a format.

use std::sync::Arc;

use serde_json::Value;

use crate::auth::{LoginOptions, UserProfile};
use crate::backend::{Backend, Capabilities, PutOutcome};
use crate::error::{Result, StoreError};
use crate::format::{Format, FormatOptions, Json};
use crate::permissions::{Permission, PermissionSet};

/// A resolved backend plus a serialization format.
///
/// Operations against one store are not internally serialized: overlapping
/// `store()` calls race, and ordering is the caller's responsibility (the
/// usual pattern is debounced autosave).
pub struct DataStore {
    backend: Box<dyn Backend>,
    format: Arc<dyn Format>,
    format_options: FormatOptions,
}

impl DataStore {
    /// Wrap a backend with the built-in JSON format.
    pub fn new(backend: Box<dyn Backend>) -> Self {
        Self {
            backend,
            format: Arc::new(Json),
            format_options: FormatOptions::default(),
        }
    }

    pub fn with_format(mut self, format: Arc<dyn Format>) -> Self {
        self.format = format;
        self
    }

    pub fn with_format_options(mut self, options: FormatOptions) -> Self {
        self.format_options = options;
        self
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    pub fn permissions(&self) -> &PermissionSet {
        self.backend.permissions()
    }

    /// Read and parse the stored data. A source that does not exist yet is
    /// a valid empty state and loads as `Value::Null`.
    pub async fn load(&self) -> Result<Value> {
        self.backend.ready().await?;
        match self.backend.get().await? {
            Some(raw) => self.format.parse(&raw, &self.format_options),
            None => Ok(Value::Null),
        }
    }

    /// Serialize and write `data`. Gated on the backend's declared write
    /// capability and the `save` (or `edit`) permission before any request
    /// is attempted.
    pub async fn store(&self, data: &Value) -> Result<PutOutcome> {
        self.check_capability(|caps| caps.put)?;
        self.backend.ready().await?;
        self.check_permission(Permission::Save)?;
        let raw = self.format.stringify(data, &self.format_options)?;
        self.backend.put(Some(&raw)).await
    }

    /// Delete the stored data.
    pub async fn clear(&self) -> Result<PutOutcome> {
        self.check_capability(|caps| caps.put)?;
        self.backend.ready().await?;
        self.check_permission(Permission::Delete)?;
        self.backend.put(None).await
    }

    /// Store a binary object under `path`, returning its public URL.
    pub async fn upload(&self, bytes: Vec<u8>, path: &str) -> Result<String> {
        self.check_capability(|caps| caps.upload)?;
        self.backend.ready().await?;
        self.check_permission(Permission::Add)?;
        self.backend.upload(bytes, path).await
    }

    /// Class-level capability gate; holds before any I/O.
    fn check_capability(&self, allowed: impl Fn(&Capabilities) -> bool) -> Result<()> {
        if allowed(&self.backend.descriptor().capabilities) {
            Ok(())
        } else {
            Err(StoreError::UnsupportedOperation(
                self.backend.messages().get("read-only").to_string(),
            ))
        }
    }

    /// Instance permission gate; checked after `ready()` so passive login
    /// has had its chance to grant write access.
    fn check_permission(&self, action: Permission) -> Result<()> {
        let permissions = self.backend.permissions();
        if permissions.can(action) || permissions.can(Permission::Edit) {
            Ok(())
        } else {
            Err(StoreError::Permission {
                action,
                message: self.backend.messages().get("login-to-edit").to_string(),
            })
        }
    }

    /// Active login against the backend's provider. Backends without auth
    /// resolve to `Ok(None)` without any I/O.
    pub async fn login(&self) -> Result<Option<UserProfile>> {
        if !self.backend.descriptor().capabilities.auth {
            return Ok(None);
        }
        self.backend.ready().await?;
        self.backend.login(LoginOptions::default()).await
    }

    pub async fn logout(&self) -> Result<()> {
        self.backend.logout().await
    }
}

impl std::fmt::Debug for DataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataStore")
            .field("backend", &self.backend.descriptor().name)
            .field("source", &self.backend.source())
            .field("format", &self.format.name())
            .finish()
    }
}
