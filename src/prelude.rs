//! Convenience re-exports for common use.

pub use crate::auth::{
    AuthError, AuthEvent, AuthPrompt, AuthSession, KeyValueStore, LoginOptions, UserProfile,
};
pub use crate::backend::{
    Backend, BackendDescriptor, BackendOptions, Capabilities, PutOutcome, StoreContext,
};
pub use crate::config::StoreConfig;
pub use crate::error::{Result, StoreError};
pub use crate::format::{Format, FormatOptions, Json};
pub use crate::permissions::{Permission, PermissionChange, PermissionSet};
pub use crate::registry::{BackendKind, BackendRegistry};
pub use crate::store::DataStore;
