//! anystore — pluggable cloud data-store client
//!
//! Treat an arbitrary cloud service as a generic read/write data store,
//! selected purely by URL: a registry of adapters resolves the source, an
//! OAuth session authenticates it, and `load()`/`store()` move structured
//! data through a pluggable format.
//!
//! # Quick Start
//!
//! ```no_run
//! use anystore::prelude::*;
//!
//! # async fn example() -> anystore::error::Result<()> {
//! let registry = BackendRegistry::with_defaults(StoreContext::ephemeral());
//! let backend = registry
//!     .create("https://github.com/foo/bar/blob/main/baz.json", BackendOptions::default())?
//!     .expect("a backend resolves for github.com URLs");
//! let store = DataStore::new(backend);
//! let data = store.load().await?;
//! println!("{data}");
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod backend;
pub mod config;
pub mod error;
pub mod format;
pub mod matcher;
pub mod permissions;
pub mod prelude;
pub mod registry;
pub mod store;

pub use store::DataStore;
