//! Read-only passthrough: any http(s) URL treated as a plain fetchable
//! resource. Registered last so it only absorbs what nothing else claims.

use async_trait::async_trait;
use reqwest::Method;

use crate::error::Result;
use crate::matcher::MatchRule;
use crate::permissions::{Permission, PermissionSet};
use crate::registry::BackendKind;

use super::http::{ApiClient, RequestOptions, ResponseKind};
use super::{
    Backend, BackendDescriptor, BackendOptions, Capabilities, Messages, ResolvedSource,
};

static DESCRIPTOR: BackendDescriptor = BackendDescriptor {
    name: "http",
    provider: None,
    capabilities: Capabilities {
        auth: false,
        put: false,
        upload: false,
    },
    defaults: &[],
};

static MESSAGES: Messages = Messages::generic();

pub fn kind() -> BackendKind {
    BackendKind::new(
        DESCRIPTOR.clone(),
        vec![MatchRule::predicate(|url, _| {
            matches!(url.scheme(), "http" | "https")
        })],
        |source, _options, _context| Ok(Box::new(Passthrough::new(source))),
    )
}

/// Plain fetch of the source URL itself.
pub struct Passthrough {
    source: String,
    api: ApiClient,
    permissions: PermissionSet,
}

impl Passthrough {
    fn new(source: ResolvedSource) -> Self {
        Self {
            api: ApiClient::new(source.url.clone()),
            source: source.raw,
            permissions: PermissionSet::with_granted(&[Permission::Read]),
        }
    }
}

#[async_trait]
impl Backend for Passthrough {
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
        self.api = ApiClient::new(source.url.clone());
        self.source = source.raw.clone();
        Ok(())
    }

    async fn get(&self) -> Result<Option<String>> {
        match self
            .api
            .request("", None, Method::GET, RequestOptions::kind(ResponseKind::Text))
            .await
        {
            Ok(response) => Ok(Some(response.into_text()?)),
            Err(error) if error.status() == Some(404) => Ok(None),
            Err(error) => Err(error),
        }
    }
}
