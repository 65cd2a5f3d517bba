//! GitHub adapters.
//!
//! Two classes share the `github` OAuth app and therefore one cached
//! token: the file adapter (repository contents API) and a read-only REST
//! sibling for `api.github.com` URLs.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::Method;
use serde_json::json;
use tracing::debug;
use url::Url;

use crate::auth::{
    AuthDelegate, AuthError, AuthSession, LoginOptions, SessionSpec, UserProfile,
};
use crate::error::{Result, StoreError};
use crate::matcher::{MatchRule, UrlPattern};
use crate::permissions::{Permission, PermissionSet};
use crate::registry::BackendKind;

use super::http::{bearer_headers, shared_client, ApiClient, RequestOptions};
use super::{
    Backend, BackendDescriptor, BackendOptions, Capabilities, Messages, PutOutcome, ReadyGate,
    ResolvedSource, StoreContext,
};

const PROVIDER: &str = "github";
const API_BASE: &str = "https://api.github.com/";
const AUTHORIZE_ENDPOINT: &str = "https://github.com/login/oauth/authorize";

static FILE_DESCRIPTOR: BackendDescriptor = BackendDescriptor {
    name: "github",
    provider: Some(PROVIDER),
    capabilities: Capabilities {
        auth: true,
        put: true,
        upload: true,
    },
    defaults: &[("repo", "mv-data"), ("path", "data.json")],
};

static API_DESCRIPTOR: BackendDescriptor = BackendDescriptor {
    name: "github-api",
    provider: Some(PROVIDER),
    capabilities: Capabilities {
        auth: true,
        put: false,
        upload: false,
    },
    defaults: &[],
};

static PROVIDER_MESSAGES: &[(&str, &str)] = &[(
    "session-expired",
    "Your GitHub session has expired, please log in again",
)];

static FILE_MESSAGES: Messages = Messages::new(
    &[(
        "login-to-edit",
        "Log in to GitHub to save changes to this repository",
    )],
    PROVIDER_MESSAGES,
);

static API_MESSAGES: Messages = Messages::new(&[], PROVIDER_MESSAGES);

/// File adapter class. Match rules, most specific first.
pub fn kind() -> BackendKind {
    BackendKind::new(
        FILE_DESCRIPTOR.clone(),
        vec![
            MatchRule::Pattern(UrlPattern::new(
                "https",
                "github.com",
                "/{owner}/{repo}/blob/{branch}/{path...}",
            )),
            MatchRule::Pattern(UrlPattern::new("https", "github.com", "/{owner}/{repo}")),
            MatchRule::Pattern(UrlPattern::new("https", "github.com", "")),
            MatchRule::Pattern(UrlPattern::new(
                "https",
                "raw.githubusercontent.com",
                "/{owner}/{repo}/{branch}/{path...}",
            )),
        ],
        |source, options, context| {
            Ok(Box::new(GithubFile::from_source(&source, options, context)?))
        },
    )
}

/// Raw REST adapter class. Registered before the file adapter so
/// `api.github.com` never falls through to repository matching.
pub fn api_kind() -> BackendKind {
    BackendKind::new(
        API_DESCRIPTOR.clone(),
        vec![MatchRule::Pattern(UrlPattern::new(
            "https",
            "api.github.com",
            "/{endpoint...}",
        ))],
        |source, _options, context| Ok(Box::new(GithubApi::from_source(&source, context)?)),
    )
}

/// Structured decomposition of a GitHub source URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GithubRef {
    /// Unset until given in the URL or resolved from the logged-in user.
    pub owner: Option<String>,
    pub repo: String,
    /// Unset means the repository's default branch.
    pub branch: Option<String>,
    pub path: String,
}

impl GithubRef {
    fn from_source(source: &ResolvedSource, options: &BackendOptions) -> Self {
        let field = |name: &str| -> Option<String> {
            options
                .extra
                .get(name)
                .cloned()
                .or_else(|| source.capture(name).map(String::from))
        };
        Self {
            owner: field("owner"),
            repo: field("repo")
                .unwrap_or_else(|| FILE_DESCRIPTOR.default_for("repo").unwrap_or_default().into()),
            branch: field("branch"),
            path: field("path")
                .unwrap_or_else(|| FILE_DESCRIPTOR.default_for("path").unwrap_or_default().into()),
        }
    }
}

fn github_session(source: &ResolvedSource, context: &StoreContext, permissions: &PermissionSet) -> Arc<AuthSession> {
    Arc::new(AuthSession::new(
        SessionSpec::builder()
            .provider(PROVIDER.into())
            .authorize_endpoint(
                Url::parse(AUTHORIZE_ENDPOINT).expect("valid authorize endpoint"),
            )
            .maybe_client_id(context.config.client_id(PROVIDER))
            .origin(source.raw.clone())
            .store(context.store.clone())
            .prompt(context.prompt.clone())
            .permissions(permissions.clone())
            .build(),
    ))
}

fn github_api_base(context: &StoreContext) -> Result<Url> {
    let base = context
        .config
        .api_base(PROVIDER)
        .unwrap_or_else(|| API_BASE.to_string());
    Url::parse(&base).map_err(|e| StoreError::Configuration(e.to_string()))
}

/// Fetch the user behind a token. 401/403 maps to `TokenRejected` — the
/// normal session-expiry signal the session machine recovers from.
async fn fetch_github_user(api_base: &Url, token: &str) -> std::result::Result<UserProfile, AuthError> {
    let url = api_base
        .join("user")
        .map_err(|e| AuthError::InvalidResponse(e.to_string()))?;
    let response = shared_client()
        .get(url)
        .headers(bearer_headers(Some(token)))
        .send()
        .await?;
    match response.status().as_u16() {
        200 => {
            let value: serde_json::Value = response.json().await?;
            let text = |field: &str| value.get(field).and_then(|v| v.as_str()).map(String::from);
            Ok(UserProfile {
                username: text("login").unwrap_or_default(),
                name: text("name"),
                avatar: text("avatar_url"),
                url: text("html_url"),
            })
        }
        401 | 403 => Err(AuthError::TokenRejected),
        status => Err(AuthError::InvalidResponse(format!(
            "unexpected status {status} fetching user"
        ))),
    }
}

/// Repository file storage via the contents API.
pub struct GithubFile {
    source: String,
    reference: GithubRef,
    api: ApiClient,
    api_base: Url,
    session: Arc<AuthSession>,
    permissions: PermissionSet,
    ready: ReadyGate,
    /// Blob sha captured from reads, replayed on writes.
    sha: RwLock<Option<String>>,
}

impl GithubFile {
    fn from_source(
        source: &ResolvedSource,
        options: &BackendOptions,
        context: &StoreContext,
    ) -> Result<Self> {
        let permissions =
            PermissionSet::with_granted(&[Permission::Read, Permission::Login]);
        let session = github_session(source, context, &permissions);
        let api_base = github_api_base(context)?;
        let api = ApiClient::new(api_base.clone())
            .with_session(session.clone())
            .with_header("Accept", "application/vnd.github.v3+json");
        Ok(Self {
            source: source.raw.clone(),
            reference: GithubRef::from_source(source, options),
            api,
            api_base,
            session,
            permissions,
            ready: ReadyGate::new(),
            sha: RwLock::new(None),
        })
    }

    pub fn reference(&self) -> &GithubRef {
        &self.reference
    }

    fn resolved_owner(&self) -> Result<String> {
        if let Some(owner) = &self.reference.owner {
            return Ok(owner.clone());
        }
        if let Some(user) = self.session.user() {
            return Ok(user.username);
        }
        Err(StoreError::Configuration(
            "no repository owner: specify one in the URL or log in".into(),
        ))
    }

    fn contents_endpoint(&self) -> Result<String> {
        let owner = self.resolved_owner()?;
        Ok(format!(
            "repos/{owner}/{}/contents/{}",
            self.reference.repo, self.reference.path
        ))
    }

    fn cached_sha(&self) -> Option<String> {
        self.sha.read().expect("sha lock poisoned").clone()
    }

    fn remember_sha(&self, sha: Option<String>) {
        *self.sha.write().expect("sha lock poisoned") = sha;
    }

    /// A 401 on an authenticated request means the cached token went stale
    /// mid-operation: log out locally, then re-raise as "log in again".
    fn reclassify(&self, error: StoreError) -> StoreError {
        if error.status() == Some(401) {
            if let Err(cleanup) = self.session.expire() {
                return cleanup.into();
            }
            return StoreError::SessionExpired(
                self.messages().get("session-expired").to_string(),
            );
        }
        error
    }

    fn branch_body(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut body = serde_json::Map::new();
        if let Some(branch) = &self.reference.branch {
            body.insert("branch".into(), json!(branch));
        }
        body
    }

    /// Read the file, caching its blob sha for later writes.
    async fn read_contents(&self) -> Result<Option<String>> {
        let endpoint = self.contents_endpoint()?;
        let query = self
            .reference
            .branch
            .as_ref()
            .map(|branch| json!({ "ref": branch }));
        match self
            .api
            .request(&endpoint, query, Method::GET, RequestOptions::default())
            .await
        {
            Ok(response) => {
                let value = response.into_json()?;
                self.remember_sha(
                    value.get("sha").and_then(|v| v.as_str()).map(String::from),
                );
                let encoded = value
                    .get("content")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default();
                let stripped: String =
                    encoded.chars().filter(|c| !c.is_whitespace()).collect();
                let bytes = STANDARD.decode(stripped).map_err(|e| {
                    StoreError::UnsupportedOperation(format!("undecodable content: {e}"))
                })?;
                Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
            }
            Err(error) if error.status() == Some(404) => {
                self.remember_sha(None);
                Ok(None)
            }
            Err(error) => Err(self.reclassify(error)),
        }
    }

    /// Probe push access and grant write permissions accordingly. Failures
    /// here never fail a login; they just leave the instance read-only.
    async fn confirm_write_access(&self) {
        let Ok(owner) = self.resolved_owner() else {
            return;
        };
        let endpoint = format!("repos/{owner}/{}", self.reference.repo);
        let push = match self
            .api
            .request(&endpoint, None, Method::GET, RequestOptions::default())
            .await
        {
            Ok(response) => response
                .into_json()
                .ok()
                .and_then(|v| {
                    v.get("permissions")
                        .and_then(|p| p.get("push"))
                        .and_then(|p| p.as_bool())
                })
                .unwrap_or(false),
            // Repository doesn't exist yet: it will be created on first
            // save, which the owner can always do.
            Err(error) if error.status() == Some(404) => true,
            Err(error) => {
                debug!(%error, "could not probe repository permissions");
                false
            }
        };
        if push {
            self.permissions.apply(&[
                (Permission::Edit, true),
                (Permission::Save, true),
                (Permission::Add, true),
                (Permission::Delete, true),
            ]);
        }
    }
}

#[async_trait]
impl AuthDelegate for GithubFile {
    async fn fetch_user(&self, token: &str) -> std::result::Result<UserProfile, AuthError> {
        fetch_github_user(&self.api_base, token).await
    }

    fn oauth_params(&self) -> Vec<(String, String)> {
        vec![("scope".into(), "repo".into())]
    }
}

#[async_trait]
impl Backend for GithubFile {
    fn descriptor(&self) -> &BackendDescriptor {
        &FILE_DESCRIPTOR
    }

    fn source(&self) -> &str {
        &self.source
    }

    fn permissions(&self) -> &PermissionSet {
        &self.permissions
    }

    fn session(&self) -> Option<&Arc<AuthSession>> {
        Some(&self.session)
    }

    fn messages(&self) -> &Messages {
        &FILE_MESSAGES
    }

    async fn ready(&self) -> Result<()> {
        self.ready
            .ensure(|| async {
                if self
                    .session
                    .login(self, LoginOptions::passive())
                    .await?
                    .is_some()
                {
                    self.confirm_write_access().await;
                }
                Ok(())
            })
            .await
    }

    fn update(&mut self, source: &ResolvedSource, options: &BackendOptions) -> Result<()> {
        self.reference = GithubRef::from_source(source, options);
        self.source = source.raw.clone();
        self.remember_sha(None);
        Ok(())
    }

    async fn get(&self) -> Result<Option<String>> {
        self.ready().await?;
        self.read_contents().await
    }

    async fn put(&self, data: Option<&str>) -> Result<PutOutcome> {
        self.ready().await?;
        let endpoint = self.contents_endpoint()?;

        // Writes need the current blob sha; resolve it if we never read.
        if self.cached_sha().is_none() {
            self.read_contents().await?;
        }
        let sha = self.cached_sha();

        match data {
            Some(data) => {
                let (outcome, verb) = if sha.is_some() {
                    (PutOutcome::Update, "Update")
                } else {
                    (PutOutcome::Create, "Create")
                };
                let mut body = self.branch_body();
                body.insert(
                    "message".into(),
                    json!(format!("{verb} {}", self.reference.path)),
                );
                body.insert("content".into(), json!(STANDARD.encode(data)));
                if let Some(sha) = sha {
                    body.insert("sha".into(), json!(sha));
                }
                let response = self
                    .api
                    .request(
                        &endpoint,
                        Some(body.into()),
                        Method::PUT,
                        RequestOptions::default(),
                    )
                    .await
                    .map_err(|e| self.reclassify(e))?;
                let value = response.into_json()?;
                self.remember_sha(
                    value
                        .get("content")
                        .and_then(|c| c.get("sha"))
                        .and_then(|s| s.as_str())
                        .map(String::from),
                );
                Ok(outcome)
            }
            None => {
                let Some(sha) = sha else {
                    return Err(StoreError::NotFound(
                        self.messages().get("not-found").to_string(),
                    ));
                };
                let mut body = self.branch_body();
                body.insert(
                    "message".into(),
                    json!(format!("Delete {}", self.reference.path)),
                );
                body.insert("sha".into(), json!(sha));
                self.api
                    .request(
                        &endpoint,
                        Some(body.into()),
                        Method::DELETE,
                        RequestOptions::default(),
                    )
                    .await
                    .map_err(|e| self.reclassify(e))?;
                self.remember_sha(None);
                Ok(PutOutcome::Delete)
            }
        }
    }

    async fn upload(&self, bytes: Vec<u8>, path: &str) -> Result<String> {
        self.ready().await?;
        let owner = self.resolved_owner()?;
        let endpoint = format!(
            "repos/{owner}/{}/contents/{path}",
            self.reference.repo
        );
        let mut body = self.branch_body();
        body.insert("message".into(), json!(format!("Upload {path}")));
        body.insert("content".into(), json!(STANDARD.encode(&bytes)));
        let response = self
            .api
            .request(
                &endpoint,
                Some(body.into()),
                Method::PUT,
                RequestOptions::default(),
            )
            .await
            .map_err(|e| self.reclassify(e))?;
        let value = response.into_json()?;
        if let Some(url) = value
            .get("content")
            .and_then(|c| c.get("download_url"))
            .and_then(|u| u.as_str())
        {
            return Ok(url.to_string());
        }
        let branch = self.reference.branch.as_deref().unwrap_or("HEAD");
        Ok(format!(
            "https://raw.githubusercontent.com/{owner}/{}/{branch}/{path}",
            self.reference.repo
        ))
    }

    async fn login(&self, options: LoginOptions) -> Result<Option<UserProfile>> {
        let user = self.session.login(self, options).await?;
        if user.is_some() {
            self.confirm_write_access().await;
        }
        Ok(user)
    }

    async fn logout(&self) -> Result<()> {
        self.session.logout()?;
        Ok(())
    }
}

/// Read-only REST adapter: the source URL's path *is* the endpoint,
/// resolved against the configured API base.
pub struct GithubApi {
    source: String,
    endpoint: String,
    api: ApiClient,
    api_base: Url,
    session: Arc<AuthSession>,
    permissions: PermissionSet,
    ready: ReadyGate,
}

impl GithubApi {
    fn from_source(source: &ResolvedSource, context: &StoreContext) -> Result<Self> {
        let permissions =
            PermissionSet::with_granted(&[Permission::Read, Permission::Login]);
        let session = github_session(source, context, &permissions);
        let api_base = github_api_base(context)?;
        let api = ApiClient::new(api_base.clone())
            .with_session(session.clone())
            .with_header("Accept", "application/vnd.github.v3+json");
        Ok(Self {
            source: source.raw.clone(),
            endpoint: api_endpoint(&source.url),
            api,
            api_base,
            session,
            permissions,
            ready: ReadyGate::new(),
        })
    }
}

fn api_endpoint(url: &Url) -> String {
    let path = url.path().trim_start_matches('/');
    match url.query() {
        Some(query) => format!("{path}?{query}"),
        None => path.to_string(),
    }
}

#[async_trait]
impl AuthDelegate for GithubApi {
    async fn fetch_user(&self, token: &str) -> std::result::Result<UserProfile, AuthError> {
        fetch_github_user(&self.api_base, token).await
    }
}

#[async_trait]
impl Backend for GithubApi {
    fn descriptor(&self) -> &BackendDescriptor {
        &API_DESCRIPTOR
    }

    fn source(&self) -> &str {
        &self.source
    }

    fn permissions(&self) -> &PermissionSet {
        &self.permissions
    }

    fn session(&self) -> Option<&Arc<AuthSession>> {
        Some(&self.session)
    }

    fn messages(&self) -> &Messages {
        &API_MESSAGES
    }

    async fn ready(&self) -> Result<()> {
        self.ready
            .ensure(|| async {
                self.session.login(self, LoginOptions::passive()).await?;
                Ok(())
            })
            .await
    }

    fn update(&mut self, source: &ResolvedSource, _options: &BackendOptions) -> Result<()> {
        self.endpoint = api_endpoint(&source.url);
        self.source = source.raw.clone();
        Ok(())
    }

    async fn get(&self) -> Result<Option<String>> {
        self.ready().await?;
        match self
            .api
            .request(&self.endpoint, None, Method::GET, RequestOptions::default())
            .await
        {
            Ok(response) => Ok(Some(response.into_json()?.to_string())),
            Err(error) if error.status() == Some(404) => Ok(None),
            Err(error) if error.status() == Some(401) => {
                self.session.expire()?;
                Err(StoreError::SessionExpired(
                    self.messages().get("session-expired").to_string(),
                ))
            }
            Err(error) => Err(error),
        }
    }

    async fn login(&self, options: LoginOptions) -> Result<Option<UserProfile>> {
        Ok(self.session.login(self, options).await?)
    }

    async fn logout(&self) -> Result<()> {
        self.session.logout()?;
        Ok(())
    }
}
