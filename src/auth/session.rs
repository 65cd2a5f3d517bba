//! The login session state machine.
//!
//! One session per backend instance. Passive login uses only the cached
//! token and never opens UI; active login drives the popup handshake to
//! completion. At most one popup is ever in flight per session — concurrent
//! `login()` calls join the same attempt and settle with the same outcome.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use bon::Builder;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, warn};
use url::Url;

use crate::permissions::{Permission, PermissionSet};

use super::error::AuthError;
use super::handshake::{AuthPrompt, AuthorizeRequest, PopupHandle, StatePayload, WindowSpec};
use super::store::{token_key, KeyValueStore};

const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(300);

/// Authenticated user info, fetched once and cached for the session's life.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub username: String,
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub url: Option<String>,
}

/// Emitted on transitions into and out of `Authenticated`.
#[derive(Debug, Clone)]
pub enum AuthEvent {
    Login(UserProfile),
    Logout,
}

/// What an adapter contributes to its session's login flow.
#[async_trait]
pub trait AuthDelegate: Send + Sync {
    /// Validate a token by fetching the user behind it.
    ///
    /// A 401-equivalent must map to [`AuthError::TokenRejected`] — that is
    /// the normal "session expired" signal, not a fatal failure.
    async fn fetch_user(&self, token: &str) -> Result<UserProfile, AuthError>;

    /// Provider-specific extra parameters for the authorize URL.
    fn oauth_params(&self) -> Vec<(String, String)> {
        Vec::new()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LoginOptions {
    /// Use only cached credentials; never open UI.
    pub passive: bool,
}

impl LoginOptions {
    pub fn passive() -> Self {
        Self { passive: true }
    }
}

/// Construction parameters for [`AuthSession`].
#[derive(Builder)]
pub struct SessionSpec {
    /// Authentication-provider identity (shared across sibling adapters).
    pub provider: String,
    /// The provider's OAuth authorize endpoint.
    pub authorize_endpoint: Url,
    /// OAuth client id; may be absent until active login is attempted.
    pub client_id: Option<String>,
    /// Originating source URL, routed through the `state` payload.
    pub origin: String,
    pub store: Arc<dyn KeyValueStore>,
    pub prompt: Arc<dyn AuthPrompt>,
    pub permissions: PermissionSet,
}

#[derive(Debug, Default)]
struct SessionState {
    token: Option<String>,
    user: Option<UserProfile>,
}

type LoginOutcome = Result<UserProfile, AuthError>;

/// Per-instance authentication session.
pub struct AuthSession {
    provider: String,
    token_key: String,
    authorize_endpoint: Url,
    client_id: Option<String>,
    origin: String,
    store: Arc<dyn KeyValueStore>,
    prompt: Arc<dyn AuthPrompt>,
    permissions: PermissionSet,
    handshake_timeout: Duration,
    state: RwLock<SessionState>,
    inflight: Mutex<Option<broadcast::Sender<LoginOutcome>>>,
    events: broadcast::Sender<AuthEvent>,
}

impl AuthSession {
    pub fn new(spec: SessionSpec) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            token_key: token_key(&spec.provider),
            provider: spec.provider,
            authorize_endpoint: spec.authorize_endpoint,
            client_id: spec.client_id,
            origin: spec.origin,
            store: spec.store,
            prompt: spec.prompt,
            permissions: spec.permissions,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            state: RwLock::new(SessionState::default()),
            inflight: Mutex::new(None),
            events,
        }
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Store key this session reads and writes its token under.
    pub fn token_key(&self) -> &str {
        &self.token_key
    }

    pub fn access_token(&self) -> Option<String> {
        self.state.read().expect("session lock poisoned").token.clone()
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.state.read().expect("session lock poisoned").user.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.read().expect("session lock poisoned").token.is_some()
    }

    /// Subscribe to login/logout events.
    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    /// Drive a login attempt.
    ///
    /// Already authenticated → the cached user, no I/O. Passive → cached
    /// token only: absent resolves to `Ok(None)` silently, a rejected token
    /// is discarded from the store and also resolves to `Ok(None)`. Active →
    /// passive first, then the popup handshake.
    pub async fn login(
        &self,
        delegate: &dyn AuthDelegate,
        options: LoginOptions,
    ) -> Result<Option<UserProfile>, AuthError> {
        if let Some(user) = self.user() {
            return Ok(Some(user));
        }
        if let Some(user) = self.passive_login(delegate).await? {
            return Ok(Some(user));
        }
        if options.passive {
            return Ok(None);
        }
        self.active_login(delegate).await.map(Some)
    }

    async fn passive_login(
        &self,
        delegate: &dyn AuthDelegate,
    ) -> Result<Option<UserProfile>, AuthError> {
        let token = match self.store.get(&self.token_key)? {
            Some(token) => token,
            None => return Ok(None),
        };
        debug!(provider = %self.provider, "validating cached token");
        match delegate.fetch_user(&token).await {
            Ok(user) => {
                self.accept(token, user.clone());
                Ok(Some(user))
            }
            Err(AuthError::TokenRejected) => {
                // Normal session-expiry signal: drop the stale token, stay
                // unauthenticated, surface nothing.
                debug!(provider = %self.provider, "cached token rejected, discarding");
                self.store.remove(&self.token_key)?;
                Ok(None)
            }
            Err(other) => Err(other),
        }
    }

    async fn active_login(&self, delegate: &dyn AuthDelegate) -> Result<UserProfile, AuthError> {
        // Join an in-flight attempt instead of opening a second popup.
        let mut rx = {
            let mut slot = self.inflight.lock().await;
            if let Some(tx) = slot.as_ref() {
                tx.subscribe()
            } else {
                // An earlier attempt may have finished while we waited.
                if let Some(user) = self.user() {
                    return Ok(user);
                }
                let (tx, _) = broadcast::channel(1);
                *slot = Some(tx);
                drop(slot);

                let outcome = self.popup_flow(delegate).await;
                let mut slot = self.inflight.lock().await;
                if let Some(tx) = slot.take() {
                    let _ = tx.send(outcome.clone());
                }
                return outcome;
            }
        };
        match rx.recv().await {
            Ok(outcome) => outcome,
            Err(_) => Err(AuthError::HandshakeRejected(
                "login attempt was abandoned".into(),
            )),
        }
    }

    async fn popup_flow(&self, delegate: &dyn AuthDelegate) -> LoginOutcome {
        let client_id = self
            .client_id
            .clone()
            .ok_or_else(|| AuthError::MissingClientId(self.provider.clone()))?;

        let state = StatePayload {
            url: self.origin.clone(),
            provider: self.provider.clone(),
        };
        let mut url = self.authorize_endpoint.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &client_id)
            .append_pair("state", &state.encode());
        for (key, value) in delegate.oauth_params() {
            url.query_pairs_mut().append_pair(&key, &value);
        }

        let request = AuthorizeRequest {
            url,
            window: WindowSpec::fit(self.prompt.viewport()),
            provider: self.provider.clone(),
        };
        let mut popup = self.prompt.open(&request)?;
        debug!(provider = %self.provider, window = %popup.id, "opened login popup");

        let token = self.await_handshake(&mut popup).await?;
        self.store.set(&self.token_key, &token)?;

        match delegate.fetch_user(&token).await {
            Ok(user) => {
                self.accept(token, user.clone());
                Ok(user)
            }
            Err(AuthError::TokenRejected) => {
                self.store.remove(&self.token_key)?;
                Err(AuthError::TokenRejected)
            }
            Err(other) => Err(other),
        }
    }

    async fn await_handshake(&self, popup: &mut PopupHandle) -> Result<String, AuthError> {
        let deadline = tokio::time::sleep(self.handshake_timeout);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                () = &mut deadline => return Err(AuthError::HandshakeTimeout),
                message = popup.messages.recv() => match message {
                    None => return Err(AuthError::PopupClosed),
                    Some(message) => {
                        if message.window_id != popup.id || message.provider != self.provider {
                            // Not our window or not our provider: ignore and
                            // keep waiting.
                            debug!(
                                provider = %self.provider,
                                from = %message.provider,
                                "ignoring handshake message from unrelated source"
                            );
                            continue;
                        }
                        match (message.token, message.error) {
                            (Some(token), _) => return Ok(token),
                            (None, Some(error)) => {
                                return Err(AuthError::HandshakeRejected(error))
                            }
                            (None, None) => {
                                return Err(AuthError::HandshakeRejected(
                                    "handshake message carried no token".into(),
                                ))
                            }
                        }
                    }
                },
            }
        }
    }

    fn accept(&self, token: String, user: UserProfile) {
        {
            let mut state = self.state.write().expect("session lock poisoned");
            state.token = Some(token);
            state.user = Some(user.clone());
        }
        self.permissions
            .apply(&[(Permission::Login, false), (Permission::Logout, true)]);
        let _ = self.events.send(AuthEvent::Login(user));
    }

    /// Clear the stored token and cached user, revert permissions toward
    /// read-only, emit a logout event. Idempotent.
    pub fn logout(&self) -> Result<(), AuthError> {
        self.store.remove(&self.token_key)?;
        {
            let mut state = self.state.write().expect("session lock poisoned");
            state.token = None;
            state.user = None;
        }
        self.permissions.apply(&[
            (Permission::Login, true),
            (Permission::Logout, false),
            (Permission::Edit, false),
            (Permission::Save, false),
            (Permission::Add, false),
            (Permission::Delete, false),
        ]);
        let _ = self.events.send(AuthEvent::Logout);
        Ok(())
    }

    /// Stale-credential recovery: an authenticated request came back 401.
    /// Locally identical to [`logout`](Self::logout); the caller re-raises
    /// the failure as a "please log in again" error.
    pub fn expire(&self) -> Result<(), AuthError> {
        warn!(provider = %self.provider, "access token rejected mid-operation, clearing session");
        self.logout()
    }
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("provider", &self.provider)
            .field("token_key", &self.token_key)
            .field("authenticated", &self.is_authenticated())
            .finish()
    }
}
