//! The popup handshake: how a completed OAuth redirect reaches the session.
//!
//! The host application implements [`AuthPrompt`]. Opening a prompt yields a
//! [`PopupHandle`] whose channel *is* the window: every message the popup
//! posts arrives on it, and dropping the sender is the "user closed the
//! window" signal. The session correlates each message by window id and
//! provider identity before accepting anything.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use url::Url;
use uuid::Uuid;

use super::error::AuthError;

/// Hard cap on popup dimensions.
const MAX_WIDTH: u32 = 1000;
const MAX_HEIGHT: u32 = 800;

/// What a popup posts back to its opener when the provider redirect lands.
///
/// This is the one bit-exact wire contract the authentication core depends
/// on: `token` present means acceptance; `error` present — or neither field
/// present — means rejection. Malformed messages are rejections, never a
/// crash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakeMessage {
    pub window_id: Uuid,
    pub provider: String,
    pub token: Option<String>,
    pub error: Option<String>,
}

/// A live popup window, as seen by the session.
#[derive(Debug)]
pub struct PopupHandle {
    pub id: Uuid,
    pub messages: mpsc::Receiver<HandshakeMessage>,
}

impl PopupHandle {
    /// New handle plus the sender half the host wires into its window.
    pub fn channel() -> (Self, mpsc::Sender<HandshakeMessage>, Uuid) {
        let (tx, rx) = mpsc::channel(4);
        let id = Uuid::new_v4();
        (Self { id, messages: rx }, tx, id)
    }
}

/// Popup geometry: sized to the viewport, capped, centered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSpec {
    pub width: u32,
    pub height: u32,
    pub left: i32,
    pub top: i32,
}

impl WindowSpec {
    pub fn fit(viewport: (u32, u32)) -> Self {
        let (vw, vh) = viewport;
        let width = vw.min(MAX_WIDTH);
        let height = vh.min(MAX_HEIGHT);
        Self {
            width,
            height,
            left: ((vw.saturating_sub(width)) / 2) as i32,
            top: ((vh.saturating_sub(height)) / 2) as i32,
        }
    }
}

/// Opaque `state` payload routed through the provider's redirect.
///
/// The callback page uses it to find the correct opener and provider — a
/// page may have several heterogeneous backends mid-login at once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatePayload {
    pub url: String,
    pub provider: String,
}

impl StatePayload {
    pub fn encode(&self) -> String {
        let json = serde_json::to_string(self).expect("state payload serializes");
        URL_SAFE_NO_PAD.encode(json)
    }

    pub fn decode(raw: &str) -> Result<Self, AuthError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(raw)
            .map_err(|e| AuthError::InvalidResponse(e.to_string()))?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Everything the host needs to open one authorization popup.
#[derive(Debug, Clone)]
pub struct AuthorizeRequest {
    /// Fully-built authorize URL: client id, state, adapter extras.
    pub url: Url,
    pub window: WindowSpec,
    pub provider: String,
}

/// Host-supplied port that opens authorization popups.
pub trait AuthPrompt: Send + Sync {
    /// Viewport available for sizing the popup.
    fn viewport(&self) -> (u32, u32) {
        (1280, 1024)
    }

    /// Open the popup. A blocked window is an error the caller sees — it is
    /// not retriable without user action.
    fn open(&self, request: &AuthorizeRequest) -> Result<PopupHandle, AuthError>;
}

/// Prompt for hosts with no interactive surface: passive login still works,
/// active login reports the popup as blocked.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoUiPrompt;

impl AuthPrompt for NoUiPrompt {
    fn open(&self, request: &AuthorizeRequest) -> Result<PopupHandle, AuthError> {
        Err(AuthError::PopupBlocked(format!(
            "no interactive prompt attached for provider '{}'",
            request.provider
        )))
    }
}
