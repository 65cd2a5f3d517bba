//! Authentication: key/value token persistence, the popup handshake
//! channel, and the login session state machine.

pub mod error;
pub mod handshake;
pub mod session;
pub mod store;

pub use error::AuthError;
pub use handshake::{
    AuthPrompt, AuthorizeRequest, HandshakeMessage, NoUiPrompt, PopupHandle, StatePayload,
    WindowSpec,
};
pub use session::{AuthDelegate, AuthEvent, AuthSession, LoginOptions, SessionSpec, UserProfile};
pub use store::{token_key, FileStore, KeyValueStore, MemoryStore};
