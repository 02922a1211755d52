//! OAuth2 authorization-code credential management.

pub mod credential;
pub mod error;
pub mod session;
pub mod store;
pub mod transport;
pub mod ui;

pub use credential::{Credential, TokenResponse};
pub use error::AuthError;
pub use session::{LoginOutcome, SessionManager, SessionPhase};
pub use store::{CredentialStore, FileKeyValueStore, KeyValueStore, MemoryKeyValueStore, StoreError};
pub use transport::{HttpTransport, ReqwestTransport, TransportError};
pub use ui::{
    AuthorizationUi, ConsoleBrowser, FallbackBrowser, NoAuthorizationUi, PresentOptions, UiError,
    UiEvent,
};
