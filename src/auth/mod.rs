//! OAuth2 session management for NIBE Uplink
//!
//! Implements the authorization-code flow against the vendor's
//! `/oauth/token` endpoint, with refresh-token renewal and persisted
//! credential state.

pub mod oauth;
pub mod prompt;
pub mod store;
pub mod tokens;

pub use oauth::AuthFlow;
pub use prompt::{AuthorizationPrompt, TerminalPrompt};
pub use store::{CredentialStore, FileStore, MemoryStore};
pub use tokens::Credentials;
