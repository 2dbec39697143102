//! Error taxonomy for the poller
//!
//! Cycle failures are converted into a single `error` event, so the type is
//! `Clone` (string payloads) and can ride a broadcast channel.

use thiserror::Error;

/// All failure modes surfaced by the library.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Malformed or missing required configuration. Fatal at construction.
    #[error("invalid configuration: {0}")]
    Validation(String),

    /// Token exchange or refresh failed. Stored credentials are cleared so
    /// the next cycle re-authorizes interactively.
    #[error("authentication failed ({status}): {message}")]
    Auth { status: u16, message: String },

    /// Non-200 from a data endpoint.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Network, timeout or response-size failure from the HTTP layer.
    #[error("transport error: {0}")]
    Transport(String),

    /// Credential persistence failed.
    #[error("credential store error: {0}")]
    Store(String),

    /// The interactive authorization channel failed.
    #[error("authorization prompt failed: {0}")]
    Prompt(String),
}

impl Error {
    /// HTTP status attached to this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Auth { status, .. } | Error::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Transport(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
