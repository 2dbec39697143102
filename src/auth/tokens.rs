//! Stored credential record

use serde::{Deserialize, Serialize};

/// Tokens issued by the vendor's OAuth2 endpoint.
///
/// `expires_at` is the raw expiry instant in epoch milliseconds
/// (`issued_at + expires_in * 1000`); the renewal margin is applied at
/// check time, not at storage time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl Credentials {
    /// True when the access token expires within `renew_before_ms`.
    pub fn is_expired(&self, renew_before_ms: i64) -> bool {
        self.expires_at < now_ms() + renew_before_ms
    }
}

/// Current time in epoch milliseconds.
pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
