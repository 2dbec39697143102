//! OAuth2 authorization-code flow for NIBE Uplink
//!
//! Guarantees a usable access token before any data call: interactive
//! authorization when no refresh token exists, refresh-token renewal when
//! the stored token is expired or expiring soon.

use std::sync::Arc;

use serde::Deserialize;

use crate::api::{JsonResponse, Transport};
use crate::config::Options;
use crate::error::{Error, Result};

use super::prompt::AuthorizationPrompt;
use super::store::CredentialStore;
use super::tokens::{now_ms, Credentials};

/// Successful `/oauth/token` payload.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

/// Orchestrates authorization, token exchange and renewal.
pub struct AuthFlow {
    options: Arc<Options>,
    transport: Arc<dyn Transport>,
    store: Arc<dyn CredentialStore>,
}

impl AuthFlow {
    pub fn new(
        options: Arc<Options>,
        transport: Arc<dyn Transport>,
        store: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            options,
            transport,
            store,
        }
    }

    /// Browser URL for the interactive consent step.
    pub fn authorize_url(&self, state: &str) -> Result<String> {
        let mut url = url::Url::parse(&self.options.base_url)
            .map_err(|e| Error::Validation(format!("invalid base_url: {}", e)))?;
        url.set_path("/oauth/authorize");
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.options.client_id)
            .append_pair("scope", &self.options.scope)
            .append_pair("redirect_uri", &self.options.redirect_uri)
            .append_pair("state", state);
        Ok(url.to_string())
    }

    /// True iff the store holds a refresh token.
    pub fn has_refresh_token(&self) -> bool {
        self.store
            .get()
            .map_or(false, |c| !c.refresh_token.is_empty())
    }

    /// True when the stored token (absent counts as expired) falls inside
    /// the renewal margin from now.
    pub fn is_token_expired(&self) -> bool {
        self.store
            .get()
            .map_or(true, |c| c.is_expired(self.options.renew_before_expiry_ms()))
    }

    /// Exchange an authorization code for tokens and persist them.
    pub async fn exchange_code(&self, code: &str) -> Result<Credentials> {
        let form = [
            ("grant_type", "authorization_code"),
            ("client_id", self.options.client_id.as_str()),
            ("client_secret", self.options.client_secret.as_str()),
            ("code", code),
            ("redirect_uri", self.options.redirect_uri.as_str()),
            ("scope", self.options.scope.as_str()),
        ];
        self.token_request(&form).await
    }

    /// Renew the access token with the stored refresh token.
    pub async fn refresh(&self) -> Result<Credentials> {
        let refresh_token = self
            .store
            .get()
            .map(|c| c.refresh_token)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::Auth {
                status: 401,
                message: "no refresh token stored".to_string(),
            })?;

        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.as_str()),
            ("client_id", self.options.client_id.as_str()),
            ("client_secret", self.options.client_secret.as_str()),
        ];
        self.token_request(&form).await
    }

    /// Make sure a non-expired access token is stored. Interactive
    /// authorization only happens when no refresh token exists at all.
    pub async fn ensure_token(&self, prompt: &dyn AuthorizationPrompt) -> Result<()> {
        if !self.has_refresh_token() {
            tracing::info!("no stored refresh token, starting interactive authorization");
            let state = uuid::Uuid::new_v4().to_string();
            let url = self.authorize_url(&state)?;
            let code = prompt.obtain_code(&url).await?;
            self.exchange_code(code.trim()).await?;
            return Ok(());
        }

        if self.is_token_expired() {
            tracing::info!("access token expired or expiring soon, refreshing");
            self.refresh().await?;
        }
        Ok(())
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<Credentials> {
        let resp = self.transport.post_form("/oauth/token", form).await?;

        if !resp.is_ok() {
            // A dead grant would otherwise be retried forever in an
            // unattended process; clear it so the next cycle re-authorizes.
            tracing::warn!(
                "token endpoint returned {}, clearing stored credentials",
                resp.status
            );
            if let Err(e) = self.store.clear() {
                tracing::warn!("failed to clear credentials: {}", e);
            }
            return Err(Error::Auth {
                status: resp.status,
                message: resp.error_message(),
            });
        }

        let credentials = self.credentials_from(resp)?;
        self.store.set(&credentials)?;
        Ok(credentials)
    }

    fn credentials_from(&self, resp: JsonResponse) -> Result<Credentials> {
        let status = resp.status;
        let token: TokenResponse =
            serde_json::from_value(resp.body).map_err(|e| Error::Auth {
                status,
                message: format!("malformed token response: {}", e),
            })?;

        // The vendor may rotate the refresh token; keep the old one when
        // the response omits it.
        let refresh_token = token
            .refresh_token
            .or_else(|| self.store.get().map(|c| c.refresh_token))
            .unwrap_or_default();

        Ok(Credentials {
            access_token: token.access_token,
            refresh_token,
            expires_at: now_ms() + token.expires_in * 1000,
            token_type: token.token_type,
            scope: token.scope,
        })
    }
}
