//! HTTP transport seam
//!
//! The rest of the crate talks to the vendor through [`Transport`]: a
//! status code plus parsed JSON body on any HTTP completion, an
//! [`Error::Transport`] on network/timeout/size failures. The production
//! implementation wraps `reqwest` with the configured timeout, redirect
//! limit, user agent and response-size cap.

use async_trait::async_trait;

use crate::config::Options;
use crate::error::{Error, Result};

/// Completed HTTP exchange: status plus parsed body.
///
/// Bodies that are not valid JSON parse to `Value::Null`; callers decide
/// what a non-200 status means for them.
#[derive(Debug, Clone)]
pub struct JsonResponse {
    pub status: u16,
    pub body: serde_json::Value,
}

impl JsonResponse {
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }

    /// Best-effort human-readable message for a failed exchange.
    pub fn error_message(&self) -> String {
        for key in ["error_description", "errorMessage", "error", "message"] {
            if let Some(s) = self.body.get(key).and_then(|v| v.as_str()) {
                return s.to_string();
            }
        }
        reqwest::StatusCode::from_u16(self.status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("request failed")
            .to_string()
    }
}

/// Vendor-API HTTP operations used by the auth flow and the fetchers.
#[async_trait]
pub trait Transport: Send + Sync {
    /// GET `path_and_query`, optionally with a bearer token.
    async fn get_json(&self, path_and_query: &str, bearer: Option<&str>) -> Result<JsonResponse>;

    /// POST a form-urlencoded body to `path`.
    async fn post_form(&self, path: &str, form: &[(&str, &str)]) -> Result<JsonResponse>;
}

/// `reqwest`-backed transport.
pub struct ReqwestTransport {
    http: reqwest::Client,
    base_url: String,
    max_bytes: usize,
}

impl ReqwestTransport {
    pub fn new(options: &Options) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(options.timeout)
            .redirect(reqwest::redirect::Policy::limited(options.follow_redirects))
            .user_agent(options.user_agent.clone())
            .build()?;

        Ok(Self {
            http,
            base_url: options.base_url.trim_end_matches('/').to_string(),
            max_bytes: options.max_bytes,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Read the body in chunks, enforcing the configured size cap.
    async fn read_json(&self, mut resp: reqwest::Response) -> Result<JsonResponse> {
        let status = resp.status().as_u16();

        let mut body = Vec::new();
        while let Some(chunk) = resp.chunk().await? {
            if body.len() + chunk.len() > self.max_bytes {
                return Err(Error::Transport(format!(
                    "response body exceeds {} bytes",
                    self.max_bytes
                )));
            }
            body.extend_from_slice(&chunk);
        }

        let body = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
        Ok(JsonResponse { status, body })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get_json(&self, path_and_query: &str, bearer: Option<&str>) -> Result<JsonResponse> {
        let url = self.url(path_and_query);
        tracing::debug!("GET {}", url);

        let mut req = self.http.get(&url);
        if let Some(token) = bearer {
            req = req.bearer_auth(token);
        }
        let resp = req.send().await?;
        self.read_json(resp).await
    }

    async fn post_form(&self, path: &str, form: &[(&str, &str)]) -> Result<JsonResponse> {
        let url = self.url(path);
        tracing::debug!("POST {}", url);

        let resp = self.http.post(&url).form(form).send().await?;
        self.read_json(resp).await
    }
}
