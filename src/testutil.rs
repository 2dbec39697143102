//! Deterministic in-crate fixtures for the transport and prompt seams

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::api::{JsonResponse, Transport};
use crate::auth::AuthorizationPrompt;
use crate::config::{Options, Schedule};
use crate::error::{Error, Result};

/// Options that pass validation and never fire a scheduled tick on their own.
pub(crate) fn test_options() -> Options {
    let mut options = Options::new("0123456789abcdef0123456789abcdef", "secret", 12345);
    options.base_url = "https://api.example.test".to_string();
    options.auto_start = false;
    options.schedule = Schedule::Interval(Duration::from_secs(3600));
    options
}

/// Canned `/oauth/token` success payload.
pub(crate) fn token_body(access: &str, refresh: &str, expires_in: i64) -> serde_json::Value {
    serde_json::json!({
        "access_token": access,
        "refresh_token": refresh,
        "expires_in": expires_in,
        "token_type": "bearer",
        "scope": "READSYSTEM",
    })
}

/// Transport fake: canned responses keyed by exact path, recorded requests,
/// optional per-request latency (for overlap tests).
pub(crate) struct FakeTransport {
    responses: Mutex<HashMap<String, JsonResponse>>,
    gets: Mutex<Vec<(String, Option<String>)>>,
    posts: Mutex<Vec<(String, Vec<(String, String)>)>>,
    delay: Mutex<Option<Duration>>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(HashMap::new()),
            gets: Mutex::new(Vec::new()),
            posts: Mutex::new(Vec::new()),
            delay: Mutex::new(None),
        })
    }

    /// Set (or replace) the canned response for a path.
    pub fn respond(&self, path: &str, status: u16, body: serde_json::Value) {
        self.responses
            .lock()
            .unwrap()
            .insert(path.to_string(), JsonResponse { status, body });
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn gets(&self) -> Vec<(String, Option<String>)> {
        self.gets.lock().unwrap().clone()
    }

    pub fn posts(&self) -> Vec<(String, Vec<(String, String)>)> {
        self.posts.lock().unwrap().clone()
    }

    fn lookup(&self, path: &str) -> Result<JsonResponse> {
        self.responses
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| Error::Transport(format!("no canned response for {}", path)))
    }

    async fn maybe_sleep(&self) {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn get_json(&self, path_and_query: &str, bearer: Option<&str>) -> Result<JsonResponse> {
        self.maybe_sleep().await;
        self.gets
            .lock()
            .unwrap()
            .push((path_and_query.to_string(), bearer.map(String::from)));
        self.lookup(path_and_query)
    }

    async fn post_form(&self, path: &str, form: &[(&str, &str)]) -> Result<JsonResponse> {
        self.maybe_sleep().await;
        let owned = form
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.posts.lock().unwrap().push((path.to_string(), owned));
        self.lookup(path)
    }
}

/// Prompt fake returning a canned code and counting invocations.
pub(crate) struct FakePrompt {
    code: Option<String>,
    calls: AtomicUsize,
    seen_urls: Mutex<Vec<String>>,
}

impl FakePrompt {
    pub fn returning(code: &str) -> Arc<Self> {
        Arc::new(Self {
            code: Some(code.to_string()),
            calls: AtomicUsize::new(0),
            seen_urls: Mutex::new(Vec::new()),
        })
    }

    /// A prompt that must never be reached.
    pub fn unreachable() -> Arc<Self> {
        Arc::new(Self {
            code: None,
            calls: AtomicUsize::new(0),
            seen_urls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen_urls(&self) -> Vec<String> {
        self.seen_urls.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuthorizationPrompt for FakePrompt {
    async fn obtain_code(&self, authorize_url: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen_urls
            .lock()
            .unwrap()
            .push(authorize_url.to_string());
        self.code
            .clone()
            .ok_or_else(|| Error::Prompt("interactive prompt not expected".to_string()))
    }
}
