//! Scheduled fetch pipeline
//!
//! One logical worker: ensure a valid token, make sure categories are
//! cached, fetch every category's parameters, emit one `data` event (or
//! one `error` event) per cycle. A failed cycle never tears the schedule
//! down; the next tick retries from scratch.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::{broadcast, watch};

use crate::api::{ReqwestTransport, ServiceInfo, Transport};
use crate::auth::{AuthFlow, AuthorizationPrompt, CredentialStore, FileStore, TerminalPrompt};
use crate::config::Options;
use crate::error::{Error, Result};
use crate::models::{Category, Reading};

/// The poller's sole output surface.
#[derive(Debug, Clone)]
pub enum Event {
    /// Normalized readings of one completed cycle, in category order.
    Data(Vec<Reading>),
    /// The single converted failure of one cycle.
    Error(Error),
}

struct Worker {
    stop: watch::Sender<bool>,
}

/// Polls the vendor API on a schedule and broadcasts events.
pub struct Poller {
    options: Arc<Options>,
    auth: AuthFlow,
    api: ServiceInfo,
    prompt: Arc<dyn AuthorizationPrompt>,
    store: Arc<dyn CredentialStore>,
    events: broadcast::Sender<Event>,
    categories: Mutex<Option<Vec<Category>>>,
    in_flight: AtomicBool,
    worker: Mutex<Option<Worker>>,
}

impl Poller {
    /// Poller with production collaborators: `reqwest` transport, file
    /// credential store, terminal prompt.
    ///
    /// With `auto_start` set this must run inside a tokio runtime.
    pub fn new(options: Options) -> Result<Arc<Self>> {
        options.validate()?;
        let store = Arc::new(FileStore::for_options(&options)?);
        let transport = Arc::new(ReqwestTransport::new(&options)?);
        Self::with_parts(options, transport, store, Arc::new(TerminalPrompt))
    }

    /// Poller with injected collaborators.
    pub fn with_parts(
        options: Options,
        transport: Arc<dyn Transport>,
        store: Arc<dyn CredentialStore>,
        prompt: Arc<dyn AuthorizationPrompt>,
    ) -> Result<Arc<Self>> {
        options.validate()?;
        let options = Arc::new(options);
        let (events, _) = broadcast::channel(64);

        let poller = Arc::new(Self {
            auth: AuthFlow::new(options.clone(), transport.clone(), store.clone()),
            api: ServiceInfo::new(options.clone(), transport, store.clone()),
            prompt,
            store,
            events,
            categories: Mutex::new(None),
            in_flight: AtomicBool::new(false),
            worker: Mutex::new(None),
            options,
        });

        if poller.options.auto_start {
            poller.start();
        }
        Ok(poller)
    }

    /// Receiver for `data`/`error` events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.worker.lock().unwrap().is_some()
    }

    /// Begin polling: one immediate cycle, then per the schedule.
    /// Idempotent while running; restartable after `stop()`.
    pub fn start(self: &Arc<Self>) {
        let mut worker = self.worker.lock().unwrap();
        if worker.is_some() {
            return;
        }

        let (stop_tx, mut stop_rx) = watch::channel(false);
        // The task holds only a weak reference so a poller dropped without
        // stop() does not keep polling forever.
        let weak: Weak<Poller> = Arc::downgrade(self);
        let _ = tokio::spawn(async move {
            loop {
                let delay = {
                    let Some(poller) = weak.upgrade() else { break };
                    poller.tick().await;
                    if *stop_rx.borrow() {
                        break;
                    }
                    poller.options.schedule.next_delay(poller.options.timezone)
                };
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = stop_rx.changed() => {
                        if *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        });

        *worker = Some(Worker { stop: stop_tx });
    }

    /// Cancel future ticks. An in-flight cycle finishes on its own; its
    /// HTTP calls are not aborted. Idempotent.
    pub fn stop(&self) {
        if let Some(worker) = self.worker.lock().unwrap().take() {
            let _ = worker.stop.send(true);
        }
    }

    /// Run one guarded cycle. A tick arriving while a cycle is in flight
    /// is skipped entirely (no queueing, no catch-up).
    pub async fn tick(&self) {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            tracing::debug!("previous cycle still in flight, skipping tick");
            return;
        }

        if let Err(error) = self.run_cycle().await {
            tracing::warn!("fetch cycle failed: {}", error);
            let _ = self.events.send(Event::Error(error));
        }

        self.in_flight.store(false, Ordering::SeqCst);
    }

    async fn run_cycle(&self) -> Result<()> {
        self.auth.ensure_token(self.prompt.as_ref()).await?;
        let categories = self.ensure_categories().await?;
        let readings = self.api.fetch_all(&categories).await?;
        tracing::debug!("cycle produced {} readings", readings.len());
        let _ = self.events.send(Event::Data(readings));
        Ok(())
    }

    /// Categories are fetched once per process lifetime.
    async fn ensure_categories(&self) -> Result<Vec<Category>> {
        {
            let cached = self.categories.lock().unwrap();
            if let Some(categories) = cached.as_ref() {
                return Ok(categories.clone());
            }
        }

        tracing::info!("loading categories");
        let categories = self.api.categories().await?;
        *self.categories.lock().unwrap() = Some(categories.clone());
        Ok(categories)
    }

    /// Drop stored credentials; the next cycle re-authorizes interactively.
    pub fn clear_credentials(&self) -> Result<()> {
        self.store.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Credentials, MemoryStore};
    use crate::config::Schedule;
    use crate::testutil::{test_options, token_body, FakePrompt, FakeTransport};
    use std::time::Duration;
    use tokio::sync::broadcast::error::TryRecvError;

    const CATEGORIES_PATH: &str = "/api/v1/systems/12345/serviceinfo/categories";
    const STATUS_PATH: &str =
        "/api/v1/systems/12345/serviceinfo/categories/status?categoryId=STATUS";

    fn valid_credentials() -> Credentials {
        Credentials {
            access_token: "valid-access".to_string(),
            refresh_token: "valid-refresh".to_string(),
            expires_at: i64::MAX,
            token_type: None,
            scope: None,
        }
    }

    fn one_category() -> serde_json::Value {
        serde_json::json!([{"categoryId": "STATUS", "name": "status"}])
    }

    fn two_parameters() -> serde_json::Value {
        serde_json::json!([
            {"parameterId": 40004, "title": "outdoor temp.", "displayValue": "1.5°C"},
            {"parameterId": 12345, "title": "some sensor", "displayValue": "7"}
        ])
    }

    fn poller(
        transport: Arc<FakeTransport>,
        store: Arc<MemoryStore>,
        prompt: Arc<FakePrompt>,
    ) -> Arc<Poller> {
        Poller::with_parts(test_options(), transport, store, prompt).unwrap()
    }

    #[tokio::test]
    async fn test_cycle_emits_one_data_event() {
        let transport = FakeTransport::new();
        transport.respond(CATEGORIES_PATH, 200, one_category());
        transport.respond(STATUS_PATH, 200, two_parameters());

        let poller = poller(
            transport,
            Arc::new(MemoryStore::with(valid_credentials())),
            FakePrompt::unreachable(),
        );
        let mut rx = poller.subscribe();

        poller.tick().await;

        match rx.try_recv().unwrap() {
            Event::Data(readings) => {
                assert_eq!(readings.len(), 2);
                assert_eq!(readings[0].key, "status_outdoor_temp");
                assert_eq!(readings[1].key, "12345");
                assert!(readings.iter().all(|r| r.category_id == "STATUS"));
            }
            other => panic!("expected data event, got {:?}", other),
        }
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_categories_cached_across_cycles() {
        let transport = FakeTransport::new();
        transport.respond(CATEGORIES_PATH, 200, one_category());
        transport.respond(STATUS_PATH, 200, two_parameters());

        let poller = poller(
            transport.clone(),
            Arc::new(MemoryStore::with(valid_credentials())),
            FakePrompt::unreachable(),
        );

        poller.tick().await;
        poller.tick().await;

        let gets = transport.gets();
        let category_fetches = gets.iter().filter(|(p, _)| p == CATEGORIES_PATH).count();
        let parameter_fetches = gets.iter().filter(|(p, _)| p == STATUS_PATH).count();
        assert_eq!(category_fetches, 1);
        assert_eq!(parameter_fetches, 2);
    }

    #[tokio::test]
    async fn test_401_emits_error_clears_credentials_then_reauthorizes() {
        let transport = FakeTransport::new();
        transport.respond(CATEGORIES_PATH, 401, serde_json::Value::Null);

        let store = Arc::new(MemoryStore::with(valid_credentials()));
        let prompt = FakePrompt::returning("fresh-code");
        let poller = poller(transport.clone(), store.clone(), prompt.clone());
        let mut rx = poller.subscribe();

        poller.tick().await;

        match rx.try_recv().unwrap() {
            Event::Error(Error::Api { status: 401, .. }) => {}
            other => panic!("expected 401 api error event, got {:?}", other),
        }
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
        assert!(store.get().is_none());
        assert_eq!(prompt.calls(), 0);

        // Next cycle has no refresh token left, so it goes interactive.
        transport.respond("/oauth/token", 200, token_body("acc2", "ref2", 3600));
        transport.respond(CATEGORIES_PATH, 200, one_category());
        transport.respond(STATUS_PATH, 200, two_parameters());

        poller.tick().await;

        assert_eq!(prompt.calls(), 1);
        assert!(prompt.seen_urls()[0].contains("/oauth/authorize?"));
        assert_eq!(store.get().unwrap().access_token, "acc2");
        match rx.try_recv().unwrap() {
            Event::Data(readings) => assert_eq!(readings.len(), 2),
            other => panic!("expected data event, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_expired_token_refreshes_before_fetch() {
        let transport = FakeTransport::new();
        transport.respond("/oauth/token", 200, token_body("renewed", "ref2", 3600));
        transport.respond(CATEGORIES_PATH, 200, one_category());
        transport.respond(STATUS_PATH, 200, two_parameters());

        let mut expired = valid_credentials();
        expired.expires_at = 0;
        let store = Arc::new(MemoryStore::with(expired));

        let poller = poller(transport.clone(), store.clone(), FakePrompt::unreachable());
        poller.tick().await;

        assert_eq!(transport.posts().len(), 1);
        assert_eq!(store.get().unwrap().access_token, "renewed");
        // Data calls used the renewed token.
        assert_eq!(transport.gets()[0].1.as_deref(), Some("renewed"));
    }

    #[tokio::test]
    async fn test_overlap_guard_skips_concurrent_tick() {
        let transport = FakeTransport::new();
        transport.set_delay(Duration::from_millis(100));
        transport.respond(CATEGORIES_PATH, 200, one_category());
        transport.respond(STATUS_PATH, 200, two_parameters());

        let poller = poller(
            transport.clone(),
            Arc::new(MemoryStore::with(valid_credentials())),
            FakePrompt::unreachable(),
        );
        let mut rx = poller.subscribe();

        tokio::join!(poller.tick(), async {
            // Let the first tick take the guard before the second fires.
            tokio::time::sleep(Duration::from_millis(10)).await;
            poller.tick().await;
        });

        assert!(matches!(rx.try_recv().unwrap(), Event::Data(_)));
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
        // One cycle's worth of requests: categories + one parameter fetch.
        assert_eq!(transport.gets().len(), 2);
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let transport = FakeTransport::new();
        transport.respond(CATEGORIES_PATH, 200, one_category());
        transport.respond(STATUS_PATH, 200, two_parameters());

        let poller = poller(
            transport.clone(),
            Arc::new(MemoryStore::with(valid_credentials())),
            FakePrompt::unreachable(),
        );

        poller.start();
        poller.start();
        assert!(poller.is_running());

        tokio::time::sleep(Duration::from_millis(100)).await;

        // A single immediate cycle, not one per start() call.
        let category_fetches = transport
            .gets()
            .iter()
            .filter(|(p, _)| p == CATEGORIES_PATH)
            .count();
        assert_eq!(category_fetches, 1);

        poller.stop();
        assert!(!poller.is_running());
    }

    #[tokio::test]
    async fn test_stop_prevents_future_cycles_and_restart_works() {
        let transport = FakeTransport::new();
        transport.respond(CATEGORIES_PATH, 200, one_category());
        transport.respond(STATUS_PATH, 200, two_parameters());

        let mut options = test_options();
        options.schedule = Schedule::Interval(Duration::from_millis(30));
        let poller = Poller::with_parts(
            options,
            transport.clone(),
            Arc::new(MemoryStore::with(valid_credentials())),
            FakePrompt::unreachable(),
        )
        .unwrap();

        poller.start();
        tokio::time::sleep(Duration::from_millis(100)).await;
        poller.stop();
        tokio::time::sleep(Duration::from_millis(30)).await;

        let after_stop = transport.gets().len();
        assert!(after_stop >= 2);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(transport.gets().len(), after_stop);

        poller.start();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(transport.gets().len() > after_stop);
        poller.stop();
    }

    #[tokio::test]
    async fn test_error_cycle_keeps_schedule_alive() {
        let transport = FakeTransport::new();
        transport.respond(CATEGORIES_PATH, 500, serde_json::Value::Null);

        let mut options = test_options();
        options.schedule = Schedule::Interval(Duration::from_millis(30));
        let poller = Poller::with_parts(
            options,
            transport.clone(),
            Arc::new(MemoryStore::with(valid_credentials())),
            FakePrompt::unreachable(),
        )
        .unwrap();
        let mut rx = poller.subscribe();

        poller.start();
        tokio::time::sleep(Duration::from_millis(100)).await;
        poller.stop();

        // Several cycles ran, each emitting exactly one error event.
        let mut errors = 0;
        while let Ok(event) = rx.try_recv() {
            match event {
                Event::Error(Error::Api { status: 500, .. }) => errors += 1,
                other => panic!("unexpected event: {:?}", other),
            }
        }
        assert!(errors >= 2);
    }

    #[tokio::test]
    async fn test_auto_start() {
        let transport = FakeTransport::new();
        transport.respond(CATEGORIES_PATH, 200, one_category());
        transport.respond(STATUS_PATH, 200, two_parameters());

        let mut options = test_options();
        options.auto_start = true;
        let poller = Poller::with_parts(
            options,
            transport,
            Arc::new(MemoryStore::with(valid_credentials())),
            FakePrompt::unreachable(),
        )
        .unwrap();

        assert!(poller.is_running());
        let mut rx = poller.subscribe();
        tokio::time::sleep(Duration::from_millis(50)).await;
        poller.stop();

        assert!(matches!(rx.try_recv(), Ok(Event::Data(_)) | Err(TryRecvError::Empty)));
    }
}
