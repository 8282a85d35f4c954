//! Scripted network and worker builders for unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::{StatusCode, Url};

use super::{ServiceWorker, WorkerConfig};
use crate::fetch::{FetchClient, FetchConfig, Network, Request, Response};
use cachewarden_core::{AppConfig, CacheDb, Error};

#[derive(Clone)]
enum Route {
    Respond { status: u16, body: Bytes },
    Fail,
}

/// In-memory `Network` with per-URL scripted responses.
///
/// Unknown URLs answer 404.
#[derive(Default)]
pub(crate) struct StubNetwork {
    routes: Mutex<HashMap<String, Route>>,
    calls: Mutex<HashMap<String, usize>>,
    panics: Mutex<HashSet<String>>,
    delay: Mutex<Option<Duration>>,
    offline: AtomicBool,
}

impl StubNetwork {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn respond(&self, url: &str, status: u16, body: &str) {
        let route = Route::Respond { status, body: Bytes::copy_from_slice(body.as_bytes()) };
        self.routes.lock().unwrap().insert(url.to_string(), route);
    }

    /// Make every fetch of `url` fail at the transport level.
    pub(crate) fn fail(&self, url: &str) {
        self.routes.lock().unwrap().insert(url.to_string(), Route::Fail);
    }

    /// 200 for every default critical asset.
    pub(crate) fn respond_defaults(&self) {
        for path in AppConfig::default().precache_urls {
            self.respond(&format!("http://localhost:3000{path}"), 200, &format!("asset {path}"));
        }
    }

    pub(crate) fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub(crate) fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// Panic inside the next fetch of `url`.
    pub(crate) fn panic_once(&self, url: &str) {
        self.panics.lock().unwrap().insert(url.to_string());
    }

    pub(crate) fn calls(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    pub(crate) fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl Network for StubNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, Error> {
        let url = request.url.to_string();
        *self.calls.lock().unwrap().entry(url.clone()).or_default() += 1;

        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::Network(format!("{url}: offline")));
        }

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        // Locks are released before panicking so they are not poisoned.
        let should_panic = self.panics.lock().unwrap().remove(&url);
        if should_panic {
            panic!("stub network exploded on {url}");
        }

        let route = self.routes.lock().unwrap().get(&url).cloned();
        let (status, body) = match route {
            Some(Route::Respond { status, body }) => (status, body),
            Some(Route::Fail) => return Err(Error::Network(format!("{url}: connection reset"))),
            None => (404, Bytes::from_static(b"not found")),
        };

        Ok(Response {
            url: request.url.clone(),
            status: StatusCode::from_u16(status).unwrap(),
            headers: HeaderMap::new(),
            body,
            fetch_ms: 1,
        })
    }
}

pub(crate) fn get(url: &str) -> Request {
    Request::get(Url::parse(url).unwrap()).unwrap()
}

/// Fresh worker on an in-memory cache with default settings.
pub(crate) async fn worker_with(network: Arc<StubNetwork>) -> ServiceWorker {
    let db = CacheDb::open_in_memory().await.unwrap();
    worker_with_db(network, db, "portfolio-v1")
}

pub(crate) fn worker_with_db(network: Arc<StubNetwork>, db: CacheDb, cache_name: &str) -> ServiceWorker {
    let mut config = WorkerConfig::from_app_config(&AppConfig::default()).unwrap();
    config.cache_name = cache_name.to_string();
    ServiceWorker::new(config, db, network).unwrap()
}

/// Worker that has been installed and activated.
pub(crate) async fn activated_worker(network: Arc<StubNetwork>) -> ServiceWorker {
    let worker = worker_with(network).await;
    worker.install().await.unwrap();
    worker.activate().await.unwrap();
    worker
}

/// Activated worker fetching from a wiremock origin through the real
/// client, with no critical assets.
pub(crate) async fn http_worker(origin: &str, max_entry_bytes: usize) -> ServiceWorker {
    let app = AppConfig { origin: origin.to_string(), precache_urls: Vec::new(), ..Default::default() };
    let mut config = WorkerConfig::from_app_config(&app).unwrap();
    config.max_entry_bytes = max_entry_bytes;
    let db = CacheDb::open_in_memory().await.unwrap();
    let network = Arc::new(FetchClient::new(FetchConfig::from(&app)).unwrap());

    let worker = ServiceWorker::new(config, db, network).unwrap();
    worker.install().await.unwrap();
    worker.activate().await.unwrap();
    worker
}
