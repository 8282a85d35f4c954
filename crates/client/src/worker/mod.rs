//! The caching worker.
//!
//! `ServiceWorker` sits between a page and the network. Intercepted GET
//! requests are classified and served by one of three strategies against
//! the current cache generation:
//!
//! | class          | strategy               |
//! |----------------|------------------------|
//! | `static-asset` | cache-first            |
//! | `api`          | network-first          |
//! | `other`        | stale-while-revalidate |
//!
//! Install and activate run once per deployment (see [`lifecycle`]);
//! preload and performance messages arrive out of band (see [`message`]).

pub mod classify;
pub mod lifecycle;
pub mod message;
pub mod strategy;

#[cfg(test)]
pub(crate) mod testing;

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock, broadcast};
use tokio::task::JoinSet;
use url::Url;

use crate::fetch::{Network, Request, Response, canonicalize};
use cachewarden_core::{AppConfig, CacheDb, Error, Generation};

pub use classify::{Classifier, RequestClass, is_interceptable};
pub use lifecycle::{ActivateReport, InstallReport, LifecycleState, LifecycleStatus};
pub use message::{ControlMessage, MessageOutcome, PerformanceMeasure, PreloadReport};
pub use strategy::Strategy;

const EVENT_CAPACITY: usize = 64;

/// Worker settings, injected at construction.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Current generation name
    pub cache_name: String,
    /// Base for relative URLs
    pub origin: Url,
    /// Critical paths stored at install
    pub precache_urls: Vec<String>,
    pub api_prefix: String,
    pub static_extensions: Vec<String>,
    /// Larger bodies are still returned but never stored
    pub max_entry_bytes: usize,
}

impl WorkerConfig {
    pub fn from_app_config(config: &AppConfig) -> Result<Self, Error> {
        let origin = Url::parse(&config.origin).map_err(|e| Error::InvalidUrl(format!("{}: {e}", config.origin)))?;
        Ok(Self {
            cache_name: config.cache_name.clone(),
            origin,
            precache_urls: config.precache_urls.clone(),
            api_prefix: config.api_prefix.clone(),
            static_extensions: config.static_extensions.clone(),
            max_entry_bytes: config.max_bytes,
        })
    }
}

/// Where a response handed back to the caller came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseSource {
    /// Served from the current generation
    Cache,
    /// Fetched by the strategy
    Network,
    /// Not intercepted
    Passthrough,
    /// Direct fetch after the caching layer failed internally
    Fallback,
}

/// Result of handling one request.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub response: Response,
    pub source: ResponseSource,
    pub class: Option<RequestClass>,
    pub strategy: Option<Strategy>,
}

/// Notifications for the hosting environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerEvent {
    /// A background refresh replaced a cached entry.
    CacheUpdated { url: String },
    /// Install found older generations that this deployment will evict.
    UpdateAvailable { previous: Vec<String> },
}

/// A URL that could not be fetched and stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedUrl {
    pub url: String,
    pub reason: String,
}

/// The caching layer.
pub struct ServiceWorker {
    config: WorkerConfig,
    db: CacheDb,
    network: Arc<dyn Network>,
    classifier: Classifier,
    lifecycle: RwLock<LifecycleStatus>,
    revalidations: Mutex<JoinSet<()>>,
    events: broadcast::Sender<WorkerEvent>,
}

impl ServiceWorker {
    pub fn new(config: WorkerConfig, db: CacheDb, network: Arc<dyn Network>) -> Result<Self, Error> {
        let classifier = Classifier::new(&config.static_extensions, &config.api_prefix)?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Self {
            config,
            db,
            network,
            classifier,
            lifecycle: RwLock::new(LifecycleStatus::default()),
            revalidations: Mutex::new(JoinSet::new()),
            events,
        })
    }

    pub fn cache(&self) -> &CacheDb {
        &self.db
    }

    /// Handle to the current generation.
    pub fn current_generation(&self) -> Generation {
        self.db.generation(&self.config.cache_name)
    }

    /// Subscribe to worker events.
    pub fn subscribe(&self) -> broadcast::Receiver<WorkerEvent> {
        self.events.subscribe()
    }

    /// Resolve a page-relative URL against the configured origin.
    pub fn resolve(&self, input: &str) -> Result<Url, Error> {
        canonicalize(&self.config.origin, input).map_err(|e| Error::InvalidUrl(format!("{input}: {e}")))
    }

    /// Handle one outgoing request.
    ///
    /// Requests that are not GET, not http(s), or arrive before activation
    /// go straight to the network. Network failures the strategy could not
    /// absorb are returned; any other failure inside the caching layer,
    /// panics included, degrades to a direct uncached fetch.
    pub async fn handle_fetch(&self, request: Request) -> Result<FetchOutcome, Error> {
        if !is_interceptable(&request) || !self.controls_clients().await {
            tracing::debug!(method = %request.method, url = %request.url, "passing request through");
            let response = self.network.fetch(&request).await?;
            return Ok(FetchOutcome { response, source: ResponseSource::Passthrough, class: None, strategy: None });
        }

        let class = self.classifier.classify(&request);
        let strategy = class.strategy();
        let generation = self.current_generation();

        let attempt = AssertUnwindSafe(self.execute(strategy, &generation, &request))
            .catch_unwind()
            .await;

        let failure = match attempt {
            Ok(Ok((response, source))) => {
                return Ok(FetchOutcome { response, source, class: Some(class), strategy: Some(strategy) });
            }
            Ok(Err(err)) if err.is_network_failure() => return Err(err),
            Ok(Err(err)) => err,
            Err(panic) => Error::Internal(panic_message(panic.as_ref())),
        };

        tracing::error!(
            url = %request.url,
            strategy = %strategy,
            error = %failure,
            "request handling failed, falling back to network"
        );
        let response = self.network.fetch(&request).await?;
        Ok(FetchOutcome { response, source: ResponseSource::Fallback, class: Some(class), strategy: Some(strategy) })
    }

    async fn execute(
        &self, strategy: Strategy, generation: &Generation, request: &Request,
    ) -> Result<(Response, ResponseSource), Error> {
        match strategy {
            Strategy::CacheFirst => self.cache_first(generation, request).await,
            Strategy::NetworkFirst => self.network_first(generation, request).await,
            Strategy::StaleWhileRevalidate => self.stale_while_revalidate(generation, request).await,
        }
    }

    /// Wait for every in-flight background refresh to settle.
    pub async fn wait_for_revalidations(&self) {
        let mut pending = std::mem::take(&mut *self.revalidations.lock().await);
        while let Some(result) = pending.join_next().await {
            if let Err(e) = result {
                tracing::warn!(error = %e, "background refresh task aborted");
            }
        }
    }

    async fn track<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.revalidations.lock().await;
        while tasks.try_join_next().is_some() {}
        tasks.spawn(task);
    }

    fn emit(&self, event: WorkerEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Fetch every URL concurrently and store each successful response.
    ///
    /// One failure never stops the others. Results keep input order.
    async fn fetch_and_store_all(&self, generation: &Generation, urls: &[String]) -> (Vec<String>, Vec<FailedUrl>) {
        let attempts = urls.iter().map(|raw| async move {
            let outcome = self.fetch_and_store(generation, raw).await;
            (raw.clone(), outcome)
        });

        let mut stored = Vec::new();
        let mut failed = Vec::new();
        for (raw, outcome) in join_all(attempts).await {
            match outcome {
                Ok(url) => stored.push(url),
                Err(reason) => {
                    tracing::error!(url = %raw, reason = %reason, "failed to cache resource");
                    failed.push(FailedUrl { url: raw, reason });
                }
            }
        }
        (stored, failed)
    }

    async fn fetch_and_store(&self, generation: &Generation, raw: &str) -> Result<String, String> {
        let url = self.resolve(raw).map_err(|e| e.to_string())?;
        let request = Request::get(url).map_err(|e| e.to_string())?;
        let response = self.network.fetch(&request).await.map_err(|e| e.to_string())?;

        if !response.ok() {
            return Err(format!("status {}", response.status.as_u16()));
        }
        if response.body.len() > self.config.max_entry_bytes {
            let err = Error::FetchTooLarge(format!(
                "{}: {} bytes exceeds {}",
                request.url,
                response.body.len(),
                self.config.max_entry_bytes
            ));
            return Err(err.to_string());
        }

        generation
            .put(&response.to_cached(&request))
            .await
            .map_err(|e| e.to_string())?;

        Ok(request.url.to_string())
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        format!("panic: {msg}")
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        format!("panic: {msg}")
    } else {
        "panic in request handling".to_string()
    }
}
