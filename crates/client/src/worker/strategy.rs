//! Strategy executors.
//!
//! Each executor fixes the order between cache lookup and network fetch.
//! Writes go to the current generation and only happen for 2xx responses
//! within the configured entry size.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::{ResponseSource, ServiceWorker, WorkerEvent};
use crate::fetch::{Network, Request, Response};
use cachewarden_core::{Error, Generation};

/// Caching strategy applied to an intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    CacheFirst,
    NetworkFirst,
    StaleWhileRevalidate,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Strategy::CacheFirst => "cache-first",
            Strategy::NetworkFirst => "network-first",
            Strategy::StaleWhileRevalidate => "stale-while-revalidate",
        };
        f.write_str(name)
    }
}

impl ServiceWorker {
    /// Serve from cache when present; otherwise fetch, store on success,
    /// and return the network response. A failed fetch propagates.
    pub(crate) async fn cache_first(
        &self, generation: &Generation, request: &Request,
    ) -> Result<(Response, ResponseSource), Error> {
        if let Some(entry) = generation.lookup(request.method.as_str(), request.url.as_str()).await? {
            tracing::debug!(url = %request.url, "cache hit");
            return Ok((Response::from_cached(entry)?, ResponseSource::Cache));
        }

        let response = self.network.fetch(request).await?;
        if response.ok() {
            store(generation, request, &response, self.config.max_entry_bytes).await;
        }
        Ok((response, ResponseSource::Network))
    }

    /// Fetch first and store on success; fall back to the cached entry
    /// only when the network itself fails.
    pub(crate) async fn network_first(
        &self, generation: &Generation, request: &Request,
    ) -> Result<(Response, ResponseSource), Error> {
        match self.network.fetch(request).await {
            Ok(response) => {
                if response.ok() {
                    store(generation, request, &response, self.config.max_entry_bytes).await;
                }
                Ok((response, ResponseSource::Network))
            }
            Err(err) if err.is_network_failure() => {
                match generation.lookup(request.method.as_str(), request.url.as_str()).await? {
                    Some(entry) => {
                        tracing::debug!(url = %request.url, error = %err, "network failed, serving cached response");
                        Ok((Response::from_cached(entry)?, ResponseSource::Cache))
                    }
                    None => Err(err),
                }
            }
            Err(err) => Err(err),
        }
    }

    /// Return the cached entry immediately while a background fetch
    /// refreshes it. Without a cached entry the caller waits for that fetch.
    pub(crate) async fn stale_while_revalidate(
        &self, generation: &Generation, request: &Request,
    ) -> Result<(Response, ResponseSource), Error> {
        let cached = generation.lookup(request.method.as_str(), request.url.as_str()).await?;

        let refresh = revalidate(
            generation.clone(),
            Arc::clone(&self.network),
            request.clone(),
            self.config.max_entry_bytes,
            cached.is_some().then(|| self.events.clone()),
        );

        match cached {
            Some(entry) => {
                let response = Response::from_cached(entry)?;
                let url = request.url.clone();
                self.track(async move {
                    if let Err(e) = refresh.await {
                        tracing::debug!(url = %url, error = %e, "background refresh failed, keeping cached response");
                    }
                })
                .await;
                Ok((response, ResponseSource::Cache))
            }
            None => Ok((refresh.await?, ResponseSource::Network)),
        }
    }
}

/// Fetch and store. When `announce` is set a successful store is
/// broadcast as `CacheUpdated`.
async fn revalidate(
    generation: Generation, network: Arc<dyn Network>, request: Request, limit: usize,
    announce: Option<broadcast::Sender<WorkerEvent>>,
) -> Result<Response, Error> {
    let response = network.fetch(&request).await?;
    if response.ok()
        && store(&generation, &request, &response, limit).await
        && let Some(events) = announce
    {
        tracing::debug!(url = %request.url, "cache updated");
        let _ = events.send(WorkerEvent::CacheUpdated { url: request.url.to_string() });
    }
    Ok(response)
}

/// Write a response into the generation. Bodies over `limit` are skipped.
/// A failed write is logged and never fails the request that produced it.
async fn store(generation: &Generation, request: &Request, response: &Response, limit: usize) -> bool {
    if response.body.len() > limit {
        tracing::debug!(url = %request.url, bytes = response.body.len(), limit, "response too large to cache");
        return false;
    }

    match generation.put(&response.to_cached(request)).await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(
                url = %request.url,
                generation = generation.name(),
                error = %e,
                "failed to store response"
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{StubNetwork, activated_worker, get};
    use super::*;

    #[tokio::test]
    async fn test_cache_first_fetches_once() {
        let network = StubNetwork::new();
        network.respond("http://localhost:3000/styles/site.css", 200, "body{color:red}");
        let worker = activated_worker(network.clone()).await;

        let first = worker.handle_fetch(get("http://localhost:3000/styles/site.css")).await.unwrap();
        let second = worker.handle_fetch(get("http://localhost:3000/styles/site.css")).await.unwrap();

        assert_eq!(network.calls("http://localhost:3000/styles/site.css"), 1);
        assert_eq!(first.source, ResponseSource::Network);
        assert_eq!(second.source, ResponseSource::Cache);
        assert_eq!(second.strategy, Some(Strategy::CacheFirst));
        assert_eq!(first.response.body, second.response.body);
        assert_eq!(first.response.status, second.response.status);
    }

    #[tokio::test]
    async fn test_cache_first_serves_offline() {
        let network = StubNetwork::new();
        network.respond("http://localhost:3000/logo.svg", 200, "<svg/>");
        let worker = activated_worker(network.clone()).await;
        network.set_offline(true);

        let outcome = worker.handle_fetch(get("http://localhost:3000/logo.svg")).await.unwrap();
        assert_eq!(outcome.source, ResponseSource::Cache);
        assert_eq!(&outcome.response.body[..], b"<svg/>");
    }

    #[tokio::test]
    async fn test_cache_first_miss_offline_propagates() {
        let network = StubNetwork::new();
        let worker = activated_worker(network.clone()).await;
        network.set_offline(true);

        let result = worker.handle_fetch(get("http://localhost:3000/fonts/inter.woff2")).await;
        assert!(matches!(result, Err(Error::Network(_))));
    }

    #[tokio::test]
    async fn test_cache_first_does_not_store_errors() {
        let network = StubNetwork::new();
        network.respond("http://localhost:3000/missing.png", 404, "not found");
        let worker = activated_worker(network.clone()).await;

        let first = worker.handle_fetch(get("http://localhost:3000/missing.png")).await.unwrap();
        let second = worker.handle_fetch(get("http://localhost:3000/missing.png")).await.unwrap();

        assert_eq!(first.response.status.as_u16(), 404);
        assert_eq!(second.source, ResponseSource::Network);
        assert_eq!(network.calls("http://localhost:3000/missing.png"), 2);
    }

    #[tokio::test]
    async fn test_network_first_updates_and_falls_back() {
        let network = StubNetwork::new();
        network.respond("http://localhost:3000/api/projects", 200, "[\"a\"]");
        let worker = activated_worker(network.clone()).await;

        let fresh = worker.handle_fetch(get("http://localhost:3000/api/projects")).await.unwrap();
        assert_eq!(fresh.source, ResponseSource::Network);
        assert_eq!(fresh.strategy, Some(Strategy::NetworkFirst));

        let stored = worker
            .current_generation()
            .lookup("GET", "http://localhost:3000/api/projects")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.body, b"[\"a\"]");

        network.set_offline(true);
        let fallback = worker.handle_fetch(get("http://localhost:3000/api/projects")).await.unwrap();
        assert_eq!(fallback.source, ResponseSource::Cache);
        assert_eq!(&fallback.response.body[..], b"[\"a\"]");
    }

    #[tokio::test]
    async fn test_network_first_prefers_fresh_data() {
        let network = StubNetwork::new();
        network.respond("http://localhost:3000/api/stats", 200, "1");
        let worker = activated_worker(network.clone()).await;
        worker.handle_fetch(get("http://localhost:3000/api/stats")).await.unwrap();

        network.respond("http://localhost:3000/api/stats", 200, "2");
        let outcome = worker.handle_fetch(get("http://localhost:3000/api/stats")).await.unwrap();

        assert_eq!(&outcome.response.body[..], b"2");
        assert_eq!(network.calls("http://localhost:3000/api/stats"), 2);
    }

    #[tokio::test]
    async fn test_network_first_error_status_is_not_a_failure() {
        let network = StubNetwork::new();
        network.respond("http://localhost:3000/api/stats", 200, "1");
        let worker = activated_worker(network.clone()).await;
        worker.handle_fetch(get("http://localhost:3000/api/stats")).await.unwrap();

        network.respond("http://localhost:3000/api/stats", 500, "oops");
        let outcome = worker.handle_fetch(get("http://localhost:3000/api/stats")).await.unwrap();

        assert_eq!(outcome.source, ResponseSource::Network);
        assert_eq!(outcome.response.status.as_u16(), 500);
        let stored = worker
            .current_generation()
            .lookup("GET", "http://localhost:3000/api/stats")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.body, b"1");
    }

    #[tokio::test]
    async fn test_network_first_offline_without_cache_propagates() {
        let network = StubNetwork::new();
        let worker = activated_worker(network.clone()).await;
        network.set_offline(true);

        let result = worker.handle_fetch(get("http://localhost:3000/api/projects")).await;
        assert!(matches!(result, Err(Error::Network(_))));
    }

    #[tokio::test]
    async fn test_stale_while_revalidate_serves_stale_then_fresh() {
        let network = StubNetwork::new();
        network.respond("http://localhost:3000/projects", 200, "B");
        let worker = activated_worker(network.clone()).await;

        let first = worker.handle_fetch(get("http://localhost:3000/projects")).await.unwrap();
        assert_eq!(first.source, ResponseSource::Network);
        assert_eq!(&first.response.body[..], b"B");

        network.respond("http://localhost:3000/projects", 200, "C");
        let stale = worker.handle_fetch(get("http://localhost:3000/projects")).await.unwrap();
        assert_eq!(stale.source, ResponseSource::Cache);
        assert_eq!(stale.strategy, Some(Strategy::StaleWhileRevalidate));
        assert_eq!(&stale.response.body[..], b"B");

        worker.wait_for_revalidations().await;

        let fresh = worker.handle_fetch(get("http://localhost:3000/projects")).await.unwrap();
        assert_eq!(&fresh.response.body[..], b"C");
    }

    #[tokio::test]
    async fn test_stale_while_revalidate_does_not_wait_for_network() {
        let network = StubNetwork::new();
        network.respond("http://localhost:3000/about", 200, "old");
        let worker = activated_worker(network.clone()).await;
        worker.handle_fetch(get("http://localhost:3000/about")).await.unwrap();

        network.respond("http://localhost:3000/about", 200, "new");
        network.set_delay(std::time::Duration::from_secs(30));

        let outcome = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            worker.handle_fetch(get("http://localhost:3000/about")),
        )
        .await
        .expect("stale response should not wait for the refresh")
        .unwrap();

        assert_eq!(&outcome.response.body[..], b"old");
    }

    #[tokio::test]
    async fn test_stale_while_revalidate_keeps_entry_when_refresh_fails() {
        let network = StubNetwork::new();
        network.respond("http://localhost:3000/contact", 200, "cached");
        let worker = activated_worker(network.clone()).await;
        worker.handle_fetch(get("http://localhost:3000/contact")).await.unwrap();

        network.set_offline(true);
        let outcome = worker.handle_fetch(get("http://localhost:3000/contact")).await.unwrap();
        worker.wait_for_revalidations().await;

        assert_eq!(&outcome.response.body[..], b"cached");
        let stored = worker
            .current_generation()
            .lookup("GET", "http://localhost:3000/contact")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.body, b"cached");
    }

    #[tokio::test]
    async fn test_stale_while_revalidate_miss_offline_propagates() {
        let network = StubNetwork::new();
        let worker = activated_worker(network.clone()).await;
        network.set_offline(true);

        let result = worker.handle_fetch(get("http://localhost:3000/experience")).await;
        assert!(matches!(result, Err(Error::Network(_))));
    }

    #[tokio::test]
    async fn test_stale_while_revalidate_announces_updates() {
        let network = StubNetwork::new();
        network.respond("http://localhost:3000/skills", 200, "v1");
        let worker = activated_worker(network.clone()).await;
        let mut events = worker.subscribe();

        worker.handle_fetch(get("http://localhost:3000/skills")).await.unwrap();
        network.respond("http://localhost:3000/skills", 200, "v2");
        worker.handle_fetch(get("http://localhost:3000/skills")).await.unwrap();
        worker.wait_for_revalidations().await;

        let event = events.try_recv().unwrap();
        assert_eq!(event, WorkerEvent::CacheUpdated { url: "http://localhost:3000/skills".into() });
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_strategy_display() {
        assert_eq!(Strategy::CacheFirst.to_string(), "cache-first");
        assert_eq!(Strategy::NetworkFirst.to_string(), "network-first");
        assert_eq!(Strategy::StaleWhileRevalidate.to_string(), "stale-while-revalidate");
    }
}
