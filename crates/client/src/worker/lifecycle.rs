//! Install/activate state machine.
//!
//! ```text
//! parsed -> installing -> installed -> activating -> activated
//! ```
//!
//! Install stores the critical assets in the current generation. Activate
//! evicts every other generation and takes control of open clients. Only an
//! activated worker intercepts requests.

use std::fmt;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use serde::{Deserialize, Serialize};

use super::{FailedUrl, ServiceWorker, WorkerEvent, panic_message};
use cachewarden_core::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Parsed => "parsed",
            LifecycleState::Installing => "installing",
            LifecycleState::Installed => "installed",
            LifecycleState::Activating => "activating",
            LifecycleState::Activated => "activated",
        };
        f.write_str(name)
    }
}

/// Snapshot of the lifecycle, as reported to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleStatus {
    pub state: LifecycleState,
    /// Install stored every critical asset and asked to take over at once
    pub skip_waiting: bool,
    pub clients_claimed: bool,
}

impl Default for LifecycleStatus {
    fn default() -> Self {
        Self { state: LifecycleState::Parsed, skip_waiting: false, clients_claimed: false }
    }
}

/// Result of the install phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallReport {
    pub generation: String,
    /// Normalized URLs stored
    pub cached: Vec<String>,
    pub failed: Vec<FailedUrl>,
    /// Set when every critical asset was stored
    pub skip_waiting: bool,
    /// Older generations existed when install started
    pub update_available: bool,
}

impl InstallReport {
    pub fn succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Result of the activate phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivateReport {
    pub generation: String,
    pub deleted: Vec<String>,
    pub clients_claimed: bool,
}

impl ServiceWorker {
    /// Current lifecycle state.
    pub async fn state(&self) -> LifecycleState {
        self.lifecycle.read().await.state
    }

    pub async fn lifecycle(&self) -> LifecycleStatus {
        *self.lifecycle.read().await
    }

    pub(crate) async fn controls_clients(&self) -> bool {
        let lifecycle = self.lifecycle.read().await;
        lifecycle.state == LifecycleState::Activated && lifecycle.clients_claimed
    }

    async fn transition(&self, action: &str, from: LifecycleState, to: LifecycleState) -> Result<(), Error> {
        let mut lifecycle = self.lifecycle.write().await;
        if lifecycle.state != from {
            return Err(Error::Lifecycle { action: action.to_string(), state: lifecycle.state.to_string() });
        }
        lifecycle.state = to;
        tracing::debug!(from = %from, to = %to, "lifecycle transition");
        Ok(())
    }

    /// Store the critical assets in the current generation.
    ///
    /// Asset failures are logged and reported, never returned as errors:
    /// the worker still reaches `installed` so activation can proceed and
    /// the missing assets are filled on demand later.
    ///
    /// # Errors
    ///
    /// Returns `Error::Lifecycle` unless the worker is freshly constructed.
    /// A panic while caching returns `Error::Internal` and resets the worker
    /// to `parsed` so install can be retried.
    pub async fn install(&self) -> Result<InstallReport, Error> {
        self.transition("install", LifecycleState::Parsed, LifecycleState::Installing)
            .await?;
        let name = self.config.cache_name.clone();
        tracing::info!(generation = %name, "installing");

        let previous: Vec<String> = match self.db.generation_names().await {
            Ok(names) => names.into_iter().filter(|n| *n != name).collect(),
            Err(e) => {
                tracing::warn!(error = %e, "could not list existing generations");
                Vec::new()
            }
        };
        if !previous.is_empty() {
            tracing::info!(?previous, "new version available");
            self.emit(WorkerEvent::UpdateAvailable { previous: previous.clone() });
        }

        let (cached, failed) = match AssertUnwindSafe(self.precache(&name)).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => {
                self.lifecycle.write().await.state = LifecycleState::Parsed;
                let err = Error::Internal(panic_message(panic.as_ref()));
                tracing::error!(generation = %name, error = %err, "install aborted");
                return Err(err);
            }
        };

        let skip_waiting = failed.is_empty();
        if !skip_waiting {
            tracing::error!(generation = %name, failed = failed.len(), "cache installation failed");
        }

        {
            let mut lifecycle = self.lifecycle.write().await;
            lifecycle.state = LifecycleState::Installed;
            lifecycle.skip_waiting = skip_waiting;
        }

        Ok(InstallReport { generation: name, cached, failed, skip_waiting, update_available: !previous.is_empty() })
    }

    async fn precache(&self, name: &str) -> (Vec<String>, Vec<FailedUrl>) {
        match self.db.open_generation(name).await {
            Ok(generation) => {
                tracing::info!(count = self.config.precache_urls.len(), "caching critical resources");
                self.fetch_and_store_all(&generation, &self.config.precache_urls).await
            }
            Err(e) => {
                let reason = e.to_string();
                let failed = self
                    .config
                    .precache_urls
                    .iter()
                    .map(|url| FailedUrl { url: url.clone(), reason: reason.clone() })
                    .collect();
                (Vec::new(), failed)
            }
        }
    }

    /// Evict every generation except the current one, then claim clients.
    ///
    /// # Errors
    ///
    /// Returns `Error::Lifecycle` unless installed, or a cache error if
    /// eviction fails; the worker then stays `installed`.
    pub async fn activate(&self) -> Result<ActivateReport, Error> {
        self.transition("activate", LifecycleState::Installed, LifecycleState::Activating)
            .await?;
        let name = self.config.cache_name.clone();
        tracing::info!(generation = %name, "activating");

        match self.evict_stale_generations(&name).await {
            Ok(deleted) => {
                let mut lifecycle = self.lifecycle.write().await;
                lifecycle.state = LifecycleState::Activated;
                lifecycle.clients_claimed = true;
                tracing::info!(generation = %name, deleted = deleted.len(), "activated, clients claimed");
                Ok(ActivateReport { generation: name, deleted, clients_claimed: true })
            }
            Err(e) => {
                self.lifecycle.write().await.state = LifecycleState::Installed;
                tracing::error!(error = %e, "activation failed");
                Err(e)
            }
        }
    }

    async fn evict_stale_generations(&self, current: &str) -> Result<Vec<String>, Error> {
        let mut deleted = Vec::new();
        for name in self.db.generation_names().await? {
            if name != current {
                tracing::info!(generation = %name, "deleting old cache");
                self.db.delete_generation(&name).await?;
                deleted.push(name);
            }
        }

        // Install may have failed before the generation existed.
        self.db.open_generation(current).await?;

        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{StubNetwork, worker_with, worker_with_db};
    use super::*;
    use cachewarden_core::CacheDb;

    #[tokio::test]
    async fn test_state_machine_order() {
        let network = StubNetwork::new();
        network.respond_defaults();
        let worker = worker_with(network).await;
        assert_eq!(worker.state().await, LifecycleState::Parsed);

        let err = worker.activate().await.unwrap_err();
        assert!(matches!(err, Error::Lifecycle { .. }));
        assert_eq!(worker.state().await, LifecycleState::Parsed);

        worker.install().await.unwrap();
        assert_eq!(worker.state().await, LifecycleState::Installed);
        assert!(matches!(worker.install().await, Err(Error::Lifecycle { .. })));

        worker.activate().await.unwrap();
        assert_eq!(worker.state().await, LifecycleState::Activated);
        assert!(matches!(worker.activate().await, Err(Error::Lifecycle { .. })));
    }

    #[tokio::test]
    async fn test_install_caches_critical_assets() {
        let network = StubNetwork::new();
        network.respond_defaults();
        let worker = worker_with(network.clone()).await;

        let report = worker.install().await.unwrap();

        assert!(report.succeeded());
        assert!(report.skip_waiting);
        assert!(!report.update_available);
        assert_eq!(report.cached.len(), 4);
        assert!(report.cached.contains(&"http://localhost:3000/manifest.json".to_string()));
        assert!(worker.lifecycle().await.skip_waiting);

        let generation = worker.current_generation();
        assert_eq!(generation.entry_count().await.unwrap(), 4);
        assert!(generation.lookup("GET", "http://localhost:3000/").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_install_failure_is_isolated() {
        let network = StubNetwork::new();
        network.respond_defaults();
        network.fail("http://localhost:3000/images/profile.jpg");
        let worker = worker_with(network.clone()).await;

        let report = worker.install().await.unwrap();

        assert!(!report.succeeded());
        assert!(!report.skip_waiting);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].url, "/images/profile.jpg");
        assert_eq!(report.cached.len(), 3);
        assert_eq!(worker.state().await, LifecycleState::Installed);

        assert!(!worker.lifecycle().await.skip_waiting);

        let activated = worker.activate().await.unwrap();
        assert!(activated.clients_claimed);
        assert!(worker.lifecycle().await.clients_claimed);
        assert_eq!(worker.state().await, LifecycleState::Activated);
        assert_eq!(worker.current_generation().entry_count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_install_panic_resets_state() {
        let network = StubNetwork::new();
        network.respond_defaults();
        network.panic_once("http://localhost:3000/logo.svg");
        let worker = worker_with(network).await;

        let err = worker.install().await.unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
        assert_eq!(worker.state().await, LifecycleState::Parsed);

        let report = worker.install().await.unwrap();
        assert!(report.succeeded());
        assert_eq!(report.cached.len(), 4);
        assert_eq!(worker.state().await, LifecycleState::Installed);
    }

    #[tokio::test]
    async fn test_install_error_status_counts_as_failure() {
        let network = StubNetwork::new();
        network.respond_defaults();
        network.respond("http://localhost:3000/logo.svg", 404, "gone");
        let worker = worker_with(network).await;

        let report = worker.install().await.unwrap();
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].reason, "status 404");
    }

    #[tokio::test]
    async fn test_activate_evicts_old_generations() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.open_generation("v1").await.unwrap();
        db.open_generation("v2").await.unwrap();

        let network = StubNetwork::new();
        network.respond_defaults();
        let worker = worker_with_db(network, db.clone(), "v2");
        let mut events = worker.subscribe();

        let installed = worker.install().await.unwrap();
        assert!(installed.update_available);
        assert_eq!(events.try_recv().unwrap(), WorkerEvent::UpdateAvailable { previous: vec!["v1".to_string()] });

        let report = worker.activate().await.unwrap();

        assert_eq!(report.deleted, vec!["v1".to_string()]);
        assert_eq!(db.generation_names().await.unwrap(), vec!["v2".to_string()]);
    }

    #[tokio::test]
    async fn test_activate_keeps_current_entries() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let network = StubNetwork::new();
        network.respond_defaults();

        let old = worker_with_db(network.clone(), db.clone(), "portfolio-v1");
        old.install().await.unwrap();
        old.activate().await.unwrap();

        let new = worker_with_db(network, db.clone(), "portfolio-v2");
        new.install().await.unwrap();
        let report = new.activate().await.unwrap();

        assert_eq!(report.deleted, vec!["portfolio-v1".to_string()]);
        assert_eq!(new.current_generation().entry_count().await.unwrap(), 4);
        assert_eq!(db.generation_names().await.unwrap(), vec!["portfolio-v2".to_string()]);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(LifecycleState::Activated.to_string(), "activated");
        assert_eq!(serde_json::to_value(LifecycleState::Installing).unwrap(), "installing");
    }
}
