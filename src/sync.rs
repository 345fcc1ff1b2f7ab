//! The offline cache synchronizer.
//!
//! Owns three partitions of a [`CacheStorage`]:
//!
//! - *staging* receives the application shell during [`install`](Synchronizer::install)
//!   and is drained and deleted by [`activate`](Synchronizer::activate);
//! - *live* serves runtime requests;
//! - *manifest* holds the manifest of the last successful activation, which
//!   is the baseline for the next one.
//!
//! Entries are keyed by the canonical URL of their logical resource key, so
//! `main.js?v=3` and `main.js` resolve to the same entry.

use std::collections::HashSet;
use std::sync::Arc;

use futures::{StreamExt, TryStreamExt, stream};
use tokio::task::JoinHandle;

use crate::cache::{CachePartition, CacheStorage, copy_entries};
use crate::config::SyncConfig;
use crate::control::{Detached, WorkerControl};
use crate::error::{Error, Result};
use crate::event::Command;
use crate::manifest::{Deployment, ROOT_KEY, ResourceManifest};
use crate::net::Fetcher;
use crate::request::{CacheMode, Method, Request, Response, canonical_url, resource_key, stored_key};
use crate::stats::{ActivationKind, ActivationStats, ActivationStatsBuilder, PrefetchStats};

/// Entry key of the manifest record inside the manifest partition.
pub const MANIFEST_ENTRY: &str = "manifest";

/// What the manifest partition says about the previous activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Baseline {
    /// Nothing was ever activated.
    FreshInstall,
    /// The manifest recorded by the previous successful activation.
    Upgrade(ResourceManifest),
}

/// Result of an activation attempt.
#[derive(Debug, Clone)]
pub enum ActivationOutcome {
    /// Reconciliation completed and the new manifest was recorded.
    Activated(ActivationStats),
    /// Reconciliation failed and all three partitions were deleted.
    Reset {
        /// Description of the failure that triggered the reset.
        reason: String,
    },
}

impl ActivationOutcome {
    /// Returns true if reconciliation completed.
    #[must_use]
    pub const fn is_activated(&self) -> bool {
        matches!(self, Self::Activated(_))
    }
}

/// How an intercepted request should be answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Not a managed resource; the host performs its default handling.
    Passthrough,
    /// Answer with this response.
    Respond(Response),
}

/// Keeps a live cache partition in step with a deployment's manifest.
pub struct Synchronizer<S: CacheStorage, F: Fetcher, C: WorkerControl = Detached> {
    config: SyncConfig,
    deployment: Deployment,
    storage: S,
    fetcher: F,
    control: C,
}

impl<S: CacheStorage, F: Fetcher> Synchronizer<S, F, Detached> {
    /// Creates a synchronizer that sends no lifecycle signals.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `config` is invalid.
    pub fn new(config: SyncConfig, deployment: Deployment, storage: S, fetcher: F) -> Result<Self> {
        Self::with_control(config, deployment, storage, fetcher, Detached)
    }
}

impl<S: CacheStorage, F: Fetcher, C: WorkerControl> Synchronizer<S, F, C> {
    /// Creates a synchronizer that reports lifecycle signals to `control`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `config` is invalid.
    pub fn with_control(
        config: SyncConfig,
        deployment: Deployment,
        storage: S,
        fetcher: F,
        control: C,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            deployment,
            storage,
            fetcher,
            control,
        })
    }

    /// Returns the synchronizer configuration.
    #[must_use]
    pub const fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns the deployment being synchronized.
    #[must_use]
    pub const fn deployment(&self) -> &Deployment {
        &self.deployment
    }

    /// Returns the underlying cache storage.
    #[must_use]
    pub const fn storage(&self) -> &S {
        &self.storage
    }

    /// Stages the application shell.
    ///
    /// Every shell file is fetched from the network, bypassing intermediate
    /// caches. Nothing is written unless every fetch produced an ok response.
    /// Only the staging partition is touched. Returns the number of staged files.
    ///
    /// # Errors
    ///
    /// Returns the first network, status or storage error.
    pub async fn install(&self) -> Result<usize> {
        self.control.skip_waiting();

        let requests: Vec<Request> = self
            .deployment
            .core
            .keys()
            .iter()
            .map(|key| {
                Request::get(canonical_url(&self.config.origin, key))
                    .with_cache_mode(CacheMode::Reload)
            })
            .collect();
        let fetched = self.fetch_batch(requests).await?;
        let staged = fetched.len();

        let staging = self.storage.open(&self.config.staging_partition).await?;
        for (url, response) in fetched {
            if let Err(e) = staging.put(&url, response).await {
                // A partially staged shell must not survive into activation.
                if let Err(cleanup) = self.storage.delete(&self.config.staging_partition).await {
                    log::warn!("Could not discard partial staging: {cleanup}");
                }
                return Err(e);
            }
        }

        log::info!("Staged {staged} shell files");
        Ok(staged)
    }

    /// Promotes the staged shell into the live partition and records the
    /// current manifest.
    ///
    /// On any failure all three partitions are deleted, so the next
    /// activation starts cold instead of from an inconsistent state.
    pub async fn activate(&self) -> ActivationOutcome {
        match self.reconcile().await {
            Ok(stats) => {
                log::info!(
                    "Activated ({:?}): {} retained, {} evicted, {} promoted",
                    stats.kind,
                    stats.retained,
                    stats.evicted,
                    stats.promoted
                );
                self.control.claim_clients();
                ActivationOutcome::Activated(stats)
            }
            Err(e) => {
                log::error!("Failed to upgrade offline cache: {e}");
                self.wipe().await;
                ActivationOutcome::Reset {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Reads the manifest recorded by the last successful activation.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be read or parsed.
    pub async fn baseline(&self) -> Result<Baseline> {
        let record = self.storage.open(&self.config.manifest_partition).await?;
        Self::read_baseline(&record).await
    }

    async fn read_baseline(record: &S::Partition) -> Result<Baseline> {
        match record.get(MANIFEST_ENTRY).await? {
            Some(response) => Ok(Baseline::Upgrade(ResourceManifest::from_json(&response.body)?)),
            None => Ok(Baseline::FreshInstall),
        }
    }

    async fn reconcile(&self) -> Result<ActivationStats> {
        let cfg = &self.config;
        let mut live = self.storage.open(&cfg.live_partition).await?;
        let staging = self.storage.open(&cfg.staging_partition).await?;
        let record = self.storage.open(&cfg.manifest_partition).await?;

        let mut builder = match Self::read_baseline(&record).await? {
            Baseline::FreshInstall => {
                // Whatever is in live was not written against a known manifest.
                self.storage.delete(&cfg.live_partition).await?;
                live = self.storage.open(&cfg.live_partition).await?;
                ActivationStatsBuilder::new(ActivationKind::FreshInstall)
            }
            Baseline::Upgrade(previous) => {
                let mut builder = ActivationStatsBuilder::new(ActivationKind::Upgrade);
                let current = &self.deployment.resources;
                for url in live.keys().await? {
                    let key = stored_key(&cfg.origin, &url);
                    if current.is_unchanged_since(&previous, &key) {
                        builder.add_retained();
                    } else {
                        log::debug!("Evicting {key}");
                        live.delete(&url).await?;
                        builder.add_evicted();
                    }
                }
                builder
            }
        };

        // Staged shell files overwrite anything retained above.
        builder.set_promoted(copy_entries(&staging, &live).await?);
        self.storage.delete(&cfg.staging_partition).await?;

        let body = self.deployment.resources.to_json()?;
        let record_entry = Response::new(200, body).with_header("content-type", "application/json");
        record.put(MANIFEST_ENTRY, record_entry).await?;

        Ok(builder.build())
    }

    async fn wipe(&self) {
        let cfg = &self.config;
        for name in [
            &cfg.live_partition,
            &cfg.staging_partition,
            &cfg.manifest_partition,
        ] {
            if let Err(e) = self.storage.delete(name).await {
                log::error!("Could not delete partition {name}: {e}");
            }
        }
    }

    /// Decides how to answer an intercepted request.
    ///
    /// Only GET requests for managed resources are answered. The index
    /// document is served online-first; every other resource cache-first,
    /// populating the live partition on a successful miss.
    ///
    /// # Errors
    ///
    /// Returns a network error when no response can be produced, or a
    /// storage error when the live partition cannot be read.
    pub async fn fetch(&self, request: &Request) -> Result<FetchOutcome> {
        if request.method != Method::Get {
            return Ok(FetchOutcome::Passthrough);
        }
        let Some(key) = resource_key(&self.config.origin, &request.url) else {
            return Ok(FetchOutcome::Passthrough);
        };
        if !self.deployment.resources.contains(&key) {
            log::debug!("Unmanaged request {}", request.url);
            return Ok(FetchOutcome::Passthrough);
        }

        let cache_url = canonical_url(&self.config.origin, &key);
        let response = if key == ROOT_KEY {
            self.online_first(request, &cache_url).await?
        } else {
            self.cache_first(request, &cache_url).await?
        };
        Ok(FetchOutcome::Respond(response))
    }

    async fn online_first(&self, request: &Request, cache_url: &str) -> Result<Response> {
        match self.fetcher.fetch(request).await {
            Ok(response) => {
                let stored = match self.storage.open(&self.config.live_partition).await {
                    Ok(live) => live.put(cache_url, response.clone()).await,
                    Err(e) => Err(e),
                };
                if let Err(e) = stored {
                    log::warn!("Could not cache {cache_url}: {e}");
                }
                Ok(response)
            }
            Err(e) => {
                log::warn!("Network failed for {}, trying cache: {e}", request.url);
                let live = self.storage.open(&self.config.live_partition).await?;
                live.get(cache_url).await?.ok_or(e)
            }
        }
    }

    async fn cache_first(&self, request: &Request, cache_url: &str) -> Result<Response> {
        let live = self.storage.open(&self.config.live_partition).await?;
        if let Some(cached) = live.get(cache_url).await? {
            return Ok(cached);
        }

        let response = self.fetcher.fetch(request).await?;
        if response.is_ok()
            && let Err(e) = live.put(cache_url, response.clone()).await
        {
            log::warn!("Could not cache {cache_url}: {e}");
        }
        Ok(response)
    }

    /// Fetches every managed resource that is not yet in the live partition.
    ///
    /// The batch is all-or-nothing: if any resource fails or answers with a
    /// non-ok status, nothing is stored.
    ///
    /// # Errors
    ///
    /// Returns the first network, status or storage error.
    pub async fn download_offline(&self) -> Result<PrefetchStats> {
        let origin = &self.config.origin;
        let live = self.storage.open(&self.config.live_partition).await?;
        let present: HashSet<String> = live
            .keys()
            .await?
            .iter()
            .map(|url| stored_key(origin, url))
            .collect();

        let missing: Vec<Request> = self
            .deployment
            .resources
            .keys()
            .filter(|key| !present.contains(*key))
            .map(|key| Request::get(canonical_url(origin, key)))
            .collect();
        let skipped = self.deployment.resources.len() - missing.len();

        let fetched = self.fetch_batch(missing).await?;
        let mut stats = PrefetchStats {
            fetched: fetched.len(),
            skipped,
            total_bytes: 0,
        };
        for (url, response) in fetched {
            stats.total_bytes += response.body.len() as u64;
            live.put(&url, response).await?;
        }

        log::info!(
            "Offline download stored {} resources ({} already cached)",
            stats.fetched,
            stats.skipped
        );
        Ok(stats)
    }

    /// Fetches all requests concurrently, failing on the first transport
    /// error or non-ok response. Results keep the request order.
    async fn fetch_batch(&self, requests: Vec<Request>) -> Result<Vec<(String, Response)>> {
        stream::iter(requests)
            .map(|request| async move {
                let response = self.fetcher.fetch(&request).await?;
                if !response.is_ok() {
                    return Err(Error::BadStatus {
                        url: request.url,
                        status: response.status,
                    });
                }
                Ok((request.url, response))
            })
            .buffered(self.config.prefetch_concurrency)
            .try_collect()
            .await
    }
}

impl<S, F, C> Synchronizer<S, F, C>
where
    S: CacheStorage + 'static,
    F: Fetcher + 'static,
    C: WorkerControl + 'static,
{
    /// Handles an out-of-band command.
    ///
    /// `SkipWaiting` is forwarded to the host immediately. `DownloadOffline`
    /// runs in a background task whose handle is returned; dropping the
    /// handle does not cancel the download.
    pub fn message(self: &Arc<Self>, command: Command) -> Option<JoinHandle<Result<PrefetchStats>>> {
        match command {
            Command::SkipWaiting => {
                self.control.skip_waiting();
                None
            }
            Command::DownloadOffline => {
                let this = Arc::clone(self);
                Some(tokio::spawn(async move {
                    let result = this.download_offline().await;
                    if let Err(ref e) = result {
                        log::error!("Offline download failed: {e}");
                    }
                    result
                }))
            }
        }
    }
}
