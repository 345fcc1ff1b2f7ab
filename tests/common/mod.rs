//! Shared fakes for synchronizer integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use offline_sync::{
    CachePartition, CacheStorage, Deployment, Error, Fetcher, MemoryCacheStorage,
    MemoryPartition, Request, Response, Result, ResourceManifest, SyncConfig, Synchronizer,
    WorkerControl,
};

pub const ORIGIN: &str = "https://app.example";
pub const STAGING: &str = "offline-temp-cache";
pub const LIVE: &str = "offline-app-cache";
pub const RECORD: &str = "offline-app-manifest";

pub fn url(key: &str) -> String {
    offline_sync::canonical_url(ORIGIN, key)
}

pub fn manifest(pairs: &[(&str, &str)]) -> ResourceManifest {
    pairs.iter().copied().collect()
}

pub fn deployment(pairs: &[(&str, &str)], core: &[&str]) -> Deployment {
    Deployment::new(manifest(pairs), core.iter().copied().collect()).unwrap()
}

pub fn config() -> SyncConfig {
    SyncConfig::new().with_origin(ORIGIN)
}

/// A scripted origin server. URLs are matched without their query string;
/// unknown URLs answer 404.
#[derive(Default)]
pub struct FakeNetwork {
    pages: Mutex<HashMap<String, Response>>,
    offline: AtomicBool,
    calls: Mutex<Vec<Request>>,
}

impl FakeNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn serve(&self, key: &str, body: &str) {
        self.pages
            .lock()
            .unwrap()
            .insert(url(key), Response::new(200, body.to_string()));
    }

    pub fn serve_status(&self, key: &str, status: u16) {
        self.pages
            .lock()
            .unwrap()
            .insert(url(key), Response::new(status, "error"));
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<Request> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Fetcher for FakeNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response> {
        self.calls.lock().unwrap().push(request.clone());
        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::Network {
                url: request.url.clone(),
                reason: "offline".to_string(),
            });
        }
        let path = request.url.split('?').next().unwrap_or_default();
        Ok(self
            .pages
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .unwrap_or_else(|| Response::new(404, "not found")))
    }
}

/// Counts lifecycle signals.
#[derive(Default)]
pub struct RecordingControl {
    pub skip_waiting: AtomicUsize,
    pub claims: AtomicUsize,
}

impl WorkerControl for RecordingControl {
    fn skip_waiting(&self) {
        self.skip_waiting.fetch_add(1, Ordering::SeqCst);
    }

    fn claim_clients(&self) {
        self.claims.fetch_add(1, Ordering::SeqCst);
    }
}

pub type TestSync = Synchronizer<MemoryCacheStorage, Arc<FakeNetwork>, Arc<RecordingControl>>;

pub struct Harness {
    pub storage: MemoryCacheStorage,
    pub network: Arc<FakeNetwork>,
    pub control: Arc<RecordingControl>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            storage: MemoryCacheStorage::new(),
            network: FakeNetwork::new(),
            control: Arc::new(RecordingControl::default()),
        }
    }

    /// Builds a synchronizer for `deployment` sharing this harness's storage,
    /// as a new worker version would.
    pub fn worker(&self, deployment: Deployment) -> Arc<TestSync> {
        Arc::new(
            Synchronizer::with_control(
                config(),
                deployment,
                self.storage.clone(),
                Arc::clone(&self.network),
                Arc::clone(&self.control),
            )
            .unwrap(),
        )
    }

    pub async fn partition(&self, name: &str) -> MemoryPartition {
        self.storage.open(name).await.unwrap()
    }

    pub async fn live_keys(&self) -> Vec<String> {
        self.partition(LIVE).await.keys().await.unwrap()
    }

    pub async fn live_body(&self, key: &str) -> Option<String> {
        self.partition(LIVE)
            .await
            .get(&url(key))
            .await
            .unwrap()
            .map(|r| String::from_utf8(r.body.to_vec()).unwrap())
    }
}

/// Wraps a memory storage so that writes to one partition fail.
#[derive(Clone)]
pub struct FailingWrites {
    pub inner: MemoryCacheStorage,
    pub failing_partition: String,
}

pub struct FailingPartition {
    inner: MemoryPartition,
    fail_puts: bool,
}

#[async_trait]
impl CachePartition for FailingPartition {
    async fn get(&self, url: &str) -> Result<Option<Response>> {
        self.inner.get(url).await
    }

    async fn put(&self, url: &str, response: Response) -> Result<()> {
        if self.fail_puts {
            return Err(Error::Storage(format!("quota exceeded writing {url}")));
        }
        self.inner.put(url, response).await
    }

    async fn delete(&self, url: &str) -> Result<bool> {
        self.inner.delete(url).await
    }

    async fn keys(&self) -> Result<Vec<String>> {
        self.inner.keys().await
    }
}

#[async_trait]
impl CacheStorage for FailingWrites {
    type Partition = FailingPartition;

    async fn open(&self, name: &str) -> Result<FailingPartition> {
        Ok(FailingPartition {
            inner: self.inner.open(name).await?,
            fail_puts: name == self.failing_partition,
        })
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        self.inner.delete(name).await
    }

    async fn has(&self, name: &str) -> Result<bool> {
        self.inner.has(name).await
    }

    async fn names(&self) -> Result<Vec<String>> {
        self.inner.names().await
    }
}

/// Wraps a memory storage so that one partition cannot be opened.
#[derive(Clone)]
pub struct UnopenablePartition {
    pub inner: MemoryCacheStorage,
    pub partition: String,
}

#[async_trait]
impl CacheStorage for UnopenablePartition {
    type Partition = MemoryPartition;

    async fn open(&self, name: &str) -> Result<MemoryPartition> {
        if name == self.partition {
            return Err(Error::Storage(format!("cannot open {name}")));
        }
        self.inner.open(name).await
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        self.inner.delete(name).await
    }

    async fn has(&self, name: &str) -> Result<bool> {
        self.inner.has(name).await
    }

    async fn names(&self) -> Result<Vec<String>> {
        self.inner.names().await
    }
}
