//! offline-sync - versioned offline cache synchronization.
//!
//! Keeps a durable cache of a web application's static resources in step
//! with the manifest of the deployed build. Install stages the application
//! shell, activation reconciles the live cache against the previously
//! recorded manifest (keeping unchanged resources, evicting changed ones),
//! and intercepted requests are answered cache-first, or online-first for
//! the index document.
//!
//! # Example
//!
//! ```no_run
//! use offline_sync::{
//!     Deployment, HttpFetcher, MemoryCacheStorage, Request, SyncConfig, Synchronizer,
//! };
//!
//! # async fn example() -> offline_sync::Result<()> {
//! let deployment = Deployment::load("build/deployment.json".as_ref())?;
//! let config = SyncConfig::new().with_origin("https://app.example");
//! let sync = Synchronizer::new(
//!     config,
//!     deployment,
//!     MemoryCacheStorage::new(),
//!     HttpFetcher::with_defaults()?,
//! )?;
//!
//! sync.install().await?;
//! let outcome = sync.activate().await;
//! println!("activated: {}", outcome.is_activated());
//!
//! let answer = sync.fetch(&Request::get("https://app.example/main.js")).await?;
//! println!("{answer:?}");
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod cache;
pub mod config;
pub mod control;
pub mod error;
pub mod event;
pub mod format;
pub mod manifest;
pub mod net;
pub mod request;
pub mod stats;
pub mod sync;

// Re-export main types for convenience
pub use cache::{
    CachePartition, CacheStorage, DiskCacheStorage, DiskPartition, MemoryCacheStorage,
    MemoryPartition,
};
pub use config::{AppConfig, StorageConfig, SyncConfig};
pub use control::{Detached, WorkerControl};
pub use error::{Error, Result};
pub use event::{Command, EventOutcome, WorkerEvent, dispatch};
pub use format::{format_bytes, format_elapsed};
pub use manifest::{CorePrefetchSet, Deployment, ROOT_KEY, ResourceManifest};
pub use net::{Fetcher, HttpFetcher};
pub use request::{CacheMode, Method, Request, Response, canonical_url, resource_key};
pub use stats::{ActivationKind, ActivationStats, PrefetchStats};
pub use sync::{ActivationOutcome, Baseline, FetchOutcome, MANIFEST_ENTRY, Synchronizer};
