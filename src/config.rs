//! Configuration types for cache synchronization.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Configuration for the synchronizer: origin and partition layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Origin the managed resources are served from, e.g. `https://app.example`.
    pub origin: String,
    /// Name of the partition that holds freshly installed shell files.
    pub staging_partition: String,
    /// Name of the partition that serves runtime requests.
    pub live_partition: String,
    /// Name of the partition that holds the last activated manifest.
    pub manifest_partition: String,
    /// Number of concurrent requests used when fetching a batch.
    pub prefetch_concurrency: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            origin: "http://localhost".to_string(),
            staging_partition: "offline-temp-cache".to_string(),
            live_partition: "offline-app-cache".to_string(),
            manifest_partition: "offline-app-manifest".to_string(),
            prefetch_concurrency: 4,
        }
    }
}

impl SyncConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the origin. A trailing `/` is dropped.
    #[must_use]
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = normalize_origin(&origin.into());
        self
    }

    /// Sets the three partition names (staging, live, manifest).
    #[must_use]
    pub fn with_partitions(
        mut self,
        staging: impl Into<String>,
        live: impl Into<String>,
        manifest: impl Into<String>,
    ) -> Self {
        self.staging_partition = staging.into();
        self.live_partition = live.into();
        self.manifest_partition = manifest.into();
        self
    }

    /// Sets the number of concurrent requests per batch.
    #[must_use]
    pub const fn with_prefetch_concurrency(mut self, concurrency: usize) -> Self {
        self.prefetch_concurrency = concurrency;
        self
    }

    /// Checks that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the origin is not an http(s) origin, the
    /// partition names collide, or the concurrency is zero.
    pub fn validate(&self) -> Result<()> {
        if !(self.origin.starts_with("http://") || self.origin.starts_with("https://")) {
            return Err(Error::Config(format!(
                "origin must start with http:// or https://, got {:?}",
                self.origin
            )));
        }
        if self.origin.ends_with('/') {
            return Err(Error::Config("origin must not end with '/'".to_string()));
        }
        let names = [
            &self.staging_partition,
            &self.live_partition,
            &self.manifest_partition,
        ];
        if names.iter().any(|n| n.is_empty()) {
            return Err(Error::Config("partition names must not be empty".to_string()));
        }
        if names[0] == names[1] || names[1] == names[2] || names[0] == names[2] {
            return Err(Error::Config("partition names must be distinct".to_string()));
        }
        if self.prefetch_concurrency == 0 {
            return Err(Error::Config(
                "prefetch_concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn normalize_origin(origin: &str) -> String {
    origin.trim().trim_end_matches('/').to_string()
}

/// Where durable cache partitions are kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory that holds one sub-directory per partition.
    pub cache_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            cache_dir: data_dir.join("offline-sync").join("caches"),
        }
    }
}

/// Complete application configuration combining sync and storage settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Synchronizer configuration.
    pub sync: SyncConfig,
    /// Storage configuration.
    pub storage: StorageConfig,
}

impl AppConfig {
    /// Creates a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses configuration from TOML text and validates it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the text is not valid TOML or fails validation.
    pub fn from_toml(text: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.sync.origin = normalize_origin(&config.sync.origin);
        config.sync.validate()?;
        Ok(config)
    }

    /// Loads configuration from a TOML file. A missing file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_toml(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(Error::Io(e)),
        }
    }
}
