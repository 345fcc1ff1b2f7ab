//! Resource manifests and the application shell list.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Logical key of the index document.
pub const ROOT_KEY: &str = "/";

/// Mapping from logical resource key to content fingerprint.
///
/// Keys are root-relative paths without a leading `/` (`main.js`,
/// `assets/logo.png`), except the index document which is `/`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceManifest {
    entries: BTreeMap<String, String>,
}

impl ResourceManifest {
    /// Creates an empty manifest.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the fingerprint recorded for `key`.
    #[must_use]
    pub fn fingerprint(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Returns true if `key` is a managed resource.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Returns the number of managed resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no resources are managed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over the logical keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Returns true if `key` is managed by `self` and carries the same
    /// fingerprint in `previous`.
    #[must_use]
    pub fn is_unchanged_since(&self, previous: &Self, key: &str) -> bool {
        match (self.fingerprint(key), previous.fingerprint(key)) {
            (Some(current), Some(old)) => current == old,
            _ => false,
        }
    }

    /// Serializes the manifest as a JSON object.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parses a manifest from a JSON object.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the bytes are not a string-to-string object.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ResourceManifest {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Ordered list of shell resources that must be staged before activation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorePrefetchSet {
    keys: Vec<String>,
}

impl CorePrefetchSet {
    /// Returns the shell keys in fetch order.
    #[must_use]
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Returns the number of shell keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns true if there are no shell keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl<K: Into<String>> FromIterator<K> for CorePrefetchSet {
    fn from_iter<I: IntoIterator<Item = K>>(iter: I) -> Self {
        Self {
            keys: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// The build-time constants of one deployment: the manifest and its shell.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    /// Every managed resource with its fingerprint.
    pub resources: ResourceManifest,
    /// Shell files staged during install.
    pub core: CorePrefetchSet,
}

impl Deployment {
    /// Creates a deployment, checking that the shell is a subset of the manifest.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Manifest`] if a shell key is not managed.
    pub fn new(resources: ResourceManifest, core: CorePrefetchSet) -> Result<Self> {
        let deployment = Self { resources, core };
        deployment.validate()?;
        Ok(deployment)
    }

    /// Parses and validates a deployment from its JSON form:
    /// `{"resources": {key: fingerprint}, "core": [key]}`.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or the shell is inconsistent.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let deployment: Self = serde_json::from_slice(bytes)?;
        deployment.validate()?;
        Ok(deployment)
    }

    /// Loads a deployment artifact from disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is invalid.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_json(&bytes)
    }

    fn validate(&self) -> Result<()> {
        if let Some(missing) = self
            .core
            .keys()
            .iter()
            .find(|key| !self.resources.contains(key))
        {
            return Err(Error::Manifest(format!(
                "shell resource {missing:?} is not listed in the manifest"
            )));
        }
        Ok(())
    }
}
