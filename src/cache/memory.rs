//! In-memory cache storage.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::{CachePartition, CacheStorage};
use crate::error::Result;
use crate::request::Response;

type Entries = Arc<Mutex<BTreeMap<String, Response>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Cache storage that lives only as long as the value.
///
/// Clones share the same partitions. A partition handle that outlives a
/// `delete` of its name keeps working on its own detached entries, while the
/// next `open` of that name starts empty.
#[derive(Debug, Clone, Default)]
pub struct MemoryCacheStorage {
    partitions: Arc<Mutex<BTreeMap<String, Entries>>>,
}

impl MemoryCacheStorage {
    /// Creates an empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    type Partition = MemoryPartition;

    async fn open(&self, name: &str) -> Result<MemoryPartition> {
        let entries = Arc::clone(lock(&self.partitions).entry(name.to_string()).or_default());
        Ok(MemoryPartition { entries })
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        Ok(lock(&self.partitions).remove(name).is_some())
    }

    async fn has(&self, name: &str) -> Result<bool> {
        Ok(lock(&self.partitions).contains_key(name))
    }

    async fn names(&self) -> Result<Vec<String>> {
        Ok(lock(&self.partitions).keys().cloned().collect())
    }
}

/// Handle to one partition of a [`MemoryCacheStorage`].
#[derive(Debug, Clone)]
pub struct MemoryPartition {
    entries: Entries,
}

impl MemoryPartition {
    /// Returns the number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    /// Returns true if the partition holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        lock(&self.entries).is_empty()
    }
}

#[async_trait]
impl CachePartition for MemoryPartition {
    async fn get(&self, url: &str) -> Result<Option<Response>> {
        Ok(lock(&self.entries).get(url).cloned())
    }

    async fn put(&self, url: &str, response: Response) -> Result<()> {
        lock(&self.entries).insert(url.to_string(), response);
        Ok(())
    }

    async fn delete(&self, url: &str) -> Result<bool> {
        Ok(lock(&self.entries).remove(url).is_some())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(lock(&self.entries).keys().cloned().collect())
    }
}
