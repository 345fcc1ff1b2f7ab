//! Named cache partitions and the storage that owns them.
//!
//! A [`CacheStorage`] hands out partitions by name, creating them lazily on
//! first open. A [`CachePartition`] maps request URLs to stored responses.

mod disk;
mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::request::Response;

pub use disk::{DiskCacheStorage, DiskPartition};
pub use memory::{MemoryCacheStorage, MemoryPartition};

/// A persistent URL → response mapping.
#[async_trait]
pub trait CachePartition: Send + Sync {
    /// Returns the response stored under `url`.
    async fn get(&self, url: &str) -> Result<Option<Response>>;

    /// Stores `response` under `url`, replacing any previous entry.
    async fn put(&self, url: &str, response: Response) -> Result<()>;

    /// Removes the entry under `url`. Returns whether an entry existed.
    async fn delete(&self, url: &str) -> Result<bool>;

    /// Lists the URLs of all stored entries.
    async fn keys(&self) -> Result<Vec<String>>;
}

/// A set of named partitions.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Partition handle type.
    type Partition: CachePartition;

    /// Opens the named partition, creating it empty if it does not exist.
    async fn open(&self, name: &str) -> Result<Self::Partition>;

    /// Deletes the named partition and all of its entries. Returns whether it existed.
    async fn delete(&self, name: &str) -> Result<bool>;

    /// Returns true if the named partition exists.
    async fn has(&self, name: &str) -> Result<bool>;

    /// Lists the names of existing partitions.
    async fn names(&self) -> Result<Vec<String>>;
}

/// Copies every entry of `from` into `to`, overwriting entries with equal URLs.
///
/// Returns the number of entries copied.
///
/// # Errors
///
/// Returns the first storage error encountered.
pub async fn copy_entries<A, B>(from: &A, to: &B) -> Result<usize>
where
    A: CachePartition + ?Sized,
    B: CachePartition + ?Sized,
{
    let mut copied = 0;
    for url in from.keys().await? {
        if let Some(response) = from.get(&url).await? {
            to.put(&url, response).await?;
            copied += 1;
        }
    }
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn copy_entries_overwrites_target() {
        let storage = MemoryCacheStorage::new();
        let from = storage.open("from").await.unwrap();
        let to = storage.open("to").await.unwrap();

        from.put("https://a.example/x", Response::new(200, "new"))
            .await
            .unwrap();
        to.put("https://a.example/x", Response::new(200, "old"))
            .await
            .unwrap();
        to.put("https://a.example/y", Response::new(200, "kept"))
            .await
            .unwrap();

        assert_eq!(copy_entries(&from, &to).await.unwrap(), 1);
        let x = to.get("https://a.example/x").await.unwrap().unwrap();
        assert_eq!(&x.body[..], b"new");
        assert!(to.get("https://a.example/y").await.unwrap().is_some());
    }
}
