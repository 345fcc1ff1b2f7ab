//! Durable cache storage backed by a directory tree.
//!
//! Layout: `{root}/{partition}/{sha256(url)}.json`. Each entry file holds the
//! URL, status, headers, base64 body and the time it was stored. Each write
//! goes to its own `.tmp` sibling first and is renamed into place, so
//! concurrent writers of one URL never share a temporary file.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{CachePartition, CacheStorage};
use crate::error::{Error, Result};
use crate::request::Response;

const ENTRY_EXT: &str = "json";

static WRITE_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
    url: String,
    status: u16,
    headers: Vec<(String, String)>,
    body: String,
    stored_at: DateTime<Utc>,
}

impl StoredEntry {
    fn new(url: &str, response: &Response) -> Self {
        Self {
            url: url.to_string(),
            status: response.status,
            headers: response.headers.clone(),
            body: BASE64.encode(&response.body),
            stored_at: Utc::now(),
        }
    }

    fn into_response(self) -> Result<Response> {
        let body = BASE64
            .decode(&self.body)
            .map_err(|e| Error::Storage(format!("corrupt body for {}: {e}", self.url)))?;
        Ok(Response {
            status: self.status,
            headers: self.headers,
            body: body.into(),
        })
    }
}

/// Partition names become directory names, so only a safe alphabet is allowed.
fn check_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(Error::Storage(format!("invalid partition name {name:?}")))
    }
}

/// The part of an entry file needed to list keys; the body is skipped.
#[derive(Deserialize)]
struct StoredUrl {
    url: String,
}

fn entry_file_name(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    format!("{digest:x}.{ENTRY_EXT}")
}

fn temp_file_name(url: &str) -> String {
    let seq = WRITE_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("{}.{}-{seq}.tmp", entry_file_name(url), std::process::id())
}

/// Cache storage that persists partitions on disk.
#[derive(Debug, Clone)]
pub struct DiskCacheStorage {
    root: PathBuf,
}

impl DiskCacheStorage {
    /// Creates a storage rooted at `root`. Nothing is created until a partition is opened.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn partition_dir(&self, name: &str) -> Result<PathBuf> {
        check_name(name)?;
        Ok(self.root.join(name))
    }
}

#[async_trait]
impl CacheStorage for DiskCacheStorage {
    type Partition = DiskPartition;

    async fn open(&self, name: &str) -> Result<DiskPartition> {
        let dir = self.partition_dir(name)?;
        tokio::fs::create_dir_all(&dir).await?;
        Ok(DiskPartition { dir })
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        let dir = self.partition_dir(name)?;
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn has(&self, name: &str) -> Result<bool> {
        let dir = self.partition_dir(name)?;
        Ok(tokio::fs::metadata(&dir).await.is_ok_and(|m| m.is_dir()))
    }

    async fn names(&self) -> Result<Vec<String>> {
        let mut read_dir = match tokio::fs::read_dir(&self.root).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut names = Vec::new();
        while let Some(entry) = read_dir.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }
}

/// Handle to one on-disk partition.
#[derive(Debug, Clone)]
pub struct DiskPartition {
    dir: PathBuf,
}

impl DiskPartition {
    /// Returns the partition directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn read_entry(path: &Path) -> Result<Option<StoredEntry>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn read_url(path: &Path) -> Result<Option<StoredUrl>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl CachePartition for DiskPartition {
    async fn get(&self, url: &str) -> Result<Option<Response>> {
        let path = self.dir.join(entry_file_name(url));
        match Self::read_entry(&path).await? {
            Some(entry) if entry.url == url => entry.into_response().map(Some),
            Some(entry) => Err(Error::Storage(format!(
                "entry {} holds {} instead of {url}",
                path.display(),
                entry.url
            ))),
            None => Ok(None),
        }
    }

    async fn put(&self, url: &str, response: Response) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(entry_file_name(url));
        let tmp_path = self.dir.join(temp_file_name(url));

        let bytes = serde_json::to_vec(&StoredEntry::new(url, &response))?;
        tokio::fs::write(&tmp_path, bytes).await?;
        if let Err(e) = tokio::fs::rename(&tmp_path, &path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn delete(&self, url: &str) -> Result<bool> {
        let path = self.dir.join(entry_file_name(url));
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut read_dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut urls = Vec::new();
        while let Some(entry) = read_dir.next_entry().await? {
            let path = entry.path();
            // Skips leftover `.tmp` files from interrupted writes.
            if path.extension().is_some_and(|ext| ext == ENTRY_EXT)
                && let Some(stored) = Self::read_url(&path).await?
            {
                urls.push(stored.url);
            }
        }
        urls.sort();
        Ok(urls)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn put_get_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let url = "https://app.example/main.js";
        {
            let storage = DiskCacheStorage::new(dir.path());
            let p = storage.open("live").await.unwrap();
            let resp = Response::new(200, "console.log(1)")
                .with_header("content-type", "text/javascript");
            p.put(url, resp).await.unwrap();
        }

        let storage = DiskCacheStorage::new(dir.path());
        assert!(storage.has("live").await.unwrap());
        let p = storage.open("live").await.unwrap();
        let resp = p.get(url).await.unwrap().unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(&resp.body[..], b"console.log(1)");
        assert_eq!(resp.header("Content-Type"), Some("text/javascript"));
        assert_eq!(p.keys().await.unwrap(), vec![url.to_string()]);
    }

    #[tokio::test]
    async fn keys_ignore_temporary_files() {
        let dir = TempDir::new().unwrap();
        let storage = DiskCacheStorage::new(dir.path());
        let p = storage.open("live").await.unwrap();
        p.put("https://a.example/x", Response::new(200, "x"))
            .await
            .unwrap();
        std::fs::write(p.dir().join("abc.json.tmp"), b"partial").unwrap();

        assert_eq!(p.keys().await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writes_to_one_url_all_succeed() {
        let dir = TempDir::new().unwrap();
        let storage = DiskCacheStorage::new(dir.path());
        let p = storage.open("live").await.unwrap();
        let url = "https://a.example/main.js";

        for round in 0..20 {
            let mut tasks = Vec::new();
            for writer in 0..4 {
                let p = p.clone();
                tasks.push(tokio::spawn(async move {
                    p.put(url, Response::new(200, format!("{round}-{writer}")))
                        .await
                }));
            }
            for task in tasks {
                task.await.unwrap().unwrap();
            }
            let body = p.get(url).await.unwrap().unwrap().body;
            assert!(String::from_utf8(body.to_vec()).unwrap().starts_with(&format!("{round}-")));
        }

        assert_eq!(p.keys().await.unwrap(), vec![url.to_string()]);
        let leftovers = std::fs::read_dir(p.dir())
            .unwrap()
            .filter(|e| e.as_ref().unwrap().path().extension().is_some_and(|x| x == "tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn keys_read_only_the_url() {
        let dir = TempDir::new().unwrap();
        let storage = DiskCacheStorage::new(dir.path());
        let p = storage.open("live").await.unwrap();
        let url = "https://a.example/x";
        // Listing keys does not decode the body.
        let entry = serde_json::json!({ "url": url, "body": "not base64!!" });
        std::fs::write(
            p.dir().join(entry_file_name(url)),
            serde_json::to_vec(&entry).unwrap(),
        )
        .unwrap();

        assert_eq!(p.keys().await.unwrap(), vec![url.to_string()]);
    }

    #[tokio::test]
    async fn delete_partition_removes_directory() {
        let dir = TempDir::new().unwrap();
        let storage = DiskCacheStorage::new(dir.path());
        let p = storage.open("tmp").await.unwrap();
        p.put("https://a.example/x", Response::new(200, "x"))
            .await
            .unwrap();

        assert_eq!(storage.names().await.unwrap(), vec!["tmp".to_string()]);
        assert!(storage.delete("tmp").await.unwrap());
        assert!(!storage.has("tmp").await.unwrap());
        assert!(!storage.delete("tmp").await.unwrap());
        assert!(storage.names().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_entry() {
        let dir = TempDir::new().unwrap();
        let storage = DiskCacheStorage::new(dir.path());
        let p = storage.open("live").await.unwrap();
        p.put("https://a.example/x", Response::new(200, "x"))
            .await
            .unwrap();
        assert!(p.delete("https://a.example/x").await.unwrap());
        assert!(!p.delete("https://a.example/x").await.unwrap());
        assert!(p.get("https://a.example/x").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rejects_path_like_partition_names() {
        let dir = TempDir::new().unwrap();
        let storage = DiskCacheStorage::new(dir.path());
        assert!(matches!(
            storage.open("../escape").await,
            Err(Error::Storage(_))
        ));
        assert!(storage.open("..").await.is_err());
    }

    #[tokio::test]
    async fn corrupt_body_is_a_storage_error() {
        let dir = TempDir::new().unwrap();
        let storage = DiskCacheStorage::new(dir.path());
        let p = storage.open("live").await.unwrap();
        let url = "https://a.example/x";
        let entry = serde_json::json!({
            "url": url,
            "status": 200,
            "headers": [],
            "body": "not base64!!",
            "stored_at": "2024-01-01T00:00:00Z",
        });
        std::fs::write(
            p.dir().join(entry_file_name(url)),
            serde_json::to_vec(&entry).unwrap(),
        )
        .unwrap();

        assert!(matches!(p.get(url).await, Err(Error::Storage(_))));
    }
}
