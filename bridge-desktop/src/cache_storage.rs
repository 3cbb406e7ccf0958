//! Filesystem-backed Cache Storage
//!
//! Layout:
//!
//! ```text
//! <root>/
//!   <hex(generation name)>/
//!     <sha256(url)>.entry      u32 BE header length | header JSON | body
//! ```
//!
//! A `put` writes the whole entry to a uniquely named temp file in the same
//! directory and renames it over the target, so readers observe either the
//! old entry or the new one. Write, rename and temp cleanup run as one
//! blocking task that finishes even if the calling future is dropped.
//!
//! An entry that cannot be decoded is removed on sight: `lookup` reports a
//! miss and `keys` leaves it out.

use async_trait::async_trait;
use bridge_traits::{
    cache::{CacheStorage, CacheStore},
    error::{BridgeError, Result},
    http::HttpResponse,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

const ENTRY_EXTENSION: &str = "entry";

/// Upper bound on the encoded header; anything larger is corruption.
const MAX_HEADER_LEN: usize = 64 * 1024;

#[derive(Debug, Serialize, Deserialize)]
struct EntryHeader {
    url: String,
    status: u16,
    headers: HashMap<String, String>,
}

/// Cache storage rooted at a directory on the local filesystem.
pub struct FsCacheStorage {
    root: PathBuf,
}

impl FsCacheStorage {
    /// Create a storage rooted at `root`. Directories are created lazily.
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Platform cache directory for this application.
    pub fn default_root() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("offline-audio-core")
            .join("caches")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn generation_dir(&self, name: &str) -> PathBuf {
        self.root.join(hex::encode(name.as_bytes()))
    }
}

fn map_io_error(context: &str, e: std::io::Error) -> BridgeError {
    BridgeError::Storage(format!("{}: {}", context, e))
}

#[async_trait]
impl CacheStorage for FsCacheStorage {
    async fn open(&self, name: &str) -> Result<Arc<dyn CacheStore>> {
        let dir = self.generation_dir(name);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| map_io_error("Failed to create cache directory", e))?;
        debug!(cache = name, path = ?dir, "Opened cache store");

        Ok(Arc::new(FsCacheStore {
            name: name.to_string(),
            dir,
        }))
    }

    async fn has(&self, name: &str) -> Result<bool> {
        Ok(fs::try_exists(self.generation_dir(name))
            .await
            .map_err(|e| map_io_error("Failed to stat cache directory", e))?)
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        match fs::remove_dir_all(self.generation_dir(name)).await {
            Ok(()) => {
                debug!(cache = name, "Deleted cache store");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(map_io_error("Failed to delete cache directory", e)),
        }
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(map_io_error("Failed to list cache root", e)),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| map_io_error("Failed to list cache root", e))?
        {
            let file_name = entry.file_name();
            let Some(encoded) = file_name.to_str() else {
                continue;
            };
            match hex::decode(encoded).ok().and_then(|raw| String::from_utf8(raw).ok()) {
                Some(name) => names.push(name),
                None => warn!(dir = encoded, "Ignoring foreign directory in cache root"),
            }
        }

        names.sort();
        Ok(names)
    }
}

/// One generation directory.
struct FsCacheStore {
    name: String,
    dir: PathBuf,
}

impl FsCacheStore {
    fn entry_path(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        self.dir
            .join(format!("{}.{}", hex::encode(digest), ENTRY_EXTENSION))
    }

    fn encode(key: &str, response: &HttpResponse) -> Result<Vec<u8>> {
        let header = EntryHeader {
            url: key.to_string(),
            status: response.status,
            headers: response.headers.clone(),
        };
        let header = serde_json::to_vec(&header).map_err(|e| {
            BridgeError::Storage(format!("Failed to encode cache entry header: {}", e))
        })?;
        let header_len = u32::try_from(header.len())
            .map_err(|_| BridgeError::Storage("Cache entry header too large".to_string()))?;

        let mut buf = Vec::with_capacity(4 + header.len() + response.body.len());
        buf.extend_from_slice(&header_len.to_be_bytes());
        buf.extend_from_slice(&header);
        buf.extend_from_slice(&response.body);
        Ok(buf)
    }

    fn decode(raw: Vec<u8>) -> Result<(EntryHeader, Bytes)> {
        let corrupt = || BridgeError::Storage("Corrupt cache entry".to_string());

        let len_bytes: [u8; 4] = raw
            .get(..4)
            .ok_or_else(corrupt)?
            .try_into()
            .map_err(|_| corrupt())?;
        let header_len = u32::from_be_bytes(len_bytes) as usize;
        if header_len > MAX_HEADER_LEN {
            return Err(corrupt());
        }
        let header_end = 4usize.checked_add(header_len).ok_or_else(corrupt)?;
        let header_bytes = raw.get(4..header_end).ok_or_else(corrupt)?;
        let header: EntryHeader = serde_json::from_slice(header_bytes).map_err(|_| corrupt())?;

        let body = Bytes::from(raw).slice(header_end..);
        Ok((header, body))
    }

    async fn read_header(path: &Path) -> Result<EntryHeader> {
        let mut file = fs::File::open(path)
            .await
            .map_err(|e| map_io_error("Failed to open cache entry", e))?;

        let mut len_bytes = [0u8; 4];
        file.read_exact(&mut len_bytes)
            .await
            .map_err(|e| map_io_error("Failed to read cache entry header", e))?;

        let header_len = u32::from_be_bytes(len_bytes) as usize;
        if header_len > MAX_HEADER_LEN {
            return Err(BridgeError::Storage(format!(
                "Corrupt cache entry header: length {} exceeds {}",
                header_len, MAX_HEADER_LEN
            )));
        }

        let mut header = vec![0u8; header_len];
        file.read_exact(&mut header)
            .await
            .map_err(|e| map_io_error("Failed to read cache entry header", e))?;

        serde_json::from_slice(&header)
            .map_err(|e| BridgeError::Storage(format!("Corrupt cache entry header: {}", e)))
    }

    /// Remove an entry that failed to decode. Losing the race to another
    /// remover is fine.
    async fn remove_corrupt(&self, path: &Path, reason: &BridgeError) {
        warn!(cache = %self.name, path = ?path, reason = %reason, "Removing corrupt cache entry");
        if let Err(e) = fs::remove_file(path).await {
            if e.kind() != ErrorKind::NotFound {
                warn!(cache = %self.name, error = %e, "Failed to remove corrupt cache entry");
            }
        }
    }

    /// Write `encoded` to a temp file and rename it onto `target`.
    ///
    /// Runs start to finish on the blocking pool; the temp file is removed
    /// on any failure.
    fn commit_blocking(dir: &Path, temp: &Path, target: &Path, encoded: &[u8]) -> Result<()> {
        std::fs::create_dir_all(dir).map_err(|e| map_io_error("Failed to create cache directory", e))?;

        if let Err(e) = std::fs::write(temp, encoded) {
            let _ = std::fs::remove_file(temp);
            return Err(map_io_error("Failed to write cache entry", e));
        }

        if let Err(e) = std::fs::rename(temp, target) {
            let _ = std::fs::remove_file(temp);
            return Err(map_io_error("Failed to commit cache entry", e));
        }
        Ok(())
    }
}

#[async_trait]
impl CacheStore for FsCacheStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn lookup(&self, key: &str) -> Result<Option<HttpResponse>> {
        let path = self.entry_path(key);
        let raw = match fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(map_io_error("Failed to read cache entry", e)),
        };

        let (header, body) = match Self::decode(raw) {
            Ok(decoded) => decoded,
            Err(e) => {
                self.remove_corrupt(&path, &e).await;
                return Ok(None);
            }
        };
        if header.url != key {
            warn!(cache = %self.name, "Cache entry digest collision; treating as miss");
            return Ok(None);
        }

        Ok(Some(HttpResponse {
            status: header.status,
            headers: header.headers,
            body,
        }))
    }

    async fn put(&self, key: &str, response: HttpResponse) -> Result<()> {
        let encoded = Self::encode(key, &response)?;
        let target = self.entry_path(key);
        let temp = self
            .dir
            .join(format!(".{}.tmp", uuid::Uuid::new_v4().simple()));

        let dir = self.dir.clone();
        tokio::task::spawn_blocking(move || Self::commit_blocking(&dir, &temp, &target, &encoded))
            .await
            .map_err(|e| BridgeError::Storage(format!("Cache write task failed: {}", e)))??;

        debug!(cache = %self.name, bytes = response.body.len(), "Stored cache entry");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        match fs::remove_file(self.entry_path(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(map_io_error("Failed to delete cache entry", e)),
        }
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(map_io_error("Failed to list cache entries", e)),
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| map_io_error("Failed to list cache entries", e))?
        {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }
            match Self::read_header(&path).await {
                Ok(header) => keys.push(header.url),
                // Deleted between listing and reading.
                Err(e) if !fs::try_exists(&path).await.unwrap_or(false) => {
                    debug!(reason = %e, "Cache entry vanished during listing");
                }
                Err(e) => self.remove_corrupt(&path, &e).await,
            }
        }

        keys.sort();
        Ok(keys)
    }
}
