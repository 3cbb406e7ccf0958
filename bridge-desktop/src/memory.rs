//! In-memory Cache Storage
//!
//! Process-local stores for hosts without a writable disk and for tests.
//! An optional byte quota makes `put` fail the way a full browser cache does.

use async_trait::async_trait;
use bridge_traits::{
    cache::{CacheStorage, CacheStore},
    error::{BridgeError, Result},
    http::HttpResponse,
};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Cache storage held entirely in memory.
#[derive(Default)]
pub struct MemoryCacheStorage {
    stores: Mutex<HashMap<String, Arc<MemoryCacheStore>>>,
    quota_bytes: Option<u64>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit the body bytes each store may hold.
    pub fn with_quota(mut self, bytes: u64) -> Self {
        self.quota_bytes = Some(bytes);
        self
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn open(&self, name: &str) -> Result<Arc<dyn CacheStore>> {
        let mut stores = self.stores.lock();
        let store = stores
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(MemoryCacheStore {
                    name: name.to_string(),
                    entries: RwLock::new(BTreeMap::new()),
                    quota_bytes: self.quota_bytes,
                })
            })
            .clone();
        Ok(store)
    }

    async fn has(&self, name: &str) -> Result<bool> {
        Ok(self.stores.lock().contains_key(name))
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        match self.stores.lock().remove(name) {
            Some(store) => {
                // Outstanding handles must not keep serving the dropped generation.
                store.entries.write().clear();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.stores.lock().keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

struct MemoryCacheStore {
    name: String,
    entries: RwLock<BTreeMap<String, HttpResponse>>,
    quota_bytes: Option<u64>,
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn lookup(&self, key: &str) -> Result<Option<HttpResponse>> {
        Ok(self.entries.read().get(key).cloned())
    }

    async fn put(&self, key: &str, response: HttpResponse) -> Result<()> {
        let mut entries = self.entries.write();

        if let Some(quota) = self.quota_bytes {
            let used: u64 = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(_, r)| r.body.len() as u64)
                .sum();
            if used + response.body.len() as u64 > quota {
                return Err(BridgeError::QuotaExceeded(format!(
                    "{} bytes requested, {} of {} in use",
                    response.body.len(),
                    used,
                    quota
                )));
            }
        }

        entries.insert(key.to_string(), response);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.entries.write().remove(key).is_some())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self.entries.read().keys().cloned().collect())
    }
}
