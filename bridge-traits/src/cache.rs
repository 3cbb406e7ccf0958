//! Response Cache Abstraction
//!
//! A named, versioned key-value store of request URL → response, modelled on
//! the browser Cache Storage API:
//!
//! ```text
//! CacheStorage ──open(name)──> CacheStore ──lookup/put/delete/keys──> entries
//!      │
//!      └── keys() / delete(name)  (generation management)
//! ```
//!
//! Each named store is one *generation*. Entries are keyed by the exact URL
//! string and are immutable once written: `put` replaces an entry wholesale
//! and must be atomic per key, so two writers racing on the same key leave
//! one complete entry behind, never a mix.
//!
//! Both the interception layer and the offline library write into the same
//! store without any lock beyond that per-key atomicity.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::http::HttpResponse;

/// Collection of named cache stores.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Open the store called `name`, creating it if absent.
    async fn open(&self, name: &str) -> Result<Arc<dyn CacheStore>>;

    /// Whether a store called `name` currently exists.
    async fn has(&self, name: &str) -> Result<bool>;

    /// Delete the store called `name` and every entry in it.
    ///
    /// Returns `false` if no such store existed. Handles previously returned
    /// by [`open`](Self::open) for that name observe an empty store afterwards.
    async fn delete(&self, name: &str) -> Result<bool>;

    /// Names of all existing stores.
    async fn keys(&self) -> Result<Vec<String>>;
}

/// A single cache store generation.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Name this store was opened under.
    fn name(&self) -> &str;

    /// Stored response for `key`, if any.
    async fn lookup(&self, key: &str) -> Result<Option<HttpResponse>>;

    /// Store `response` under `key`, replacing any previous entry.
    async fn put(&self, key: &str, response: HttpResponse) -> Result<()>;

    /// Remove the entry for `key`. Returns `false` if there was none.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// All keys currently present.
    async fn keys(&self) -> Result<Vec<String>>;

    /// Whether an entry exists for `key`.
    async fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.lookup(key).await?.is_some())
    }
}
