//! Shared fixtures for the offline core integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_desktop::{FixedAnswerPrompt, MemoryCacheStorage, SqliteSettingsStore};
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::{
    BridgeError, CacheStorage, CacheStore, FixedClock, HttpClient, HttpRequest, HttpResponse,
    SettingsStore, UserPrompt,
};
use core_runtime::config::{OfflineConfig, OfflineConfigBuilder};
use mockall::mock;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

pub const GENERATION: &str = "offline-audio-v1";
pub const METADATA_KEY: &str = "offline_library_metadata";

mock! {
    pub HttpClient {}

    #[async_trait]
    impl HttpClient for HttpClient {
        async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
    }
}

/// Audio-looking response body for `url`.
pub fn audio_response(url: &str) -> HttpResponse {
    HttpResponse::ok(format!("ID3 audio for {}", url)).with_header("content-type", "audio/mpeg")
}

/// HTTP client that holds every request until released.
#[derive(Default)]
pub struct GatedHttpClient {
    gate: Notify,
    calls: Mutex<Vec<String>>,
}

impl GatedHttpClient {
    pub fn release_one(&self) {
        self.gate.notify_one();
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl HttpClient for GatedHttpClient {
    async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse> {
        self.calls.lock().push(request.url.clone());
        self.gate.notified().await;
        Ok(audio_response(&request.url))
    }
}

/// Settings store whose writes can be switched to fail.
pub struct FlakySettings {
    inner: SqliteSettingsStore,
    fail_writes: AtomicBool,
}

impl FlakySettings {
    pub async fn new() -> Self {
        Self {
            inner: SqliteSettingsStore::in_memory().await.unwrap(),
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl SettingsStore for FlakySettings {
    async fn set_string(&self, key: &str, value: &str) -> BridgeResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(BridgeError::Storage("disk full".into()));
        }
        self.inner.set_string(key, value).await
    }

    async fn get_string(&self, key: &str) -> BridgeResult<Option<String>> {
        self.inner.get_string(key).await
    }

    async fn delete(&self, key: &str) -> BridgeResult<()> {
        self.inner.delete(key).await
    }

    async fn list_keys(&self) -> BridgeResult<Vec<String>> {
        self.inner.list_keys().await
    }
}

#[derive(Default)]
struct Faults {
    fail_delete: AtomicBool,
    fail_keys: AtomicBool,
    gate_puts: AtomicBool,
    put_entered: Notify,
    put_gate: Notify,
}

/// In-memory cache storage with switchable entry failures and a gate that
/// holds `put` until released.
#[derive(Clone)]
pub struct FaultyCacheStorage {
    inner: Arc<MemoryCacheStorage>,
    faults: Arc<Faults>,
}

impl FaultyCacheStorage {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MemoryCacheStorage::new()),
            faults: Arc::new(Faults::default()),
        }
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.faults.fail_delete.store(fail, Ordering::SeqCst);
    }

    pub fn fail_keys(&self, fail: bool) {
        self.faults.fail_keys.store(fail, Ordering::SeqCst);
    }

    pub fn gate_puts(&self) {
        self.faults.gate_puts.store(true, Ordering::SeqCst);
    }

    /// Resolves once a gated `put` is waiting.
    pub async fn put_started(&self) {
        self.faults.put_entered.notified().await;
    }

    pub fn release_put(&self) {
        self.faults.put_gate.notify_one();
    }

    pub async fn entry_keys(&self, generation: &str) -> Vec<String> {
        self.inner.open(generation).await.unwrap().keys().await.unwrap()
    }
}

#[async_trait]
impl CacheStorage for FaultyCacheStorage {
    async fn open(&self, name: &str) -> BridgeResult<Arc<dyn CacheStore>> {
        let inner = self.inner.open(name).await?;
        Ok(Arc::new(FaultyCacheStore {
            inner,
            faults: Arc::clone(&self.faults),
        }))
    }

    async fn has(&self, name: &str) -> BridgeResult<bool> {
        self.inner.has(name).await
    }

    async fn delete(&self, name: &str) -> BridgeResult<bool> {
        self.inner.delete(name).await
    }

    async fn keys(&self) -> BridgeResult<Vec<String>> {
        self.inner.keys().await
    }
}

struct FaultyCacheStore {
    inner: Arc<dyn CacheStore>,
    faults: Arc<Faults>,
}

#[async_trait]
impl CacheStore for FaultyCacheStore {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn lookup(&self, key: &str) -> BridgeResult<Option<HttpResponse>> {
        self.inner.lookup(key).await
    }

    async fn put(&self, key: &str, response: HttpResponse) -> BridgeResult<()> {
        if self.faults.gate_puts.load(Ordering::SeqCst) {
            self.faults.put_entered.notify_one();
            self.faults.put_gate.notified().await;
        }
        self.inner.put(key, response).await
    }

    async fn delete(&self, key: &str) -> BridgeResult<bool> {
        if self.faults.fail_delete.load(Ordering::SeqCst) {
            return Err(BridgeError::Storage("entry locked".into()));
        }
        self.inner.delete(key).await
    }

    async fn keys(&self) -> BridgeResult<Vec<String>> {
        if self.faults.fail_keys.load(Ordering::SeqCst) {
            return Err(BridgeError::Storage("listing failed".into()));
        }
        self.inner.keys().await
    }
}

pub struct Fixture {
    pub cache: Arc<MemoryCacheStorage>,
    pub settings: Arc<SqliteSettingsStore>,
}

impl Fixture {
    pub async fn new() -> Self {
        Self {
            cache: Arc::new(MemoryCacheStorage::new()),
            settings: Arc::new(SqliteSettingsStore::in_memory().await.unwrap()),
        }
    }

    /// Builder wired to this fixture's stores, a fixed clock and a prompt
    /// that always confirms.
    pub fn builder(&self, http: Arc<dyn HttpClient>) -> OfflineConfigBuilder {
        let cache: Arc<dyn CacheStorage> = self.cache.clone();
        let settings: Arc<dyn SettingsStore> = self.settings.clone();
        let prompt: Arc<dyn UserPrompt> = Arc::new(FixedAnswerPrompt::accept());

        OfflineConfig::builder()
            .http_client(http)
            .cache_storage(cache)
            .settings_store(settings)
            .user_prompt(prompt)
            .clock(Arc::new(FixedClock::at_unix(1_700_000_000)))
    }

    pub fn config(&self, http: Arc<dyn HttpClient>) -> OfflineConfig {
        self.builder(http).build().unwrap()
    }

    pub async fn cache_keys(&self) -> Vec<String> {
        self.cache.open(GENERATION).await.unwrap().keys().await.unwrap()
    }

    pub async fn persisted_ids(&self) -> Vec<String> {
        let json = self
            .settings
            .get_string(METADATA_KEY)
            .await
            .unwrap()
            .unwrap_or_else(|| "[]".to_string());
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        value
            .as_array()
            .unwrap()
            .iter()
            .map(|record| record["id"].as_str().unwrap().to_string())
            .collect()
    }
}

/// Yield until `condition` holds; panics after a generous number of tries.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if condition() {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(1)).await;
    }
    panic!("condition not reached");
}
