//! # Network Interception Layer
//!
//! Serves audio requests cache-first from the current cache generation and
//! caches what it fetches on a miss. It knows nothing about tracks: any GET
//! whose URL ends in the configured audio extension is a candidate.
//!
//! ## Lifecycle
//!
//! ```text
//! Parsed ──install()──> Installing ──> Installed ──activate()──> Activating ──> Active
//!   │                       │                                        │
//!   └───────────────────────┴── failure ─> Redundant     failure ─> Installed
//!
//! any ──retire()──> Redundant
//! ```
//!
//! Activation is requested as soon as installation finishes; an older
//! interceptor may briefly keep serving elsewhere, which is harmless since
//! entries are keyed by URL and immutable. Activation deletes every cache
//! generation except the current one, then claims already-open clients.
//!
//! Until the interceptor is `Active`, requests pass straight to the network.

use crate::error::{OfflineError, Result};
use crate::url::is_audio_url;
use bridge_traits::{CacheStorage, CacheStore, HttpClient, HttpMethod, HttpRequest, HttpResponse};
use core_runtime::config::OfflineConfig;
use core_runtime::events::{CoreEvent, EventBus, InterceptorEvent};
use core_runtime::logging::redact_url;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Where an interceptor is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterceptorState {
    Parsed,
    Installing,
    Installed,
    Activating,
    Active,
    /// Failed to install or replaced by a newer interceptor.
    Redundant,
}

impl fmt::Display for InterceptorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InterceptorState::Parsed => "parsed",
            InterceptorState::Installing => "installing",
            InterceptorState::Installed => "installed",
            InterceptorState::Activating => "activating",
            InterceptorState::Active => "active",
            InterceptorState::Redundant => "redundant",
        };
        f.write_str(name)
    }
}

/// Cache-first request interceptor for audio URLs.
pub struct AudioInterceptor {
    generation: String,
    audio_extension: String,
    cache_storage: Arc<dyn CacheStorage>,
    http_client: Arc<dyn HttpClient>,
    event_bus: EventBus,
    state: RwLock<InterceptorState>,
    clients_claimed: AtomicBool,
}

impl AudioInterceptor {
    pub fn new(config: &OfflineConfig, event_bus: EventBus) -> Self {
        Self {
            generation: config.cache_generation.clone(),
            audio_extension: config.audio_extension.clone(),
            cache_storage: Arc::clone(&config.cache_storage),
            http_client: Arc::clone(&config.http_client),
            event_bus,
            state: RwLock::new(InterceptorState::Parsed),
            clients_claimed: AtomicBool::new(false),
        }
    }

    pub fn generation(&self) -> &str {
        &self.generation
    }

    pub fn state(&self) -> InterceptorState {
        *self.state.read()
    }

    /// Whether activation took control of already-open clients.
    pub fn has_claimed_clients(&self) -> bool {
        self.clients_claimed.load(Ordering::Acquire)
    }

    /// Move `from` → `to`, failing if the current state is not `from`.
    fn transition(&self, from: InterceptorState, to: InterceptorState, operation: &'static str) -> Result<()> {
        let mut state = self.state.write();
        if *state != from {
            return Err(OfflineError::InvalidState {
                operation,
                state: state.to_string(),
            });
        }
        *state = to;
        Ok(())
    }

    fn set_state(&self, to: InterceptorState) {
        *self.state.write() = to;
    }

    fn emit(&self, event: InterceptorEvent) {
        self.event_bus.emit(CoreEvent::Interceptor(event)).ok();
    }

    /// Create the current generation's store if it does not exist yet.
    #[instrument(skip(self), fields(generation = %self.generation))]
    pub async fn install(&self) -> Result<()> {
        self.transition(InterceptorState::Parsed, InterceptorState::Installing, "install")?;
        info!("Installing audio interceptor");

        if let Err(e) = self.cache_storage.open(&self.generation).await {
            warn!(error = %e, "Install failed");
            self.set_state(InterceptorState::Redundant);
            return Err(e.into());
        }

        self.set_state(InterceptorState::Installed);
        self.emit(InterceptorEvent::Installed {
            generation: self.generation.clone(),
        });
        Ok(())
    }

    /// Delete every non-current generation, then claim open clients.
    ///
    /// Returns the names of the deleted generations. Calling it again once
    /// active is a no-op that returns an empty list.
    #[instrument(skip(self), fields(generation = %self.generation))]
    pub async fn activate(&self) -> Result<Vec<String>> {
        if self.state() == InterceptorState::Active {
            return Ok(Vec::new());
        }
        self.transition(InterceptorState::Installed, InterceptorState::Activating, "activate")?;
        info!("Activating audio interceptor");

        let removed = match self.purge_stale_generations().await {
            Ok(removed) => removed,
            Err(e) => {
                warn!(error = %e, "Activation failed; staying installed");
                self.set_state(InterceptorState::Installed);
                return Err(e);
            }
        };

        self.clients_claimed.store(true, Ordering::Release);
        self.set_state(InterceptorState::Active);

        self.emit(InterceptorEvent::Activated {
            generation: self.generation.clone(),
            removed_generations: removed.clone(),
        });
        self.emit(InterceptorEvent::ClientsClaimed {
            generation: self.generation.clone(),
        });
        Ok(removed)
    }

    async fn purge_stale_generations(&self) -> Result<Vec<String>> {
        let mut removed = Vec::new();
        for name in self.cache_storage.keys().await? {
            if name == self.generation {
                continue;
            }
            info!(stale = %name, "Deleting old cache generation");
            if self.cache_storage.delete(&name).await? {
                removed.push(name);
            }
        }
        Ok(removed)
    }

    /// Install and activate in one go, as a fresh interceptor does.
    pub async fn start(&self) -> Result<Vec<String>> {
        self.install().await?;
        self.activate().await
    }

    /// Stop serving requests; a newer interceptor has taken over.
    pub fn retire(&self) {
        self.set_state(InterceptorState::Redundant);
        self.clients_claimed.store(false, Ordering::Release);
        self.emit(InterceptorEvent::Superseded {
            generation: self.generation.clone(),
        });
    }

    fn intercepts(&self, request: &HttpRequest) -> bool {
        request.method == HttpMethod::Get
            && is_audio_url(&request.url, &self.audio_extension)
            && self.state() == InterceptorState::Active
    }

    /// Handle one outgoing request.
    ///
    /// Non-audio requests, and everything while not active, go straight to
    /// the network. Audio requests are answered from the cache when
    /// possible; otherwise the network response is returned and, if it was
    /// successful, also stored. Failing to store it is logged and ignored.
    /// Network failures are returned to the caller as-is, with nothing
    /// written.
    pub async fn handle_fetch(&self, request: HttpRequest) -> Result<HttpResponse> {
        if !self.intercepts(&request) {
            return Ok(self.http_client.execute(request).await?);
        }

        let store = self.cache_storage.open(&self.generation).await?;
        let key = request.url.clone();

        if let Some(cached) = store.lookup(&key).await? {
            debug!(url = %redact_url(&key), "Serving audio from cache");
            return Ok(cached);
        }

        debug!(url = %redact_url(&key), "Cache miss; fetching audio");
        let response = self.http_client.execute(request).await.map_err(|e| {
            warn!(url = %redact_url(&key), error = %e, "Audio fetch failed");
            OfflineError::from(e)
        })?;

        if response.is_success() {
            self.store_opportunistically(store.as_ref(), &key, &response).await;
        } else {
            debug!(status = response.status, "Not caching unsuccessful response");
        }

        Ok(response)
    }

    async fn store_opportunistically(&self, store: &dyn CacheStore, key: &str, response: &HttpResponse) {
        // Body is reference-counted; the clone shares the bytes.
        if let Err(e) = store.put(key, response.clone()).await {
            warn!(url = %redact_url(key), error = %e, "Opportunistic cache write failed");
        }
    }
}

impl fmt::Debug for AudioInterceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioInterceptor")
            .field("generation", &self.generation)
            .field("state", &self.state())
            .field("clients_claimed", &self.has_claimed_clients())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_desktop::MemoryCacheStorage;
    use bridge_traits::{BridgeError, SettingsStore};
    use parking_lot::Mutex;

    /// Answers every request with a fixed body and records the URLs.
    #[derive(Default)]
    struct RecordingHttp {
        calls: Mutex<Vec<String>>,
        status: u16,
        fail: bool,
    }

    #[async_trait]
    impl HttpClient for RecordingHttp {
        async fn execute(&self, request: HttpRequest) -> bridge_traits::error::Result<HttpResponse> {
            self.calls.lock().push(request.url.clone());
            if self.fail {
                return Err(BridgeError::Network("offline".into()));
            }
            let mut response = HttpResponse::ok(format!("bytes of {}", request.url));
            response.status = if self.status == 0 { 200 } else { self.status };
            Ok(response)
        }
    }

    struct NullSettings;

    #[async_trait]
    impl SettingsStore for NullSettings {
        async fn set_string(&self, _: &str, _: &str) -> bridge_traits::error::Result<()> {
            Ok(())
        }
        async fn get_string(&self, _: &str) -> bridge_traits::error::Result<Option<String>> {
            Ok(None)
        }
        async fn delete(&self, _: &str) -> bridge_traits::error::Result<()> {
            Ok(())
        }
        async fn list_keys(&self) -> bridge_traits::error::Result<Vec<String>> {
            Ok(Vec::new())
        }
    }

    fn setup(http: RecordingHttp) -> (AudioInterceptor, Arc<RecordingHttp>, Arc<MemoryCacheStorage>) {
        let http = Arc::new(http);
        let storage = Arc::new(MemoryCacheStorage::new());
        let config = OfflineConfig::builder()
            .http_client(http.clone())
            .cache_storage(storage.clone())
            .settings_store(Arc::new(NullSettings))
            .build()
            .unwrap();
        (AudioInterceptor::new(&config, EventBus::default()), http, storage)
    }

    const T1: &str = "https://media.example.net/t1.mp3";

    #[tokio::test]
    async fn test_lifecycle_transitions() {
        let (interceptor, _, storage) = setup(RecordingHttp::default());
        assert_eq!(interceptor.state(), InterceptorState::Parsed);

        interceptor.install().await.unwrap();
        assert_eq!(interceptor.state(), InterceptorState::Installed);
        assert!(storage.has("offline-audio-v1").await.unwrap());

        interceptor.activate().await.unwrap();
        assert_eq!(interceptor.state(), InterceptorState::Active);
        assert!(interceptor.has_claimed_clients());

        // Second activation is a no-op
        assert!(interceptor.activate().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_activate_before_install_is_rejected() {
        let (interceptor, _, _) = setup(RecordingHttp::default());
        let err = interceptor.activate().await.unwrap_err();
        assert!(matches!(err, OfflineError::InvalidState { operation: "activate", .. }));
        assert_eq!(interceptor.state(), InterceptorState::Parsed);
    }

    #[tokio::test]
    async fn test_activation_deletes_only_other_generations() {
        let (interceptor, _, storage) = setup(RecordingHttp::default());
        storage.open("gospel-audio-cache-v1").await.unwrap();
        storage.open("offline-audio-v0").await.unwrap();

        let mut removed = interceptor.start().await.unwrap();
        removed.sort();

        assert_eq!(removed, vec!["gospel-audio-cache-v1", "offline-audio-v0"]);
        assert_eq!(storage.keys().await.unwrap(), vec!["offline-audio-v1"]);
    }

    #[tokio::test]
    async fn test_passthrough_until_active() {
        let (interceptor, http, storage) = setup(RecordingHttp::default());

        interceptor.handle_fetch(HttpRequest::get(T1)).await.unwrap();
        assert_eq!(http.calls.lock().len(), 1);

        let store = storage.open("offline-audio-v1").await.unwrap();
        assert!(store.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let (interceptor, http, _) = setup(RecordingHttp::default());
        interceptor.start().await.unwrap();

        let first = interceptor.handle_fetch(HttpRequest::get(T1)).await.unwrap();
        let second = interceptor.handle_fetch(HttpRequest::get(T1)).await.unwrap();

        assert_eq!(first.body, second.body);
        assert_eq!(http.calls.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_non_audio_is_never_cached() {
        let (interceptor, http, storage) = setup(RecordingHttp::default());
        interceptor.start().await.unwrap();

        let url = "https://media.example.net/cover.jpg";
        interceptor.handle_fetch(HttpRequest::get(url)).await.unwrap();
        interceptor.handle_fetch(HttpRequest::get(url)).await.unwrap();

        assert_eq!(http.calls.lock().len(), 2);
        let store = storage.open("offline-audio-v1").await.unwrap();
        assert!(!store.contains(url).await.unwrap());
    }

    #[tokio::test]
    async fn test_network_failure_surfaces_and_writes_nothing() {
        let (interceptor, _, storage) = setup(RecordingHttp {
            fail: true,
            ..Default::default()
        });
        interceptor.start().await.unwrap();

        let err = interceptor.handle_fetch(HttpRequest::get(T1)).await.unwrap_err();
        assert!(err.is_network_error());

        let store = storage.open("offline-audio-v1").await.unwrap();
        assert!(store.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_error_status_is_returned_but_not_cached() {
        let (interceptor, http, storage) = setup(RecordingHttp {
            status: 404,
            ..Default::default()
        });
        interceptor.start().await.unwrap();

        let response = interceptor.handle_fetch(HttpRequest::get(T1)).await.unwrap();
        assert_eq!(response.status, 404);

        let store = storage.open("offline-audio-v1").await.unwrap();
        assert!(!store.contains(T1).await.unwrap());

        interceptor.handle_fetch(HttpRequest::get(T1)).await.unwrap();
        assert_eq!(http.calls.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_cache_write_failure_still_returns_response() {
        let http = Arc::new(RecordingHttp::default());
        let storage = Arc::new(MemoryCacheStorage::new().with_quota(4));
        let config = OfflineConfig::builder()
            .http_client(http.clone())
            .cache_storage(storage.clone())
            .settings_store(Arc::new(NullSettings))
            .build()
            .unwrap();
        let interceptor = AudioInterceptor::new(&config, EventBus::default());
        interceptor.start().await.unwrap();

        let response = interceptor.handle_fetch(HttpRequest::get(T1)).await.unwrap();
        assert!(response.is_success());
        assert!(!response.body.is_empty());
    }

    #[tokio::test]
    async fn test_retired_interceptor_passes_through() {
        let (interceptor, http, _) = setup(RecordingHttp::default());
        interceptor.start().await.unwrap();
        interceptor.handle_fetch(HttpRequest::get(T1)).await.unwrap();

        interceptor.retire();
        assert_eq!(interceptor.state(), InterceptorState::Redundant);

        interceptor.handle_fetch(HttpRequest::get(T1)).await.unwrap();
        assert_eq!(http.calls.lock().len(), 2);
    }
}
