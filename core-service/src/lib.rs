//! Service façade and bootstrap helpers.
//!
//! [`OfflineService`] takes one validated [`OfflineConfig`] and builds the
//! interceptor, the library manager and the playback resolver on top of the
//! same cache storage and event bus, so the three always agree on the cache
//! generation and on where notifications go.
//!
//! Desktop hosts enable the `desktop-shims` feature and call
//! [`bootstrap_desktop`], which wires the adapters from `bridge-desktop`.

pub mod error;

pub use error::{Result, ServiceError};

use std::sync::Arc;

use bridge_traits::HttpRequest;
use bridge_traits::HttpResponse;
use core_offline::{
    AudioInterceptor, ObjectUrlRegistry, OfflineLibraryManager, PlaybackSession,
    PlaybackSourceResolver,
};
use core_runtime::config::OfflineConfig;
use core_runtime::events::{EventBus, EventStream};
use tracing::info;

#[cfg(all(feature = "desktop-shims", not(target_arch = "wasm32")))]
pub use desktop::{bootstrap_desktop, bootstrap_desktop_with};

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct OfflineService {
    config: Arc<OfflineConfig>,
    event_bus: EventBus,
    interceptor: Arc<AudioInterceptor>,
    library: Arc<OfflineLibraryManager>,
    resolver: Arc<PlaybackSourceResolver>,
}

impl OfflineService {
    /// Build the service from `config`, loading the persisted library index.
    ///
    /// The interceptor is created but not started; call [`start`](Self::start)
    /// once the host is ready to route requests through it.
    pub async fn new(config: OfflineConfig) -> Result<Self> {
        config.validate()?;

        let event_bus = EventBus::new(config.event_buffer);
        let interceptor = AudioInterceptor::new(&config, event_bus.clone());
        let library = OfflineLibraryManager::load(&config, event_bus.clone()).await?;
        let resolver =
            PlaybackSourceResolver::new(&config, ObjectUrlRegistry::new(), event_bus.clone());

        info!(
            generation = %config.cache_generation,
            offline_tracks = library.offline_tracks().len(),
            "Offline service ready"
        );

        Ok(Self {
            config: Arc::new(config),
            event_bus,
            interceptor: Arc::new(interceptor),
            library: Arc::new(library),
            resolver: Arc::new(resolver),
        })
    }

    /// Install and activate the interceptor, purging stale generations.
    ///
    /// Returns the names of the generations that were deleted.
    pub async fn start(&self) -> Result<Vec<String>> {
        Ok(self.interceptor.start().await?)
    }

    pub fn config(&self) -> &OfflineConfig {
        &self.config
    }

    pub fn interceptor(&self) -> Arc<AudioInterceptor> {
        Arc::clone(&self.interceptor)
    }

    pub fn library(&self) -> Arc<OfflineLibraryManager> {
        Arc::clone(&self.library)
    }

    pub fn resolver(&self) -> Arc<PlaybackSourceResolver> {
        Arc::clone(&self.resolver)
    }

    /// Route a host request through the interceptor.
    pub async fn fetch(&self, request: HttpRequest) -> Result<HttpResponse> {
        Ok(self.interceptor.handle_fetch(request).await?)
    }

    /// A fresh player session backed by the shared resolver.
    pub fn new_session(&self) -> PlaybackSession {
        PlaybackSession::new(self.resolver())
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Subscribe to every event published by the service.
    pub fn subscribe(&self) -> EventStream {
        EventStream::new(self.event_bus.subscribe())
    }
}

#[cfg(all(feature = "desktop-shims", not(target_arch = "wasm32")))]
mod desktop {
    use super::*;
    use bridge_desktop::{FsCacheStorage, ReqwestHttpClient, SqliteSettingsStore};
    use core_runtime::config::OfflineConfigBuilder;
    use std::path::PathBuf;

    const CACHE_DIR: &str = "caches";
    const SETTINGS_FILE: &str = "settings.db";

    /// Bootstrap with the desktop adapters under `root`.
    ///
    /// Audio lands in `root/caches`, the library index in `root/settings.db`.
    /// No confirmation prompt is wired, so clearing the library is declined
    /// until the host supplies one through [`bootstrap_desktop_with`].
    pub async fn bootstrap_desktop(root: PathBuf) -> Result<OfflineService> {
        bootstrap_desktop_with(root, |builder| builder).await
    }

    /// Like [`bootstrap_desktop`], letting the host adjust the config before
    /// it is built (prompt, proxy rules, timeouts).
    pub async fn bootstrap_desktop_with<F>(root: PathBuf, customize: F) -> Result<OfflineService>
    where
        F: FnOnce(OfflineConfigBuilder) -> OfflineConfigBuilder,
    {
        let http = ReqwestHttpClient::new()?;
        let cache = FsCacheStorage::new(root.join(CACHE_DIR));
        let settings = SqliteSettingsStore::new(root.join(SETTINGS_FILE)).await?;

        let builder = OfflineConfig::builder()
            .http_client(Arc::new(http))
            .cache_storage(Arc::new(cache))
            .settings_store(Arc::new(settings));
        let config = customize(builder).build()?;

        info!(root = ?root, "Bootstrapping desktop offline service");
        OfflineService::new(config).await
    }
}
