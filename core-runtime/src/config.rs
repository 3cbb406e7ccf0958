//! # Offline Core Configuration
//!
//! Builds the [`OfflineConfig`] shared by the interception layer, the offline
//! library manager and playback resolution.
//!
//! ## Required Dependencies
//!
//! - `HttpClient` - network fetches on cache miss and for explicit downloads
//! - `CacheStorage` - the named, versioned response store
//! - `SettingsStore` - durable slot for the offline library index
//!
//! ## Optional Dependencies
//!
//! - `UserPrompt` - confirmation for `clear_library`; without one, clearing is
//!   always refused
//! - `Clock` - timestamps on library records (default: [`SystemClock`])
//!
//! The builder validates every required bridge and setting up front and
//! reports what is missing rather than failing later mid-operation.
//!
//! ```ignore
//! use core_runtime::config::{OfflineConfig, ProxyRule};
//! use std::sync::Arc;
//!
//! let config = OfflineConfig::builder()
//!     .http_client(Arc::new(ReqwestHttpClient::new()?))
//!     .cache_storage(Arc::new(FsCacheStorage::new(FsCacheStorage::default_root())))
//!     .settings_store(Arc::new(SqliteSettingsStore::new(db_path).await?))
//!     .proxy_rule(ProxyRule::new("https://api.example.net", "https://relay.example.org/audio"))
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_BUFFER_SIZE;
use bridge_traits::{CacheStorage, Clock, HttpClient, SettingsStore, SystemClock, UserPrompt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_CACHE_GENERATION: &str = "offline-audio-v1";
pub const DEFAULT_AUDIO_EXTENSION: &str = ".mp3";
pub const DEFAULT_METADATA_KEY: &str = "offline_library_metadata";
pub const DEFAULT_SCHEME: &str = "https";
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// Rewrites download URLs under `origin` to go through `proxy_base`.
///
/// Only the URL that is fetched changes; cache keys and stored records keep
/// the original URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyRule {
    pub origin: String,
    pub proxy_base: String,
}

impl ProxyRule {
    pub fn new(origin: impl Into<String>, proxy_base: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            proxy_base: proxy_base.into(),
        }
    }

    /// The proxied URL, or `None` if `url` is not under this rule's origin.
    pub fn rewrite(&self, url: &str) -> Option<String> {
        let rest = url.strip_prefix(&self.origin)?;
        // "https://a.net" must not match "https://a.network/..."
        if !rest.is_empty() && !rest.starts_with(['/', '?']) {
            return None;
        }
        Some(format!("{}{}", self.proxy_base.trim_end_matches('/'), rest))
    }
}

/// Settings and bridges for the offline audio core.
///
/// Use [`OfflineConfig::builder`] to construct instances.
#[derive(Clone)]
pub struct OfflineConfig {
    /// Name of the current cache-store generation
    pub cache_generation: String,

    /// URL suffix that marks a request as interceptable audio
    pub audio_extension: String,

    /// Settings slot holding the serialized library index
    pub metadata_key: String,

    /// Scheme prepended to download URLs that have none
    pub default_scheme: String,

    /// Upper bound for one explicit download
    pub download_timeout: Duration,

    pub proxy_rules: Vec<ProxyRule>,

    /// Event bus capacity
    pub event_buffer: usize,

    pub http_client: Arc<dyn HttpClient>,
    pub cache_storage: Arc<dyn CacheStorage>,
    pub settings_store: Arc<dyn SettingsStore>,
    pub user_prompt: Option<Arc<dyn UserPrompt>>,
    pub clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for OfflineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineConfig")
            .field("cache_generation", &self.cache_generation)
            .field("audio_extension", &self.audio_extension)
            .field("metadata_key", &self.metadata_key)
            .field("default_scheme", &self.default_scheme)
            .field("download_timeout", &self.download_timeout)
            .field("proxy_rules", &self.proxy_rules)
            .field("event_buffer", &self.event_buffer)
            .field("http_client", &"HttpClient { ... }")
            .field("cache_storage", &"CacheStorage { ... }")
            .field("settings_store", &"SettingsStore { ... }")
            .field(
                "user_prompt",
                &self.user_prompt.as_ref().map(|_| "UserPrompt { ... }"),
            )
            .finish()
    }
}

impl OfflineConfig {
    pub fn builder() -> OfflineConfigBuilder {
        OfflineConfigBuilder::default()
    }

    /// Checks the settings for values the core cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.cache_generation.trim().is_empty() {
            return Err(Error::Config(
                "Cache generation name cannot be empty".to_string(),
            ));
        }

        if !self.audio_extension.starts_with('.') || self.audio_extension.len() < 2 {
            return Err(Error::Config(format!(
                "Audio extension must look like \".mp3\", got {:?}",
                self.audio_extension
            )));
        }

        if self.metadata_key.trim().is_empty() {
            return Err(Error::Config("Metadata key cannot be empty".to_string()));
        }

        if self.default_scheme.is_empty()
            || !self
                .default_scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        {
            return Err(Error::Config(format!(
                "Invalid default scheme {:?}",
                self.default_scheme
            )));
        }

        if self.download_timeout.is_zero() {
            return Err(Error::Config(
                "Download timeout must be greater than zero".to_string(),
            ));
        }

        if self.event_buffer == 0 {
            return Err(Error::Config(
                "Event buffer must hold at least one event".to_string(),
            ));
        }

        for rule in &self.proxy_rules {
            if rule.origin.is_empty() || rule.proxy_base.is_empty() {
                return Err(Error::Config(format!(
                    "Proxy rule needs both an origin and a proxy base: {:?}",
                    rule
                )));
            }
        }

        Ok(())
    }
}

fn capability_missing(capability: &str, message: &str) -> Error {
    Error::CapabilityMissing {
        capability: capability.to_string(),
        message: message.to_string(),
    }
}

/// Builder for [`OfflineConfig`].
#[derive(Default)]
pub struct OfflineConfigBuilder {
    cache_generation: Option<String>,
    audio_extension: Option<String>,
    metadata_key: Option<String>,
    default_scheme: Option<String>,
    download_timeout: Option<Duration>,
    proxy_rules: Vec<ProxyRule>,
    event_buffer: Option<usize>,
    http_client: Option<Arc<dyn HttpClient>>,
    cache_storage: Option<Arc<dyn CacheStorage>>,
    settings_store: Option<Arc<dyn SettingsStore>>,
    user_prompt: Option<Arc<dyn UserPrompt>>,
    clock: Option<Arc<dyn Clock>>,
}

impl OfflineConfigBuilder {
    /// Name of the current cache-store generation. Bump it to retire every
    /// previously cached response on the next activation.
    pub fn cache_generation(mut self, name: impl Into<String>) -> Self {
        self.cache_generation = Some(name.into());
        self
    }

    pub fn audio_extension(mut self, extension: impl Into<String>) -> Self {
        self.audio_extension = Some(extension.into());
        self
    }

    pub fn metadata_key(mut self, key: impl Into<String>) -> Self {
        self.metadata_key = Some(key.into());
        self
    }

    pub fn default_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.default_scheme = Some(scheme.into());
        self
    }

    pub fn download_timeout(mut self, timeout: Duration) -> Self {
        self.download_timeout = Some(timeout);
        self
    }

    /// Adds a proxy rule. Rules are tried in insertion order.
    pub fn proxy_rule(mut self, rule: ProxyRule) -> Self {
        self.proxy_rules.push(rule);
        self
    }

    pub fn event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = Some(capacity);
        self
    }

    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn cache_storage(mut self, storage: Arc<dyn CacheStorage>) -> Self {
        self.cache_storage = Some(storage);
        self
    }

    pub fn settings_store(mut self, store: Arc<dyn SettingsStore>) -> Self {
        self.settings_store = Some(store);
        self
    }

    pub fn user_prompt(mut self, prompt: Arc<dyn UserPrompt>) -> Self {
        self.user_prompt = Some(prompt);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Builds and validates the configuration.
    ///
    /// # Errors
    ///
    /// - [`Error::CapabilityMissing`] when a required bridge was not provided
    /// - [`Error::Config`] when a setting is out of range
    pub fn build(self) -> Result<OfflineConfig> {
        let http_client = self.http_client.ok_or_else(|| {
            capability_missing(
                "HttpClient",
                "HttpClient implementation is required to fetch audio. \
                 Desktop: use bridge_desktop::ReqwestHttpClient.",
            )
        })?;

        let cache_storage = self.cache_storage.ok_or_else(|| {
            capability_missing(
                "CacheStorage",
                "CacheStorage implementation is required to keep audio offline. \
                 Desktop: use bridge_desktop::FsCacheStorage.",
            )
        })?;

        let settings_store = self.settings_store.ok_or_else(|| {
            capability_missing(
                "SettingsStore",
                "SettingsStore implementation is required to persist the offline library. \
                 Desktop: use bridge_desktop::SqliteSettingsStore.",
            )
        })?;

        let config = OfflineConfig {
            cache_generation: self
                .cache_generation
                .unwrap_or_else(|| DEFAULT_CACHE_GENERATION.to_string()),
            audio_extension: self
                .audio_extension
                .unwrap_or_else(|| DEFAULT_AUDIO_EXTENSION.to_string()),
            metadata_key: self
                .metadata_key
                .unwrap_or_else(|| DEFAULT_METADATA_KEY.to_string()),
            default_scheme: self
                .default_scheme
                .unwrap_or_else(|| DEFAULT_SCHEME.to_string()),
            download_timeout: self.download_timeout.unwrap_or(DEFAULT_DOWNLOAD_TIMEOUT),
            proxy_rules: self.proxy_rules,
            event_buffer: self.event_buffer.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
            http_client,
            cache_storage,
            settings_store,
            user_prompt: self.user_prompt,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
        };

        config.validate()?;
        Ok(config)
    }
}
