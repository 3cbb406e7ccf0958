//! # Playback Source Resolution
//!
//! Decides whether a track plays from cached bytes or from the network.
//! Cached bytes are exposed through a revocable [`ObjectUrl`]
//! (`blob:offline-audio/<uuid>`) that a player can open through
//! [`ObjectUrlRegistry::resolve`]. Dropping the handle revokes the URL.
//!
//! Resolution never fails because of the cache: a miss, an unreadable store
//! or an empty entry all fall back to the network URL.

use crate::error::{OfflineError, Result};
use crate::models::Track;
use crate::url::normalize_url;
use bridge_traits::CacheStorage;
use bytes::Bytes;
use core_runtime::config::OfflineConfig;
use core_runtime::events::{CoreEvent, EventBus, PlaybackEvent};
use core_runtime::logging::redact_url;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

const OBJECT_URL_PREFIX: &str = "blob:offline-audio/";

#[derive(Clone)]
struct ObjectEntry {
    bytes: Bytes,
    content_type: Option<String>,
}

/// Process-wide table of live object URLs.
#[derive(Clone, Default)]
pub struct ObjectUrlRegistry {
    entries: Arc<Mutex<HashMap<String, ObjectEntry>>>,
}

impl ObjectUrlRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `bytes` under a fresh URL.
    pub fn create(&self, bytes: Bytes, content_type: Option<String>) -> ObjectUrl {
        let url = format!("{}{}", OBJECT_URL_PREFIX, Uuid::new_v4());
        self.entries
            .lock()
            .insert(url.clone(), ObjectEntry { bytes, content_type });

        ObjectUrl {
            url,
            registry: self.clone(),
        }
    }

    /// Bytes behind a live URL.
    pub fn resolve(&self, url: &str) -> Option<Bytes> {
        self.entries.lock().get(url).map(|entry| entry.bytes.clone())
    }

    pub fn content_type(&self, url: &str) -> Option<String> {
        self.entries
            .lock()
            .get(url)
            .and_then(|entry| entry.content_type.clone())
    }

    fn revoke(&self, url: &str) -> bool {
        self.entries.lock().remove(url).is_some()
    }

    /// Number of URLs not yet revoked.
    pub fn live_count(&self) -> usize {
        self.entries.lock().len()
    }
}

impl fmt::Debug for ObjectUrlRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectUrlRegistry")
            .field("live_count", &self.live_count())
            .finish()
    }
}

/// A live object URL; revoked when dropped.
pub struct ObjectUrl {
    url: String,
    registry: ObjectUrlRegistry,
}

impl ObjectUrl {
    pub fn as_str(&self) -> &str {
        &self.url
    }

    pub fn len(&self) -> usize {
        self.registry.resolve(&self.url).map_or(0, |b| b.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for ObjectUrl {
    fn drop(&mut self) {
        if self.registry.revoke(&self.url) {
            debug!(url = %self.url, "Revoked object URL");
        }
    }
}

impl fmt::Debug for ObjectUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ObjectUrl").field(&self.url).finish()
    }
}

/// Where to play a track from.
#[derive(Debug)]
pub enum PlaybackSource {
    /// Local bytes from the cache.
    Cached(ObjectUrl),
    /// Normalized network URL.
    Network(String),
}

impl PlaybackSource {
    /// URL to hand to the player.
    pub fn url(&self) -> &str {
        match self {
            PlaybackSource::Cached(object) => object.as_str(),
            PlaybackSource::Network(url) => url,
        }
    }

    pub fn is_cached(&self) -> bool {
        matches!(self, PlaybackSource::Cached(_))
    }
}

pub struct PlaybackSourceResolver {
    generation: String,
    default_scheme: String,
    cache_storage: Arc<dyn CacheStorage>,
    registry: ObjectUrlRegistry,
    event_bus: EventBus,
}

impl PlaybackSourceResolver {
    pub fn new(config: &OfflineConfig, registry: ObjectUrlRegistry, event_bus: EventBus) -> Self {
        Self {
            generation: config.cache_generation.clone(),
            default_scheme: config.default_scheme.clone(),
            cache_storage: Arc::clone(&config.cache_storage),
            registry,
            event_bus,
        }
    }

    pub fn registry(&self) -> &ObjectUrlRegistry {
        &self.registry
    }

    /// Resolve `track`'s source. Fails only if it has no download URL.
    pub async fn resolve(&self, track: &Track) -> Result<PlaybackSource> {
        let url = track
            .download_url()
            .ok_or_else(|| OfflineError::MissingDownloadUrl(track.id.to_string()))?;
        Ok(self.resolve_url(url).await)
    }

    /// Resolve a raw download URL.
    #[instrument(skip_all, fields(url = %redact_url(url)))]
    pub async fn resolve_url(&self, url: &str) -> PlaybackSource {
        let key = normalize_url(url, &self.default_scheme);

        let cached = async {
            let store = self.cache_storage.open(&self.generation).await?;
            store.lookup(&key).await
        }
        .await;

        let source = match cached {
            Ok(Some(response)) if response.body.is_empty() => {
                warn!("Cached entry is empty; playing from network");
                self.event_bus
                    .emit(CoreEvent::Playback(PlaybackEvent::CorruptEntryBypassed {
                        url: redact_url(&key),
                    }))
                    .ok();
                PlaybackSource::Network(key)
            }
            Ok(Some(response)) => {
                let content_type = response.content_type().map(str::to_string);
                PlaybackSource::Cached(self.registry.create(response.body, content_type))
            }
            Ok(None) => PlaybackSource::Network(key),
            Err(e) => {
                warn!(error = %e, "Cache lookup failed; playing from network");
                PlaybackSource::Network(key)
            }
        };

        debug!(from_cache = source.is_cached(), "Resolved playback source");
        self.event_bus
            .emit(CoreEvent::Playback(PlaybackEvent::SourceResolved {
                url: redact_url(url),
                from_cache: source.is_cached(),
            }))
            .ok();
        source
    }
}

/// Holds the source of whatever is currently loaded in a player.
///
/// Loading another track or dropping the session releases the previous
/// object URL.
pub struct PlaybackSession {
    resolver: Arc<PlaybackSourceResolver>,
    current: Option<PlaybackSource>,
}

impl PlaybackSession {
    pub fn new(resolver: Arc<PlaybackSourceResolver>) -> Self {
        Self {
            resolver,
            current: None,
        }
    }

    pub async fn load(&mut self, track: &Track) -> Result<&PlaybackSource> {
        // Release first so the old URL is gone even if resolution fails.
        self.current = None;
        let source = self.resolver.resolve(track).await?;
        Ok(self.current.insert(source))
    }

    pub fn current(&self) -> Option<&PlaybackSource> {
        self.current.as_ref()
    }

    pub fn release(&mut self) {
        self.current = None;
    }
}
