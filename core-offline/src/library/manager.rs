//! # Offline Library Manager
//!
//! Explicit, user-driven control over which tracks stay available offline.
//!
//! - Presence in the index is the only definition of "offline". Bytes that
//!   happen to be cached through normal playback do not count.
//! - A download writes the cache first, then the index. A failed download
//!   never leaves a record behind.
//! - A delete removes the record first, then the bytes. A stray cache entry
//!   without a record is harmless; a record without bytes degrades to
//!   network playback.
//! - Failures never cross the public API as errors. Callers get an outcome
//!   value and a [`LibraryEvent`] is published for the user.

use crate::error::{OfflineError, Result};
use crate::library::in_flight::InFlightSet;
use crate::library::index::MetadataIndex;
use crate::models::{OfflineTrackRecord, Track, TrackId};
use crate::url::{fetch_url, normalize_url};
use bridge_traits::{CacheStorage, Clock, HttpClient, HttpRequest, HttpResponse, UserPrompt};
use core_runtime::config::{OfflineConfig, ProxyRule};
use core_runtime::events::{CoreEvent, EventBus, LibraryEvent};
use core_runtime::logging::redact_url;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Question put to the user before wiping the library.
pub const CLEAR_CONFIRMATION: &str = "Are you sure you want to delete all downloaded messages?";

/// Result of [`OfflineLibraryManager::download_track`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DownloadOutcome {
    /// Bytes cached and record stored.
    Downloaded { bytes: u64 },
    /// Track was already in the library; nothing fetched.
    AlreadyOffline,
    /// Another download of this track is running; nothing fetched.
    AlreadyInProgress,
    /// Track carries no download URL.
    MissingUrl,
    Cancelled,
    Failed { message: String, retryable: bool },
}

impl DownloadOutcome {
    /// Whether the track is offline once this call returns.
    pub fn is_offline(&self) -> bool {
        matches!(
            self,
            DownloadOutcome::Downloaded { .. } | DownloadOutcome::AlreadyOffline
        )
    }
}

/// Result of [`OfflineLibraryManager::clear_library`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClearOutcome {
    Cleared {
        records_removed: usize,
        entries_removed: usize,
    },
    /// The user did not confirm; nothing changed.
    Declined,
    Failed { message: String },
}

/// Summary of the library against the cache.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryStats {
    pub track_count: usize,
    /// Bytes held by cache entries of recorded tracks.
    pub cached_bytes: u64,
    /// Records whose bytes are not in the cache.
    pub missing_entries: usize,
    pub downloading: usize,
}

pub struct OfflineLibraryManager {
    generation: String,
    default_scheme: String,
    download_timeout: Duration,
    proxy_rules: Vec<ProxyRule>,
    cache_storage: Arc<dyn CacheStorage>,
    http_client: Arc<dyn HttpClient>,
    user_prompt: Option<Arc<dyn UserPrompt>>,
    clock: Arc<dyn Clock>,
    index: MetadataIndex,
    in_flight: InFlightSet,
    event_bus: EventBus,
}

impl OfflineLibraryManager {
    /// Create a manager, reading the persisted index once.
    #[instrument(skip_all, fields(generation = %config.cache_generation))]
    pub async fn load(config: &OfflineConfig, event_bus: EventBus) -> Result<Self> {
        let index = MetadataIndex::load(
            Arc::clone(&config.settings_store),
            &config.metadata_key,
            &config.default_scheme,
        )
        .await?;

        Ok(Self {
            generation: config.cache_generation.clone(),
            default_scheme: config.default_scheme.clone(),
            download_timeout: config.download_timeout,
            proxy_rules: config.proxy_rules.clone(),
            cache_storage: Arc::clone(&config.cache_storage),
            http_client: Arc::clone(&config.http_client),
            user_prompt: config.user_prompt.clone(),
            clock: Arc::clone(&config.clock),
            index,
            in_flight: InFlightSet::default(),
            event_bus,
        })
    }

    fn emit(&self, event: LibraryEvent) {
        self.event_bus.emit(CoreEvent::Library(event)).ok();
    }

    pub fn is_track_offline(&self, id: &TrackId) -> bool {
        self.index.contains(id)
    }

    pub fn is_track_downloading(&self, id: &TrackId) -> bool {
        self.in_flight.contains(id)
    }

    /// Offline records in the order they were added.
    pub fn offline_tracks(&self) -> Vec<OfflineTrackRecord> {
        self.index.snapshot()
    }

    pub fn offline_track(&self, id: &TrackId) -> Option<OfflineTrackRecord> {
        self.index.get(id)
    }

    pub fn downloading_ids(&self) -> Vec<TrackId> {
        self.in_flight.ids()
    }

    /// Fetch `track`'s audio into the cache and record it as offline.
    ///
    /// Idempotent for tracks already offline, and a no-op while another
    /// download of the same track runs. The in-flight marker is cleared as
    /// the last step on every path.
    #[instrument(skip_all, fields(track_id = %track.id))]
    pub async fn download_track(&self, track: &Track) -> DownloadOutcome {
        let Some(raw_url) = track.download_url() else {
            warn!("Track has no download URL");
            self.emit(LibraryEvent::DownloadFailed {
                track_id: track.id.to_string(),
                message: OfflineError::MissingDownloadUrl(track.id.to_string()).to_string(),
                retryable: false,
            });
            return DownloadOutcome::MissingUrl;
        };

        if self.index.contains(&track.id) {
            debug!("Track already offline");
            return DownloadOutcome::AlreadyOffline;
        }

        let Some(guard) = self.in_flight.try_begin(&track.id) else {
            debug!("Download already in progress");
            return DownloadOutcome::AlreadyInProgress;
        };

        let key = normalize_url(raw_url, &self.default_scheme);
        let source = fetch_url(&key, &self.proxy_rules);
        info!(url = %redact_url(&key), proxied = source != key, "Starting download");
        self.emit(LibraryEvent::DownloadStarted {
            track_id: track.id.to_string(),
            title: track.display_title(),
        });

        // Only the network fetch is raced against cancellation and the
        // timeout. The cache write always runs to completion so it never
        // leaves a half-written entry behind.
        let token = guard.token().clone();
        let fetched = tokio::select! {
            biased;
            _ = token.cancelled() => Err(OfflineError::Cancelled),
            fetched = tokio::time::timeout(self.download_timeout, self.fetch(&source)) => {
                fetched.unwrap_or(Err(OfflineError::Timeout(self.download_timeout)))
            }
        };

        let result = match fetched {
            Ok(_) if token.is_cancelled() => Err(OfflineError::Cancelled),
            Ok(response) => self.store(&key, response).await,
            Err(e) => Err(e),
        };

        let outcome = match result {
            // Cancelled while the bytes were being stored: a concurrent
            // clear must not see them reappear.
            Ok(_) if token.is_cancelled() => {
                self.discard_entry(&key).await;
                self.report_cancelled(&track.id)
            }
            Ok(bytes) => self.record_download(track, &key, bytes).await,
            Err(OfflineError::Cancelled) => self.report_cancelled(&track.id),
            Err(e) => {
                warn!(error = %e, retryable = e.is_retryable(), "Download failed");
                self.report_failed(&track.id, &e)
            }
        };

        drop(guard);
        outcome
    }

    async fn fetch(&self, source: &str) -> Result<HttpResponse> {
        let request = HttpRequest::get(source).timeout(self.download_timeout);
        let response = self.http_client.execute(request).await?;

        if !response.is_success() {
            return Err(OfflineError::HttpStatus {
                status: response.status,
                url: redact_url(source),
            });
        }
        Ok(response)
    }

    async fn store(&self, key: &str, response: HttpResponse) -> Result<u64> {
        let bytes = response.body.len() as u64;
        let store = self.cache_storage.open(&self.generation).await?;
        store.put(key, response).await?;
        debug!(bytes, "Stored download in cache");
        Ok(bytes)
    }

    async fn record_download(&self, track: &Track, key: &str, bytes: u64) -> DownloadOutcome {
        let record = OfflineTrackRecord::from_track(track, key, self.clock.now());

        match self.index.insert(record).await {
            Ok(inserted) => {
                if !inserted {
                    debug!("Record already present; keeping the existing one");
                }
                info!(bytes, "Download completed");
                self.emit(LibraryEvent::DownloadCompleted {
                    track_id: track.id.to_string(),
                    title: track.display_title(),
                    bytes,
                });
                DownloadOutcome::Downloaded { bytes }
            }
            Err(e) => {
                error!(error = %e, "Downloaded bytes but could not record the track");
                self.report_failed(&track.id, &e)
            }
        }
    }

    fn report_cancelled(&self, id: &TrackId) -> DownloadOutcome {
        info!("Download cancelled");
        self.emit(LibraryEvent::DownloadCancelled {
            track_id: id.to_string(),
        });
        DownloadOutcome::Cancelled
    }

    fn report_failed(&self, id: &TrackId, err: &OfflineError) -> DownloadOutcome {
        let message = err.to_string();
        let retryable = err.is_retryable();
        self.emit(LibraryEvent::DownloadFailed {
            track_id: id.to_string(),
            message: message.clone(),
            retryable,
        });
        DownloadOutcome::Failed { message, retryable }
    }

    async fn discard_entry(&self, key: &str) {
        let result = async {
            let store = self.cache_storage.open(&self.generation).await?;
            store.delete(key).await
        }
        .await;

        if let Err(e) = result {
            warn!(url = %redact_url(key), error = %e, "Failed to discard cache entry");
        }
    }

    /// Stop a running download. Returns `false` if none was running.
    #[instrument(skip(self))]
    pub fn cancel_download(&self, id: &TrackId) -> bool {
        self.in_flight.cancel(id)
    }

    /// Remove a track from the library, then drop its cached bytes.
    ///
    /// Returns `true` if the track was offline and no longer is. The cache
    /// delete is best-effort: if it fails the track is still removed.
    #[instrument(skip(self))]
    pub async fn delete_track(&self, id: &TrackId) -> bool {
        let record = match self.index.remove(id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                debug!("Track not in library");
                return false;
            }
            Err(e) => {
                error!(error = %e, "Failed to delete track");
                self.emit(LibraryEvent::DeleteFailed {
                    track_id: id.to_string(),
                    message: e.to_string(),
                });
                return false;
            }
        };

        self.discard_entry(&record.download_url).await;
        info!("Track removed from offline library");
        self.emit(LibraryEvent::TrackDeleted {
            track_id: id.to_string(),
        });
        true
    }

    /// Wipe every cache entry in the current generation and empty the index.
    ///
    /// Asks the user first; without a [`UserPrompt`] nothing is cleared.
    /// Entries cached opportunistically are removed too, and running
    /// downloads are cancelled.
    #[instrument(skip(self))]
    pub async fn clear_library(&self) -> ClearOutcome {
        let confirmed = match &self.user_prompt {
            Some(prompt) => prompt.confirm(CLEAR_CONFIRMATION).await,
            None => {
                warn!("No confirmation prompt available; refusing to clear library");
                false
            }
        };
        if !confirmed {
            debug!("Clear declined");
            return ClearOutcome::Declined;
        }

        let cancelled = self.in_flight.cancel_all();
        if cancelled > 0 {
            info!(cancelled, "Cancelled running downloads");
        }

        let entries_removed = match self.purge_cache().await {
            Ok(count) => count,
            Err(e) => return self.report_clear_failed(e),
        };
        let records_removed = match self.index.clear().await {
            Ok(count) => count,
            Err(e) => return self.report_clear_failed(e),
        };

        info!(records_removed, entries_removed, "Offline library cleared");
        self.emit(LibraryEvent::LibraryCleared {
            records_removed,
            entries_removed,
        });
        ClearOutcome::Cleared {
            records_removed,
            entries_removed,
        }
    }

    async fn purge_cache(&self) -> Result<usize> {
        let store = self.cache_storage.open(&self.generation).await?;
        let mut removed = 0;
        for key in store.keys().await? {
            if store.delete(&key).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn report_clear_failed(&self, err: OfflineError) -> ClearOutcome {
        error!(error = %err, "Failed to clear library");
        let message = err.to_string();
        self.emit(LibraryEvent::ClearFailed {
            message: message.clone(),
        });
        ClearOutcome::Failed { message }
    }

    /// Compare the index against the cache without repairing anything.
    #[instrument(skip(self))]
    pub async fn library_stats(&self) -> Result<LibraryStats> {
        let records = self.index.snapshot();
        let store = self.cache_storage.open(&self.generation).await?;

        let mut stats = LibraryStats {
            track_count: records.len(),
            downloading: self.in_flight.ids().len(),
            ..Default::default()
        };

        for record in &records {
            match store.lookup(&record.download_url).await? {
                Some(response) => stats.cached_bytes += response.body.len() as u64,
                None => stats.missing_entries += 1,
            }
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_desktop::{FixedAnswerPrompt, MemoryCacheStorage, SqliteSettingsStore};
    use bridge_traits::{BridgeError, FixedClock, HttpResponse, SettingsStore};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct StubHttp {
        calls: Mutex<Vec<String>>,
        status: Option<u16>,
    }

    #[async_trait]
    impl HttpClient for StubHttp {
        async fn execute(&self, request: HttpRequest) -> bridge_traits::error::Result<HttpResponse> {
            self.calls.lock().push(request.url.clone());
            let mut response = HttpResponse::ok(vec![1u8; 32]);
            if let Some(status) = self.status {
                response.status = status;
            }
            Ok(response)
        }
    }

    struct FailingSettings;

    #[async_trait]
    impl SettingsStore for FailingSettings {
        async fn set_string(&self, _: &str, _: &str) -> bridge_traits::error::Result<()> {
            Err(BridgeError::Storage("read-only".into()))
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

    async fn manager_with(
        http: Arc<StubHttp>,
        settings: Arc<dyn SettingsStore>,
    ) -> (OfflineLibraryManager, Arc<MemoryCacheStorage>) {
        let storage = Arc::new(MemoryCacheStorage::new());
        let config = OfflineConfig::builder()
            .http_client(http)
            .cache_storage(storage.clone())
            .settings_store(settings)
            .user_prompt(Arc::new(FixedAnswerPrompt::accept()))
            .clock(Arc::new(FixedClock::at_unix(1_700_000_000)))
            .build()
            .unwrap();
        let manager = OfflineLibraryManager::load(&config, EventBus::default())
            .await
            .unwrap();
        (manager, storage)
    }

    #[tokio::test]
    async fn test_missing_url_is_rejected_without_fetch() {
        let http = Arc::new(StubHttp::default());
        let settings = Arc::new(SqliteSettingsStore::in_memory().await.unwrap());
        let (manager, _) = manager_with(http.clone(), settings).await;

        let mut track = Track::new(1u64, "");
        track.download_url = None;

        assert_eq!(manager.download_track(&track).await, DownloadOutcome::MissingUrl);
        assert!(http.calls.lock().is_empty());
        assert!(!manager.is_track_downloading(&track.id));
    }

    #[tokio::test]
    async fn test_http_error_status_is_retryable_failure() {
        let http = Arc::new(StubHttp {
            status: Some(502),
            ..Default::default()
        });
        let settings = Arc::new(SqliteSettingsStore::in_memory().await.unwrap());
        let (manager, storage) = manager_with(http, settings).await;
        let track = Track::new(7u64, "media.example.net/t7.mp3");

        match manager.download_track(&track).await {
            DownloadOutcome::Failed { retryable, message } => {
                assert!(retryable);
                assert!(message.contains("502"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        assert!(!manager.is_track_offline(&track.id));
        let store = storage.open("offline-audio-v1").await.unwrap();
        assert!(store.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_persist_failure_leaves_index_unchanged() {
        let http = Arc::new(StubHttp::default());
        let (manager, _) = manager_with(http, Arc::new(FailingSettings)).await;
        let track = Track::new(7u64, "media.example.net/t7.mp3");

        let outcome = manager.download_track(&track).await;
        assert!(matches!(outcome, DownloadOutcome::Failed { retryable: false, .. }));
        assert!(!manager.is_track_offline(&track.id));
        assert!(manager.downloading_ids().is_empty());
    }

    #[tokio::test]
    async fn test_record_uses_clock_and_fallback_title() {
        let http = Arc::new(StubHttp::default());
        let settings = Arc::new(SqliteSettingsStore::in_memory().await.unwrap());
        let (manager, _) = manager_with(http, settings).await;
        let track = Track::new(9u64, "media.example.net/t9.mp3").with_titles(None, Some("ข่าวดี"));

        manager.download_track(&track).await;
        let record = manager.offline_track(&track.id).unwrap();

        assert_eq!(record.title, "ข่าวดี");
        assert_eq!(record.downloaded_at.map(|t| t.timestamp()), Some(1_700_000_000));
    }

    #[tokio::test]
    async fn test_delete_unknown_track_is_noop() {
        let http = Arc::new(StubHttp::default());
        let settings = Arc::new(SqliteSettingsStore::in_memory().await.unwrap());
        let (manager, _) = manager_with(http, settings).await;

        assert!(!manager.delete_track(&TrackId::from("nope")).await);
    }

    #[tokio::test]
    async fn test_stats_report_missing_bytes() {
        let http = Arc::new(StubHttp::default());
        let settings = Arc::new(SqliteSettingsStore::in_memory().await.unwrap());
        let (manager, storage) = manager_with(http, settings).await;

        manager.download_track(&Track::new(1u64, "a.example/1.mp3")).await;
        manager.download_track(&Track::new(2u64, "a.example/2.mp3")).await;

        // Bytes evicted behind the library's back
        let store = storage.open("offline-audio-v1").await.unwrap();
        store.delete("https://a.example/2.mp3").await.unwrap();

        let stats = manager.library_stats().await.unwrap();
        assert_eq!(stats.track_count, 2);
        assert_eq!(stats.cached_bytes, 32);
        assert_eq!(stats.missing_entries, 1);
        assert_eq!(stats.downloading, 0);

        // Divergence is reported, not repaired
        assert!(manager.is_track_offline(&TrackId::from(2u64)));
    }
}
