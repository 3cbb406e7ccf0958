//! Durable index of offline tracks.
//!
//! The whole index is one JSON array in a single settings slot, rewritten
//! in full on every change. Mutations are serialized and persist a new copy
//! before swapping it in, so a failed write leaves memory and storage
//! agreeing on the old index.

use crate::error::{OfflineError, Result};
use crate::models::{OfflineTrackRecord, TrackId};
use crate::url::normalize_url;
use bridge_traits::SettingsStore;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

pub(crate) struct MetadataIndex {
    key: String,
    store: Arc<dyn SettingsStore>,
    records: RwLock<Vec<OfflineTrackRecord>>,
    write_lock: Mutex<()>,
}

impl MetadataIndex {
    /// Read the index from `store`, normalizing stored URLs.
    ///
    /// An unreadable slot is logged and treated as empty; it is only
    /// overwritten by the next mutation.
    pub async fn load(store: Arc<dyn SettingsStore>, key: &str, default_scheme: &str) -> Result<Self> {
        let records = match store.get_string(key).await? {
            None => Vec::new(),
            Some(json) => match Self::decode(&json, default_scheme) {
                Ok(records) => records,
                Err(e) => {
                    error!(key, error = %e, "Failed to parse offline library index; starting empty");
                    Vec::new()
                }
            },
        };

        info!(records = records.len(), "Loaded offline library index");
        Ok(Self {
            key: key.to_string(),
            store,
            records: RwLock::new(records),
            write_lock: Mutex::new(()),
        })
    }

    fn decode(json: &str, default_scheme: &str) -> Result<Vec<OfflineTrackRecord>> {
        let parsed: Vec<OfflineTrackRecord> =
            serde_json::from_str(json).map_err(|e| OfflineError::CorruptIndex(e.to_string()))?;

        let mut seen = HashSet::new();
        let mut records = Vec::with_capacity(parsed.len());
        for mut record in parsed {
            if !seen.insert(record.id.clone()) {
                debug!(id = %record.id, "Dropping duplicate index record");
                continue;
            }
            record.download_url = normalize_url(&record.download_url, default_scheme);
            record.track.download_url = Some(record.download_url.clone());
            records.push(record);
        }
        Ok(records)
    }

    async fn persist(&self, records: &[OfflineTrackRecord]) -> Result<()> {
        let json = serde_json::to_string(records)
            .map_err(|e| OfflineError::Persistence(e.to_string()))?;
        self.store
            .set_string(&self.key, &json)
            .await
            .map_err(|e| OfflineError::Persistence(e.to_string()))
    }

    pub fn contains(&self, id: &TrackId) -> bool {
        self.records.read().iter().any(|r| &r.id == id)
    }

    pub fn get(&self, id: &TrackId) -> Option<OfflineTrackRecord> {
        self.records.read().iter().find(|r| &r.id == id).cloned()
    }

    pub fn snapshot(&self) -> Vec<OfflineTrackRecord> {
        self.records.read().clone()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Append `record` unless one with the same id exists.
    ///
    /// Returns `false` when a record was already present.
    pub async fn insert(&self, record: OfflineTrackRecord) -> Result<bool> {
        let _guard = self.write_lock.lock().await;

        let mut next = self.snapshot();
        if next.iter().any(|r| r.id == record.id) {
            return Ok(false);
        }
        next.push(record);

        self.persist(&next).await?;
        *self.records.write() = next;
        Ok(true)
    }

    /// Remove and return the record for `id`, if any.
    pub async fn remove(&self, id: &TrackId) -> Result<Option<OfflineTrackRecord>> {
        let _guard = self.write_lock.lock().await;

        let mut next = self.snapshot();
        let Some(pos) = next.iter().position(|r| &r.id == id) else {
            return Ok(None);
        };
        let removed = next.remove(pos);

        self.persist(&next).await?;
        *self.records.write() = next;
        Ok(Some(removed))
    }

    /// Remove every record; returns how many there were.
    pub async fn clear(&self) -> Result<usize> {
        let _guard = self.write_lock.lock().await;

        let count = self.len();
        self.persist(&[]).await?;
        self.records.write().clear();
        Ok(count)
    }
}
