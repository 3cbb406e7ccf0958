//! # Domain Models
//!
//! A [`Track`] is a content item as the host hands it over; only a few of
//! its fields matter here, everything else rides along untouched. An
//! [`OfflineTrackRecord`] is what the library persists once a download
//! completes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Content item identifier.
///
/// Content datasets use both numeric and string ids; both deserialize into
/// the same value so `62808` and `"62808"` name the same track.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TrackId(String);

impl TrackId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TrackId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for TrackId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<u64> for TrackId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl<'de> Deserialize<'de> for TrackId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Unsigned(u64),
            Signed(i64),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(s) => TrackId(s),
            Raw::Unsigned(n) => TrackId(n.to_string()),
            Raw::Signed(n) => TrackId(n.to_string()),
        })
    }
}

/// A content item with at least an id and a download URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,

    #[serde(rename = "trackDownloadUrl", default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,

    #[serde(rename = "title_en", default, skip_serializing_if = "Option::is_none")]
    pub title_en: Option<String>,

    #[serde(rename = "title_th", default, skip_serializing_if = "Option::is_none")]
    pub title_th: Option<String>,

    #[serde(rename = "languageEn", default, skip_serializing_if = "Option::is_none")]
    pub language_en: Option<String>,

    #[serde(rename = "langTh", default, skip_serializing_if = "Option::is_none")]
    pub language_th: Option<String>,

    /// Every other field of the content item, kept verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Track {
    pub fn new(id: impl Into<TrackId>, download_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            download_url: Some(download_url.into()),
            title_en: None,
            title_th: None,
            language_en: None,
            language_th: None,
            extra: Map::new(),
        }
    }

    pub fn with_titles(mut self, en: Option<&str>, th: Option<&str>) -> Self {
        self.title_en = en.map(str::to_string);
        self.title_th = th.map(str::to_string);
        self
    }

    pub fn with_languages(mut self, en: Option<&str>, th: Option<&str>) -> Self {
        self.language_en = en.map(str::to_string);
        self.language_th = th.map(str::to_string);
        self
    }

    /// Download URL if present and not blank.
    pub fn download_url(&self) -> Option<&str> {
        self.download_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    /// English title, then Thai title, then the id.
    pub fn display_title(&self) -> String {
        non_blank(&self.title_en)
            .or_else(|| non_blank(&self.title_th))
            .map(str::to_string)
            .unwrap_or_else(|| self.id.to_string())
    }

    pub fn display_language(&self) -> Option<String> {
        non_blank(&self.language_en)
            .or_else(|| non_blank(&self.language_th))
            .map(str::to_string)
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

/// A track the user explicitly kept offline.
///
/// Records are replaced wholesale, never edited in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflineTrackRecord {
    pub id: TrackId,
    pub title: String,
    #[serde(default)]
    pub language: Option<String>,
    /// Normalized URL; also the cache key of the stored bytes.
    pub download_url: String,
    #[serde(default)]
    pub downloaded_at: Option<DateTime<Utc>>,
    /// Full content item as it was when downloaded.
    pub track: Track,
}

impl OfflineTrackRecord {
    /// Build a record from `track`, storing `normalized_url` both on the
    /// record and on the embedded track.
    pub fn from_track(track: &Track, normalized_url: &str, downloaded_at: DateTime<Utc>) -> Self {
        let mut track = track.clone();
        track.download_url = Some(normalized_url.to_string());

        Self {
            id: track.id.clone(),
            title: track.display_title(),
            language: track.display_language(),
            download_url: normalized_url.to_string(),
            downloaded_at: Some(downloaded_at),
            track,
        }
    }
}
