//! # Offline Audio Core
//!
//! Two cooperating writers over one versioned response cache:
//!
//! - [`interceptor::AudioInterceptor`] sits on the request path and serves
//!   audio URLs cache-first, caching whatever it fetches on a miss.
//! - [`library::OfflineLibraryManager`] handles explicit downloads and keeps
//!   the durable index of tracks the user chose to keep offline.
//!
//! [`playback::PlaybackSourceResolver`] reads the same cache to decide
//! whether a track plays from local bytes or from the network.
//!
//! ```text
//!            request path                          user actions
//!                 │                                     │
//!        ┌────────▼─────────┐                 ┌─────────▼──────────┐
//!        │ AudioInterceptor │                 │ OfflineLibraryMgr  │──> SettingsStore
//!        └────────┬─────────┘                 └─────────┬──────────┘    (index slot)
//!                 │ lookup/put                 put/delete/keys
//!                 └──────────────┐   ┌──────────────────┘
//!                          ┌─────▼───▼─────┐
//!                          │  CacheStore   │<── lookup ── PlaybackSourceResolver
//!                          │ (generation)  │
//!                          └───────────────┘
//! ```
//!
//! The index, not the cache, answers "is this track offline". The two are
//! not transactionally linked; see [`library`] for how they are kept apart.

pub mod error;
pub mod interceptor;
pub mod library;
pub mod models;
pub mod playback;
pub mod url;

pub use error::{OfflineError, Result};
pub use interceptor::{AudioInterceptor, InterceptorState};
pub use library::{ClearOutcome, DownloadOutcome, LibraryStats, OfflineLibraryManager};
pub use models::{OfflineTrackRecord, Track, TrackId};
pub use playback::{ObjectUrl, ObjectUrlRegistry, PlaybackSession, PlaybackSource, PlaybackSourceResolver};
