//! # Offline Library
//!
//! User-initiated downloads and the durable index of offline tracks.
//!
//! - `index` - the persisted list of [`OfflineTrackRecord`](crate::models::OfflineTrackRecord)s
//! - `in_flight` - ids currently downloading, each with a cancellation token
//! - [`manager`] - the public operations

mod in_flight;
mod index;
pub mod manager;

pub use manager::{
    ClearOutcome, DownloadOutcome, LibraryStats, OfflineLibraryManager, CLEAR_CONFIRMATION,
};
