//! Workspace entry crate.
//!
//! Host applications depend on `offline-audio-workspace` and pick a feature:
//! `desktop-shims` wires the native adapters from `bridge-desktop`, while
//! `headless` exposes the service facade for hosts that inject their own
//! bridges.

#[cfg(any(feature = "desktop-shims", feature = "headless"))]
pub use core_offline as offline;
#[cfg(any(feature = "desktop-shims", feature = "headless"))]
pub use core_service::{OfflineService, ServiceError};
#[cfg(feature = "desktop-shims")]
pub use core_service::{bootstrap_desktop, bootstrap_desktop_with};
