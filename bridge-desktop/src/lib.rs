//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `HttpClient` using `reqwest`
//! - `CacheStorage` on the local filesystem ([`FsCacheStorage`]) or in memory
//!   ([`MemoryCacheStorage`])
//! - `SettingsStore` using a SQLite-backed key-value table
//! - `UserPrompt` answering from a fixed policy
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{FsCacheStorage, ReqwestHttpClient, SqliteSettingsStore};
//!
//! #[tokio::main]
//! async fn main() -> bridge_traits::error::Result<()> {
//!     let http_client = ReqwestHttpClient::new()?;
//!     let caches = FsCacheStorage::new(FsCacheStorage::default_root());
//!     let settings = SqliteSettingsStore::new("settings.db".into()).await?;
//!     // Hand these to the offline core configuration
//!     Ok(())
//! }
//! ```

mod cache_storage;
mod http;
mod memory;
mod prompt;
mod settings;

pub use cache_storage::FsCacheStorage;
pub use http::ReqwestHttpClient;
pub use memory::MemoryCacheStorage;
pub use prompt::FixedAnswerPrompt;
pub use settings::SqliteSettingsStore;
