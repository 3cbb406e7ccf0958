//! Key-Value Settings Abstraction
//!
//! Durable string slots used for small documents such as the offline library
//! index. Every write replaces the slot wholesale; there is no merge, so two
//! processes writing the same key follow last-writer-wins.

use async_trait::async_trait;

use crate::error::Result;

/// Key-value settings storage trait
///
/// Abstracts platform-specific preferences storage:
/// - Desktop: SQLite-backed table
/// - Web: localStorage
/// - Mobile: UserDefaults / DataStore
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::SettingsStore;
///
/// async fn save_index(store: &dyn SettingsStore, json: &str) -> Result<()> {
///     store.set_string("offline_library_metadata", json).await
/// }
/// ```
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Store a string value, overwriting any previous value
    async fn set_string(&self, key: &str, value: &str) -> Result<()>;

    /// Retrieve a string value
    async fn get_string(&self, key: &str) -> Result<Option<String>>;

    /// Delete a setting
    async fn delete(&self, key: &str) -> Result<()>;

    /// Check if a setting exists
    async fn has_key(&self, key: &str) -> Result<bool> {
        Ok(self.get_string(key).await?.is_some())
    }

    /// List all setting keys
    async fn list_keys(&self) -> Result<Vec<String>>;
}
