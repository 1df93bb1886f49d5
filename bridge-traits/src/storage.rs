//! Settings Storage Abstraction
//!
//! Durable key-value storage for application settings. The binding core keeps
//! exactly one record here, under the `account` key.

use async_trait::async_trait;

use crate::error::Result;

/// Key-value settings storage trait
///
/// Abstracts the host's persisted-settings mechanism:
/// - Desktop/server: SQLite-backed store (`bridge-desktop`)
/// - Tests: in-memory maps
///
/// Values must survive process restarts. Implementations must make single-key
/// writes atomic; no multi-key transactions are required.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::SettingsStore;
///
/// async fn remember(store: &dyn SettingsStore) -> Result<()> {
///     store.set_string("account", r#"{"client_id":"c1"}"#).await?;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Store a string value, replacing any previous value
    async fn set_string(&self, key: &str, value: &str) -> Result<()>;

    /// Retrieve a string value
    ///
    /// Returns `Ok(None)` if the key doesn't exist.
    async fn get_string(&self, key: &str) -> Result<Option<String>>;

    /// Delete a setting. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Check if a setting exists
    async fn has_key(&self, key: &str) -> Result<bool> {
        Ok(self.get_string(key).await?.is_some())
    }
}
