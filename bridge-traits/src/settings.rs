//! Key-Value Settings Storage
//!
//! Abstracts non-secret preference storage. The sync core uses it for the
//! per-collection "last synced ETag" cursor; hosts may share the same store
//! for their own preferences.
//!
//! A given key must have a single writer at a time. The sync engine
//! guarantees this for its own keys by serializing sync passes at the
//! coordinator entry point.

use async_trait::async_trait;

use crate::error::Result;

/// Key-value settings storage trait
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Store a string value
    async fn set_string(&self, key: &str, value: &str) -> Result<()>;

    /// Retrieve a string value
    ///
    /// Returns `Ok(None)` if the key doesn't exist.
    async fn get_string(&self, key: &str) -> Result<Option<String>>;

    /// Store a boolean value
    async fn set_bool(&self, key: &str, value: bool) -> Result<()>;

    /// Retrieve a boolean value
    async fn get_bool(&self, key: &str) -> Result<Option<bool>>;

    /// Delete a setting
    async fn delete(&self, key: &str) -> Result<()>;

    /// Check if a setting exists
    async fn has_key(&self, key: &str) -> Result<bool>;
}
