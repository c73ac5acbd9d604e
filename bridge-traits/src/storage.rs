//! Remote File Storage Abstraction
//!
//! Provides a platform-agnostic trait for a remote file hierarchy addressed
//! by directory and file name, where every file and every directory listing
//! carries an opaque version tag (ETag). Equality of tags implies equality
//! of content for sync-comparison purposes.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// One entry of a remote directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    /// File name within its directory (not a full path)
    pub name: String,
    /// Opaque version tag for the file content
    pub etag: String,
}

/// Remote file storage trait
///
/// Abstracts the cloud backend the sync engine reconciles against:
/// - OneDrive/Graph: drive items under an app folder
/// - Any other file-based store exposing per-file version tags
///
/// Directories are flat collections of files; the engine never nests
/// directories below the per-collection level. Implementations are expected
/// to create missing directories lazily on first use.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::FileStorage;
///
/// async fn entry_count(storage: &dyn FileStorage) -> Result<usize> {
///     Ok(storage.list("links").await?.len())
/// }
/// ```
#[async_trait]
pub trait FileStorage: Send + Sync {
    /// Get the composite version tag of a directory.
    ///
    /// The tag must change whenever any file in the directory is created,
    /// replaced, or removed. Implementations create the directory if it does
    /// not exist yet.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::Network` (or `Unauthorized`) when the store is
    /// unreachable; the caller treats that as "source not ready".
    async fn directory_etag(&self, dir: &str) -> Result<String>;

    /// List all files in a directory with their version tags.
    ///
    /// Sub-directories are not reported.
    async fn list(&self, dir: &str) -> Result<Vec<RemoteEntry>>;

    /// Read a file's content and its current version tag.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::NotFound` when the file does not exist.
    async fn get(&self, dir: &str, name: &str) -> Result<(Bytes, String)>;

    /// Create or replace a file, returning the new version tag.
    async fn put(&self, dir: &str, name: &str, body: Bytes) -> Result<String>;

    /// Delete a file.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::NotFound` when the file does not exist; callers
    /// that need idempotent deletion treat that variant as success.
    async fn delete(&self, dir: &str, name: &str) -> Result<()>;
}
