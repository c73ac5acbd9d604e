//! # Cloud Collection Adapter
//!
//! Per-collection view of the remote file store. Each collection is one
//! remote directory containing one JSON document per item, named
//! `<uuid>.json`. The adapter also owns the collection's "last synced
//! ETag" cursor, persisted through the injected [`SettingsStore`].
//!
//! Only the current sync pass writes the cursor (passes are serialized at
//! the coordinator entry point), so no further synchronization is needed.

use bytes::Bytes;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use bridge_traits::{FileStorage, SettingsStore};
use core_store::{SyncState, SyncTarget};

use crate::error::{Result, SyncError};
use crate::item::SyncableItem;

/// Cloud store adapter for one collection.
pub struct CloudStore<T: SyncableItem> {
    storage: Arc<dyn FileStorage>,
    settings: Arc<dyn SettingsStore>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: SyncableItem> CloudStore<T> {
    pub fn new(storage: Arc<dyn FileStorage>, settings: Arc<dyn SettingsStore>) -> Self {
        Self {
            storage,
            settings,
            _marker: PhantomData,
        }
    }

    fn dir() -> &'static str {
        T::COLLECTION.as_str()
    }

    fn file_name(id: Uuid) -> String {
        format!("{}.json", id)
    }

    fn cursor_key() -> String {
        format!("sync.{}.etag", T::COLLECTION.as_str())
    }

    /// Composite version tag of the collection directory.
    ///
    /// `None` means the store is unreachable; the caller reports the whole
    /// pass as source-not-ready without attempting per-item work.
    pub async fn data_source_etag(&self) -> Option<String> {
        match self.storage.directory_etag(Self::dir()).await {
            Ok(etag) => Some(etag),
            Err(e) => {
                warn!("Directory ETag unavailable for {}: {}", Self::dir(), e);
                None
            }
        }
    }

    /// Full id → ETag map of the remote collection.
    ///
    /// Entries whose file name is not `<uuid>.json` are skipped.
    pub async fn data_source_map(&self) -> Result<HashMap<Uuid, String>> {
        let entries = self
            .storage
            .list(Self::dir())
            .await
            .map_err(|e| SyncError::Cloud(e.to_string()))?;

        let mut map = HashMap::with_capacity(entries.len());
        for entry in entries {
            match entry.name.strip_suffix(".json").and_then(|stem| Uuid::parse_str(stem).ok()) {
                Some(id) => {
                    map.insert(id, entry.etag);
                }
                None => {
                    warn!("Skipping foreign remote entry {}/{}", Self::dir(), entry.name);
                }
            }
        }

        debug!("Remote {} collection has {} items", Self::dir(), map.len());
        Ok(map)
    }

    /// Serialize and upload one item, returning its new version tag.
    pub async fn upload(&self, item: &T) -> Result<String> {
        let body = item.to_document()?;
        self.storage
            .put(Self::dir(), &Self::file_name(item.id()), Bytes::from(body))
            .await
            .map_err(|e| SyncError::Cloud(e.to_string()))
    }

    /// Download and validate one item.
    ///
    /// Integrity rejections (malformed JSON, unknown envelope version, id
    /// mismatch, empty content) surface as `InvalidDocument`; the caller
    /// treats the item as absent. The returned item carries the remote
    /// version tag in a synced state.
    pub async fn download(&self, id: Uuid) -> Result<T> {
        let (bytes, etag) = self
            .storage
            .get(Self::dir(), &Self::file_name(id))
            .await
            .map_err(SyncError::from)?;

        let text = std::str::from_utf8(&bytes)
            .map_err(|e| SyncError::InvalidDocument(format!("Not UTF-8: {}", e)))?;

        let item = T::from_document(text)?;

        if item.id() != id {
            return Err(SyncError::InvalidDocument(format!(
                "Requested {} but document holds {}",
                id,
                item.id()
            )));
        }

        if item.is_empty() {
            return Err(SyncError::InvalidDocument(format!(
                "Item {} has no minimum content",
                id
            )));
        }

        Ok(item.with_state(SyncState::with_etag(etag, SyncTarget::Synced)))
    }

    /// Remove one item's remote file. Remote-not-found counts as success.
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        match self.storage.delete(Self::dir(), &Self::file_name(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => {
                debug!("Remote {}/{} already gone", Self::dir(), id);
                Ok(())
            }
            Err(e) => Err(SyncError::Cloud(e.to_string())),
        }
    }

    /// Whether the directory tag differs from the last persisted one.
    pub async fn is_cloud_changed(&self, etag: &str) -> Result<bool> {
        let stored = self
            .settings
            .get_string(&Self::cursor_key())
            .await
            .map_err(|e| SyncError::Settings(e.to_string()))?;

        Ok(stored.as_deref() != Some(etag))
    }

    /// Persist the directory tag of the pass that just completed.
    pub async fn update_last_synced_etag(&self, etag: &str) -> Result<()> {
        self.settings
            .set_string(&Self::cursor_key(), etag)
            .await
            .map_err(|e| SyncError::Settings(e.to_string()))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{InMemoryFileStorage, MemorySettingsStore};
    use crate::item::SyncableItem;
    use core_store::{Link, Tag};

    fn store() -> (CloudStore<Link>, Arc<InMemoryFileStorage>) {
        let storage = Arc::new(InMemoryFileStorage::new());
        let settings = Arc::new(MemorySettingsStore::new());
        (CloudStore::new(storage.clone(), settings), storage)
    }

    fn link() -> Link {
        Link::new("https://example.org", Some("Example".to_string()), false, vec![Tag::new("t")])
    }

    #[tokio::test]
    async fn test_upload_then_download() {
        let (cloud, _) = store();
        let item = link();

        let etag = cloud.upload(&item).await.unwrap();

        let downloaded = cloud.download(SyncableItem::id(&item)).await.unwrap();
        assert!(item.matches(&downloaded));
        assert_eq!(downloaded.etag(), Some(etag.as_str()));
        assert!(downloaded.is_synced());
    }

    #[tokio::test]
    async fn test_download_missing_is_not_found() {
        let (cloud, _) = store();
        let err = cloud.download(Uuid::new_v4()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_download_rejects_id_mismatch() {
        let (cloud, storage) = store();
        let item = link();
        let body = item.to_document().unwrap();

        // Stored under a name that does not match the document's id
        let other = Uuid::new_v4();
        storage
            .put("links", &format!("{}.json", other), Bytes::from(body))
            .await
            .unwrap();

        let err = cloud.download(other).await.unwrap_err();
        assert!(matches!(err, SyncError::InvalidDocument(_)));
    }

    #[tokio::test]
    async fn test_download_rejects_garbage() {
        let (cloud, storage) = store();
        let id = Uuid::new_v4();
        storage
            .put("links", &format!("{}.json", id), Bytes::from_static(b"{broken"))
            .await
            .unwrap();

        let err = cloud.download(id).await.unwrap_err();
        assert!(matches!(err, SyncError::InvalidDocument(_)));
    }

    #[tokio::test]
    async fn test_data_source_map_skips_foreign_files() {
        let (cloud, storage) = store();
        let item = link();
        cloud.upload(&item).await.unwrap();
        storage
            .put("links", "readme.txt", Bytes::from_static(b"hello"))
            .await
            .unwrap();

        let map = cloud.data_source_map().await.unwrap();
        assert_eq!(map.len(), 1);
        assert!(map.contains_key(&SyncableItem::id(&item)));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (cloud, _) = store();
        let item = link();
        cloud.upload(&item).await.unwrap();

        cloud.delete(SyncableItem::id(&item)).await.unwrap();
        // Second delete sees remote-not-found and still succeeds
        cloud.delete(SyncableItem::id(&item)).await.unwrap();
    }

    #[tokio::test]
    async fn test_directory_etag_changes_on_mutation() {
        let (cloud, _) = store();
        let before = cloud.data_source_etag().await.unwrap();

        cloud.upload(&link()).await.unwrap();

        let after = cloud.data_source_etag().await.unwrap();
        assert_ne!(before, after);
    }

    #[tokio::test]
    async fn test_data_source_etag_none_when_unreachable() {
        let (cloud, storage) = store();
        storage.set_unreachable(true);

        assert_eq!(cloud.data_source_etag().await, None);
    }

    #[tokio::test]
    async fn test_cloud_changed_tracks_cursor() {
        let (cloud, _) = store();

        assert!(cloud.is_cloud_changed("e1").await.unwrap());

        cloud.update_last_synced_etag("e1").await.unwrap();
        assert!(!cloud.is_cloud_changed("e1").await.unwrap());
        assert!(cloud.is_cloud_changed("e2").await.unwrap());
    }
}
