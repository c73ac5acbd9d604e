//! # Per-Collection Reconciliation
//!
//! [`SyncItem`] reconciles all items of one collection against the remote
//! file store in a single sequential pass.
//!
//! ## Pass structure
//!
//! 1. Fetch the remote directory's composite ETag. Unreachable ⇒ the pass
//!    reports `SourceNotReady` and nothing else happens.
//! 2. Compare against the last persisted tag to decide whether the cloud
//!    changed since the previous successful pass.
//! 3. Cloud unchanged: resolve only locally-unsynced items, each against its
//!    own (unchanged) remote tag. This fast path avoids a full listing.
//! 4. Cloud changed: fetch the full id → ETag map, optionally reset all
//!    local sync state when the remote collection was wiped (upload-to-empty
//!    policy), resolve every local item against its map entry, then download
//!    remote items unknown locally.
//! 5. On success, persist the composite tag as the new cursor.
//!
//! Per-item failures (upload, download, delete, duplicate save) increment a
//! counter and the pass continues; only local-store read failures and the
//! directory-level remote reads abort the pass.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use core_runtime::events::{CoreEvent, EventBus, ItemAction, ItemEvent};
use core_store::{ItemRepository, SyncState, SyncTarget};

use crate::cloud::CloudStore;
use crate::item::SyncableItem;

/// Terminal status of one collection's pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncResultStatus {
    /// Pass ran to completion (per-item failures may still be counted)
    #[default]
    Ok,
    /// Remote directory unreachable; nothing was attempted
    SourceNotReady,
    /// Local store read failed; the pass aborted
    DbAccessError,
}

/// Outcome of one collection's pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncItemResult {
    pub status: SyncResultStatus,
    /// Items pushed to the cloud
    pub uploaded: u32,
    /// Items pulled from the cloud
    pub downloaded: u32,
    /// Items removed locally (and remotely where applicable)
    pub deleted: u32,
    /// Per-item recoverable failures
    pub failed: u32,
}

impl SyncItemResult {
    /// Whether this result aborts the remaining orchestration.
    pub fn is_fatal(&self) -> bool {
        !matches!(self.status, SyncResultStatus::Ok)
    }
}

/// Reconciliation engine for one collection.
pub struct SyncItem<T: SyncableItem> {
    local: Arc<dyn ItemRepository<T>>,
    cloud: CloudStore<T>,
    events: EventBus,
    /// Contest remote-side deletions of synced items instead of honoring them
    protect_local: bool,
    /// Treat an empty remote collection as data loss and re-upload
    upload_to_empty: bool,
}

impl<T: SyncableItem> SyncItem<T> {
    pub fn new(
        local: Arc<dyn ItemRepository<T>>,
        cloud: CloudStore<T>,
        events: EventBus,
        protect_local: bool,
        upload_to_empty: bool,
    ) -> Self {
        Self {
            local,
            cloud,
            events,
            protect_local,
            upload_to_empty,
        }
    }

    /// Run one reconciliation pass over the whole collection.
    #[instrument(skip(self), fields(collection = %T::COLLECTION))]
    pub async fn sync(&self) -> SyncItemResult {
        let mut result = SyncItemResult::default();

        let Some(dir_etag) = self.cloud.data_source_etag().await else {
            warn!("{} source not ready", T::COLLECTION);
            result.status = SyncResultStatus::SourceNotReady;
            return result;
        };

        let cloud_changed = match self.cloud.is_cloud_changed(&dir_etag).await {
            Ok(changed) => changed,
            Err(e) => {
                // Without the cursor we cannot trust the fast path
                warn!("Last-synced tag unavailable, assuming changed: {}", e);
                true
            }
        };

        if !cloud_changed {
            debug!("{} cloud unchanged, fast path", T::COLLECTION);
            let unsynced = match self.local.get_unsynced().await {
                Ok(items) => items,
                Err(e) => {
                    warn!("Local read failed: {}", e);
                    result.status = SyncResultStatus::DbAccessError;
                    return result;
                }
            };

            for item in unsynced {
                let own_etag = item.etag().map(str::to_owned);
                self.sync_one(item, own_etag, &mut result).await;
            }

            info!(
                "{} fast path done: {} uploaded, {} deleted, {} failed",
                T::COLLECTION,
                result.uploaded,
                result.deleted,
                result.failed
            );
            return result;
        }

        let cloud_map = match self.cloud.data_source_map().await {
            Ok(map) => map,
            Err(e) => {
                warn!("Remote listing failed: {}", e);
                result.status = SyncResultStatus::SourceNotReady;
                return result;
            }
        };

        if cloud_map.is_empty() && self.upload_to_empty {
            // An emptied remote collection is treated as catastrophic cloud
            // data loss: clear tags and synced flags so every local item
            // takes the upload branch below, instead of deleting local data.
            info!("{} remote collection empty, re-uploading all", T::COLLECTION);
            if let Err(e) = self.local.reset_sync_states().await {
                warn!("Sync state reset failed: {}", e);
                result.status = SyncResultStatus::DbAccessError;
                return result;
            }
        }

        let items = match self.local.get_all().await {
            Ok(items) => items,
            Err(e) => {
                warn!("Local read failed: {}", e);
                result.status = SyncResultStatus::DbAccessError;
                return result;
            }
        };

        let mut local_ids: HashSet<Uuid> = HashSet::with_capacity(items.len());
        for item in items {
            let id = item.id();
            local_ids.insert(id);
            self.sync_one(item, cloud_map.get(&id).cloned(), &mut result).await;
        }

        // Remote items unknown locally are new from the cloud
        for (&id, _) in cloud_map.iter().filter(|(id, _)| !local_ids.contains(*id)) {
            match self.cloud.download(id).await {
                Ok(item) => {
                    self.save_downloaded(item, ItemAction::Created, &mut result).await;
                }
                Err(e) => {
                    warn!("Download of new item {} failed: {}", id, e);
                    result.failed += 1;
                }
            }
        }

        if let Err(e) = self.cloud.update_last_synced_etag(&dir_etag).await {
            warn!("Persisting last-synced tag failed: {}", e);
        }

        info!(
            "{} pass done: {} uploaded, {} downloaded, {} deleted, {} failed",
            T::COLLECTION,
            result.uploaded,
            result.downloaded,
            result.deleted,
            result.failed
        );
        result
    }

    /// Resolve one item against the cloud's version tag for its id.
    ///
    /// `cloud_etag == None` means the id is absent remotely (deleted on the
    /// remote side, or never uploaded).
    async fn sync_one(&self, item: T, cloud_etag: Option<String>, result: &mut SyncItemResult) {
        let id = item.id();

        let Some(local_etag) = item.etag().map(str::to_owned) else {
            if item.is_deleted() {
                // Never uploaded; nothing to reconcile remotely
                self.delete_local(id, result).await;
            } else {
                self.upload(&item, result).await;
            }
            return;
        };

        match cloud_etag {
            Some(ref cloud_etag) if *cloud_etag == local_etag => {
                if item.is_synced() {
                    // Local and cloud agree
                } else if item.is_deleted() {
                    self.delete_remote_then_local(&item, result).await;
                } else if !item.is_conflicted() {
                    // Re-push the local edit
                    self.upload(&item, result).await;
                }
                // Conflicted items (duplicates included) await resolution
            }
            None => {
                if item.is_synced() {
                    if self.protect_local {
                        self.mark_conflicted(&item, SyncTarget::ConflictedUpdate, result).await;
                    } else {
                        self.delete_local(id, result).await;
                    }
                } else if item.is_deleted() {
                    // Both sides dropped it
                    self.delete_local(id, result).await;
                } else {
                    self.mark_conflicted(&item, SyncTarget::ConflictedUpdate, result).await;
                }
            }
            Some(cloud_etag) => {
                // Tags differ: the cloud copy moved on
                let downloaded = match self.cloud.download(id).await {
                    Ok(downloaded) => downloaded,
                    Err(e) => {
                        warn!("Download of changed item {} failed: {}", id, e);
                        result.failed += 1;
                        return;
                    }
                };

                if item.is_synced() && !item.is_deleted() {
                    // No local edit; the remote edit wins
                    self.save_downloaded(downloaded, ItemAction::Updated, result).await;
                } else if item.matches(&downloaded) {
                    if item.is_deleted() {
                        self.delete_remote_then_local(&item, result).await;
                    } else {
                        // Same content under a new tag; adopt the tag
                        let state = SyncState::with_etag(cloud_etag, SyncTarget::Synced);
                        match self.local.update_sync_state(id, &state).await {
                            Ok(_) => self.notify(ItemAction::Updated, id),
                            Err(e) => {
                                warn!("State update for {} failed: {}", id, e);
                                result.failed += 1;
                            }
                        }
                    }
                } else {
                    let target = if item.is_deleted() {
                        SyncTarget::ConflictedDelete
                    } else {
                        SyncTarget::ConflictedUpdate
                    };
                    self.mark_conflicted(&item, target, result).await;
                }
            }
        }
    }

    async fn upload(&self, item: &T, result: &mut SyncItemResult) {
        let id = item.id();
        match self.cloud.upload(item).await {
            Ok(etag) => {
                let state = SyncState::with_etag(etag, SyncTarget::Synced);
                match self.local.update_sync_state(id, &state).await {
                    Ok(_) => {
                        result.uploaded += 1;
                        self.notify(ItemAction::Uploaded, id);
                        self.notify(ItemAction::Updated, id);
                    }
                    Err(e) => {
                        warn!("State update after upload of {} failed: {}", id, e);
                        result.failed += 1;
                    }
                }
            }
            Err(e) => {
                warn!("Upload of {} failed: {}", id, e);
                result.failed += 1;
            }
        }
    }

    /// Persist a downloaded item, falling back to a duplicate slot when its
    /// natural key is already taken.
    async fn save_downloaded(&self, item: T, action: ItemAction, result: &mut SyncItemResult) {
        let id = item.id();
        let saved = match self.local.save(&item).await {
            Ok(_) => true,
            Err(e) if e.is_conflict() => match self.local.save_duplicated(&item).await {
                Ok(_) => true,
                Err(e) => {
                    warn!("Duplicate save of {} failed: {}", id, e);
                    false
                }
            },
            Err(e) => {
                warn!("Save of {} failed: {}", id, e);
                false
            }
        };

        if saved {
            result.downloaded += 1;
            self.notify(ItemAction::Downloaded, id);
            self.notify(action, id);
        } else {
            result.failed += 1;
        }
    }

    async fn delete_local(&self, id: Uuid, result: &mut SyncItemResult) {
        match self.local.delete(id).await {
            Ok(_) => {
                result.deleted += 1;
                self.notify(ItemAction::Deleted, id);
            }
            Err(e) => {
                warn!("Local delete of {} failed: {}", id, e);
                result.failed += 1;
            }
        }
    }

    /// Confirm a soft delete: remove the cloud file first, the local row
    /// only after. On remote failure the row stays soft-deleted for the
    /// next pass.
    async fn delete_remote_then_local(&self, item: &T, result: &mut SyncItemResult) {
        let id = item.id();
        match self.cloud.delete(id).await {
            Ok(()) => self.delete_local(id, result).await,
            Err(e) => {
                warn!("Remote delete of {} failed: {}", id, e);
                result.failed += 1;
            }
        }
    }

    async fn mark_conflicted(&self, item: &T, target: SyncTarget, result: &mut SyncItemResult) {
        let id = item.id();
        let next = item.state().transition(target);
        if *item.state() == next {
            // Already flagged; repeating would spam notifications
            return;
        }

        match self.local.update_sync_state(id, &next).await {
            Ok(_) => {
                debug!("{} {} marked conflicted", T::COLLECTION, id);
                self.notify(ItemAction::Updated, id);
            }
            Err(e) => {
                warn!("Conflict marking of {} failed: {}", id, e);
                result.failed += 1;
            }
        }
    }

    fn notify(&self, action: ItemAction, id: Uuid) {
        self.events
            .emit(CoreEvent::Item(ItemEvent {
                collection: T::COLLECTION.as_str().to_string(),
                item_id: id.to_string(),
                action,
            }))
            .ok();
    }
}

// ============================================================================
// Tests
// ============================================================================
