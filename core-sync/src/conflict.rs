//! # Conflict Resolution Workflow
//!
//! Post-sync resolution of a single flagged item, driven from an
//! interactive context.
//!
//! ## State machine
//!
//! ```text
//! LoadingLocal → LoadingCloud → AutoResolving → AwaitingUserChoice
//!                                     ↓               ↓
//!                                    Done ←──── Applying
//!                                     ↑
//!                                 Cancelled (any point)
//! ```
//!
//! The local and cloud copies load independently: a failure on one side is
//! reported on that side only and never hides the other copy. Duplicate
//! resolution recurses exactly one level (duplicate → primary lookup); the
//! data model guarantees a primary is never itself a duplicate.
//!
//! The interactive surface may be dismissed while an operation is still
//! finishing; a cancelled workflow turns every later call into a detectable
//! no-op instead of mutating state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use core_runtime::events::{CoreEvent, EventBus, ItemAction, ItemEvent};
use core_store::{ItemRepository, SyncState, SyncTarget};

use crate::cache::CacheInvalidator;
use crate::cloud::CloudStore;
use crate::error::{Result, SyncError};
use crate::item::SyncableItem;

/// Workflow position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionState {
    LoadingLocal,
    LoadingCloud,
    AutoResolving,
    AwaitingUserChoice,
    Applying,
    Done,
    Cancelled,
}

/// User-triggerable resolution actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionAction {
    /// Discard the local copy. For a duplicate: delete the primary
    /// remotely and locally, then promote the duplicate (a replace).
    DeleteLocal,
    /// Remove the remote copy; the local copy becomes a new unsynced
    /// original.
    DeleteCloud,
    /// Force-push the local content, overwriting the cloud copy.
    UploadLocal,
    /// Force-pull the cloud content, overwriting the local copy.
    DownloadCloud,
}

/// What an `apply` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionOutcome {
    Applied,
    /// The workflow was cancelled; nothing was changed.
    Cancelled,
}

/// Both sides of the conflict, loaded independently.
#[derive(Debug, Clone)]
pub struct ConflictSnapshot<T> {
    pub local: Option<T>,
    pub local_error: Option<String>,
    pub cloud: Option<T>,
    pub cloud_error: Option<String>,
    /// The conflict resolved itself (orphaned duplicate promotion).
    pub auto_resolved: bool,
}

impl<T> Default for ConflictSnapshot<T> {
    fn default() -> Self {
        Self {
            local: None,
            local_error: None,
            cloud: None,
            cloud_error: None,
            auto_resolved: false,
        }
    }
}

/// Cancellation handle for a running workflow.
#[derive(Clone)]
pub struct ResolutionHandle {
    active: Arc<AtomicBool>,
}

impl ResolutionHandle {
    /// Mark the interactive surface as dismissed.
    pub fn cancel(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

/// Single-item conflict resolution workflow.
pub struct ConflictResolution<T: SyncableItem> {
    local: Arc<dyn ItemRepository<T>>,
    cloud: CloudStore<T>,
    events: EventBus,
    cache: Arc<dyn CacheInvalidator>,
    id: Uuid,
    state: ResolutionState,
    active: Arc<AtomicBool>,
}

impl<T: SyncableItem> ConflictResolution<T> {
    pub fn new(
        local: Arc<dyn ItemRepository<T>>,
        cloud: CloudStore<T>,
        events: EventBus,
        cache: Arc<dyn CacheInvalidator>,
        id: Uuid,
    ) -> Self {
        Self {
            local,
            cloud,
            events,
            cache,
            id,
            state: ResolutionState::LoadingLocal,
            active: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn state(&self) -> ResolutionState {
        self.state
    }

    pub fn handle(&self) -> ResolutionHandle {
        ResolutionHandle {
            active: self.active.clone(),
        }
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Load both copies and attempt auto-resolution.
    #[instrument(skip(self), fields(collection = %T::COLLECTION, id = %self.id))]
    pub async fn load(&mut self) -> ConflictSnapshot<T> {
        let mut snapshot = ConflictSnapshot::default();

        self.state = ResolutionState::LoadingLocal;
        match self.local.get(self.id).await {
            Ok(item) => snapshot.local = Some(item),
            Err(e) if e.is_not_found() => {}
            Err(e) => {
                warn!("Local copy failed to load: {}", e);
                snapshot.local_error = Some(e.to_string());
            }
        }

        if !self.is_active() {
            self.state = ResolutionState::Cancelled;
            return snapshot;
        }

        self.state = ResolutionState::LoadingCloud;
        match self.cloud.download(self.id).await {
            Ok(item) => snapshot.cloud = Some(item),
            Err(e) if e.is_not_found() => {}
            Err(e) => {
                warn!("Cloud copy failed to load: {}", e);
                snapshot.cloud_error = Some(e.to_string());
            }
        }

        if !self.is_active() {
            self.state = ResolutionState::Cancelled;
            return snapshot;
        }

        self.state = ResolutionState::AutoResolving;
        if let Some(item) = snapshot.local.clone() {
            if item.is_duplicated() {
                match self.local.get_main(item.duplicated_key()).await {
                    Err(e) if e.is_not_found() => {
                        // The user's primary copy is gone; the duplicate
                        // takes its place without interaction.
                        info!("Promoting orphaned duplicate {}", self.id);
                        match self.promote(&item).await {
                            Ok(()) => {
                                snapshot.auto_resolved = true;
                                self.state = ResolutionState::Done;
                                return snapshot;
                            }
                            Err(e) => warn!("Auto promotion failed: {}", e),
                        }
                    }
                    Err(e) => warn!("Primary lookup failed: {}", e),
                    Ok(_) => {}
                }
            }
        }

        self.state = ResolutionState::AwaitingUserChoice;
        snapshot
    }

    /// Apply one resolution action.
    ///
    /// A cancelled workflow returns `ResolutionOutcome::Cancelled` without
    /// touching any state.
    #[instrument(skip(self), fields(collection = %T::COLLECTION, id = %self.id))]
    pub async fn apply(&mut self, action: ResolutionAction) -> Result<ResolutionOutcome> {
        if !self.is_active() {
            debug!("Ignoring {:?} on cancelled workflow", action);
            self.state = ResolutionState::Cancelled;
            return Ok(ResolutionOutcome::Cancelled);
        }

        self.state = ResolutionState::Applying;

        match action {
            ResolutionAction::DeleteLocal => self.delete_local().await?,
            ResolutionAction::DeleteCloud => self.delete_cloud().await?,
            ResolutionAction::UploadLocal => self.upload_local().await?,
            ResolutionAction::DownloadCloud => self.download_cloud().await?,
        }

        self.cache.refresh_collection(T::COLLECTION);
        self.state = ResolutionState::Done;
        Ok(ResolutionOutcome::Applied)
    }

    async fn delete_local(&self) -> Result<()> {
        let item = self.local.get(self.id).await?;

        if item.is_duplicated() {
            // Replace: the primary goes away, the duplicate takes its slot
            match self.local.get_main(item.duplicated_key()).await {
                Ok(main) => {
                    let main_id = main.id();
                    self.cloud.delete(main_id).await?;
                    self.local.delete(main_id).await?;
                    self.cache.remove_item(T::COLLECTION, main_id);
                    self.notify(ItemAction::Deleted, main_id);
                }
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e.into()),
            }

            self.promote(&item).await?;
        } else {
            self.cloud.delete(self.id).await?;
            self.local.delete(self.id).await?;
            self.cache.remove_item(T::COLLECTION, self.id);
            self.notify(ItemAction::Deleted, self.id);
        }

        Ok(())
    }

    async fn delete_cloud(&self) -> Result<()> {
        self.cloud.delete(self.id).await?;

        // The local copy survives as a brand-new original
        self.local.update_sync_state(self.id, &SyncState::new()).await?;
        self.notify(ItemAction::Updated, self.id);
        Ok(())
    }

    async fn upload_local(&self) -> Result<()> {
        let item = self.local.get(self.id).await?;
        let etag = self.cloud.upload(&item).await?;

        self.local
            .update_sync_state(self.id, &SyncState::with_etag(etag, SyncTarget::Synced))
            .await?;
        self.notify(ItemAction::Uploaded, self.id);
        self.notify(ItemAction::Updated, self.id);
        Ok(())
    }

    async fn download_cloud(&self) -> Result<()> {
        let item = self.cloud.download(self.id).await?;

        match self.local.save(&item).await {
            Ok(_) => {}
            Err(e) if e.is_conflict() => {
                self.local.save_duplicated(&item).await?;
            }
            Err(e) => return Err(e.into()),
        }

        self.notify(ItemAction::Downloaded, self.id);
        self.notify(ItemAction::Updated, self.id);
        Ok(())
    }

    /// Promote a duplicate to the primary, synced slot.
    async fn promote(&self, item: &T) -> Result<()> {
        let state = match item.etag() {
            Some(etag) => SyncState::with_etag(etag, SyncTarget::Synced),
            None => SyncState::new(),
        };

        self.local.update_sync_state(item.id(), &state).await?;
        self.notify(ItemAction::Updated, item.id());
        Ok(())
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
