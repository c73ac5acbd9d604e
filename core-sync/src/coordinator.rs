//! # Sync Coordinator
//!
//! Orchestrates one sync pass across the three collections.
//!
//! ## Workflow
//!
//! 1. Reject the call if a pass is already running (passes are serialized
//!    at this entry point; this also keeps the per-collection "last synced
//!    ETag" cursors single-writer)
//! 2. Run the collections in a fixed order (favorites, then links, then
//!    notes) because notes hold weak references to links
//! 3. Emit collection-scoped start/finish events around each pass
//! 4. A fatal result (`DbAccessError`, `SourceNotReady`) aborts the
//!    remaining collections and surfaces one failure event distinguishing
//!    "database" from "cloud unreachable"
//! 5. On success, derive the overall status from the stores (any conflict ⇒
//!    `Conflict`, else any unsynced ⇒ `Unsynced`, else `Synced`), refresh
//!    the collection caches and emit a completion event

use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use bridge_traits::{FileStorage, SettingsStore};
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use core_store::{Favorite, ItemRepository, Link, Note};

use crate::cache::CacheInvalidator;
use crate::cloud::CloudStore;
use crate::error::{Result, SyncError};
use crate::item::{Collection, SyncableItem};
use crate::sync_item::{SyncItem, SyncItemResult, SyncResultStatus};

/// Sync engine configuration
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Contest remote-side deletions of synced local items (mark them
    /// conflicted) instead of honoring them (delete locally).
    pub protect_local: bool,

    /// Treat an empty remote collection as cloud data loss: reset local
    /// sync state and re-upload everything, instead of deleting all local
    /// items to mirror the authoritative empty state.
    pub upload_to_empty: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            protect_local: true,
            upload_to_empty: true,
        }
    }
}

/// Overall status after a successful pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// Every item in every collection is synced
    Synced,
    /// Some item is unsynced after a clean pass (should not happen)
    Unsynced,
    /// Some item awaits conflict resolution
    Conflict,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Synced => "synced",
            SyncStatus::Unsynced => "unsynced",
            SyncStatus::Conflict => "conflict",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why a pass aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalReason {
    /// The local store failed
    Database,
    /// The remote directory was unreachable
    CloudUnreachable,
}

impl FatalReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FatalReason::Database => "database",
            FatalReason::CloudUnreachable => "cloud_unreachable",
        }
    }
}

/// One collection's contribution to a pass.
#[derive(Debug, Clone)]
pub struct CollectionSummary {
    pub collection: Collection,
    pub result: SyncItemResult,
}

/// Aggregate outcome of one orchestrated pass.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    /// Per-collection results, in execution order
    pub summaries: Vec<CollectionSummary>,
    /// Set when the pass aborted before finishing all collections
    pub fatal: Option<(Collection, FatalReason)>,
    /// Overall status; only present on non-fatal passes
    pub status: Option<SyncStatus>,
}

impl SyncReport {
    pub fn is_fatal(&self) -> bool {
        self.fatal.is_some()
    }

    /// Total per-item failures across all collections.
    pub fn total_failed(&self) -> u32 {
        self.summaries.iter().map(|s| s.result.failed).sum()
    }
}

/// Orchestrates the per-collection engines.
pub struct SyncCoordinator {
    favorites: SyncItem<Favorite>,
    links: SyncItem<Link>,
    notes: SyncItem<Note>,

    favorite_repo: Arc<dyn ItemRepository<Favorite>>,
    link_repo: Arc<dyn ItemRepository<Link>>,
    note_repo: Arc<dyn ItemRepository<Note>>,

    events: EventBus,
    cache: Arc<dyn CacheInvalidator>,

    /// Entry guard: at most one pass at a time
    running: Mutex<()>,
}

impl SyncCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: SyncConfig,
        storage: Arc<dyn FileStorage>,
        settings: Arc<dyn SettingsStore>,
        favorite_repo: Arc<dyn ItemRepository<Favorite>>,
        link_repo: Arc<dyn ItemRepository<Link>>,
        note_repo: Arc<dyn ItemRepository<Note>>,
        events: EventBus,
        cache: Arc<dyn CacheInvalidator>,
    ) -> Self {
        let favorites = SyncItem::new(
            favorite_repo.clone(),
            CloudStore::new(storage.clone(), settings.clone()),
            events.clone(),
            config.protect_local,
            config.upload_to_empty,
        );
        let links = SyncItem::new(
            link_repo.clone(),
            CloudStore::new(storage.clone(), settings.clone()),
            events.clone(),
            config.protect_local,
            config.upload_to_empty,
        );
        let notes = SyncItem::new(
            note_repo.clone(),
            CloudStore::new(storage, settings),
            events.clone(),
            config.protect_local,
            config.upload_to_empty,
        );

        Self {
            favorites,
            links,
            notes,
            favorite_repo,
            link_repo,
            note_repo,
            events,
            cache,
            running: Mutex::new(()),
        }
    }

    /// Run one full pass over favorites, links and notes, in that order.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::SyncInProgress` when another pass is running.
    /// Fatal per-pass outcomes are reported in the returned
    /// [`SyncReport`], not as errors.
    #[instrument(skip(self))]
    pub async fn sync(&self) -> Result<SyncReport> {
        let _guard = self
            .running
            .try_lock()
            .map_err(|_| SyncError::SyncInProgress)?;

        self.events.emit(CoreEvent::Sync(SyncEvent::Started)).ok();
        info!("Sync pass started");

        let mut report = SyncReport::default();

        // Favorites first: other collections may reference links, notes
        // reference links, so favorites -> links -> notes.
        let favorites = self.run_collection(&self.favorites).await;
        if self.record(&mut report, Collection::Favorites, favorites) {
            return Ok(report);
        }

        let links = self.run_collection(&self.links).await;
        if self.record(&mut report, Collection::Links, links) {
            return Ok(report);
        }

        let notes = self.run_collection(&self.notes).await;
        if self.record(&mut report, Collection::Notes, notes) {
            return Ok(report);
        }

        let status = self.overall_status().await?;
        report.status = Some(status);

        for collection in [Collection::Favorites, Collection::Links, Collection::Notes] {
            self.cache.refresh_collection(collection);
        }

        self.events
            .emit(CoreEvent::Sync(SyncEvent::Completed {
                status: status.as_str().to_string(),
                failed_total: report.total_failed(),
            }))
            .ok();

        info!(
            "Sync pass completed: status={}, {} item failures",
            status,
            report.total_failed()
        );
        Ok(report)
    }

    /// Record a collection result; returns true when the pass must abort.
    fn record(
        &self,
        report: &mut SyncReport,
        collection: Collection,
        result: SyncItemResult,
    ) -> bool {
        let fatal = match result.status {
            SyncResultStatus::Ok => None,
            SyncResultStatus::DbAccessError => Some(FatalReason::Database),
            SyncResultStatus::SourceNotReady => Some(FatalReason::CloudUnreachable),
        };

        report.summaries.push(CollectionSummary { collection, result });

        if let Some(reason) = fatal {
            warn!("Aborting sync pass: {} in {}", reason.as_str(), collection);
            report.fatal = Some((collection, reason));
            self.events
                .emit(CoreEvent::Sync(SyncEvent::Failed {
                    reason: reason.as_str().to_string(),
                    collection: collection.as_str().to_string(),
                }))
                .ok();
            return true;
        }

        false
    }

    async fn run_collection<T: SyncableItem>(&self, engine: &SyncItem<T>) -> SyncItemResult {
        self.events
            .emit(CoreEvent::Sync(SyncEvent::CollectionStarted {
                collection: T::COLLECTION.as_str().to_string(),
            }))
            .ok();

        let result = engine.sync().await;

        self.events
            .emit(CoreEvent::Sync(SyncEvent::CollectionFinished {
                collection: T::COLLECTION.as_str().to_string(),
                uploaded: result.uploaded,
                downloaded: result.downloaded,
                deleted: result.deleted,
                failed: result.failed,
            }))
            .ok();

        result
    }

    async fn overall_status(&self) -> Result<SyncStatus> {
        let conflicted = self.favorite_repo.has_conflicted().await?
            || self.link_repo.has_conflicted().await?
            || self.note_repo.has_conflicted().await?;
        if conflicted {
            return Ok(SyncStatus::Conflict);
        }

        let unsynced = self.favorite_repo.has_unsynced().await?
            || self.link_repo.has_unsynced().await?
            || self.note_repo.has_unsynced().await?;
        if unsynced {
            warn!("Unsynced items remain after a clean pass");
            return Ok(SyncStatus::Unsynced);
        }

        Ok(SyncStatus::Synced)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::NoopCacheInvalidator;
    use crate::fakes::{InMemoryFileStorage, MemorySettingsStore};
    use core_store::{
        create_test_pool, SqliteFavoriteRepository, SqliteLinkRepository, SqliteNoteRepository,
        Tag,
    };

    struct Fixture {
        coordinator: SyncCoordinator,
        storage: Arc<InMemoryFileStorage>,
        link_repo: Arc<SqliteLinkRepository>,
        favorite_repo: Arc<SqliteFavoriteRepository>,
        note_repo: Arc<SqliteNoteRepository>,
        events: EventBus,
    }

    async fn fixture() -> Fixture {
        let pool = create_test_pool().await.unwrap();
        let storage = Arc::new(InMemoryFileStorage::new());
        let settings = Arc::new(MemorySettingsStore::new());
        let events = EventBus::new(200);

        let favorite_repo = Arc::new(SqliteFavoriteRepository::new(pool.clone()));
        let link_repo = Arc::new(SqliteLinkRepository::new(pool.clone()));
        let note_repo = Arc::new(SqliteNoteRepository::new(pool.clone()));

        let coordinator = SyncCoordinator::new(
            SyncConfig::default(),
            storage.clone(),
            settings,
            favorite_repo.clone(),
            link_repo.clone(),
            note_repo.clone(),
            events.clone(),
            Arc::new(NoopCacheInvalidator),
        );

        Fixture {
            coordinator,
            storage,
            link_repo,
            favorite_repo,
            note_repo,
            events,
        }
    }

    #[tokio::test]
    async fn test_empty_pass_reports_synced() {
        let f = fixture().await;

        let report = f.coordinator.sync().await.unwrap();

        assert!(!report.is_fatal());
        assert_eq!(report.status, Some(SyncStatus::Synced));
        assert_eq!(report.summaries.len(), 3);
    }

    #[tokio::test]
    async fn test_collections_run_in_fixed_order() {
        let f = fixture().await;
        let mut events = f.events.subscribe();

        f.coordinator.sync().await.unwrap();

        let mut started = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let CoreEvent::Sync(SyncEvent::CollectionStarted { collection }) = event {
                started.push(collection);
            }
        }
        assert_eq!(started, vec!["favorites", "links", "notes"]);
    }

    #[tokio::test]
    async fn test_full_pass_uploads_all_collections() {
        let f = fixture().await;
        f.favorite_repo
            .save(&Favorite::new("Reading list", vec![]))
            .await
            .unwrap();
        f.link_repo
            .save(&Link::new("https://example.org", None, false, vec![Tag::new("t")]))
            .await
            .unwrap();
        f.note_repo
            .save(&Note::new("remember", None, vec![]))
            .await
            .unwrap();

        let report = f.coordinator.sync().await.unwrap();

        assert_eq!(report.status, Some(SyncStatus::Synced));
        assert_eq!(f.storage.file_count("favorites"), 1);
        assert_eq!(f.storage.file_count("links"), 1);
        assert_eq!(f.storage.file_count("notes"), 1);
    }

    #[tokio::test]
    async fn test_unreachable_cloud_short_circuits() {
        let f = fixture().await;
        f.storage.set_unreachable(true);

        let report = f.coordinator.sync().await.unwrap();

        assert_eq!(
            report.fatal,
            Some((Collection::Favorites, FatalReason::CloudUnreachable))
        );
        assert!(report.status.is_none());
        // Favorites aborted; links and notes never ran
        assert_eq!(report.summaries.len(), 1);
    }

    #[tokio::test]
    async fn test_failure_event_distinguishes_reason() {
        let f = fixture().await;
        f.storage.set_unreachable(true);
        let mut events = f.events.subscribe();

        f.coordinator.sync().await.unwrap();

        let mut reasons = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let CoreEvent::Sync(SyncEvent::Failed { reason, collection }) = event {
                reasons.push((reason, collection));
            }
        }
        assert_eq!(
            reasons,
            vec![("cloud_unreachable".to_string(), "favorites".to_string())]
        );
    }

    #[tokio::test]
    async fn test_conflict_status_wins_over_synced() {
        let f = fixture().await;
        let link = Link::new("https://example.org", None, false, vec![]);
        f.link_repo.save(&link).await.unwrap();
        f.coordinator.sync().await.unwrap();

        // A conflict left over from elsewhere keeps the overall status red
        let stored = f.link_repo.get(link.id().as_uuid()).await.unwrap();
        f.link_repo
            .update_sync_state(
                link.id().as_uuid(),
                &stored
                    .state()
                    .transition(core_store::SyncTarget::ConflictedUpdate),
            )
            .await
            .unwrap();

        let report = f.coordinator.sync().await.unwrap();
        assert_eq!(report.status, Some(SyncStatus::Conflict));
    }

    #[tokio::test]
    async fn test_concurrent_pass_is_rejected() {
        let f = fixture().await;
        let guard = f.coordinator.running.try_lock().unwrap();

        let err = f.coordinator.sync().await.unwrap_err();
        assert!(matches!(err, SyncError::SyncInProgress));
        drop(guard);

        assert!(f.coordinator.sync().await.is_ok());
    }
}
