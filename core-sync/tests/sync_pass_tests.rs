//! End-to-end sync pass tests: real SQLite repositories against an
//! in-memory cloud file store.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::{FileStorage, RemoteEntry, SettingsStore};
use core_runtime::events::{CoreEvent, EventBus, ItemAction};
use core_store::{
    create_test_pool, Favorite, ItemRepository, Link, Note, SqliteFavoriteRepository,
    SqliteLinkRepository, SqliteNoteRepository, SyncTarget, Tag,
};
use core_sync::{
    Collection, FatalReason, NoopCacheInvalidator, SyncableItem, SyncConfig, SyncCoordinator,
    SyncStatus,
};

// ============================================================================
// Test doubles
// ============================================================================

struct TestStorage {
    dirs: Mutex<HashMap<String, HashMap<String, (Bytes, String)>>>,
    revision: AtomicU64,
    unreachable: AtomicBool,
}

impl TestStorage {
    fn new() -> Self {
        Self {
            dirs: Mutex::new(HashMap::new()),
            revision: AtomicU64::new(0),
            unreachable: AtomicBool::new(false),
        }
    }

    fn set_unreachable(&self, value: bool) {
        self.unreachable.store(value, Ordering::SeqCst);
    }

    fn remove_file(&self, dir: &str, name: &str) {
        let mut dirs = self.dirs.lock().unwrap();
        if let Some(files) = dirs.get_mut(dir) {
            files.remove(name);
        }
        self.revision.fetch_add(1, Ordering::SeqCst);
    }

    fn file_count(&self, dir: &str) -> usize {
        self.dirs
            .lock()
            .unwrap()
            .get(dir)
            .map(|files| files.len())
            .unwrap_or(0)
    }

    fn has_file(&self, dir: &str, name: &str) -> bool {
        self.dirs
            .lock()
            .unwrap()
            .get(dir)
            .map(|files| files.contains_key(name))
            .unwrap_or(false)
    }

    fn check_reachable(&self) -> BridgeResult<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(BridgeError::Network("storage unreachable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl FileStorage for TestStorage {
    async fn directory_etag(&self, dir: &str) -> BridgeResult<String> {
        self.check_reachable()?;
        self.dirs.lock().unwrap().entry(dir.to_string()).or_default();
        Ok(format!("dir-{}-{}", dir, self.revision.load(Ordering::SeqCst)))
    }

    async fn list(&self, dir: &str) -> BridgeResult<Vec<RemoteEntry>> {
        self.check_reachable()?;
        Ok(self
            .dirs
            .lock()
            .unwrap()
            .get(dir)
            .map(|files| {
                files
                    .iter()
                    .map(|(name, (_, etag))| RemoteEntry {
                        name: name.clone(),
                        etag: etag.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get(&self, dir: &str, name: &str) -> BridgeResult<(Bytes, String)> {
        self.check_reachable()?;
        self.dirs
            .lock()
            .unwrap()
            .get(dir)
            .and_then(|files| files.get(name))
            .cloned()
            .ok_or_else(|| BridgeError::NotFound(format!("{}/{}", dir, name)))
    }

    async fn put(&self, dir: &str, name: &str, body: Bytes) -> BridgeResult<String> {
        self.check_reachable()?;
        let etag = format!("e{}", self.revision.fetch_add(1, Ordering::SeqCst) + 1);
        self.dirs
            .lock()
            .unwrap()
            .entry(dir.to_string())
            .or_default()
            .insert(name.to_string(), (body, etag.clone()));
        Ok(etag)
    }

    async fn delete(&self, dir: &str, name: &str) -> BridgeResult<()> {
        self.check_reachable()?;
        let removed = self
            .dirs
            .lock()
            .unwrap()
            .get_mut(dir)
            .and_then(|files| files.remove(name))
            .is_some();

        if !removed {
            return Err(BridgeError::NotFound(format!("{}/{}", dir, name)));
        }
        self.revision.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct TestSettings {
    values: Mutex<HashMap<String, String>>,
}

impl TestSettings {
    fn new() -> Self {
        Self {
            values: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl SettingsStore for TestSettings {
    async fn set_string(&self, key: &str, value: &str) -> BridgeResult<()> {
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get_string(&self, key: &str) -> BridgeResult<Option<String>> {
        Ok(self.values.lock().unwrap().get(key).cloned())
    }

    async fn set_bool(&self, key: &str, value: bool) -> BridgeResult<()> {
        self.set_string(key, if value { "true" } else { "false" }).await
    }

    async fn get_bool(&self, key: &str) -> BridgeResult<Option<bool>> {
        Ok(self.get_string(key).await?.map(|v| v == "true"))
    }

    async fn delete(&self, key: &str) -> BridgeResult<()> {
        self.values.lock().unwrap().remove(key);
        Ok(())
    }

    async fn has_key(&self, key: &str) -> BridgeResult<bool> {
        Ok(self.values.lock().unwrap().contains_key(key))
    }
}

// ============================================================================
// Fixture
// ============================================================================

struct Fixture {
    coordinator: SyncCoordinator,
    storage: Arc<TestStorage>,
    favorite_repo: Arc<SqliteFavoriteRepository>,
    link_repo: Arc<SqliteLinkRepository>,
    note_repo: Arc<SqliteNoteRepository>,
    events: EventBus,
}

async fn fixture_with(config: SyncConfig) -> Fixture {
    let pool = create_test_pool().await.unwrap();
    let storage = Arc::new(TestStorage::new());
    let settings = Arc::new(TestSettings::new());
    let events = EventBus::new(500);

    let favorite_repo = Arc::new(SqliteFavoriteRepository::new(pool.clone()));
    let link_repo = Arc::new(SqliteLinkRepository::new(pool.clone()));
    let note_repo = Arc::new(SqliteNoteRepository::new(pool.clone()));

    let coordinator = SyncCoordinator::new(
        config,
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
        favorite_repo,
        link_repo,
        note_repo,
        events,
    }
}

async fn fixture() -> Fixture {
    fixture_with(SyncConfig::default()).await
}

fn file_name(id: Uuid) -> String {
    format!("{}.json", id)
}

/// Upload an item document directly into the fake cloud, bypassing the
/// engine (simulates another device writing to the store).
async fn seed_cloud<T: SyncableItem>(storage: &TestStorage, item: &T) -> String {
    storage
        .put(
            T::COLLECTION.as_str(),
            &file_name(item.id()),
            Bytes::from(item.to_document().unwrap()),
        )
        .await
        .unwrap()
}

fn drain_item_events(events: &mut core_runtime::events::Receiver<CoreEvent>) -> Vec<(String, String, ItemAction)> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let CoreEvent::Item(e) = event {
            drained.push((e.collection, e.item_id, e.action));
        }
    }
    drained
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn scenario_a_new_local_item_is_uploaded() {
    let f = fixture().await;
    let link = Link::new("https://example.org/a", Some("A".to_string()), false, vec![]);
    f.link_repo.save(&link).await.unwrap();

    let report = f.coordinator.sync().await.unwrap();

    assert!(!report.is_fatal());
    assert!(f.storage.has_file("links", &file_name(SyncableItem::id(&link))));

    let stored = f.link_repo.get(SyncableItem::id(&link)).await.unwrap();
    assert!(stored.state().etag().is_some());
    assert!(stored.state().is_synced());
}

#[tokio::test]
async fn scenario_b_protected_remote_deletion_marks_conflict() {
    let f = fixture().await;
    let link = Link::new("https://example.org/a", None, false, vec![]);
    let keeper = Link::new("https://example.org/b", None, false, vec![]);
    f.link_repo.save(&link).await.unwrap();
    f.link_repo.save(&keeper).await.unwrap();
    f.coordinator.sync().await.unwrap();

    // The remote side drops one file (collection stays non-empty)
    f.storage.remove_file("links", &file_name(SyncableItem::id(&link)));

    let report = f.coordinator.sync().await.unwrap();

    assert_eq!(report.status, Some(SyncStatus::Conflict));
    let stored = f.link_repo.get(SyncableItem::id(&link)).await.unwrap();
    assert!(stored.state().is_conflicted());
    assert!(!stored.state().is_deleted());
}

#[tokio::test]
async fn scenario_c_unreachable_source_aborts_without_mutation() {
    let f = fixture().await;
    let favorite = Favorite::new("Reading list", vec![]);
    f.favorite_repo.save(&favorite).await.unwrap();
    f.storage.set_unreachable(true);

    let report = f.coordinator.sync().await.unwrap();

    assert_eq!(
        report.fatal,
        Some((Collection::Favorites, FatalReason::CloudUnreachable))
    );
    // Only the aborted collection appears; links and notes never ran
    assert_eq!(report.summaries.len(), 1);

    let stored = f.favorite_repo.get(SyncableItem::id(&favorite)).await.unwrap();
    assert!(!stored.state().is_synced());
    assert_eq!(stored.state().etag(), None);
}

#[tokio::test]
async fn scenario_d_new_cloud_item_downloads_with_notifications() {
    let f = fixture().await;
    let remote = Link::new("https://example.org/foo", Some("Foo".to_string()), false, vec![]);
    seed_cloud(&*f.storage, &remote).await;

    let mut events = f.events.subscribe();
    f.coordinator.sync().await.unwrap();

    let stored = f.link_repo.get(SyncableItem::id(&remote)).await.unwrap();
    assert!(stored.state().is_synced());
    assert!(stored.state().etag().is_some());
    assert!(remote.matches(&stored));

    let id = SyncableItem::id(&remote).to_string();
    let item_events = drain_item_events(&mut events);
    let for_item: Vec<_> = item_events
        .iter()
        .filter(|(_, item_id, _)| *item_id == id)
        .map(|(_, _, action)| *action)
        .collect();
    assert_eq!(for_item, vec![ItemAction::Downloaded, ItemAction::Created]);
}

#[tokio::test]
async fn scenario_e_natural_key_collision_creates_duplicate_slot() {
    let f = fixture().await;
    // Slot 0 is taken locally and synced
    let local = Link::new("https://example.org/same", None, false, vec![]);
    f.link_repo.save(&local).await.unwrap();
    f.coordinator.sync().await.unwrap();

    // A different item with the same URL arrives from the cloud
    let remote = Link::new("https://example.org/same", None, false, vec![]);
    seed_cloud(&*f.storage, &remote).await;

    f.coordinator.sync().await.unwrap();

    let dup = f.link_repo.get(SyncableItem::id(&remote)).await.unwrap();
    assert_eq!(dup.state().duplicated_slot(), 1);
    assert!(dup.state().is_conflicted());
    assert!(dup.state().is_synced());

    let main = f.link_repo.get_main("https://example.org/same").await.unwrap();
    assert_eq!(main.id(), local.id());
}

// ============================================================================
// Cross-collection behavior
// ============================================================================

#[tokio::test]
async fn full_pass_syncs_all_three_collections() {
    let f = fixture().await;
    let favorite = Favorite::new("Reading list", vec![Tag::new("daily")]);
    let link = Link::new("https://example.org", Some("Example".to_string()), false, vec![]);
    let note = Note::new("about the example", Some(link.id()), vec![]);

    f.favorite_repo.save(&favorite).await.unwrap();
    f.link_repo.save(&link).await.unwrap();
    f.note_repo.save(&note).await.unwrap();

    let report = f.coordinator.sync().await.unwrap();

    assert_eq!(report.status, Some(SyncStatus::Synced));
    assert_eq!(f.storage.file_count("favorites"), 1);
    assert_eq!(f.storage.file_count("links"), 1);
    assert_eq!(f.storage.file_count("notes"), 1);

    // The note kept its weak link reference through the round trip
    f.storage.remove_file("notes", &file_name(SyncableItem::id(&note)));
    seed_cloud(&*f.storage, &f.note_repo.get(SyncableItem::id(&note)).await.unwrap());
    f.note_repo.delete(SyncableItem::id(&note)).await.unwrap();
    f.coordinator.sync().await.unwrap();

    let downloaded = f.note_repo.get(SyncableItem::id(&note)).await.unwrap();
    assert_eq!(downloaded.link_id(), Some(link.id()));
}

#[tokio::test]
async fn second_pass_with_no_changes_is_silent() {
    let f = fixture().await;
    f.favorite_repo
        .save(&Favorite::new("Reading list", vec![]))
        .await
        .unwrap();
    f.link_repo
        .save(&Link::new("https://example.org", None, false, vec![]))
        .await
        .unwrap();

    f.coordinator.sync().await.unwrap();
    // Settle the cursors after the first pass's own uploads
    f.coordinator.sync().await.unwrap();

    let mut events = f.events.subscribe();
    let report = f.coordinator.sync().await.unwrap();

    assert_eq!(report.status, Some(SyncStatus::Synced));
    assert_eq!(report.total_failed(), 0);
    for summary in &report.summaries {
        assert_eq!(summary.result.uploaded, 0);
        assert_eq!(summary.result.downloaded, 0);
        assert_eq!(summary.result.deleted, 0);
    }
    assert!(drain_item_events(&mut events).is_empty());
}

#[tokio::test]
async fn soft_delete_propagates_to_cloud() {
    let f = fixture().await;
    let link = Link::new("https://example.org/a", None, false, vec![]);
    let keeper = Link::new("https://example.org/b", None, false, vec![]);
    f.link_repo.save(&link).await.unwrap();
    f.link_repo.save(&keeper).await.unwrap();
    f.coordinator.sync().await.unwrap();

    let stored = f.link_repo.get(SyncableItem::id(&link)).await.unwrap();
    f.link_repo
        .update_sync_state(
            SyncableItem::id(&link),
            &stored.state().transition(SyncTarget::Deleted),
        )
        .await
        .unwrap();

    f.coordinator.sync().await.unwrap();

    assert!(!f.storage.has_file("links", &file_name(SyncableItem::id(&link))));
    assert!(f
        .link_repo
        .get(SyncableItem::id(&link))
        .await
        .unwrap_err()
        .is_not_found());
    // The keeper survived on both sides
    assert!(f.storage.has_file("links", &file_name(SyncableItem::id(&keeper))));
}

#[tokio::test]
async fn wiped_cloud_triggers_reupload_instead_of_local_loss() {
    let f = fixture().await;
    let a = Link::new("https://example.org/a", None, false, vec![]);
    let b = Link::new("https://example.org/b", None, false, vec![]);
    f.link_repo.save(&a).await.unwrap();
    f.link_repo.save(&b).await.unwrap();
    f.coordinator.sync().await.unwrap();

    f.storage.remove_file("links", &file_name(SyncableItem::id(&a)));
    f.storage.remove_file("links", &file_name(SyncableItem::id(&b)));

    let report = f.coordinator.sync().await.unwrap();

    assert_eq!(report.status, Some(SyncStatus::Synced));
    assert_eq!(f.storage.file_count("links"), 2);
    assert_eq!(f.link_repo.get_ids().await.unwrap().len(), 2);
}

#[tokio::test]
async fn honored_remote_deletion_without_protect_local() {
    let f = fixture_with(SyncConfig {
        protect_local: false,
        upload_to_empty: true,
    })
    .await;
    let a = Link::new("https://example.org/a", None, false, vec![]);
    let keeper = Link::new("https://example.org/b", None, false, vec![]);
    f.link_repo.save(&a).await.unwrap();
    f.link_repo.save(&keeper).await.unwrap();
    f.coordinator.sync().await.unwrap();

    f.storage.remove_file("links", &file_name(SyncableItem::id(&a)));

    let report = f.coordinator.sync().await.unwrap();

    assert_eq!(report.status, Some(SyncStatus::Synced));
    assert!(f
        .link_repo
        .get(SyncableItem::id(&a))
        .await
        .unwrap_err()
        .is_not_found());
    assert!(f.link_repo.get(SyncableItem::id(&keeper)).await.is_ok());
}

#[tokio::test]
async fn corrupt_cloud_document_is_counted_not_fatal() {
    let f = fixture().await;
    // A document with an unknown envelope version
    let bad_id = Uuid::new_v4();
    f.storage
        .put(
            "links",
            &file_name(bad_id),
            Bytes::from(format!(
                "{{\"version\": 9, \"link\": {{\"id\": \"{}\", \"created\": 0, \"updated\": 0, \"url\": \"https://example.org\"}}}}",
                bad_id
            )),
        )
        .await
        .unwrap();
    let good = Link::new("https://example.org/good", None, false, vec![]);
    seed_cloud(&*f.storage, &good).await;

    let report = f.coordinator.sync().await.unwrap();

    assert!(!report.is_fatal());
    assert_eq!(report.total_failed(), 1);
    // The valid document still came down
    assert!(f.link_repo.get(SyncableItem::id(&good)).await.is_ok());
    // The corrupt one never landed locally
    assert!(f.link_repo.get(bad_id).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn conflicted_item_is_left_alone_until_resolved() {
    let f = fixture().await;
    let link = Link::new("https://example.org/a", None, false, vec![]);
    let keeper = Link::new("https://example.org/b", None, false, vec![]);
    f.link_repo.save(&link).await.unwrap();
    f.link_repo.save(&keeper).await.unwrap();
    f.coordinator.sync().await.unwrap();

    f.storage.remove_file("links", &file_name(SyncableItem::id(&link)));
    f.coordinator.sync().await.unwrap();

    let conflicted = f.link_repo.get(SyncableItem::id(&link)).await.unwrap();
    assert!(conflicted.state().is_conflicted());

    // Passes keep reporting the conflict without touching the item
    let report = f.coordinator.sync().await.unwrap();
    assert_eq!(report.status, Some(SyncStatus::Conflict));

    let after = f.link_repo.get(SyncableItem::id(&link)).await.unwrap();
    assert_eq!(conflicted.state(), after.state());
}
