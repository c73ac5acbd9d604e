//! Per-collection repositories
//!
//! Each repository implements [`ItemRepository`] for one collection,
//! translating between SQLite rows and the immutable domain models. The sync
//! engine consumes these through the trait and never sees row-level
//! representations.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::SyncState;

mod favorites;
mod links;
mod notes;

pub use favorites::SqliteFavoriteRepository;
pub use links::SqliteLinkRepository;
pub use notes::SqliteNoteRepository;

/// Local store adapter contract for one item collection.
///
/// Expected conditions are encoded in [`StoreError`](crate::StoreError)
/// variants callers pattern-match on: `save` fails with `Conflict` on a
/// natural-key collision, `get`/`get_main` fail with `NotFound`.
#[async_trait]
pub trait ItemRepository<T>: Send + Sync {
    /// All items, including soft-deleted and conflicted ones.
    async fn get_all(&self) -> Result<Vec<T>>;

    /// Items whose local content diverged from the cloud copy and that are
    /// not awaiting conflict resolution.
    async fn get_unsynced(&self) -> Result<Vec<T>>;

    /// Ids of all stored items.
    async fn get_ids(&self) -> Result<Vec<Uuid>>;

    /// Load one item by id.
    async fn get(&self, id: Uuid) -> Result<T>;

    /// Insert or replace an item (matched by id), returning its row id.
    ///
    /// Fails with `StoreError::Conflict` when another item already occupies
    /// the same natural key and duplicate slot.
    async fn save(&self, item: &T) -> Result<i64>;

    /// Store an item in the next free duplicate slot for its natural key.
    ///
    /// The stored copy is marked conflicted and synced; slots are assigned
    /// monotonically (max existing slot + 1).
    async fn save_duplicated(&self, item: &T) -> Result<i64>;

    /// Replace an item's sync state, returning the number of affected rows.
    async fn update_sync_state(&self, id: Uuid, state: &SyncState) -> Result<u64>;

    /// Remove an item's row, returning the number of affected rows.
    async fn delete(&self, id: Uuid) -> Result<u64>;

    /// Clear every item's version tag and synced flag, forcing a full
    /// re-upload on the next sync pass. Returns the number of affected rows.
    async fn reset_sync_states(&self) -> Result<u64>;

    /// Whether any item is flagged conflicted.
    async fn has_conflicted(&self) -> Result<bool>;

    /// Whether any item is not synced.
    async fn has_unsynced(&self) -> Result<bool>;

    /// The primary (slot 0) item for a natural key.
    async fn get_main(&self, duplicated_key: &str) -> Result<T>;
}
