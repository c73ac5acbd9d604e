//! # Sync Engine
//!
//! Bidirectional reconciliation of the three item collections (favorites,
//! links, notes) between the local SQLite store and a remote file-based
//! cloud storage backend.
//!
//! ## Overview
//!
//! The engine compares per-item version tags (ETags) and sync flags to drive
//! each item through upload, download, delete or conflict-mark operations,
//! under occasional connectivity and without server-side transactions.
//!
//! ## Components
//!
//! - **Item Contract** (`item`): the [`SyncableItem`] capability trait and
//!   the versioned JSON wire envelope shared by all collections
//! - **Cloud Adapter** (`cloud`): per-collection view of the remote file
//!   store, including the persisted "last synced ETag" cursor
//! - **Reconciliation** (`sync_item`): the per-collection sync pass and its
//!   decision table
//! - **Coordinator** (`coordinator`): orchestrates favorites → links →
//!   notes with fatal short-circuiting and overall status derivation
//! - **Conflict Resolution** (`conflict`): interactive or automatic
//!   resolution of a single flagged item
//! - **Cache Hooks** (`cache`): host cache invalidation callbacks

pub mod cache;
pub mod cloud;
pub mod conflict;
pub mod coordinator;
pub mod error;
pub mod item;
pub mod sync_item;

#[cfg(test)]
pub(crate) mod fakes;

pub use cache::{CacheInvalidator, NoopCacheInvalidator};
pub use cloud::CloudStore;
pub use conflict::{
    ConflictResolution, ConflictSnapshot, ResolutionAction, ResolutionHandle, ResolutionOutcome,
    ResolutionState,
};
pub use coordinator::{
    CollectionSummary, FatalReason, SyncConfig, SyncCoordinator, SyncReport, SyncStatus,
};
pub use error::{Result, SyncError};
pub use item::{Collection, SyncableItem, DOCUMENT_VERSION};
pub use sync_item::{SyncItem, SyncItemResult, SyncResultStatus};
