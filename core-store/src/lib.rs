//! # Local Store
//!
//! SQLite-backed persistence for the three item collections (links,
//! favorites, notes) and their sync state.
//!
//! ## Components
//!
//! - **Database** (`db`): connection pool configuration and schema setup
//! - **Models** (`models`): the immutable domain types (`Link`, `Favorite`,
//!   `Note`, `Tag`) and the per-item [`SyncState`](models::SyncState)
//!   value type with its transition rules
//! - **Repositories** (`repositories`): per-collection CRUD + sync-state
//!   operations consumed by the sync engine, including duplicate-slot
//!   handling for natural-key collisions

pub mod db;
pub mod error;
pub mod models;
pub mod repositories;

pub use db::{create_pool, create_test_pool, DatabaseConfig};
pub use error::{Result, StoreError};
pub use models::{
    Favorite, FavoriteId, Link, LinkId, Note, NoteId, SyncState, SyncTarget, Tag,
};
pub use repositories::{
    ItemRepository, SqliteFavoriteRepository, SqliteLinkRepository, SqliteNoteRepository,
};
