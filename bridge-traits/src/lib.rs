//! # Host Bridge Traits
//!
//! Platform abstraction traits that must be implemented by each host platform.
//!
//! ## Overview
//!
//! This crate defines the contract between the sync core and platform-specific
//! implementations. Each trait represents a capability the core requires but
//! that is provided differently per host (cloud provider, settings backend).
//!
//! ## Traits
//!
//! - [`FileStorage`](storage::FileStorage) - Remote file hierarchy with
//!   per-file and per-directory version tags (ETags)
//! - [`SettingsStore`](settings::SettingsStore) - Key-value preferences
//!   storage (last-synced ETags, sync policies)
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type.
//! Platform implementations should convert provider-specific errors into
//! `BridgeError` variants and keep the `NotFound` variant distinguishable:
//! the sync core pattern-matches on it for idempotent deletes and
//! missing-item handling.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` bounds to support safe concurrent
//! usage across async tasks.

pub mod error;
pub mod settings;
pub mod storage;

pub use error::BridgeError;

// Re-export commonly used types
pub use settings::SettingsStore;
pub use storage::{FileStorage, RemoteEntry};
