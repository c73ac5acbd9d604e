//! # Event Bus System
//!
//! Provides an event-driven architecture for the sync core using
//! `tokio::sync::broadcast`. Modules publish typed events; hosts subscribe
//! to refresh UI state or surface sync progress.
//!
//! ## Overview
//!
//! The event bus system consists of:
//! - **Event Types**: Strongly-typed enum hierarchies for sync-pass and
//!   per-item notifications
//! - **EventBus**: Central broadcast channel for publishing events
//! - **Subscription Management**: Multiple subscribers can listen independently
//!
//! Emission is fire-and-forget: publishers call `emit(..).ok()` and never
//! fail because nobody is listening. Slow subscribers receive
//! `RecvError::Lagged` without blocking fast ones.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, ItemAction, ItemEvent};
//!
//! let event_bus = EventBus::new(100);
//! let mut subscriber = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Item(ItemEvent {
//!         collection: "links".to_string(),
//!         item_id: "2c6cf6a8-92a5-4f1a-9ae2-7dd0f4a40a91".to_string(),
//!         action: ItemAction::Created,
//!     }))
//!     .ok();
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

// Re-export commonly used types
pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
///
/// Subscribers that can't keep up will receive `RecvError::Lagged`.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Sync-pass lifecycle events
    Sync(SyncEvent),
    /// Per-item change notifications
    Item(ItemEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Sync(e) => e.description(),
            CoreEvent::Item(_) => "Item changed",
        }
    }
}

// ============================================================================
// Sync Events
// ============================================================================

/// Events describing the lifecycle of a sync pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SyncEvent {
    /// Sync pass initiated.
    Started,
    /// A collection's reconciliation pass started.
    CollectionStarted {
        /// The collection being reconciled (e.g., "links").
        collection: String,
    },
    /// A collection's reconciliation pass finished.
    CollectionFinished {
        /// The collection that was reconciled.
        collection: String,
        /// Items pushed to the cloud.
        uploaded: u32,
        /// Items pulled from the cloud.
        downloaded: u32,
        /// Items removed locally or remotely.
        deleted: u32,
        /// Items that failed individually (pass continued).
        failed: u32,
    },
    /// Sync pass finished without a fatal error.
    Completed {
        /// Overall status: "synced", "unsynced" or "conflict".
        status: String,
        /// Total per-item failures across all collections.
        failed_total: u32,
    },
    /// Sync pass aborted by a fatal error.
    Failed {
        /// "database" or "cloud_unreachable".
        reason: String,
        /// The collection whose pass hit the fatal error.
        collection: String,
    },
}

impl SyncEvent {
    fn description(&self) -> &str {
        match self {
            SyncEvent::Started => "Sync started",
            SyncEvent::CollectionStarted { .. } => "Collection sync started",
            SyncEvent::CollectionFinished { .. } => "Collection sync finished",
            SyncEvent::Completed { .. } => "Sync completed",
            SyncEvent::Failed { .. } => "Sync failed",
        }
    }
}

// ============================================================================
// Item Events
// ============================================================================

/// What happened to an item during sync or conflict resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemAction {
    /// Item appeared locally (downloaded from the cloud).
    Created,
    /// Item content or sync state changed.
    Updated,
    /// Item was removed.
    Deleted,
    /// Sub-event: local content was pushed to the cloud.
    Uploaded,
    /// Sub-event: cloud content was pulled locally.
    Downloaded,
}

impl ItemAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemAction::Created => "created",
            ItemAction::Updated => "updated",
            ItemAction::Deleted => "deleted",
            ItemAction::Uploaded => "uploaded",
            ItemAction::Downloaded => "downloaded",
        }
    }
}

impl fmt::Display for ItemAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single item changed during sync or conflict resolution.
///
/// Carries only the item id; consumers re-read the item from the local
/// store if they need its content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ItemEvent {
    /// The collection the item belongs to (e.g., "favorites").
    pub collection: String,
    /// The item's globally-unique id.
    pub item_id: String,
    /// What happened.
    pub action: ItemAction,
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to events.
///
/// Uses `tokio::sync::broadcast` internally, which provides:
/// - Multiple producers (clone the `EventBus`)
/// - Multiple consumers (each `subscribe()` creates a new receiver)
/// - Non-blocking sends (events are cloned for each subscriber)
/// - Lagging detection (slow subscribers get `RecvError::Lagged`)
///
/// # Example
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
///
/// let event_bus = EventBus::new(100);
/// let mut subscriber = event_bus.subscribe();
///
/// event_bus.emit(CoreEvent::Sync(SyncEvent::Started)).ok();
/// ```
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an
    /// error if there are no active subscribers. Callers in the sync path
    /// always discard the result: notification failure never fails a pass.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber to receive events.
    ///
    /// Each call creates an independent receiver that will receive all
    /// future events. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
