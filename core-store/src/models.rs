//! Domain models for the item collections
//!
//! All item types are immutable: edits construct a new instance (the `with_*`
//! helpers) rather than mutating in place. Each item embeds a [`SyncState`]
//! describing its reconciliation status against the cloud copy.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Current Unix timestamp in milliseconds
pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

// =============================================================================
// ID Types
// =============================================================================

macro_rules! item_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
                Ok(Self(Uuid::parse_str(s)?))
            }

            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

item_id!(
    /// Unique identifier for a link
    LinkId
);
item_id!(
    /// Unique identifier for a favorite
    FavoriteId
);
item_id!(
    /// Unique identifier for a note
    NoteId
);

// =============================================================================
// Sync State
// =============================================================================

/// Named target of a sync-state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTarget {
    /// Local content diverged from the cloud copy (or was never uploaded)
    Unsynced,
    /// Local content matches the eTag'd cloud content
    Synced,
    /// Soft-deleted locally, pending remote deletion
    Deleted,
    /// Local and cloud content disagree; needs resolution
    ConflictedUpdate,
    /// Local copy was deleted while the cloud copy changed; needs resolution
    ConflictedDelete,
}

/// Reconciliation status of one item.
///
/// Instances are immutable; transitions produce a new value. `etag == None`
/// means the item has never been uploaded. `duplicated > 0` marks a
/// downloaded copy stored in a non-primary slot after a natural-key
/// collision; such a copy is always `conflicted` and `synced`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SyncState {
    row_id: Option<i64>,
    etag: Option<String>,
    duplicated: i32,
    conflicted: bool,
    deleted: bool,
    synced: bool,
}

impl SyncState {
    /// State of a freshly created, never-uploaded item.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a state from its persisted parts (row boundary only).
    pub fn from_parts(
        row_id: Option<i64>,
        etag: Option<String>,
        duplicated: i32,
        conflicted: bool,
        deleted: bool,
        synced: bool,
    ) -> Self {
        Self {
            row_id,
            etag,
            duplicated,
            conflicted,
            deleted,
            synced,
        }
    }

    /// Derive the next state from this one.
    ///
    /// Keeps identity (`row_id`), version tag and duplicate slot; flags
    /// change per the target. This is a pure function: the same `(state,
    /// target)` pair always produces the same result.
    pub fn transition(&self, target: SyncTarget) -> Self {
        let mut next = self.clone();
        match target {
            SyncTarget::Unsynced => {
                next.synced = false;
            }
            SyncTarget::Synced => {
                next.conflicted = false;
                next.deleted = false;
                next.synced = true;
            }
            SyncTarget::Deleted => {
                next.deleted = true;
                next.synced = false;
            }
            SyncTarget::ConflictedUpdate => {
                next.conflicted = true;
                next.deleted = false;
                next.synced = false;
            }
            SyncTarget::ConflictedDelete => {
                next.conflicted = true;
                next.deleted = true;
                next.synced = false;
            }
        }
        next
    }

    /// Fresh state carrying an explicit version tag, used after an upload or
    /// download assigned a new eTag. The duplicate slot returns to primary.
    pub fn with_etag(etag: impl Into<String>, target: SyncTarget) -> Self {
        Self {
            etag: Some(etag.into()),
            ..Self::new()
        }
        .transition(target)
    }

    /// State of a downloaded copy stored in a non-primary duplicate slot.
    pub fn duplicated(etag: impl Into<String>, slot: i32) -> Self {
        debug_assert!(slot > 0, "primary slot is not a duplicate");
        Self {
            row_id: None,
            etag: Some(etag.into()),
            duplicated: slot,
            conflicted: true,
            deleted: false,
            synced: true,
        }
    }

    pub fn row_id(&self) -> Option<i64> {
        self.row_id
    }

    pub fn etag(&self) -> Option<&str> {
        self.etag.as_deref()
    }

    pub fn duplicated_slot(&self) -> i32 {
        self.duplicated
    }

    pub fn is_duplicated(&self) -> bool {
        self.duplicated > 0
    }

    pub fn is_conflicted(&self) -> bool {
        self.conflicted
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub fn is_synced(&self) -> bool {
        self.synced
    }
}

// =============================================================================
// Tag
// =============================================================================

/// A user-assigned label on an item.
///
/// Equality considers the name only; the added timestamp is informational.
/// Tags with a blank name are "empty" and excluded from persistence.
#[derive(Debug, Clone, Eq)]
pub struct Tag {
    name: String,
    added_at: i64,
}

impl Tag {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_added(name, now_millis())
    }

    pub fn with_added(name: impl Into<String>, added_at: i64) -> Self {
        Self {
            name: name.into(),
            added_at,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn added_at(&self) -> i64 {
        self.added_at
    }

    pub fn is_empty(&self) -> bool {
        self.name.trim().is_empty()
    }
}

impl PartialEq for Tag {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl std::hash::Hash for Tag {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

/// Drop empty and repeated tags; persistence and the wire format never see
/// them, and tag identity is the name alone.
fn prune_tags(mut tags: Vec<Tag>) -> Vec<Tag> {
    let mut seen = std::collections::HashSet::new();
    tags.retain(|t| !t.is_empty() && seen.insert(t.name().to_string()));
    tags
}

// =============================================================================
// Link
// =============================================================================

/// A bookmarked link.
#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    id: LinkId,
    created_at: i64,
    updated_at: i64,
    url: String,
    title: Option<String>,
    disabled: bool,
    tags: Vec<Tag>,
    state: SyncState,
}

impl Link {
    /// Create a new local link with a fresh id and default (unsynced) state.
    pub fn new(url: impl Into<String>, title: Option<String>, disabled: bool, tags: Vec<Tag>) -> Self {
        let now = now_millis();
        Self {
            id: LinkId::new(),
            created_at: now,
            updated_at: now,
            url: url.into(),
            title,
            disabled,
            tags: prune_tags(tags),
            state: SyncState::new(),
        }
    }

    /// Rebuild a link from persisted or downloaded parts.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: LinkId,
        created_at: i64,
        updated_at: i64,
        url: String,
        title: Option<String>,
        disabled: bool,
        tags: Vec<Tag>,
        state: SyncState,
    ) -> Self {
        Self {
            id,
            created_at,
            updated_at,
            url,
            title,
            disabled,
            tags: prune_tags(tags),
            state,
        }
    }

    pub fn id(&self) -> LinkId {
        self.id
    }

    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    pub fn updated_at(&self) -> i64 {
        self.updated_at
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    pub fn state(&self) -> &SyncState {
        &self.state
    }

    /// New instance with a different sync state.
    pub fn with_state(mut self, state: SyncState) -> Self {
        self.state = state;
        self
    }

    /// The natural key duplicates collide on.
    pub fn duplicated_key(&self) -> &str {
        &self.url
    }

    /// A link without a URL has no minimum content.
    pub fn is_empty(&self) -> bool {
        self.url.trim().is_empty()
    }

    /// Content equality, ignoring sync state.
    pub fn matches(&self, other: &Self) -> bool {
        self.url == other.url
            && self.title == other.title
            && self.disabled == other.disabled
            && self.tags == other.tags
    }
}

// =============================================================================
// Favorite
// =============================================================================

/// A favorite: a named shortcut the user pinned.
#[derive(Debug, Clone, PartialEq)]
pub struct Favorite {
    id: FavoriteId,
    added_at: i64,
    name: String,
    tags: Vec<Tag>,
    state: SyncState,
}

impl Favorite {
    pub fn new(name: impl Into<String>, tags: Vec<Tag>) -> Self {
        Self {
            id: FavoriteId::new(),
            added_at: now_millis(),
            name: name.into(),
            tags: prune_tags(tags),
            state: SyncState::new(),
        }
    }

    pub fn restore(
        id: FavoriteId,
        added_at: i64,
        name: String,
        tags: Vec<Tag>,
        state: SyncState,
    ) -> Self {
        Self {
            id,
            added_at,
            name,
            tags: prune_tags(tags),
            state,
        }
    }

    pub fn id(&self) -> FavoriteId {
        self.id
    }

    pub fn added_at(&self) -> i64 {
        self.added_at
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    pub fn state(&self) -> &SyncState {
        &self.state
    }

    pub fn with_state(mut self, state: SyncState) -> Self {
        self.state = state;
        self
    }

    pub fn duplicated_key(&self) -> &str {
        &self.name
    }

    pub fn is_empty(&self) -> bool {
        self.name.trim().is_empty()
    }

    pub fn matches(&self, other: &Self) -> bool {
        self.name == other.name && self.tags == other.tags
    }
}

// =============================================================================
// Note
// =============================================================================

/// A free-text note, optionally bound to a link.
///
/// The binding is a weak reference: the note holds the link id for lookup
/// and display only and does not own the link.
#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    id: NoteId,
    created_at: i64,
    updated_at: i64,
    excerpt: String,
    link_id: Option<LinkId>,
    tags: Vec<Tag>,
    state: SyncState,
}

impl Note {
    pub fn new(excerpt: impl Into<String>, link_id: Option<LinkId>, tags: Vec<Tag>) -> Self {
        let now = now_millis();
        Self {
            id: NoteId::new(),
            created_at: now,
            updated_at: now,
            excerpt: excerpt.into(),
            link_id,
            tags: prune_tags(tags),
            state: SyncState::new(),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: NoteId,
        created_at: i64,
        updated_at: i64,
        excerpt: String,
        link_id: Option<LinkId>,
        tags: Vec<Tag>,
        state: SyncState,
    ) -> Self {
        Self {
            id,
            created_at,
            updated_at,
            excerpt,
            link_id,
            tags: prune_tags(tags),
            state,
        }
    }

    pub fn id(&self) -> NoteId {
        self.id
    }

    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    pub fn updated_at(&self) -> i64 {
        self.updated_at
    }

    pub fn excerpt(&self) -> &str {
        &self.excerpt
    }

    pub fn link_id(&self) -> Option<LinkId> {
        self.link_id
    }

    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    pub fn state(&self) -> &SyncState {
        &self.state
    }

    pub fn with_state(mut self, state: SyncState) -> Self {
        self.state = state;
        self
    }

    pub fn duplicated_key(&self) -> &str {
        &self.excerpt
    }

    pub fn is_empty(&self) -> bool {
        self.excerpt.trim().is_empty()
    }

    pub fn matches(&self, other: &Self) -> bool {
        self.excerpt == other.excerpt
            && self.link_id == other.link_id
            && self.tags == other.tags
    }
}

// =============================================================================
// Tests
// =============================================================================
