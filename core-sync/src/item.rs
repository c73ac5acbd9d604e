//! # Syncable Item Contract
//!
//! The capability contract every synced item type implements, plus the wire
//! codec shared by all collections.
//!
//! ## Wire format
//!
//! One UTF-8 JSON document per item:
//!
//! ```json
//! {"version": 1, "link": {"id": "...", "created": 0, "updated": 0, "url": "...", "tags": [{"name": "..."}]}}
//! ```
//!
//! The envelope version is checked on every parse; an unknown version
//! rejects the whole document (the item is treated as corrupt/absent),
//! never partially parsed.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use core_store::{Favorite, FavoriteId, Link, LinkId, Note, NoteId, SyncState, Tag};

use crate::error::{Result, SyncError};

/// Supported wire envelope version.
pub const DOCUMENT_VERSION: u32 = 1;

// ============================================================================
// Collections
// ============================================================================

/// The three synced item collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Favorites,
    Links,
    Notes,
}

impl Collection {
    /// Remote directory name and event scope for this collection.
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Favorites => "favorites",
            Collection::Links => "links",
            Collection::Notes => "notes",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// SyncableItem
// ============================================================================

/// Capability contract for items the engine can reconcile.
///
/// Implemented by [`Link`], [`Favorite`] and [`Note`]; the reconciliation
/// algorithm and the cloud adapter are generic over this trait, so the three
/// collections share one code path.
pub trait SyncableItem: Clone + Send + Sync + 'static {
    /// The collection this item type belongs to.
    const COLLECTION: Collection;

    /// Globally-unique, immutable id.
    fn id(&self) -> Uuid;

    /// The embedded reconciliation state.
    fn state(&self) -> &SyncState;

    /// New instance carrying a different reconciliation state.
    fn with_state(self, state: SyncState) -> Self;

    /// The natural key duplicates collide on.
    fn duplicated_key(&self) -> &str;

    /// The item's tags (pruned of empty names).
    fn tags(&self) -> &[Tag];

    /// Whether the item lacks its minimum content.
    fn is_empty(&self) -> bool;

    /// Content equality, ignoring sync state.
    fn matches(&self, other: &Self) -> bool;

    /// Serialize into the versioned wire envelope.
    fn to_document(&self) -> Result<String>;

    /// Parse from the versioned wire envelope.
    ///
    /// The returned item carries a default (unsynced) state; callers attach
    /// the remote version tag.
    fn from_document(json: &str) -> Result<Self>;

    fn etag(&self) -> Option<&str> {
        self.state().etag()
    }

    fn is_duplicated(&self) -> bool {
        self.state().is_duplicated()
    }

    fn is_conflicted(&self) -> bool {
        self.state().is_conflicted()
    }

    fn is_deleted(&self) -> bool {
        self.state().is_deleted()
    }

    fn is_synced(&self) -> bool {
        self.state().is_synced()
    }
}

// ============================================================================
// Wire documents
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct TagDoc {
    name: String,
    #[serde(default)]
    added: i64,
}

impl From<&Tag> for TagDoc {
    fn from(tag: &Tag) -> Self {
        Self {
            name: tag.name().to_string(),
            added: tag.added_at(),
        }
    }
}

impl From<TagDoc> for Tag {
    fn from(doc: TagDoc) -> Self {
        Tag::with_added(doc.name, doc.added)
    }
}

fn tags_to_docs(tags: &[Tag]) -> Vec<TagDoc> {
    tags.iter().map(TagDoc::from).collect()
}

fn docs_to_tags(docs: Vec<TagDoc>) -> Vec<Tag> {
    docs.into_iter().map(Tag::from).collect()
}

fn parse_envelope<E: for<'de> Deserialize<'de>>(json: &str, version_of: fn(&E) -> u32) -> Result<E> {
    let envelope: E =
        serde_json::from_str(json).map_err(|e| SyncError::InvalidDocument(e.to_string()))?;

    let version = version_of(&envelope);
    if version != DOCUMENT_VERSION {
        return Err(SyncError::InvalidDocument(format!(
            "Unknown envelope version {}",
            version
        )));
    }

    Ok(envelope)
}

fn serialize_envelope<E: Serialize>(envelope: &E) -> Result<String> {
    serde_json::to_string(envelope).map_err(|e| SyncError::InvalidDocument(e.to_string()))
}

// ----------------------------------------------------------------------------
// Link
// ----------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct LinkEnvelope {
    version: u32,
    link: LinkDoc,
}

#[derive(Debug, Serialize, Deserialize)]
struct LinkDoc {
    id: Uuid,
    created: i64,
    updated: i64,
    url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    #[serde(default)]
    disabled: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tags: Vec<TagDoc>,
}

impl SyncableItem for Link {
    const COLLECTION: Collection = Collection::Links;

    fn id(&self) -> Uuid {
        Link::id(self).as_uuid()
    }

    fn state(&self) -> &SyncState {
        Link::state(self)
    }

    fn with_state(self, state: SyncState) -> Self {
        Link::with_state(self, state)
    }

    fn duplicated_key(&self) -> &str {
        Link::duplicated_key(self)
    }

    fn tags(&self) -> &[Tag] {
        Link::tags(self)
    }

    fn is_empty(&self) -> bool {
        Link::is_empty(self)
    }

    fn matches(&self, other: &Self) -> bool {
        Link::matches(self, other)
    }

    fn to_document(&self) -> Result<String> {
        serialize_envelope(&LinkEnvelope {
            version: DOCUMENT_VERSION,
            link: LinkDoc {
                id: Link::id(self).as_uuid(),
                created: self.created_at(),
                updated: self.updated_at(),
                url: self.url().to_string(),
                title: self.title().map(str::to_string),
                disabled: self.is_disabled(),
                tags: tags_to_docs(self.tags()),
            },
        })
    }

    fn from_document(json: &str) -> Result<Self> {
        let envelope: LinkEnvelope = parse_envelope(json, |e: &LinkEnvelope| e.version)?;
        let doc = envelope.link;

        Ok(Link::restore(
            LinkId::from(doc.id),
            doc.created,
            doc.updated,
            doc.url,
            doc.title,
            doc.disabled,
            docs_to_tags(doc.tags),
            SyncState::new(),
        ))
    }
}

// ----------------------------------------------------------------------------
// Favorite
// ----------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct FavoriteEnvelope {
    version: u32,
    favorite: FavoriteDoc,
}

#[derive(Debug, Serialize, Deserialize)]
struct FavoriteDoc {
    id: Uuid,
    added: i64,
    name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tags: Vec<TagDoc>,
}

impl SyncableItem for Favorite {
    const COLLECTION: Collection = Collection::Favorites;

    fn id(&self) -> Uuid {
        Favorite::id(self).as_uuid()
    }

    fn state(&self) -> &SyncState {
        Favorite::state(self)
    }

    fn with_state(self, state: SyncState) -> Self {
        Favorite::with_state(self, state)
    }

    fn duplicated_key(&self) -> &str {
        Favorite::duplicated_key(self)
    }

    fn tags(&self) -> &[Tag] {
        Favorite::tags(self)
    }

    fn is_empty(&self) -> bool {
        Favorite::is_empty(self)
    }

    fn matches(&self, other: &Self) -> bool {
        Favorite::matches(self, other)
    }

    fn to_document(&self) -> Result<String> {
        serialize_envelope(&FavoriteEnvelope {
            version: DOCUMENT_VERSION,
            favorite: FavoriteDoc {
                id: Favorite::id(self).as_uuid(),
                added: self.added_at(),
                name: self.name().to_string(),
                tags: tags_to_docs(self.tags()),
            },
        })
    }

    fn from_document(json: &str) -> Result<Self> {
        let envelope: FavoriteEnvelope = parse_envelope(json, |e: &FavoriteEnvelope| e.version)?;
        let doc = envelope.favorite;

        Ok(Favorite::restore(
            FavoriteId::from(doc.id),
            doc.added,
            doc.name,
            docs_to_tags(doc.tags),
            SyncState::new(),
        ))
    }
}

// ----------------------------------------------------------------------------
// Note
// ----------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct NoteEnvelope {
    version: u32,
    note: NoteDoc,
}

#[derive(Debug, Serialize, Deserialize)]
struct NoteDoc {
    id: Uuid,
    created: i64,
    updated: i64,
    excerpt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    link: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tags: Vec<TagDoc>,
}

impl SyncableItem for Note {
    const COLLECTION: Collection = Collection::Notes;

    fn id(&self) -> Uuid {
        Note::id(self).as_uuid()
    }

    fn state(&self) -> &SyncState {
        Note::state(self)
    }

    fn with_state(self, state: SyncState) -> Self {
        Note::with_state(self, state)
    }

    fn duplicated_key(&self) -> &str {
        Note::duplicated_key(self)
    }

    fn tags(&self) -> &[Tag] {
        Note::tags(self)
    }

    fn is_empty(&self) -> bool {
        Note::is_empty(self)
    }

    fn matches(&self, other: &Self) -> bool {
        Note::matches(self, other)
    }

    fn to_document(&self) -> Result<String> {
        serialize_envelope(&NoteEnvelope {
            version: DOCUMENT_VERSION,
            note: NoteDoc {
                id: Note::id(self).as_uuid(),
                created: self.created_at(),
                updated: self.updated_at(),
                excerpt: self.excerpt().to_string(),
                link: self.link_id().map(|id| id.as_uuid()),
                tags: tags_to_docs(self.tags()),
            },
        })
    }

    fn from_document(json: &str) -> Result<Self> {
        let envelope: NoteEnvelope = parse_envelope(json, |e: &NoteEnvelope| e.version)?;
        let doc = envelope.note;

        Ok(Note::restore(
            NoteId::from(doc.id),
            doc.created,
            doc.updated,
            doc.excerpt,
            doc.link.map(LinkId::from),
            docs_to_tags(doc.tags),
            SyncState::new(),
        ))
    }
}

// ============================================================================
// Tests
// ============================================================================
