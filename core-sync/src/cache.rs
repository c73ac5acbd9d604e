//! Cache invalidation hooks
//!
//! Hosts keep in-memory views of the collections; the engine calls these
//! hooks after state-changing operations so subsequent reads are consistent.
//! The hooks are fire-and-forget and must never fail the calling operation.

use uuid::Uuid;

use crate::item::Collection;

/// External cache-consistency hooks, not owned by the core.
#[cfg_attr(test, mockall::automock)]
pub trait CacheInvalidator: Send + Sync {
    /// Drop any cached view of a whole collection.
    fn refresh_collection(&self, collection: Collection);

    /// Drop one cached item.
    fn remove_item(&self, collection: Collection, id: Uuid);
}

/// Default hook for hosts without an in-memory cache.
pub struct NoopCacheInvalidator;

impl CacheInvalidator for NoopCacheInvalidator {
    fn refresh_collection(&self, _collection: Collection) {}

    fn remove_item(&self, _collection: Collection, _id: Uuid) {}
}
