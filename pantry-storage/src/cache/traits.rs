//! Backend seam and the entities that can be cached.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pantry_core::{EntityIdType, EntityKind, PantryResult, Recipe, Review};
use serde::{de::DeserializeOwned, Serialize};
use uuid::Uuid;

use super::key::CacheKey;

/// A recipe or review, cached under `{kind}:{id}`.
pub trait CacheableEntity: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    fn entity_kind() -> EntityKind;

    fn entity_id(&self) -> Uuid;

    /// Key this entity is cached under.
    fn cache_key(&self) -> CacheKey {
        CacheKey::entity(Self::entity_kind(), self.entity_id())
    }
}

/// Raw cache entry as handed out by a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedBytes {
    /// Serialized value.
    pub bytes: Vec<u8>,
    /// When the value was written.
    pub cached_at: DateTime<Utc>,
}

/// Cache backend trait for pluggable cache implementations.
///
/// Backends are byte-oriented and object safe so the coordinators can hold
/// an `Arc<dyn CacheBackend>`. Serialization is the caller's concern.
/// Implementations must be thread-safe; failures are reported as
/// `PantryError::Cache`.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Get an entry, or None if not present.
    async fn get(&self, key: &CacheKey) -> PantryResult<Option<CachedBytes>>;

    /// Insert or overwrite an entry. `cached_at` must come back unchanged
    /// from `get`.
    async fn put(&self, key: &CacheKey, bytes: Vec<u8>, cached_at: DateTime<Utc>)
        -> PantryResult<()>;

    /// Delete an entry. Returns true if something was removed.
    async fn delete(&self, key: &CacheKey) -> PantryResult<bool>;

    /// Drop every entry, returning how many were removed.
    async fn clear(&self) -> PantryResult<u64>;

    async fn stats(&self) -> PantryResult<CacheStats>;
}

/// Backend counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entry_count: u64,
    /// Stored payload bytes, keys excluded.
    pub memory_bytes: u64,
    /// Entries dropped to make room.
    pub evictions: u64,
}

impl CacheStats {
    /// Hits over lookups, 0.0 before the first lookup.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

// ============================================================================
// IMPLEMENTATIONS FOR PANTRY ENTITIES
// ============================================================================

impl CacheableEntity for Recipe {
    fn entity_kind() -> EntityKind {
        EntityKind::Recipe
    }

    fn entity_id(&self) -> Uuid {
        self.recipe_id.as_uuid()
    }
}

impl CacheableEntity for Review {
    fn entity_kind() -> EntityKind {
        EntityKind::Review
    }

    fn entity_id(&self) -> Uuid {
        self.review_id.as_uuid()
    }
}
