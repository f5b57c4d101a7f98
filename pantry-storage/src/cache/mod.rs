//! Cache layer in front of the recipe and review stores.
//!
//! The policy is write-through-then-invalidate: after a successful store
//! mutation the coordinator writes the mutated entity under its own key and
//! invalidates list slots instead of patching them.
//!
//! Backends are byte-oriented ([`CacheBackend`]); [`RecordCache`] adds JSON
//! serialization, expiry and the timeout that keeps a slow or broken backend
//! from ever failing an operation.
//!
//! # Example
//!
//! ```ignore
//! let cache = RecordCache::new(Arc::new(InMemoryCacheBackend::new(1_000)), CacheConfig::default());
//! cache.put(&recipe).await;
//! let read = cache.get::<Recipe>(&CacheKey::recipe(recipe.recipe_id)).await;
//! assert!(read.map(|r| r.was_cache_hit()).unwrap_or(false));
//! ```

pub mod key;
pub mod lmdb_backend;
pub mod memory_backend;
pub mod read;
pub mod record_cache;
pub mod traits;

pub use key::CacheKey;
pub use lmdb_backend::{LmdbCacheBackend, LmdbCacheError};
pub use memory_backend::InMemoryCacheBackend;
pub use read::CacheRead;
pub use record_cache::{CacheConfig, RecordCache, StorageFetcher};
pub use traits::{CacheBackend, CacheStats, CacheableEntity, CachedBytes};
