//! Best-effort record cache.
//!
//! Wraps a [`CacheBackend`] with JSON serialization, entry expiry and a
//! per-call timeout. No method here returns a cache failure: backend errors,
//! timeouts and undecodable entries are logged and degrade to a miss or a
//! no-op, so the store stays the source of truth.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use pantry_core::{CacheError, PantryConfig, PantryResult, Recipe};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use super::key::CacheKey;
use super::read::CacheRead;
use super::traits::{CacheBackend, CacheStats, CacheableEntity};

/// Configuration for the record cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Entries older than this are treated as misses and removed.
    pub entry_ttl: Duration,
    /// Upper bound on any single backend call.
    pub operation_timeout: Duration,
    /// Capacity handed to bounded backends.
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            entry_ttl: Duration::from_secs(3600),
            operation_timeout: Duration::from_millis(250),
            max_entries: 10_000,
        }
    }
}

impl CacheConfig {
    /// Create a new cache config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the entry TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.entry_ttl = ttl;
        self
    }

    /// Set the per-call timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Set the max entries.
    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = max;
        self
    }
}

impl From<&PantryConfig> for CacheConfig {
    fn from(config: &PantryConfig) -> Self {
        Self {
            entry_ttl: config.cache_entry_ttl,
            operation_timeout: config.cache_operation_timeout,
            max_entries: config.cache_max_entries,
        }
    }
}

/// Storage fetcher trait for retrieving entities on a cache miss.
#[async_trait]
pub trait StorageFetcher<T: CacheableEntity>: Send + Sync {
    /// Fetch an entity from storage by ID.
    async fn fetch(&self, entity_id: Uuid) -> PantryResult<Option<T>>;
}

/// Record cache facade used by the coordinators.
///
/// A disabled cache behaves like one that always misses.
#[derive(Clone)]
pub struct RecordCache {
    backend: Option<Arc<dyn CacheBackend>>,
    config: CacheConfig,
}

impl std::fmt::Debug for RecordCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordCache")
            .field("enabled", &self.is_enabled())
            .field("config", &self.config)
            .finish()
    }
}

impl RecordCache {
    /// Create a record cache over a backend.
    pub fn new(backend: Arc<dyn CacheBackend>, config: CacheConfig) -> Self {
        Self {
            backend: Some(backend),
            config,
        }
    }

    /// A cache that never stores anything.
    pub fn disabled() -> Self {
        Self {
            backend: None,
            config: CacheConfig::default(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    /// Get the cache configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Run one backend call under the configured timeout.
    ///
    /// Returns `None` on failure, after logging it.
    async fn guarded<R, F>(&self, operation: &'static str, key: Option<&CacheKey>, call: F) -> Option<R>
    where
        F: Future<Output = PantryResult<R>>,
    {
        let key = key.map(|k| k.to_string()).unwrap_or_else(|| "*".to_string());
        match tokio::time::timeout(self.config.operation_timeout, call).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                warn!(operation, key = %key, error = %e, "Cache operation failed, continuing without cache");
                None
            }
            Err(_) => {
                let e = CacheError::Timeout {
                    operation: operation.to_string(),
                    timeout_ms: self.config.operation_timeout.as_millis() as u64,
                };
                warn!(operation, key = %key, error = %e, "Cache operation timed out, continuing without cache");
                None
            }
        }
    }

    /// Look up a value. Misses, expired entries and failures all yield `None`.
    pub async fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<CacheRead<T>> {
        let backend = self.backend.as_ref()?;
        let Some(cached) = self.guarded("get", Some(key), backend.get(key)).await.flatten() else {
            debug!(key = %key, "Cache miss");
            return None;
        };

        let read = CacheRead::from_cache((), cached.cached_at);
        if read.staleness() > self.config.entry_ttl {
            debug!(key = %key, "Cache entry expired");
            self.invalidate(key).await;
            return None;
        }

        match serde_json::from_slice::<T>(&cached.bytes) {
            Ok(value) => {
                debug!(key = %key, "Cache hit");
                Some(read.map(|_| value))
            }
            Err(e) => {
                let e = CacheError::Serialization {
                    reason: e.to_string(),
                };
                warn!(key = %key, error = %e, "Dropping undecodable cache entry");
                self.invalidate(key).await;
                None
            }
        }
    }

    /// Write a value under an explicit key.
    pub async fn put_value<T: Serialize>(&self, key: &CacheKey, value: &T) {
        let Some(backend) = self.backend.as_ref() else {
            return;
        };
        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                let e = CacheError::Serialization {
                    reason: e.to_string(),
                };
                warn!(key = %key, error = %e, "Cache value could not be serialized");
                return;
            }
        };
        self.guarded("put", Some(key), backend.put(key, bytes, Utc::now()))
            .await;
    }

    /// Write an entity under its own key.
    pub async fn put<T: CacheableEntity>(&self, entity: &T) {
        self.put_value(&entity.cache_key(), entity).await;
    }

    /// Remove an entry.
    pub async fn invalidate(&self, key: &CacheKey) {
        if let Some(backend) = self.backend.as_ref() {
            self.guarded("delete", Some(key), backend.delete(key)).await;
        }
    }

    /// Remove several entries.
    pub async fn invalidate_many<'a, I>(&self, keys: I)
    where
        I: IntoIterator<Item = &'a CacheKey>,
    {
        for key in keys {
            self.invalidate(key).await;
        }
    }

    /// Read the all-recipes slot.
    pub async fn all_recipes(&self) -> Option<CacheRead<Vec<Recipe>>> {
        self.get(&CacheKey::all_recipes()).await
    }

    /// Populate the all-recipes slot.
    pub async fn put_all_recipes(&self, recipes: &[Recipe]) {
        self.put_value(&CacheKey::all_recipes(), &recipes).await;
    }

    /// Drop the all-recipes slot.
    pub async fn invalidate_all_recipes(&self) {
        self.invalidate(&CacheKey::all_recipes()).await;
    }

    /// Drop every entry.
    pub async fn clear(&self) {
        if let Some(backend) = self.backend.as_ref() {
            self.guarded("clear", None, backend.clear()).await;
        }
    }

    /// Backend statistics, if the cache is enabled and reachable.
    pub async fn stats(&self) -> Option<CacheStats> {
        let backend = self.backend.as_ref()?;
        self.guarded("stats", None, backend.stats()).await
    }

    /// Get an entity from the cache, falling back to storage on miss.
    ///
    /// A storage hit repopulates the cache. Storage errors propagate; cache
    /// errors never do.
    pub async fn read_through<T, S>(
        &self,
        entity_id: Uuid,
        storage: &S,
    ) -> PantryResult<Option<CacheRead<T>>>
    where
        T: CacheableEntity,
        S: StorageFetcher<T> + ?Sized,
    {
        let key = CacheKey::entity(T::entity_kind(), entity_id);
        if let Some(read) = self.get::<T>(&key).await {
            return Ok(Some(read));
        }

        match storage.fetch(entity_id).await? {
            Some(entity) => {
                self.put(&entity).await;
                Ok(Some(CacheRead::from_storage(entity)))
            }
            None => Ok(None),
        }
    }
}
