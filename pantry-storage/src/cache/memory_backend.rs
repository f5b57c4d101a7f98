//! Bounded in-memory cache backend.
//!
//! When full, a put of a new key evicts the entry that was written longest
//! ago. Overwriting an existing key refreshes its position.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pantry_core::PantryResult;
use tokio::sync::Mutex;

use super::key::CacheKey;
use super::traits::{CacheBackend, CacheStats, CachedBytes};

#[derive(Debug, Clone)]
struct MemoryEntry {
    bytes: Vec<u8>,
    cached_at: DateTime<Utc>,
    seq: u64,
}

#[derive(Debug, Default)]
struct MemoryInner {
    entries: HashMap<CacheKey, MemoryEntry>,
    /// Write order, oldest first.
    order: BTreeMap<u64, CacheKey>,
    next_seq: u64,
    stats: CacheStats,
}

impl MemoryInner {
    fn remove(&mut self, key: &CacheKey) -> Option<MemoryEntry> {
        let entry = self.entries.remove(key)?;
        self.order.remove(&entry.seq);
        self.stats.memory_bytes = self.stats.memory_bytes.saturating_sub(entry.bytes.len() as u64);
        self.stats.entry_count = self.entries.len() as u64;
        Some(entry)
    }

    fn evict_oldest(&mut self) -> bool {
        let Some((_, key)) = self.order.pop_first() else {
            return false;
        };
        if let Some(entry) = self.entries.remove(&key) {
            self.stats.memory_bytes = self.stats.memory_bytes.saturating_sub(entry.bytes.len() as u64);
        }
        self.stats.evictions += 1;
        self.stats.entry_count = self.entries.len() as u64;
        true
    }
}

/// In-memory cache backend with a fixed entry capacity.
#[derive(Debug)]
pub struct InMemoryCacheBackend {
    max_entries: usize,
    inner: Mutex<MemoryInner>,
}

impl InMemoryCacheBackend {
    /// Create a backend holding at most `max_entries` entries (minimum 1).
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries: max_entries.max(1),
            inner: Mutex::new(MemoryInner::default()),
        }
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }
}

impl Default for InMemoryCacheBackend {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl CacheBackend for InMemoryCacheBackend {
    async fn get(&self, key: &CacheKey) -> PantryResult<Option<CachedBytes>> {
        let mut inner = self.inner.lock().await;
        let found = inner.entries.get(key).map(|entry| CachedBytes {
            bytes: entry.bytes.clone(),
            cached_at: entry.cached_at,
        });
        if found.is_some() {
            inner.stats.hits += 1;
        } else {
            inner.stats.misses += 1;
        }
        Ok(found)
    }

    async fn put(
        &self,
        key: &CacheKey,
        bytes: Vec<u8>,
        cached_at: DateTime<Utc>,
    ) -> PantryResult<()> {
        let mut inner = self.inner.lock().await;
        inner.remove(key);
        while inner.entries.len() >= self.max_entries {
            if !inner.evict_oldest() {
                break;
            }
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.stats.memory_bytes += bytes.len() as u64;
        inner.order.insert(seq, *key);
        inner.entries.insert(
            *key,
            MemoryEntry {
                bytes,
                cached_at,
                seq,
            },
        );
        inner.stats.entry_count = inner.entries.len() as u64;
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> PantryResult<bool> {
        Ok(self.inner.lock().await.remove(key).is_some())
    }

    async fn clear(&self) -> PantryResult<u64> {
        let mut inner = self.inner.lock().await;
        let removed = inner.entries.len() as u64;
        inner.entries.clear();
        inner.order.clear();
        inner.stats.entry_count = 0;
        inner.stats.memory_bytes = 0;
        Ok(removed)
    }

    async fn stats(&self) -> PantryResult<CacheStats> {
        Ok(self.inner.lock().await.stats.clone())
    }
}
