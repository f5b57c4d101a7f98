//! Persistent cache backend over LMDB (heed).
//!
//! Entries outlive the process, so a restarted service starts warm. Each
//! call runs in its own LMDB transaction; `get` only opens a read
//! transaction.

use std::path::Path;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use pantry_core::{CacheError, PantryError, PantryResult};

use super::key::CacheKey;
use super::traits::{CacheBackend, CacheStats, CachedBytes};

/// Error type for LMDB cache operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbCacheError {
    #[error("LMDB environment could not be opened: {0}")]
    EnvOpen(String),

    #[error("LMDB database could not be created: {0}")]
    DbOpen(String),

    #[error("LMDB transaction failed: {0}")]
    Transaction(String),

    /// The stored entry is not `[timestamp][payload]`.
    #[error("Malformed cache entry: {0}")]
    Deserialization(String),

    #[error("Cache directory error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbCacheError> for PantryError {
    fn from(e: LmdbCacheError) -> Self {
        match e {
            LmdbCacheError::Deserialization(reason) => {
                PantryError::Cache(CacheError::Serialization { reason })
            }
            other => PantryError::Cache(CacheError::Backend {
                reason: other.to_string(),
            }),
        }
    }
}

/// Entry layout: [timestamp millis: 8 bytes LE][value bytes]
const TIMESTAMP_LEN: usize = 8;

fn encode_entry(bytes: &[u8], cached_at: DateTime<Utc>) -> Vec<u8> {
    let mut full = Vec::with_capacity(TIMESTAMP_LEN + bytes.len());
    full.extend_from_slice(&cached_at.timestamp_millis().to_le_bytes());
    full.extend_from_slice(bytes);
    full
}

fn decode_entry(raw: &[u8]) -> Result<CachedBytes, LmdbCacheError> {
    if raw.len() < TIMESTAMP_LEN {
        return Err(LmdbCacheError::Deserialization(format!(
            "entry too short: {} bytes",
            raw.len()
        )));
    }
    let timestamp_bytes: [u8; TIMESTAMP_LEN] = raw[..TIMESTAMP_LEN]
        .try_into()
        .map_err(|_| LmdbCacheError::Deserialization("Invalid timestamp".into()))?;
    let cached_at = DateTime::from_timestamp_millis(i64::from_le_bytes(timestamp_bytes))
        .ok_or_else(|| LmdbCacheError::Deserialization("timestamp out of range".into()))?;
    Ok(CachedBytes {
        bytes: raw[TIMESTAMP_LEN..].to_vec(),
        cached_at,
    })
}

/// Cache backend storing one LMDB record per [`CacheKey`].
///
/// # Example
///
/// ```ignore
/// use pantry_storage::cache::{CacheBackend, CacheKey, LmdbCacheBackend};
///
/// let backend = LmdbCacheBackend::new("/tmp/pantry-cache", 100)?;
/// backend.put(&CacheKey::recipe(recipe.recipe_id), bytes, Utc::now()).await?;
/// let cached = backend.get(&CacheKey::recipe(recipe.recipe_id)).await?;
/// ```
pub struct LmdbCacheBackend {
    env: Env,
    db: Database<Bytes, Bytes>,
    stats: RwLock<CacheStats>,
}

impl LmdbCacheBackend {
    /// Open (or create) the cache under `path`, with a map of `max_size_mb`
    /// megabytes. Entries already on disk are kept.
    pub fn new<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbCacheError> {
        std::fs::create_dir_all(&path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbCacheError::EnvOpen(e.to_string()))?;

        let mut wtxn = env
            .write_txn()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbCacheError::DbOpen(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        // Entries written by an earlier process count towards the total.
        let existing = {
            let rtxn = env
                .read_txn()
                .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;
            db.len(&rtxn)
                .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?
        };

        Ok(Self {
            env,
            db,
            stats: RwLock::new(CacheStats {
                entry_count: existing,
                ..Default::default()
            }),
        })
    }

    fn record<F: FnOnce(&mut CacheStats)>(&self, update: F) {
        if let Ok(mut stats) = self.stats.write() {
            update(&mut stats);
        }
    }
}

#[async_trait]
impl CacheBackend for LmdbCacheBackend {
    async fn get(&self, key: &CacheKey) -> PantryResult<Option<CachedBytes>> {
        let encoded_key = key.encode();

        let rtxn = self
            .env
            .read_txn()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        match self.db.get(&rtxn, &encoded_key) {
            Ok(Some(raw)) => {
                self.record(|s| s.hits += 1);
                Ok(Some(decode_entry(raw)?))
            }
            Ok(None) => {
                self.record(|s| s.misses += 1);
                Ok(None)
            }
            Err(e) => {
                self.record(|s| s.misses += 1);
                Err(LmdbCacheError::Transaction(e.to_string()).into())
            }
        }
    }

    async fn put(
        &self,
        key: &CacheKey,
        bytes: Vec<u8>,
        cached_at: DateTime<Utc>,
    ) -> PantryResult<()> {
        let encoded_key = key.encode();
        let full_bytes = encode_entry(&bytes, cached_at);

        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        let is_new = self
            .db
            .get(&wtxn, &encoded_key)
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?
            .is_none();

        self.db
            .put(&mut wtxn, &encoded_key, &full_bytes)
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        self.record(|s| {
            if is_new {
                s.entry_count += 1;
            }
            s.memory_bytes += full_bytes.len() as u64;
        });
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> PantryResult<bool> {
        let encoded_key = key.encode();

        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        let deleted = self
            .db
            .delete(&mut wtxn, &encoded_key)
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        if deleted {
            self.record(|s| s.entry_count = s.entry_count.saturating_sub(1));
        }
        Ok(deleted)
    }

    async fn clear(&self) -> PantryResult<u64> {
        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        let removed = self
            .db
            .len(&wtxn)
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;
        self.db
            .clear(&mut wtxn)
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        self.record(|s| {
            s.entry_count = 0;
            s.memory_bytes = 0;
        });
        Ok(removed)
    }

    async fn stats(&self) -> PantryResult<CacheStats> {
        Ok(self
            .stats
            .read()
            .map(|s| s.clone())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pantry_core::{EntityIdType, RecipeId, ReviewId};
    use tempfile::TempDir;

    fn create_test_backend() -> (LmdbCacheBackend, TempDir) {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let backend =
            LmdbCacheBackend::new(temp_dir.path(), 10).expect("backend creation should succeed");
        (backend, temp_dir)
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let (backend, _temp_dir) = create_test_backend();
        let key = CacheKey::recipe(RecipeId::now_v7());
        let cached_at = Utc::now();

        backend
            .put(&key, b"{\"name\":\"soup\"}".to_vec(), cached_at)
            .await
            .expect("put should succeed");

        let cached = backend
            .get(&key)
            .await
            .expect("get should succeed")
            .expect("cached should be Some");
        assert_eq!(cached.bytes, b"{\"name\":\"soup\"}");
        // Millisecond precision
        assert!((cached_at - cached.cached_at).num_milliseconds().abs() < 1);
    }

    #[tokio::test]
    async fn test_get_nonexistent() {
        let (backend, _temp_dir) = create_test_backend();
        let cached = backend
            .get(&CacheKey::review(ReviewId::now_v7()))
            .await
            .expect("get should succeed");
        assert!(cached.is_none());
    }

    #[tokio::test]
    async fn test_delete() {
        let (backend, _temp_dir) = create_test_backend();
        let key = CacheKey::all_recipes();

        backend
            .put(&key, b"[]".to_vec(), Utc::now())
            .await
            .expect("put should succeed");
        assert!(backend.delete(&key).await.expect("delete should succeed"));
        assert!(!backend.delete(&key).await.expect("delete should succeed"));
        assert!(backend
            .get(&key)
            .await
            .expect("get should succeed")
            .is_none());
    }

    #[tokio::test]
    async fn test_overwrite() {
        let (backend, _temp_dir) = create_test_backend();
        let key = CacheKey::recipe(RecipeId::now_v7());

        backend.put(&key, b"old".to_vec(), Utc::now()).await.unwrap();
        backend.put(&key, b"new".to_vec(), Utc::now()).await.unwrap();

        let cached = backend.get(&key).await.unwrap().unwrap();
        assert_eq!(cached.bytes, b"new");
        assert_eq!(backend.stats().await.unwrap().entry_count, 1);
    }

    #[tokio::test]
    async fn test_clear() {
        let (backend, _temp_dir) = create_test_backend();
        for _ in 0..3 {
            backend
                .put(&CacheKey::recipe(RecipeId::now_v7()), b"x".to_vec(), Utc::now())
                .await
                .unwrap();
        }

        assert_eq!(backend.clear().await.unwrap(), 3);
        assert_eq!(backend.stats().await.unwrap().entry_count, 0);
    }

    #[tokio::test]
    async fn test_stats() {
        let (backend, _temp_dir) = create_test_backend();
        let key = CacheKey::recipe(RecipeId::now_v7());

        let _ = backend.get(&key).await;
        backend.put(&key, b"x".to_vec(), Utc::now()).await.unwrap();
        let _ = backend.get(&key).await;
        let _ = backend.get(&key).await;

        let stats = backend.stats().await.expect("stats should succeed");
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.entry_count, 1);
    }

    #[tokio::test]
    async fn test_entries_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let key = CacheKey::recipe(RecipeId::now_v7());
        {
            let backend = LmdbCacheBackend::new(temp_dir.path(), 10).unwrap();
            backend.put(&key, b"kept".to_vec(), Utc::now()).await.unwrap();
        }

        let reopened = LmdbCacheBackend::new(temp_dir.path(), 10).unwrap();
        assert_eq!(reopened.stats().await.unwrap().entry_count, 1);
        assert_eq!(reopened.get(&key).await.unwrap().unwrap().bytes, b"kept");
    }

    #[test]
    fn test_short_entry_is_rejected() {
        assert!(decode_entry(&[1, 2, 3]).is_err());
        let err: PantryError = LmdbCacheError::Deserialization("bad".into()).into();
        assert!(matches!(
            err,
            PantryError::Cache(CacheError::Serialization { .. })
        ));
    }
}
