//! Per-recipe ordering locks.
//!
//! Every mutation of a recipe aggregate runs while holding that recipe's
//! lock: create, external update and delete, plus the review mutations.
//! The review write and the aggregate write of one mutation are never
//! interleaved with another mutation of the same recipe in this process.
//! Reads served from the cache take no lock; a read that repopulates the
//! cache from the store takes it.

use std::sync::Arc;

use dashmap::DashMap;
use pantry_core::RecipeId;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Held for the duration of one aggregate mutation.
pub type RecipeGuard = OwnedMutexGuard<()>;

/// Registry of per-recipe mutexes.
#[derive(Debug, Clone, Default)]
pub struct RecipeLocks {
    locks: Arc<DashMap<RecipeId, Arc<Mutex<()>>>>,
}

impl RecipeLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to a recipe.
    pub async fn lock(&self, recipe_id: RecipeId) -> RecipeGuard {
        // The map shard must be released before awaiting the mutex.
        let mutex = self.locks.entry(recipe_id).or_default().clone();
        mutex.lock_owned().await
    }

    /// Drop the mutex of a deleted recipe if nobody else holds or awaits it.
    pub fn forget(&self, recipe_id: RecipeId) {
        self.locks
            .remove_if(&recipe_id, |_, mutex| Arc::strong_count(mutex) == 1);
    }

    /// Number of recipes with a registered mutex.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
