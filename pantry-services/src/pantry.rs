//! Service assembly.

use std::sync::Arc;

use pantry_core::{LocationBuilder, PantryConfig, PantryResult};
use pantry_storage::{
    CacheBackend, CacheConfig, InMemoryCacheBackend, MemoryStore, RecipeStore, RecordCache,
    ReviewStore,
};
use tracing::info;

use crate::locks::RecipeLocks;
use crate::recipe::RecipeCoordinator;
use crate::review::ReviewCoordinator;

/// Both coordinators wired to one store, one cache and one lock registry.
pub struct Pantry {
    recipes: Arc<RecipeCoordinator>,
    reviews: ReviewCoordinator,
    cache: RecordCache,
    config: PantryConfig,
}

impl Pantry {
    /// Assemble from explicit parts. `cache_backend` is ignored when the
    /// configuration disables caching.
    pub fn new(
        config: PantryConfig,
        recipe_store: Arc<dyn RecipeStore>,
        review_store: Arc<dyn ReviewStore>,
        cache_backend: Option<Arc<dyn CacheBackend>>,
    ) -> PantryResult<Self> {
        config.validate()?;

        let cache = match cache_backend {
            Some(backend) if config.cache_enabled => {
                RecordCache::new(backend, CacheConfig::from(&config))
            }
            _ => RecordCache::disabled(),
        };

        let recipes = Arc::new(RecipeCoordinator::new(
            recipe_store.clone(),
            cache.clone(),
            LocationBuilder::from(&config),
            RecipeLocks::new(),
        ));
        let reviews =
            ReviewCoordinator::new(review_store, recipe_store, recipes.clone(), cache.clone());

        info!(
            cache_enabled = cache.is_enabled(),
            location_base_url = %config.location_base_url,
            "Pantry assembled"
        );

        Ok(Self {
            recipes,
            reviews,
            cache,
            config,
        })
    }

    /// Assemble over a store implementing both contracts, with a bounded
    /// in-memory cache.
    pub fn with_store<S>(config: PantryConfig, store: Arc<S>) -> PantryResult<Self>
    where
        S: RecipeStore + ReviewStore + 'static,
    {
        let backend: Arc<dyn CacheBackend> =
            Arc::new(InMemoryCacheBackend::new(config.cache_max_entries));
        Self::new(config, store.clone(), store, Some(backend))
    }

    /// Fully in-memory instance.
    pub fn in_memory(config: PantryConfig) -> PantryResult<Self> {
        Self::with_store(config, Arc::new(MemoryStore::new()))
    }

    pub fn recipes(&self) -> &RecipeCoordinator {
        &self.recipes
    }

    pub fn reviews(&self) -> &ReviewCoordinator {
        &self.reviews
    }

    pub fn cache(&self) -> &RecordCache {
        &self.cache
    }

    pub fn config(&self) -> &PantryConfig {
        &self.config
    }
}
