//! Recipe coordination.
//!
//! Every mutation follows the same order: validate, recompute the rating
//! aggregate, persist, stamp the location, then write the recipe's own cache
//! entry and invalidate the all-recipes slot. Cache writes only ever follow
//! a committed store call.
//!
//! A cache miss is repopulated under the recipe lock, and the all-recipes
//! slot is only refilled when no mutation invalidated it during the listing.
//! A reader can therefore never put back an aggregate older than the one a
//! concurrent mutation just wrote.

use std::sync::Arc;

use async_trait::async_trait;
use pantry_core::{
    EntityIdType, EntityKind, LocationBuilder, PantryError, PantryResult, Recipe, RecipeId,
    Validate,
};
use pantry_storage::{CacheKey, RecipeStore, RecordCache, StorageFetcher};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::locks::RecipeLocks;

const NO_RECIPES: &str = "There are no recipes yet, feel free to add one.";
const NO_NAME_MATCH: &str = "No recipes could be found with that name.";
const NO_CRITERIA_MATCH: &str = "No recipes could be found matching that criteria.";
const COULD_NOT_DELETE: &str = "Could not delete.";
const UPDATE_ID_HINT: &str = "The recipe you passed in did not have an ID found in the database. \
     Double check that it is correct, or maybe you meant to create a recipe instead of updating one.";

/// Whether `update` must first confirm the recipe exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdCheck {
    /// Confirm existence, take the recipe lock and keep the stored reviews.
    Required,
    /// The caller already holds the recipe lock and resolved the recipe.
    Skip,
}

/// Orchestrates recipe CRUD against the store and the cache.
pub struct RecipeCoordinator {
    store: Arc<dyn RecipeStore>,
    cache: RecordCache,
    locations: LocationBuilder,
    locks: RecipeLocks,
    /// Bumped on every invalidation of the all-recipes slot.
    list_epoch: Mutex<u64>,
}

/// Storage fetcher for recipes.
struct RecipeFetcher<'a> {
    store: &'a dyn RecipeStore,
}

#[async_trait]
impl StorageFetcher<Recipe> for RecipeFetcher<'_> {
    async fn fetch(&self, entity_id: Uuid) -> PantryResult<Option<Recipe>> {
        self.store.recipe_get(RecipeId::new(entity_id)).await
    }
}

pub(crate) fn recipe_not_found(id: RecipeId) -> PantryError {
    PantryError::not_found(
        EntityKind::Recipe,
        format!("No recipe with ID {} could be found.", id),
    )
}

impl RecipeCoordinator {
    pub fn new(
        store: Arc<dyn RecipeStore>,
        cache: RecordCache,
        locations: LocationBuilder,
        locks: RecipeLocks,
    ) -> Self {
        Self {
            store,
            cache,
            locations,
            locks,
            list_epoch: Mutex::new(0),
        }
    }

    pub fn locks(&self) -> &RecipeLocks {
        &self.locks
    }

    pub fn cache(&self) -> &RecordCache {
        &self.cache
    }

    fn located(&self, mut recipe: Recipe) -> Recipe {
        self.locations.apply(&mut recipe);
        recipe
    }

    fn located_all(&self, recipes: Vec<Recipe>) -> Vec<Recipe> {
        recipes.into_iter().map(|r| self.located(r)).collect()
    }

    /// Create a new recipe.
    ///
    /// A new recipe starts without reviews; reviews are only attached
    /// through the review operations.
    pub async fn create(&self, mut recipe: Recipe) -> PantryResult<Recipe> {
        recipe.validate()?;
        recipe.reviews.clear();
        recipe.recompute_average_rating();

        let _guard = self.locks.lock(recipe.recipe_id).await;
        let saved = self.store.recipe_insert(&recipe).await?;
        let saved = self.located(saved);
        self.cache.put(&saved).await;
        self.invalidate_list().await;

        info!(recipe_id = %saved.recipe_id, author = %saved.author, "Recipe created");
        Ok(saved)
    }

    /// Get a recipe, cache first.
    pub async fn get_by_id(&self, id: RecipeId) -> PantryResult<Recipe> {
        if let Some(read) = self.cache.get::<Recipe>(&CacheKey::recipe(id)).await {
            debug!(recipe_id = %id, cache_hit = true, "Recipe resolved");
            return Ok(self.located(read.into_value()));
        }

        let guard = self.locks.lock(id).await;
        let result = self.resolve_locked(id).await;
        drop(guard);
        if result.is_err() {
            self.locks.forget(id);
        }
        result
    }

    /// Read-through for callers holding the recipe lock.
    async fn resolve_locked(&self, id: RecipeId) -> PantryResult<Recipe> {
        let fetcher = RecipeFetcher {
            store: self.store.as_ref(),
        };
        let read = self
            .cache
            .read_through::<Recipe, _>(id.as_uuid(), &fetcher)
            .await?
            .ok_or_else(|| recipe_not_found(id))?;

        debug!(recipe_id = %id, cache_hit = read.was_cache_hit(), "Recipe resolved");
        Ok(self.located(read.into_value()))
    }

    /// Every recipe, served from the all-recipes slot when populated.
    pub async fn get_all(&self) -> PantryResult<Vec<Recipe>> {
        if let Some(read) = self.cache.all_recipes().await {
            let recipes = read.into_value();
            if !recipes.is_empty() {
                return Ok(self.located_all(recipes));
            }
        }

        let seen = *self.list_epoch.lock().await;
        let recipes = self.store.recipe_list().await?;
        if recipes.is_empty() {
            return Err(PantryError::not_found(EntityKind::Recipe, NO_RECIPES));
        }

        let epoch = self.list_epoch.lock().await;
        if *epoch == seen {
            self.cache.put_all_recipes(&recipes).await;
        } else {
            debug!("Recipe list changed while listing, slot left empty");
        }
        drop(epoch);
        Ok(self.located_all(recipes))
    }

    async fn invalidate_list(&self) {
        let mut epoch = self.list_epoch.lock().await;
        *epoch += 1;
        self.cache.invalidate_all_recipes().await;
    }

    /// Recipes whose name contains `fragment`, ignoring case.
    pub async fn search_by_name(&self, fragment: &str) -> PantryResult<Vec<Recipe>> {
        let found = self.store.recipe_find_by_name(fragment).await?;
        self.non_empty(found, NO_NAME_MATCH.to_string())
    }

    /// Recipes matching `fragment` with difficulty at most `max_difficulty`.
    pub async fn search_by_name_and_max_difficulty(
        &self,
        fragment: &str,
        max_difficulty: i32,
    ) -> PantryResult<Vec<Recipe>> {
        let found = self
            .store
            .recipe_find_by_name_and_max_difficulty(fragment, max_difficulty)
            .await?;
        self.non_empty(found, NO_CRITERIA_MATCH.to_string())
    }

    /// Recipes whose stored average rating is strictly greater than `min_rating`.
    pub async fn search_by_rating_greater_than(&self, min_rating: f64) -> PantryResult<Vec<Recipe>> {
        let found = self
            .store
            .recipe_find_by_rating_greater_than(min_rating)
            .await?;
        self.non_empty(
            found,
            format!(
                "No recipes could be found with a rating greater than {}.",
                min_rating
            ),
        )
    }

    /// Recipes written by `username`.
    pub async fn search_by_author(&self, username: &str) -> PantryResult<Vec<Recipe>> {
        let found = self.store.recipe_find_by_author(username).await?;
        self.non_empty(
            found,
            format!("No recipes can be found for the user: {}.", username),
        )
    }

    fn non_empty(&self, found: Vec<Recipe>, message: String) -> PantryResult<Vec<Recipe>> {
        if found.is_empty() {
            return Err(PantryError::not_found(EntityKind::Recipe, message));
        }
        Ok(self.located_all(found))
    }

    /// Delete a recipe with its ingredients, steps and reviews.
    pub async fn delete(&self, id: RecipeId) -> PantryResult<Recipe> {
        let guard = self.locks.lock(id).await;
        let result = self.delete_locked(id).await;
        drop(guard);
        self.locks.forget(id);

        let deleted = result?;
        info!(recipe_id = %id, reviews = deleted.reviews.len(), "Recipe deleted");
        Ok(deleted)
    }

    async fn delete_locked(&self, id: RecipeId) -> PantryResult<Recipe> {
        self.resolve_locked(id)
            .await
            .map_err(|e| e.with_context(COULD_NOT_DELETE))?;

        let deleted = self
            .store
            .recipe_delete(id)
            .await?
            .ok_or_else(|| recipe_not_found(id).with_context(COULD_NOT_DELETE))?;

        self.cache.invalidate(&CacheKey::recipe(id)).await;
        self.invalidate_list().await;
        let review_keys: Vec<CacheKey> = deleted
            .reviews
            .iter()
            .map(|r| CacheKey::review(r.review_id))
            .collect();
        self.cache.invalidate_many(&review_keys).await;

        Ok(deleted)
    }

    /// Replace a recipe.
    ///
    /// With [`IdCheck::Required`] the recipe must already exist, and its
    /// stored review set is kept regardless of what the caller passed in.
    pub async fn update(&self, recipe: Recipe, check: IdCheck) -> PantryResult<Recipe> {
        match check {
            IdCheck::Required => {
                let _guard = self.locks.lock(recipe.recipe_id).await;
                let mut recipe = recipe;
                let stored = self
                    .store
                    .recipe_get(recipe.recipe_id)
                    .await?
                    .ok_or_else(|| recipe_not_found(recipe.recipe_id).with_message(UPDATE_ID_HINT))?;
                recipe.reviews = stored.reviews;
                self.persist(recipe).await
            }
            IdCheck::Skip => self.persist(recipe).await,
        }
    }

    async fn persist(&self, mut recipe: Recipe) -> PantryResult<Recipe> {
        recipe.validate()?;
        recipe.recompute_average_rating();

        let id = recipe.recipe_id;
        let saved = match self.store.recipe_save(&recipe).await {
            Ok(saved) => saved,
            Err(e) => {
                warn!(recipe_id = %id, error = %e, "Recipe persist failed, dropping cached copies");
                self.cache.invalidate(&CacheKey::recipe(id)).await;
                self.invalidate_list().await;
                return Err(e);
            }
        };

        let saved = self.located(saved);
        self.cache.put(&saved).await;
        self.invalidate_list().await;

        info!(
            recipe_id = %id,
            average_rating = saved.average_rating,
            reviews = saved.reviews.len(),
            "Recipe updated"
        );
        Ok(saved)
    }
}
