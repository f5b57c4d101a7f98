//! PANTRY Storage - Store Traits and Reference Implementation
//!
//! Defines the persistence contract the coordinators run against, an
//! in-memory store implementing it, and the cache layer that sits in front.
//! Production engines implement [`RecipeStore`] and [`ReviewStore`] out of
//! tree.

pub mod cache;

pub use cache::{
    CacheBackend, CacheConfig, CacheKey, CacheRead, CacheStats, CacheableEntity, CachedBytes,
    InMemoryCacheBackend, LmdbCacheBackend, LmdbCacheError, RecordCache, StorageFetcher,
};

use async_trait::async_trait;
use pantry_core::{
    EntityIdType, EntityKind, PantryResult, Recipe, RecipeId, Review, ReviewId, StorageError,
};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

// ============================================================================
// STORE TRAITS
// ============================================================================

/// Persistence contract for recipe aggregates.
///
/// Every mutating method is its own transaction: `Ok` means committed, and
/// an `Err` leaves the store unchanged. A recipe always comes back with its
/// current reviews attached.
#[async_trait]
pub trait RecipeStore: Send + Sync {
    /// Insert or replace a recipe together with its embedded reviews.
    ///
    /// Reviews previously owned by the recipe but absent from `recipe.reviews`
    /// are deleted. Returns the record as persisted.
    async fn recipe_save(&self, recipe: &Recipe) -> PantryResult<Recipe>;

    /// Insert a recipe that must not exist yet.
    ///
    /// The existence check and the write are one transaction: of two inserts
    /// with the same id exactly one succeeds, the other fails with
    /// `StorageError::Conflict`.
    async fn recipe_insert(&self, recipe: &Recipe) -> PantryResult<Recipe>;

    /// Get a recipe by ID.
    async fn recipe_get(&self, id: RecipeId) -> PantryResult<Option<Recipe>>;

    /// List every recipe.
    async fn recipe_list(&self) -> PantryResult<Vec<Recipe>>;

    /// Delete a recipe and cascade to its ingredients, steps and reviews.
    /// Returns the deleted aggregate, or `None` if it did not exist.
    async fn recipe_delete(&self, id: RecipeId) -> PantryResult<Option<Recipe>>;

    /// Recipes whose name contains `fragment`, ignoring case.
    async fn recipe_find_by_name(&self, fragment: &str) -> PantryResult<Vec<Recipe>>;

    /// Recipes matching `fragment` with difficulty at most `max_difficulty`.
    async fn recipe_find_by_name_and_max_difficulty(
        &self,
        fragment: &str,
        max_difficulty: i32,
    ) -> PantryResult<Vec<Recipe>>;

    /// Recipes whose persisted average rating is strictly above `min_rating`.
    async fn recipe_find_by_rating_greater_than(&self, min_rating: f64) -> PantryResult<Vec<Recipe>>;

    /// Recipes written by `username`.
    async fn recipe_find_by_author(&self, username: &str) -> PantryResult<Vec<Recipe>>;

    /// Reverse lookup: the recipe that owns a review.
    async fn recipe_find_by_review(&self, review_id: ReviewId) -> PantryResult<Option<Recipe>>;
}

/// Persistence contract for reviews.
#[async_trait]
pub trait ReviewStore: Send + Sync {
    /// Insert or replace a review owned by `recipe_id`.
    ///
    /// Fails with `StorageError::NotFound` if the recipe does not exist and
    /// with `StorageError::Conflict` if the review belongs to another recipe.
    async fn review_save(&self, recipe_id: RecipeId, review: &Review) -> PantryResult<Review>;

    /// Get a review by ID.
    async fn review_get(&self, id: ReviewId) -> PantryResult<Option<Review>>;

    /// Delete a review. Returns it if it existed.
    async fn review_delete(&self, id: ReviewId) -> PantryResult<Option<Review>>;

    /// Reviews written by `username`.
    async fn review_find_by_author(&self, username: &str) -> PantryResult<Vec<Review>>;
}

// ============================================================================
// MEMORY STORE
// ============================================================================

/// Recipe row with reviews held out-of-line.
#[derive(Debug, Clone)]
struct RecipeRow {
    recipe: Recipe,
    review_ids: Vec<ReviewId>,
}

/// Review row joined to its recipe by id.
#[derive(Debug, Clone)]
struct ReviewRow {
    recipe_id: RecipeId,
    review: Review,
}

#[derive(Debug, Default)]
struct Tables {
    recipes: HashMap<RecipeId, RecipeRow>,
    reviews: HashMap<ReviewId, ReviewRow>,
}

impl Tables {
    /// Insert or replace a recipe row, cascading its reviews.
    fn save_recipe(&mut self, recipe: &Recipe) -> PantryResult<Recipe> {
        for review in &recipe.reviews {
            if let Some(existing) = self.reviews.get(&review.review_id) {
                if existing.recipe_id != recipe.recipe_id {
                    return Err(StorageError::Conflict {
                        entity_kind: EntityKind::Review,
                        id: review.review_id.as_uuid(),
                        reason: format!("review belongs to recipe {}", existing.recipe_id),
                    }
                    .into());
                }
            }
        }

        let previous: Vec<ReviewId> = self
            .recipes
            .get(&recipe.recipe_id)
            .map(|row| row.review_ids.clone())
            .unwrap_or_default();
        for stale in previous
            .iter()
            .filter(|id| recipe.review(**id).is_none())
        {
            self.reviews.remove(stale);
        }

        for review in &recipe.reviews {
            self.reviews.insert(
                review.review_id,
                ReviewRow {
                    recipe_id: recipe.recipe_id,
                    review: review.clone(),
                },
            );
        }

        let mut stored = recipe.clone();
        stored.location = None;
        stored.reviews = Vec::new();
        let row = RecipeRow {
            recipe: stored,
            review_ids: recipe.reviews.iter().map(|r| r.review_id).collect(),
        };
        let persisted = self.assemble(&row);
        self.recipes.insert(recipe.recipe_id, row);
        Ok(persisted)
    }

    fn assemble(&self, row: &RecipeRow) -> Recipe {
        let mut recipe = row.recipe.clone();
        recipe.reviews = row
            .review_ids
            .iter()
            .filter_map(|id| self.reviews.get(id))
            .map(|r| r.review.clone())
            .collect();
        recipe
    }

    fn select<F>(&self, predicate: F) -> Vec<Recipe>
    where
        F: Fn(&Recipe) -> bool,
    {
        let mut found: Vec<Recipe> = self
            .recipes
            .values()
            .filter(|row| predicate(&row.recipe))
            .map(|row| self.assemble(row))
            .collect();
        found.sort_by_key(|r| r.recipe_id);
        found
    }
}

/// In-memory store implementing both store traits.
///
/// Both tables sit behind one lock so a cascading save or delete commits
/// atomically. Cloning shares the underlying tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> PantryResult<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| StorageError::LockPoisoned.into())
    }

    fn write(&self) -> PantryResult<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| StorageError::LockPoisoned.into())
    }

    /// Clear all stored data.
    pub fn clear(&self) -> PantryResult<()> {
        let mut tables = self.write()?;
        tables.recipes.clear();
        tables.reviews.clear();
        Ok(())
    }

    /// Get count of stored recipes.
    pub fn recipe_count(&self) -> PantryResult<usize> {
        Ok(self.read()?.recipes.len())
    }

    /// Get count of stored reviews.
    pub fn review_count(&self) -> PantryResult<usize> {
        Ok(self.read()?.reviews.len())
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

#[async_trait]
impl RecipeStore for MemoryStore {
    async fn recipe_save(&self, recipe: &Recipe) -> PantryResult<Recipe> {
        self.write()?.save_recipe(recipe)
    }

    async fn recipe_insert(&self, recipe: &Recipe) -> PantryResult<Recipe> {
        let mut tables = self.write()?;
        if tables.recipes.contains_key(&recipe.recipe_id) {
            return Err(StorageError::Conflict {
                entity_kind: EntityKind::Recipe,
                id: recipe.recipe_id.as_uuid(),
                reason: "a recipe with this ID already exists".to_string(),
            }
            .into());
        }
        tables.save_recipe(recipe)
    }

    async fn recipe_get(&self, id: RecipeId) -> PantryResult<Option<Recipe>> {
        let tables = self.read()?;
        Ok(tables.recipes.get(&id).map(|row| tables.assemble(row)))
    }

    async fn recipe_list(&self) -> PantryResult<Vec<Recipe>> {
        Ok(self.read()?.select(|_| true))
    }

    async fn recipe_delete(&self, id: RecipeId) -> PantryResult<Option<Recipe>> {
        let mut tables = self.write()?;
        let Some(row) = tables.recipes.get(&id).cloned() else {
            return Ok(None);
        };
        let deleted = tables.assemble(&row);
        for review_id in &row.review_ids {
            tables.reviews.remove(review_id);
        }
        tables.recipes.remove(&id);
        Ok(Some(deleted))
    }

    async fn recipe_find_by_name(&self, fragment: &str) -> PantryResult<Vec<Recipe>> {
        Ok(self
            .read()?
            .select(|r| contains_ignore_case(&r.name, fragment)))
    }

    async fn recipe_find_by_name_and_max_difficulty(
        &self,
        fragment: &str,
        max_difficulty: i32,
    ) -> PantryResult<Vec<Recipe>> {
        Ok(self.read()?.select(|r| {
            contains_ignore_case(&r.name, fragment) && r.difficulty_rating <= max_difficulty
        }))
    }

    async fn recipe_find_by_rating_greater_than(&self, min_rating: f64) -> PantryResult<Vec<Recipe>> {
        Ok(self.read()?.select(|r| r.average_rating > min_rating))
    }

    async fn recipe_find_by_author(&self, username: &str) -> PantryResult<Vec<Recipe>> {
        Ok(self.read()?.select(|r| r.author == username))
    }

    async fn recipe_find_by_review(&self, review_id: ReviewId) -> PantryResult<Option<Recipe>> {
        let tables = self.read()?;
        Ok(tables
            .reviews
            .get(&review_id)
            .and_then(|r| tables.recipes.get(&r.recipe_id))
            .map(|row| tables.assemble(row)))
    }
}

#[async_trait]
impl ReviewStore for MemoryStore {
    async fn review_save(&self, recipe_id: RecipeId, review: &Review) -> PantryResult<Review> {
        let mut tables = self.write()?;

        if !tables.recipes.contains_key(&recipe_id) {
            return Err(StorageError::NotFound {
                entity_kind: EntityKind::Recipe,
                id: recipe_id.as_uuid(),
            }
            .into());
        }
        if let Some(existing) = tables.reviews.get(&review.review_id) {
            if existing.recipe_id != recipe_id {
                return Err(StorageError::Conflict {
                    entity_kind: EntityKind::Review,
                    id: review.review_id.as_uuid(),
                    reason: format!("review belongs to recipe {}", existing.recipe_id),
                }
                .into());
            }
        }

        let is_new = tables
            .reviews
            .insert(
                review.review_id,
                ReviewRow {
                    recipe_id,
                    review: review.clone(),
                },
            )
            .is_none();
        if is_new {
            if let Some(row) = tables.recipes.get_mut(&recipe_id) {
                row.review_ids.push(review.review_id);
            }
        }
        Ok(review.clone())
    }

    async fn review_get(&self, id: ReviewId) -> PantryResult<Option<Review>> {
        Ok(self.read()?.reviews.get(&id).map(|r| r.review.clone()))
    }

    async fn review_delete(&self, id: ReviewId) -> PantryResult<Option<Review>> {
        let mut tables = self.write()?;
        let Some(removed) = tables.reviews.remove(&id) else {
            return Ok(None);
        };
        if let Some(row) = tables.recipes.get_mut(&removed.recipe_id) {
            row.review_ids.retain(|r| *r != id);
        }
        Ok(Some(removed.review))
    }

    async fn review_find_by_author(&self, username: &str) -> PantryResult<Vec<Review>> {
        let tables = self.read()?;
        let mut found: Vec<Review> = tables
            .reviews
            .values()
            .filter(|r| r.review.author == username)
            .map(|r| r.review.clone())
            .collect();
        found.sort_by_key(|r| r.review_id);
        Ok(found)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pantry_core::{Ingredient, PantryError, Step};

    fn make_recipe(name: &str, author: &str, difficulty: i32) -> Recipe {
        Recipe::new(name, author, 5, difficulty)
            .with_ingredient(Ingredient::new("flour", "2 cups"))
            .with_step(Step::new(1, "mix"))
    }

    #[tokio::test]
    async fn test_recipe_save_get() {
        let store = MemoryStore::new();
        let recipe = make_recipe("bread", "baker", 3);

        let saved = store.recipe_save(&recipe).await.unwrap();
        assert_eq!(saved, recipe);

        let retrieved = store.recipe_get(recipe.recipe_id).await.unwrap();
        assert_eq!(retrieved, Some(recipe));
        assert_eq!(store.recipe_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_recipe_insert_rejects_existing_id() {
        let store = MemoryStore::new();
        let recipe = make_recipe("bread", "baker", 3);
        store.recipe_insert(&recipe).await.unwrap();

        let mut renamed = recipe.clone();
        renamed.name = "rye".to_string();
        let err = store.recipe_insert(&renamed).await.unwrap_err();
        assert!(matches!(
            err,
            PantryError::Storage(StorageError::Conflict {
                entity_kind: EntityKind::Recipe,
                ..
            })
        ));
        let stored = store.recipe_get(recipe.recipe_id).await.unwrap().unwrap();
        assert_eq!(stored.name, "bread");
        assert_eq!(store.recipe_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_recipe_save_drops_location() {
        let store = MemoryStore::new();
        let mut recipe = make_recipe("bread", "baker", 3);
        recipe.location = Some("/recipes/x".to_string());

        let saved = store.recipe_save(&recipe).await.unwrap();
        assert_eq!(saved.location, None);
    }

    #[tokio::test]
    async fn test_recipe_save_cascades_reviews() {
        let store = MemoryStore::new();
        let mut recipe = make_recipe("bread", "baker", 3);
        let keep = Review::new("critic", "nice", 8);
        let drop = Review::new("other", "meh", 3);
        recipe.reviews = vec![keep.clone(), drop.clone()];
        store.recipe_save(&recipe).await.unwrap();
        assert_eq!(store.review_count().unwrap(), 2);

        recipe.reviews = vec![keep.clone()];
        let saved = store.recipe_save(&recipe).await.unwrap();
        assert_eq!(saved.reviews, vec![keep.clone()]);
        assert!(store.review_get(drop.review_id).await.unwrap().is_none());
        assert_eq!(store.review_get(keep.review_id).await.unwrap(), Some(keep));
    }

    #[tokio::test]
    async fn test_review_owned_by_other_recipe_conflicts() {
        let store = MemoryStore::new();
        let mut first = make_recipe("bread", "baker", 3);
        let review = Review::new("critic", "nice", 8);
        first.reviews.push(review.clone());
        store.recipe_save(&first).await.unwrap();

        let mut second = make_recipe("cake", "baker", 4);
        second.reviews.push(review.clone());
        let err = store.recipe_save(&second).await.unwrap_err();
        assert!(matches!(
            err,
            PantryError::Storage(StorageError::Conflict { .. })
        ));
        assert!(store.recipe_get(second.recipe_id).await.unwrap().is_none());

        let err = store
            .review_save(second.recipe_id, &review)
            .await
            .unwrap_err();
        assert!(matches!(err, PantryError::Storage(StorageError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_recipe_delete_cascades() {
        let store = MemoryStore::new();
        let mut recipe = make_recipe("bread", "baker", 3);
        recipe.reviews.push(Review::new("critic", "nice", 8));
        store.recipe_save(&recipe).await.unwrap();

        let deleted = store.recipe_delete(recipe.recipe_id).await.unwrap().unwrap();
        assert_eq!(deleted.reviews.len(), 1);
        assert_eq!(store.recipe_count().unwrap(), 0);
        assert_eq!(store.review_count().unwrap(), 0);
        assert!(store.recipe_delete(recipe.recipe_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_review_save_get_delete() {
        let store = MemoryStore::new();
        let recipe = make_recipe("bread", "baker", 3);
        store.recipe_save(&recipe).await.unwrap();

        let mut review = Review::new("critic", "nice", 8);
        store.review_save(recipe.recipe_id, &review).await.unwrap();
        review.rating = 2;
        store.review_save(recipe.recipe_id, &review).await.unwrap();

        let parent = store.recipe_get(recipe.recipe_id).await.unwrap().unwrap();
        assert_eq!(parent.reviews, vec![review.clone()]);

        let owner = store.recipe_find_by_review(review.review_id).await.unwrap();
        assert_eq!(owner.map(|r| r.recipe_id), Some(recipe.recipe_id));

        let removed = store.review_delete(review.review_id).await.unwrap();
        assert_eq!(removed, Some(review.clone()));
        let parent = store.recipe_get(recipe.recipe_id).await.unwrap().unwrap();
        assert!(parent.reviews.is_empty());
        assert!(store.recipe_find_by_review(review.review_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_by_name_ignores_case() {
        let store = MemoryStore::new();
        store.recipe_save(&make_recipe("Potato Soup", "a", 2)).await.unwrap();
        store.recipe_save(&make_recipe("tomato soup", "b", 7)).await.unwrap();
        store.recipe_save(&make_recipe("bread", "c", 1)).await.unwrap();

        let found = store.recipe_find_by_name("SOUP").await.unwrap();
        assert_eq!(found.len(), 2);

        let easy = store
            .recipe_find_by_name_and_max_difficulty("soup", 5)
            .await
            .unwrap();
        assert_eq!(easy.len(), 1);
        assert_eq!(easy[0].name, "Potato Soup");
    }

    #[tokio::test]
    async fn test_find_by_rating_and_author() {
        let store = MemoryStore::new();
        let mut rated = make_recipe("bread", "baker", 3);
        rated.reviews.push(Review::new("critic", "great", 9));
        rated.recompute_average_rating();
        store.recipe_save(&rated).await.unwrap();
        store.recipe_save(&make_recipe("cake", "baker", 3)).await.unwrap();
        store.recipe_save(&make_recipe("pie", "other", 3)).await.unwrap();

        let above = store.recipe_find_by_rating_greater_than(8.0).await.unwrap();
        assert_eq!(above.len(), 1);
        assert_eq!(above[0].recipe_id, rated.recipe_id);
        assert!(store
            .recipe_find_by_rating_greater_than(9.0)
            .await
            .unwrap()
            .is_empty());

        assert_eq!(store.recipe_find_by_author("baker").await.unwrap().len(), 2);
        assert!(store.recipe_find_by_author("Baker").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_review_find_by_author() {
        let store = MemoryStore::new();
        let mut recipe = make_recipe("bread", "baker", 3);
        recipe.reviews.push(Review::new("critic", "nice", 8));
        recipe.reviews.push(Review::new("critic", "again", 6));
        recipe.reviews.push(Review::new("someone", "hm", 4));
        store.recipe_save(&recipe).await.unwrap();

        let by_critic = store.review_find_by_author("critic").await.unwrap();
        assert_eq!(by_critic.len(), 2);
        assert!(store.review_find_by_author("nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clear() {
        let store = MemoryStore::new();
        store.recipe_save(&make_recipe("bread", "baker", 3)).await.unwrap();
        store.clear().unwrap();
        assert_eq!(store.recipe_count().unwrap(), 0);
    }
}
