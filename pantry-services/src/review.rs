//! Review coordination.
//!
//! Reviews never change on their own. Each mutation takes the owning
//! recipe's lock, edits the recipe's review set and hands the recipe to
//! [`RecipeCoordinator::update`] with [`IdCheck::Skip`], which recomputes
//! and persists the aggregate.

use std::sync::Arc;

use async_trait::async_trait;
use pantry_core::{
    EntityIdType, EntityKind, PantryError, PantryResult, Recipe, RecipeId, Review, ReviewId,
    StorageError, Validate, ValidateNonEmpty,
};
use pantry_storage::{CacheKey, RecipeStore, RecordCache, ReviewStore, StorageFetcher};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::recipe::{recipe_not_found, IdCheck, RecipeCoordinator};

const NO_REVIEWS_FOR_RECIPE: &str = "There are no reviews for this recipe.";
const UPDATE_ID_HINT: &str = "The review you are trying to update does not exist. \
     Maybe you meant to create one? If not, please double check the ID you passed in.";

/// Orchestrates review CRUD and keeps the owning recipe's aggregate in step.
pub struct ReviewCoordinator {
    reviews: Arc<dyn ReviewStore>,
    recipe_store: Arc<dyn RecipeStore>,
    recipes: Arc<RecipeCoordinator>,
    cache: RecordCache,
}

struct ReviewFetcher<'a> {
    store: &'a dyn ReviewStore,
}

#[async_trait]
impl StorageFetcher<Review> for ReviewFetcher<'_> {
    async fn fetch(&self, entity_id: Uuid) -> PantryResult<Option<Review>> {
        self.store.review_get(ReviewId::new(entity_id)).await
    }
}

fn review_not_found(id: ReviewId) -> PantryError {
    PantryError::not_found(
        EntityKind::Review,
        format!("The review with ID {} could not be found.", id),
    )
}

impl ReviewCoordinator {
    pub fn new(
        reviews: Arc<dyn ReviewStore>,
        recipe_store: Arc<dyn RecipeStore>,
        recipes: Arc<RecipeCoordinator>,
        cache: RecordCache,
    ) -> Self {
        Self {
            reviews,
            recipe_store,
            recipes,
            cache,
        }
    }

    /// Get a review, cache first.
    ///
    /// A miss is repopulated under the owning recipe's lock, the same lock
    /// every review mutation holds across its store write and cache write.
    pub async fn get_by_id(&self, id: ReviewId) -> PantryResult<Review> {
        if let Some(read) = self.cache.get::<Review>(&CacheKey::review(id)).await {
            debug!(review_id = %id, cache_hit = true, "Review resolved");
            return Ok(read.into_value());
        }

        let owner_id = self.owner_of(id).await?.ok_or_else(|| review_not_found(id))?;
        let _guard = self.recipes.locks().lock(owner_id).await;
        let fetcher = ReviewFetcher {
            store: self.reviews.as_ref(),
        };
        let read = self
            .cache
            .read_through::<Review, _>(id.as_uuid(), &fetcher)
            .await?
            .ok_or_else(|| review_not_found(id))?;

        debug!(review_id = %id, cache_hit = read.was_cache_hit(), "Review resolved");
        Ok(read.into_value())
    }

    /// Reviews attached to a recipe.
    pub async fn get_by_recipe(&self, recipe_id: RecipeId) -> PantryResult<Vec<Review>> {
        let recipe = self.recipes.get_by_id(recipe_id).await?;
        if recipe.reviews.is_empty() {
            return Err(PantryError::not_found(
                EntityKind::Review,
                NO_REVIEWS_FOR_RECIPE,
            ));
        }
        Ok(recipe.reviews)
    }

    /// Reviews written by `username`.
    pub async fn get_by_author(&self, username: &str) -> PantryResult<Vec<Review>> {
        let found = self.reviews.review_find_by_author(username).await?;
        if found.is_empty() {
            return Err(PantryError::not_found(
                EntityKind::Review,
                format!("No reviews could be found for username {}.", username),
            ));
        }
        Ok(found)
    }

    /// Attach a new review to a recipe and return the updated recipe.
    pub async fn create(&self, review: Review, recipe_id: RecipeId) -> PantryResult<Recipe> {
        let _guard = self.recipes.locks().lock(recipe_id).await;

        let mut recipe = self
            .recipe_store
            .recipe_get(recipe_id)
            .await?
            .ok_or_else(|| recipe_not_found(recipe_id))?;

        // A blank author would otherwise match a blank recipe author.
        review.author.validate_non_empty("Author")?;
        if recipe.is_authored_by(&review.author) {
            return Err(PantryError::SelfReview {
                author: review.author,
                recipe_id,
            });
        }
        review.validate()?;

        if self.reviews.review_get(review.review_id).await?.is_some() {
            return Err(StorageError::Conflict {
                entity_kind: EntityKind::Review,
                id: review.review_id.as_uuid(),
                reason: "a review with this ID already exists".to_string(),
            }
            .into());
        }

        let review_id = review.review_id;
        recipe.reviews.push(review.clone());
        recipe.recompute_average_rating();

        let updated = self.sync_aggregate(recipe, review_id).await?;
        self.cache.put(&review).await;

        info!(
            review_id = %review_id,
            recipe_id = %recipe_id,
            rating = review.rating,
            "Review created"
        );
        Ok(updated)
    }

    /// Remove a review and return it.
    pub async fn delete(&self, id: ReviewId) -> PantryResult<Review> {
        self.get_by_id(id).await?;
        let owner_id = self.owner_of(id).await?.ok_or_else(|| review_not_found(id))?;

        let _guard = self.recipes.locks().lock(owner_id).await;
        let mut owner = self
            .locked_owner(owner_id, id)
            .await?
            .ok_or_else(|| review_not_found(id))?;

        let deleted = self
            .reviews
            .review_delete(id)
            .await?
            .ok_or_else(|| review_not_found(id))?;

        owner.remove_review(id);
        self.sync_aggregate(owner, id).await?;
        self.cache.invalidate(&CacheKey::review(id)).await;

        info!(review_id = %id, recipe_id = %owner_id, "Review deleted");
        Ok(deleted)
    }

    /// Replace an existing review and return the stored version.
    pub async fn update(&self, review: Review) -> PantryResult<Review> {
        let id = review.review_id;
        self.get_by_id(id)
            .await
            .map_err(|e| e.with_message(UPDATE_ID_HINT))?;
        review.validate()?;

        let owner_id = self
            .owner_of(id)
            .await?
            .ok_or_else(|| review_not_found(id).with_message(UPDATE_ID_HINT))?;

        let _guard = self.recipes.locks().lock(owner_id).await;
        let mut owner = self
            .locked_owner(owner_id, id)
            .await?
            .ok_or_else(|| review_not_found(id).with_message(UPDATE_ID_HINT))?;

        if owner.is_authored_by(&review.author) {
            return Err(PantryError::SelfReview {
                author: review.author,
                recipe_id: owner_id,
            });
        }

        let saved = match self.reviews.review_save(owner_id, &review).await {
            Ok(saved) => saved,
            Err(e) => {
                self.cache.invalidate(&CacheKey::review(id)).await;
                return Err(e);
            }
        };

        owner.replace_review(saved.clone());
        self.sync_aggregate(owner, id).await?;
        self.cache.put(&saved).await;

        info!(review_id = %id, recipe_id = %owner_id, rating = saved.rating, "Review updated");
        Ok(saved)
    }

    async fn owner_of(&self, id: ReviewId) -> PantryResult<Option<RecipeId>> {
        Ok(self
            .recipe_store
            .recipe_find_by_review(id)
            .await?
            .map(|recipe| recipe.recipe_id))
    }

    /// Re-read the owner under its lock. `None` when the recipe or the
    /// review went away while waiting.
    async fn locked_owner(
        &self,
        owner_id: RecipeId,
        review_id: ReviewId,
    ) -> PantryResult<Option<Recipe>> {
        let owner = self.recipe_store.recipe_get(owner_id).await?;
        Ok(owner.filter(|recipe| recipe.review(review_id).is_some()))
    }

    /// Persist the recomputed aggregate. A failure leaves no cached copy of
    /// the review behind.
    async fn sync_aggregate(&self, recipe: Recipe, review_id: ReviewId) -> PantryResult<Recipe> {
        match self.recipes.update(recipe, IdCheck::Skip).await {
            Ok(updated) => Ok(updated),
            Err(e) => {
                warn!(review_id = %review_id, error = %e, "Aggregate persist failed after review write");
                self.cache.invalidate(&CacheKey::review(review_id)).await;
                Err(e)
            }
        }
    }
}
