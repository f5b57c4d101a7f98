//! PANTRY Test Utilities
//!
//! Shared test infrastructure for the PANTRY workspace:
//! - Proptest generators for recipes, reviews and rating sets
//! - Fixtures mirroring the seed data of the recipe service
//! - Fault-injecting store and cache wrappers
//! - Custom assertions for PANTRY errors

pub use pantry_storage::{
    CacheBackend, CacheKey, CacheStats, CachedBytes, InMemoryCacheBackend, LmdbCacheBackend,
    MemoryStore, RecipeStore, ReviewStore,
};

pub use pantry_core::{
    average_rating, CacheError, ConfigError, EntityIdType, EntityKind, Ingredient,
    IngredientId, PantryConfig, PantryError, PantryResult, Recipe, RecipeId, Review, ReviewId,
    Step, StepId, StorageError, ValidationError,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;
use tokio::sync::oneshot;

// ============================================================================
// TEST TRACING
// ============================================================================

static TRACING: Once = Once::new();

/// Install a test-writer subscriber once per test binary.
///
/// Honours `RUST_LOG`, defaulting to `warn` so cache fallbacks show up in
/// failing test output.
pub fn init_test_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

// ============================================================================
// FAULT INJECTION
// ============================================================================

/// How a [`FailingCacheBackend`] misbehaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheFailure {
    /// Every call returns `CacheError::Unavailable`.
    Error,
    /// Every call sleeps for the given duration before answering like an
    /// empty cache.
    Stall(Duration),
}

/// Cache backend that never works.
#[derive(Debug)]
pub struct FailingCacheBackend {
    failure: CacheFailure,
    calls: AtomicUsize,
}

impl FailingCacheBackend {
    pub fn new(failure: CacheFailure) -> Self {
        Self {
            failure,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn erroring() -> Self {
        Self::new(CacheFailure::Error)
    }

    pub fn stalling(delay: Duration) -> Self {
        Self::new(CacheFailure::Stall(delay))
    }

    /// Number of backend calls attempted so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn misbehave<T>(&self, fallback: T) -> PantryResult<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.failure {
            CacheFailure::Error => Err(PantryError::Cache(CacheError::Unavailable {
                reason: "injected cache failure".to_string(),
            })),
            CacheFailure::Stall(delay) => {
                tokio::time::sleep(delay).await;
                Ok(fallback)
            }
        }
    }
}

#[async_trait]
impl CacheBackend for FailingCacheBackend {
    async fn get(&self, _key: &CacheKey) -> PantryResult<Option<CachedBytes>> {
        self.misbehave(None).await
    }

    async fn put(&self, _key: &CacheKey, _bytes: Vec<u8>, _cached_at: DateTime<Utc>) -> PantryResult<()> {
        self.misbehave(()).await
    }

    async fn delete(&self, _key: &CacheKey) -> PantryResult<bool> {
        self.misbehave(false).await
    }

    async fn clear(&self) -> PantryResult<u64> {
        self.misbehave(0).await
    }

    async fn stats(&self) -> PantryResult<CacheStats> {
        self.misbehave(CacheStats::default()).await
    }
}

type ReadGate = (oneshot::Sender<()>, oneshot::Receiver<()>);

/// [`MemoryStore`] wrapper that can be told to fail recipe saves, counts
/// every mutation and can hold one recipe read open.
#[derive(Debug, Clone, Default)]
pub struct FlakyRecipeStore {
    inner: MemoryStore,
    fail_recipe_saves: Arc<AtomicBool>,
    writes: Arc<AtomicUsize>,
    read_gate: Arc<Mutex<Option<ReadGate>>>,
}

/// A recipe read held open after it took its snapshot.
#[derive(Debug)]
pub struct ReadPause {
    paused: oneshot::Receiver<()>,
    release: oneshot::Sender<()>,
}

impl ReadPause {
    /// Resolves once the read has its snapshot and is waiting.
    pub async fn reached(&mut self) {
        let _ = (&mut self.paused).await;
    }

    /// Let the read return its snapshot.
    pub fn release(self) {
        let _ = self.release.send(());
    }
}

impl FlakyRecipeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `recipe_save` calls fail with `TransactionFailed`.
    pub fn fail_recipe_saves(&self, fail: bool) {
        self.fail_recipe_saves.store(fail, Ordering::SeqCst);
    }

    /// Number of mutation calls that reached the store, failed ones included.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    /// Hold the next `recipe_get` or `recipe_list` after it has read,
    /// until the returned pause is released.
    pub fn pause_next_read(&self) -> ReadPause {
        let (paused_tx, paused) = oneshot::channel();
        let (release, release_rx) = oneshot::channel();
        if let Ok(mut gate) = self.read_gate.lock() {
            *gate = Some((paused_tx, release_rx));
        }
        ReadPause { paused, release }
    }

    fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }

    fn fail_if_armed(&self) -> PantryResult<()> {
        if self.fail_recipe_saves.load(Ordering::SeqCst) {
            return Err(StorageError::TransactionFailed {
                reason: "injected failure".to_string(),
            }
            .into());
        }
        Ok(())
    }

    async fn hold_read(&self) {
        let gate = self.read_gate.lock().ok().and_then(|mut gate| gate.take());
        if let Some((paused, release)) = gate {
            let _ = paused.send(());
            let _ = release.await;
        }
    }
}

#[async_trait]
impl RecipeStore for FlakyRecipeStore {
    async fn recipe_save(&self, recipe: &Recipe) -> PantryResult<Recipe> {
        self.record_write();
        self.fail_if_armed()?;
        self.inner.recipe_save(recipe).await
    }

    async fn recipe_insert(&self, recipe: &Recipe) -> PantryResult<Recipe> {
        self.record_write();
        self.fail_if_armed()?;
        self.inner.recipe_insert(recipe).await
    }

    async fn recipe_get(&self, id: RecipeId) -> PantryResult<Option<Recipe>> {
        let found = self.inner.recipe_get(id).await;
        self.hold_read().await;
        found
    }

    async fn recipe_list(&self) -> PantryResult<Vec<Recipe>> {
        let found = self.inner.recipe_list().await;
        self.hold_read().await;
        found
    }

    async fn recipe_delete(&self, id: RecipeId) -> PantryResult<Option<Recipe>> {
        self.record_write();
        self.inner.recipe_delete(id).await
    }

    async fn recipe_find_by_name(&self, fragment: &str) -> PantryResult<Vec<Recipe>> {
        self.inner.recipe_find_by_name(fragment).await
    }

    async fn recipe_find_by_name_and_max_difficulty(
        &self,
        fragment: &str,
        max_difficulty: i32,
    ) -> PantryResult<Vec<Recipe>> {
        self.inner
            .recipe_find_by_name_and_max_difficulty(fragment, max_difficulty)
            .await
    }

    async fn recipe_find_by_rating_greater_than(&self, min_rating: f64) -> PantryResult<Vec<Recipe>> {
        self.inner.recipe_find_by_rating_greater_than(min_rating).await
    }

    async fn recipe_find_by_author(&self, username: &str) -> PantryResult<Vec<Recipe>> {
        self.inner.recipe_find_by_author(username).await
    }

    async fn recipe_find_by_review(&self, review_id: ReviewId) -> PantryResult<Option<Recipe>> {
        self.inner.recipe_find_by_review(review_id).await
    }
}

#[async_trait]
impl ReviewStore for FlakyRecipeStore {
    async fn review_save(&self, recipe_id: RecipeId, review: &Review) -> PantryResult<Review> {
        self.record_write();
        self.inner.review_save(recipe_id, review).await
    }

    async fn review_get(&self, id: ReviewId) -> PantryResult<Option<Review>> {
        self.inner.review_get(id).await
    }

    async fn review_delete(&self, id: ReviewId) -> PantryResult<Option<Review>> {
        self.record_write();
        self.inner.review_delete(id).await
    }

    async fn review_find_by_author(&self, username: &str) -> PantryResult<Vec<Review>> {
        self.inner.review_find_by_author(username).await
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for PANTRY entities.

    use super::*;
    use proptest::prelude::*;

    /// Non-blank lowercase text.
    pub fn arb_text() -> impl Strategy<Value = String> {
        "[a-z]{1,12}( [a-z]{1,12}){0,2}"
    }

    /// Recipe author usernames. Never contain `_`.
    pub fn arb_recipe_author() -> impl Strategy<Value = String> {
        "[a-z]{3,10}"
    }

    /// Reviewer usernames. Always contain `_`, so they never match a
    /// generated recipe author.
    pub fn arb_reviewer() -> impl Strategy<Value = String> {
        "reviewer_[a-z0-9]{1,6}"
    }

    pub fn arb_rating() -> impl Strategy<Value = i32> {
        1..=10i32
    }

    /// Possibly empty set of valid ratings.
    pub fn arb_rating_set() -> impl Strategy<Value = Vec<i32>> {
        prop::collection::vec(arb_rating(), 0..16)
    }

    pub fn arb_ingredient() -> impl Strategy<Value = Ingredient> {
        (arb_text(), "[1-9] (cups|bags|grams|bars)", prop::option::of("dry|wet")).prop_map(
            |(name, amount, state)| {
                let ingredient = Ingredient::new(name, amount);
                match state {
                    Some(state) => ingredient.with_state(state),
                    None => ingredient,
                }
            },
        )
    }

    pub fn arb_step() -> impl Strategy<Value = Step> {
        (1..20i32, arb_text()).prop_map(|(n, description)| Step::new(n, description))
    }

    /// Recipe that passes validation, without reviews.
    pub fn arb_valid_recipe() -> impl Strategy<Value = Recipe> {
        (
            arb_text(),
            arb_recipe_author(),
            0..600i32,
            0..=10i32,
            prop::collection::vec(arb_ingredient(), 1..5),
            prop::collection::vec(arb_step(), 1..5),
        )
            .prop_map(|(name, author, minutes, difficulty, ingredients, steps)| {
                let mut recipe = Recipe::new(name, author, minutes, difficulty);
                recipe.ingredients = ingredients;
                recipe.steps = steps;
                recipe
            })
    }

    /// Review that passes validation, written by a non-author.
    pub fn arb_review() -> impl Strategy<Value = Review> {
        (arb_reviewer(), arb_text(), arb_rating())
            .prop_map(|(author, description, rating)| Review::new(author, description, rating))
    }

    /// Ratings outside 1..=10.
    pub fn arb_invalid_rating() -> impl Strategy<Value = i32> {
        prop_oneof![i32::MIN..1, 11..=i32::MAX]
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Recipes and reviews mirroring the service's seed data.

    use super::*;

    /// "test recipe" by user2, difficulty 10.
    pub fn test_recipe() -> Recipe {
        Recipe::new("test recipe", "user2", 2, 10)
            .with_ingredient(Ingredient::new("flour", "2 cups").with_state("dry"))
            .with_step(Step::new(1, "put flour in bowl"))
            .with_step(Step::new(2, "eat it?"))
    }

    /// "another test recipe" by user1, difficulty 10.
    pub fn another_test_recipe() -> Recipe {
        Recipe::new("another test recipe", "user1", 2, 10)
            .with_ingredient(Ingredient::new("test ing", "1").with_state("dry"))
            .with_step(Step::new(1, "test"))
    }

    /// "another another test recipe" by user2, difficulty 5.
    pub fn another_another_test_recipe() -> Recipe {
        Recipe::new("another another test recipe", "user2", 2, 5)
            .with_ingredient(Ingredient::new("test ing 2", "2").with_state("wet"))
            .with_step(Step::new(1, "test 2"))
    }

    /// "chocolate and potato chips" by user1, difficulty 10.
    pub fn chocolate_and_potato_chips() -> Recipe {
        Recipe::new("chocolate and potato chips", "user1", 1, 10)
            .with_ingredient(Ingredient::new("potato chips", "1 bag"))
            .with_ingredient(Ingredient::new("chocolate", "1 bar"))
            .with_step(Step::new(1, "eat both items together"))
    }

    /// The four seed recipes.
    pub fn seed_recipes() -> Vec<Recipe> {
        vec![
            test_recipe(),
            another_test_recipe(),
            another_another_test_recipe(),
            chocolate_and_potato_chips(),
        ]
    }

    pub fn review(author: &str, rating: i32) -> Review {
        Review::new(author, format!("rated {} by {}", rating, author), rating)
    }

    /// user1's review of `test_recipe`.
    pub fn tasted_pretty_bad() -> Review {
        Review::new("user1", "tasted pretty bad", 2)
    }

    /// user2's review of `chocolate_and_potato_chips`.
    pub fn so_good() -> Review {
        Review::new("user2", "this stuff is so good", 10)
    }

    /// Configuration with a short cache timeout for fault tests.
    pub fn fast_timeout_config() -> PantryConfig {
        PantryConfig::default().with_cache_operation_timeout(Duration::from_millis(20))
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for PANTRY results.

    use super::*;

    #[track_caller]
    pub fn assert_ok<T: std::fmt::Debug>(result: &PantryResult<T>) {
        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result);
    }

    /// Assert a NotFound error of the given kind.
    #[track_caller]
    pub fn assert_not_found<T: std::fmt::Debug>(result: &PantryResult<T>, kind: EntityKind) {
        match result {
            Err(err) if err.is_not_found(kind) => {}
            other => panic!("Expected NotFound({}), got: {:?}", kind, other),
        }
    }

    /// Assert a NotFound error of the given kind with an exact message.
    #[track_caller]
    pub fn assert_not_found_message<T: std::fmt::Debug>(
        result: &PantryResult<T>,
        kind: EntityKind,
        message: &str,
    ) {
        assert_not_found(result, kind);
        if let Err(err) = result {
            assert_eq!(err.to_string(), message);
        }
    }

    #[track_caller]
    pub fn assert_validation<T: std::fmt::Debug>(result: &PantryResult<T>) {
        match result {
            Err(PantryError::Validation(_)) => {}
            other => panic!("Expected Validation error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_self_review<T: std::fmt::Debug>(result: &PantryResult<T>) {
        match result {
            Err(PantryError::SelfReview { .. }) => {}
            other => panic!("Expected SelfReview error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_storage_error<T: std::fmt::Debug>(result: &PantryResult<T>) {
        match result {
            Err(PantryError::Storage(_)) => {}
            other => panic!("Expected Storage error, got: {:?}", other),
        }
    }

    /// Assert a recipe's stored aggregate matches its review set.
    #[track_caller]
    pub fn assert_rating_consistent(recipe: &Recipe) {
        let expected = average_rating(&recipe.reviews);
        assert!(
            (recipe.average_rating - expected).abs() < 1e-9,
            "average_rating {} does not match reviews mean {}",
            recipe.average_rating,
            expected
        );
    }
}
