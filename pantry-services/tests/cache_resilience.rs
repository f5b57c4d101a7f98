//! The cache is never load-bearing: broken or slow backends degrade to the
//! store, and failed aggregate writes leave nothing stale behind.

use std::sync::Arc;
use std::time::Duration;

use pantry_services::{IdCheck, Pantry};
use pantry_test_utils::assertions::*;
use pantry_test_utils::{
    fixtures, init_test_tracing, CacheBackend, CacheKey, EntityKind, FailingCacheBackend,
    FlakyRecipeStore, InMemoryCacheBackend, LmdbCacheBackend, PantryConfig, RecipeStore,
    ReviewStore,
};

fn pantry_with_backend(
    config: PantryConfig,
    backend: Arc<dyn CacheBackend>,
) -> (Pantry, Arc<FlakyRecipeStore>) {
    init_test_tracing();
    let store = Arc::new(FlakyRecipeStore::new());
    let pantry = Pantry::new(config, store.clone(), store.clone(), Some(backend)).unwrap();
    (pantry, store)
}

async fn full_round_trip(pantry: &Pantry) {
    let recipe = pantry
        .recipes()
        .create(fixtures::test_recipe())
        .await
        .unwrap();
    assert_eq!(
        pantry.recipes().get_by_id(recipe.recipe_id).await.unwrap().name,
        "test recipe"
    );
    assert_eq!(pantry.recipes().get_all().await.unwrap().len(), 1);

    let review = fixtures::tasted_pretty_bad();
    let review_id = review.review_id;
    let updated = pantry
        .reviews()
        .create(review, recipe.recipe_id)
        .await
        .unwrap();
    assert_eq!(updated.average_rating, 2.0);
    assert_eq!(pantry.reviews().get_by_id(review_id).await.unwrap().rating, 2);

    pantry.reviews().delete(review_id).await.unwrap();
    let deleted = pantry.recipes().delete(recipe.recipe_id).await.unwrap();
    assert!(deleted.reviews.is_empty());
    assert_not_found(&pantry.recipes().get_all().await, EntityKind::Recipe);
}

#[tokio::test]
async fn test_erroring_cache_never_fails_operations() {
    let backend = Arc::new(FailingCacheBackend::erroring());
    let (pantry, _) = pantry_with_backend(PantryConfig::default(), backend.clone());

    full_round_trip(&pantry).await;
    assert!(backend.calls() > 0);
    assert!(pantry.cache().stats().await.is_none());
}

#[tokio::test]
async fn test_stalled_cache_is_bounded_by_timeout() {
    let backend = Arc::new(FailingCacheBackend::stalling(Duration::from_secs(5)));
    let (pantry, _) = pantry_with_backend(fixtures::fast_timeout_config(), backend.clone());

    let finished = tokio::time::timeout(Duration::from_secs(4), full_round_trip(&pantry)).await;
    assert!(finished.is_ok(), "stalled cache blocked an operation");
    assert!(backend.calls() > 0);
}

#[tokio::test]
async fn test_disabled_cache_runs_against_store() {
    let backend = Arc::new(InMemoryCacheBackend::new(16));
    let (pantry, _) = pantry_with_backend(
        PantryConfig::default().with_cache_enabled(false),
        backend.clone(),
    );

    full_round_trip(&pantry).await;
    assert_eq!(backend.stats().await.unwrap().entry_count, 0);
}

#[tokio::test]
async fn test_lmdb_cache_serves_full_round_trip() {
    let dir = tempfile::TempDir::new().unwrap();
    let backend = Arc::new(LmdbCacheBackend::new(dir.path(), 10).unwrap());
    let (pantry, _) = pantry_with_backend(PantryConfig::default(), backend.clone());

    full_round_trip(&pantry).await;
    let stats = backend.stats().await.unwrap();
    assert!(stats.hits > 0);
    assert_eq!(stats.entry_count, 0);
}

#[tokio::test]
async fn test_failed_review_create_leaves_no_cache_entry() {
    let backend = Arc::new(InMemoryCacheBackend::new(64));
    let (pantry, store) = pantry_with_backend(PantryConfig::default(), backend.clone());

    let recipe = pantry
        .recipes()
        .create(fixtures::test_recipe())
        .await
        .unwrap();
    pantry.recipes().get_all().await.unwrap();
    assert!(backend.get(&CacheKey::recipe(recipe.recipe_id)).await.unwrap().is_some());

    store.fail_recipe_saves(true);
    let review = fixtures::tasted_pretty_bad();
    let review_id = review.review_id;
    let result = pantry.reviews().create(review, recipe.recipe_id).await;
    assert_storage_error(&result);

    assert!(backend.get(&CacheKey::recipe(recipe.recipe_id)).await.unwrap().is_none());
    assert!(backend.get(&CacheKey::all_recipes()).await.unwrap().is_none());
    assert!(backend.get(&CacheKey::review(review_id)).await.unwrap().is_none());
    assert!(store.review_get(review_id).await.unwrap().is_none());

    store.fail_recipe_saves(false);
    let fresh = pantry.recipes().get_by_id(recipe.recipe_id).await.unwrap();
    assert!(fresh.reviews.is_empty());
    assert_rating_consistent(&fresh);
}

#[tokio::test]
async fn test_failed_review_update_evicts_review_and_recipe() {
    let backend = Arc::new(InMemoryCacheBackend::new(64));
    let (pantry, store) = pantry_with_backend(PantryConfig::default(), backend.clone());

    let recipe = pantry
        .recipes()
        .create(fixtures::test_recipe())
        .await
        .unwrap();
    let review = fixtures::tasted_pretty_bad();
    pantry
        .reviews()
        .create(review.clone(), recipe.recipe_id)
        .await
        .unwrap();
    assert!(backend.get(&CacheKey::review(review.review_id)).await.unwrap().is_some());

    store.fail_recipe_saves(true);
    let mut edited = review.clone();
    edited.rating = 9;
    assert_storage_error(&pantry.reviews().update(edited).await);

    assert!(backend.get(&CacheKey::review(review.review_id)).await.unwrap().is_none());
    assert!(backend.get(&CacheKey::recipe(recipe.recipe_id)).await.unwrap().is_none());
}

#[tokio::test]
async fn test_failed_recipe_update_evicts_recipe() {
    let backend = Arc::new(InMemoryCacheBackend::new(64));
    let (pantry, store) = pantry_with_backend(PantryConfig::default(), backend.clone());

    let recipe = pantry
        .recipes()
        .create(fixtures::test_recipe())
        .await
        .unwrap();
    pantry.recipes().get_by_id(recipe.recipe_id).await.unwrap();

    store.fail_recipe_saves(true);
    let mut edit = recipe.clone();
    edit.name = "renamed".to_string();
    assert_storage_error(&pantry.recipes().update(edit, IdCheck::Required).await);

    assert!(backend.get(&CacheKey::recipe(recipe.recipe_id)).await.unwrap().is_none());
    let stored = store.recipe_get(recipe.recipe_id).await.unwrap().unwrap();
    assert_eq!(stored.name, "test recipe");
}

#[tokio::test]
async fn test_expired_entries_fall_back_to_store() {
    let backend = Arc::new(InMemoryCacheBackend::new(64));
    let (pantry, _) = pantry_with_backend(
        PantryConfig::default().with_cache_entry_ttl(Duration::from_millis(10)),
        backend.clone(),
    );

    let recipe = pantry
        .recipes()
        .create(fixtures::test_recipe())
        .await
        .unwrap();
    let key = CacheKey::recipe(recipe.recipe_id);
    let written = backend.get(&key).await.unwrap().unwrap().cached_at;
    tokio::time::sleep(Duration::from_millis(30)).await;

    let fetched = pantry.recipes().get_by_id(recipe.recipe_id).await.unwrap();
    assert_eq!(fetched, recipe);

    let rewritten = backend.get(&key).await.unwrap().unwrap().cached_at;
    assert!(rewritten > written);
}
