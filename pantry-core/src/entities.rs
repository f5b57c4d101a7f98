//! Core entity structures

use crate::identity::{EntityIdType, IngredientId, RecipeId, ReviewId, StepId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Entity kind discriminator, used for cache keys and error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum EntityKind {
    Recipe,
    Review,
    Ingredient,
    Step,
}

impl EntityKind {
    /// Lowercase name used in cache keys and log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Recipe => "recipe",
            EntityKind::Review => "review",
            EntityKind::Ingredient => "ingredient",
            EntityKind::Step => "step",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ingredient - a named, measured input to a recipe.
/// Owned exclusively by its recipe and deleted with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Ingredient {
    pub ingredient_id: IngredientId,
    pub name: String,
    /// Free-text quantity, e.g. "2 cups".
    pub amount: String,
    /// Optional physical state tag, e.g. "dry" or "wet".
    pub state: Option<String>,
}

impl Ingredient {
    pub fn new(name: impl Into<String>, amount: impl Into<String>) -> Self {
        Self {
            ingredient_id: IngredientId::now_v7(),
            name: name.into(),
            amount: amount.into(),
            state: None,
        }
    }

    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }
}

/// Step - one instruction in a recipe's method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Step {
    pub step_id: StepId,
    /// Ordering hint; not required to be unique.
    pub step_number: i32,
    pub description: String,
}

impl Step {
    pub fn new(step_number: i32, description: impl Into<String>) -> Self {
        Self {
            step_id: StepId::now_v7(),
            step_number,
            description: description.into(),
        }
    }
}

/// Review - a rated opinion on a recipe by someone other than its author.
/// Reviews have no lifecycle of their own; every mutation goes through the
/// owning recipe's aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Review {
    pub review_id: ReviewId,
    /// Username of the reviewing principal.
    pub author: String,
    pub description: String,
    /// Rating between 1 and 10 inclusive.
    pub rating: i32,
}

impl Review {
    pub fn new(author: impl Into<String>, description: impl Into<String>, rating: i32) -> Self {
        Self {
            review_id: ReviewId::now_v7(),
            author: author.into(),
            description: description.into(),
            rating,
        }
    }
}

/// Recipe - the aggregate root.
/// Ingredients, steps and reviews are embedded children. The average rating
/// is derived from the reviews and recomputed on every review mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Recipe {
    pub recipe_id: RecipeId,
    pub name: String,
    /// Username of the principal that created the recipe.
    pub author: String,
    pub minutes_to_make: i32,
    /// Difficulty between 0 and 10 inclusive.
    pub difficulty_rating: i32,
    pub ingredients: Vec<Ingredient>,
    pub steps: Vec<Step>,
    #[serde(default)]
    pub reviews: Vec<Review>,
    /// Mean of the review ratings, 0.0 without reviews. Never client supplied.
    #[serde(default)]
    pub average_rating: f64,
    /// Canonical address handed back to callers. Never persisted.
    #[serde(skip)]
    pub location: Option<String>,
}

impl Recipe {
    pub fn new(
        name: impl Into<String>,
        author: impl Into<String>,
        minutes_to_make: i32,
        difficulty_rating: i32,
    ) -> Self {
        Self {
            recipe_id: RecipeId::now_v7(),
            name: name.into(),
            author: author.into(),
            minutes_to_make,
            difficulty_rating,
            ingredients: Vec::new(),
            steps: Vec::new(),
            reviews: Vec::new(),
            average_rating: 0.0,
            location: None,
        }
    }

    pub fn with_ingredient(mut self, ingredient: Ingredient) -> Self {
        self.ingredients.push(ingredient);
        self
    }

    pub fn with_step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Look up one of this recipe's reviews.
    pub fn review(&self, review_id: ReviewId) -> Option<&Review> {
        self.reviews.iter().find(|r| r.review_id == review_id)
    }

    /// Replace the review with the same id. Returns false when absent.
    pub fn replace_review(&mut self, review: Review) -> bool {
        match self
            .reviews
            .iter_mut()
            .find(|r| r.review_id == review.review_id)
        {
            Some(slot) => {
                *slot = review;
                true
            }
            None => false,
        }
    }

    /// Remove a review, returning it if it belonged to this recipe.
    pub fn remove_review(&mut self, review_id: ReviewId) -> Option<Review> {
        let index = self.reviews.iter().position(|r| r.review_id == review_id)?;
        Some(self.reviews.remove(index))
    }

    /// Whether `username` wrote this recipe. Strict equality, no normalisation.
    pub fn is_authored_by(&self, username: &str) -> bool {
        self.author == username
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_recipe() -> Recipe {
        Recipe::new("test recipe", "user2", 2, 10)
            .with_ingredient(Ingredient::new("flour", "2 cups").with_state("dry"))
            .with_step(Step::new(1, "put flour in bowl"))
            .with_step(Step::new(2, "eat it?"))
    }

    #[test]
    fn test_location_is_not_serialized() {
        let mut recipe = make_recipe();
        recipe.location = Some("/recipes/abc".to_string());

        let json = serde_json::to_value(&recipe).unwrap();
        assert!(json.get("location").is_none());

        let back: Recipe = serde_json::from_value(json).unwrap();
        assert_eq!(back.location, None);
        assert_eq!(back.recipe_id, recipe.recipe_id);
        assert_eq!(back.ingredients, recipe.ingredients);
    }

    #[test]
    fn test_replace_and_remove_review() {
        let mut recipe = make_recipe();
        let review = Review::new("user1", "tasted pretty bad", 2);
        let review_id = review.review_id;
        recipe.reviews.push(review);

        let mut edited = recipe.review(review_id).cloned().unwrap();
        edited.rating = 4;
        assert!(recipe.replace_review(edited));
        assert_eq!(recipe.review(review_id).map(|r| r.rating), Some(4));

        assert!(!recipe.replace_review(Review::new("user1", "other", 5)));

        let removed = recipe.remove_review(review_id).unwrap();
        assert_eq!(removed.review_id, review_id);
        assert!(recipe.reviews.is_empty());
        assert!(recipe.remove_review(review_id).is_none());
    }

    #[test]
    fn test_authorship_is_strict() {
        let recipe = make_recipe();
        assert!(recipe.is_authored_by("user2"));
        assert!(!recipe.is_authored_by("User2"));
        assert!(!recipe.is_authored_by("user"));
    }

    #[test]
    fn test_entity_kind_names() {
        assert_eq!(EntityKind::Recipe.to_string(), "recipe");
        assert_eq!(EntityKind::Review.as_str(), "review");
    }
}
