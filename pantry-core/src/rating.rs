//! Rating aggregation
//!
//! The average rating is denormalised onto the recipe so that rating
//! threshold queries can read it straight from the store.

use crate::entities::{Recipe, Review};

/// Arithmetic mean of the review ratings, 0.0 for an empty set.
///
/// The result is a plain f64 and is never rounded.
pub fn average_rating(reviews: &[Review]) -> f64 {
    if reviews.is_empty() {
        return 0.0;
    }
    let total: i64 = reviews.iter().map(|r| r.rating as i64).sum();
    total as f64 / reviews.len() as f64
}

/// Return the recipe with its aggregate recomputed from its own reviews.
pub fn recompute(mut recipe: Recipe) -> Recipe {
    recipe.recompute_average_rating();
    recipe
}

impl Recipe {
    /// Recompute `average_rating` in place and return the new value.
    pub fn recompute_average_rating(&mut self) -> f64 {
        self.average_rating = average_rating(&self.reviews);
        self.average_rating
    }
}
