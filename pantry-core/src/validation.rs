//! Domain validators
//!
//! Pure, synchronous checks run before every create and every update. They
//! never touch storage or the cache, and a record that validated once is
//! validated again after each mutation.

use crate::entities::{Ingredient, Recipe, Review, Step};
use crate::error::ValidationError;

/// Lowest accepted recipe difficulty.
pub const MIN_DIFFICULTY: i32 = 0;
/// Highest accepted recipe difficulty.
pub const MAX_DIFFICULTY: i32 = 10;
/// Lowest accepted review rating.
pub const MIN_RATING: i32 = 1;
/// Highest accepted review rating.
pub const MAX_RATING: i32 = 10;

/// Trait for entities with field invariants.
pub trait Validate {
    /// Check every invariant, reporting the first violation.
    fn validate(&self) -> Result<(), ValidationError>;
}

/// Trait for validating non-empty strings.
///
/// # Example
/// ```
/// use pantry_core::validation::ValidateNonEmpty;
///
/// assert!("flour".validate_non_empty("name").is_ok());
/// assert!("   ".validate_non_empty("name").is_err());
/// ```
pub trait ValidateNonEmpty {
    /// Validate that the value is non-empty.
    ///
    /// # Errors
    /// Returns `ValidationError::RequiredFieldMissing` if the value is empty
    /// or whitespace-only.
    fn validate_non_empty(&self, field_name: &str) -> Result<(), ValidationError>;
}

impl ValidateNonEmpty for str {
    fn validate_non_empty(&self, field_name: &str) -> Result<(), ValidationError> {
        if self.trim().is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: field_name.to_string(),
            });
        }
        Ok(())
    }
}

impl ValidateNonEmpty for String {
    fn validate_non_empty(&self, field_name: &str) -> Result<(), ValidationError> {
        self.as_str().validate_non_empty(field_name)
    }
}

impl<T: ValidateNonEmpty> ValidateNonEmpty for Option<T> {
    fn validate_non_empty(&self, field_name: &str) -> Result<(), ValidationError> {
        match self {
            Some(value) => value.validate_non_empty(field_name),
            None => Err(ValidationError::RequiredFieldMissing {
                field: field_name.to_string(),
            }),
        }
    }
}

/// Trait for validating numeric ranges.
pub trait ValidateRange: Sized {
    /// Validate that the value is within an inclusive range.
    fn validate_range(&self, field_name: &str, min: Self, max: Self)
        -> Result<(), ValidationError>;

    /// Validate that the value is at least `min`.
    fn validate_at_least(&self, field_name: &str, min: Self) -> Result<(), ValidationError>;
}

macro_rules! impl_validate_range {
    ($($t:ty),*) => {
        $(
            impl ValidateRange for $t {
                fn validate_range(
                    &self,
                    field_name: &str,
                    min: Self,
                    max: Self,
                ) -> Result<(), ValidationError> {
                    if *self < min || *self > max {
                        return Err(ValidationError::OutOfRange {
                            field: field_name.to_string(),
                            value: *self as i64,
                            min: min as i64,
                            max: max as i64,
                        });
                    }
                    Ok(())
                }

                fn validate_at_least(&self, field_name: &str, min: Self) -> Result<(), ValidationError> {
                    if *self < min {
                        return Err(ValidationError::BelowMinimum {
                            field: field_name.to_string(),
                            value: *self as i64,
                            min: min as i64,
                        });
                    }
                    Ok(())
                }
            }
        )*
    };
}

impl_validate_range!(i32, i64);

impl Validate for Ingredient {
    fn validate(&self) -> Result<(), ValidationError> {
        self.name.validate_non_empty("Ingredient name")?;
        self.amount.validate_non_empty("Ingredient amount")
    }
}

impl Validate for Step {
    fn validate(&self) -> Result<(), ValidationError> {
        self.description.validate_non_empty("Step description")
    }
}

impl Validate for Recipe {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.ingredients.is_empty() {
            return Err(ValidationError::MissingIngredients);
        }
        if self.steps.is_empty() {
            return Err(ValidationError::MissingSteps);
        }
        self.name.validate_non_empty("Name")?;
        self.difficulty_rating
            .validate_range("Difficulty rating", MIN_DIFFICULTY, MAX_DIFFICULTY)?;
        self.minutes_to_make.validate_at_least("Minutes to make", 0)?;

        for ingredient in &self.ingredients {
            ingredient.validate()?;
        }
        for step in &self.steps {
            step.validate()?;
        }
        Ok(())
    }
}

impl Validate for Review {
    fn validate(&self) -> Result<(), ValidationError> {
        self.rating.validate_range("Rating", MIN_RATING, MAX_RATING)?;
        self.author.validate_non_empty("Author")?;
        self.description.validate_non_empty("Description")
    }
}
