//! PANTRY Core - Entity Types
//!
//! Pure data types and rules with no persistence or cache dependencies.
//! Recipes own their ingredients, steps and reviews; the average rating is a
//! derived field kept consistent by the rating aggregator.

pub mod config;
pub mod entities;
pub mod error;
pub mod identity;
pub mod location;
pub mod rating;
pub mod validation;

pub use config::*;
pub use entities::*;
pub use error::*;
pub use identity::*;
pub use location::LocationBuilder;
pub use rating::{average_rating, recompute};
pub use validation::{Validate, ValidateNonEmpty, ValidateRange};
