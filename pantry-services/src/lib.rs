//! PANTRY Services - Coordination Layer
//!
//! Keeps each recipe's derived average rating, its store record and its
//! cache entries consistent across every recipe and review mutation.
//!
//! Reads go cache first and fall back to the store. Mutations persist
//! first, then write the mutated entity through to the cache and invalidate
//! list slots. Mutations of one recipe are serialised by [`RecipeLocks`].

pub mod locks;
pub mod pantry;
pub mod recipe;
pub mod review;
pub mod telemetry;

pub use locks::{RecipeGuard, RecipeLocks};
pub use pantry::Pantry;
pub use recipe::{IdCheck, RecipeCoordinator};
pub use review::ReviewCoordinator;
pub use telemetry::{filter_from, init_tracing};
