//! Canonical recipe locations

use crate::config::PantryConfig;
use crate::entities::Recipe;
use crate::identity::RecipeId;

/// Builds the address a recipe is reachable under: `{base}/{recipe_id}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationBuilder {
    base: String,
}

impl LocationBuilder {
    pub fn new(base: impl Into<String>) -> Self {
        let base = base.into();
        let base = base.trim_end_matches('/').to_string();
        Self { base }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// Location for a recipe id.
    pub fn locate(&self, recipe_id: RecipeId) -> String {
        format!("{}/{}", self.base, recipe_id)
    }

    /// Stamp the transient location onto a recipe.
    pub fn apply(&self, recipe: &mut Recipe) {
        recipe.location = Some(self.locate(recipe.recipe_id));
    }
}

impl Default for LocationBuilder {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_LOCATION_BASE_URL)
    }
}

impl From<&PantryConfig> for LocationBuilder {
    fn from(config: &PantryConfig) -> Self {
        Self::new(config.location_base_url.clone())
    }
}
