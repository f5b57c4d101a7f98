//! Error types for PANTRY operations

use crate::entities::EntityKind;
use crate::identity::RecipeId;
use thiserror::Error;
use uuid::Uuid;

/// Storage layer errors.
///
/// These are the generic persistence failures. Coordinators propagate them
/// unchanged and never retry.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Entity not found: {entity_kind} with id {id}")]
    NotFound { entity_kind: EntityKind, id: Uuid },

    #[error("Conflict on {entity_kind} with id {id}: {reason}")]
    Conflict {
        entity_kind: EntityKind,
        id: Uuid,
        reason: String,
    },

    #[error("Transaction failed: {reason}")]
    TransactionFailed { reason: String },

    #[error("Storage unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Cache layer errors.
///
/// Only cache backends produce these. The coordination layer recovers from
/// them locally and never hands them to callers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Cache operation {operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("Cache serialization failed: {reason}")]
    Serialization { reason: String },

    #[error("Cache backend error: {reason}")]
    Backend { reason: String },
}

/// Validation errors for recipe and review invariants.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("You have to have at least one ingredient for your recipe!")]
    MissingIngredients,

    #[error("You have to include at least one step for your recipe!")]
    MissingSteps,

    #[error("{field} must have a value")]
    RequiredFieldMissing { field: String },

    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: String,
        value: i64,
        min: i64,
        max: i64,
    },

    #[error("{field} must be at least {min}, got {value}")]
    BelowMinimum { field: String, value: i64, min: i64 },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Telemetry initialisation failed: {reason}")]
    Telemetry { reason: String },
}

/// Master error type for all PANTRY errors.
#[derive(Debug, Clone, Error)]
pub enum PantryError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Absent from both cache and store. `kind` separates missing recipes
    /// from missing reviews; `message` is what the caller sees.
    #[error("{message}")]
    NotFound { kind: EntityKind, message: String },

    #[error("Stop trying to upvote your own recipe! {author} wrote recipe {recipe_id}")]
    SelfReview { author: String, recipe_id: RecipeId },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl PantryError {
    /// Create a not-found error for the given entity kind.
    pub fn not_found(kind: EntityKind, message: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            message: message.into(),
        }
    }

    /// Append a qualifier to a not-found message, leaving other errors alone.
    pub fn with_context(self, qualifier: &str) -> Self {
        match self {
            Self::NotFound { kind, message } => Self::NotFound {
                kind,
                message: format!("{} {}", message, qualifier),
            },
            other => other,
        }
    }

    /// Replace a not-found message with a more helpful one.
    pub fn with_message(self, message: impl Into<String>) -> Self {
        match self {
            Self::NotFound { kind, .. } => Self::NotFound {
                kind,
                message: message.into(),
            },
            other => other,
        }
    }

    /// Returns true for not-found errors of the given kind.
    pub fn is_not_found(&self, expected: EntityKind) -> bool {
        matches!(self, Self::NotFound { kind, .. } if *kind == expected)
    }

    /// Returns true for validation-class errors, including self-review.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::SelfReview { .. })
    }
}

/// Result type alias for PANTRY operations.
pub type PantryResult<T> = Result<T, PantryError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::EntityIdType;

    #[test]
    fn test_storage_error_display_not_found() {
        let err = StorageError::NotFound {
            entity_kind: EntityKind::Review,
            id: Uuid::nil(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Entity not found"));
        assert!(msg.contains("review"));
        assert!(msg.contains("00000000-0000-0000-0000-000000000000"));
    }

    #[test]
    fn test_validation_error_display_out_of_range() {
        let err = ValidationError::OutOfRange {
            field: "difficulty_rating".to_string(),
            value: 11,
            min: 0,
            max: 10,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("difficulty_rating"));
        assert!(msg.contains("between 0 and 10"));
        assert!(msg.contains("11"));
    }

    #[test]
    fn test_not_found_with_context_appends_qualifier() {
        let err = PantryError::not_found(EntityKind::Recipe, "No recipe with ID 7 could be found.")
            .with_context("Could not delete.");
        assert!(err.is_not_found(EntityKind::Recipe));
        assert_eq!(
            err.to_string(),
            "No recipe with ID 7 could be found. Could not delete."
        );
    }

    #[test]
    fn test_with_message_keeps_kind_and_ignores_other_errors() {
        let err = PantryError::not_found(EntityKind::Review, "missing").with_message("try POST");
        assert!(err.is_not_found(EntityKind::Review));
        assert!(!err.is_not_found(EntityKind::Recipe));
        assert_eq!(err.to_string(), "try POST");

        let storage = PantryError::from(StorageError::LockPoisoned).with_context("ignored");
        assert!(matches!(storage, PantryError::Storage(StorageError::LockPoisoned)));
    }

    #[test]
    fn test_self_review_is_validation_class() {
        let err = PantryError::SelfReview {
            author: "user1".to_string(),
            recipe_id: RecipeId::nil(),
        };
        assert!(err.is_validation());
        assert!(err.to_string().contains("upvote your own recipe"));
        assert!(!PantryError::from(StorageError::LockPoisoned).is_validation());
    }

    #[test]
    fn test_pantry_error_from_variants() {
        let storage = PantryError::from(StorageError::LockPoisoned);
        assert!(matches!(storage, PantryError::Storage(_)));

        let validation = PantryError::from(ValidationError::MissingSteps);
        assert!(matches!(validation, PantryError::Validation(_)));

        let cache = PantryError::from(CacheError::Unavailable {
            reason: "down".to_string(),
        });
        assert!(matches!(cache, PantryError::Cache(_)));

        let config = PantryError::from(ConfigError::MissingRequired {
            field: "location_base_url".to_string(),
        });
        assert!(matches!(config, PantryError::Config(_)));
    }
}
