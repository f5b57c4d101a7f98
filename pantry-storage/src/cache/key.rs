//! Cache keys for recipe and review entries.
//!
//! Entity entries are addressed as `recipe:{id}` and `review:{id}`. The list
//! of all recipes lives in a single unkeyed slot, `recipes:all`, which is
//! invalidated on every recipe mutation rather than patched.

use pantry_core::{EntityIdType, EntityKind, RecipeId, ReviewId};
use std::fmt;
use uuid::Uuid;

/// Tag byte that marks a list slot instead of an entity entry.
const LIST_TAG: u8 = 0xFF;

/// Address of a cache entry.
///
/// # Binary Format
///
/// Entity keys encode to 17 bytes: the entity kind byte followed by the
/// 16 UUID bytes. List slots encode to 2 bytes: `0xFF` followed by the kind
/// byte of the listed entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// A single entity entry.
    Entity { kind: EntityKind, id: Uuid },
    /// The slot holding every recipe.
    AllRecipes,
}

impl CacheKey {
    pub fn entity(kind: EntityKind, id: Uuid) -> Self {
        Self::Entity { kind, id }
    }

    pub fn recipe(id: RecipeId) -> Self {
        Self::entity(EntityKind::Recipe, id.as_uuid())
    }

    pub fn review(id: ReviewId) -> Self {
        Self::entity(EntityKind::Review, id.as_uuid())
    }

    pub fn all_recipes() -> Self {
        Self::AllRecipes
    }

    /// Entity kind stored under this key.
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Entity { kind, .. } => *kind,
            Self::AllRecipes => EntityKind::Recipe,
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Self::AllRecipes)
    }

    /// Encode this key for byte-oriented backends.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::Entity { kind, id } => {
                let mut bytes = Vec::with_capacity(17);
                bytes.push(kind_to_byte(*kind));
                bytes.extend_from_slice(id.as_bytes());
                bytes
            }
            Self::AllRecipes => vec![LIST_TAG, kind_to_byte(EntityKind::Recipe)],
        }
    }

    /// Decode a key from bytes. Returns `None` for anything malformed.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        match bytes {
            [LIST_TAG, kind] if byte_to_kind(*kind)? == EntityKind::Recipe => {
                Some(Self::AllRecipes)
            }
            [kind, rest @ ..] if rest.len() == 16 => {
                let kind = byte_to_kind(*kind)?;
                let id = Uuid::from_slice(rest).ok()?;
                Some(Self::Entity { kind, id })
            }
            _ => None,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entity { kind, id } => write!(f, "{}:{}", kind, id),
            Self::AllRecipes => f.write_str("recipes:all"),
        }
    }
}

fn kind_to_byte(kind: EntityKind) -> u8 {
    match kind {
        EntityKind::Recipe => 1,
        EntityKind::Review => 2,
        EntityKind::Ingredient => 3,
        EntityKind::Step => 4,
    }
}

fn byte_to_kind(byte: u8) -> Option<EntityKind> {
    match byte {
        1 => Some(EntityKind::Recipe),
        2 => Some(EntityKind::Review),
        3 => Some(EntityKind::Ingredient),
        4 => Some(EntityKind::Step),
        _ => None,
    }
}
