//! Entity handle with generational index
//!
//! Entities are lightweight handles (8 bytes) that reference data in the World.
//! The generation counter prevents use-after-free bugs.

use std::fmt;

/// Entity handle (generation-indexed for safety)
///
/// Format: [32-bit id | 32-bit generation]
/// - Id: Position in the entity location table, starting at 1
/// - Generation: Incremented on entity destruction (prevents use-after-free)
///
/// Id 0 and generation 0 are reserved for [`Entity::INVALID`].
///
/// Example:
/// ```ignore
/// let entity = world.create_entity();
/// world.destroy_entity(entity);
/// assert!(!world.is_alive(entity)); // generation mismatch
/// ```
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Entity {
    id: u32,
    generation: u32,
}

impl Entity {
    /// Handle that never refers to a live entity.
    pub const INVALID: Entity = Entity { id: 0, generation: 0 };

    pub(crate) const fn new(id: u32, generation: u32) -> Self {
        Self { id, generation }
    }

    #[inline]
    pub fn id(&self) -> u32 {
        self.id
    }

    #[inline]
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Pack the handle into one `u64` key (generation high, id low).
    pub fn to_bits(&self) -> u64 {
        ((self.generation as u64) << 32) | (self.id as u64)
    }

    /// Inverse of [`Entity::to_bits`].
    pub fn from_bits(bits: u64) -> Self {
        Self {
            id: bits as u32,
            generation: (bits >> 32) as u32,
        }
    }
}

impl Default for Entity {
    fn default() -> Self {
        Self::INVALID
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({}#{})", self.id, self.generation)
    }
}
