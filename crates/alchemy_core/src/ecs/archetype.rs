// archetype.rs - Archetype identification
//
// An archetype is a unique set of component types. Entities with the
// same component types share the same archetype storage.

use crate::ecs::ComponentTypeId;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Canonical, sorted set of component-type ids.
///
/// The component ids are always stored in sorted order with no duplicates so
/// that two identifiers are equal iff they describe the same set. The hash
/// is computed once at construction.
#[derive(Clone, Debug, Eq)]
pub struct ArchetypeIdentifier {
    components: Box<[ComponentTypeId]>,
    hash: u64,
}

impl ArchetypeIdentifier {
    /// Identifier of the archetype with no components.
    pub fn empty() -> Self {
        Self::from_sorted(Vec::new())
    }

    /// Create an identifier from a list of component ids.
    ///
    /// The input will be sorted and deduplicated.
    pub fn from_components<I>(components: I) -> Self
    where
        I: IntoIterator<Item = ComponentTypeId>,
    {
        let mut comps: Vec<ComponentTypeId> = components.into_iter().collect();
        comps.sort_unstable();
        comps.dedup();
        Self::from_sorted(comps)
    }

    fn from_sorted(comps: Vec<ComponentTypeId>) -> Self {
        debug_assert!(comps.windows(2).all(|w| w[0] < w[1]));
        let hash = hash_components(&comps);
        Self {
            components: comps.into_boxed_slice(),
            hash,
        }
    }

    /// Identifier for this set plus `id`. Returns an equal identifier if
    /// `id` is already present.
    pub fn with(&self, id: ComponentTypeId) -> Self {
        match self.components.binary_search(&id) {
            Ok(_) => self.clone(),
            Err(pos) => {
                let mut comps = Vec::with_capacity(self.components.len() + 1);
                comps.extend_from_slice(&self.components[..pos]);
                comps.push(id);
                comps.extend_from_slice(&self.components[pos..]);
                Self::from_sorted(comps)
            }
        }
    }

    /// Identifier for this set minus `id`. Returns an equal identifier if
    /// `id` is absent.
    pub fn without(&self, id: ComponentTypeId) -> Self {
        match self.components.binary_search(&id) {
            Err(_) => self.clone(),
            Ok(pos) => {
                let mut comps = Vec::with_capacity(self.components.len() - 1);
                comps.extend_from_slice(&self.components[..pos]);
                comps.extend_from_slice(&self.components[pos + 1..]);
                Self::from_sorted(comps)
            }
        }
    }

    /// Check if this archetype contains a specific component.
    #[inline]
    pub fn contains(&self, id: ComponentTypeId) -> bool {
        self.components.binary_search(&id).is_ok()
    }

    /// Sorted component ids.
    #[inline]
    pub fn components(&self) -> &[ComponentTypeId] {
        &self.components
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.components.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

impl PartialEq for ArchetypeIdentifier {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.components == other.components
    }
}

impl Hash for ArchetypeIdentifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

/// Compute a stable hash for a sorted list of component ids.
fn hash_components(comps: &[ComponentTypeId]) -> u64 {
    let mut hasher = DefaultHasher::new();
    for &c in comps {
        c.hash(&mut hasher);
    }
    hasher.finish()
}
