// entity_index.rs - Generational id allocator and location table
//
// The table is the sole authority on which handles are alive and where
// their component data lives.

use crate::ecs::storage::ArchetypeIndex;
use crate::ecs::Entity;

/// Physical location of a live entity: archetype, chunk and row.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct EntityLocation {
    pub archetype: ArchetypeIndex,
    pub chunk: usize,
    pub index: usize,
}

#[derive(Clone, Debug)]
struct EntityMeta {
    generation: u32,
    location: Option<EntityLocation>,
}

/// Maps entity ids to their current generation and location.
///
/// Slot 0 is reserved so that no live entity ever has id 0. Generations
/// start at 1 and are bumped on destroy, skipping 0 when they wrap.
pub struct EntityIndex {
    metas: Vec<EntityMeta>,
    free: Vec<u32>,
    live: usize,
}

impl EntityIndex {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let mut metas = Vec::with_capacity(capacity + 1);
        metas.push(EntityMeta {
            generation: 0,
            location: None,
        });
        Self {
            metas,
            free: Vec::new(),
            live: 0,
        }
    }

    /// Allocate an id for an entity stored at `location`.
    ///
    /// Recently freed ids are reused first; a reused id carries the
    /// generation it was bumped to when it was destroyed.
    pub fn create(&mut self, location: EntityLocation) -> Entity {
        self.live += 1;
        if let Some(id) = self.free.pop() {
            let meta = &mut self.metas[id as usize];
            meta.location = Some(location);
            return Entity::new(id, meta.generation);
        }

        let id = u32::try_from(self.metas.len()).expect("entity ids exhausted");
        self.metas.push(EntityMeta {
            generation: 1,
            location: Some(location),
        });
        Entity::new(id, 1)
    }

    /// Release `entity`, invalidating every handle to it.
    ///
    /// Returns false if the handle is not alive.
    pub fn destroy(&mut self, entity: Entity) -> bool {
        if !self.is_alive(entity) {
            return false;
        }
        let meta = &mut self.metas[entity.id() as usize];
        meta.generation = meta.generation.wrapping_add(1).max(1);
        meta.location = None;
        self.free.push(entity.id());
        self.live -= 1;
        true
    }

    pub fn is_alive(&self, entity: Entity) -> bool {
        entity.generation() != 0
            && self
                .metas
                .get(entity.id() as usize)
                .is_some_and(|meta| meta.generation == entity.generation() && meta.location.is_some())
    }

    /// Current location of a live entity.
    pub fn location(&self, entity: Entity) -> Option<EntityLocation> {
        if !self.is_alive(entity) {
            return None;
        }
        self.metas[entity.id() as usize].location
    }

    /// Record that the entity with `id` now lives at `location`.
    pub fn update_location(&mut self, id: u32, location: EntityLocation) {
        let meta = &mut self.metas[id as usize];
        debug_assert!(meta.location.is_some(), "relocating a dead entity");
        meta.location = Some(location);
    }

    /// Record a row change within the same archetype (swap-remove fix-up).
    pub fn update_slot(&mut self, id: u32, chunk: usize, index: usize) {
        if let Some(location) = self.metas[id as usize].location.as_mut() {
            location.chunk = chunk;
            location.index = index;
        }
    }

    /// Handle for the entity currently occupying `id`.
    pub fn current(&self, id: u32) -> Entity {
        Entity::new(id, self.metas[id as usize].generation)
    }

    /// Number of live entities.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }
}

impl Default for EntityIndex {
    fn default() -> Self {
        Self::new()
    }
}
