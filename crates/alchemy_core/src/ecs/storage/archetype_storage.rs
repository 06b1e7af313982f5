// archetype_storage.rs - Chunked SoA storage for one archetype
//
// Every entity of an archetype lives in one of its chunks. Structural
// changes never alter a schema; the entity moves to another archetype.

use crate::ecs::{ArchetypeIdentifier, ComponentType, ComponentTypeId};
use std::collections::HashMap;

use super::chunk::Chunk;

/// Index of an archetype inside its world. Stable for the world's lifetime.
pub type ArchetypeIndex = usize;

/// Storage for all entities of a single archetype.
///
/// Chunks are never dropped once allocated so `(chunk, index)` locations
/// stay meaningful; empty chunks are simply skipped during iteration.
pub struct Archetype {
    identifier: ArchetypeIdentifier,
    component_types: Box<[ComponentType]>,
    slots: HashMap<ComponentTypeId, usize>,
    chunks: Vec<Chunk>,
    chunk_bytes: usize,
    len: usize,
    add_edges: HashMap<ComponentTypeId, ArchetypeIndex>,
    remove_edges: HashMap<ComponentTypeId, ArchetypeIndex>,
}

impl Archetype {
    /// Create storage for `identifier`. `component_types` must be in
    /// identifier order; slot `i` holds `component_types[i]`.
    pub fn new(
        identifier: ArchetypeIdentifier,
        component_types: Vec<ComponentType>,
        chunk_bytes: usize,
    ) -> Self {
        debug_assert!(identifier
            .components()
            .iter()
            .eq(component_types.iter().map(|ty| &ty.id)));

        let slots = component_types
            .iter()
            .enumerate()
            .map(|(slot, ty)| (ty.id, slot))
            .collect();
        let first = Chunk::new(&component_types, chunk_bytes);

        Self {
            identifier,
            component_types: component_types.into_boxed_slice(),
            slots,
            chunks: vec![first],
            chunk_bytes,
            len: 0,
            add_edges: HashMap::new(),
            remove_edges: HashMap::new(),
        }
    }

    #[inline]
    pub fn identifier(&self) -> &ArchetypeIdentifier {
        &self.identifier
    }

    /// Component types in slot order.
    #[inline]
    pub fn component_types(&self) -> &[ComponentType] {
        &self.component_types
    }

    #[inline]
    pub fn slot_of(&self, id: ComponentTypeId) -> Option<usize> {
        self.slots.get(&id).copied()
    }

    #[inline]
    pub fn has_component(&self, id: ComponentTypeId) -> bool {
        self.slots.contains_key(&id)
    }

    /// Number of live entities across all chunks.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn chunk(&self, index: usize) -> &Chunk {
        &self.chunks[index]
    }

    pub fn chunk_mut(&mut self, index: usize) -> &mut Chunk {
        &mut self.chunks[index]
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn chunks_mut(&mut self) -> &mut [Chunk] {
        &mut self.chunks
    }

    pub fn entity_at(&self, chunk: usize, index: usize) -> u32 {
        self.chunks[chunk].entity_at(index)
    }

    /// Allocate a zeroed row for `entity_id` in the first chunk with room,
    /// growing by one chunk when every chunk is full.
    pub fn add_entity(&mut self, entity_id: u32) -> (usize, usize) {
        let chunk = match self.chunks.iter().position(|chunk| !chunk.is_full()) {
            Some(chunk) => chunk,
            None => {
                self.chunks.push(Chunk::new(&self.component_types, self.chunk_bytes));
                self.chunks.len() - 1
            }
        };
        let index = self.chunks[chunk].push(entity_id);
        self.len += 1;
        (chunk, index)
    }

    /// Remove the row at `(chunk, index)`.
    ///
    /// If another entity is moved into the freed row, `on_moved` is called
    /// with `(moved_entity_id, chunk, index)`.
    pub fn remove_entity<F>(&mut self, chunk: usize, index: usize, mut on_moved: F)
    where
        F: FnMut(u32, usize, usize),
    {
        if let Some(moved) = self.chunks[chunk].swap_remove(index) {
            on_moved(moved, chunk, index);
        }
        self.len -= 1;
    }

    /// Move the entity at `(chunk, index)` into `dest`.
    ///
    /// Components present in both schemas are copied, components only in
    /// `dest` are left zeroed, and the rest are dropped. Returns the new
    /// `(chunk, index)` in `dest`.
    pub fn move_entity_to<F>(
        &mut self,
        dest: &mut Archetype,
        chunk: usize,
        index: usize,
        on_moved: F,
    ) -> (usize, usize)
    where
        F: FnMut(u32, usize, usize),
    {
        let entity_id = self.chunks[chunk].entity_at(index);
        let (dest_chunk, dest_index) = dest.add_entity(entity_id);

        for (slot, ty) in self.component_types.iter().enumerate() {
            if let Some(&dest_slot) = dest.slots.get(&ty.id) {
                self.chunks[chunk].copy_component_to(
                    slot,
                    index,
                    &mut dest.chunks[dest_chunk],
                    dest_slot,
                    dest_index,
                );
            }
        }

        self.remove_entity(chunk, index, on_moved);
        (dest_chunk, dest_index)
    }

    /// Overwrite one component of the entity at `(chunk, index)`.
    ///
    /// Returns false if this archetype has no such component.
    pub fn write_component_bytes(
        &self,
        chunk: usize,
        index: usize,
        id: ComponentTypeId,
        bytes: &[u8],
    ) -> bool {
        match self.slot_of(id) {
            Some(slot) => {
                self.chunks[chunk].write_component_bytes(slot, index, bytes);
                true
            }
            None => false,
        }
    }

    #[inline]
    pub fn add_edge(&self, id: ComponentTypeId) -> Option<ArchetypeIndex> {
        self.add_edges.get(&id).copied()
    }

    #[inline]
    pub fn remove_edge(&self, id: ComponentTypeId) -> Option<ArchetypeIndex> {
        self.remove_edges.get(&id).copied()
    }

    pub fn set_add_edge(&mut self, id: ComponentTypeId, target: ArchetypeIndex) {
        self.add_edges.insert(id, target);
    }

    pub fn set_remove_edge(&mut self, id: ComponentTypeId, target: ArchetypeIndex) {
        self.remove_edges.insert(id, target);
    }
}
