//! Physical component storage: archetypes and their chunks.

mod archetype_storage;
mod chunk;

pub use archetype_storage::{Archetype, ArchetypeIndex};
pub(crate) use chunk::cast_column_mut;
pub use chunk::{Chunk, DEFAULT_CHUNK_BYTES};
