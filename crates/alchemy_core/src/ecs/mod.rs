//! Archetype-based Entity Component System.
//!
//! Entities with the same set of component types share an archetype, and
//! each archetype stores its components in fixed-budget chunks laid out as
//! structure-of-arrays. Adding or removing a component moves the entity
//! along the archetype graph. Queries cache their matching archetypes and
//! hand out direct references into chunk memory; structural changes made
//! while iterating are deferred through command buffers and replayed by a
//! [`SystemGroup`].

mod archetype;
mod command_buffer;
mod component;
mod entity;
mod entity_index;
mod query;
pub mod storage;
mod system;
mod system_descriptor;
mod system_group;
mod system_handle;
mod world;

pub use archetype::ArchetypeIdentifier;
pub use command_buffer::CommandBuffer;
pub use component::{Component, ComponentRegistry, ComponentType, ComponentTypeId};
pub use entity::Entity;
pub use entity_index::{EntityIndex, EntityLocation};
pub use query::{Query, QueryBuilder};
pub use storage::{Archetype, ArchetypeIndex, Chunk};
pub use system::{System, SystemContext};
pub use system_descriptor::SystemDescriptor;
pub use system_group::SystemGroup;
pub use system_handle::SystemHandle;
pub use world::{World, WorldError, WorldId};
