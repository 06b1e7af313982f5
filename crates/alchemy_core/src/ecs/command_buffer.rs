// command_buffer.rs - Deferred structural changes
//
// Systems record intents while they iterate; the group replays them once
// the system returns. Component payloads live in one byte arena.

use crate::ecs::{Component, ComponentRegistry, ComponentTypeId, Entity, World, WorldError};
use std::ops::Range;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone)]
enum Command {
    CreateEntity,
    DestroyEntity(Entity),
    AddComponent {
        entity: Entity,
        id: ComponentTypeId,
        bytes: Range<usize>,
    },
    RemoveComponent {
        entity: Entity,
        id: ComponentTypeId,
    },
    SetComponent {
        entity: Entity,
        id: ComponentTypeId,
        bytes: Range<usize>,
    },
}

/// Ordered log of structural intents for later replay against a [`World`].
///
/// Intents whose entity is dead by playback time are no-ops, exactly as
/// the same call on the world would be.
///
/// # Example
/// ```ignore
/// let mut commands = world.create_command_buffer();
/// query.for_each_entity(&mut world, |e| commands.destroy_entity(e));
/// commands.playback(&world)?;
/// ```
pub struct CommandBuffer {
    registry: Arc<ComponentRegistry>,
    commands: Vec<Command>,
    bytes: Vec<u8>,
}

impl CommandBuffer {
    pub(crate) fn new(registry: Arc<ComponentRegistry>) -> Self {
        Self {
            registry,
            commands: Vec::new(),
            bytes: Vec::new(),
        }
    }

    fn stash(&mut self, bytes: &[u8]) -> Range<usize> {
        let start = self.bytes.len();
        self.bytes.extend_from_slice(bytes);
        start..self.bytes.len()
    }

    pub fn create_entity(&mut self) {
        self.commands.push(Command::CreateEntity);
    }

    pub fn destroy_entity(&mut self, entity: Entity) {
        self.commands.push(Command::DestroyEntity(entity));
    }

    pub fn add_component<T: Component>(&mut self, entity: Entity, value: T) {
        let id = self.registry.register::<T>().id;
        self.add_component_raw(entity, id, bytemuck::bytes_of(&value));
    }

    pub fn remove_component<T: Component>(&mut self, entity: Entity) {
        let id = self.registry.register::<T>().id;
        self.remove_component_raw(entity, id);
    }

    pub fn set_component<T: Component>(&mut self, entity: Entity, value: T) {
        let id = self.registry.register::<T>().id;
        self.set_component_raw(entity, id, bytemuck::bytes_of(&value));
    }

    pub fn add_component_raw(&mut self, entity: Entity, id: ComponentTypeId, bytes: &[u8]) {
        let bytes = self.stash(bytes);
        self.commands.push(Command::AddComponent { entity, id, bytes });
    }

    pub fn remove_component_raw(&mut self, entity: Entity, id: ComponentTypeId) {
        self.commands.push(Command::RemoveComponent { entity, id });
    }

    pub fn set_component_raw(&mut self, entity: Entity, id: ComponentTypeId, bytes: &[u8]) {
        let bytes = self.stash(bytes);
        self.commands.push(Command::SetComponent { entity, id, bytes });
    }

    /// Number of recorded intents.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Discard everything without replaying it.
    pub fn clear(&mut self) {
        self.commands.clear();
        self.bytes.clear();
    }

    /// Replay every intent in recorded order, then clear.
    ///
    /// An invariant violation stops the replay; the buffer is cleared
    /// either way.
    pub fn playback(&mut self, world: &World) -> Result<(), WorldError> {
        assert!(
            Arc::ptr_eq(&self.registry, world.registry()),
            "command buffer played back against a world with a different component registry"
        );

        let count = self.commands.len();
        let result = self.replay(world);
        self.clear();
        if count > 0 {
            debug!(count, "played back command buffer");
        }
        result
    }

    fn replay(&self, world: &World) -> Result<(), WorldError> {
        for command in &self.commands {
            match command {
                Command::CreateEntity => {
                    world.create_entity();
                }
                Command::DestroyEntity(entity) => {
                    world.destroy_entity(*entity);
                }
                Command::AddComponent { entity, id, bytes } => {
                    world.add_component_raw(*entity, *id, &self.bytes[bytes.clone()])?;
                }
                Command::RemoveComponent { entity, id } => {
                    world.remove_component_raw(*entity, *id)?;
                }
                Command::SetComponent { entity, id, bytes } => {
                    world.set_component_raw(*entity, *id, &self.bytes[bytes.clone()])?;
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for CommandBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandBuffer")
            .field("commands", &self.commands.len())
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytemuck::{Pod, Zeroable};

    #[repr(C)]
    #[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
    struct Health {
        value: i32,
    }

    #[repr(C)]
    #[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
    struct Position {
        x: f32,
        y: f32,
        z: f32,
    }

    #[test]
    fn replays_in_order_and_clears() {
        let world = World::new();
        let e = world.create_entity();

        let mut commands = world.create_command_buffer();
        commands.add_component(e, Health { value: 5 });
        commands.set_component(e, Health { value: 6 });
        commands.create_entity();
        assert_eq!(commands.len(), 3);

        commands.playback(&world).unwrap();
        assert!(commands.is_empty());
        assert_eq!(world.get_component::<Health>(e), Some(Health { value: 6 }));
        assert_eq!(world.entity_count(), 2);
    }

    #[test]
    fn destroy_then_add_is_a_no_op_for_the_add() {
        let world = World::new();
        let e = world.create_entity();

        let mut commands = world.create_command_buffer();
        commands.destroy_entity(e);
        commands.add_component(e, Position { x: 1.0, y: 2.0, z: 3.0 });
        commands.playback(&world).unwrap();

        assert!(!world.is_alive(e));
        assert_eq!(world.entity_count(), 0);
        assert_eq!(world.archetype_count(), 1, "no archetype was created for the dropped add");
    }

    #[test]
    fn clear_discards_without_replay() {
        let world = World::new();
        let mut commands = world.create_command_buffer();
        commands.create_entity();
        commands.clear();
        commands.playback(&world).unwrap();
        assert_eq!(world.entity_count(), 0);
    }

    #[test]
    fn invariant_violation_stops_replay_but_clears() {
        let world = World::new();
        let e = world.create_entity();

        let mut commands = world.create_command_buffer();
        commands.add_component_raw(e, ComponentTypeId::from_raw(42), &[1, 2, 3, 4]);
        commands.create_entity();

        assert!(matches!(
            commands.playback(&world),
            Err(WorldError::UnregisteredComponent { .. })
        ));
        assert!(commands.is_empty());
        assert_eq!(world.entity_count(), 1);
    }
}
