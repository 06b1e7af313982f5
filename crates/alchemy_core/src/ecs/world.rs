// world.rs - ECS World: entity lifecycle, structural mutation and the lock
//
// All state sits behind one reader/writer lock. Structural operations
// (create, destroy, add, remove) take it exclusively; value reads and
// overwrites share it. Iteration goes through `&mut World` instead.

use crate::config::{ConfigError, WorldConfig};
use crate::ecs::storage::{Archetype, ArchetypeIndex};
use crate::ecs::{
    ArchetypeIdentifier, CommandBuffer, Component, ComponentRegistry, ComponentTypeId, Entity,
    EntityIndex, EntityLocation, QueryBuilder, SystemGroup,
};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use tracing::{debug, error, info};

/// The empty-schema archetype every entity is created into.
pub(crate) const EMPTY_ARCHETYPE: ArchetypeIndex = 0;

static NEXT_WORLD_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a [`World`]. Queries and system groups
/// remember the world that created them.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct WorldId(u64);

impl WorldId {
    fn next() -> Self {
        Self(NEXT_WORLD_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Invariant violations. Stale handles and schema mismatches are not
/// errors; they come back as `false`/`None`.
#[derive(Debug, Error)]
pub enum WorldError {
    #[error("component type {id} is not registered")]
    UnregisteredComponent { id: ComponentTypeId },

    #[error("component type {id} is {expected} bytes, got {actual}")]
    ComponentSizeMismatch {
        id: ComponentTypeId,
        expected: usize,
        actual: usize,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Everything guarded by the world lock.
pub(crate) struct WorldState {
    pub(crate) entities: EntityIndex,
    pub(crate) archetypes: Vec<Archetype>,
    archetype_lookup: HashMap<ArchetypeIdentifier, ArchetypeIndex>,
    pub(crate) archetype_version: u64,
    chunk_bytes: usize,
}

impl WorldState {
    fn new(config: &WorldConfig) -> Self {
        let empty = ArchetypeIdentifier::empty();
        let mut archetype_lookup = HashMap::new();
        archetype_lookup.insert(empty.clone(), EMPTY_ARCHETYPE);

        Self {
            entities: EntityIndex::with_capacity(config.initial_entity_capacity),
            archetypes: vec![Archetype::new(empty, Vec::new(), config.chunk_bytes)],
            archetype_lookup,
            archetype_version: 1,
            chunk_bytes: config.chunk_bytes,
        }
    }

    /// Get-or-add keyed by the canonical identifier. Creating an archetype
    /// bumps the version that query caches compare against.
    fn get_or_create_archetype(
        &mut self,
        registry: &ComponentRegistry,
        identifier: ArchetypeIdentifier,
    ) -> Result<ArchetypeIndex, WorldError> {
        if let Some(&index) = self.archetype_lookup.get(&identifier) {
            return Ok(index);
        }

        let component_types = identifier
            .components()
            .iter()
            .map(|&id| registry.get(id).ok_or(WorldError::UnregisteredComponent { id }))
            .collect::<Result<Vec<_>, _>>()?;

        let index = self.archetypes.len();
        debug!(archetype = index, components = component_types.len(), "created archetype");
        self.archetypes
            .push(Archetype::new(identifier.clone(), component_types, self.chunk_bytes));
        self.archetype_lookup.insert(identifier, index);
        self.archetype_version += 1;
        Ok(index)
    }

    /// Destination of "add `id`" from `from`, memoized in both directions.
    fn add_edge_target(
        &mut self,
        registry: &ComponentRegistry,
        from: ArchetypeIndex,
        id: ComponentTypeId,
    ) -> Result<ArchetypeIndex, WorldError> {
        if let Some(target) = self.archetypes[from].add_edge(id) {
            return Ok(target);
        }
        let identifier = self.archetypes[from].identifier().with(id);
        let target = self.get_or_create_archetype(registry, identifier)?;
        self.archetypes[from].set_add_edge(id, target);
        self.archetypes[target].set_remove_edge(id, from);
        Ok(target)
    }

    /// Destination of "remove `id`" from `from`, memoized in both directions.
    fn remove_edge_target(
        &mut self,
        registry: &ComponentRegistry,
        from: ArchetypeIndex,
        id: ComponentTypeId,
    ) -> Result<ArchetypeIndex, WorldError> {
        if let Some(target) = self.archetypes[from].remove_edge(id) {
            return Ok(target);
        }
        let identifier = self.archetypes[from].identifier().without(id);
        let target = self.get_or_create_archetype(registry, identifier)?;
        self.archetypes[from].set_remove_edge(id, target);
        self.archetypes[target].set_add_edge(id, from);
        Ok(target)
    }

    /// Physically move `entity` into `target` and update every affected
    /// location record.
    fn relocate(
        &mut self,
        entity: Entity,
        location: EntityLocation,
        target: ArchetypeIndex,
    ) -> EntityLocation {
        let (source, dest) = pair_mut(&mut self.archetypes, location.archetype, target);
        let entities = &mut self.entities;
        let (chunk, index) = source.move_entity_to(dest, location.chunk, location.index, |moved, chunk, index| {
            entities.update_slot(moved, chunk, index)
        });

        let moved_to = EntityLocation {
            archetype: target,
            chunk,
            index,
        };
        self.entities.update_location(entity.id(), moved_to);
        moved_to
    }

    fn create_entity(&mut self) -> Entity {
        let (chunk, index) = self.archetypes[EMPTY_ARCHETYPE].add_entity(0);
        let entity = self.entities.create(EntityLocation {
            archetype: EMPTY_ARCHETYPE,
            chunk,
            index,
        });
        self.archetypes[EMPTY_ARCHETYPE]
            .chunk_mut(chunk)
            .set_entity(index, entity.id());
        entity
    }

    fn destroy_entity(&mut self, entity: Entity) -> bool {
        let Some(location) = self.entities.location(entity) else {
            error!(%entity, "cannot destroy entity: not alive");
            return false;
        };

        let entities = &mut self.entities;
        self.archetypes[location.archetype].remove_entity(location.chunk, location.index, |moved, chunk, index| {
            entities.update_slot(moved, chunk, index)
        });
        self.entities.destroy(entity)
    }

    fn insert_component(
        &mut self,
        registry: &ComponentRegistry,
        entity: Entity,
        id: ComponentTypeId,
        bytes: &[u8],
    ) -> Result<bool, WorldError> {
        let Some(location) = self.entities.location(entity) else {
            error!(%entity, component = %id, "cannot add component: entity not alive");
            return Ok(false);
        };
        check_size(registry, id, bytes)?;
        if self.archetypes[location.archetype].has_component(id) {
            debug!(%entity, component = %id, "entity already has component");
            return Ok(false);
        }

        let target = self.add_edge_target(registry, location.archetype, id)?;
        let moved_to = self.relocate(entity, location, target);
        let written =
            self.archetypes[target].write_component_bytes(moved_to.chunk, moved_to.index, id, bytes);
        debug_assert!(written, "destination archetype lacks the added component");
        Ok(true)
    }

    fn remove_component(
        &mut self,
        registry: &ComponentRegistry,
        entity: Entity,
        id: ComponentTypeId,
    ) -> Result<bool, WorldError> {
        let Some(location) = self.entities.location(entity) else {
            error!(%entity, component = %id, "cannot remove component: entity not alive");
            return Ok(false);
        };
        if registry.get(id).is_none() {
            return Err(WorldError::UnregisteredComponent { id });
        }
        if !self.archetypes[location.archetype].has_component(id) {
            debug!(%entity, component = %id, "entity does not have component");
            return Ok(false);
        }

        let target = self.remove_edge_target(registry, location.archetype, id)?;
        self.relocate(entity, location, target);
        Ok(true)
    }

    fn set_component(
        &self,
        registry: &ComponentRegistry,
        entity: Entity,
        id: ComponentTypeId,
        bytes: &[u8],
    ) -> Result<bool, WorldError> {
        let Some(location) = self.entities.location(entity) else {
            error!(%entity, component = %id, "cannot set component: entity not alive");
            return Ok(false);
        };
        check_size(registry, id, bytes)?;
        let written = self.archetypes[location.archetype].write_component_bytes(
            location.chunk,
            location.index,
            id,
            bytes,
        );
        if !written {
            debug!(%entity, component = %id, "entity does not have component");
        }
        Ok(written)
    }

    fn has_component(&self, entity: Entity, id: ComponentTypeId) -> bool {
        self.entities
            .location(entity)
            .is_some_and(|location| self.archetypes[location.archetype].has_component(id))
    }
}

fn check_size(registry: &ComponentRegistry, id: ComponentTypeId, bytes: &[u8]) -> Result<(), WorldError> {
    let ty = registry.get(id).ok_or(WorldError::UnregisteredComponent { id })?;
    if ty.size != bytes.len() {
        return Err(WorldError::ComponentSizeMismatch {
            id,
            expected: ty.size,
            actual: bytes.len(),
        });
    }
    Ok(())
}

/// Two distinct elements of a slice, mutably.
fn pair_mut<T>(items: &mut [T], a: usize, b: usize) -> (&mut T, &mut T) {
    assert_ne!(a, b, "cannot borrow the same archetype twice");
    if a < b {
        let (left, right) = items.split_at_mut(b);
        (&mut left[a], &mut right[0])
    } else {
        let (left, right) = items.split_at_mut(a);
        (&mut right[0], &mut left[b])
    }
}

/// Typed operations register their component on first use, so an error
/// here means the registry and archetype graph disagree.
fn invariant_violated(err: WorldError) -> ! {
    panic!("ECS invariant violated: {err}")
}

/// The main ECS world containing all entities and components.
///
/// # Example
/// ```ignore
/// let world = World::new();
/// let e = world.create_entity();
/// world.add_component(e, Position { x: 1.0, y: 2.0, z: 3.0 });
/// assert_eq!(world.get_component::<Position>(e), Some(Position { x: 1.0, y: 2.0, z: 3.0 }));
/// ```
pub struct World {
    id: WorldId,
    config: WorldConfig,
    registry: Arc<ComponentRegistry>,
    state: RwLock<WorldState>,
    pool: Option<rayon::ThreadPool>,
}

impl World {
    /// Create a new empty world with default configuration.
    pub fn new() -> Self {
        let config = WorldConfig::default();
        let state = WorldState::new(&config);
        Self::assemble(config, Arc::new(ComponentRegistry::new()), state, None)
    }

    /// Create a world from a validated configuration.
    pub fn with_config(config: WorldConfig) -> Result<Self, WorldError> {
        Self::with_registry(config, Arc::new(ComponentRegistry::new()))
    }

    /// Create a world that shares `registry` with other worlds.
    pub fn with_registry(
        config: WorldConfig,
        registry: Arc<ComponentRegistry>,
    ) -> Result<Self, WorldError> {
        config.validate()?;
        let pool = match config.worker_threads {
            Some(threads) => Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .thread_name(|i| format!("ecs-worker-{i}"))
                    .build()?,
            ),
            None => None,
        };
        let state = WorldState::new(&config);
        Ok(Self::assemble(config, registry, state, pool))
    }

    fn assemble(
        config: WorldConfig,
        registry: Arc<ComponentRegistry>,
        state: WorldState,
        pool: Option<rayon::ThreadPool>,
    ) -> Self {
        let world = Self {
            id: WorldId::next(),
            config,
            registry,
            state: RwLock::new(state),
            pool,
        };
        info!(world = world.id.0, chunk_bytes = world.config.chunk_bytes, "ECS world created");
        world
    }

    #[inline]
    pub fn id(&self) -> WorldId {
        self.id
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ComponentRegistry> {
        &self.registry
    }

    fn read(&self) -> RwLockReadGuard<'_, WorldState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, WorldState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock-free access for iteration: `&mut self` already excludes every
    /// other user of the world.
    pub(crate) fn split_for_iteration(&mut self) -> (&mut WorldState, Option<&rayon::ThreadPool>) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        (state, self.pool.as_ref())
    }

    pub(crate) fn state(&self) -> RwLockReadGuard<'_, WorldState> {
        self.read()
    }

    // ------------------------------------------------------------------
    // Entity lifecycle
    // ------------------------------------------------------------------

    /// Create an entity with no components.
    pub fn create_entity(&self) -> Entity {
        self.write().create_entity()
    }

    /// Destroy an entity. Returns false (and logs) if it is not alive.
    pub fn destroy_entity(&self, entity: Entity) -> bool {
        self.write().destroy_entity(entity)
    }

    pub fn is_alive(&self, entity: Entity) -> bool {
        self.read().entities.is_alive(entity)
    }

    /// Number of live entities.
    pub fn entity_count(&self) -> usize {
        self.read().entities.len()
    }

    /// Number of archetypes, including the empty one.
    pub fn archetype_count(&self) -> usize {
        self.read().archetypes.len()
    }

    /// Bumped every time a new archetype is created.
    pub fn archetype_version(&self) -> u64 {
        self.read().archetype_version
    }

    // ------------------------------------------------------------------
    // Typed component access
    // ------------------------------------------------------------------

    /// Add a component, moving the entity to the matching archetype.
    ///
    /// Returns false if the entity is not alive or already has a `T`.
    pub fn add_component<T: Component>(&self, entity: Entity, value: T) -> bool {
        let ty = self.registry.register::<T>();
        self.write()
            .insert_component(&self.registry, entity, ty.id, bytemuck::bytes_of(&value))
            .unwrap_or_else(|err| invariant_violated(err))
    }

    /// Remove a component. Returns false if the entity is not alive or
    /// has no `T`.
    pub fn remove_component<T: Component>(&self, entity: Entity) -> bool {
        let Some(ty) = self.registry.lookup::<T>() else {
            self.report_unregistered::<T>(entity, "remove");
            return false;
        };
        self.write()
            .remove_component(&self.registry, entity, ty.id)
            .unwrap_or_else(|err| invariant_violated(err))
    }

    /// Copy of the entity's `T`, if it is alive and has one.
    pub fn get_component<T: Component>(&self, entity: Entity) -> Option<T> {
        let Some(ty) = self.registry.lookup::<T>() else {
            self.report_unregistered::<T>(entity, "get");
            return None;
        };
        let state = self.read();
        let Some(location) = state.entities.location(entity) else {
            error!(%entity, "cannot get component: entity not alive");
            return None;
        };
        let archetype = &state.archetypes[location.archetype];
        let Some(slot) = archetype.slot_of(ty.id) else {
            debug!(%entity, component = %ty, "entity does not have component");
            return None;
        };
        Some(archetype.chunk(location.chunk).read_component::<T>(slot, location.index))
    }

    /// Overwrite the entity's `T` in place. No structural change.
    ///
    /// Returns false if the entity is not alive or has no `T`.
    pub fn set_component<T: Component>(&self, entity: Entity, value: T) -> bool {
        let Some(ty) = self.registry.lookup::<T>() else {
            self.report_unregistered::<T>(entity, "set");
            return false;
        };
        self.read()
            .set_component(&self.registry, entity, ty.id, bytemuck::bytes_of(&value))
            .unwrap_or_else(|err| invariant_violated(err))
    }

    pub fn has_component<T: Component>(&self, entity: Entity) -> bool {
        match self.registry.lookup::<T>() {
            Some(ty) => self.read().has_component(entity, ty.id),
            None => false,
        }
    }

    /// Direct reference into chunk memory.
    pub fn get_component_mut<T: Component>(&mut self, entity: Entity) -> Option<&mut T> {
        let Some(ty) = self.registry.lookup::<T>() else {
            self.report_unregistered::<T>(entity, "get");
            return None;
        };
        let (state, _) = self.split_for_iteration();
        let Some(location) = state.entities.location(entity) else {
            error!(%entity, "cannot get component: entity not alive");
            return None;
        };
        let archetype = &mut state.archetypes[location.archetype];
        let Some(slot) = archetype.slot_of(ty.id) else {
            debug!(%entity, component = %ty, "entity does not have component");
            return None;
        };
        Some(archetype.chunk_mut(location.chunk).component_mut::<T>(slot, location.index))
    }

    /// A typed access for a `T` nothing has registered yet can only fail.
    fn report_unregistered<T: Component>(&self, entity: Entity, op: &str) {
        if self.is_alive(entity) {
            debug!(%entity, component = std::any::type_name::<T>(), "entity does not have component");
        } else {
            error!(%entity, "cannot {op} component: entity not alive");
        }
    }

    // ------------------------------------------------------------------
    // Raw (type-erased) component access
    // ------------------------------------------------------------------

    /// Add a component from its id and bytes.
    ///
    /// `Ok(false)` for a dead entity or a component already present; `Err`
    /// if `id` is unknown or `bytes` has the wrong length.
    pub fn add_component_raw(
        &self,
        entity: Entity,
        id: ComponentTypeId,
        bytes: &[u8],
    ) -> Result<bool, WorldError> {
        self.write().insert_component(&self.registry, entity, id, bytes)
    }

    pub fn remove_component_raw(&self, entity: Entity, id: ComponentTypeId) -> Result<bool, WorldError> {
        self.write().remove_component(&self.registry, entity, id)
    }

    pub fn set_component_raw(
        &self,
        entity: Entity,
        id: ComponentTypeId,
        bytes: &[u8],
    ) -> Result<bool, WorldError> {
        self.read().set_component(&self.registry, entity, id, bytes)
    }

    // ------------------------------------------------------------------
    // Factories
    // ------------------------------------------------------------------

    pub fn create_query(&self) -> QueryBuilder<'_> {
        QueryBuilder::new(self)
    }

    pub fn create_command_buffer(&self) -> CommandBuffer {
        CommandBuffer::new(Arc::clone(&self.registry))
    }

    pub fn create_system_group(&self) -> SystemGroup {
        SystemGroup::new(self.id)
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for World {
    fn drop(&mut self) {
        info!(world = self.id.0, "ECS world disposed");
    }
}

impl fmt::Debug for World {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.read();
        f.debug_struct("World")
            .field("id", &self.id)
            .field("entities", &state.entities.len())
            .field("archetypes", &state.archetypes.len())
            .finish()
    }
}
