// component.rs - Runtime component-type registration
//
// Components are identified by dense u32 ids handed out on first use,
// not by Rust TypeIds. The TypeId is only the lookup key for a shape.

use bytemuck::Pod;
use dashmap::DashMap;
use std::any::{type_name, TypeId};
use std::fmt;
use std::mem::{align_of, size_of};
use std::sync::{PoisonError, RwLock};

/// Dense identifier assigned to a component shape by a [`ComponentRegistry`].
///
/// Ids start at 0, grow by one per new shape and are never reused.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComponentTypeId(u32);

impl ComponentTypeId {
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ComponentTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Metadata describing a component's memory layout.
///
/// One instance exists per registered shape; it never changes after
/// registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ComponentType {
    pub id: ComponentTypeId,
    pub size: usize,
    pub align: usize,
    pub name: &'static str,
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Plain-old-data value that can live in chunk memory.
///
/// Every `Pod + Send + Sync` type is a component; there is nothing to
/// implement or register up front.
///
/// # Example
/// ```ignore
/// #[repr(C)]
/// #[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
/// struct Position { x: f32, y: f32, z: f32 }
///
/// world.add_component(entity, Position { x: 1.0, y: 2.0, z: 3.0 });
/// ```
pub trait Component: Pod + Send + Sync {}

impl<T: Pod + Send + Sync> Component for T {}

/// Thread-safe table of component shapes.
///
/// Concurrent first uses of the same shape resolve to the same id: the
/// shard lock on `by_shape` is held while the id is assigned.
pub struct ComponentRegistry {
    by_shape: DashMap<TypeId, ComponentType>,
    by_id: RwLock<Vec<ComponentType>>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self {
            by_shape: DashMap::new(),
            by_id: RwLock::new(Vec::new()),
        }
    }

    /// Return the component type for `key`, assigning the next id if the
    /// shape has never been seen.
    pub fn get_or_register(
        &self,
        key: TypeId,
        size: usize,
        align: usize,
        name: &'static str,
    ) -> ComponentType {
        if let Some(existing) = self.by_shape.get(&key) {
            return *existing;
        }

        *self.by_shape.entry(key).or_insert_with(|| {
            let mut table = self.by_id.write().unwrap_or_else(PoisonError::into_inner);
            let raw = u32::try_from(table.len()).expect("component type ids exhausted");
            let ty = ComponentType {
                id: ComponentTypeId(raw),
                size,
                align,
                name,
            };
            table.push(ty);
            tracing::debug!(id = raw, name, size, "registered component type");
            ty
        })
    }

    /// Register (or look up) a Rust component type.
    #[inline]
    pub fn register<T: Component>(&self) -> ComponentType {
        self.get_or_register(TypeId::of::<T>(), size_of::<T>(), align_of::<T>(), type_name::<T>())
    }

    /// Look up a Rust component type without registering it.
    pub fn lookup<T: Component>(&self) -> Option<ComponentType> {
        self.by_shape.get(&TypeId::of::<T>()).map(|entry| *entry)
    }

    /// Look up component metadata by id.
    pub fn get(&self, id: ComponentTypeId) -> Option<ComponentType> {
        self.by_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id.index())
            .copied()
    }

    /// Number of registered shapes.
    pub fn len(&self) -> usize {
        self.by_id.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("types", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytemuck::{Pod, Zeroable};
    use std::sync::Arc;

    #[repr(C)]
    #[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
    struct Position {
        x: f32,
        y: f32,
        z: f32,
    }

    #[repr(C)]
    #[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
    struct Health {
        value: i32,
    }

    #[test]
    fn ids_are_dense_from_zero() {
        let registry = ComponentRegistry::new();
        let pos = registry.register::<Position>();
        let health = registry.register::<Health>();

        assert_eq!(pos.id, ComponentTypeId::from_raw(0));
        assert_eq!(health.id, ComponentTypeId::from_raw(1));
        assert_eq!(pos.size, 12);
        assert_eq!(health.align, 4);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn registration_is_idempotent() {
        let registry = ComponentRegistry::new();
        let first = registry.register::<Position>();
        let second = registry.register::<Position>();

        assert_eq!(first, second);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(first.id), Some(first));
        assert!(first.name.ends_with("Position"));
    }

    #[test]
    fn lookup_does_not_register() {
        let registry = ComponentRegistry::new();
        assert!(registry.lookup::<Health>().is_none());
        assert!(registry.is_empty());

        let health = registry.register::<Health>();
        assert_eq!(registry.lookup::<Health>(), Some(health));
    }

    #[test]
    fn concurrent_first_use_resolves_to_one_id() {
        let registry = Arc::new(ComponentRegistry::new());

        let ids: Vec<ComponentTypeId> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let registry = Arc::clone(&registry);
                    scope.spawn(move || registry.register::<Position>().id)
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(ids.iter().all(|&id| id == ids[0]));
        assert_eq!(registry.len(), 1);
    }
}
