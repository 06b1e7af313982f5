use crate::ecs::{Component, ComponentRegistry, ComponentTypeId};

/// Components a system declares it reads and writes.
///
/// Declarations are informational: the group logs them when the system is
/// registered. A component declared both ways counts as a write.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SystemDescriptor {
    name: String,
    reads: Vec<ComponentTypeId>,
    writes: Vec<ComponentTypeId>,
}

impl SystemDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Declare a read of `T`, registering it if needed.
    pub fn read<T: Component>(mut self, registry: &ComponentRegistry) -> Self {
        let id = registry.register::<T>().id;
        if !self.writes.contains(&id) {
            insert_sorted(&mut self.reads, id);
        }
        self
    }

    /// Declare a write of `T`, registering it if needed.
    pub fn write<T: Component>(mut self, registry: &ComponentRegistry) -> Self {
        let id = registry.register::<T>().id;
        self.reads.retain(|&read| read != id);
        insert_sorted(&mut self.writes, id);
        self
    }

    /// System name, used in logs and profiler timings.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Components only read, sorted by id.
    pub fn read_components(&self) -> &[ComponentTypeId] {
        &self.reads
    }

    /// Components written, sorted by id.
    pub fn write_components(&self) -> &[ComponentTypeId] {
        &self.writes
    }

    pub fn is_empty(&self) -> bool {
        self.reads.is_empty() && self.writes.is_empty()
    }
}

fn insert_sorted(ids: &mut Vec<ComponentTypeId>, id: ComponentTypeId) {
    if let Err(pos) = ids.binary_search(&id) {
        ids.insert(pos, id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytemuck::{Pod, Zeroable};

    #[repr(C)]
    #[derive(Clone, Copy, Pod, Zeroable)]
    struct Position {
        x: f32,
    }

    #[repr(C)]
    #[derive(Clone, Copy, Pod, Zeroable)]
    struct Velocity {
        x: f32,
    }

    #[test]
    fn write_supersedes_read() {
        let registry = ComponentRegistry::new();
        let descriptor = SystemDescriptor::new("movement")
            .read::<Velocity>(&registry)
            .read::<Velocity>(&registry)
            .read::<Position>(&registry)
            .write::<Position>(&registry)
            .read::<Position>(&registry);

        let pos = registry.lookup::<Position>().unwrap().id;
        let vel = registry.lookup::<Velocity>().unwrap().id;
        assert_eq!(descriptor.read_components(), &[vel]);
        assert_eq!(descriptor.write_components(), &[pos]);
        assert_eq!(descriptor.name(), "movement");
    }

    #[test]
    fn empty_descriptor() {
        assert!(SystemDescriptor::new("idle").is_empty());
    }
}
