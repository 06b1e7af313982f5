// system_group.rs - Ordered per-frame execution of systems
//
// Each system owns a command buffer that is replayed right after the
// system runs, so later systems always see earlier systems' changes.

use crate::ecs::{
    CommandBuffer, System, SystemContext, SystemDescriptor, SystemHandle, World, WorldError, WorldId,
};
use alchemy_metrics::SystemProfiler;
use tracing::{debug, info};

struct SystemEntry {
    system: Box<dyn System>,
    descriptor: SystemDescriptor,
    commands: CommandBuffer,
}

/// Runs systems in registration order against one world.
///
/// # Example
/// ```ignore
/// let mut group = world.create_system_group();
/// group.add(&mut world, Movement::default())?;
/// loop {
///     group.update(&mut world, 1.0 / 60.0)?;
/// }
/// ```
pub struct SystemGroup {
    world: WorldId,
    systems: Vec<SystemEntry>,
    profiler: SystemProfiler,
}

impl SystemGroup {
    pub(crate) fn new(world: WorldId) -> Self {
        Self {
            world,
            systems: Vec::new(),
            profiler: SystemProfiler::new(),
        }
    }

    fn assert_world(&self, world: &World) {
        assert_eq!(
            self.world,
            world.id(),
            "system group used with a world other than the one that created it"
        );
    }

    /// Register `system`, run its `on_create` hook and replay whatever it
    /// recorded.
    pub fn add<S>(&mut self, world: &mut World, mut system: S) -> Result<SystemHandle, WorldError>
    where
        S: System + 'static,
    {
        self.assert_world(world);
        let mut commands = world.create_command_buffer();
        let descriptor = system.descriptor(world.registry());

        system.on_create(&mut SystemContext {
            world: &mut *world,
            commands: &mut commands,
        });
        commands.playback(world)?;

        let handle = SystemHandle::new(self.systems.len() as u32);
        info!("System {} registered.", descriptor.name());
        debug!(
            system = descriptor.name(),
            reads = ?descriptor.read_components(),
            writes = ?descriptor.write_components(),
            "declared component access"
        );
        self.systems.push(SystemEntry {
            system: Box::new(system),
            descriptor,
            commands,
        });
        Ok(handle)
    }

    /// Run every system's `on_update` in order, replaying each system's
    /// command buffer before the next one starts.
    pub fn update(&mut self, world: &mut World, dt: f32) -> Result<(), WorldError> {
        self.assert_world(world);
        for entry in &mut self.systems {
            let SystemEntry {
                system,
                descriptor,
                commands,
            } = entry;

            self.profiler.time_system(descriptor.name(), || {
                system.on_update(
                    &mut SystemContext {
                        world: &mut *world,
                        commands: &mut *commands,
                    },
                    dt,
                )
            });
            commands.playback(world)?;
        }
        Ok(())
    }

    /// Run every `on_destroy` hook in order, then drop all systems.
    ///
    /// Commands recorded during teardown are discarded.
    pub fn destroy(&mut self, world: &mut World) {
        self.assert_world(world);
        for entry in &mut self.systems {
            entry.system.on_destroy(&mut SystemContext {
                world: &mut *world,
                commands: &mut entry.commands,
            });
        }
        self.systems.clear();
    }

    pub fn len(&self) -> usize {
        self.systems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }

    pub fn descriptor(&self, handle: SystemHandle) -> Option<&SystemDescriptor> {
        self.systems
            .get(handle.index() as usize)
            .map(|entry| &entry.descriptor)
    }

    pub fn iter(&self) -> impl Iterator<Item = (SystemHandle, &SystemDescriptor)> {
        self.systems
            .iter()
            .enumerate()
            .map(|(index, entry)| (SystemHandle::new(index as u32), &entry.descriptor))
    }

    /// Accumulated `on_update` timings by system name (zero without the
    /// `metrics` feature).
    pub fn profiler(&self) -> &SystemProfiler {
        &self.profiler
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::{Entity, Query};
    use bytemuck::{Pod, Zeroable};
    use std::sync::{Arc, Mutex};

    #[repr(C)]
    #[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
    struct Marker {
        frame: u32,
    }

    type Log = Arc<Mutex<Vec<String>>>;

    struct Recorder {
        label: &'static str,
        log: Log,
    }

    impl System for Recorder {
        fn name(&self) -> &str {
            self.label
        }

        fn on_create(&mut self, _ctx: &mut SystemContext<'_>) {
            self.log.lock().unwrap().push(format!("{}:create", self.label));
        }

        fn on_update(&mut self, _ctx: &mut SystemContext<'_>, _dt: f32) {
            self.log.lock().unwrap().push(format!("{}:update", self.label));
        }

        fn on_destroy(&mut self, _ctx: &mut SystemContext<'_>) {
            self.log.lock().unwrap().push(format!("{}:destroy", self.label));
        }
    }

    /// Marks every unmarked entity through its command buffer.
    struct Tagger {
        query: Option<Query>,
    }

    impl System for Tagger {
        fn on_create(&mut self, ctx: &mut SystemContext<'_>) {
            self.query = Some(ctx.world.create_query().without::<Marker>().build());
        }

        fn on_update(&mut self, ctx: &mut SystemContext<'_>, _dt: f32) {
            let Some(query) = self.query.as_mut() else { return };
            let mut found = Vec::new();
            query.for_each_entity(ctx.world, |e| found.push(e));
            for e in found {
                ctx.commands.add_component(e, Marker { frame: 1 });
            }
        }
    }

    /// Counts marked entities after the tagger has run.
    struct Counter {
        query: Option<Query>,
        seen: Arc<Mutex<usize>>,
    }

    impl System for Counter {
        fn on_create(&mut self, ctx: &mut SystemContext<'_>) {
            self.query = Some(ctx.world.create_query().with::<Marker>().build());
        }

        fn on_update(&mut self, ctx: &mut SystemContext<'_>, _dt: f32) {
            if let Some(query) = self.query.as_mut() {
                *self.seen.lock().unwrap() = query.count(ctx.world);
            }
        }
    }

    /// Spawns one entity during setup.
    struct Spawner;

    impl System for Spawner {
        fn on_create(&mut self, ctx: &mut SystemContext<'_>) {
            ctx.commands.create_entity();
        }

        fn on_update(&mut self, _ctx: &mut SystemContext<'_>, _dt: f32) {}
    }

    #[test]
    fn hooks_run_in_registration_order() {
        let mut world = World::new();
        let log: Log = Arc::default();
        let mut group = world.create_system_group();

        group
            .add(&mut world, Recorder { label: "a", log: Arc::clone(&log) })
            .unwrap();
        let b = group
            .add(&mut world, Recorder { label: "b", log: Arc::clone(&log) })
            .unwrap();
        group.update(&mut world, 0.016).unwrap();
        group.destroy(&mut world);

        assert_eq!(
            *log.lock().unwrap(),
            ["a:create", "b:create", "a:update", "b:update", "a:destroy", "b:destroy"]
        );
        assert!(group.is_empty());
        assert!(group.descriptor(b).is_none());
    }

    #[test]
    fn later_system_sees_earlier_commands_in_same_frame() {
        let mut world = World::new();
        let entities: Vec<Entity> = (0..3).map(|_| world.create_entity()).collect();

        let seen = Arc::new(Mutex::new(0));
        let mut group = world.create_system_group();
        group.add(&mut world, Tagger { query: None }).unwrap();
        group
            .add(&mut world, Counter { query: None, seen: Arc::clone(&seen) })
            .unwrap();

        group.update(&mut world, 0.016).unwrap();
        assert_eq!(*seen.lock().unwrap(), 3);
        assert!(entities.iter().all(|&e| world.has_component::<Marker>(e)));
    }

    #[test]
    fn setup_commands_are_applied_on_add() {
        let mut world = World::new();
        let mut group = world.create_system_group();
        let handle = group.add(&mut world, Spawner).unwrap();

        assert_eq!(world.entity_count(), 1);
        assert_eq!(group.len(), 1);
        assert_eq!(group.descriptor(handle).map(|d| d.name()), Some("Spawner"));
    }
}
