//! Frame orchestration through a system group.

use alchemy_core::ecs::{
    ComponentRegistry, Query, System, SystemContext, SystemDescriptor, World,
};
use bytemuck::{Pod, Zeroable};
use std::sync::{Arc, Mutex};

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
struct Position {
    x: f32,
    y: f32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
struct Velocity {
    x: f32,
    y: f32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
struct Spawned {
    frame: u32,
}

/// Creates one entity with a velocity every frame through its buffer.
#[derive(Default)]
struct Emitter {
    frame: u32,
    unplaced: Option<Query>,
}

impl System for Emitter {
    fn descriptor(&self, registry: &ComponentRegistry) -> SystemDescriptor {
        SystemDescriptor::new(self.name())
            .write::<Spawned>(registry)
            .write::<Velocity>(registry)
    }

    fn on_create(&mut self, ctx: &mut SystemContext<'_>) {
        self.unplaced = Some(ctx.world.create_query().without::<Spawned>().build());
    }

    fn on_update(&mut self, ctx: &mut SystemContext<'_>, _dt: f32) {
        self.frame += 1;
        ctx.commands.create_entity();

        // Entities created by last frame's playback have no components yet.
        let Some(query) = self.unplaced.as_mut() else { return };
        let mut fresh = Vec::new();
        query.for_each_entity(ctx.world, |e| fresh.push(e));
        for e in fresh {
            ctx.commands.add_component(e, Spawned { frame: self.frame });
            ctx.commands.add_component(e, Position { x: 0.0, y: 0.0 });
            ctx.commands.add_component(e, Velocity { x: 1.0, y: 2.0 });
        }
    }
}

/// Moves everything with a velocity; runs after the emitter.
#[derive(Default)]
struct Integrate {
    query: Option<Query>,
    moved_per_frame: Arc<Mutex<Vec<usize>>>,
}

impl System for Integrate {
    fn descriptor(&self, registry: &ComponentRegistry) -> SystemDescriptor {
        SystemDescriptor::new(self.name())
            .read::<Velocity>(registry)
            .write::<Position>(registry)
    }

    fn on_create(&mut self, ctx: &mut SystemContext<'_>) {
        self.query = Some(ctx.world.create_query().with::<Position>().with::<Velocity>().build());
    }

    fn on_update(&mut self, ctx: &mut SystemContext<'_>, dt: f32) {
        let Some(query) = self.query.as_mut() else { return };
        query.for_each_parallel2::<Position, Velocity, _>(ctx.world, |pos, vel| {
            pos.x += vel.x * dt;
            pos.y += vel.y * dt;
        });
        let moved = query.count(ctx.world);
        self.moved_per_frame.lock().unwrap().push(moved);
    }
}

#[test]
fn later_system_observes_earlier_structural_changes() {
    let mut world = World::new();
    let moved = Arc::new(Mutex::new(Vec::new()));

    let mut group = world.create_system_group();
    let emitter = group.add(&mut world, Emitter::default()).unwrap();
    let integrate = group
        .add(
            &mut world,
            Integrate {
                query: None,
                moved_per_frame: Arc::clone(&moved),
            },
        )
        .unwrap();

    for _ in 0..4 {
        group.update(&mut world, 1.0).unwrap();
    }

    // Frame 1 only creates a bare entity; from frame 2 on each frame
    // equips the previous frame's entity before Integrate runs.
    assert_eq!(*moved.lock().unwrap(), vec![0, 1, 2, 3]);
    assert_eq!(world.entity_count(), 4);

    let emitter_desc = group.descriptor(emitter).unwrap();
    assert_eq!(emitter_desc.name(), "Emitter");
    assert_eq!(emitter_desc.write_components().len(), 2);
    let integrate_desc = group.descriptor(integrate).unwrap();
    assert_eq!(integrate_desc.read_components().len(), 1);
    assert_eq!(group.iter().count(), 2);

    group.destroy(&mut world);
    assert!(group.is_empty());
}

#[test]
fn integration_results_are_deterministic() {
    let mut world = World::new();
    let e = world.create_entity();
    world.add_component(e, Position { x: 0.0, y: 0.0 });
    world.add_component(e, Velocity { x: 0.5, y: -0.25 });

    let mut group = world.create_system_group();
    group.add(&mut world, Integrate::default()).unwrap();
    for _ in 0..8 {
        group.update(&mut world, 0.5).unwrap();
    }

    assert_eq!(world.get_component::<Position>(e), Some(Position { x: 2.0, y: -1.0 }));
}

#[test]
#[should_panic(expected = "other than the one that created it")]
fn group_is_bound_to_its_world() {
    let world = World::new();
    let mut other = World::new();
    let mut group = world.create_system_group();
    let _ = group.update(&mut other, 0.1);
}
