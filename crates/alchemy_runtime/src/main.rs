//! Alchemy Engine Runtime
//!
//! Boots logging, builds a world from an optional JSON config and drives a
//! small fixed-step simulation through a system group.

use alchemy_core::config::WorldConfig;
use alchemy_core::ecs::{Query, System, SystemContext, World};
use alchemy_metrics::FrameTimer;
use anyhow::{Context, Result};
use bytemuck::{Pod, Zeroable};

const FRAMES: u32 = 600;
const SPAWN_COUNT: u32 = 10_000;
const FIXED_DT: f32 = 1.0 / 60.0;

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
struct Position {
    x: f32,
    y: f32,
    z: f32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
struct Velocity {
    x: f32,
    y: f32,
    z: f32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
struct Lifetime {
    remaining: f32,
}

/// Spawns the initial population during setup.
struct Spawner {
    count: u32,
}

impl System for Spawner {
    fn on_create(&mut self, ctx: &mut SystemContext<'_>) {
        for i in 0..self.count {
            let e = ctx.world.create_entity();
            let f = i as f32;
            ctx.world.add_component(e, Position { x: f, y: 0.0, z: 0.0 });
            ctx.world.add_component(e, Velocity { x: 1.0, y: (f * 0.1).sin(), z: 0.0 });
            if i % 4 == 0 {
                ctx.world.add_component(e, Lifetime { remaining: 1.0 + (i % 7) as f32 });
            }
        }
    }

    fn on_update(&mut self, _ctx: &mut SystemContext<'_>, _dt: f32) {}
}

/// Integrates velocity into position across the worker pool.
#[derive(Default)]
struct Movement {
    query: Option<Query>,
}

impl System for Movement {
    fn on_create(&mut self, ctx: &mut SystemContext<'_>) {
        self.query = Some(ctx.world.create_query().with::<Position>().with::<Velocity>().build());
    }

    fn on_update(&mut self, ctx: &mut SystemContext<'_>, dt: f32) {
        let Some(query) = self.query.as_mut() else { return };
        query.for_each_parallel2::<Position, Velocity, _>(ctx.world, |pos, vel| {
            pos.x += vel.x * dt;
            pos.y += vel.y * dt;
            pos.z += vel.z * dt;
        });
    }
}

/// Counts lifetimes down and destroys expired entities via commands.
#[derive(Default)]
struct Expiry {
    query: Option<Query>,
}

impl System for Expiry {
    fn on_create(&mut self, ctx: &mut SystemContext<'_>) {
        self.query = Some(ctx.world.create_query().with::<Lifetime>().build());
    }

    fn on_update(&mut self, ctx: &mut SystemContext<'_>, dt: f32) {
        let Some(query) = self.query.as_mut() else { return };

        let mut expired = 0usize;
        query.for_each1::<Lifetime, _>(ctx.world, |life| {
            life.remaining -= dt;
            if life.remaining <= 0.0 {
                expired += 1;
            }
        });
        if expired == 0 {
            return;
        }

        let world = &mut *ctx.world;
        let commands = &mut *ctx.commands;
        let mut dead = Vec::with_capacity(expired);
        query.for_each_entity(world, |e| dead.push(e));
        for e in dead {
            if world.get_component::<Lifetime>(e).is_some_and(|life| life.remaining <= 0.0) {
                commands.destroy_entity(e);
            }
        }
    }
}

fn load_config() -> Result<WorldConfig> {
    match std::env::args().nth(1) {
        Some(path) => WorldConfig::load(&path).with_context(|| format!("loading world config from {path}")),
        None => Ok(WorldConfig::default()),
    }
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    tracing::info!("Alchemy Engine v{}", alchemy_core::VERSION);

    let config = load_config()?;
    let mut world = World::with_config(config).context("creating world")?;
    let mut group = world.create_system_group();
    group.add(&mut world, Spawner { count: SPAWN_COUNT })?;
    group.add(&mut world, Movement::default())?;
    group.add(&mut world, Expiry::default())?;

    tracing::info!(
        entities = world.entity_count(),
        archetypes = world.archetype_count(),
        "simulation ready"
    );

    let mut timer = FrameTimer::new(120);
    for _ in 0..FRAMES {
        timer.begin();
        group.update(&mut world, FIXED_DT)?;
        timer.end();
    }

    let (min_ms, max_ms) = timer.frame_time_range_ms();
    tracing::info!(
        frames = FRAMES,
        fps = timer.fps(),
        min_ms,
        max_ms,
        entities = world.entity_count(),
        "simulation finished"
    );
    for (name, timing) in group.profiler().iter() {
        tracing::info!(system = name, calls = timing.calls, total = ?timing.total, "system timing");
    }

    group.destroy(&mut world);
    Ok(())
}
