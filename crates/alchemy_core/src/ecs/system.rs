//! Per-frame logic units run by a [`SystemGroup`](crate::ecs::SystemGroup).

use crate::ecs::{CommandBuffer, ComponentRegistry, SystemDescriptor, World};

/// What a system gets to work with for one hook invocation.
///
/// `commands` is the system's own buffer; it is played back as soon as the
/// hook returns, so structural changes requested while iterating land
/// before the next system runs.
pub struct SystemContext<'w> {
    pub world: &'w mut World,
    pub commands: &'w mut CommandBuffer,
}

/// A unit of simulation logic.
///
/// # Example
/// ```ignore
/// struct Movement { query: Option<Query> }
///
/// impl System for Movement {
///     fn on_create(&mut self, ctx: &mut SystemContext<'_>) {
///         self.query = Some(ctx.world.create_query().with::<Position>().with::<Velocity>().build());
///     }
///
///     fn on_update(&mut self, ctx: &mut SystemContext<'_>, dt: f32) {
///         if let Some(query) = &mut self.query {
///             query.for_each2::<Position, Velocity, _>(ctx.world, |p, v| p.x += v.x * dt);
///         }
///     }
/// }
/// ```
pub trait System: Send {
    /// Name used in logs and profiler timings. Defaults to the type name
    /// without its module path.
    fn name(&self) -> &str {
        let full = std::any::type_name::<Self>();
        full.rsplit("::").next().unwrap_or(full)
    }

    /// Components this system reads and writes.
    fn descriptor(&self, registry: &ComponentRegistry) -> SystemDescriptor {
        let _ = registry;
        SystemDescriptor::new(self.name())
    }

    /// Called once when the system is added to a group.
    fn on_create(&mut self, ctx: &mut SystemContext<'_>) {
        let _ = ctx;
    }

    fn on_update(&mut self, ctx: &mut SystemContext<'_>, dt: f32);

    /// Called once when the group is destroyed.
    fn on_destroy(&mut self, ctx: &mut SystemContext<'_>) {
        let _ = ctx;
    }
}
