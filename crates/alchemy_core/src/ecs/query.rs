// query.rs - Cached with/without archetype filters and chunk iteration
//
// Archetypes are only ever appended, so a query keeps its matches and
// scans just the archetypes created since it last looked. The world's
// archetype version tells it when there is anything new.

use crate::ecs::storage::{cast_column_mut, Archetype, ArchetypeIndex};
use crate::ecs::world::WorldState;
use crate::ecs::{ArchetypeIdentifier, Component, ComponentTypeId, Entity, World, WorldId};
use rayon::prelude::*;

/// Builder returned by [`World::create_query`].
///
/// # Example
/// ```ignore
/// let mut query = world.create_query().with::<Position>().without::<Frozen>().build();
/// query.for_each1::<Position, _>(&mut world, |pos| pos.x += 1.0);
/// ```
pub struct QueryBuilder<'w> {
    world: &'w World,
    with: Vec<ComponentTypeId>,
    without: Vec<ComponentTypeId>,
}

impl<'w> QueryBuilder<'w> {
    pub(crate) fn new(world: &'w World) -> Self {
        Self {
            world,
            with: Vec::new(),
            without: Vec::new(),
        }
    }

    /// Require `T`.
    pub fn with<T: Component>(mut self) -> Self {
        self.with.push(self.world.registry().register::<T>().id);
        self
    }

    /// Exclude archetypes containing `T`.
    pub fn without<T: Component>(mut self) -> Self {
        self.without.push(self.world.registry().register::<T>().id);
        self
    }

    pub fn with_id(mut self, id: ComponentTypeId) -> Self {
        self.with.push(id);
        self
    }

    pub fn without_id(mut self, id: ComponentTypeId) -> Self {
        self.without.push(id);
        self
    }

    pub fn build(self) -> Query {
        Query {
            world: self.world.id(),
            with: ArchetypeIdentifier::from_components(self.with),
            without: ArchetypeIdentifier::from_components(self.without),
            matches: Vec::new(),
            scanned: 0,
            version: None,
        }
    }
}

/// A with/without filter bound to one world.
///
/// Matches are archetypes whose schema is a superset of `with` and
/// disjoint from `without`, in creation order. Iteration visits matching
/// archetypes, then chunks, then rows in order.
///
/// Iteration borrows the world mutably: structural changes made while
/// iterating must go through a [`CommandBuffer`](crate::ecs::CommandBuffer).
#[derive(Debug, Clone)]
pub struct Query {
    world: WorldId,
    with: ArchetypeIdentifier,
    without: ArchetypeIdentifier,
    matches: Vec<ArchetypeIndex>,
    scanned: usize,
    version: Option<u64>,
}

impl Query {
    fn assert_world(&self, world: &World) {
        assert_eq!(
            self.world,
            world.id(),
            "query used with a world other than the one that built it"
        );
    }

    fn refresh(&mut self, state: &WorldState) {
        if self.version == Some(state.archetype_version) {
            return;
        }

        let start = self.scanned;
        let (with, without) = (&self.with, &self.without);
        let fresh = state.archetypes[start..]
            .iter()
            .enumerate()
            .filter(|(_, archetype)| matches_filter(archetype.identifier(), with, without))
            .map(|(offset, _)| start + offset);
        self.matches.extend(fresh);
        self.scanned = state.archetypes.len();
        self.version = Some(state.archetype_version);
    }

    /// Indices of the matching archetypes, recomputed only if the world has
    /// created archetypes since the last call.
    pub fn matching_archetypes(&mut self, world: &World) -> &[ArchetypeIndex] {
        self.assert_world(world);
        let state = world.state();
        self.refresh(&state);
        &self.matches
    }

    /// Number of entities currently matching.
    pub fn count(&mut self, world: &World) -> usize {
        self.assert_world(world);
        let state = world.state();
        self.refresh(&state);
        self.matches.iter().map(|&index| state.archetypes[index].len()).sum()
    }

    /// Visit every matching entity.
    pub fn for_each_entity<F>(&mut self, world: &mut World, mut f: F)
    where
        F: FnMut(Entity),
    {
        self.assert_world(world);
        let (state, _) = world.split_for_iteration();
        self.refresh(state);
        for &index in &self.matches {
            for chunk in state.archetypes[index].chunks() {
                for &id in chunk.entities() {
                    f(state.entities.current(id));
                }
            }
        }
    }
}

fn matches_filter(
    schema: &ArchetypeIdentifier,
    with: &ArchetypeIdentifier,
    without: &ArchetypeIdentifier,
) -> bool {
    with.components().iter().all(|&id| schema.contains(id))
        && !without.components().iter().any(|&id| schema.contains(id))
}

fn assert_distinct(ids: &[ComponentTypeId]) {
    for (i, id) in ids.iter().enumerate() {
        assert!(
            !ids[i + 1..].contains(id),
            "Cannot get multiple mutable references to the same component"
        );
    }
}

/// Borrow the archetypes at `indices` (ascending) mutably and at once.
fn select_mut<'a>(archetypes: &'a mut [Archetype], indices: &[ArchetypeIndex]) -> Vec<&'a mut Archetype> {
    let mut wanted = indices.iter().peekable();
    archetypes
        .iter_mut()
        .enumerate()
        .filter_map(|(index, archetype)| wanted.next_if_eq(&&index).map(|_| archetype))
        .collect()
}

/// Run `f` over every row of `archetype` that has all of `ids`.
macro_rules! visit_archetype {
    ($archetype:expr, $f:expr; $($T:ident: $id:ident, $slot:ident, $col:ident),+) => {{
        let archetype: &mut Archetype = $archetype;
        if let ($(Some($slot),)+) = ($(archetype.slot_of($id),)+) {
            for chunk in archetype.chunks_mut() {
                let len = chunk.len();
                if len == 0 {
                    continue;
                }
                let [$($col),+] = chunk.columns_mut([$($slot),+]);
                $(let $col = cast_column_mut::<$T>($col, len);)+
                for row in 0..len {
                    ($f)($(&mut $col[row]),+);
                }
            }
        }
    }};
}

macro_rules! impl_for_each {
    ($seq:ident, $par:ident; $($T:ident: $id:ident, $slot:ident, $col:ident),+) => {
        impl Query {
            /// Visit every matching entity with mutable references to the
            /// requested components. Archetypes lacking one are skipped.
            ///
            /// Panics if a component is requested twice.
            pub fn $seq<$($T: Component,)+ F>(&mut self, world: &mut World, mut f: F)
            where
                F: FnMut($(&mut $T),+),
            {
                self.assert_world(world);
                let ($(Some($id),)+) = ($(world.registry().lookup::<$T>().map(|ty| ty.id),)+) else {
                    return;
                };
                assert_distinct(&[$($id),+]);

                let (state, _) = world.split_for_iteration();
                self.refresh(state);
                for &index in &self.matches {
                    visit_archetype!(&mut state.archetypes[index], &mut f; $($T: $id, $slot, $col),+);
                }
            }

            /// Like the sequential form, sharded by archetype across the
            /// world's worker pool (rayon's global pool if none is
            /// configured). Rows of one archetype run on one worker.
            pub fn $par<$($T: Component,)+ F>(&mut self, world: &mut World, f: F)
            where
                F: Fn($(&mut $T),+) + Send + Sync,
            {
                self.assert_world(world);
                let ($(Some($id),)+) = ($(world.registry().lookup::<$T>().map(|ty| ty.id),)+) else {
                    return;
                };
                assert_distinct(&[$($id),+]);

                let (state, pool) = world.split_for_iteration();
                self.refresh(state);
                let selected = select_mut(&mut state.archetypes, &self.matches);
                let f = &f;
                let run = move || {
                    selected.into_par_iter().for_each(|archetype| {
                        visit_archetype!(archetype, f; $($T: $id, $slot, $col),+);
                    });
                };
                match pool {
                    Some(pool) => pool.install(run),
                    None => run(),
                }
            }
        }
    };
}

impl_for_each!(for_each1, for_each_parallel1; A: a_id, a_slot, a_col);
impl_for_each!(for_each2, for_each_parallel2; A: a_id, a_slot, a_col, B: b_id, b_slot, b_col);
impl_for_each!(
    for_each3, for_each_parallel3;
    A: a_id, a_slot, a_col, B: b_id, b_slot, b_col, C: c_id, c_slot, c_col
);
