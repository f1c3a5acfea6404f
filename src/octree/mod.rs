// Copyright (C) 2024 GLStudios
// SPDX-License-Identifier: LGPL-2.1-only

mod config;
mod octant;

use std::collections::VecDeque;

pub use config::OctreeConfig;
use glam::Vec3A;
pub use octant::{
    BoundsTable,
    Octant,
    OctantId,
    Octants,
};
use rayon::{
    iter::{
        IntoParallelIterator,
        IntoParallelRefIterator,
        ParallelIterator,
    },
    slice::ParallelSliceMut,
};
use rgb::RGB8;

use crate::{
    debug_draw::DebugDraw,
    narrow::NarrowPhase,
    registry::ObjectRegistry,
    types::{
        BoundingBox,
        ObjectId,
    },
};

/// Outcome of one [`Octree::update`] call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UpdateReport {
    pub processed: usize,
    pub remaining: usize,
    pub rebuilt:   bool,
}

/// Owns the octant arena and decides when to rebuild it.
#[derive(Clone, Debug)]
pub struct Octree {
    config:   OctreeConfig,
    octants:  Octants,
    entities: BoundsTable,
    leaves:   Vec<OctantId>,
    pending:  VecDeque<ObjectId>,
    enabled:  bool,
    visible:  bool,
}

impl Default for Octree {
    fn default() -> Self {
        Self::new(OctreeConfig::default())
    }
}

impl Octree {
    #[must_use]
    pub fn new(config: OctreeConfig) -> Self {
        Self {
            config:   config.validated(),
            octants:  Octants::with_root(BoundingBox::cube(Vec3A::ZERO, 0.0)),
            entities: BoundsTable::new(),
            leaves:   Vec::new(),
            pending:  VecDeque::new(),
            enabled:  true,
            visible:  true,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &OctreeConfig {
        &self.config
    }

    /// Setters apply to every insert from now on, including those made by
    /// [`Octree::update`]. Nodes that already exist are not re-split or merged
    /// until the next rebuild.
    pub fn set_max_depth(
        &mut self,
        max_depth: u32,
    ) {
        self.config.max_depth = OctreeConfig::valid_max_depth(max_depth);
    }

    pub fn set_ideal_capacity(
        &mut self,
        ideal_capacity: usize,
    ) {
        self.config.ideal_capacity = OctreeConfig::valid_ideal_capacity(ideal_capacity);
    }

    pub fn set_min_size(
        &mut self,
        min_size: f32,
    ) {
        self.config.min_size = OctreeConfig::valid_min_size(min_size);
    }

    pub fn set_max_batch(
        &mut self,
        max_batch: usize,
    ) {
        self.config.max_batch = OctreeConfig::valid_max_batch(max_batch);
    }

    #[must_use]
    pub const fn octants(&self) -> &Octants {
        &self.octants
    }

    #[must_use]
    pub const fn root(&self) -> OctantId {
        self.octants.root()
    }

    #[must_use]
    pub fn root_bounds(&self) -> BoundingBox {
        self.octants
            .get(self.root())
            .map_or(BoundingBox::EMPTY, |root| *root.bounds())
    }

    /// Non-empty leaves as of the last build or update.
    #[must_use]
    pub fn leaves(&self) -> &[OctantId] {
        &self.leaves
    }

    #[must_use]
    pub fn octant_count(&self) -> usize {
        self.octants.len()
    }

    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    #[must_use]
    pub fn contains_entity(
        &self,
        id: ObjectId,
    ) -> bool {
        self.entities.contains_key(&id)
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Leaves currently holding `id`.
    #[must_use]
    pub fn entity_dimensions(
        &self,
        id: ObjectId,
    ) -> Vec<OctantId> {
        let Some(bounds) = self.entities.get(&id) else {
            return Vec::new();
        };
        self.octants.leaves_containing(self.root(), id, bounds)
    }

    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(
        &mut self,
        enabled: bool,
    ) {
        self.enabled = enabled;
        self.octants.set_enabled(enabled);
    }

    #[must_use]
    pub const fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(
        &mut self,
        visible: bool,
    ) {
        self.visible = visible;
        self.octants.set_visible(visible);
    }

    /// Cube around every corner of `bounds`, with an edge no shorter than the
    /// diagonal of their union.
    #[must_use]
    pub fn enclosing_cube<'a>(bounds: impl IntoIterator<Item = &'a BoundingBox>) -> BoundingBox {
        let mut union = BoundingBox::EMPTY;
        for corner in bounds.into_iter().flat_map(BoundingBox::corners) {
            union.grow_to_include_point(corner);
        }
        if union.is_empty() {
            return BoundingBox::cube(Vec3A::ZERO, 0.0);
        }

        let size = union.diagonal().max(union.size().max_element());
        BoundingBox::cube(union.center(), size)
    }

    /// Full rebuild: fit the root around `ids`, reinsert all of them and hand
    /// leaf ownership back to the registry.
    #[tracing::instrument(skip_all)]
    pub fn construct_tree<R: ObjectRegistry + ?Sized>(
        &mut self,
        registry: &mut R,
        ids: impl IntoIterator<Item = ObjectId>,
    ) {
        for id in self.entities.keys() {
            registry.clear_leaves(*id);
        }
        self.entities.clear();
        self.pending.clear();

        for id in ids {
            match registry.bounds(id) {
                Some(bounds) if !bounds.is_empty() => {
                    self.entities.insert(id, bounds);
                },
                _ => tracing::warn!(%id, "object has no bounds, skipping"),
            }
        }

        let root_bounds = Self::enclosing_cube(self.entities.values());
        self.octants.reset(root_bounds);
        if !self.enabled {
            self.octants.set_enabled(false);
        }
        if !self.visible {
            self.octants.set_visible(false);
        }

        let root = self.root();
        for (id, bounds) in &self.entities {
            registry.clear_leaves(*id);
            self.octants
                .insert(root, *id, bounds, &self.config, &self.entities);
        }
        self.octants.assign_leaf_ownership(root, registry);
        self.construct_list();

        #[allow(clippy::cast_precision_loss)]
        let average = if self.leaves.is_empty() {
            0.0
        } else {
            self.leaves
                .iter()
                .filter_map(|leaf| self.octants.get(*leaf))
                .map(|octant| octant.entities().len())
                .sum::<usize>() as f64
                / self.leaves.len() as f64
        };
        tracing::debug!(
            entities = self.entities.len(),
            octants = self.octants.len(),
            leaves = self.leaves.len(),
            max_depth = self.octants.max_depth_reached(),
            root.center = ?root_bounds.center(),
            root.size = root_bounds.size().max_element(),
            "constructed tree (avg {average:.2} per leaf)"
        );
    }

    /// Rebuild over the entities already tracked, re-reading their bounds.
    pub fn rebuild<R: ObjectRegistry + ?Sized>(
        &mut self,
        registry: &mut R,
    ) {
        let ids = self
            .entities
            .keys()
            .copied()
            .chain(self.pending.iter().copied())
            .collect::<Vec<_>>();
        self.construct_tree(registry, ids);
    }

    /// Refresh the flat list of non-empty leaves.
    pub fn construct_list(&mut self) {
        self.leaves = self.octants.non_empty_leaves(self.root());
    }

    /// Queue a new entity; it is placed on the next [`Octree::update`].
    pub fn add_entity(
        &mut self,
        id: ObjectId,
    ) {
        if !self.pending.contains(&id) {
            self.pending.push_back(id);
        }
    }

    /// Queue a tracked entity whose bounds have changed.
    pub fn mark_dirty(
        &mut self,
        id: ObjectId,
    ) -> bool {
        if !self.entities.contains_key(&id) {
            return false;
        }
        self.add_entity(id);
        true
    }

    /// Drop `id` from every leaf. Returns `false` if it was not tracked.
    pub fn remove_entity<R: ObjectRegistry + ?Sized>(
        &mut self,
        registry: &mut R,
        id: ObjectId,
    ) -> bool {
        self.pending.retain(|queued| *queued != id);
        if self.entities.remove(&id).is_none() {
            return false;
        }

        self.octants.remove_object(id);
        registry.clear_leaves(id);
        self.construct_list();
        true
    }

    /// Place up to `max_batch` queued entities. Falls back to a full rebuild
    /// when one of them no longer fits inside the root.
    #[tracing::instrument(skip_all)]
    pub fn update<R: ObjectRegistry + ?Sized>(
        &mut self,
        registry: &mut R,
    ) -> UpdateReport {
        if self.pending.is_empty() {
            return UpdateReport::default();
        }

        let root = self.root();
        let root_bounds = self.root_bounds();
        let octants_before = self.octants.len();
        let mut placed = Vec::new();
        let mut processed = 0;
        let mut escaped = false;

        while processed < self.config.max_batch {
            let Some(id) = self.pending.pop_front() else {
                break;
            };
            processed += 1;

            self.octants.remove_object(id);
            registry.clear_leaves(id);

            let Some(bounds) = registry.bounds(id).filter(|bounds| !bounds.is_empty()) else {
                tracing::debug!(%id, "entity left the registry");
                self.entities.remove(&id);
                continue;
            };
            self.entities.insert(id, bounds);

            if !root_bounds.contains(&bounds) {
                escaped = true;
                continue;
            }
            self.octants
                .insert(root, id, &bounds, &self.config, &self.entities);
            placed.push((id, bounds));
        }

        if escaped {
            tracing::debug!(processed, "entity escaped root, rebuilding");
            self.rebuild(registry);
            return UpdateReport {
                processed,
                remaining: 0,
                rebuilt: true,
            };
        }

        if self.octants.len() == octants_before {
            for (id, bounds) in placed {
                for leaf in self.octants.leaves_containing(root, id, &bounds) {
                    registry.assign_leaf(id, leaf);
                }
            }
        } else {
            // A split moved other entities too.
            for id in self.entities.keys() {
                registry.clear_leaves(*id);
            }
            self.octants.assign_leaf_ownership(root, registry);
        }
        self.construct_list();

        tracing::trace!(processed, remaining = self.pending.len(), "updated entities");
        UpdateReport {
            processed,
            remaining: self.pending.len(),
            rebuilt: false,
        }
    }

    #[must_use]
    pub fn leaf_at(
        &self,
        point: Vec3A,
    ) -> Option<OctantId> {
        self.octants.leaf_at(point)
    }

    #[must_use]
    pub fn query_volume(
        &self,
        bounds: &BoundingBox,
    ) -> Vec<ObjectId> {
        self.octants.query_volume(bounds)
    }

    /// Every unordered pair sharing a leaf, as `(low, high)`, sorted.
    #[must_use]
    pub fn candidate_pairs(&self) -> Vec<(ObjectId, ObjectId)> {
        let mut pairs = self
            .leaves
            .par_iter()
            .filter_map(|leaf| self.octants.get(*leaf))
            .flat_map_iter(leaf_pairs)
            .collect::<Vec<_>>();
        pairs.par_sort_unstable();
        pairs.dedup();
        pairs
    }

    /// Objects sharing at least one leaf with `id`.
    #[must_use]
    pub fn candidates_for(
        &self,
        id: ObjectId,
    ) -> Vec<ObjectId> {
        let mut found = self
            .entity_dimensions(id)
            .into_iter()
            .filter_map(|leaf| self.octants.get(leaf))
            .flat_map(|octant| octant.entities().iter().copied())
            .filter(|other| *other != id)
            .collect::<Vec<_>>();
        found.sort_unstable();
        found.dedup();
        found
    }

    /// Candidate pairs confirmed by `narrow`.
    #[must_use]
    pub fn colliding_pairs<N: NarrowPhase + Sync + ?Sized>(
        &self,
        narrow: &N,
    ) -> Vec<(ObjectId, ObjectId)> {
        self.candidate_pairs()
            .into_par_iter()
            .filter(|(a, b)| narrow.colliding(*a, *b))
            .collect()
    }

    pub fn draw_octant<D: DebugDraw + ?Sized>(
        &self,
        id: OctantId,
        sink: &mut D,
        color: RGB8,
    ) -> bool {
        let Some(octant) = self.octants.get(id) else {
            return false;
        };
        if octant.is_visible() {
            sink.wire_box(octant.bounds(), color);
        }
        true
    }

    /// Every visible node, interior ones included.
    pub fn draw_branches<D: DebugDraw + ?Sized>(
        &self,
        sink: &mut D,
        color: RGB8,
    ) {
        self.octants.walk(self.root(), |_, octant| {
            if octant.is_visible() {
                sink.wire_box(octant.bounds(), color);
            }
            true
        });
    }

    pub fn draw_leaves<D: DebugDraw + ?Sized>(
        &self,
        sink: &mut D,
        color: RGB8,
    ) {
        for leaf in &self.leaves {
            self.draw_octant(*leaf, sink, color);
        }
    }
}

fn leaf_pairs(octant: &Octant) -> Vec<(ObjectId, ObjectId)> {
    let ids = octant.entities().iter().copied().collect::<Vec<_>>();
    let mut pairs = Vec::with_capacity(ids.len() * ids.len().saturating_sub(1) / 2);
    for (i, a) in ids.iter().enumerate() {
        for b in &ids[i + 1..] {
            pairs.push((*a, *b));
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::World;

    fn unit_at(center: Vec3A) -> BoundingBox {
        BoundingBox::cube(center, 1.0)
    }

    fn built(
        config: OctreeConfig,
        world: &mut World,
    ) -> Octree {
        let mut octree = Octree::new(config);
        let ids = world.ids().collect::<Vec<_>>();
        octree.construct_tree(world, ids);
        octree
    }

    #[test]
    fn enclosing_cube_covers_every_axis() {
        let boxes = [
            unit_at(Vec3A::new(-10.0, 0.0, 0.0)),
            unit_at(Vec3A::new(10.0, 2.0, 0.0)),
        ];
        let cube = Octree::enclosing_cube(&boxes);

        assert_eq!(cube.center(), Vec3A::new(0.0, 1.0, 0.0));
        assert!(boxes.iter().all(|b| cube.contains(b)));
        let size = cube.size();
        assert!((size.x - size.y).abs() < 1e-4 && (size.y - size.z).abs() < 1e-4);

        let empty = Octree::enclosing_cube(&[]);
        assert_eq!(empty.size(), Vec3A::ZERO);
    }

    #[test]
    fn construct_assigns_leaves_in_registry() {
        let mut world = World::new();
        let a = world.spawn(unit_at(Vec3A::splat(-4.0)), Vec3A::ZERO);
        let b = world.spawn(unit_at(Vec3A::splat(4.0)), Vec3A::ZERO);
        let octree = built(OctreeConfig::new(2, 1, 1.0), &mut world);

        assert_eq!(octree.entity_count(), 2);
        assert_eq!(world.leaves(a), octree.entity_dimensions(a).as_slice());
        assert_eq!(world.leaves(b), octree.entity_dimensions(b).as_slice());
        assert_ne!(world.leaves(a), world.leaves(b));
        assert!(octree.candidate_pairs().is_empty());
    }

    #[test]
    fn unknown_ids_are_skipped() {
        let mut world = World::new();
        let a = world.spawn(unit_at(Vec3A::ZERO), Vec3A::ZERO);
        let mut octree = Octree::default();
        octree.construct_tree(&mut world, [a, ObjectId(42)]);

        assert!(octree.contains_entity(a));
        assert!(!octree.contains_entity(ObjectId(42)));
        assert_eq!(octree.leaves().len(), 1);
    }

    #[test]
    fn pairs_come_from_shared_leaves() {
        let mut world = World::new();
        let a = world.spawn(unit_at(Vec3A::splat(-4.0)), Vec3A::ZERO);
        let b = world.spawn(unit_at(Vec3A::splat(-3.5)), Vec3A::ZERO);
        let c = world.spawn(unit_at(Vec3A::splat(4.0)), Vec3A::ZERO);
        let octree = built(OctreeConfig::new(1, 1, 1.0), &mut world);

        assert_eq!(octree.candidate_pairs(), vec![(a, b)]);
        assert_eq!(octree.candidates_for(a), vec![b]);
        assert!(octree.candidates_for(c).is_empty());
        assert!(octree
            .colliding_pairs(&|_: ObjectId, _: ObjectId| false)
            .is_empty());
        assert_eq!(octree.colliding_pairs(&|_: ObjectId, _: ObjectId| true), vec![(a, b)]);
    }

    #[test]
    fn update_moves_dirty_entity() {
        let mut world = World::new();
        let a = world.spawn(unit_at(Vec3A::splat(-4.0)), Vec3A::ZERO);
        let b = world.spawn(unit_at(Vec3A::splat(4.0)), Vec3A::ZERO);
        let mut octree = built(OctreeConfig::new(2, 1, 1.0), &mut world);
        let before = octree.entity_dimensions(a);

        world.translate(a, Vec3A::splat(7.5));
        assert!(octree.mark_dirty(a));
        assert!(!octree.mark_dirty(ObjectId(7)));

        let report = octree.update(&mut world);
        assert_eq!(report.processed, 1);
        assert_eq!(report.remaining, 0);
        assert!(!report.rebuilt);

        let after = octree.entity_dimensions(a);
        assert_ne!(before, after);
        assert_eq!(world.leaves(a), after.as_slice());
        assert!(octree.candidates_for(a).contains(&b));
    }

    #[test]
    fn update_respects_batch_cap() {
        let mut world = World::new();
        let ids = (0u8..5)
            .map(|i| world.spawn(unit_at(Vec3A::splat(f32::from(i))), Vec3A::ZERO))
            .collect::<Vec<_>>();
        let mut octree = Octree::new(OctreeConfig::new(2, 2, 0.5).with_max_batch(2));
        octree.construct_tree(&mut world, ids.iter().copied());

        for id in &ids {
            octree.mark_dirty(*id);
        }
        assert_eq!(octree.pending(), 5);
        assert_eq!(octree.update(&mut world).remaining, 3);
        assert_eq!(octree.update(&mut world).remaining, 1);
        assert_eq!(octree.update(&mut world), UpdateReport {
            processed: 1,
            remaining: 0,
            rebuilt:   false,
        });
        assert_eq!(octree.update(&mut world), UpdateReport::default());
    }

    #[test]
    fn escaping_entity_triggers_rebuild() {
        let mut world = World::new();
        let a = world.spawn(unit_at(Vec3A::ZERO), Vec3A::ZERO);
        let b = world.spawn(unit_at(Vec3A::splat(2.0)), Vec3A::ZERO);
        let mut octree = built(OctreeConfig::default(), &mut world);

        world.translate(b, Vec3A::splat(100.0));
        octree.mark_dirty(b);
        let report = octree.update(&mut world);

        assert!(report.rebuilt);
        assert!(octree.root_bounds().contains(&world.bounds(b).expect("bounds")));
        assert!(!octree.entity_dimensions(a).is_empty());
        assert!(!octree.entity_dimensions(b).is_empty());
    }

    #[test]
    fn added_and_removed_entities() {
        let mut world = World::new();
        let a = world.spawn(unit_at(Vec3A::ZERO), Vec3A::ZERO);
        let mut octree = built(OctreeConfig::default(), &mut world);

        let b = world.spawn(BoundingBox::cube(Vec3A::ZERO, 0.25), Vec3A::ZERO);
        octree.add_entity(b);
        assert!(!octree.contains_entity(b));
        octree.update(&mut world);
        assert!(octree.contains_entity(b));
        assert_eq!(octree.candidate_pairs(), vec![(a, b)]);

        assert!(octree.remove_entity(&mut world, a));
        assert!(!octree.remove_entity(&mut world, a));
        assert!(world.leaves(a).is_empty());
        assert!(octree.candidate_pairs().is_empty());
        assert_eq!(octree.entity_count(), 1);
    }

    #[test]
    fn despawned_entity_is_dropped_on_update() {
        let mut world = World::new();
        let a = world.spawn(unit_at(Vec3A::ZERO), Vec3A::ZERO);
        let mut octree = built(OctreeConfig::default(), &mut world);

        world.despawn(a);
        octree.mark_dirty(a);
        octree.update(&mut world);
        assert!(!octree.contains_entity(a));
        assert!(octree.leaves().is_empty());
    }

    #[test]
    fn setters_validate() {
        let mut octree = Octree::default();
        octree.set_max_depth(u32::MAX);
        octree.set_ideal_capacity(0);
        octree.set_min_size(0.0);
        octree.set_max_batch(0);
        assert_eq!(*octree.config(), OctreeConfig::default());

        octree.set_max_depth(4);
        assert_eq!(octree.config().max_depth, 4);
    }

    #[test]
    fn setters_apply_to_next_update() {
        let mut world = World::new();
        world.spawn(unit_at(Vec3A::splat(-4.0)), Vec3A::ZERO);
        world.spawn(unit_at(Vec3A::splat(4.0)), Vec3A::ZERO);
        let mut octree = built(OctreeConfig::new(0, 1, 1.0), &mut world);
        assert_eq!(octree.octant_count(), 1);

        octree.set_max_depth(2);
        assert_eq!(octree.octant_count(), 1);

        let c = world.spawn(unit_at(Vec3A::new(4.0, -4.0, 4.0)), Vec3A::ZERO);
        octree.add_entity(c);
        octree.update(&mut world);
        assert!(octree.octant_count() > 1);
        assert_eq!(world.leaves(c), octree.entity_dimensions(c).as_slice());
    }

    #[test]
    fn rebuild_clears_ownership_of_dropped_entities() {
        let mut world = World::new();
        let a = world.spawn(unit_at(Vec3A::splat(-4.0)), Vec3A::ZERO);
        let b = world.spawn(unit_at(Vec3A::splat(4.0)), Vec3A::ZERO);
        let mut octree = built(OctreeConfig::new(2, 1, 1.0), &mut world);
        assert!(!world.leaves(b).is_empty());

        octree.construct_tree(&mut world, [a]);
        assert!(!octree.contains_entity(b));
        assert!(world.leaves(b).is_empty());
        assert_eq!(world.leaves(a), octree.entity_dimensions(a).as_slice());
    }

    #[test]
    fn disabled_tree_holds_nothing() {
        let mut world = World::new();
        world.spawn(unit_at(Vec3A::ZERO), Vec3A::ZERO);
        let mut octree = Octree::default();
        octree.set_enabled(false);
        let ids = world.ids().collect::<Vec<_>>();
        octree.construct_tree(&mut world, ids);

        assert!(!octree.is_enabled());
        assert!(octree.leaves().is_empty());
        assert_eq!(octree.entity_count(), 1);
    }

    #[test]
    fn clone_is_independent() {
        let mut world = World::new();
        let a = world.spawn(unit_at(Vec3A::ZERO), Vec3A::ZERO);
        let octree = built(OctreeConfig::default(), &mut world);
        let mut copy = octree.clone();

        copy.remove_entity(&mut world, a);
        assert!(octree.contains_entity(a));
        assert_eq!(octree.leaves().len(), 1);
        assert!(copy.leaves().is_empty());
    }
}
