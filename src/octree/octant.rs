// Copyright (C) 2024 GLStudios
// SPDX-License-Identifier: LGPL-2.1-only

use std::collections::{
    BTreeMap,
    BTreeSet,
};

use glam::{
    BVec3A,
    Vec3A,
};
use slotmap::SlotMap;

use super::OctreeConfig;
use crate::{
    registry::ObjectRegistry,
    types::{
        BoundingBox,
        ObjectId,
    },
};

slotmap::new_key_type! {
    pub struct OctantId;
}

/// Bounds of every object known to the tree, consulted when a split has to
/// push a leaf's entities down into its children.
pub type BoundsTable = BTreeMap<ObjectId, BoundingBox>;

#[derive(Clone, Debug)]
pub struct Octant {
    bounds:   BoundingBox,
    depth:    u32,
    parent:   Option<OctantId>,
    children: Option<[OctantId; 8]>,
    entities: BTreeSet<ObjectId>,
    enabled:  bool,
    visible:  bool,
}

impl Octant {
    const fn new(
        bounds: BoundingBox,
        depth: u32,
        parent: Option<OctantId>,
    ) -> Self {
        Self {
            bounds,
            depth,
            parent,
            children: None,
            entities: BTreeSet::new(),
            enabled: true,
            visible: true,
        }
    }

    #[inline]
    #[must_use]
    pub const fn bounds(&self) -> &BoundingBox {
        &self.bounds
    }

    #[inline]
    #[must_use]
    pub fn center(&self) -> Vec3A {
        self.bounds.center()
    }

    #[inline]
    #[must_use]
    pub const fn min(&self) -> Vec3A {
        self.bounds.min
    }

    #[inline]
    #[must_use]
    pub const fn max(&self) -> Vec3A {
        self.bounds.max
    }

    #[inline]
    #[must_use]
    pub fn half_widths(&self) -> Vec3A {
        self.bounds.half_widths()
    }

    /// Edge length of the (cubic) region.
    #[inline]
    #[must_use]
    pub fn size(&self) -> f32 {
        self.bounds.size().max_element()
    }

    #[inline]
    #[must_use]
    pub const fn depth(&self) -> u32 {
        self.depth
    }

    #[inline]
    #[must_use]
    pub const fn parent(&self) -> Option<OctantId> {
        self.parent
    }

    #[inline]
    #[must_use]
    pub const fn children(&self) -> Option<&[OctantId; 8]> {
        self.children.as_ref()
    }

    #[inline]
    #[must_use]
    pub const fn entities(&self) -> &BTreeSet<ObjectId> {
        &self.entities
    }

    #[inline]
    #[must_use]
    pub const fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    #[inline]
    #[must_use]
    pub const fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn contains_more_than(
        &self,
        count: usize,
    ) -> bool {
        self.entities.len() > count
    }

    #[inline]
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[inline]
    #[must_use]
    pub const fn is_visible(&self) -> bool {
        self.visible
    }

    #[inline]
    #[must_use]
    pub fn intersects(
        &self,
        bounds: &BoundingBox,
    ) -> bool {
        self.bounds.overlaps(bounds)
    }

    fn wants_split(
        &self,
        config: &OctreeConfig,
    ) -> bool {
        self.depth < config.max_depth
            && self.entities.len() + 1 > config.ideal_capacity
            && self.size() > config.min_size
    }
}

/// Node storage for one tree. Parents own their children through the arena;
/// parent links are plain handles used for walking up.
#[derive(Clone, Debug)]
pub struct Octants {
    nodes: SlotMap<OctantId, Octant>,
    root:  OctantId,
}

impl Octants {
    #[must_use]
    pub fn with_root(bounds: BoundingBox) -> Self {
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(Octant::new(bounds, 0, None));
        Self { nodes, root }
    }

    /// Drop every node and start over from a single root leaf.
    pub fn reset(
        &mut self,
        bounds: BoundingBox,
    ) {
        let dropped = self.nodes.len();
        self.nodes.clear();
        self.root = self.nodes.insert(Octant::new(bounds, 0, None));
        tracing::trace!(dropped, "reset octants");
    }

    #[inline]
    #[must_use]
    pub const fn root(&self) -> OctantId {
        self.root
    }

    #[inline]
    #[must_use]
    pub fn get(
        &self,
        id: OctantId,
    ) -> Option<&Octant> {
        self.nodes.get(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (OctantId, &Octant)> {
        self.nodes.iter()
    }

    /// Child `index` in `[0, 7]`; `None` for leaves, stale ids or bad indices.
    #[must_use]
    pub fn child(
        &self,
        id: OctantId,
        index: usize,
    ) -> Option<OctantId> {
        self.nodes.get(id)?.children?.get(index).copied()
    }

    #[must_use]
    pub fn parent(
        &self,
        id: OctantId,
    ) -> Option<OctantId> {
        self.nodes.get(id)?.parent
    }

    #[must_use]
    pub fn intersects(
        &self,
        id: OctantId,
        bounds: &BoundingBox,
    ) -> bool {
        self.nodes.get(id).is_some_and(|octant| octant.intersects(bounds))
    }

    #[must_use]
    pub fn max_depth_reached(&self) -> u32 {
        self.nodes.values().map(Octant::depth).max().unwrap_or(0)
    }

    pub fn set_enabled(
        &mut self,
        enabled: bool,
    ) {
        for octant in self.nodes.values_mut() {
            octant.enabled = enabled;
        }
    }

    pub fn set_visible(
        &mut self,
        visible: bool,
    ) {
        for octant in self.nodes.values_mut() {
            octant.visible = visible;
        }
    }

    pub fn set_octant_enabled(
        &mut self,
        id: OctantId,
        enabled: bool,
    ) -> bool {
        let Some(octant) = self.nodes.get_mut(id) else {
            return false;
        };
        octant.enabled = enabled;
        true
    }

    /// Place `object` under `at`. Interior nodes forward it to every child it
    /// overlaps; leaves either take it or split first. Returns whether any
    /// leaf accepted the object.
    pub fn insert(
        &mut self,
        at: OctantId,
        object: ObjectId,
        bounds: &BoundingBox,
        config: &OctreeConfig,
        table: &BoundsTable,
    ) -> bool {
        let Some(start) = self.nodes.get(at) else {
            return false;
        };
        // The root encloses everything by construction.
        if !start.is_root() && !start.intersects(bounds) {
            return false;
        }

        let mut accepted = false;
        let mut search = vec![at];
        while let Some(id) = search.pop() {
            let Some(octant) = self.nodes.get(id) else {
                continue;
            };
            if !octant.enabled {
                continue;
            }

            if let Some(children) = octant.children {
                let before = search.len();
                search.extend(
                    children
                        .into_iter()
                        .filter(|child| self.intersects(*child, bounds)),
                );

                // Only reachable from the root with bounds outside its region.
                if search.len() == before {
                    let point = bounds.center().clamp(octant.min(), octant.max());
                    if let Some(child) = children.into_iter().find(|child| {
                        self.nodes
                            .get(*child)
                            .is_some_and(|c| c.bounds.contains_point(point))
                    }) {
                        search.push(child);
                    }
                }
                continue;
            }

            if octant.entities.contains(&object) {
                accepted = true;
                continue;
            }

            if octant.wants_split(config) && self.subdivide(id, config, table) {
                search.push(id);
                continue;
            }

            if let Some(octant) = self.nodes.get_mut(id) {
                octant.entities.insert(object);
                accepted = true;
            }
        }

        if !accepted {
            tracing::trace!(%object, "insert rejected");
        }
        accepted
    }

    /// Split a leaf into eight half-size children and push its entities down.
    ///
    /// Refuses (returns `false`) on interior or disabled nodes, at the depth
    /// limit, or when the region is already at the minimum size.
    pub fn subdivide(
        &mut self,
        id: OctantId,
        config: &OctreeConfig,
        table: &BoundsTable,
    ) -> bool {
        let Some(octant) = self.nodes.get(id) else {
            return false;
        };
        if !octant.enabled
            || !octant.is_leaf()
            || octant.depth >= config.max_depth
            || octant.size() <= config.min_size
        {
            return false;
        }

        // Children share the parent's faces and meet at its center planes.
        let BoundingBox { max, min } = octant.bounds;
        let center = octant.center();
        let depth = octant.depth + 1;
        let visible = octant.visible;

        let children = std::array::from_fn(|i| {
            let upper = BVec3A::new(i & 0b100 != 0, i & 0b010 != 0, i & 0b001 != 0);
            let bounds = BoundingBox {
                max: Vec3A::select(upper, max, center),
                min: Vec3A::select(upper, center, min),
            };
            let mut child = Octant::new(bounds, depth, Some(id));
            child.visible = visible;
            self.nodes.insert(child)
        });

        let Some(octant) = self.nodes.get_mut(id) else {
            return false;
        };
        octant.children = Some(children);
        let entities = std::mem::take(&mut octant.entities);
        tracing::trace!(?id, depth, entities = entities.len(), "subdivided");

        for object in entities {
            let Some(bounds) = table.get(&object) else {
                tracing::warn!(%object, "no bounds for entity while subdividing");
                continue;
            };
            self.insert(id, object, bounds, config, table);
        }

        true
    }

    /// Walk to the leaves under `at` and record each held object against the
    /// leaf holding it.
    pub fn assign_leaf_ownership<R: ObjectRegistry + ?Sized>(
        &self,
        at: OctantId,
        registry: &mut R,
    ) {
        for leaf in self.leaves(at) {
            let Some(octant) = self.nodes.get(leaf) else {
                continue;
            };
            for object in &octant.entities {
                registry.assign_leaf(*object, leaf);
            }
        }
    }

    /// Every leaf under `at`, empty or not, in depth-first child order.
    #[must_use]
    pub fn leaves(
        &self,
        at: OctantId,
    ) -> Vec<OctantId> {
        let mut leaves = Vec::new();
        self.walk(at, |id, octant| {
            if octant.is_leaf() {
                leaves.push(id);
            }
            true
        });
        leaves
    }

    #[must_use]
    pub fn non_empty_leaves(
        &self,
        at: OctantId,
    ) -> Vec<OctantId> {
        let mut leaves = Vec::new();
        self.walk(at, |id, octant| {
            if octant.is_leaf() && !octant.is_empty() {
                leaves.push(id);
            }
            true
        });
        leaves
    }

    /// Leaves under `at` holding `object`. Only subtrees overlapping `bounds`
    /// are searched, so `bounds` must be the ones `object` was inserted with.
    #[must_use]
    pub fn leaves_containing(
        &self,
        at: OctantId,
        object: ObjectId,
        bounds: &BoundingBox,
    ) -> Vec<OctantId> {
        let mut leaves = Vec::new();
        self.walk(at, |id, octant| {
            if !octant.is_root() && !octant.intersects(bounds) {
                return false;
            }
            if octant.entities.contains(&object) {
                leaves.push(id);
            }
            true
        });
        leaves
    }

    /// Deepest node containing `point`, or `None` if it lies outside the root.
    #[must_use]
    pub fn leaf_at(
        &self,
        point: Vec3A,
    ) -> Option<OctantId> {
        let mut current = self.root;
        let mut octant = self.nodes.get(current)?;
        if !octant.bounds.contains_point(point) {
            return None;
        }

        while let Some(children) = octant.children {
            let (id, child) = children
                .into_iter()
                .filter_map(|id| Some((id, self.nodes.get(id)?)))
                .find(|(_, child)| child.bounds.contains_point(point))?;
            current = id;
            octant = child;
        }
        Some(current)
    }

    /// Objects held by leaves overlapping `bounds`, sorted and deduplicated.
    #[must_use]
    pub fn query_volume(
        &self,
        bounds: &BoundingBox,
    ) -> Vec<ObjectId> {
        let mut found = BTreeSet::new();
        self.walk(self.root, |_, octant| {
            if !octant.intersects(bounds) {
                return false;
            }
            found.extend(octant.entities.iter().copied());
            true
        });
        found.into_iter().collect()
    }

    /// Take `object` out of every leaf. Nodes themselves are kept.
    pub fn remove_object(
        &mut self,
        object: ObjectId,
    ) -> usize {
        self.nodes
            .values_mut()
            .map(|octant| octant.entities.remove(&object))
            .filter(|removed| *removed)
            .count()
    }

    pub fn clear_entities(&mut self) {
        for octant in self.nodes.values_mut() {
            octant.entities.clear();
        }
    }

    /// Pre-order walk from `at`. `visit` returns whether to descend into the
    /// node's children.
    pub fn walk(
        &self,
        at: OctantId,
        mut visit: impl FnMut(OctantId, &Octant) -> bool,
    ) {
        let mut search = vec![at];
        while let Some(id) = search.pop() {
            let Some(octant) = self.nodes.get(id) else {
                continue;
            };
            if !visit(id, octant) {
                continue;
            }
            if let Some(children) = octant.children {
                // Reversed so children pop in index order.
                search.extend(children.into_iter().rev());
            }
        }
    }
}
