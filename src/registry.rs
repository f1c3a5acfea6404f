// Copyright (C) 2024 GLStudios
// SPDX-License-Identifier: LGPL-2.1-only

use std::collections::BTreeMap;

use glam::Vec3A;

use crate::{
    octree::OctantId,
    types::{
        BoundingBox,
        ObjectId,
    },
};

/// Source of object bounds for the octree, and sink for leaf ownership.
pub trait ObjectRegistry {
    /// World-space bounds of `id`, or `None` if the registry does not know it.
    fn bounds(
        &self,
        id: ObjectId,
    ) -> Option<BoundingBox>;

    /// Record that `id` is held by `leaf`. Called once per (object, leaf) pair.
    fn assign_leaf(
        &mut self,
        id: ObjectId,
        leaf: OctantId,
    );

    /// Forget every leaf previously assigned to `id`.
    fn clear_leaves(
        &mut self,
        id: ObjectId,
    );
}

#[derive(Clone, Debug)]
pub struct Body {
    pub bounds:   BoundingBox,
    pub velocity: Vec3A,
    leaves:       Vec<OctantId>,
}

impl Body {
    #[must_use]
    pub fn leaves(&self) -> &[OctantId] {
        &self.leaves
    }
}

/// In-memory registry of moving axis-aligned bodies.
#[derive(Clone, Debug, Default)]
pub struct World {
    bodies:  BTreeMap<ObjectId, Body>,
    next_id: u32,
}

impl World {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn(
        &mut self,
        bounds: BoundingBox,
        velocity: Vec3A,
    ) -> ObjectId {
        let id = ObjectId(self.next_id);
        self.next_id += 1;
        self.bodies.insert(id, Body {
            bounds,
            velocity,
            leaves: Vec::new(),
        });
        tracing::trace!(%id, bounds.min = ?bounds.min, bounds.max = ?bounds.max, "spawned body");
        id
    }

    pub fn despawn(
        &mut self,
        id: ObjectId,
    ) -> Option<Body> {
        self.bodies.remove(&id)
    }

    #[must_use]
    pub fn body(
        &self,
        id: ObjectId,
    ) -> Option<&Body> {
        self.bodies.get(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.bodies.keys().copied()
    }

    /// Leaves last recorded for `id`; empty for unknown ids.
    #[must_use]
    pub fn leaves(
        &self,
        id: ObjectId,
    ) -> &[OctantId] {
        match self.bodies.get(&id) {
            Some(body) => body.leaves(),
            None => &[],
        }
    }

    pub fn translate(
        &mut self,
        id: ObjectId,
        delta: Vec3A,
    ) -> bool {
        let Some(body) = self.bodies.get_mut(&id) else {
            return false;
        };
        body.bounds.min += delta;
        body.bounds.max += delta;
        true
    }

    /// Advance every body by `dt`, reflecting velocity off the walls of
    /// `arena`. Returns the ids of bodies that moved.
    pub fn step(
        &mut self,
        dt: f32,
        arena: &BoundingBox,
    ) -> Vec<ObjectId> {
        let mut moved = Vec::new();
        for (id, body) in &mut self.bodies {
            if body.velocity == Vec3A::ZERO {
                continue;
            }

            let delta = body.velocity * dt;
            body.bounds.min += delta;
            body.bounds.max += delta;

            // Bounce
            let below = body.bounds.min.cmplt(arena.min);
            let above = body.bounds.max.cmpgt(arena.max);
            let flip = below | above;
            if flip.any() {
                let push = Vec3A::select(below, arena.min - body.bounds.min, Vec3A::ZERO)
                    + Vec3A::select(above, arena.max - body.bounds.max, Vec3A::ZERO);
                body.bounds.min += push;
                body.bounds.max += push;
                body.velocity = Vec3A::select(flip, -body.velocity, body.velocity);
            }

            moved.push(*id);
        }
        moved
    }
}

impl ObjectRegistry for World {
    fn bounds(
        &self,
        id: ObjectId,
    ) -> Option<BoundingBox> {
        self.bodies.get(&id).map(|body| body.bounds)
    }

    fn assign_leaf(
        &mut self,
        id: ObjectId,
        leaf: OctantId,
    ) {
        let Some(body) = self.bodies.get_mut(&id) else {
            return;
        };
        if !body.leaves.contains(&leaf) {
            body.leaves.push(leaf);
        }
    }

    fn clear_leaves(
        &mut self,
        id: ObjectId,
    ) {
        if let Some(body) = self.bodies.get_mut(&id) {
            body.leaves.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_and_lookup() {
        let mut world = World::new();
        let a = world.spawn(BoundingBox::cube(Vec3A::ZERO, 1.0), Vec3A::ZERO);
        let b = world.spawn(BoundingBox::cube(Vec3A::X, 1.0), Vec3A::ZERO);

        assert_ne!(a, b);
        assert_eq!(world.len(), 2);
        assert_eq!(world.bounds(b), Some(BoundingBox::cube(Vec3A::X, 1.0)));
        assert_eq!(world.bounds(ObjectId(99)), None);
        assert!(world.leaves(ObjectId(99)).is_empty());

        assert!(world.despawn(a).is_some());
        assert_eq!(world.ids().collect::<Vec<_>>(), vec![b]);
    }

    #[test]
    fn step_bounces_off_walls() {
        let arena = BoundingBox::cube(Vec3A::ZERO, 10.0);
        let mut world = World::new();
        let id = world.spawn(BoundingBox::cube(Vec3A::new(4.0, 0.0, 0.0), 1.0), Vec3A::X);
        let still = world.spawn(BoundingBox::cube(Vec3A::ZERO, 1.0), Vec3A::ZERO);

        let moved = world.step(2.0, &arena);
        assert_eq!(moved, vec![id]);

        let body = world.body(id).expect("body exists");
        assert!(arena.contains(&body.bounds));
        assert!(body.velocity.x < 0.0);
        assert_eq!(world.body(still).expect("body exists").bounds.center(), Vec3A::ZERO);
    }
}
