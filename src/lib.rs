// Copyright (C) 2024 GLStudios
// SPDX-License-Identifier: LGPL-2.1-only

//! Octree broad phase for movable bounding volumes.
//!
//! An [`Octree`] is rebuilt from an [`ObjectRegistry`] once per simulation
//! step. Objects that share a leaf become candidate pairs for whatever
//! [`NarrowPhase`] test the caller runs afterwards.

pub mod debug_draw;
pub mod narrow;
pub mod octree;
pub mod registry;
pub mod types;

pub use debug_draw::{
    Canvas,
    DebugDraw,
};
pub use narrow::{
    AabbOverlap,
    NarrowPhase,
};
pub use octree::{
    Octant,
    OctantId,
    Octree,
    OctreeConfig,
    UpdateReport,
};
pub use registry::{
    ObjectRegistry,
    World,
};
pub use types::{
    BoundingBox,
    ObjectId,
};
