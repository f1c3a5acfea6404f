// Copyright (C) 2024 GLStudios
// SPDX-License-Identifier: LGPL-2.1-only

/// Tuning for subdivision and incremental updates.
///
/// Invalid values are never rejected, they are swapped for the defaults by
/// [`OctreeConfig::validated`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OctreeConfig {
    /// Deepest level a node may be created at. The root is depth 0, so zero
    /// keeps everything in the root.
    pub max_depth:      u32,
    /// Entity count a leaf may reach before it splits.
    pub ideal_capacity: usize,
    /// Edge length at or below which a leaf refuses to split.
    pub min_size:       f32,
    /// Queued entities handled per [`Octree::update`](super::Octree::update).
    pub max_batch:      usize,
}

impl Default for OctreeConfig {
    fn default() -> Self {
        Self {
            max_depth:      Self::DEFAULT_MAX_DEPTH,
            ideal_capacity: Self::DEFAULT_IDEAL_CAPACITY,
            min_size:       Self::DEFAULT_MIN_SIZE,
            max_batch:      Self::DEFAULT_MAX_BATCH,
        }
    }
}

impl OctreeConfig {
    pub const DEFAULT_IDEAL_CAPACITY: usize = 5;
    pub const DEFAULT_MAX_BATCH: usize = 64;
    pub const DEFAULT_MAX_DEPTH: u32 = 2;
    pub const DEFAULT_MIN_SIZE: f32 = 0.5;
    /// Anything deeper is treated as unset. 8^16 leaves is far beyond any
    /// scene this is meant for.
    pub const DEPTH_LIMIT: u32 = 16;

    #[must_use]
    pub fn new(
        max_depth: u32,
        ideal_capacity: usize,
        min_size: f32,
    ) -> Self {
        Self {
            max_depth,
            ideal_capacity,
            min_size,
            max_batch: Self::DEFAULT_MAX_BATCH,
        }
        .validated()
    }

    #[must_use]
    pub fn with_max_batch(
        mut self,
        max_batch: usize,
    ) -> Self {
        self.max_batch = max_batch;
        self.validated()
    }

    #[must_use]
    pub fn validated(self) -> Self {
        Self {
            max_depth:      Self::valid_max_depth(self.max_depth),
            ideal_capacity: Self::valid_ideal_capacity(self.ideal_capacity),
            min_size:       Self::valid_min_size(self.min_size),
            max_batch:      Self::valid_max_batch(self.max_batch),
        }
    }

    #[must_use]
    pub fn valid_max_depth(value: u32) -> u32 {
        if value > Self::DEPTH_LIMIT {
            tracing::debug!(value, default = Self::DEFAULT_MAX_DEPTH, "invalid max depth");
            return Self::DEFAULT_MAX_DEPTH;
        }
        value
    }

    #[must_use]
    pub fn valid_ideal_capacity(value: usize) -> usize {
        if value == 0 {
            tracing::debug!(default = Self::DEFAULT_IDEAL_CAPACITY, "invalid ideal capacity");
            return Self::DEFAULT_IDEAL_CAPACITY;
        }
        value
    }

    #[must_use]
    pub fn valid_min_size(value: f32) -> f32 {
        if !value.is_finite() || value <= 0.0 {
            tracing::debug!(value, default = Self::DEFAULT_MIN_SIZE, "invalid minimum size");
            return Self::DEFAULT_MIN_SIZE;
        }
        value
    }

    #[must_use]
    pub fn valid_max_batch(value: usize) -> usize {
        if value == 0 {
            tracing::debug!(default = Self::DEFAULT_MAX_BATCH, "invalid max batch");
            return Self::DEFAULT_MAX_BATCH;
        }
        value
    }
}
