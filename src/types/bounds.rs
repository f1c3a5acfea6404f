// Copyright (C) 2024 GLStudios
// SPDX-License-Identifier: LGPL-2.1-only

use glam::Vec3A;

/// Axis-aligned box in world space.
///
/// [`BoundingBox::EMPTY`] is inverted so that growing it by any point yields a
/// box around exactly that point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub max: Vec3A,
    pub min: Vec3A,
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl BoundingBox {
    pub const EMPTY: Self = Self {
        max: Vec3A::splat(f32::MIN),
        min: Vec3A::splat(f32::MAX),
    };

    #[must_use]
    pub fn from_min_max(
        min: Vec3A,
        max: Vec3A,
    ) -> Self {
        Self {
            max: max.max(min),
            min: min.min(max),
        }
    }

    #[must_use]
    pub fn from_center_half_widths(
        center: Vec3A,
        half_widths: Vec3A,
    ) -> Self {
        let half_widths = half_widths.abs();
        Self {
            max: center + half_widths,
            min: center - half_widths,
        }
    }

    /// Cube of edge length `size` around `center`.
    #[must_use]
    pub fn cube(
        center: Vec3A,
        size: f32,
    ) -> Self {
        Self::from_center_half_widths(center, Vec3A::splat(size * 0.5))
    }

    #[inline]
    pub fn grow_to_include_point(
        &mut self,
        point: Vec3A,
    ) {
        self.max = self.max.max(point);
        self.min = self.min.min(point);
    }

    #[inline]
    pub fn grow_to_include(
        &mut self,
        other: &Self,
    ) {
        if other.is_empty() {
            return;
        }
        self.grow_to_include_point(other.min);
        self.grow_to_include_point(other.max);
    }

    #[must_use]
    pub fn union(
        mut self,
        other: &Self,
    ) -> Self {
        self.grow_to_include(other);
        self
    }

    /// True until at least one point has been included.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.min.cmpgt(self.max).any()
    }

    /// Empty, or flat along at least one axis.
    #[inline]
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        self.min.cmpge(self.max).any()
    }

    #[inline]
    #[must_use]
    pub fn center(&self) -> Vec3A {
        if self.is_empty() {
            return Vec3A::ZERO;
        }
        (self.min + self.max) * 0.5
    }

    /// Per-axis extent.
    #[inline]
    #[must_use]
    pub fn size(&self) -> Vec3A {
        if self.is_empty() {
            return Vec3A::ZERO;
        }
        self.max - self.min
    }

    #[inline]
    #[must_use]
    pub fn half_widths(&self) -> Vec3A {
        self.size() * 0.5
    }

    #[inline]
    #[must_use]
    pub fn diagonal(&self) -> f32 {
        self.size().length()
    }

    /// Inclusive on faces: boxes that only touch still overlap.
    #[inline]
    #[must_use]
    pub fn overlaps(
        &self,
        other: &Self,
    ) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        self.min.cmple(other.max).all() && other.min.cmple(self.max).all()
    }

    #[inline]
    #[must_use]
    pub fn contains_point(
        &self,
        point: Vec3A,
    ) -> bool {
        self.min.cmple(point).all() && point.cmple(self.max).all()
    }

    /// `other` lies entirely inside `self`.
    #[inline]
    #[must_use]
    pub fn contains(
        &self,
        other: &Self,
    ) -> bool {
        !other.is_empty() && self.contains_point(other.min) && self.contains_point(other.max)
    }

    #[must_use]
    pub fn corners(&self) -> [Vec3A; 8] {
        let (min, max) = (self.min, self.max);
        std::array::from_fn(|i| {
            Vec3A::new(
                if i & 0b100 == 0 { min.x } else { max.x },
                if i & 0b010 == 0 { min.y } else { max.y },
                if i & 0b001 == 0 { min.z } else { max.z },
            )
        })
    }
}
