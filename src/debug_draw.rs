// Copyright (C) 2024 GLStudios
// SPDX-License-Identifier: LGPL-2.1-only

use glam::Vec3A;
use rgb::RGB8;

use crate::types::BoundingBox;

/// Receiver for wireframe boxes. Drawing is best effort; the octree never
/// looks at what the sink does with them.
pub trait DebugDraw {
    fn wire_box(
        &mut self,
        bounds: &BoundingBox,
        color: RGB8,
    );

    fn solid_box(
        &mut self,
        bounds: &BoundingBox,
        color: RGB8,
    ) {
        self.wire_box(bounds, color);
    }
}

/// Top-down (XZ) raster of a fixed view volume.
#[derive(Clone, Debug)]
pub struct Canvas {
    width:  u32,
    height: u32,
    view:   BoundingBox,
    pixels: Vec<RGB8>,
}

impl Canvas {
    pub const BACKGROUND: RGB8 = RGB8::new(16, 16, 24);

    #[must_use]
    pub fn new(
        width: u32,
        height: u32,
        view: BoundingBox,
    ) -> Self {
        Self {
            width,
            height,
            view,
            pixels: vec![Self::BACKGROUND; width as usize * height as usize],
        }
    }

    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub fn pixels(&self) -> &[RGB8] {
        &self.pixels
    }

    #[must_use]
    pub fn pixel(
        &self,
        x: u32,
        y: u32,
    ) -> Option<RGB8> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::must_cast_slice::<_, u8>(&self.pixels)
    }

    /// Pixel rectangle covered by `bounds`, clamped to the canvas. `None` when
    /// it lies entirely outside the view.
    #[allow(clippy::cast_possible_truncation)]
    #[allow(clippy::cast_sign_loss)]
    #[allow(clippy::cast_precision_loss)]
    fn project(
        &self,
        bounds: &BoundingBox,
    ) -> Option<(u32, u32, u32, u32)> {
        if self.width == 0 || self.height == 0 {
            return None;
        }
        let extent = self.view.size().max(Vec3A::splat(f32::EPSILON));
        let scale = |value: f32, min: f32, extent: f32, pixels: u32| -> f32 {
            (value - min) / extent * pixels as f32
        };

        let x0 = scale(bounds.min.x, self.view.min.x, extent.x, self.width);
        let x1 = scale(bounds.max.x, self.view.min.x, extent.x, self.width);
        let y0 = scale(bounds.min.z, self.view.min.z, extent.z, self.height);
        let y1 = scale(bounds.max.z, self.view.min.z, extent.z, self.height);

        let (w, h) = (self.width as f32, self.height as f32);
        if x1 < 0.0 || y1 < 0.0 || x0 >= w || y0 >= h {
            return None;
        }

        // Saturating casts
        let clamp_x = |v: f32| (v as u32).min(self.width - 1);
        let clamp_y = |v: f32| (v as u32).min(self.height - 1);
        Some((clamp_x(x0), clamp_y(y0), clamp_x(x1), clamp_y(y1)))
    }

    fn put(
        &mut self,
        x: u32,
        y: u32,
        color: RGB8,
    ) {
        let index = y as usize * self.width as usize + x as usize;
        if let Some(px) = self.pixels.get_mut(index) {
            *px = color;
        }
    }
}

impl DebugDraw for Canvas {
    fn wire_box(
        &mut self,
        bounds: &BoundingBox,
        color: RGB8,
    ) {
        let Some((x0, y0, x1, y1)) = self.project(bounds) else {
            return;
        };
        for x in x0..=x1 {
            self.put(x, y0, color);
            self.put(x, y1, color);
        }
        for y in y0..=y1 {
            self.put(x0, y, color);
            self.put(x1, y, color);
        }
    }

    fn solid_box(
        &mut self,
        bounds: &BoundingBox,
        color: RGB8,
    ) {
        let Some((x0, y0, x1, y1)) = self.project(bounds) else {
            return;
        };
        for y in y0..=y1 {
            for x in x0..=x1 {
                self.put(x, y, color);
            }
        }
    }
}
