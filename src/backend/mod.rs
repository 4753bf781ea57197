use bevy::math::Vec3;

use crate::{
    error::BackendError,
    grid::SampleLayer,
    light::LightState,
};

pub mod cpu;
pub mod gpu;

pub use cpu::CpuBackend;
pub use gpu::WgpuBackend;


/// Largest accumulation or shadow-map edge, in texels.
pub const MAX_TEXTURE_SIZE: u32 = 16384;


/// Rectangle of a texture, in texels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TexelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl TexelRect {
    pub fn full(size: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width: size,
            height: size,
        }
    }

    /// `radius` texels around `(x, y)`, clipped to a `size`x`size` texture.
    pub fn around(x: u32, y: u32, radius: u32, size: u32) -> Self {
        let x0 = x.saturating_sub(radius);
        let y0 = y.saturating_sub(radius);
        let x1 = (x + radius).min(size.saturating_sub(1));
        let y1 = (y + radius).min(size.saturating_sub(1));
        Self {
            x: x0,
            y: y0,
            width: x1 - x0 + 1,
            height: y1 - y0 + 1,
        }
    }

    pub fn fits(&self, size: u32) -> bool {
        self.width > 0
            && self.height > 0
            && self.x.checked_add(self.width).is_some_and(|end| end <= size)
            && self.y.checked_add(self.height).is_some_and(|end| end <= size)
    }

    pub fn out_of_bounds(&self, size: u32) -> BackendError {
        BackendError::ReadbackOutOfBounds {
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
            size,
        }
    }
}


/// Twelve triangles closing the axis-aligned box `min..max`.
pub fn box_triangles(min: Vec3, max: Vec3) -> [[Vec3; 3]; 12] {
    let corner = |x: bool, y: bool, z: bool| {
        Vec3::new(
            if x { max.x } else { min.x },
            if y { max.y } else { min.y },
            if z { max.z } else { min.z },
        )
    };

    let faces = [
        [corner(false, false, false), corner(true, false, false), corner(true, true, false), corner(false, true, false)],
        [corner(false, false, true), corner(true, false, true), corner(true, true, true), corner(false, true, true)],
        [corner(false, false, false), corner(true, false, false), corner(true, false, true), corner(false, false, true)],
        [corner(false, true, false), corner(true, true, false), corner(true, true, true), corner(false, true, true)],
        [corner(false, false, false), corner(false, true, false), corner(false, true, true), corner(false, false, true)],
        [corner(true, false, false), corner(true, true, false), corner(true, true, true), corner(true, false, true)],
    ];

    let mut triangles = [[Vec3::ZERO; 3]; 12];
    for (i, [a, b, c, d]) in faces.into_iter().enumerate() {
        triangles[2 * i] = [a, b, c];
        triangles[2 * i + 1] = [a, c, d];
    }
    triangles
}


/// One point pass: read `previous`, add `weight` for every lit sample, write `target`.
pub struct AccumulationPass<'a, B: ExposureBackend + ?Sized> {
    pub points: &'a B::Points,
    pub light: &'a LightState,
    pub weight: f32,
    pub previous: &'a B::Texture,
    pub target: &'a mut B::Texture,
}


/// GPU context plus depth provider the sampling engine drives.
///
/// A backend owns the occluding scene: `render_depth` is the host depth
/// pre-pass seen from a light camera, and `accumulate` is the point pass that
/// tests samples against the most recent depth buffer. Resources are released
/// when their handles drop.
pub trait ExposureBackend: Send + Sync + 'static {
    type Texture: Send + Sync + 'static;
    type Points: Send + Sync + 'static;

    /// Whether a depth buffer can be sampled by a later pass.
    fn supports_depth_texture(&self) -> bool;

    /// Uploads the position and texel buffers of one layer.
    fn create_points(&mut self, layer: &SampleLayer) -> Result<Self::Points, BackendError>;

    /// A zero-initialized `size`x`size` accumulation target.
    fn create_accumulation_texture(&mut self, size: u32) -> Result<Self::Texture, BackendError>;

    /// Replaces the occluding scene with `triangles` in the local ENU frame.
    fn set_occluders(&mut self, triangles: &[[Vec3; 3]]) -> Result<(), BackendError>;

    /// Installs `light` as the active light and renders the occluder depth buffer.
    fn render_depth(&mut self, light: &LightState) -> Result<(), BackendError>;

    fn accumulate(&mut self, pass: AccumulationPass<'_, Self>) -> Result<(), BackendError>;

    /// Texels of `rect`, row-major starting at its top-left.
    fn read_pixels(&mut self, texture: &Self::Texture, rect: TexelRect) -> Result<Vec<[u8; 4]>, BackendError>;

    fn texture_size(&self, texture: &Self::Texture) -> u32;
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neighborhood_is_clipped_at_edges() {
        assert_eq!(TexelRect::around(0, 0, 1, 8), TexelRect { x: 0, y: 0, width: 2, height: 2 });
        assert_eq!(TexelRect::around(7, 3, 1, 8), TexelRect { x: 6, y: 2, width: 2, height: 3 });
        assert_eq!(TexelRect::around(4, 4, 1, 8), TexelRect { x: 3, y: 3, width: 3, height: 3 });
        assert!(TexelRect::full(8).fits(8));
        assert!(!TexelRect { x: 7, y: 0, width: 2, height: 1 }.fits(8));
    }
}
