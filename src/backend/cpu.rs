//! Software reference backend: rasterizes occluder triangles into a light-space
//! depth map on the CPU and runs the point pass with the same packing as the GPU
//! path. Used for headless reports and the test suite.

use bevy::math::{DMat4, DVec3, UVec2, Vec3};

use crate::{
    backend::{box_triangles, AccumulationPass, ExposureBackend, TexelRect, MAX_TEXTURE_SIZE},
    encoding::{pack_ratio, unpack_ratio},
    error::BackendError,
    grid::SampleLayer,
    light::LightState,
};


pub const DEFAULT_SHADOW_MAP_SIZE: u32 = 1024;
pub const DEFAULT_DEPTH_BIAS: f32 = 1e-4;


/// Row-major index of `(x, y)`, computed in `usize` so large sizes cannot wrap.
fn texel_index(size: u32, x: u32, y: u32) -> usize {
    y as usize * size as usize + x as usize
}

fn texel_count(size: u32) -> usize {
    size as usize * size as usize
}


#[derive(Debug, Clone)]
pub struct CpuTexture {
    size: u32,
    texels: Vec<[u8; 4]>,
}

impl CpuTexture {
    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn texel(&self, x: u32, y: u32) -> [u8; 4] {
        self.texels[texel_index(self.size, x, y)]
    }
}


#[derive(Debug, Clone)]
pub struct CpuPoints {
    positions: Vec<Vec3>,
    texels: Vec<UVec2>,
}

impl CpuPoints {
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}


struct DepthMap {
    size: u32,
    clip_from_local: Option<DMat4>,
    depth: Vec<f32>,
}

impl DepthMap {
    fn clear(size: u32, clip_from_local: Option<DMat4>) -> Self {
        Self {
            size,
            clip_from_local,
            depth: vec![1.0; texel_count(size)],
        }
    }

    fn to_pixel(&self, ndc: DVec3) -> (f64, f64) {
        let size = self.size as f64;
        ((ndc.x * 0.5 + 0.5) * size, (0.5 - ndc.y * 0.5) * size)
    }

    fn rasterize(&mut self, triangle: &[Vec3; 3]) {
        let Some(clip) = self.clip_from_local else {
            return;
        };

        let ndc = triangle.map(|v| clip.project_point3(v.as_dvec3()));
        let [a, b, c] = ndc.map(|p| self.to_pixel(p));

        let area = edge(a, b, c);
        if area.abs() < 1e-12 {
            return;
        }

        let max = (self.size - 1) as f64;
        let x0 = a.0.min(b.0).min(c.0).floor().clamp(0.0, max) as u32;
        let x1 = a.0.max(b.0).max(c.0).ceil().clamp(0.0, max) as u32;
        let y0 = a.1.min(b.1).min(c.1).floor().clamp(0.0, max) as u32;
        let y1 = a.1.max(b.1).max(c.1).ceil().clamp(0.0, max) as u32;

        for y in y0..=y1 {
            for x in x0..=x1 {
                let p = (x as f64 + 0.5, y as f64 + 0.5);
                let w0 = edge(b, c, p) / area;
                let w1 = edge(c, a, p) / area;
                let w2 = edge(a, b, p) / area;
                if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                    continue;
                }

                // orthographic depth is affine in screen space
                let z = w0 * ndc[0].z + w1 * ndc[1].z + w2 * ndc[2].z;
                if !(0.0..=1.0).contains(&z) {
                    continue;
                }

                let slot = &mut self.depth[texel_index(self.size, x, y)];
                if (z as f32) < *slot {
                    *slot = z as f32;
                }
            }
        }
    }

    /// 1 when `local` is in front of the nearest occluder, 0 when shadowed or
    /// outside the frustum.
    fn visibility(&self, local: Vec3, bias: f32) -> f32 {
        let Some(clip) = self.clip_from_local else {
            return 0.0;
        };

        let ndc = clip.project_point3(local.as_dvec3());
        if ndc.x.abs() > 1.0 || ndc.y.abs() > 1.0 || !(0.0..=1.0).contains(&ndc.z) {
            return 0.0;
        }

        let (px, py) = self.to_pixel(ndc);
        let max = (self.size - 1) as f64;
        let x = px.floor().clamp(0.0, max) as u32;
        let y = py.floor().clamp(0.0, max) as u32;
        let occluder = self.depth[texel_index(self.size, x, y)];

        if ndc.z as f32 - bias <= occluder {
            1.0
        } else {
            0.0
        }
    }
}

fn edge(a: (f64, f64), b: (f64, f64), p: (f64, f64)) -> f64 {
    (b.0 - a.0) * (p.1 - a.1) - (b.1 - a.1) * (p.0 - a.0)
}


pub struct CpuBackend {
    shadow_map_size: u32,
    depth_bias: f32,
    depth_texture: bool,
    occluders: Vec<[Vec3; 3]>,
    depth: Option<DepthMap>,
    allocation_budget: Option<usize>,
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new(DEFAULT_SHADOW_MAP_SIZE, DEFAULT_DEPTH_BIAS)
    }
}

impl CpuBackend {
    pub fn new(shadow_map_size: u32, depth_bias: f32) -> Self {
        Self {
            shadow_map_size: shadow_map_size.clamp(1, MAX_TEXTURE_SIZE),
            depth_bias,
            depth_texture: true,
            occluders: Vec::new(),
            depth: None,
            allocation_budget: None,
        }
    }

    /// Reports no depth-texture capability, for exercising construction failures.
    pub fn without_depth_texture(mut self) -> Self {
        self.depth_texture = false;
        self
    }

    /// Fails every allocation after the first `budget` ones.
    pub fn with_allocation_budget(mut self, budget: usize) -> Self {
        self.allocation_budget = Some(budget);
        self
    }

    pub fn occluder_count(&self) -> usize {
        self.occluders.len()
    }

    /// Closed axis-aligned box in the run's local frame.
    pub fn add_box(&mut self, min: Vec3, max: Vec3) {
        self.occluders.extend(box_triangles(min, max));
    }

    fn allocate(&mut self, what: &str) -> Result<(), BackendError> {
        match self.allocation_budget.as_mut() {
            Some(0) => Err(BackendError::allocation(what)),
            Some(budget) => {
                *budget -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl ExposureBackend for CpuBackend {
    type Texture = CpuTexture;
    type Points = CpuPoints;

    fn supports_depth_texture(&self) -> bool {
        self.depth_texture
    }

    fn create_points(&mut self, layer: &SampleLayer) -> Result<CpuPoints, BackendError> {
        self.allocate("sample point buffers")?;
        Ok(CpuPoints {
            positions: layer.points.iter().map(|p| p.local).collect(),
            texels: layer.points.iter().map(|p| p.texel).collect(),
        })
    }

    fn create_accumulation_texture(&mut self, size: u32) -> Result<CpuTexture, BackendError> {
        if size > MAX_TEXTURE_SIZE {
            return Err(BackendError::allocation(format!("{size}x{size} accumulation texture")));
        }
        self.allocate("accumulation texture")?;
        Ok(CpuTexture {
            size,
            texels: vec![[0; 4]; texel_count(size)],
        })
    }

    fn set_occluders(&mut self, triangles: &[[Vec3; 3]]) -> Result<(), BackendError> {
        self.occluders.clear();
        self.occluders.extend_from_slice(triangles);
        Ok(())
    }

    fn render_depth(&mut self, light: &LightState) -> Result<(), BackendError> {
        self.allocate("light depth buffer")?;

        let mut depth = DepthMap::clear(self.shadow_map_size, light.clip_from_local());
        for triangle in &self.occluders {
            depth.rasterize(triangle);
        }
        self.depth = Some(depth);
        Ok(())
    }

    fn accumulate(&mut self, pass: AccumulationPass<'_, Self>) -> Result<(), BackendError> {
        let depth = self
            .depth
            .as_ref()
            .ok_or_else(|| BackendError::device("point pass issued before a depth pass"))?;

        let size = pass.target.size;
        if pass.previous.size != size {
            return Err(BackendError::device("ping-pong textures differ in size"));
        }

        for (local, texel) in pass.points.positions.iter().zip(&pass.points.texels) {
            let index = texel_index(size, texel.x, texel.y);
            let lit = depth.visibility(*local, self.depth_bias);
            let carried = unpack_ratio(pass.previous.texels[index]);
            pass.target.texels[index] = pack_ratio(carried + lit * pass.weight);
        }

        Ok(())
    }

    fn read_pixels(&mut self, texture: &CpuTexture, rect: TexelRect) -> Result<Vec<[u8; 4]>, BackendError> {
        if !rect.fits(texture.size) {
            return Err(rect.out_of_bounds(texture.size));
        }

        let mut pixels = Vec::with_capacity(rect.width as usize * rect.height as usize);
        for y in rect.y..rect.y + rect.height {
            let row = texel_index(texture.size, rect.x, y);
            pixels.extend_from_slice(&texture.texels[row..row + rect.width as usize]);
        }
        Ok(pixels)
    }

    fn texture_size(&self, texture: &CpuTexture) -> u32 {
        texture.size
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        grid::{Region, SampleGridBuilder},
        time::Timestamp,
    };

    #[test]
    fn roof_shadows_points_underneath() {
        let region = Region::from_degrees(&[
            [116.39, 39.9],
            [116.391, 39.9],
            [116.391, 39.901],
            [116.39, 39.901],
        ])
        .unwrap();
        let grid = SampleGridBuilder::new(10.0).build(&region, 0.0, 0.0);
        let light = LightState::for_time(&grid, Timestamp::from_utc(2024, 6, 21, 4, 0, 0));
        assert!(light.is_lit());

        let mut backend = CpuBackend::new(256, DEFAULT_DEPTH_BIAS);
        backend.render_depth(&light).unwrap();
        let open_sky = backend.depth.as_ref().unwrap();
        for point in &grid.layers[0].points {
            assert_eq!(open_sky.visibility(point.local, DEFAULT_DEPTH_BIAS), 1.0);
        }

        backend.add_box(Vec3::new(-500.0, -500.0, 10.0), Vec3::new(500.0, 500.0, 11.0));
        assert_eq!(backend.occluder_count(), 12);
        backend.render_depth(&light).unwrap();
        let covered = backend.depth.as_ref().unwrap();
        for point in &grid.layers[0].points {
            assert_eq!(covered.visibility(point.local, DEFAULT_DEPTH_BIAS), 0.0);
        }
    }

    #[test]
    fn set_occluders_replaces_the_scene() {
        let mut backend = CpuBackend::default();
        backend.add_box(Vec3::ZERO, Vec3::ONE);
        let triangle = [Vec3::ZERO, Vec3::X, Vec3::Y];
        backend.set_occluders(&[triangle, triangle]).unwrap();
        assert_eq!(backend.occluder_count(), 2);
        backend.set_occluders(&[]).unwrap();
        assert_eq!(backend.occluder_count(), 0);
    }

    #[test]
    fn large_textures_index_without_wrapping() {
        assert_eq!(texel_index(70_000, 69_999, 69_999), 69_999 * 70_000 + 69_999);
        assert_eq!(texel_count(70_000), 4_900_000_000);

        let mut backend = CpuBackend::new(u32::MAX, DEFAULT_DEPTH_BIAS);
        assert_eq!(backend.shadow_map_size, MAX_TEXTURE_SIZE);
        assert!(matches!(
            backend.create_accumulation_texture(70_000),
            Err(BackendError::Allocation(_)),
        ));
    }

    #[test]
    fn allocation_budget_is_enforced() {
        let mut backend = CpuBackend::default().with_allocation_budget(1);
        assert!(backend.create_accumulation_texture(4).is_ok());
        assert!(matches!(
            backend.create_accumulation_texture(4),
            Err(BackendError::Allocation(_)),
        ));
    }

    #[test]
    fn read_pixels_rejects_out_of_bounds() {
        let mut backend = CpuBackend::default();
        let texture = backend.create_accumulation_texture(4).unwrap();
        assert_eq!(backend.read_pixels(&texture, TexelRect::full(4)).unwrap().len(), 16);
        assert!(backend.read_pixels(&texture, TexelRect { x: 3, y: 3, width: 2, height: 1 }).is_err());
    }
}
