use bevy::{
    log::debug,
    math::{DVec2, DVec3, UVec2, Vec3},
};
use serde::{Deserialize, Serialize};

use crate::{
    error::{AnalysisError, Result},
    geodesy::{Cartographic, LocalFrame, geodesic_distance},
};


/// Fraction of the bbox extent added on every side before texel mapping.
pub const BBOX_PADDING_RATIO: f64 = 0.05;

/// Step refinement applied to the spacing-derived scan step. Carried over as a
/// tunable without a documented derivation.
pub const DEFAULT_GRID_REFINEMENT: f64 = 0.2;

const MIN_PADDING_DEGREES: f64 = 1e-7;


/// Footprint polygon in lon/lat degrees. Concave outlines are supported; the
/// ring is implicitly closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    vertices: Vec<DVec2>,
}

impl Region {
    pub fn new(vertices: Vec<DVec2>) -> Result<Self> {
        if vertices.len() < 3 {
            return Err(AnalysisError::RegionTooSmall(vertices.len()));
        }
        if let Some(index) = vertices.iter().position(|v| !v.is_finite()) {
            return Err(AnalysisError::InvalidVertex { index });
        }

        Ok(Self { vertices })
    }

    pub fn from_degrees(vertices: &[[f64; 2]]) -> Result<Self> {
        Self::new(vertices.iter().map(|&[lon, lat]| DVec2::new(lon, lat)).collect())
    }

    pub fn vertices(&self) -> &[DVec2] {
        &self.vertices
    }

    pub fn bounds(&self) -> GeoBounds {
        let mut bounds = GeoBounds {
            west: f64::INFINITY,
            south: f64::INFINITY,
            east: f64::NEG_INFINITY,
            north: f64::NEG_INFINITY,
        };
        for v in &self.vertices {
            bounds.west = bounds.west.min(v.x);
            bounds.east = bounds.east.max(v.x);
            bounds.south = bounds.south.min(v.y);
            bounds.north = bounds.north.max(v.y);
        }
        bounds
    }

    /// Even-odd crossing test in lon/lat space.
    pub fn contains(&self, p: DVec2) -> bool {
        let mut inside = false;
        let n = self.vertices.len();
        let mut j = n - 1;
        for i in 0..n {
            let a = self.vertices[i];
            let b = self.vertices[j];
            if (a.y > p.y) != (b.y > p.y) {
                let crossing = (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x;
                if p.x < crossing {
                    inside = !inside;
                }
            }
            j = i;
        }
        inside
    }
}


/// Axis-aligned lon/lat box, degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoBounds {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl GeoBounds {
    pub fn width(&self) -> f64 {
        self.east - self.west
    }

    pub fn height(&self) -> f64 {
        self.north - self.south
    }

    pub fn center(&self) -> DVec2 {
        DVec2::new((self.west + self.east) * 0.5, (self.south + self.north) * 0.5)
    }

    pub fn padded(&self, ratio: f64) -> Self {
        let pad_x = (self.width() * ratio).max(MIN_PADDING_DEGREES);
        let pad_y = (self.height() * ratio).max(MIN_PADDING_DEGREES);
        Self {
            west: self.west - pad_x,
            south: self.south - pad_y,
            east: self.east + pad_x,
            north: self.north + pad_y,
        }
    }

    pub fn contains(&self, p: DVec2) -> bool {
        p.x >= self.west && p.x <= self.east && p.y >= self.south && p.y <= self.north
    }

    /// `p` relative to the box, `[0,1]` inside.
    pub fn normalized(&self, p: DVec2) -> DVec2 {
        DVec2::new(
            (p.x - self.west) / self.width(),
            (p.y - self.south) / self.height(),
        )
    }

    /// Texel of `p` in a `size`x`size` image spanning this box.
    pub fn texel(&self, p: DVec2, size: u32) -> UVec2 {
        let uv = self.normalized(p).clamp(DVec2::ZERO, DVec2::ONE);
        let max = (size.max(1) - 1) as f64;
        UVec2::new(
            (uv.x * size as f64).floor().min(max) as u32,
            (uv.y * size as f64).floor().min(max) as u32,
        )
    }
}


/// Bounding sphere of a run in its local frame, used to size light frusta.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingSphere {
    pub center: DVec3,
    pub radius: f64,
}


#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplePoint {
    pub cartographic: Cartographic,
    pub local: Vec3,
    pub texel: UVec2,
}


#[derive(Debug, Clone, PartialEq)]
pub struct SampleLayer {
    pub index: usize,
    pub height: f64,
    pub points: Vec<SamplePoint>,
}

impl SampleLayer {
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}


/// Sample points of every layer plus the build-time metadata queries need.
#[derive(Debug, Clone)]
pub struct SampleGrid {
    pub frame: LocalFrame,
    pub bounds: GeoBounds,
    pub padded_bounds: GeoBounds,
    pub sphere: BoundingSphere,
    pub spacing: f64,
    pub texture_size: u32,
    pub layers: Vec<SampleLayer>,
    horizontal: Vec<DVec2>,
}

impl SampleGrid {
    /// lon/lat of the points shared by every layer.
    pub fn horizontal_points(&self) -> &[DVec2] {
        &self.horizontal
    }

    pub fn is_empty(&self) -> bool {
        self.horizontal.is_empty()
    }

    pub fn point_count(&self) -> usize {
        self.horizontal.len() * self.layers.len()
    }

    /// Layer whose height is within `tolerance` of `height`.
    pub fn layer_at_height(&self, height: f64, tolerance: f64) -> Option<&SampleLayer> {
        self.layers
            .iter()
            .filter(|layer| (layer.height - height).abs() <= tolerance)
            .min_by(|a, b| (a.height - height).abs().total_cmp(&(b.height - height).abs()))
    }
}


#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleGridBuilder {
    pub spacing: f64,
    pub refinement: f64,
    pub texture_size: u32,
}

impl Default for SampleGridBuilder {
    fn default() -> Self {
        Self {
            spacing: 10.0,
            refinement: DEFAULT_GRID_REFINEMENT,
            texture_size: 1024,
        }
    }
}

impl SampleGridBuilder {
    pub fn new(spacing: f64) -> Self {
        Self {
            spacing: spacing.max(1.0),
            ..Default::default()
        }
    }

    pub fn layer_heights(&self, bottom_height: f64, extruded_height: f64) -> Vec<f64> {
        let spacing = self.spacing.max(1.0);
        let count = (extruded_height.max(0.0) / spacing).floor() as usize + 1;
        (0..count).map(|k| bottom_height + k as f64 * spacing).collect()
    }

    pub fn build(&self, region: &Region, bottom_height: f64, extruded_height: f64) -> SampleGrid {
        let spacing = self.spacing.max(1.0);
        let texture_size = self.texture_size.max(1);

        let bounds = region.bounds();
        let padded_bounds = bounds.padded(BBOX_PADDING_RATIO);
        let center = bounds.center();
        let mid_height = bottom_height + extruded_height * 0.5;
        let frame = LocalFrame::east_north_up(Cartographic::from_degrees(center, mid_height));

        let geodesic_diagonal = geodesic_distance(
            DVec2::new(bounds.west, bounds.south),
            DVec2::new(bounds.east, bounds.north),
        );
        let low_corner = frame.cartographic_to_local(&Cartographic::new(bounds.west, bounds.south, bottom_height));
        let high_corner = frame.cartographic_to_local(&Cartographic::new(
            bounds.east,
            bounds.north,
            bottom_height + extruded_height,
        ));
        let half_diagonal = (high_corner - low_corner).length() * 0.5;
        let sphere = BoundingSphere {
            center: DVec3::ZERO,
            radius: half_diagonal.max(geodesic_diagonal),
        };

        let horizontal = scan_region(region, &bounds, geodesic_diagonal, spacing, self.refinement);

        let layers = self
            .layer_heights(bottom_height, extruded_height)
            .into_iter()
            .enumerate()
            .map(|(index, height)| SampleLayer {
                index,
                height,
                points: horizontal
                    .iter()
                    .map(|&lon_lat| {
                        let cartographic = Cartographic::from_degrees(lon_lat, height);
                        SamplePoint {
                            cartographic,
                            local: frame.cartographic_to_local(&cartographic).as_vec3(),
                            texel: padded_bounds.texel(lon_lat, texture_size),
                        }
                    })
                    .collect(),
            })
            .collect::<Vec<_>>();

        debug!(
            "sample grid: {} points x {} layers, sphere radius {:.1}m",
            horizontal.len(),
            layers.len(),
            sphere.radius,
        );

        SampleGrid {
            frame,
            bounds,
            padded_bounds,
            sphere,
            spacing,
            texture_size,
            layers,
            horizontal,
        }
    }
}

fn scan_region(
    region: &Region,
    bounds: &GeoBounds,
    geodesic_diagonal: f64,
    spacing: f64,
    refinement: f64,
) -> Vec<DVec2> {
    let approx_count = geodesic_diagonal / spacing + 1.0;
    let step = bounds.width() / approx_count * refinement;
    if !step.is_finite() || step <= 0.0 || bounds.height() <= 0.0 {
        return Vec::new();
    }

    let columns = (bounds.width() / step).floor() as usize + 1;
    let rows = (bounds.height() / step).floor() as usize + 1;

    let mut points = Vec::new();
    for row in 0..rows {
        let lat = bounds.south + (row as f64 + 0.5) * step;
        if lat > bounds.north {
            break;
        }
        for column in 0..columns {
            let lon = bounds.west + (column as f64 + 0.5) * step;
            if lon > bounds.east {
                break;
            }
            let candidate = DVec2::new(lon, lat);
            if region.contains(candidate) {
                points.push(candidate);
            }
        }
    }
    points
}


#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, Rng, SeedableRng};

    use super::*;

    fn l_shape() -> Region {
        Region::from_degrees(&[
            [120.0, 30.0],
            [120.002, 30.0],
            [120.002, 30.001],
            [120.001, 30.001],
            [120.001, 30.002],
            [120.0, 30.002],
        ])
        .unwrap()
    }

    #[test]
    fn rejects_regions_with_fewer_than_three_vertices() {
        let err = Region::from_degrees(&[[0.0, 0.0], [1.0, 1.0]]).unwrap_err();
        assert_eq!(err, AnalysisError::RegionTooSmall(2));
    }

    #[test]
    fn concave_region_excludes_the_notch() {
        let region = l_shape();
        assert!(region.contains(DVec2::new(120.0005, 30.0015)));
        assert!(region.contains(DVec2::new(120.0015, 30.0005)));
        assert!(!region.contains(DVec2::new(120.0015, 30.0015)));

        let grid = SampleGridBuilder::new(20.0).build(&region, 0.0, 0.0);
        assert!(!grid.is_empty());
        for point in grid.horizontal_points() {
            assert!(region.contains(*point), "{point:?} escaped the region");
            assert!(!(point.x > 120.001 && point.y > 30.001));
        }
    }

    /// Star-shaped polygon around `center`: vertices at increasing angles,
    /// each sector narrower than a half turn. Radii in degrees.
    fn random_star(rng: &mut StdRng, center: DVec2) -> (Vec<f64>, Vec<DVec2>) {
        let count = rng.gen_range(5..=12);
        let sector = std::f64::consts::TAU / count as f64;
        let angles: Vec<f64> = (0..count)
            .map(|i| (i as f64 + rng.gen_range(0.1..0.9)) * sector)
            .collect();
        let vertices = angles
            .iter()
            .map(|angle| center + DVec2::from_angle(*angle) * rng.gen_range(0.0003..0.0015))
            .collect();
        (angles, vertices)
    }

    /// Distance from `center` to the star's boundary along the ray through `p`.
    fn boundary_distance(center: DVec2, angles: &[f64], vertices: &[DVec2], p: DVec2) -> f64 {
        let direction = (p - center).normalize();
        let angle = direction.y.atan2(direction.x).rem_euclid(std::f64::consts::TAU);
        let i = angles
            .iter()
            .rposition(|start| *start <= angle)
            .unwrap_or(angles.len() - 1);
        let a = vertices[i];
        let edge = vertices[(i + 1) % vertices.len()] - a;
        (a - center).perp_dot(edge) / direction.perp_dot(edge)
    }

    #[test]
    fn random_polygons_keep_every_sample_inside() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let center = DVec2::new(116.39, 39.9);

        for _ in 0..20 {
            let (angles, vertices) = random_star(&mut rng, center);
            let region = Region::new(vertices.clone()).unwrap();
            let grid = SampleGridBuilder::new(rng.gen_range(5.0..15.0)).build(&region, 0.0, 0.0);
            assert!(!grid.is_empty());

            for point in &grid.layers[0].points {
                let lon_lat = point.cartographic.lon_lat();
                assert!(region.contains(lon_lat), "{lon_lat:?} escaped {vertices:?}");

                let offset = lon_lat - center;
                if offset.length() < 1e-12 {
                    continue;
                }
                let boundary = boundary_distance(center, &angles, &vertices, lon_lat);
                assert!(
                    offset.length() <= boundary * (1.0 + 1e-9),
                    "{lon_lat:?} lies past the boundary of {vertices:?}",
                );
            }
        }
    }

    #[test]
    fn layers_step_by_spacing() {
        let builder = SampleGridBuilder::new(3.0);
        assert_eq!(builder.layer_heights(10.0, 7.0), vec![10.0, 13.0, 16.0]);
        assert_eq!(builder.layer_heights(5.0, 0.0), vec![5.0]);

        let grid = builder.build(&l_shape(), 10.0, 7.0);
        assert_eq!(grid.layers.len(), 3);
        for layer in &grid.layers {
            assert_eq!(layer.points.len(), grid.horizontal_points().len());
            for point in &layer.points {
                assert_eq!(point.cartographic.height, layer.height);
            }
        }
    }

    #[test]
    fn sphere_covers_every_sample() {
        let grid = SampleGridBuilder::new(10.0).build(&l_shape(), 0.0, 30.0);
        for layer in &grid.layers {
            for point in &layer.points {
                let offset = point.local.as_dvec3() - grid.sphere.center;
                assert!(offset.length() <= grid.sphere.radius);
            }
        }
    }

    #[test]
    fn texels_stay_inside_the_texture() {
        let builder = SampleGridBuilder {
            texture_size: 64,
            ..SampleGridBuilder::new(5.0)
        };
        let grid = builder.build(&l_shape(), 0.0, 0.0);
        for point in &grid.layers[0].points {
            assert!(point.texel.x < 64 && point.texel.y < 64);
        }
    }

    #[test]
    fn collinear_region_yields_an_empty_grid() {
        let region = Region::from_degrees(&[[10.0, 10.0], [10.001, 10.0], [10.002, 10.0]]).unwrap();
        let grid = SampleGridBuilder::new(10.0).build(&region, 0.0, 0.0);
        assert!(grid.is_empty());
        assert_eq!(grid.layers.len(), 1);
    }
}
