use bevy::{log::warn, math::DVec2};
use kd_tree::{KdPoint, KdTree};

use crate::{
    backend::{ExposureBackend, TexelRect},
    encoding::decode_ratio,
    geodesy::Cartographic,
    grid::SampleGrid,
    pipeline::AccumulationPipeline,
};


/// Returned when a point maps to no sample.
pub const NO_SAMPLE: f32 = -1.0;

/// Height and horizontal match tolerance, as a fraction of the grid spacing.
pub const QUERY_TOLERANCE_RATIO: f64 = 0.1;

/// Texels read around the mapped texel on every side.
const NEIGHBORHOOD_RADIUS: u32 = 1;


#[derive(Debug, Clone, Copy, PartialEq)]
struct HorizontalSample {
    position: DVec2,
    index: usize,
}

impl KdPoint for HorizontalSample {
    type Scalar = f64;
    type Dim = typenum::U2;

    fn at(&self, k: usize) -> f64 {
        self.position[k]
    }
}


/// Answers point queries against the accumulated textures of one build.
pub struct ExposureQueryService {
    tree: KdTree<HorizontalSample>,
    tolerance: f64,
    reference_height: f64,
}

impl ExposureQueryService {
    pub fn new(grid: &SampleGrid) -> Self {
        let reference_height = grid.frame.origin_cartographic.height;
        let samples = grid
            .horizontal_points()
            .iter()
            .enumerate()
            .map(|(index, &lon_lat)| HorizontalSample {
                position: horizontal(grid, lon_lat, reference_height),
                index,
            })
            .collect();

        Self {
            tree: KdTree::build_by_ordered_float(samples),
            tolerance: grid.spacing * QUERY_TOLERANCE_RATIO,
            reference_height,
        }
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Index into [`SampleGrid::horizontal_points`] of the sample within
    /// tolerance of `point`, ignoring height.
    pub fn nearest_sample(&self, grid: &SampleGrid, point: &Cartographic) -> Option<usize> {
        let query = HorizontalSample {
            position: horizontal(grid, point.lon_lat(), self.reference_height),
            index: usize::MAX,
        };

        let nearest = self.tree.nearest(&query)?;
        (nearest.squared_distance <= self.tolerance * self.tolerance).then_some(nearest.item.index)
    }

    /// Ratio in `[0, 1]` at `point`, or [`NO_SAMPLE`].
    ///
    /// Reads the neighborhood around the texel `point` maps to and keeps the
    /// largest decoded value; a lone sample texel is surrounded by unwritten
    /// zeros.
    pub fn query<B: ExposureBackend>(
        &self,
        grid: &SampleGrid,
        pipelines: &[AccumulationPipeline<B>],
        backend: &mut B,
        point: &Cartographic,
    ) -> f32 {
        if !point.is_finite() {
            return NO_SAMPLE;
        }

        let Some(layer) = grid.layer_at_height(point.height, self.tolerance) else {
            return NO_SAMPLE;
        };

        let lon_lat = point.lon_lat();
        if !grid.padded_bounds.contains(lon_lat) {
            return NO_SAMPLE;
        }

        if self.nearest_sample(grid, point).is_none() {
            return NO_SAMPLE;
        }

        let Some(texture) = pipelines
            .get(layer.index)
            .and_then(|pipeline| pipeline.texture())
        else {
            return NO_SAMPLE;
        };

        let size = backend.texture_size(texture);
        let texel = grid.padded_bounds.texel(lon_lat, size);
        let rect = TexelRect::around(texel.x, texel.y, NEIGHBORHOOD_RADIUS, size);

        match backend.read_pixels(texture, rect) {
            Ok(pixels) => pixels
                .into_iter()
                .map(decode_ratio)
                .fold(0.0, f32::max),
            Err(error) => {
                warn!("sunshine query readback failed: {error}");
                NO_SAMPLE
            }
        }
    }
}

fn horizontal(grid: &SampleGrid, lon_lat: DVec2, height: f64) -> DVec2 {
    grid.frame
        .cartographic_to_local(&Cartographic::from_degrees(lon_lat, height))
        .truncate()
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{Region, SampleGridBuilder};

    fn grid() -> SampleGrid {
        let region = Region::from_degrees(&[
            [116.39, 39.9],
            [116.391, 39.9],
            [116.391, 39.901],
            [116.39, 39.901],
        ])
        .unwrap();
        SampleGridBuilder::new(10.0).build(&region, 0.0, 20.0)
    }

    #[test]
    fn nearest_sample_matches_grid_points() {
        let grid = grid();
        let service = ExposureQueryService::new(&grid);
        assert!((service.tolerance() - 1.0).abs() < 1e-12);

        for (index, &lon_lat) in grid.horizontal_points().iter().enumerate().step_by(7) {
            let point = Cartographic::from_degrees(lon_lat, 10.0);
            assert_eq!(service.nearest_sample(&grid, &point), Some(index));
        }
    }

    #[test]
    fn far_points_have_no_sample() {
        let grid = grid();
        let service = ExposureQueryService::new(&grid);
        let outside = Cartographic::new(116.5, 39.9, 0.0);
        assert_eq!(service.nearest_sample(&grid, &outside), None);
    }
}
