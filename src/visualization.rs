use bevy::{
    color::{Color, ColorToComponents},
    math::{UVec2, Vec3},
};

use crate::{
    backend::{ExposureBackend, TexelRect},
    encoding::decode_ratio,
    error::BackendError,
    gradient::ColorGradient,
    grid::SampleLayer,
};


/// Local east-north-up meters to Bevy's right-handed Y-up axes.
pub fn enu_to_bevy(local: Vec3) -> Vec3 {
    Vec3::new(local.x, local.z, -local.y)
}

pub fn bevy_to_enu(world: Vec3) -> Vec3 {
    Vec3::new(world.x, -world.z, world.y)
}


/// Point colors of one layer, derived from its accumulation texture.
#[derive(Debug, Clone)]
pub struct VisualizationPipeline {
    layer: usize,
    height: f64,
    positions: Vec<Vec3>,
    texels: Vec<UVec2>,
    ratios: Vec<f32>,
    colors: Vec<[u8; 4]>,
    footprint: Option<TexelRect>,
    show: bool,
    revision: u64,
}

impl VisualizationPipeline {
    /// Starts every point at ratio 0, colored with the gradient's low end.
    pub fn new(layer: &SampleLayer, show: bool, gradient: &ColorGradient) -> Self {
        let texels: Vec<UVec2> = layer.points.iter().map(|p| p.texel).collect();
        let footprint = texels.iter().copied().reduce(|a, b| a.min(b)).zip(
            texels.iter().copied().reduce(|a, b| a.max(b)),
        );

        Self {
            layer: layer.index,
            height: layer.height,
            positions: layer.points.iter().map(|p| enu_to_bevy(p.local)).collect(),
            ratios: vec![0.0; texels.len()],
            colors: vec![gradient.sample(0.0); texels.len()],
            footprint: footprint.map(|(min, max)| TexelRect {
                x: min.x,
                y: min.y,
                width: max.x - min.x + 1,
                height: max.y - min.y + 1,
            }),
            texels,
            show,
            revision: 0,
        }
    }

    pub fn layer(&self) -> usize {
        self.layer
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Point positions in Bevy world axes, meters from the region center.
    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    pub fn ratios(&self) -> &[f32] {
        &self.ratios
    }

    pub fn colors(&self) -> &[[u8; 4]] {
        &self.colors
    }

    /// Vertex colors in linear space, as mesh color attributes expect.
    pub fn linear_colors(&self) -> Vec<[f32; 4]> {
        self.colors
            .iter()
            .map(|&[r, g, b, a]| Color::srgba_u8(r, g, b, a).to_linear().to_f32_array())
            .collect()
    }

    /// Bumped on every refresh.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn show(&self) -> bool {
        self.show
    }

    pub fn set_show(&mut self, show: bool) {
        self.show = show;
    }

    /// Re-decodes every point from `texture` and maps it through `gradient`.
    pub fn refresh<B: ExposureBackend>(
        &mut self,
        backend: &mut B,
        texture: &B::Texture,
        gradient: &ColorGradient,
    ) -> Result<(), BackendError> {
        if let Some(rect) = self.footprint {
            let pixels = backend.read_pixels(texture, rect)?;
            for ((texel, ratio), color) in self.texels.iter().zip(&mut self.ratios).zip(&mut self.colors) {
                let index = (texel.y - rect.y) * rect.width + (texel.x - rect.x);
                *ratio = decode_ratio(pixels[index as usize]);
                *color = gradient.sample(*ratio);
            }
        }

        self.revision += 1;
        Ok(())
    }

    /// Recolors from the last decoded ratios without touching the backend.
    pub fn recolor(&mut self, gradient: &ColorGradient) {
        for (ratio, color) in self.ratios.iter().zip(&mut self.colors) {
            *color = gradient.sample(*ratio);
        }
        self.revision += 1;
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backend::CpuBackend,
        geodesy::Cartographic,
        grid::SamplePoint,
    };

    #[test]
    fn enu_maps_up_to_bevy_y() {
        assert_eq!(enu_to_bevy(Vec3::new(1.0, 2.0, 3.0)), Vec3::new(1.0, 3.0, -2.0));
        assert_eq!(bevy_to_enu(Vec3::new(1.0, 3.0, -2.0)), Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn fresh_texture_colors_every_point_with_the_low_stop() {
        let layer = SampleLayer {
            index: 0,
            height: 0.0,
            points: [UVec2::new(1, 1), UVec2::new(3, 2)]
                .into_iter()
                .map(|texel| SamplePoint {
                    cartographic: Cartographic::default(),
                    local: Vec3::ZERO,
                    texel,
                })
                .collect(),
        };

        let mut backend = CpuBackend::new(16, 1e-4);
        let texture = backend.create_accumulation_texture(8).unwrap();
        let gradient = ColorGradient::default();

        let mut visualization = VisualizationPipeline::new(&layer, true, &gradient);
        assert!(visualization.colors().iter().all(|c| *c == gradient.sample(0.0)));
        visualization.refresh(&mut backend, &texture, &gradient).unwrap();

        assert_eq!(visualization.revision(), 1);
        assert_eq!(visualization.ratios(), &[0.0, 0.0]);
        assert!(visualization.colors().iter().all(|c| *c == gradient.sample(0.0)));
    }
}
