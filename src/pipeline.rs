use bevy::log::{debug, warn};

use crate::{
    backend::{AccumulationPass, ExposureBackend},
    error::BackendError,
    grid::SampleLayer,
    light::LightState,
};


/// Fixed two-slot arena. `current` holds the latest completed result; the other
/// slot is the next write target. Slots are never aliased.
pub struct PingPong<T> {
    slots: [T; 2],
    current: usize,
}

impl<T> PingPong<T> {
    pub fn new(first: T, second: T) -> Self {
        Self {
            slots: [first, second],
            current: 0,
        }
    }

    pub fn current(&self) -> &T {
        &self.slots[self.current]
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    /// `(current, next)`: read the carried value from the first, write the second.
    pub fn split(&mut self) -> (&T, &mut T) {
        let [first, second] = &mut self.slots;
        if self.current == 0 {
            (&*first, second)
        } else {
            (&*second, first)
        }
    }

    pub fn swap(&mut self) {
        self.current ^= 1;
    }
}


#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AccumulationStatus {
    #[default]
    Idle,
    Rebuilding,
    Sweeping { next: usize },
}


struct LayerResources<B: ExposureBackend> {
    points: B::Points,
    textures: PingPong<B::Texture>,
}


/// Accumulates per-sample visibility of one layer over a sweep.
pub struct AccumulationPipeline<B: ExposureBackend> {
    layer: usize,
    status: AccumulationStatus,
    generation: Option<u64>,
    resources: Option<LayerResources<B>>,
    total_steps: usize,
    completed_steps: usize,
    halted: bool,
}

impl<B: ExposureBackend> AccumulationPipeline<B> {
    pub fn new(layer: usize) -> Self {
        Self {
            layer,
            status: AccumulationStatus::Idle,
            generation: None,
            resources: None,
            total_steps: 0,
            completed_steps: 0,
            halted: false,
        }
    }

    pub fn layer(&self) -> usize {
        self.layer
    }

    pub fn status(&self) -> AccumulationStatus {
        self.status
    }

    pub fn generation(&self) -> Option<u64> {
        self.generation
    }

    pub fn is_sweeping(&self) -> bool {
        matches!(self.status, AccumulationStatus::Sweeping { .. })
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn total_steps(&self) -> usize {
        self.total_steps
    }

    pub fn completed_steps(&self) -> usize {
        self.completed_steps
    }

    /// Authoritative only once idle and not halted.
    pub fn is_complete(&self) -> bool {
        self.status == AccumulationStatus::Idle
            && !self.halted
            && self.resources.is_some()
            && self.completed_steps == self.total_steps
    }

    /// Latest completed accumulation texture.
    pub fn texture(&self) -> Option<&B::Texture> {
        self.resources.as_ref().map(|resources| resources.textures.current())
    }

    /// Drops every GPU object and prepares a fresh sweep of `total_steps`.
    ///
    /// Returns `Ok(false)` without touching anything when idle on `generation`
    /// already. A rebuild issued mid-sweep aborts the running sweep first.
    pub fn rebuild(
        &mut self,
        backend: &mut B,
        layer: &SampleLayer,
        texture_size: u32,
        total_steps: usize,
        generation: u64,
    ) -> Result<bool, BackendError> {
        if self.status == AccumulationStatus::Idle && self.generation == Some(generation) {
            return Ok(false);
        }

        if let AccumulationStatus::Sweeping { next } = self.status {
            debug!(
                "layer {}: aborting sweep at step {next}/{} for generation {generation}",
                self.layer, self.total_steps,
            );
        }

        self.status = AccumulationStatus::Rebuilding;
        self.resources = None;
        self.generation = Some(generation);
        self.total_steps = total_steps;
        self.completed_steps = 0;
        self.halted = false;

        let resources = match Self::allocate(backend, layer, texture_size) {
            Ok(resources) => resources,
            Err(error) => {
                self.status = AccumulationStatus::Idle;
                self.halted = true;
                return Err(error);
            }
        };
        self.resources = Some(resources);

        self.status = if total_steps > 0 && !layer.is_empty() {
            AccumulationStatus::Sweeping { next: 0 }
        } else {
            // nothing to sample
            self.completed_steps = total_steps;
            AccumulationStatus::Idle
        };

        Ok(true)
    }

    fn allocate(
        backend: &mut B,
        layer: &SampleLayer,
        texture_size: u32,
    ) -> Result<LayerResources<B>, BackendError> {
        let points = backend.create_points(layer)?;
        let first = backend.create_accumulation_texture(texture_size)?;
        let second = backend.create_accumulation_texture(texture_size)?;
        Ok(LayerResources {
            points,
            textures: PingPong::new(first, second),
        })
    }

    /// Runs the point pass for the next timestep against the depth buffer the
    /// backend rendered for `light`. No-op unless sweeping.
    pub fn advance_one_timestep(&mut self, backend: &mut B, light: &LightState, weight: f32) -> bool {
        let AccumulationStatus::Sweeping { next } = self.status else {
            return false;
        };
        let Some(resources) = self.resources.as_mut() else {
            return false;
        };

        let (previous, target) = resources.textures.split();
        let pass = AccumulationPass {
            points: &resources.points,
            light,
            weight,
            previous,
            target,
        };

        if let Err(error) = backend.accumulate(pass) {
            self.halt(&error);
            return false;
        }

        resources.textures.swap();
        self.completed_steps += 1;

        let next = next + 1;
        self.status = if next >= self.total_steps {
            debug!("layer {}: sweep complete after {next} steps", self.layer);
            AccumulationStatus::Idle
        } else {
            AccumulationStatus::Sweeping { next }
        };

        true
    }

    /// Stops the sweep, serving the last completed texture as final.
    pub fn halt(&mut self, error: &BackendError) {
        if !self.is_sweeping() {
            return;
        }

        warn!(
            "layer {}: halting sweep after {}/{} steps: {error}",
            self.layer, self.completed_steps, self.total_steps,
        );
        self.status = AccumulationStatus::Idle;
        self.halted = true;
    }

    pub fn destroy(&mut self) {
        self.resources = None;
        self.status = AccumulationStatus::Idle;
        self.generation = None;
        self.total_steps = 0;
        self.completed_steps = 0;
    }
}


#[cfg(test)]
mod tests {
    use bevy::math::{UVec2, Vec3};

    use super::*;
    use crate::{
        backend::{CpuBackend, TexelRect},
        encoding::decode_ratio,
        geodesy::Cartographic,
        grid::{Region, SampleGridBuilder, SamplePoint},
        time::Timestamp,
    };

    fn single_point_layer() -> SampleLayer {
        SampleLayer {
            index: 0,
            height: 0.0,
            points: vec![SamplePoint {
                cartographic: Cartographic::new(116.39, 39.9, 0.0),
                local: Vec3::ZERO,
                texel: UVec2::new(2, 1),
            }],
        }
    }

    fn noon_light() -> LightState {
        let region = Region::from_degrees(&[
            [116.39, 39.9],
            [116.391, 39.9],
            [116.391, 39.901],
            [116.39, 39.901],
        ])
        .unwrap();
        let grid = SampleGridBuilder::new(10.0).build(&region, 0.0, 0.0);
        LightState::for_time(&grid, Timestamp::from_utc(2024, 6, 21, 4, 0, 0))
    }

    fn ratio_at(backend: &mut CpuBackend, pipeline: &AccumulationPipeline<CpuBackend>) -> f32 {
        let texture = pipeline.texture().unwrap();
        decode_ratio(backend.read_pixels(texture, TexelRect { x: 2, y: 1, width: 1, height: 1 }).unwrap()[0])
    }

    #[test]
    fn ping_pong_alternates_without_aliasing() {
        let mut pair = PingPong::new(1, 2);
        assert_eq!(*pair.current(), 1);
        {
            let (current, next) = pair.split();
            assert_eq!(*current, 1);
            *next = 3;
        }
        pair.swap();
        assert_eq!(*pair.current(), 3);
        assert_eq!(pair.current_index(), 1);
        let (current, next) = pair.split();
        assert_eq!((*current, *next), (3, 1));
    }

    #[test]
    fn rebuild_is_idempotent_per_generation() {
        let mut backend = CpuBackend::new(64, 1e-4);
        let mut pipeline = AccumulationPipeline::new(0);
        let layer = single_point_layer();

        assert!(pipeline.rebuild(&mut backend, &layer, 8, 0, 1).unwrap());
        assert_eq!(pipeline.status(), AccumulationStatus::Idle);
        assert!(!pipeline.rebuild(&mut backend, &layer, 8, 0, 1).unwrap());
        assert!(pipeline.rebuild(&mut backend, &layer, 8, 0, 2).unwrap());
    }

    #[test]
    fn sweep_accumulates_and_returns_to_idle() {
        let mut backend = CpuBackend::new(64, 1e-4);
        let mut pipeline = AccumulationPipeline::new(0);
        let layer = single_point_layer();
        let light = noon_light();

        pipeline.rebuild(&mut backend, &layer, 8, 4, 1).unwrap();
        assert!(pipeline.is_sweeping());

        let mut last = 0.0;
        for _ in 0..4 {
            backend.render_depth(&light).unwrap();
            assert!(pipeline.advance_one_timestep(&mut backend, &light, 0.25));
            let ratio = ratio_at(&mut backend, &pipeline);
            assert!(ratio >= last);
            last = ratio;
        }

        assert_eq!(last, 1.0);
        assert!(pipeline.is_complete());
        assert!(!pipeline.advance_one_timestep(&mut backend, &light, 0.25));
    }

    #[test]
    fn rebuild_mid_sweep_restarts_from_zero() {
        let mut backend = CpuBackend::new(64, 1e-4);
        let mut pipeline = AccumulationPipeline::new(0);
        let layer = single_point_layer();
        let light = noon_light();

        pipeline.rebuild(&mut backend, &layer, 8, 4, 1).unwrap();
        backend.render_depth(&light).unwrap();
        pipeline.advance_one_timestep(&mut backend, &light, 0.25);
        assert_eq!(pipeline.completed_steps(), 1);

        assert!(pipeline.rebuild(&mut backend, &layer, 8, 4, 2).unwrap());
        assert_eq!(pipeline.completed_steps(), 0);
        assert_eq!(pipeline.status(), AccumulationStatus::Sweeping { next: 0 });
        assert_eq!(ratio_at(&mut backend, &pipeline), 0.0);
    }

    #[test]
    fn halt_keeps_last_completed_texture() {
        let mut backend = CpuBackend::new(64, 1e-4);
        let mut pipeline = AccumulationPipeline::new(0);
        let layer = single_point_layer();
        let light = noon_light();

        pipeline.rebuild(&mut backend, &layer, 8, 4, 1).unwrap();
        backend.render_depth(&light).unwrap();
        pipeline.advance_one_timestep(&mut backend, &light, 0.25);

        pipeline.halt(&BackendError::allocation("light depth buffer"));
        assert!(pipeline.is_halted());
        assert!(!pipeline.is_sweeping());
        assert!(!pipeline.is_complete());
        assert!((ratio_at(&mut backend, &pipeline) - 0.25).abs() < 1e-6);
    }
}
