use bevy::{
    log::{debug, info, warn},
    math::{DVec2, Vec3},
};
use serde::{Deserialize, Serialize};

use crate::{
    backend::ExposureBackend,
    error::{AnalysisError, Result},
    geodesy::Cartographic,
    gradient::ColorGradient,
    grid::{Region, SampleGrid},
    light::TimeSeriesPlanner,
    pipeline::AccumulationPipeline,
    query::{ExposureQueryService, NO_SAMPLE},
    settings::AnalysisSettings,
    time::{TimeSeries, Timestamp},
    visualization::VisualizationPipeline,
};


/// Inputs that define the sampled volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartOptions {
    /// lon/lat in degrees
    pub region: Vec<DVec2>,
    pub bottom_height: f64,
    pub extruded_height: f64,
}

impl StartOptions {
    pub fn from_degrees(region: &[[f64; 2]], bottom_height: f64, extruded_height: f64) -> Self {
        Self {
            region: region.iter().map(|&[lon, lat]| DVec2::new(lon, lat)).collect(),
            bottom_height,
            extruded_height,
        }
    }

    fn validate(&self) -> Result<Region> {
        let region = Region::new(self.region.clone())?;
        if !self.bottom_height.is_finite() {
            return Err(AnalysisError::InvalidBottomHeight(self.bottom_height));
        }
        if !(self.extruded_height.is_finite() && self.extruded_height >= 0.0) {
            return Err(AnalysisError::NegativeExtrudedHeight(self.extruded_height));
        }
        Ok(region)
    }
}


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// a timestep ran and more remain
    Continue,
    /// nothing left to do for the current generation
    Done,
    /// the caller's generation is out of date; nothing was touched
    Stale,
}


#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SunshineExposure {
    /// fraction of the window the point was lit, `[0, 1]`
    pub ratio: f32,
    /// lit minutes, `floor(ratio * window minutes)`
    pub time: u32,
}


struct Build<B: ExposureBackend> {
    region: Region,
    options: StartOptions,
    grid: SampleGrid,
    series: TimeSeries,
    accumulation: Vec<AccumulationPipeline<B>>,
    visualization: Vec<VisualizationPipeline>,
    query: ExposureQueryService,
    next_step: usize,
}


/// Owns the grid, the per-layer pipelines and the query service of one analysis.
///
/// Configuration goes through pending setters and an explicit [`commit`](Self::commit);
/// the host calls [`advance`](Self::advance) once per frame to run one timestep.
pub struct SunshineEngine<B: ExposureBackend> {
    backend: B,
    settings: AnalysisSettings,
    pending: AnalysisSettings,
    options: Option<StartOptions>,
    build: Option<Build<B>>,
    generation: u64,
    destroyed: bool,
}

impl<B: ExposureBackend> SunshineEngine<B> {
    pub fn new(backend: B, settings: AnalysisSettings) -> Result<Self> {
        if !backend.supports_depth_texture() {
            return Err(AnalysisError::MissingDepthTexture);
        }
        settings.validate()?;
        let settings = settings.normalized();

        Ok(Self {
            backend,
            pending: settings.clone(),
            settings,
            options: None,
            build: None,
            generation: 0,
            destroyed: false,
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Occluder edits made through this handle are seen from the next timestep on.
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Applied configuration.
    pub fn settings(&self) -> &AnalysisSettings {
        &self.settings
    }

    /// Configuration the next [`commit`](Self::commit) applies.
    pub fn pending(&self) -> &AnalysisSettings {
        &self.pending
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub fn start_options(&self) -> Option<&StartOptions> {
        self.options.as_ref()
    }

    pub fn region(&self) -> Option<&Region> {
        self.build.as_ref().map(|build| &build.region)
    }

    pub fn grid(&self) -> Option<&SampleGrid> {
        self.build.as_ref().map(|build| &build.grid)
    }

    pub fn time_series(&self) -> Option<&TimeSeries> {
        self.build.as_ref().map(|build| &build.series)
    }

    pub fn accumulation(&self) -> &[AccumulationPipeline<B>] {
        self.build.as_ref().map_or(&[], |build| build.accumulation.as_slice())
    }

    pub fn visualization(&self) -> &[VisualizationPipeline] {
        self.build.as_ref().map_or(&[], |build| build.visualization.as_slice())
    }

    pub fn is_sweeping(&self) -> bool {
        self.accumulation().iter().any(AccumulationPipeline::is_sweeping)
    }

    /// Every layer finished every timestep of the current generation.
    pub fn is_complete(&self) -> bool {
        self.build.is_some() && self.accumulation().iter().all(AccumulationPipeline::is_complete)
    }

    /// Timesteps accumulated so far, excluding any step that failed.
    pub fn completed_steps(&self) -> usize {
        self.accumulation()
            .iter()
            .map(AccumulationPipeline::completed_steps)
            .max()
            .unwrap_or(0)
    }

    /// Completed fraction of the current sweep.
    pub fn progress(&self) -> f32 {
        match self.build.as_ref() {
            Some(build) if !build.series.is_empty() => build.next_step as f32 / build.series.len() as f32,
            Some(_) => 1.0,
            None => 0.0,
        }
    }

    /// Sets the region and vertical range; rebuilds only when they changed.
    pub fn start(&mut self, options: StartOptions) -> Result<bool> {
        if self.destroyed {
            return Err(AnalysisError::Destroyed);
        }

        let region = options.validate()?;
        if self.build.is_some() && self.options.as_ref() == Some(&options) {
            debug!("sunshine start with unchanged inputs, keeping generation {}", self.generation);
            return Ok(false);
        }

        self.options = Some(options.clone());
        self.rebuild(region, options)?;
        Ok(true)
    }

    pub fn set_start_time(&mut self, start: Timestamp) -> Result<()> {
        check_window(start, self.pending.stop_time)?;
        self.pending.start_time = start;
        Ok(())
    }

    pub fn set_stop_time(&mut self, stop: Timestamp) -> Result<()> {
        check_window(self.pending.start_time, stop)?;
        self.pending.stop_time = stop;
        Ok(())
    }

    pub fn set_time_window(&mut self, start: Timestamp, stop: Timestamp) -> Result<()> {
        check_window(start, stop)?;
        self.pending.start_time = start;
        self.pending.stop_time = stop;
        Ok(())
    }

    /// Minutes between timesteps, floored at 1.
    pub fn set_time_intervals(&mut self, minutes: u32) {
        self.pending.time_intervals = minutes.max(1);
    }

    /// Meters between layers, floored at 1.
    pub fn set_spacing_intervals(&mut self, meters: f64) -> Result<()> {
        if !meters.is_finite() {
            return Err(AnalysisError::Settings(format!("spacing_intervals must be finite, got {meters}")));
        }
        self.pending.spacing_intervals = meters.max(1.0);
        Ok(())
    }

    pub fn set_color_gradient(&mut self, gradient: ColorGradient) -> Result<()> {
        if !gradient.is_usable() {
            return Err(AnalysisError::GradientTooSmall(gradient.len()));
        }
        self.pending.color_gradient = gradient;
        Ok(())
    }

    pub fn set_show(&mut self, show: bool) {
        self.pending.show = show;
    }

    /// Replaces the whole pending configuration and commits it.
    pub fn configure(&mut self, settings: AnalysisSettings) -> Result<bool> {
        settings.validate()?;
        self.pending = settings.normalized();
        self.commit()
    }

    /// Applies the pending configuration. Returns whether a rebuild happened,
    /// which is only when a value feeding the sweep changed.
    pub fn commit(&mut self) -> Result<bool> {
        if self.destroyed {
            return Err(AnalysisError::Destroyed);
        }

        let sweep_changed = self.settings.sweep_differs(&self.pending);
        let gradient_changed = !self.settings.color_gradient.equals(&self.pending.color_gradient);
        let show_changed = self.settings.show != self.pending.show;

        self.settings = self.pending.clone();

        if let Some(build) = self.build.as_mut() {
            for visualization in &mut build.visualization {
                if show_changed {
                    visualization.set_show(self.settings.show);
                }
                if gradient_changed && !sweep_changed {
                    visualization.recolor(&self.settings.color_gradient);
                }
            }
        }

        if !sweep_changed {
            return Ok(false);
        }

        match self.build.take() {
            Some(build) => {
                self.rebuild(build.region, build.options)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Replaces the occluding scene, local east-north-up triangles in meters.
    /// A built sweep restarts so results never mix two scenes.
    pub fn set_occluders(&mut self, triangles: &[[Vec3; 3]]) -> Result<bool> {
        if self.destroyed {
            return Err(AnalysisError::Destroyed);
        }

        self.backend.set_occluders(triangles)?;

        match self.build.take() {
            Some(build) => {
                self.rebuild(build.region, build.options)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn rebuild(&mut self, region: Region, options: StartOptions) -> Result<()> {
        // previous resources go first
        self.build = None;
        self.generation += 1;

        let grid = self
            .settings
            .grid_builder()
            .build(&region, options.bottom_height, options.extruded_height);
        let series = self.settings.time_series();

        info!(
            "sunshine rebuild, generation {}: {} points x {} layers, {} timesteps",
            self.generation,
            grid.horizontal_points().len(),
            grid.layers.len(),
            series.len(),
        );

        let mut accumulation = Vec::with_capacity(grid.layers.len());
        for layer in &grid.layers {
            let mut pipeline = AccumulationPipeline::new(layer.index);
            pipeline.rebuild(&mut self.backend, layer, grid.texture_size, series.len(), self.generation)?;
            accumulation.push(pipeline);
        }

        let visualization = grid
            .layers
            .iter()
            .map(|layer| VisualizationPipeline::new(layer, self.settings.show, &self.settings.color_gradient))
            .collect();

        self.build = Some(Build {
            query: ExposureQueryService::new(&grid),
            region,
            options,
            grid,
            series,
            accumulation,
            visualization,
            next_step: 0,
        });

        Ok(())
    }

    /// Runs one timestep of the current generation.
    pub fn advance(&mut self) -> Advance {
        self.advance_generation(self.generation)
    }

    /// Runs one timestep if `generation` is current, otherwise returns
    /// [`Advance::Stale`] without touching anything.
    pub fn advance_generation(&mut self, generation: u64) -> Advance {
        if generation != self.generation {
            return Advance::Stale;
        }
        if !self.is_sweeping() {
            return Advance::Done;
        }
        let Some(build) = self.build.as_mut() else {
            return Advance::Done;
        };
        let Some(light) = TimeSeriesPlanner::new(&build.grid, &build.series).light_state_at(build.next_step) else {
            return Advance::Done;
        };
        debug!(
            "sunshine step {}/{} at {}, sun elevation {:.1}",
            build.next_step + 1,
            build.series.len(),
            light.time,
            light.sun.elevation,
        );

        match self.backend.render_depth(&light) {
            Ok(()) => {
                let weight = build.series.step_weight();
                for pipeline in &mut build.accumulation {
                    pipeline.advance_one_timestep(&mut self.backend, &light, weight);
                }
                build.next_step += 1;
            }
            Err(error) => {
                for pipeline in &mut build.accumulation {
                    pipeline.halt(&error);
                }
            }
        }

        let sweeping = build.accumulation.iter().any(AccumulationPipeline::is_sweeping);
        let halted = build.accumulation.iter().any(AccumulationPipeline::is_halted);
        let completed = build.next_step;

        // points show the running partial sum while the sweep is in flight
        self.refresh_visualization();

        if sweeping {
            return Advance::Continue;
        }

        if halted {
            warn!("sunshine sweep halted after {completed} timesteps");
        } else {
            info!("sunshine sweep complete, generation {}", self.generation);
        }
        Advance::Done
    }

    /// Re-reads every layer texture into the visualization colors.
    pub fn refresh_visualization(&mut self) {
        let Some(build) = self.build.as_mut() else {
            return;
        };

        for (visualization, pipeline) in build.visualization.iter_mut().zip(&build.accumulation) {
            let Some(texture) = pipeline.texture() else {
                continue;
            };
            if let Err(error) = visualization.refresh(&mut self.backend, texture, &self.settings.color_gradient) {
                warn!("layer {}: visualization refresh failed: {error}", visualization.layer());
            }
        }
    }

    /// Accumulated ratio at `point`, or [`NO_SAMPLE`].
    pub fn query_ratio(&mut self, point: &Cartographic) -> f32 {
        match self.build.as_ref() {
            Some(build) => build.query.query(&build.grid, &build.accumulation, &mut self.backend, point),
            None => NO_SAMPLE,
        }
    }

    /// Exposure at `point`; `None` when it maps to no sample.
    pub fn query_sunshine_ratio(&mut self, point: &Cartographic) -> Option<SunshineExposure> {
        let ratio = self.query_ratio(point);
        if ratio < 0.0 {
            return None;
        }

        let window = self.time_series().map_or(0.0, TimeSeries::window_minutes);
        Some(SunshineExposure {
            ratio,
            time: (ratio as f64 * window).floor() as u32,
        })
    }

    /// Releases every GPU object. The engine rejects further configuration.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }

        self.build = None;
        self.destroyed = true;
        info!("sunshine engine destroyed at generation {}", self.generation);
    }
}

fn check_window(start: Timestamp, stop: Timestamp) -> Result<()> {
    if stop <= start {
        return Err(AnalysisError::InvalidTimeWindow {
            start: start.unix_seconds(),
            stop: stop.unix_seconds(),
        });
    }
    Ok(())
}
