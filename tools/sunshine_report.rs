use std::{error::Error, fs, path::PathBuf};

use bevy::math::{DVec2, Vec3};
use clap::Parser;
use serde::Deserialize;

use bevy_sunshine_analysis::{
    AnalysisSettings,
    Cartographic,
    CpuBackend,
    ExposureBackend,
    StartOptions,
    SunshineEngine,
    WgpuBackend,
    engine::Advance,
    grid::SampleGrid,
};


/// Sweeps a footprint over a time window and prints per-layer exposure.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// scene json: region, heights and occluder boxes
    scene: PathBuf,

    /// analysis settings json, defaults for missing fields
    #[arg(short, long)]
    settings: Option<PathBuf>,

    /// render through a headless wgpu adapter instead of the cpu rasterizer
    #[arg(long)]
    gpu: bool,
}


#[derive(Debug, Deserialize)]
struct Scene {
    /// lon/lat degrees
    region: Vec<[f64; 2]>,
    #[serde(default)]
    bottom_height: f64,
    #[serde(default)]
    extruded_height: f64,
    #[serde(default)]
    occluders: Vec<BoxOccluder>,
}

/// Axis-aligned (east/north) box around a lon/lat center.
#[derive(Debug, Deserialize)]
struct BoxOccluder {
    center: [f64; 2],
    /// east and north extent in meters
    size: [f64; 2],
    base_height: f64,
    top_height: f64,
}

impl BoxOccluder {
    fn local_bounds(&self, grid: &SampleGrid) -> (Vec3, Vec3) {
        let center = DVec2::from(self.center);
        let base = grid.frame.cartographic_to_local(&Cartographic::from_degrees(center, self.base_height));
        let half = DVec2::from(self.size) * 0.5;

        let min = Vec3::new(
            (base.x - half.x) as f32,
            (base.y - half.y) as f32,
            base.z as f32,
        );
        let max = Vec3::new(
            (base.x + half.x) as f32,
            (base.y + half.y) as f32,
            (base.z + self.top_height - self.base_height) as f32,
        );
        (min, max)
    }
}


fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let scene: Scene = serde_json::from_str(&fs::read_to_string(&args.scene)?)?;
    let settings = match &args.settings {
        Some(path) => AnalysisSettings::from_json_file(path)?,
        None => AnalysisSettings::default(),
    };
    let options = StartOptions::from_degrees(&scene.region, scene.bottom_height, scene.extruded_height);

    println!(
        "sunshine report: {} to {} every {} min, {}m spacing",
        settings.start_time,
        settings.stop_time,
        settings.time_intervals,
        settings.spacing_intervals,
    );

    if args.gpu {
        let backend = WgpuBackend::headless(settings.shadow_map_size, settings.depth_bias)?;
        let mut engine = SunshineEngine::new(backend, settings)?;
        engine.start(options)?;

        let boxes = occluder_boxes(&engine, &scene);
        engine.backend_mut().set_boxes(&boxes)?;
        report(&mut engine)
    } else {
        let backend = CpuBackend::new(settings.shadow_map_size, settings.depth_bias);
        let mut engine = SunshineEngine::new(backend, settings)?;
        engine.start(options)?;

        for (min, max) in occluder_boxes(&engine, &scene) {
            engine.backend_mut().add_box(min, max);
        }
        report(&mut engine)
    }
}

/// Occluders are placed in the local frame of the built grid.
fn occluder_boxes<B: ExposureBackend>(engine: &SunshineEngine<B>, scene: &Scene) -> Vec<(Vec3, Vec3)> {
    let Some(grid) = engine.grid() else {
        return Vec::new();
    };
    scene.occluders.iter().map(|occluder| occluder.local_bounds(grid)).collect()
}

fn report<B: ExposureBackend>(engine: &mut SunshineEngine<B>) -> Result<(), Box<dyn Error>> {
    while engine.advance() == Advance::Continue {}
    let steps = engine.completed_steps();

    let halted = engine.accumulation().iter().any(|pipeline| pipeline.is_halted());
    if halted {
        println!("sweep halted after {steps} steps, ratios are partial");
    } else {
        println!("sweep finished in {steps} steps");
    }

    let Some(grid) = engine.grid().cloned() else {
        return Ok(());
    };
    if grid.is_empty() {
        println!("region has no sample points");
        return Ok(());
    }

    println!("{:>8} {:>8} {:>8} {:>8} {:>8} {:>10}", "height", "points", "min", "mean", "max", "mean_min");
    for layer in &grid.layers {
        let exposures: Vec<_> = layer
            .points
            .iter()
            .filter_map(|point| engine.query_sunshine_ratio(&point.cartographic))
            .collect();
        if exposures.is_empty() {
            continue;
        }

        let count = exposures.len() as f32;
        let min = exposures.iter().map(|e| e.ratio).fold(f32::MAX, f32::min);
        let max = exposures.iter().map(|e| e.ratio).fold(f32::MIN, f32::max);
        let mean = exposures.iter().map(|e| e.ratio).sum::<f32>() / count;
        let mean_minutes = exposures.iter().map(|e| e.time as f32).sum::<f32>() / count;

        println!(
            "{:>8.1} {:>8} {:>8.3} {:>8.3} {:>8.3} {:>10.0}",
            layer.height,
            exposures.len(),
            min,
            mean,
            max,
            mean_minutes,
        );
    }

    if let Some(legend) = engine.settings().color_gradient.legend() {
        println!("legend: {}", legend.to_css());
    }

    Ok(())
}
