use bevy::math::Vec3;

use bevy_sunshine_analysis::{
    AnalysisSettings,
    Cartographic,
    StartOptions,
    SunshineEngine,
    Timestamp,
    WgpuBackend,
    engine::Advance,
};

const SHADOW_MAP_SIZE: u32 = 1024;
const DEPTH_BIAS: f32 = 1e-4;

const BLOCK: [[f64; 2]; 4] = [
    [116.39, 39.9],
    [116.391, 39.9],
    [116.391, 39.901],
    [116.39, 39.901],
];

// no CI adapter, run with `cargo run --bin test_accumulation --features testing`
fn main() {
    let settings = AnalysisSettings {
        start_time: Timestamp::from_utc(2024, 6, 21, 0, 0, 0),
        stop_time: Timestamp::from_utc(2024, 6, 21, 10, 0, 0),
        time_intervals: 60,
        spacing_intervals: 10.0,
        texture_size: 512,
        shadow_map_size: SHADOW_MAP_SIZE,
        depth_bias: DEPTH_BIAS,
        ..Default::default()
    };

    let open = run(&settings, &[]);
    let covered = run(&settings, &[(Vec3::new(-500.0, -500.0, 25.0), Vec3::new(500.0, 500.0, 26.0))]);

    assert!(!open.is_empty());
    assert_eq!(open.len(), covered.len());

    for ((point, lit), (_, shaded)) in open.iter().zip(&covered) {
        assert!((lit - 1.0).abs() <= 0.002, "{point:?} open sky ratio {lit}");
        assert!(*shaded <= 0.002, "{point:?} covered ratio {shaded}");
    }

    println!("test_accumulation: {} samples ok", open.len());
}

fn run(settings: &AnalysisSettings, boxes: &[(Vec3, Vec3)]) -> Vec<(Cartographic, f32)> {
    let mut backend = WgpuBackend::headless(SHADOW_MAP_SIZE, DEPTH_BIAS).unwrap();
    backend.set_boxes(boxes).unwrap();

    let mut engine = SunshineEngine::new(backend, settings.clone()).unwrap();
    assert!(engine.start(StartOptions::from_degrees(&BLOCK, 0.0, 20.0)).unwrap());

    let mut frames = 0;
    while engine.advance() == Advance::Continue {
        frames += 1;
    }
    assert!(engine.is_complete(), "sweep halted after {frames} frames");

    let points: Vec<Cartographic> = engine
        .grid()
        .unwrap()
        .layers
        .iter()
        .flat_map(|layer| layer.points.iter().step_by(7).map(|point| point.cartographic))
        .collect();

    points
        .into_iter()
        .map(|point| (point, engine.query_ratio(&point)))
        .collect()
}
