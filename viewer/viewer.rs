use bevy::{
    prelude::*,
    app::AppExit,
};
use bevy_panorbit_camera::{
    PanOrbitCamera,
    PanOrbitCameraPlugin,
};

use bevy_sunshine_analysis::{
    AnalysisSettings,
    ColorGradient,
    CpuBackend,
    StartOptions,
    SunshineAnalysis,
    SunshineAnalysisPlugin,
    SunshineEngine,
    SunshineOccluder,
    SunshineSweepFinished,
    SunshineSystems,
    SunshineVisualizationPlugin,
    visualization::enu_to_bevy,
};


pub struct SunshineViewer {
    pub esc_close: bool,
    pub width: f32,
    pub height: f32,
    pub name: String,
}

impl Default for SunshineViewer {
    fn default() -> SunshineViewer {
        SunshineViewer {
            esc_close: true,
            width: 1920.0,
            height: 1080.0,
            name: "bevy_sunshine_analysis".to_string(),
        }
    }
}


const FOOTPRINT: [[f64; 2]; 6] = [
    [116.39, 39.9],
    [116.3912, 39.9],
    [116.3912, 39.9006],
    [116.3904, 39.9006],
    [116.3904, 39.9012],
    [116.39, 39.9012],
];

/// Local east/north/up boxes around the footprint.
const NEIGHBOURS: [([f32; 3], [f32; 3]); 3] = [
    ([110.0, -40.0, 0.0], [140.0, 90.0, 45.0]),
    ([-60.0, 40.0, 0.0], [-20.0, 160.0, 30.0]),
    ([40.0, 90.0, 0.0], [90.0, 120.0, 60.0]),
];


fn setup_analysis(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    let settings = AnalysisSettings {
        spacing_intervals: 6.0,
        ..default()
    };

    let backend = CpuBackend::new(settings.shadow_map_size, settings.depth_bias);
    let mut engine = match SunshineEngine::new(backend, settings.clone()) {
        Ok(engine) => engine,
        Err(error) => {
            error!("failed to create sunshine engine: {error}");
            return;
        }
    };
    if let Err(error) = engine.start(StartOptions::from_degrees(&FOOTPRINT, 0.0, 24.0)) {
        error!("failed to start sunshine analysis: {error}");
        return;
    }

    let occluder_material = materials.add(StandardMaterial {
        base_color: Color::srgba(0.8, 0.8, 0.85, 0.6),
        alpha_mode: AlphaMode::Blend,
        ..default()
    });

    // the plugin uploads marked meshes to the backend
    for (min, max) in NEIGHBOURS {
        let (min, max) = (Vec3::from(min), Vec3::from(max));
        let size = max - min;
        commands.spawn((
            SunshineOccluder,
            Mesh3d(meshes.add(Cuboid::new(size.x, size.z, size.y))),
            MeshMaterial3d(occluder_material.clone()),
            Transform::from_translation(enu_to_bevy((min + max) * 0.5)),
            Name::new("occluder"),
        ));
    }

    commands.insert_resource(settings);
    commands.insert_resource(SunshineAnalysis::new(engine));

    commands.spawn((
        DirectionalLight {
            illuminance: 8_000.0,
            ..default()
        },
        Transform::from_xyz(50.0, 200.0, 100.0).looking_at(Vec3::ZERO, Vec3::Y),
    ));

    commands.spawn((
        Camera3d::default(),
        Transform::from_translation(Vec3::new(0.0, 180.0, 260.0)),
        PanOrbitCamera {
            allow_upside_down: true,
            ..default()
        },
    ));
}


fn press_space_toggle_points(
    keys: Res<ButtonInput<KeyCode>>,
    mut settings: ResMut<AnalysisSettings>,
) {
    if keys.just_pressed(KeyCode::Space) {
        settings.show = !settings.show;
    }
}

fn press_g_swap_gradient(
    keys: Res<ButtonInput<KeyCode>>,
    mut settings: ResMut<AnalysisSettings>,
) {
    if keys.just_pressed(KeyCode::KeyG) {
        settings.color_gradient = if settings.color_gradient.equals(&ColorGradient::default()) {
            ColorGradient::from_stops([
                (0.0, Color::srgb(0.1, 0.1, 0.2)),
                (1.0, Color::srgb(1.0, 0.85, 0.3)),
            ])
        } else {
            ColorGradient::default()
        };
    }
}

/// Halves the time step on every press, restarting the sweep.
fn press_t_refine_time(
    keys: Res<ButtonInput<KeyCode>>,
    mut settings: ResMut<AnalysisSettings>,
) {
    if keys.just_pressed(KeyCode::KeyT) {
        settings.time_intervals = (settings.time_intervals / 2).max(5);
        println!("time step {} min", settings.time_intervals);
    }
}

fn log_finished_sweeps(
    mut finished: EventReader<SunshineSweepFinished>,
) {
    for sweep in finished.read() {
        if sweep.halted {
            println!("sweep {} halted early", sweep.generation);
        } else {
            println!("sweep {} finished", sweep.generation);
        }
    }
}


fn viewer_app() {
    let config = SunshineViewer::default();
    let mut app = App::new();

    let primary_window = Some(Window {
        mode: bevy::window::WindowMode::Windowed,
        present_mode: bevy::window::PresentMode::AutoVsync,
        prevent_default_event_handling: false,
        resolution: (config.width, config.height).into(),
        title: config.name.clone(),
        ..default()
    });

    app.insert_resource(ClearColor(Color::srgb_u8(20, 20, 28)));
    app.add_plugins(
        DefaultPlugins
        .set(WindowPlugin {
            primary_window,
            ..default()
        }),
    );
    app.add_plugins(PanOrbitCameraPlugin);

    if config.esc_close {
        app.add_systems(Update, esc_close);
    }

    app.add_plugins((
        SunshineAnalysisPlugin::<CpuBackend>::default(),
        SunshineVisualizationPlugin::<CpuBackend>::default(),
    ));
    app.add_systems(Startup, setup_analysis);
    app.add_systems(
        Update,
        (
            press_space_toggle_points,
            press_g_swap_gradient,
            press_t_refine_time,
        )
            .run_if(resource_exists::<AnalysisSettings>)
            .before(SunshineSystems::Configure),
    );
    app.add_systems(Update, log_finished_sweeps.after(SunshineSystems::Advance));

    app.run();
}


pub fn esc_close(
    keys: Res<ButtonInput<KeyCode>>,
    mut exit: EventWriter<AppExit>
) {
    if keys.just_pressed(KeyCode::Escape) {
        exit.write(AppExit::Success);
    }
}


pub fn main() {
    viewer_app();
}
