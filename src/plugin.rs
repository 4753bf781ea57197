use std::marker::PhantomData;

use bevy::{
    log::{debug, warn},
    prelude::*,
    render::{
        mesh::{PrimitiveTopology, VertexAttributeValues},
        render_asset::RenderAssetUsages,
    },
};

use crate::{
    backend::ExposureBackend,
    engine::{Advance, SunshineEngine},
    registry::EngineSlot,
    settings::AnalysisSettings,
    visualization::{bevy_to_enu, VisualizationPipeline},
};


/// The engine bound to this app. Replacing the resource drops, and so
/// releases, the previous engine.
#[derive(Resource)]
pub struct SunshineAnalysis<B: ExposureBackend> {
    slot: EngineSlot<B>,
}

impl<B: ExposureBackend> SunshineAnalysis<B> {
    pub fn new(engine: SunshineEngine<B>) -> Self {
        Self {
            slot: EngineSlot::new(engine),
        }
    }

    pub fn slot(&self) -> &EngineSlot<B> {
        &self.slot
    }

    pub fn slot_mut(&mut self) -> &mut EngineSlot<B> {
        &mut self.slot
    }

    pub fn engine(&self) -> Option<&SunshineEngine<B>> {
        self.slot.get()
    }

    pub fn engine_mut(&mut self) -> Option<&mut SunshineEngine<B>> {
        self.slot.get_mut()
    }
}


#[derive(Event, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SunshineSweepFinished {
    pub generation: u64,
    /// the sweep stopped early on a backend failure
    pub halted: bool,
}


#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub enum SunshineSystems {
    Configure,
    Advance,
    Visualize,
}


/// Runs one timestep of the bound engine per frame.
pub struct SunshineAnalysisPlugin<B> {
    _backend: PhantomData<fn() -> B>,
}

impl<B> Default for SunshineAnalysisPlugin<B> {
    fn default() -> Self {
        Self { _backend: PhantomData }
    }
}

impl<B: ExposureBackend> Plugin for SunshineAnalysisPlugin<B> {
    fn build(&self, app: &mut App) {
        app.add_event::<SunshineSweepFinished>();

        app.configure_sets(
            Update,
            (
                SunshineSystems::Configure,
                SunshineSystems::Advance,
                SunshineSystems::Visualize,
            ).chain(),
        );

        app.add_systems(
            Update,
            (
                (apply_settings::<B>, sync_occluders::<B>).chain().in_set(SunshineSystems::Configure),
                advance_engine::<B>.in_set(SunshineSystems::Advance),
            ),
        );
    }
}

fn apply_settings<B: ExposureBackend>(
    settings: Option<Res<AnalysisSettings>>,
    analysis: Option<ResMut<SunshineAnalysis<B>>>,
) {
    let (Some(settings), Some(mut analysis)) = (settings, analysis) else {
        return;
    };
    if !settings.is_changed() {
        return;
    }

    if let Some(engine) = analysis.engine_mut() {
        if let Err(error) = engine.configure(settings.clone()) {
            warn!("rejected sunshine settings: {error}");
        }
    }
}

/// Marks a `Mesh3d` entity whose triangles shade the analysis. The Bevy world
/// origin is the center of the analysis region.
#[derive(Component, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SunshineOccluder;

/// Appends the triangles of a triangle-list mesh in the local east-north-up frame.
fn mesh_triangles(mesh: &Mesh, transform: &GlobalTransform, triangles: &mut Vec<[Vec3; 3]>) {
    if mesh.primitive_topology() != PrimitiveTopology::TriangleList {
        return;
    }
    let Some(VertexAttributeValues::Float32x3(positions)) = mesh.attribute(Mesh::ATTRIBUTE_POSITION) else {
        return;
    };

    let local: Vec<Vec3> = positions
        .iter()
        .map(|&position| bevy_to_enu(transform.transform_point(Vec3::from(position))))
        .collect();
    let indices: Vec<usize> = match mesh.indices() {
        Some(indices) => indices.iter().collect(),
        None => (0..local.len()).collect(),
    };

    triangles.extend(indices.chunks_exact(3).filter_map(|corners| {
        Some([
            *local.get(corners[0])?,
            *local.get(corners[1])?,
            *local.get(corners[2])?,
        ])
    }));
}

/// Re-uploads every marked mesh whenever one is added, moved, swapped or removed.
fn sync_occluders<B: ExposureBackend>(
    analysis: Option<ResMut<SunshineAnalysis<B>>>,
    meshes: Option<Res<Assets<Mesh>>>,
    occluders: Query<(&Mesh3d, &GlobalTransform), With<SunshineOccluder>>,
    changed: Query<(), (With<SunshineOccluder>, Or<(Changed<Mesh3d>, Changed<GlobalTransform>)>)>,
    mut removed: RemovedComponents<SunshineOccluder>,
    mut pending: Local<bool>,
) {
    if removed.read().count() > 0 || !changed.is_empty() {
        *pending = true;
    }
    if !*pending {
        return;
    }

    let (Some(mut analysis), Some(meshes)) = (analysis, meshes) else {
        return;
    };
    let Some(engine) = analysis.engine_mut() else {
        return;
    };

    let mut triangles = Vec::new();
    for (mesh, transform) in &occluders {
        // unloaded meshes retry next frame
        let Some(mesh) = meshes.get(&mesh.0) else {
            return;
        };
        mesh_triangles(mesh, transform, &mut triangles);
    }
    *pending = false;

    match engine.set_occluders(&triangles) {
        Ok(_) => debug!("sunshine occluders updated: {} triangles", triangles.len()),
        Err(error) => warn!("failed to update sunshine occluders: {error}"),
    }
}

fn advance_engine<B: ExposureBackend>(
    analysis: Option<ResMut<SunshineAnalysis<B>>>,
    mut finished: EventWriter<SunshineSweepFinished>,
) {
    let Some(mut analysis) = analysis else {
        return;
    };
    let Some(engine) = analysis.engine_mut() else {
        return;
    };

    if !engine.is_sweeping() {
        return;
    }

    if engine.advance() == Advance::Done {
        finished.write(SunshineSweepFinished {
            generation: engine.generation(),
            halted: engine.accumulation().iter().any(|pipeline| pipeline.is_halted()),
        });
    }
}


/// Marks the point-list mesh entity drawn for one layer.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SunshineLayer {
    pub layer: usize,
    pub generation: u64,
    revision: u64,
}

#[derive(Resource)]
struct SunshineLayerMaterial(Handle<StandardMaterial>);


/// Draws every layer as vertex-colored points and keeps them in sync with the engine.
pub struct SunshineVisualizationPlugin<B> {
    _backend: PhantomData<fn() -> B>,
}

impl<B> Default for SunshineVisualizationPlugin<B> {
    fn default() -> Self {
        Self { _backend: PhantomData }
    }
}

impl<B: ExposureBackend> Plugin for SunshineVisualizationPlugin<B> {
    fn build(&self, app: &mut App) {
        app.add_systems(Startup, setup_layer_material);
        app.add_systems(Update, sync_layer_meshes::<B>.in_set(SunshineSystems::Visualize));
    }
}

fn setup_layer_material(
    mut commands: Commands,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    let material = materials.add(StandardMaterial {
        base_color: Color::WHITE,
        unlit: true,
        ..default()
    });
    commands.insert_resource(SunshineLayerMaterial(material));
}

fn point_mesh(visualization: &VisualizationPipeline) -> Mesh {
    let positions: Vec<[f32; 3]> = visualization.positions().iter().map(|p| p.to_array()).collect();
    Mesh::new(PrimitiveTopology::PointList, RenderAssetUsages::default())
        .with_inserted_attribute(Mesh::ATTRIBUTE_POSITION, positions)
        .with_inserted_attribute(Mesh::ATTRIBUTE_COLOR, visualization.linear_colors())
}

fn layer_visibility(visualization: &VisualizationPipeline) -> Visibility {
    if visualization.show() {
        Visibility::Inherited
    } else {
        Visibility::Hidden
    }
}

fn sync_layer_meshes<B: ExposureBackend>(
    mut commands: Commands,
    analysis: Option<Res<SunshineAnalysis<B>>>,
    material: Option<Res<SunshineLayerMaterial>>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut layers: Query<(Entity, &mut SunshineLayer, &Mesh3d, &mut Visibility)>,
) {
    let Some(material) = material else {
        return;
    };

    let engine = analysis.as_ref().and_then(|analysis| analysis.engine());
    let (generation, visualizations) = match engine {
        Some(engine) if !engine.is_destroyed() => (engine.generation(), engine.visualization()),
        _ => (0, &[][..]),
    };

    let stale = layers.iter().count() != visualizations.len()
        || layers.iter().any(|(_, layer, _, _)| layer.generation != generation);

    if stale {
        for (entity, _, _, _) in &layers {
            commands.entity(entity).despawn();
        }

        for visualization in visualizations {
            commands.spawn((
                SunshineLayer {
                    layer: visualization.layer(),
                    generation,
                    revision: visualization.revision(),
                },
                Mesh3d(meshes.add(point_mesh(visualization))),
                MeshMaterial3d(material.0.clone()),
                Transform::default(),
                layer_visibility(visualization),
            ));
        }
        return;
    }

    for (_, mut layer, mesh, mut visibility) in &mut layers {
        let Some(visualization) = visualizations.get(layer.layer) else {
            continue;
        };

        visibility.set_if_neq(layer_visibility(visualization));

        if layer.revision == visualization.revision() {
            continue;
        }
        if let Some(mesh) = meshes.get_mut(&mesh.0) {
            mesh.insert_attribute(Mesh::ATTRIBUTE_COLOR, visualization.linear_colors());
        }
        layer.revision = visualization.revision();
    }
}
