pub use backend::{
    CpuBackend,
    ExposureBackend,
    WgpuBackend,
};
pub use engine::{
    Advance,
    StartOptions,
    SunshineEngine,
    SunshineExposure,
};
pub use error::{
    AnalysisError,
    BackendError,
    Result,
};
pub use geodesy::Cartographic;
pub use gradient::ColorGradient;
pub use plugin::{
    SunshineAnalysis,
    SunshineAnalysisPlugin,
    SunshineLayer,
    SunshineOccluder,
    SunshineSweepFinished,
    SunshineSystems,
    SunshineVisualizationPlugin,
};
pub use query::NO_SAMPLE;
pub use registry::EngineSlot;
pub use settings::AnalysisSettings;
pub use time::Timestamp;

pub mod backend;
pub mod encoding;
pub mod engine;
pub mod ephemeris;
pub mod error;
pub mod geodesy;
pub mod gradient;
pub mod grid;
pub mod light;
pub mod pipeline;
pub mod plugin;
pub mod query;
pub mod registry;
pub mod settings;
pub mod time;
pub mod visualization;
