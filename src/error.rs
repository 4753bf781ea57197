use thiserror::Error;


/// Failures raised by an [`ExposureBackend`](crate::backend::ExposureBackend).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("gpu allocation failed for {0}")]
    Allocation(String),

    #[error("pixel readback failed: {0}")]
    Readback(String),

    #[error("readback region {x},{y} {width}x{height} exceeds texture size {size}")]
    ReadbackOutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        size: u32,
    },

    #[error("backend device error: {0}")]
    Device(String),
}

impl BackendError {
    pub fn allocation<T: ToString>(what: T) -> Self {
        BackendError::Allocation(what.to_string())
    }

    pub fn readback<T: ToString>(msg: T) -> Self {
        BackendError::Readback(msg.to_string())
    }

    pub fn device<T: ToString>(msg: T) -> Self {
        BackendError::Device(msg.to_string())
    }
}


/// Configuration and capability errors surfaced synchronously by the engine façade.
///
/// Every variant except [`AnalysisError::Backend`] is a programming error: the call
/// that produced it left the engine state untouched.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("region needs at least 3 vertices, got {0}")]
    RegionTooSmall(usize),

    #[error("region vertex {index} is not a finite lon/lat pair")]
    InvalidVertex { index: usize },

    #[error("extruded height must be >= 0, got {0}")]
    NegativeExtrudedHeight(f64),

    #[error("bottom height must be finite, got {0}")]
    InvalidBottomHeight(f64),

    #[error("stop time ({stop}) must be after start time ({start})")]
    InvalidTimeWindow { start: i64, stop: i64 },

    #[error("color gradient needs at least 2 stops, got {0}")]
    GradientTooSmall(usize),

    #[error("backend does not support sampleable depth textures")]
    MissingDepthTexture,

    #[error("engine has been destroyed")]
    Destroyed,

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("settings could not be parsed: {0}")]
    Settings(String),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

pub type Result<T, E = AnalysisError> = std::result::Result<T, E>;
