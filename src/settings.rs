use std::path::Path;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    backend::{
        cpu::{DEFAULT_DEPTH_BIAS, DEFAULT_SHADOW_MAP_SIZE},
        MAX_TEXTURE_SIZE,
    },
    error::{AnalysisError, Result},
    gradient::ColorGradient,
    grid::{SampleGridBuilder, DEFAULT_GRID_REFINEMENT},
    time::{TimeSeries, Timestamp},
};


#[derive(Resource, Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    pub start_time: Timestamp,
    pub stop_time: Timestamp,
    /// minutes between timesteps
    pub time_intervals: u32,
    /// meters between layers, and the horizontal spacing target
    pub spacing_intervals: f64,

    pub texture_size: u32,
    pub shadow_map_size: u32,
    pub depth_bias: f32,
    pub grid_refinement: f64,

    pub show: bool,
    pub color_gradient: ColorGradient,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        let start_time = Timestamp::from_utc(2024, 6, 21, 0, 0, 0);
        Self {
            start_time,
            stop_time: start_time.plus_seconds(24 * 3600),
            time_intervals: 60,
            spacing_intervals: 10.0,

            texture_size: 1024,
            shadow_map_size: DEFAULT_SHADOW_MAP_SIZE,
            depth_bias: DEFAULT_DEPTH_BIAS,
            grid_refinement: DEFAULT_GRID_REFINEMENT,

            show: true,
            color_gradient: ColorGradient::default(),
        }
    }
}

impl AnalysisSettings {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(json).map_err(|e| AnalysisError::Settings(e.to_string()))?;
        settings.validate()?;
        Ok(settings.normalized())
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| AnalysisError::Settings(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&json)
    }

    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| AnalysisError::Settings(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.stop_time <= self.start_time {
            return Err(AnalysisError::InvalidTimeWindow {
                start: self.start_time.unix_seconds(),
                stop: self.stop_time.unix_seconds(),
            });
        }
        if !self.color_gradient.is_usable() {
            return Err(AnalysisError::GradientTooSmall(self.color_gradient.len()));
        }
        if !self.spacing_intervals.is_finite() {
            return Err(AnalysisError::Settings(format!(
                "spacing_intervals must be finite, got {}",
                self.spacing_intervals,
            )));
        }
        for (name, size) in [("texture_size", self.texture_size), ("shadow_map_size", self.shadow_map_size)] {
            if size > MAX_TEXTURE_SIZE {
                return Err(AnalysisError::Settings(format!(
                    "{name} must be at most {MAX_TEXTURE_SIZE}, got {size}",
                )));
            }
        }
        if !(self.grid_refinement.is_finite() && self.grid_refinement > 0.0) {
            return Err(AnalysisError::Settings(format!(
                "grid_refinement must be > 0, got {}",
                self.grid_refinement,
            )));
        }
        Ok(())
    }

    /// Applies the floors: intervals and spacing of at least 1, textures of at least 1 texel.
    pub fn normalized(mut self) -> Self {
        self.time_intervals = self.time_intervals.max(1);
        self.spacing_intervals = self.spacing_intervals.max(1.0);
        self.texture_size = self.texture_size.max(1);
        self.shadow_map_size = self.shadow_map_size.max(1);
        self
    }

    pub fn grid_builder(&self) -> SampleGridBuilder {
        SampleGridBuilder {
            spacing: self.spacing_intervals.max(1.0),
            refinement: self.grid_refinement,
            texture_size: self.texture_size.max(1),
        }
    }

    pub fn time_series(&self) -> TimeSeries {
        TimeSeries::plan(self.start_time, self.stop_time, self.time_intervals)
    }

    /// Whether switching from `self` to `other` invalidates accumulated results.
    pub fn sweep_differs(&self, other: &Self) -> bool {
        self.start_time != other.start_time
            || self.stop_time != other.stop_time
            || self.time_intervals.max(1) != other.time_intervals.max(1)
            || self.grid_differs(other)
    }

    /// Whether switching from `self` to `other` invalidates the sample grid.
    pub fn grid_differs(&self, other: &Self) -> bool {
        self.spacing_intervals.max(1.0) != other.spacing_intervals.max(1.0)
            || self.grid_refinement != other.grid_refinement
            || self.texture_size.max(1) != other.texture_size.max(1)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let settings = AnalysisSettings::from_json_str(
            r#"{ "time_intervals": 30, "start_time": 1718928000, "stop_time": 1718964000 }"#,
        )
        .unwrap();
        assert_eq!(settings.time_intervals, 30);
        assert_eq!(settings.spacing_intervals, 10.0);
        assert_eq!(settings.time_series().len(), 20);
        assert!(settings.show);
    }

    #[test]
    fn zero_interval_is_floored() {
        let settings = AnalysisSettings::from_json_str(r#"{ "time_intervals": 0, "spacing_intervals": 0.2 }"#).unwrap();
        assert_eq!(settings.time_intervals, 1);
        assert_eq!(settings.spacing_intervals, 1.0);
    }

    #[test]
    fn oversized_textures_are_rejected() {
        for json in [r#"{ "texture_size": 70000 }"#, r#"{ "shadow_map_size": 65536 }"#] {
            let result = AnalysisSettings::from_json_str(json);
            assert!(matches!(result, Err(AnalysisError::Settings(_))), "{json}");
        }
        let largest = AnalysisSettings::from_json_str(r#"{ "texture_size": 16384 }"#).unwrap();
        assert_eq!(largest.texture_size, MAX_TEXTURE_SIZE);
    }

    #[test]
    fn inverted_window_is_rejected() {
        let result = AnalysisSettings::from_json_str(r#"{ "start_time": 100, "stop_time": 100 }"#);
        assert!(matches!(result, Err(AnalysisError::InvalidTimeWindow { .. })));
    }

    #[test]
    fn settings_round_trip_through_json() {
        let settings = AnalysisSettings::default();
        let parsed = AnalysisSettings::from_json_str(&settings.to_json_string().unwrap()).unwrap();
        assert!(!settings.sweep_differs(&parsed));
        assert!(settings.color_gradient.equals(&parsed.color_gradient));
    }
}
