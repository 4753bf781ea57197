use bevy::math::{DMat4, DVec3, Mat4};

use crate::{
    ephemeris::SolarPosition,
    grid::SampleGrid,
    time::{TimeSample, TimeSeries, Timestamp},
};


/// Orthographic depth range of a light camera. `near == far` marks an empty
/// frustum: nothing projects inside it, so every sample reads as occluded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightFrustum {
    pub half_width: f64,
    pub near: f64,
    pub far: f64,
}

impl LightFrustum {
    pub fn is_empty(&self) -> bool {
        self.far <= self.near || self.half_width <= 0.0
    }
}


/// Virtual light camera for one timestamp, in the run's local frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightState {
    pub time: Timestamp,
    pub sun: SolarPosition,
    /// unit vector towards the sun
    pub direction: DVec3,
    pub position: DVec3,
    pub target: DVec3,
    pub up: DVec3,
    pub frustum: LightFrustum,
}

impl LightState {
    pub fn for_time(grid: &SampleGrid, time: Timestamp) -> Self {
        let center_lon_lat = grid.frame.origin_cartographic.lon_lat();
        let sun = SolarPosition::at(time, center_lon_lat);
        // the local frame is east-north-up at the region center
        let direction = sun.direction_enu();

        let radius = grid.sphere.radius;
        let target = grid.sphere.center;
        let position = target + direction * radius;

        // local +z is the region normal; 90 degrees or more from it is below the horizon
        let below_horizon = direction.z <= 0.0;

        let mut up = grid.frame.position_vector(position);
        if direction.cross(up).length_squared() < 1e-12 {
            up = DVec3::Y;
        }

        let frustum = if below_horizon {
            LightFrustum {
                half_width: radius,
                near: radius,
                far: radius,
            }
        } else {
            LightFrustum {
                half_width: radius,
                near: 0.0,
                far: 2.0 * radius,
            }
        };

        Self {
            time,
            sun,
            direction,
            position,
            target,
            up,
            frustum,
        }
    }

    pub fn is_lit(&self) -> bool {
        !self.frustum.is_empty()
    }

    pub fn view(&self) -> DMat4 {
        DMat4::look_at_rh(self.position, self.target, self.up)
    }

    /// `None` for an empty frustum.
    pub fn clip_from_local(&self) -> Option<DMat4> {
        if self.frustum.is_empty() {
            return None;
        }

        let hw = self.frustum.half_width;
        let projection = DMat4::orthographic_rh(-hw, hw, -hw, hw, self.frustum.near, self.frustum.far);
        Some(projection * self.view())
    }

    pub fn clip_from_local_f32(&self) -> Option<Mat4> {
        self.clip_from_local().map(|m| m.as_mat4())
    }
}


/// Expands a time series into per-step light states for one grid.
pub struct TimeSeriesPlanner<'a> {
    grid: &'a SampleGrid,
    series: &'a TimeSeries,
}

impl<'a> TimeSeriesPlanner<'a> {
    pub fn new(grid: &'a SampleGrid, series: &'a TimeSeries) -> Self {
        Self { grid, series }
    }

    pub fn light_state(&self, sample: &TimeSample) -> LightState {
        LightState::for_time(self.grid, sample.time)
    }

    pub fn light_state_at(&self, index: usize) -> Option<LightState> {
        self.series.get(index).map(|sample| self.light_state(sample))
    }

    pub fn iter(&self) -> impl Iterator<Item = LightState> + '_ {
        self.series.iter().map(|sample| self.light_state(sample))
    }
}
