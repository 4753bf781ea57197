//! Solar position from the NOAA solar calculator equations.
//!
//! Accuracy is well under a tenth of a degree for dates within a few centuries of
//! J2000, which is far below the angular resolution of a sample grid. Refraction
//! is not applied.

use bevy::math::{DVec2, DVec3};

use crate::time::Timestamp;


#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolarPosition {
    /// degrees clockwise from north
    pub azimuth: f64,
    /// degrees above the horizon, negative below
    pub elevation: f64,
}

impl SolarPosition {
    /// Sun position seen from `lon_lat` (degrees) at `time`.
    pub fn at(time: Timestamp, lon_lat: DVec2) -> Self {
        let longitude = lon_lat.x.clamp(-180.0, 180.0);
        let latitude = lon_lat.y.clamp(-90.0, 90.0);

        let t = (time.julian_day() - 2_451_545.0) / 36_525.0;
        let declination = sun_declination(t);

        let true_solar_minutes = (time.utc_minutes_of_day() + equation_of_time(t) + 4.0 * longitude)
            .rem_euclid(1440.0);
        let hour_angle = true_solar_minutes / 4.0 - 180.0;

        let lat = latitude.to_radians();
        let decl = declination.to_radians();
        let ha = hour_angle.to_radians();

        let cos_zenith = (lat.sin() * decl.sin() + lat.cos() * decl.cos() * ha.cos()).clamp(-1.0, 1.0);
        let zenith = cos_zenith.acos();

        let denominator = lat.cos() * zenith.sin();
        let cos_azimuth = if denominator.abs() < 1e-10 {
            1.0
        } else {
            ((lat.sin() * zenith.cos() - decl.sin()) / denominator).clamp(-1.0, 1.0)
        };
        let azimuth = cos_azimuth.acos().to_degrees();
        let azimuth = if hour_angle > 0.0 {
            (azimuth + 180.0).rem_euclid(360.0)
        } else {
            (540.0 - azimuth).rem_euclid(360.0)
        };

        Self {
            azimuth,
            elevation: 90.0 - zenith.to_degrees(),
        }
    }

    pub fn is_above_horizon(&self) -> bool {
        self.elevation > 0.0
    }

    /// Unit vector towards the sun in an east-north-up frame.
    pub fn direction_enu(&self) -> DVec3 {
        let azimuth = self.azimuth.to_radians();
        let elevation = self.elevation.to_radians();
        let horizontal = elevation.cos();
        DVec3::new(
            azimuth.sin() * horizontal,
            azimuth.cos() * horizontal,
            elevation.sin(),
        )
    }
}


fn geom_mean_long_sun(t: f64) -> f64 {
    (280.46646 + t * (36_000.76983 + 0.000_303_2 * t)).rem_euclid(360.0)
}

fn geom_mean_anomaly_sun(t: f64) -> f64 {
    357.52911 + t * (35_999.05029 - 0.000_153_7 * t)
}

fn eccentricity_earth_orbit(t: f64) -> f64 {
    0.016_708_634 - t * (0.000_042_037 + 0.000_000_126_7 * t)
}

fn sun_equation_of_center(t: f64) -> f64 {
    let m = geom_mean_anomaly_sun(t).to_radians();
    m.sin() * (1.914_602 - t * (0.004_817 + 0.000_014 * t))
        + (2.0 * m).sin() * (0.019_993 - 0.000_101 * t)
        + (3.0 * m).sin() * 0.000_289
}

fn sun_apparent_long(t: f64) -> f64 {
    let true_long = geom_mean_long_sun(t) + sun_equation_of_center(t);
    true_long - 0.005_69 - 0.004_78 * (125.04 - 1934.136 * t).to_radians().sin()
}

fn obliquity_correction(t: f64) -> f64 {
    let mean = 23.0 + (26.0 + (21.448 - t * (46.8150 + t * (0.000_59 - t * 0.001_813))) / 60.0) / 60.0;
    mean + 0.002_56 * (125.04 - 1934.136 * t).to_radians().cos()
}

fn sun_declination(t: f64) -> f64 {
    let e = obliquity_correction(t).to_radians();
    let lambda = sun_apparent_long(t).to_radians();
    (e.sin() * lambda.sin()).asin().to_degrees()
}

// minutes
fn equation_of_time(t: f64) -> f64 {
    let e = obliquity_correction(t).to_radians();
    let l0 = geom_mean_long_sun(t).to_radians();
    let ecc = eccentricity_earth_orbit(t);
    let m = geom_mean_anomaly_sun(t).to_radians();
    let y = (e / 2.0).tan().powi(2);

    let eot = y * (2.0 * l0).sin() - 2.0 * ecc * m.sin()
        + 4.0 * ecc * y * m.sin() * (2.0 * l0).cos()
        - 0.5 * y * y * (4.0 * l0).sin()
        - 1.25 * ecc * ecc * (2.0 * m).sin();

    4.0 * eot.to_degrees()
}
