//! WGS84 helpers: cartographic to earth-fixed conversion, local east-north-up frames
//! and great-circle distances.

use bevy::math::{DMat3, DVec2, DVec3};
use serde::{Deserialize, Serialize};


pub const WGS84_SEMI_MAJOR_AXIS: f64 = 6_378_137.0;
pub const WGS84_FLATTENING: f64 = 1.0 / 298.257_223_563;
pub const WGS84_ECCENTRICITY_SQUARED: f64 = WGS84_FLATTENING * (2.0 - WGS84_FLATTENING);
pub const MEAN_EARTH_RADIUS: f64 = 6_371_008.8;


/// Longitude/latitude in degrees, height in meters above the ellipsoid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Cartographic {
    pub longitude: f64,
    pub latitude: f64,
    pub height: f64,
}

impl Cartographic {
    pub const fn new(longitude: f64, latitude: f64, height: f64) -> Self {
        Self { longitude, latitude, height }
    }

    pub fn from_degrees(lon_lat: DVec2, height: f64) -> Self {
        Self::new(lon_lat.x, lon_lat.y, height)
    }

    pub fn lon_lat(&self) -> DVec2 {
        DVec2::new(self.longitude, self.latitude)
    }

    pub fn is_finite(&self) -> bool {
        self.longitude.is_finite() && self.latitude.is_finite() && self.height.is_finite()
    }

    pub fn to_earth_fixed(&self) -> DVec3 {
        let lon = self.longitude.to_radians();
        let lat = self.latitude.to_radians();
        let (sin_lat, cos_lat) = lat.sin_cos();
        let (sin_lon, cos_lon) = lon.sin_cos();

        let prime_vertical = WGS84_SEMI_MAJOR_AXIS
            / (1.0 - WGS84_ECCENTRICITY_SQUARED * sin_lat * sin_lat).sqrt();

        DVec3::new(
            (prime_vertical + self.height) * cos_lat * cos_lon,
            (prime_vertical + self.height) * cos_lat * sin_lon,
            (prime_vertical * (1.0 - WGS84_ECCENTRICITY_SQUARED) + self.height) * sin_lat,
        )
    }
}


/// Haversine distance in meters between two lon/lat points (degrees).
pub fn geodesic_distance(a: DVec2, b: DVec2) -> f64 {
    let lat_a = a.y.to_radians();
    let lat_b = b.y.to_radians();
    let d_lat = lat_b - lat_a;
    let d_lon = (b.x - a.x).to_radians();

    let h = (d_lat * 0.5).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lon * 0.5).sin().powi(2);
    2.0 * MEAN_EARTH_RADIUS * h.sqrt().min(1.0).asin()
}


/// East-north-up tangent frame anchored at a cartographic origin.
///
/// All geometry handed to a backend lives in this frame, so single precision
/// stays accurate on the GPU.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalFrame {
    pub origin: DVec3,
    pub origin_cartographic: Cartographic,
    rotation: DMat3,
}

impl LocalFrame {
    pub fn east_north_up(origin: Cartographic) -> Self {
        let lon = origin.longitude.to_radians();
        let lat = origin.latitude.to_radians();
        let (sin_lat, cos_lat) = lat.sin_cos();
        let (sin_lon, cos_lon) = lon.sin_cos();

        let east = DVec3::new(-sin_lon, cos_lon, 0.0);
        let north = DVec3::new(-sin_lat * cos_lon, -sin_lat * sin_lon, cos_lat);
        let up = DVec3::new(cos_lat * cos_lon, cos_lat * sin_lon, sin_lat);

        Self {
            origin: origin.to_earth_fixed(),
            origin_cartographic: origin,
            rotation: DMat3::from_cols(east, north, up),
        }
    }

    pub fn east(&self) -> DVec3 {
        self.rotation.x_axis
    }

    pub fn north(&self) -> DVec3 {
        self.rotation.y_axis
    }

    pub fn up(&self) -> DVec3 {
        self.rotation.z_axis
    }

    pub fn to_local(&self, earth_fixed: DVec3) -> DVec3 {
        self.rotation.transpose() * (earth_fixed - self.origin)
    }

    pub fn from_local(&self, local: DVec3) -> DVec3 {
        self.origin + self.rotation * local
    }

    pub fn direction_to_local(&self, direction: DVec3) -> DVec3 {
        self.rotation.transpose() * direction
    }

    pub fn cartographic_to_local(&self, point: &Cartographic) -> DVec3 {
        self.to_local(point.to_earth_fixed())
    }

    /// Earth-center-to-`local` direction, expressed in the local frame.
    pub fn position_vector(&self, local: DVec3) -> DVec3 {
        self.direction_to_local(self.from_local(local)).normalize()
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equator_prime_meridian_is_on_x_axis() {
        let p = Cartographic::new(0.0, 0.0, 0.0).to_earth_fixed();
        assert!((p.x - WGS84_SEMI_MAJOR_AXIS).abs() < 1e-6);
        assert!(p.y.abs() < 1e-6 && p.z.abs() < 1e-6);
    }

    #[test]
    fn local_frame_round_trips_and_points_up() {
        let origin = Cartographic::new(116.39, 39.9, 0.0);
        let frame = LocalFrame::east_north_up(origin);

        let above = frame.cartographic_to_local(&Cartographic::new(116.39, 39.9, 25.0));
        assert!((above.z - 25.0).abs() < 1e-6);
        assert!(above.x.abs() < 1e-6 && above.y.abs() < 1e-6);

        let local = DVec3::new(12.0, -40.0, 3.0);
        let back = frame.to_local(frame.from_local(local));
        assert!((back - local).length() < 1e-6);
    }

    #[test]
    fn one_degree_of_latitude_is_about_111_km() {
        let d = geodesic_distance(DVec2::new(10.0, 45.0), DVec2::new(10.0, 46.0));
        assert!((d - 111_195.0).abs() < 100.0);
    }
}
