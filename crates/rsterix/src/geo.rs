/**
* Coordinate transforms between the radar-centred frames and WGS-84.
*
* Two frames are used throughout the pipeline:
*
*  - polar (range in nautical miles, azimuth in degrees from true north),
*    the native frame of Cat 10/48 position reports;
*  - station-Cartesian (x east, y north, metres), the frame the Kalman
*    filter and the associator work in.
*
* The projection is a deliberate flat-Earth approximation: it matches the
* reference tables bit for bit at short radar ranges and keeps the forward
* and inverse transforms exactly symmetric. Do not substitute geodesic
* math here without re-deriving every fixture.
*/
use serde::{Deserialize, Serialize};

/// Earth radius used by the polar → WGS-84 projection, in nautical miles.
pub const EARTH_RADIUS_NM: f64 = 3443.92;

/// Earth radius used by the Cartesian ↔ WGS-84 projection, in metres.
pub const EARTH_RADIUS_M: f64 = 6_378_137.0;

/// Metres per nautical mile.
pub const METERS_PER_NM: f64 = 1852.0;

/// A WGS-84 position in decimal degrees.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone, Copy)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

impl Position {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Position {
            latitude,
            longitude,
        }
    }
}

/// Project a polar measurement onto WGS-84 around a fixed station.
///
/// `Δlat = (ρ/R)·cos θ`, `Δlon = (ρ/R)·sin θ / cos lat₀`, both in radians,
/// with `R = 3443.92 NM`.
pub fn polar_to_wgs84(station: &Position, range_nm: f64, azimuth_deg: f64) -> Position {
    let azimuth_rad = azimuth_deg.to_radians();
    let delta_lat = (range_nm / EARTH_RADIUS_NM) * azimuth_rad.cos();
    let delta_lon =
        (range_nm / EARTH_RADIUS_NM) * azimuth_rad.sin() / station.latitude.to_radians().cos();
    Position {
        latitude: station.latitude + delta_lat.to_degrees(),
        longitude: station.longitude + delta_lon.to_degrees(),
    }
}

/// Invert [`polar_to_wgs84`]: recover `(range_nm, azimuth_deg)` from a
/// target position. Azimuth is normalised to `[0, 360)`.
pub fn wgs84_to_polar(station: &Position, target: &Position) -> (f64, f64) {
    let a = (target.latitude - station.latitude).to_radians();
    let b = (target.longitude - station.longitude).to_radians() * station.latitude.to_radians().cos();
    let range_nm = EARTH_RADIUS_NM * (a * a + b * b).sqrt();
    let azimuth_deg = (b.atan2(a).to_degrees() + 360.0) % 360.0;
    (range_nm, azimuth_deg)
}

/// Polar measurement to station-Cartesian metres (x east, y north).
pub fn polar_to_cartesian(range_m: f64, azimuth_deg: f64) -> (f64, f64) {
    let azimuth_rad = azimuth_deg.to_radians();
    (range_m * azimuth_rad.sin(), range_m * azimuth_rad.cos())
}

/// Station-Cartesian metres back to a polar measurement.
pub fn cartesian_to_polar(x: f64, y: f64) -> (f64, f64) {
    let range_m = (x * x + y * y).sqrt();
    let azimuth_deg = (x.atan2(y).to_degrees() + 360.0) % 360.0;
    (range_m, azimuth_deg)
}

/// Station-Cartesian metres to WGS-84, using the metric Earth radius.
pub fn cartesian_to_wgs84(station: &Position, x: f64, y: f64) -> Position {
    let lat_offset = (y / EARTH_RADIUS_M).to_degrees();
    let lon_offset = (x / (EARTH_RADIUS_M * station.latitude.to_radians().cos())).to_degrees();
    Position {
        latitude: station.latitude + lat_offset,
        longitude: station.longitude + lon_offset,
    }
}

/// WGS-84 to station-Cartesian metres.
pub fn wgs84_to_cartesian(station: &Position, target: &Position) -> (f64, f64) {
    let x = (target.longitude - station.longitude).to_radians()
        * EARTH_RADIUS_M
        * station.latitude.to_radians().cos();
    let y = (target.latitude - station.latitude).to_radians() * EARTH_RADIUS_M;
    (x, y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn station() -> Position {
        Position::new(28.0836, -80.6081)
    }

    #[test]
    fn zero_range_maps_to_station() {
        let pos = polar_to_wgs84(&station(), 0.0, 123.4);
        assert!((pos.latitude - 28.0836).abs() < 1e-9);
        assert!((pos.longitude + 80.6081).abs() < 1e-9);
    }

    #[test]
    fn polar_round_trip() {
        for (rho, theta) in [(0.5, 0.0), (10.5, 90.0), (42.0, 213.7), (120.0, 359.5)] {
            let pos = polar_to_wgs84(&station(), rho, theta);
            let (rho_back, theta_back) = wgs84_to_polar(&station(), &pos);
            assert_relative_eq!(rho, rho_back, epsilon = 1e-6);
            assert_relative_eq!(theta, theta_back, epsilon = 1e-4);
        }
    }

    #[test]
    fn due_east_has_no_latitude_offset() {
        let pos = polar_to_wgs84(&station(), 10.5, 90.0);
        assert!((pos.latitude - 28.0836).abs() < 1e-9);
        assert!(pos.longitude > -80.6081);
    }

    #[test]
    fn cartesian_round_trip() {
        let (x, y) = (12_345.0, -6_789.0);
        let pos = cartesian_to_wgs84(&station(), x, y);
        let (x_back, y_back) = wgs84_to_cartesian(&station(), &pos);
        assert_relative_eq!(x, x_back, epsilon = 1e-6);
        assert_relative_eq!(y, y_back, epsilon = 1e-6);
    }

    #[test]
    fn polar_cartesian_axes() {
        let (x, y) = polar_to_cartesian(1000.0, 90.0);
        assert_relative_eq!(x, 1000.0, epsilon = 1e-9);
        assert!(y.abs() < 1e-9);
        let (r, az) = cartesian_to_polar(x, y);
        assert_relative_eq!(r, 1000.0, epsilon = 1e-9);
        assert_relative_eq!(az, 90.0, epsilon = 1e-9);
    }
}
