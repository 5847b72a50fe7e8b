use serde::{Deserialize, Serialize};

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }

    pub fn distance_to(&self, other: &GeoPoint) -> f64 {
        haversine_distance(self.lat, self.lon, other.lat, other.lon)
    }
}

/// Calculate distance between two coordinates using Haversine formula
/// Returns distance in meters
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

#[cfg(test)]
mod tests {
    use super::*;

    const MOSQUE: GeoPoint = GeoPoint {
        lat: 49.68559,
        lon: 8.59348,
    };

    #[test]
    fn test_distance_to_self_is_zero() {
        assert_eq!(haversine_distance(49.68559, 8.59348, 49.68559, 8.59348), 0.0);
    }

    #[test]
    fn test_distance_is_symmetric() {
        let a = GeoPoint::new(49.700, 8.600);
        let b = MOSQUE;

        assert!((a.distance_to(&b) - b.distance_to(&a)).abs() < 1e-9);
    }

    #[test]
    fn test_approach_samples() {
        let far = GeoPoint::new(49.700, 8.600).distance_to(&MOSQUE);
        assert!(far > 1_500.0 && far < 1_800.0, "got {far}");

        let near = GeoPoint::new(49.6857, 8.5936).distance_to(&MOSQUE);
        assert!(near < 20.0, "got {near}");
    }

    #[test]
    fn test_jakarta_bandung_in_meters() {
        let distance = haversine_distance(-6.2088, 106.8456, -6.9175, 107.6191);
        assert!(distance > 100_000.0 && distance < 150_000.0);
    }

    #[test]
    fn test_point_validation() {
        assert!(MOSQUE.is_valid());
        assert!(!GeoPoint::new(91.0, 0.0).is_valid());
        assert!(!GeoPoint::new(0.0, f64::NAN).is_valid());
    }
}
