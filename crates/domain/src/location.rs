//! Caller location as stored on the call.

use serde::{Deserialize, Serialize};

/// A resolved service location. After successful geocoding either `plz`
/// has exactly five digits or `ort` is non-empty.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub formatted_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub plz: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub ort: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub google_maps_link: Option<String>,
}

impl Location {
    /// Bare coordinates, as received from the location-share page.
    pub fn from_coordinates(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            ..Default::default()
        }
    }
}

/// Validate a latitude/longitude pair from untrusted input.
pub fn coordinates_valid(latitude: f64, longitude: f64) -> bool {
    (-90.0..=90.0).contains(&latitude)
        && (-180.0..=180.0).contains(&longitude)
        && latitude.is_finite()
        && longitude.is_finite()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinate_bounds() {
        assert!(coordinates_valid(47.73, 10.31));
        assert!(coordinates_valid(-90.0, 180.0));
        assert!(!coordinates_valid(90.5, 0.0));
        assert!(!coordinates_valid(0.0, -180.1));
        assert!(!coordinates_valid(f64::NAN, 0.0));
    }
}
