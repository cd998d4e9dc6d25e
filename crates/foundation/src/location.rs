use serde::{Deserialize, Serialize};

/// Map view location carried by a deep link.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MapLocation {
    /// Latitude in degrees (WGS84).
    pub lat: f64,
    /// Longitude in degrees (WGS84).
    pub lng: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zoom: Option<u8>,
}

impl MapLocation {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self {
            lat,
            lng,
            zoom: None,
        }
    }

    pub fn with_zoom(mut self, zoom: u8) -> Self {
        self.zoom = Some(zoom);
        self
    }

    /// Build a location only when both coordinates are finite numbers.
    pub fn from_coords(lat: f64, lng: f64, zoom: Option<u8>) -> Option<Self> {
        if !lat.is_finite() || !lng.is_finite() {
            return None;
        }
        Some(Self { lat, lng, zoom })
    }
}
