//! Geographic helpers: great-circle distance, route length and ETA.
//!
//! All functions are pure; inputs are assumed to be validated coordinates.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Mean Earth radius in kilometres, used by the haversine formula.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Average speed for ETA estimation (km/h).
pub const AVG_SPEED_KMH: f64 = 40.0;

/// A WGS84 coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    /// Build a point, rejecting coordinates outside valid lat/lon ranges.
    pub fn new(lat: f64, lon: f64) -> Result<Self> {
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return Err(Error::InvalidCoordinate { lat, lon });
        }
        Ok(Self { lat, lon })
    }
}

/// Great-circle (haversine) distance between two points in kilometres.
pub fn distance_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let (lat1, lon1) = (a.lat.to_radians(), a.lon.to_radians());
    let (lat2, lon2) = (b.lat.to_radians(), b.lon.to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let sin_dlat = (dlat * 0.5).sin();
    let sin_dlon = (dlon * 0.5).sin();
    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlon * sin_dlon;
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_KM * c
}

/// Total length of an ordered point sequence in kilometres.
pub fn route_length_km(points: &[GeoPoint]) -> f64 {
    points
        .windows(2)
        .map(|pair| distance_km(pair[0], pair[1]))
        .sum()
}

/// Travel time in whole minutes at the fixed average speed, rounded up.
pub fn travel_minutes(distance_km: f64) -> u32 {
    (distance_km / AVG_SPEED_KMH * 60.0).ceil() as u32
}
