use serde::{Deserialize, Serialize};

use crate::domain::{PassengerLeg, Waypoint};

/// A fully evaluated candidate trip: the optimized waypoint sequence plus
/// one priced leg per pooled request. Not persisted; becomes a [`Trip`]
/// only when a booking confirms it.
///
/// [`Trip`]: crate::domain::Trip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripDraft {
    pub waypoints: Vec<Waypoint>,
    pub distance_km: f64,
    pub duration_minutes: u32,
    /// Flag-fall plus distance price for the whole route, before
    /// multipliers. Informational; per-leg fares are authoritative.
    pub base_price: f64,
    /// Surge snapshot the legs were priced under.
    pub surge: f64,
    pub legs: Vec<PassengerLeg>,
}

impl TripDraft {
    pub fn total_passengers(&self) -> u8 {
        self.legs.iter().map(|leg| leg.passengers).sum()
    }
}

/// One ranked option from a match query. Ephemeral: produced per query,
/// never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub trip: TripDraft,
    /// Ranking score in `[0, 100]`.
    pub score: f64,
    /// Estimated savings for the target rider versus a solo trip.
    pub savings: f64,
    /// Worst per-passenger detour in the candidate, in minutes.
    pub max_detour_minutes: u32,
}
