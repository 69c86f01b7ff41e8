//! Domain entities: requests, vehicles, trips and their lifecycle states.
//!
//! All writes to these entities go through the booking coordinator; the
//! matching engine only reads requests and produces ephemeral candidates.
//! Every mutable entity carries an integer `version` used for optimistic
//! concurrency at the store (read the version, update `WHERE version = v`,
//! increment on success).

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::geo::GeoPoint;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

id_newtype!(RequestId);
id_newtype!(RiderId);
id_newtype!(VehicleId);
id_newtype!(TripId);

/// A pickup or dropoff place: coordinates plus an optional display label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub point: GeoPoint,
    pub label: Option<String>,
}

impl Place {
    pub fn new(point: GeoPoint, label: Option<String>) -> Self {
        Self { point, label }
    }
}

/// One piece of luggage, sized in capacity units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LuggageSize {
    Small,
    Medium,
    Large,
}

impl LuggageSize {
    /// Capacity units this piece occupies in a vehicle.
    pub fn units(self) -> u8 {
        match self {
            LuggageSize::Small => 1,
            LuggageSize::Medium => 2,
            LuggageSize::Large => 3,
        }
    }
}

/// Total capacity units of a set of luggage pieces.
pub fn luggage_units(pieces: &[LuggageSize]) -> u8 {
    pieces.iter().map(|piece| piece.units()).sum()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    Pending,
    Matched,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
}

impl RequestStatus {
    /// Terminal statuses admit no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, RequestStatus::Completed | RequestStatus::Cancelled)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequestStatus::Pending => "PENDING",
            RequestStatus::Matched => "MATCHED",
            RequestStatus::Confirmed => "CONFIRMED",
            RequestStatus::InProgress => "IN_PROGRESS",
            RequestStatus::Completed => "COMPLETED",
            RequestStatus::Cancelled => "CANCELLED",
        };
        f.write_str(name)
    }
}

/// Why a request left the pool without a confirmed trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CancelReason {
    NoVehicleAvailable,
}

/// Payload for submitting a new transportation request. Validation happens
/// here so a malformed request never reaches the matching pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRequest {
    pub rider_id: RiderId,
    pub pickup: Place,
    pub dropoff: Place,
    pub passengers: u8,
    pub luggage: Vec<LuggageSize>,
    pub max_detour_minutes: u32,
    pub requested_at: DateTime<Utc>,
}

impl NewRequest {
    pub fn validate(&self) -> Result<()> {
        if !(1..=4).contains(&self.passengers) {
            return Err(Error::InvalidPassengerCount(self.passengers));
        }
        GeoPoint::new(self.pickup.point.lat, self.pickup.point.lon)?;
        GeoPoint::new(self.dropoff.point.lat, self.dropoff.point.lon)?;
        Ok(())
    }
}

/// A stored transportation request. Created on submission, mutated only by
/// status/version transitions, never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    pub rider_id: RiderId,
    pub pickup: Place,
    pub dropoff: Place,
    pub passengers: u8,
    pub luggage: Vec<LuggageSize>,
    pub max_detour_minutes: u32,
    pub status: RequestStatus,
    pub cancel_reason: Option<CancelReason>,
    pub version: i64,
    pub requested_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Request {
    pub fn luggage_units(&self) -> u8 {
        luggage_units(&self.luggage)
    }
}

/// A vehicle that can serve pooled trips. `available` flips to false exactly
/// when a booking reserves it and back to true when its active trip ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: VehicleId,
    pub max_passengers: u8,
    pub max_luggage_units: u8,
    pub location: GeoPoint,
    pub available: bool,
    pub version: i64,
}

/// Whether a waypoint is a pickup or a dropoff stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WaypointKind {
    Pickup,
    Dropoff,
}

/// One stop in a trip's ordered waypoint sequence, tagged with the request
/// it serves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub kind: WaypointKind,
    pub request_id: RequestId,
    pub point: GeoPoint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TripStatus {
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
}

impl fmt::Display for TripStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TripStatus::Confirmed => "CONFIRMED",
            TripStatus::InProgress => "IN_PROGRESS",
            TripStatus::Completed => "COMPLETED",
            TripStatus::Cancelled => "CANCELLED",
        };
        f.write_str(name)
    }
}

/// One passenger's slice of a trip: where in the waypoint sequence they
/// board and alight, what they pay and how much detour they absorb.
/// Invariant: `pickup_index < dropoff_index`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassengerLeg {
    pub request_id: RequestId,
    pub passengers: u8,
    pub pickup_index: usize,
    pub dropoff_index: usize,
    pub fare: f64,
    pub detour_minutes: u32,
}

/// A reserved shared trip: the vehicle, the waypoint sequence and one leg
/// per pooled request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    pub id: TripId,
    pub vehicle_id: VehicleId,
    pub waypoints: Vec<Waypoint>,
    pub distance_km: f64,
    pub duration_minutes: u32,
    pub base_price: f64,
    pub surge: f64,
    pub status: TripStatus,
    pub version: i64,
    pub legs: Vec<PassengerLeg>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Trip {
    /// Location of the final dropoff, where the vehicle ends up on completion.
    pub fn final_dropoff(&self) -> Option<GeoPoint> {
        self.waypoints.last().map(|waypoint| waypoint.point)
    }

    /// Total passengers across all legs.
    pub fn total_passengers(&self) -> u8 {
        self.legs.iter().map(|leg| leg.passengers).sum()
    }
}
