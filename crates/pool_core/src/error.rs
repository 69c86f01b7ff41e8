//! Error taxonomy for the pooling core.
//!
//! Conflict-class errors (stale version, lease held, no free vehicle,
//! unexpected status) are expected under concurrent load and are safe to
//! retry; `Error::is_conflict` lets callers tell them apart from the rest.

use thiserror::Error;

use crate::domain::{RequestId, RequestStatus, TripId, TripStatus, VehicleId};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Latitude/longitude outside valid ranges.
    #[error("coordinate out of range: ({lat}, {lon})")]
    InvalidCoordinate { lat: f64, lon: f64 },

    /// Passenger count outside the 1..=4 booking range.
    #[error("passenger count {0} outside 1..=4")]
    InvalidPassengerCount(u8),

    /// A lease for this request is already held by another match computation.
    #[error("matching already in progress for request {0}, retry later")]
    MatchingInProgress(RequestId),

    /// Optimistic version check failed: the row changed since it was read.
    #[error("{entity} {id} was modified concurrently")]
    VersionConflict { entity: &'static str, id: i64 },

    /// The request is not in the status the operation requires.
    #[error("request {id} is {actual}, expected {expected}")]
    UnexpectedRequestStatus {
        id: RequestId,
        expected: RequestStatus,
        actual: RequestStatus,
    },

    /// The trip is not in a status the operation accepts.
    #[error("trip {id} is {actual}, cannot {operation}")]
    UnexpectedTripStatus {
        id: TripId,
        actual: TripStatus,
        operation: &'static str,
    },

    /// No vehicle with sufficient capacity is currently available.
    #[error("no available vehicle")]
    NoVehicleAvailable,

    #[error("request {0} not found")]
    RequestNotFound(RequestId),

    #[error("trip {0} not found")]
    TripNotFound(TripId),

    #[error("vehicle {0} not found")]
    VehicleNotFound(VehicleId),

    /// Relational store unreachable or failed mid-operation. Not retried
    /// here; retry policy belongs to the caller.
    #[error("store unavailable: {0}")]
    Store(String),

    /// Key-value cache unreachable or failed mid-operation.
    #[error("cache unavailable: {0}")]
    Cache(String),
}

impl Error {
    /// Whether this error is an expected, recoverable-by-retry conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Error::MatchingInProgress(_)
                | Error::VersionConflict { .. }
                | Error::UnexpectedRequestStatus { .. }
                | Error::UnexpectedTripStatus { .. }
                | Error::NoVehicleAvailable
        )
    }
}
