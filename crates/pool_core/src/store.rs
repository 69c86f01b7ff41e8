//! Relational store interface the core consumes but does not implement.
//!
//! The store is the single source of truth. Every mutable row carries an
//! integer `version`; updates take the version read just before and must
//! fail with [`Error::VersionConflict`] when the row moved on (the store
//! runs them as `... WHERE version = <read value>` and increments on
//! success). Transactions are all-or-nothing: any failed statement rolls
//! the whole transaction back.
//!
//! [`Error::VersionConflict`]: crate::error::Error::VersionConflict

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::domain::{
    CancelReason, NewRequest, Request, RequestId, RequestStatus, Trip, TripId, TripStatus, Vehicle,
    VehicleId,
};
use crate::error::Result;
use crate::geo::GeoPoint;
use crate::matching::TripDraft;

/// Plain read and insert access plus transaction entry.
#[async_trait]
pub trait Store: Send + Sync {
    /// Persist a new request as PENDING; the store assigns id and version.
    async fn insert_request(&self, new: NewRequest) -> Result<Request>;

    async fn request(&self, id: RequestId) -> Result<Option<Request>>;

    async fn vehicle(&self, id: VehicleId) -> Result<Option<Vehicle>>;

    /// The trip with its passenger legs.
    async fn trip(&self, id: TripId) -> Result<Option<Trip>>;

    /// Spatial candidate query: PENDING requests whose pickup lies within
    /// `radius_km` of `origin`, requested within the trailing `window`,
    /// most recent first, at most `limit` rows.
    async fn pending_requests_near(
        &self,
        origin: GeoPoint,
        radius_km: f64,
        window: Duration,
        limit: usize,
    ) -> Result<Vec<Request>>;

    /// Demand side of the surge computation.
    async fn count_pending_requests(&self) -> Result<u64>;

    /// Supply side of the surge computation.
    async fn count_available_vehicles(&self) -> Result<u64>;

    /// Trips currently IN_PROGRESS, for the overdue sweep.
    async fn in_progress_trips(&self) -> Result<Vec<Trip>>;

    /// Open a multi-statement atomic transaction.
    async fn begin(&self) -> Result<Box<dyn StoreTx>>;
}

/// One open transaction. Dropping without commit must roll back; the
/// coordinator still calls [`StoreTx::rollback`] explicitly on failure so
/// the store can surface rollback errors.
#[async_trait]
pub trait StoreTx: Send {
    /// Re-read a request inside the transaction (fresh version/status).
    async fn request_for_update(&mut self, id: RequestId) -> Result<Option<Request>>;

    /// Re-read a trip and its legs inside the transaction.
    async fn trip_for_update(&mut self, id: TripId) -> Result<Option<Trip>>;

    /// Re-read a vehicle inside the transaction.
    async fn vehicle_for_update(&mut self, id: VehicleId) -> Result<Option<Vehicle>>;

    /// Select one available vehicle with at least the given capacity under
    /// an exclusive row lock, or `None` when none qualifies.
    async fn lock_available_vehicle(
        &mut self,
        min_passengers: u8,
        min_luggage_units: u8,
    ) -> Result<Option<Vehicle>>;

    /// Version-checked request status transition; `cancel_reason` is
    /// recorded when the new status is CANCELLED.
    async fn update_request_status(
        &mut self,
        id: RequestId,
        expected_version: i64,
        status: RequestStatus,
        cancel_reason: Option<CancelReason>,
    ) -> Result<()>;

    /// Version-checked vehicle update: availability flag and location.
    async fn update_vehicle(
        &mut self,
        id: VehicleId,
        expected_version: i64,
        available: bool,
        location: GeoPoint,
    ) -> Result<()>;

    /// Version-checked trip status transition. The store records `at` as
    /// `started_at` when moving to IN_PROGRESS and as `completed_at` when
    /// moving to a terminal status.
    async fn update_trip_status(
        &mut self,
        id: TripId,
        expected_version: i64,
        status: TripStatus,
        at: DateTime<Utc>,
    ) -> Result<()>;

    /// Create the trip row and its passenger legs from a confirmed draft,
    /// in CONFIRMED status. The store assigns id and version.
    async fn insert_trip(&mut self, draft: &TripDraft, vehicle_id: VehicleId) -> Result<Trip>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}
