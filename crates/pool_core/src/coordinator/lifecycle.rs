//! Trip lifecycle transitions: start, cancel, complete, and the overdue
//! sweep entry point. Each transition is one atomic transaction over the
//! trip, its vehicle and its member requests.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::domain::{RequestStatus, Trip, TripId, TripStatus};
use crate::error::{Error, Result};
use crate::store::StoreTx;

use super::{rollback_quietly, Coordinator};

impl Coordinator {
    /// Move a confirmed trip (and its requests) to IN_PROGRESS. Any other
    /// starting state is rejected.
    pub async fn start_trip(&self, trip_id: TripId) -> Result<()> {
        let mut tx = self.store.begin().await?;
        match start_in_tx(tx.as_mut(), trip_id, Utc::now()).await {
            Ok(trip) => {
                tx.commit().await?;
                self.drop_request_snapshots(trip.legs.iter().map(|leg| leg.request_id))
                    .await;
                info!(trip = %trip_id, "trip started");
                Ok(())
            }
            Err(err) => {
                rollback_quietly(tx, "start trip").await;
                Err(err)
            }
        }
    }

    /// Cancel a live trip: frees the vehicle and puts every member request
    /// back to PENDING so it becomes eligible for rematching.
    pub async fn cancel_trip(&self, trip_id: TripId) -> Result<()> {
        let mut tx = self.store.begin().await?;
        match cancel_in_tx(tx.as_mut(), trip_id, Utc::now()).await {
            Ok(trip) => {
                tx.commit().await?;
                self.drop_request_snapshots(trip.legs.iter().map(|leg| leg.request_id))
                    .await;
                info!(trip = %trip_id, "trip cancelled, requests back to pending");
                Ok(())
            }
            Err(err) => {
                rollback_quietly(tx, "cancel trip").await;
                Err(err)
            }
        }
    }

    /// Complete an in-progress trip: frees the vehicle at the trip's final
    /// dropoff and marks every member request COMPLETED. A second call for
    /// the same trip fails with a conflict; nothing is double-freed.
    pub async fn complete_trip(&self, trip_id: TripId, now: DateTime<Utc>) -> Result<()> {
        let mut tx = self.store.begin().await?;
        match complete_in_tx(tx.as_mut(), trip_id, now).await {
            Ok(trip) => {
                tx.commit().await?;
                self.drop_request_snapshots(trip.legs.iter().map(|leg| leg.request_id))
                    .await;
                info!(trip = %trip_id, "trip completed");
                Ok(())
            }
            Err(err) => {
                rollback_quietly(tx, "complete trip").await;
                Err(err)
            }
        }
    }

    /// Sweep entry point for the periodic external trigger: complete every
    /// in-progress trip that has outlived its estimated duration. Trips
    /// that change concurrently are skipped, not failed.
    pub async fn complete_overdue_trips(&self, now: DateTime<Utc>) -> Result<usize> {
        let trips = self.store.in_progress_trips().await?;
        let mut completed = 0;
        for trip in trips {
            let Some(started_at) = trip.started_at else {
                continue;
            };
            let deadline = started_at + Duration::minutes(i64::from(trip.duration_minutes));
            if now <= deadline {
                continue;
            }
            match self.complete_trip(trip.id, now).await {
                Ok(()) => completed += 1,
                Err(err) if err.is_conflict() => {
                    debug!(trip = %trip.id, %err, "overdue trip changed concurrently; skipped");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(completed)
    }
}

async fn load_trip(tx: &mut dyn StoreTx, trip_id: TripId) -> Result<Trip> {
    tx.trip_for_update(trip_id)
        .await?
        .ok_or(Error::TripNotFound(trip_id))
}

async fn transition_members(
    tx: &mut dyn StoreTx,
    trip: &Trip,
    expected: RequestStatus,
    next: RequestStatus,
) -> Result<()> {
    for leg in &trip.legs {
        let request = tx
            .request_for_update(leg.request_id)
            .await?
            .ok_or(Error::RequestNotFound(leg.request_id))?;
        if request.status != expected {
            return Err(Error::UnexpectedRequestStatus {
                id: request.id,
                expected,
                actual: request.status,
            });
        }
        tx.update_request_status(request.id, request.version, next, None)
            .await?;
    }
    Ok(())
}

async fn start_in_tx(tx: &mut dyn StoreTx, trip_id: TripId, now: DateTime<Utc>) -> Result<Trip> {
    let trip = load_trip(tx, trip_id).await?;
    if trip.status != TripStatus::Confirmed {
        return Err(Error::UnexpectedTripStatus {
            id: trip_id,
            actual: trip.status,
            operation: "start",
        });
    }
    tx.update_trip_status(trip_id, trip.version, TripStatus::InProgress, now)
        .await?;
    transition_members(tx, &trip, RequestStatus::Confirmed, RequestStatus::InProgress).await?;
    Ok(trip)
}

async fn cancel_in_tx(tx: &mut dyn StoreTx, trip_id: TripId, now: DateTime<Utc>) -> Result<Trip> {
    let trip = load_trip(tx, trip_id).await?;
    let expected_member_status = match trip.status {
        TripStatus::Confirmed => RequestStatus::Confirmed,
        TripStatus::InProgress => RequestStatus::InProgress,
        TripStatus::Completed | TripStatus::Cancelled => {
            return Err(Error::UnexpectedTripStatus {
                id: trip_id,
                actual: trip.status,
                operation: "cancel",
            });
        }
    };
    tx.update_trip_status(trip_id, trip.version, TripStatus::Cancelled, now)
        .await?;

    let vehicle = tx
        .vehicle_for_update(trip.vehicle_id)
        .await?
        .ok_or(Error::VehicleNotFound(trip.vehicle_id))?;
    tx.update_vehicle(vehicle.id, vehicle.version, true, vehicle.location)
        .await?;

    transition_members(tx, &trip, expected_member_status, RequestStatus::Pending).await?;
    Ok(trip)
}

async fn complete_in_tx(tx: &mut dyn StoreTx, trip_id: TripId, now: DateTime<Utc>) -> Result<Trip> {
    let trip = load_trip(tx, trip_id).await?;
    if trip.status != TripStatus::InProgress {
        return Err(Error::UnexpectedTripStatus {
            id: trip_id,
            actual: trip.status,
            operation: "complete",
        });
    }
    tx.update_trip_status(trip_id, trip.version, TripStatus::Completed, now)
        .await?;

    let vehicle = tx
        .vehicle_for_update(trip.vehicle_id)
        .await?
        .ok_or(Error::VehicleNotFound(trip.vehicle_id))?;
    // The vehicle becomes available again where the trip ends.
    let parked_at = trip.final_dropoff().unwrap_or(vehicle.location);
    tx.update_vehicle(vehicle.id, vehicle.version, true, parked_at)
        .await?;

    transition_members(tx, &trip, RequestStatus::InProgress, RequestStatus::Completed).await?;
    Ok(trip)
}
