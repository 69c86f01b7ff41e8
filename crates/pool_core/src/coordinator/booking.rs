//! Booking confirmation: one atomic transaction that reserves a vehicle
//! and advances every pooled request together.

use tracing::info;

use crate::domain::{RequestId, RequestStatus, Trip};
use crate::error::{Error, Result};
use crate::matching::MatchResult;
use crate::store::StoreTx;

use super::{rollback_quietly, Coordinator};

impl Coordinator {
    /// Confirm a previously returned match option.
    ///
    /// Re-reads every involved request's version and status (a stale read
    /// is a conflict), reserves one available vehicle under an exclusive
    /// row lock, creates the trip with its passenger legs and moves all
    /// member requests to CONFIRMED. Reserving the vehicle and creating
    /// the trip happen in the same transaction, so at most one active trip
    /// can ever reference a vehicle. No partial booking is visible on any
    /// failure.
    pub async fn confirm_booking(
        &self,
        request_id: RequestId,
        option: &MatchResult,
    ) -> Result<Trip> {
        let mut tx = self.store.begin().await?;
        match confirm_in_tx(tx.as_mut(), request_id, option).await {
            Ok(trip) => {
                tx.commit().await?;
                self.drop_request_snapshots(trip.legs.iter().map(|leg| leg.request_id))
                    .await;
                info!(
                    trip = %trip.id,
                    vehicle = %trip.vehicle_id,
                    passengers = trip.total_passengers(),
                    "booking confirmed"
                );
                Ok(trip)
            }
            Err(err) => {
                rollback_quietly(tx, "confirm booking").await;
                Err(err)
            }
        }
    }
}

async fn confirm_in_tx(
    tx: &mut dyn StoreTx,
    request_id: RequestId,
    option: &MatchResult,
) -> Result<Trip> {
    if !option
        .trip
        .legs
        .iter()
        .any(|leg| leg.request_id == request_id)
    {
        return Err(Error::RequestNotFound(request_id));
    }

    let mut members = Vec::with_capacity(option.trip.legs.len());
    for leg in &option.trip.legs {
        let request = tx
            .request_for_update(leg.request_id)
            .await?
            .ok_or(Error::RequestNotFound(leg.request_id))?;
        if request.status != RequestStatus::Pending {
            return Err(Error::UnexpectedRequestStatus {
                id: request.id,
                expected: RequestStatus::Pending,
                actual: request.status,
            });
        }
        members.push(request);
    }

    let passengers = option.trip.total_passengers();
    let luggage_units: u8 = members.iter().map(|member| member.luggage_units()).sum();
    let vehicle = tx
        .lock_available_vehicle(passengers, luggage_units)
        .await?
        .ok_or(Error::NoVehicleAvailable)?;

    tx.update_vehicle(vehicle.id, vehicle.version, false, vehicle.location)
        .await?;
    let trip = tx.insert_trip(&option.trip, vehicle.id).await?;
    for member in &members {
        tx.update_request_status(member.id, member.version, RequestStatus::Confirmed, None)
            .await?;
    }
    Ok(trip)
}
