//! Test helpers: in-memory store/cache doubles and fixture builders.
//!
//! The doubles honour the same contracts the real collaborators promise
//! (version-checked updates, all-or-nothing transactions, TTL expiry,
//! atomic set-if-absent) so coordinator behavior under contention can be
//! tested without infrastructure. The store double serializes transactions
//! behind one table lock, a coarse stand-in for row-level locking that is
//! strictly stricter than the real thing.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lru::LruCache;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::Instant;

use crate::cache::KvCache;
use crate::domain::{
    CancelReason, LuggageSize, NewRequest, Place, Request, RequestId, RequestStatus, RiderId,
    Trip, TripId, TripStatus, Vehicle, VehicleId,
};
use crate::error::{Error, Result};
use crate::geo::{self, GeoPoint};
use crate::matching::TripDraft;
use crate::store::{Store, StoreTx};

/// A central Berlin pickup used across tests for consistent geography.
pub fn test_point() -> GeoPoint {
    GeoPoint {
        lat: 52.5200,
        lon: 13.4050,
    }
}

/// Roughly 0.2 km north of [`test_point`].
pub fn test_nearby_point() -> GeoPoint {
    GeoPoint {
        lat: 52.5218,
        lon: 13.4050,
    }
}

/// Roughly 6 km northeast of [`test_point`], for dropoffs.
pub fn test_distant_point() -> GeoPoint {
    GeoPoint {
        lat: 52.5600,
        lon: 13.4700,
    }
}

/// Builder for request fixtures.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    id: i64,
    pickup: GeoPoint,
    dropoff: GeoPoint,
    passengers: u8,
    luggage: Vec<LuggageSize>,
    max_detour_minutes: u32,
    requested_at: DateTime<Utc>,
}

impl RequestBuilder {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            pickup: test_point(),
            dropoff: test_distant_point(),
            passengers: 1,
            luggage: vec![LuggageSize::Small],
            max_detour_minutes: 15,
            requested_at: Utc::now(),
        }
    }

    pub fn pickup(mut self, lat: f64, lon: f64) -> Self {
        self.pickup = GeoPoint { lat, lon };
        self
    }

    pub fn dropoff(mut self, lat: f64, lon: f64) -> Self {
        self.dropoff = GeoPoint { lat, lon };
        self
    }

    pub fn passengers(mut self, passengers: u8) -> Self {
        self.passengers = passengers;
        self
    }

    pub fn luggage(mut self, luggage: Vec<LuggageSize>) -> Self {
        self.luggage = luggage;
        self
    }

    pub fn max_detour(mut self, minutes: u32) -> Self {
        self.max_detour_minutes = minutes;
        self
    }

    /// Submission payload, for flows that go through the store.
    pub fn build_new(self) -> NewRequest {
        NewRequest {
            rider_id: RiderId(self.id),
            pickup: Place::new(self.pickup, None),
            dropoff: Place::new(self.dropoff, None),
            passengers: self.passengers,
            luggage: self.luggage,
            max_detour_minutes: self.max_detour_minutes,
            requested_at: self.requested_at,
        }
    }

    /// A stored PENDING request, for tests that bypass the store.
    pub fn build(self) -> Request {
        Request {
            id: RequestId(self.id),
            rider_id: RiderId(self.id),
            pickup: Place::new(self.pickup, None),
            dropoff: Place::new(self.dropoff, None),
            passengers: self.passengers,
            luggage: self.luggage,
            max_detour_minutes: self.max_detour_minutes,
            status: RequestStatus::Pending,
            cancel_reason: None,
            version: 0,
            requested_at: self.requested_at,
            created_at: self.requested_at,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Tables {
    requests: HashMap<i64, Request>,
    vehicles: HashMap<i64, Vehicle>,
    trips: HashMap<i64, Trip>,
    last_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }
}

/// In-memory relational store double.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an available vehicle at [`test_point`].
    pub async fn add_vehicle(&self, max_passengers: u8, max_luggage_units: u8) -> Vehicle {
        let mut tables = self.tables.lock().await;
        let id = tables.next_id();
        let vehicle = Vehicle {
            id: VehicleId(id),
            max_passengers,
            max_luggage_units,
            location: test_point(),
            available: true,
            version: 0,
        };
        tables.vehicles.insert(id, vehicle.clone());
        vehicle
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_request(&self, new: NewRequest) -> Result<Request> {
        let mut tables = self.tables.lock().await;
        let id = tables.next_id();
        let request = Request {
            id: RequestId(id),
            rider_id: new.rider_id,
            pickup: new.pickup,
            dropoff: new.dropoff,
            passengers: new.passengers,
            luggage: new.luggage,
            max_detour_minutes: new.max_detour_minutes,
            status: RequestStatus::Pending,
            cancel_reason: None,
            version: 0,
            requested_at: new.requested_at,
            created_at: Utc::now(),
        };
        tables.requests.insert(id, request.clone());
        Ok(request)
    }

    async fn request(&self, id: RequestId) -> Result<Option<Request>> {
        Ok(self.tables.lock().await.requests.get(&id.0).cloned())
    }

    async fn vehicle(&self, id: VehicleId) -> Result<Option<Vehicle>> {
        Ok(self.tables.lock().await.vehicles.get(&id.0).cloned())
    }

    async fn trip(&self, id: TripId) -> Result<Option<Trip>> {
        Ok(self.tables.lock().await.trips.get(&id.0).cloned())
    }

    async fn pending_requests_near(
        &self,
        origin: GeoPoint,
        radius_km: f64,
        window: chrono::Duration,
        limit: usize,
    ) -> Result<Vec<Request>> {
        let cutoff = Utc::now() - window;
        let tables = self.tables.lock().await;
        let mut matches: Vec<Request> = tables
            .requests
            .values()
            .filter(|request| request.status == RequestStatus::Pending)
            .filter(|request| request.requested_at >= cutoff)
            .filter(|request| geo::distance_km(request.pickup.point, origin) <= radius_km)
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.requested_at.cmp(&a.requested_at).then(a.id.cmp(&b.id)));
        matches.truncate(limit);
        Ok(matches)
    }

    async fn count_pending_requests(&self) -> Result<u64> {
        let tables = self.tables.lock().await;
        Ok(tables
            .requests
            .values()
            .filter(|request| request.status == RequestStatus::Pending)
            .count() as u64)
    }

    async fn count_available_vehicles(&self) -> Result<u64> {
        let tables = self.tables.lock().await;
        Ok(tables
            .vehicles
            .values()
            .filter(|vehicle| vehicle.available)
            .count() as u64)
    }

    async fn in_progress_trips(&self) -> Result<Vec<Trip>> {
        let tables = self.tables.lock().await;
        let mut trips: Vec<Trip> = tables
            .trips
            .values()
            .filter(|trip| trip.status == TripStatus::InProgress)
            .cloned()
            .collect();
        trips.sort_by_key(|trip| trip.id);
        Ok(trips)
    }

    async fn begin(&self) -> Result<Box<dyn StoreTx>> {
        let guard = Arc::clone(&self.tables).lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryTx { guard, staged }))
    }
}

/// A transaction over the store double: stages writes on a private copy of
/// the tables and swaps it in on commit. Holding the table lock for the
/// transaction's lifetime serializes transactions entirely.
pub struct MemoryTx {
    guard: OwnedMutexGuard<Tables>,
    staged: Tables,
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn request_for_update(&mut self, id: RequestId) -> Result<Option<Request>> {
        Ok(self.staged.requests.get(&id.0).cloned())
    }

    async fn trip_for_update(&mut self, id: TripId) -> Result<Option<Trip>> {
        Ok(self.staged.trips.get(&id.0).cloned())
    }

    async fn vehicle_for_update(&mut self, id: VehicleId) -> Result<Option<Vehicle>> {
        Ok(self.staged.vehicles.get(&id.0).cloned())
    }

    async fn lock_available_vehicle(
        &mut self,
        min_passengers: u8,
        min_luggage_units: u8,
    ) -> Result<Option<Vehicle>> {
        let mut qualified: Vec<&Vehicle> = self
            .staged
            .vehicles
            .values()
            .filter(|vehicle| vehicle.available)
            .filter(|vehicle| {
                vehicle.max_passengers >= min_passengers
                    && vehicle.max_luggage_units >= min_luggage_units
            })
            .collect();
        qualified.sort_by_key(|vehicle| vehicle.id);
        Ok(qualified.first().map(|vehicle| (*vehicle).clone()))
    }

    async fn update_request_status(
        &mut self,
        id: RequestId,
        expected_version: i64,
        status: RequestStatus,
        cancel_reason: Option<CancelReason>,
    ) -> Result<()> {
        let request = self
            .staged
            .requests
            .get_mut(&id.0)
            .ok_or(Error::RequestNotFound(id))?;
        if request.version != expected_version {
            return Err(Error::VersionConflict {
                entity: "request",
                id: id.0,
            });
        }
        request.status = status;
        request.cancel_reason = if status == RequestStatus::Cancelled {
            cancel_reason
        } else {
            None
        };
        request.version += 1;
        Ok(())
    }

    async fn update_vehicle(
        &mut self,
        id: VehicleId,
        expected_version: i64,
        available: bool,
        location: GeoPoint,
    ) -> Result<()> {
        let vehicle = self
            .staged
            .vehicles
            .get_mut(&id.0)
            .ok_or(Error::VehicleNotFound(id))?;
        if vehicle.version != expected_version {
            return Err(Error::VersionConflict {
                entity: "vehicle",
                id: id.0,
            });
        }
        vehicle.available = available;
        vehicle.location = location;
        vehicle.version += 1;
        Ok(())
    }

    async fn update_trip_status(
        &mut self,
        id: TripId,
        expected_version: i64,
        status: TripStatus,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let trip = self
            .staged
            .trips
            .get_mut(&id.0)
            .ok_or(Error::TripNotFound(id))?;
        if trip.version != expected_version {
            return Err(Error::VersionConflict {
                entity: "trip",
                id: id.0,
            });
        }
        trip.status = status;
        match status {
            TripStatus::InProgress => trip.started_at = Some(at),
            TripStatus::Completed | TripStatus::Cancelled => trip.completed_at = Some(at),
            TripStatus::Confirmed => {}
        }
        trip.version += 1;
        Ok(())
    }

    async fn insert_trip(&mut self, draft: &TripDraft, vehicle_id: VehicleId) -> Result<Trip> {
        let id = self.staged.next_id();
        let trip = Trip {
            id: TripId(id),
            vehicle_id,
            waypoints: draft.waypoints.clone(),
            distance_km: draft.distance_km,
            duration_minutes: draft.duration_minutes,
            base_price: draft.base_price,
            surge: draft.surge,
            status: TripStatus::Confirmed,
            version: 0,
            legs: draft.legs.clone(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        };
        self.staged.trips.insert(id, trip.clone());
        Ok(trip)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let MemoryTx { mut guard, staged } = *self;
        *guard = staged;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

/// In-memory key-value cache double with TTL expiry, bounded by an LRU
/// table. Uses the tokio clock so paused-time tests can drive expiry.
pub struct MemoryCache {
    entries: std::sync::Mutex<LruCache<String, (String, Instant)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self {
            entries: std::sync::Mutex::new(LruCache::new(
                NonZeroUsize::new(1024).expect("cache size must be non-zero"),
            )),
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCache {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, LruCache<String, (String, Instant)>>> {
        self.entries
            .lock()
            .map_err(|_| Error::Cache("cache mutex poisoned".into()))
    }
}

#[async_trait]
impl KvCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.lock()?;
        match entries.get(key) {
            Some((value, deadline)) if Instant::now() < *deadline => Ok(Some(value.clone())),
            Some(_) => {
                entries.pop(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut entries = self.lock()?;
        entries.put(key.to_owned(), (value.to_owned(), Instant::now() + ttl));
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let mut entries = self.lock()?;
        let live = matches!(entries.get(key), Some((_, deadline)) if Instant::now() < *deadline);
        if live {
            return Ok(false);
        }
        entries.put(key.to_owned(), (value.to_owned(), Instant::now() + ttl));
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.lock()?.pop(key);
        Ok(())
    }

    async fn delete_if_equals(&self, key: &str, value: &str) -> Result<bool> {
        let mut entries = self.lock()?;
        let owned = matches!(
            entries.get(key),
            Some((held, deadline)) if held == value && Instant::now() < *deadline
        );
        if owned {
            entries.pop(key);
        }
        Ok(owned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn transaction_rollback_leaves_tables_untouched() {
        let store = MemoryStore::new();
        let request = store
            .insert_request(RequestBuilder::new(1).build_new())
            .await
            .expect("insert");

        let mut tx = store.begin().await.expect("begin");
        tx.update_request_status(request.id, request.version, RequestStatus::Cancelled, None)
            .await
            .expect("staged update");
        tx.rollback().await.expect("rollback");

        let reread = store.request(request.id).await.expect("read").expect("row");
        assert_eq!(reread.status, RequestStatus::Pending);
        assert_eq!(reread.version, 0);
    }

    #[tokio::test]
    async fn stale_version_is_rejected() {
        let store = MemoryStore::new();
        let request = store
            .insert_request(RequestBuilder::new(1).build_new())
            .await
            .expect("insert");

        let mut tx = store.begin().await.expect("begin");
        tx.update_request_status(request.id, request.version, RequestStatus::Confirmed, None)
            .await
            .expect("first update");
        tx.commit().await.expect("commit");

        // A second writer still holding the old version must conflict.
        let mut tx = store.begin().await.expect("begin");
        let stale = tx
            .update_request_status(request.id, request.version, RequestStatus::Cancelled, None)
            .await;
        assert!(matches!(stale, Err(Error::VersionConflict { .. })));
        tx.rollback().await.expect("rollback");
    }

    #[tokio::test]
    async fn candidate_query_filters_by_radius_and_status() {
        let store = MemoryStore::new();
        let near = store
            .insert_request(RequestBuilder::new(1).build_new())
            .await
            .expect("near");
        // Potsdam, far outside a 5 km radius.
        store
            .insert_request(RequestBuilder::new(2).pickup(52.3906, 13.0645).build_new())
            .await
            .expect("far");

        let found = store
            .pending_requests_near(test_point(), 5.0, chrono::Duration::minutes(30), 10)
            .await
            .expect("query");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, near.id);
    }

    #[tokio::test(start_paused = true)]
    async fn cache_entries_expire() {
        let cache = MemoryCache::new();
        cache
            .set("surge", "1.5", Duration::from_secs(60))
            .await
            .expect("set");
        assert_eq!(cache.get("surge").await.expect("get"), Some("1.5".into()));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(cache.get("surge").await.expect("get"), None);
        // Expired entries no longer block set_if_absent.
        assert!(cache
            .set_if_absent("surge", "2.0", Duration::from_secs(60))
            .await
            .expect("set_if_absent"));
    }
}
