//! Concurrency and booking coordinator.
//!
//! Owns every lifecycle transition of requests, vehicles and trips; the
//! matching engine below it only reads. A match query takes a slot on a
//! bounded counting gate (callers past the bound queue FIFO), then a
//! non-blocking per-request lease, reloads the request and its pending
//! neighbors from the store and runs the engine. The MATCHED state only
//! exists in the returned options; it is never persisted. Booking,
//! cancellation and completion are single store transactions; any step's
//! failure rolls the whole transaction back.

mod booking;
mod lifecycle;

use std::sync::Arc;
use std::time::Duration;

use chrono::{Timelike, Utc};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::cache::KvCache;
use crate::domain::{CancelReason, NewRequest, Request, RequestId, RequestStatus};
use crate::error::{Error, Result};
use crate::lease::RequestLease;
use crate::matching::{MatchResult, MatchingEngine};
use crate::store::{Store, StoreTx};

/// Cache key for the demand surge snapshot.
const SURGE_KEY: &str = "pricing:surge";

fn snapshot_key(id: RequestId) -> String {
    format!("req:snap:{id}")
}

/// Coordinator tunables, owned by the composition root.
#[derive(Debug, Clone, Copy)]
pub struct CoordinatorConfig {
    /// Upper bound on simultaneously executing match computations.
    pub max_concurrent_matches: usize,
    /// Lease lifetime; must exceed worst-case matching latency.
    pub lease_ttl: Duration,
    /// How long a surge snapshot stays fresh in the cache.
    pub surge_ttl: Duration,
    /// How long a cached request snapshot stays fresh.
    pub snapshot_ttl: Duration,
    /// Most candidates loaded per match query.
    pub candidate_limit: usize,
    /// Only requests submitted within this trailing window are candidates.
    pub candidate_window_minutes: i64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_matches: 100,
            lease_ttl: Duration::from_secs(30),
            surge_ttl: Duration::from_secs(60),
            snapshot_ttl: Duration::from_secs(60),
            candidate_limit: 20,
            candidate_window_minutes: 30,
        }
    }
}

/// The coordinator. Construct one per process and share it; collaborators
/// are injected here, never reached through globals.
pub struct Coordinator {
    store: Arc<dyn Store>,
    cache: Arc<dyn KvCache>,
    engine: MatchingEngine,
    lease: RequestLease,
    gate: Arc<Semaphore>,
    config: CoordinatorConfig,
}

impl Coordinator {
    pub fn new(
        store: Arc<dyn Store>,
        cache: Arc<dyn KvCache>,
        engine: MatchingEngine,
        config: CoordinatorConfig,
    ) -> Self {
        let lease = RequestLease::new(Arc::clone(&cache), config.lease_ttl);
        Self {
            store,
            cache,
            engine,
            lease,
            gate: Arc::new(Semaphore::new(config.max_concurrent_matches)),
            config,
        }
    }

    /// Validate and persist an inbound request as PENDING.
    pub async fn submit_request(&self, new: NewRequest) -> Result<Request> {
        new.validate()?;
        let request = self.store.insert_request(new).await?;
        info!(request = %request.id, passengers = request.passengers, "request submitted");
        Ok(request)
    }

    /// Compute ranked trip options for a pending request.
    ///
    /// Fails fast with [`Error::MatchingInProgress`] when another match
    /// computation already holds the request's lease. A request that
    /// yields zero options is cancelled ("no vehicle available") rather
    /// than left pending indefinitely.
    pub async fn find_matches(&self, id: RequestId) -> Result<Vec<MatchResult>> {
        let _permit = self
            .gate
            .acquire()
            .await
            .expect("concurrency gate is never closed");
        let guard = self.lease.acquire(id).await?;
        let outcome = self.matched_options(id).await;
        let released = guard.release().await;
        let options = outcome?;
        released?;
        Ok(options)
    }

    async fn matched_options(&self, id: RequestId) -> Result<Vec<MatchResult>> {
        let request = self
            .store
            .request(id)
            .await?
            .ok_or(Error::RequestNotFound(id))?;
        if request.status != RequestStatus::Pending {
            return Err(Error::UnexpectedRequestStatus {
                id,
                expected: RequestStatus::Pending,
                actual: request.status,
            });
        }

        let candidates = self
            .store
            .pending_requests_near(
                request.pickup.point,
                self.engine.config().search_radius_km,
                chrono::Duration::minutes(self.config.candidate_window_minutes),
                self.config.candidate_limit,
            )
            .await?;
        let surge = self.surge_snapshot().await?;
        let hour = Utc::now().hour();

        let options = self.engine.find_matches(&request, &candidates, surge, hour);
        if options.is_empty() {
            warn!(request = %id, "no trip options; cancelling request");
            self.cancel_request(&request).await?;
            return Ok(options);
        }
        debug!(request = %id, options = options.len(), surge, "match query complete");
        Ok(options)
    }

    /// Read-through request snapshot for plain read accessors. Advisory:
    /// matching reloads and booking re-reads the store regardless, so a
    /// snapshot is never the basis of a state transition.
    pub async fn request_snapshot(&self, id: RequestId) -> Result<Option<Request>> {
        let key = snapshot_key(id);
        if let Some(cached) = self.cache.get(&key).await? {
            if let Ok(request) = serde_json::from_str::<Request>(&cached) {
                return Ok(Some(request));
            }
        }
        let Some(request) = self.store.request(id).await? else {
            return Ok(None);
        };
        let encoded =
            serde_json::to_string(&request).map_err(|err| Error::Cache(err.to_string()))?;
        self.cache.set(&key, &encoded, self.config.snapshot_ttl).await?;
        Ok(Some(request))
    }

    /// Drop cached snapshots after a committed write. Failures only warn:
    /// a stale entry expires with its TTL and is advisory anyway.
    pub(crate) async fn drop_request_snapshots(&self, ids: impl IntoIterator<Item = RequestId>) {
        for id in ids {
            if let Err(err) = self.cache.delete(&snapshot_key(id)).await {
                warn!(request = %id, %err, "snapshot invalidation failed");
            }
        }
    }

    /// Read-through surge snapshot: cached value when fresh, otherwise
    /// recomputed from store counts and written back with a short TTL.
    async fn surge_snapshot(&self) -> Result<f64> {
        if let Some(cached) = self.cache.get(SURGE_KEY).await? {
            if let Ok(surge) = serde_json::from_str::<f64>(&cached) {
                return Ok(surge);
            }
        }
        let active = self.store.count_pending_requests().await?;
        let available = self.store.count_available_vehicles().await?;
        let surge = self.engine.pricing().surge_factor(active, available);
        let encoded =
            serde_json::to_string(&surge).map_err(|err| Error::Cache(err.to_string()))?;
        self.cache.set(SURGE_KEY, &encoded, self.config.surge_ttl).await?;
        Ok(surge)
    }

    /// Transactionally cancel a request that matching could not serve.
    async fn cancel_request(&self, request: &Request) -> Result<()> {
        let mut tx = self.store.begin().await?;
        let outcome = cancel_request_in_tx(tx.as_mut(), request.id).await;
        match outcome {
            Ok(()) => {
                tx.commit().await?;
                self.drop_request_snapshots([request.id]).await;
                Ok(())
            }
            Err(err) => {
                rollback_quietly(tx, "cancel request").await;
                Err(err)
            }
        }
    }
}

async fn cancel_request_in_tx(tx: &mut dyn StoreTx, id: RequestId) -> Result<()> {
    let request = tx
        .request_for_update(id)
        .await?
        .ok_or(Error::RequestNotFound(id))?;
    if request.status != RequestStatus::Pending {
        return Err(Error::UnexpectedRequestStatus {
            id,
            expected: RequestStatus::Pending,
            actual: request.status,
        });
    }
    tx.update_request_status(
        id,
        request.version,
        RequestStatus::Cancelled,
        Some(CancelReason::NoVehicleAvailable),
    )
    .await
}

/// Roll back a failed transaction, surfacing rollback failures only in the
/// log; the original error is what the caller needs to see.
pub(crate) async fn rollback_quietly(tx: Box<dyn StoreTx>, operation: &str) {
    if let Err(err) = tx.rollback().await {
        warn!(operation, %err, "transaction rollback failed");
    }
}
