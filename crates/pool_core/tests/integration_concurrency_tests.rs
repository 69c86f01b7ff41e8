use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pool_core::cache::KvCache;
use pool_core::coordinator::{Coordinator, CoordinatorConfig};
use pool_core::domain::{NewRequest, Request, RequestId, Trip, TripId, Vehicle, VehicleId};
use pool_core::error::{Error, Result};
use pool_core::geo::GeoPoint;
use pool_core::lease::RequestLease;
use pool_core::matching::{MatchingConfig, MatchingEngine};
use pool_core::pricing::PricingConfig;
use pool_core::store::{Store, StoreTx};
use pool_core::test_helpers::{MemoryCache, MemoryStore, RequestBuilder};

/// Store wrapper whose candidate query stalls, holding each match
/// computation open long enough for contenders to pile up.
struct SlowStore {
    inner: MemoryStore,
    query_delay: Duration,
}

#[async_trait]
impl Store for SlowStore {
    async fn insert_request(&self, new: NewRequest) -> Result<Request> {
        self.inner.insert_request(new).await
    }

    async fn request(&self, id: RequestId) -> Result<Option<Request>> {
        self.inner.request(id).await
    }

    async fn vehicle(&self, id: VehicleId) -> Result<Option<Vehicle>> {
        self.inner.vehicle(id).await
    }

    async fn trip(&self, id: TripId) -> Result<Option<Trip>> {
        self.inner.trip(id).await
    }

    async fn pending_requests_near(
        &self,
        origin: GeoPoint,
        radius_km: f64,
        window: chrono::Duration,
        limit: usize,
    ) -> Result<Vec<Request>> {
        tokio::time::sleep(self.query_delay).await;
        self.inner
            .pending_requests_near(origin, radius_km, window, limit)
            .await
    }

    async fn count_pending_requests(&self) -> Result<u64> {
        self.inner.count_pending_requests().await
    }

    async fn count_available_vehicles(&self) -> Result<u64> {
        self.inner.count_available_vehicles().await
    }

    async fn in_progress_trips(&self) -> Result<Vec<Trip>> {
        self.inner.in_progress_trips().await
    }

    async fn begin(&self) -> Result<Box<dyn StoreTx>> {
        self.inner.begin().await
    }
}

fn coordinator_over(store: Arc<dyn Store>, config: CoordinatorConfig) -> Coordinator {
    let cache = Arc::new(MemoryCache::new());
    let engine = MatchingEngine::new(MatchingConfig::default(), PricingConfig::default());
    Coordinator::new(store, cache as Arc<dyn KvCache>, engine, config)
}

/// Simultaneous match queries for one request id: exactly one proceeds,
/// the rest fail fast with the matching-in-progress conflict.
#[tokio::test(start_paused = true)]
async fn concurrent_queries_for_one_request_admit_exactly_one() {
    let inner = MemoryStore::new();
    inner.add_vehicle(4, 6).await;
    let request = inner
        .insert_request(RequestBuilder::new(1).build_new())
        .await
        .expect("insert");

    let store = Arc::new(SlowStore {
        inner,
        query_delay: Duration::from_secs(5),
    });
    let coordinator = coordinator_over(store, CoordinatorConfig::default());

    let (a, b, c) = tokio::join!(
        coordinator.find_matches(request.id),
        coordinator.find_matches(request.id),
        coordinator.find_matches(request.id),
    );

    let outcomes = [a, b, c];
    let admitted = outcomes.iter().filter(|outcome| outcome.is_ok()).count();
    let rejected = outcomes
        .iter()
        .filter(|outcome| matches!(outcome, Err(Error::MatchingInProgress(_))))
        .count();
    assert_eq!(admitted, 1);
    assert_eq!(rejected, 2);
}

/// Distinct request ids never contend on the lease.
#[tokio::test(start_paused = true)]
async fn distinct_requests_match_in_parallel() {
    let inner = MemoryStore::new();
    inner.add_vehicle(4, 6).await;
    let first = inner
        .insert_request(RequestBuilder::new(1).build_new())
        .await
        .expect("insert");
    let second = inner
        .insert_request(RequestBuilder::new(2).build_new())
        .await
        .expect("insert");

    let store = Arc::new(SlowStore {
        inner,
        query_delay: Duration::from_secs(5),
    });
    let coordinator = coordinator_over(store, CoordinatorConfig::default());

    let (a, b) = tokio::join!(
        coordinator.find_matches(first.id),
        coordinator.find_matches(second.id),
    );
    assert!(a.is_ok(), "{a:?}");
    assert!(b.is_ok(), "{b:?}");
}

/// A saturated concurrency gate queues callers instead of rejecting them:
/// with a single slot, both queries still complete.
#[tokio::test(start_paused = true)]
async fn saturated_gate_queues_fifo_instead_of_rejecting() {
    let inner = MemoryStore::new();
    inner.add_vehicle(4, 6).await;
    let first = inner
        .insert_request(RequestBuilder::new(1).build_new())
        .await
        .expect("insert");
    let second = inner
        .insert_request(RequestBuilder::new(2).build_new())
        .await
        .expect("insert");

    let store = Arc::new(SlowStore {
        inner,
        query_delay: Duration::from_secs(5),
    });
    let coordinator = coordinator_over(
        store,
        CoordinatorConfig {
            max_concurrent_matches: 1,
            ..CoordinatorConfig::default()
        },
    );

    let (a, b) = tokio::join!(
        coordinator.find_matches(first.id),
        coordinator.find_matches(second.id),
    );
    assert!(a.is_ok(), "{a:?}");
    assert!(b.is_ok(), "{b:?}");
}

/// A crashed holder's lease expires on its own; the request becomes
/// matchable again without manual cleanup.
#[tokio::test(start_paused = true)]
async fn lease_ttl_reclaims_a_crashed_match() {
    let store = Arc::new(MemoryStore::new());
    store.add_vehicle(4, 6).await;
    let request = store
        .insert_request(RequestBuilder::new(1).build_new())
        .await
        .expect("insert");

    let cache = Arc::new(MemoryCache::new());
    let config = CoordinatorConfig::default();
    let engine = MatchingEngine::new(MatchingConfig::default(), PricingConfig::default());
    let coordinator = Coordinator::new(
        store.clone() as Arc<dyn Store>,
        cache.clone() as Arc<dyn KvCache>,
        engine,
        config,
    );

    // A holder that never releases, as if it crashed mid-match.
    let crashed = RequestLease::new(cache as Arc<dyn KvCache>, config.lease_ttl);
    let _abandoned = crashed.acquire(request.id).await.expect("stuck holder");

    let blocked = coordinator.find_matches(request.id).await;
    assert!(matches!(blocked, Err(Error::MatchingInProgress(_))));

    tokio::time::advance(config.lease_ttl + Duration::from_secs(1)).await;
    coordinator
        .find_matches(request.id)
        .await
        .expect("lease expired, matching admitted again");
}
