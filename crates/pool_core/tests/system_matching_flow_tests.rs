mod support;

use pool_core::domain::{LuggageSize, RequestStatus};
use pool_core::error::Error;
use pool_core::test_helpers::RequestBuilder;
use support::world::TestWorld;

/// Two 2-passenger requests with pickups ~0.2 km apart and the same
/// dropoff pool into one 4-passenger trip with positive savings.
#[tokio::test]
async fn nearby_requests_pool_into_a_shared_trip() {
    let world = TestWorld::new();
    world.store.add_vehicle(4, 6).await;

    let target = world
        .submit(
            RequestBuilder::new(1)
                .passengers(2)
                .luggage(vec![LuggageSize::Small, LuggageSize::Medium])
                .pickup(52.5200, 13.4050)
                .dropoff(52.5600, 13.4700),
        )
        .await;
    world
        .submit(
            RequestBuilder::new(2)
                .passengers(2)
                .luggage(vec![LuggageSize::Small])
                .pickup(52.5218, 13.4050)
                .dropoff(52.5600, 13.4700),
        )
        .await;

    let options = world
        .coordinator
        .find_matches(target.id)
        .await
        .expect("match query");

    let pooled = options
        .iter()
        .find(|option| option.trip.legs.len() == 2)
        .expect("pooled option");
    assert_eq!(pooled.trip.total_passengers(), 4);
    assert!(pooled.savings > 0.0, "savings {}", pooled.savings);

    let solo = options
        .iter()
        .find(|option| option.trip.legs.len() == 1)
        .expect("solo option always present");
    assert_eq!(solo.savings, 0.0);
    assert_eq!(solo.max_detour_minutes, 0);
    assert_eq!(solo.score, 50.0);
}

/// Two 3-passenger requests exceed vehicle capacity together; each rider
/// only ever sees their solo option.
#[tokio::test]
async fn capacity_blocked_requests_stay_solo() {
    let world = TestWorld::new();
    world.store.add_vehicle(4, 6).await;

    let first = world
        .submit(RequestBuilder::new(1).passengers(3))
        .await;
    let second = world
        .submit(RequestBuilder::new(2).passengers(3))
        .await;

    for request in [&first, &second] {
        let options = world
            .coordinator
            .find_matches(request.id)
            .await
            .expect("match query");
        assert_eq!(options.len(), 1);
        assert_eq!(options[0].trip.legs.len(), 1);
        assert_eq!(options[0].trip.legs[0].request_id, request.id);
    }
}

#[tokio::test]
async fn matching_an_unknown_request_is_not_found() {
    let world = TestWorld::new();
    let missing = pool_core::domain::RequestId(42);
    let err = world
        .coordinator
        .find_matches(missing)
        .await
        .expect_err("unknown id");
    assert!(matches!(err, Error::RequestNotFound(id) if id == missing));
}

/// A request that already moved past PENDING cannot be rematched.
#[tokio::test]
async fn matching_a_confirmed_request_is_a_conflict() {
    let world = TestWorld::new();
    world.store.add_vehicle(4, 6).await;

    let target = world.submit(RequestBuilder::new(1).passengers(2)).await;
    let options = world
        .coordinator
        .find_matches(target.id)
        .await
        .expect("match query");
    world
        .coordinator
        .confirm_booking(target.id, &options[0])
        .await
        .expect("booking");

    let err = world
        .coordinator
        .find_matches(target.id)
        .await
        .expect_err("rematching a confirmed request");
    assert!(err.is_conflict());
    assert!(matches!(
        err,
        Error::UnexpectedRequestStatus {
            actual: RequestStatus::Confirmed,
            ..
        }
    ));
}

/// Ranked output is reproducible for an unchanged world.
#[tokio::test]
async fn repeated_queries_rank_identically() {
    let world = TestWorld::new();
    world.store.add_vehicle(4, 6).await;

    let target = world.submit(RequestBuilder::new(1)).await;
    for id in 2..=5 {
        world
            .submit(RequestBuilder::new(id).pickup(52.5200 + 0.002 * id as f64, 13.4050))
            .await;
    }

    let first = world
        .coordinator
        .find_matches(target.id)
        .await
        .expect("first query");
    let second = world
        .coordinator
        .find_matches(target.id)
        .await
        .expect("second query");

    assert!(first.len() <= 5);
    assert_eq!(
        first.iter().map(|option| option.score).collect::<Vec<_>>(),
        second.iter().map(|option| option.score).collect::<Vec<_>>()
    );
    for pair in first.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
}
