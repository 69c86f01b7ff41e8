//! Route optimizer: minimum-distance ordering of pickup/dropoff waypoints.
//!
//! Strategy by group size:
//!
//! - **1 request**: trivial pickup -> dropoff route.
//! - **2-4 requests**: branch-and-bound over all precedence-valid waypoint
//!   permutations, pruning once the partial distance exceeds the best
//!   complete route. Group formation caps at 4 passengers, so this is the
//!   hot path and the search is small (at most 8 waypoints).
//! - **more than 4 requests** (defensive fallback): nearest-neighbor greedy.
//!
//! Every ordering considered honours the pickup-before-dropoff precedence
//! per request. Ties are broken by the first ordering reaching the minimum,
//! which is deterministic for a fixed input order.

use crate::domain::{Request, Waypoint, WaypointKind};
use crate::geo::{self, GeoPoint};

/// Largest group solved exactly; beyond this the greedy fallback is used.
const EXACT_SEARCH_MAX_REQUESTS: usize = 4;

/// An optimized visiting order with its total distance and ETA.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutePlan {
    pub waypoints: Vec<Waypoint>,
    pub distance_km: f64,
    pub duration_minutes: u32,
}

impl RoutePlan {
    /// Index of the given request's pickup or dropoff stop.
    pub fn position_of(&self, request_id: crate::domain::RequestId, kind: WaypointKind) -> Option<usize> {
        self.waypoints
            .iter()
            .position(|waypoint| waypoint.request_id == request_id && waypoint.kind == kind)
    }

    /// Distance travelled along the route between two stop indices.
    pub fn distance_between_stops(&self, from: usize, to: usize) -> f64 {
        self.waypoints[from..=to]
            .windows(2)
            .map(|pair| geo::distance_km(pair[0].point, pair[1].point))
            .sum()
    }
}

/// Stops are indexed `2 * request + 0` for pickups, `+ 1` for dropoffs.
fn stop_kind(stop: usize) -> WaypointKind {
    if stop % 2 == 0 {
        WaypointKind::Pickup
    } else {
        WaypointKind::Dropoff
    }
}

fn stop_point(group: &[&Request], stop: usize) -> GeoPoint {
    let request = group[stop / 2];
    match stop_kind(stop) {
        WaypointKind::Pickup => request.pickup.point,
        WaypointKind::Dropoff => request.dropoff.point,
    }
}

/// Find the minimum-distance valid visiting order for a group of requests.
/// Returns `None` for an empty group.
pub fn optimize(group: &[&Request]) -> Option<RoutePlan> {
    let order = match group.len() {
        0 => return None,
        1 => vec![0, 1],
        n if n <= EXACT_SEARCH_MAX_REQUESTS => branch_and_bound(group),
        _ => nearest_neighbor(group),
    };
    Some(plan_from_order(group, &order))
}

fn plan_from_order(group: &[&Request], order: &[usize]) -> RoutePlan {
    let waypoints: Vec<Waypoint> = order
        .iter()
        .map(|&stop| Waypoint {
            kind: stop_kind(stop),
            request_id: group[stop / 2].id,
            point: stop_point(group, stop),
        })
        .collect();
    let points: Vec<GeoPoint> = waypoints.iter().map(|waypoint| waypoint.point).collect();
    let distance_km = geo::route_length_km(&points);
    RoutePlan {
        waypoints,
        distance_km,
        duration_minutes: geo::travel_minutes(distance_km),
    }
}

/// Pairwise distances between all stops, so the search never recomputes a
/// haversine.
fn distance_matrix(group: &[&Request]) -> Vec<Vec<f64>> {
    let stops = group.len() * 2;
    let points: Vec<GeoPoint> = (0..stops).map(|stop| stop_point(group, stop)).collect();
    (0..stops)
        .map(|a| (0..stops).map(|b| geo::distance_km(points[a], points[b])).collect())
        .collect()
}

struct Search<'a> {
    matrix: &'a [Vec<f64>],
    requests: usize,
    order: Vec<usize>,
    picked: Vec<bool>,
    dropped: Vec<bool>,
    best_order: Vec<usize>,
    best_length: f64,
}

impl Search<'_> {
    fn run(&mut self, length: f64) {
        if self.order.len() == self.requests * 2 {
            // Strict improvement keeps the first ordering at the minimum.
            if length < self.best_length {
                self.best_length = length;
                self.best_order = self.order.clone();
            }
            return;
        }
        if length >= self.best_length {
            return;
        }
        for request in 0..self.requests {
            if !self.picked[request] {
                self.picked[request] = true;
                self.step(request * 2, length);
                self.picked[request] = false;
            }
        }
        for request in 0..self.requests {
            if self.picked[request] && !self.dropped[request] {
                self.dropped[request] = true;
                self.step(request * 2 + 1, length);
                self.dropped[request] = false;
            }
        }
    }

    fn step(&mut self, stop: usize, length: f64) {
        let added = match self.order.last() {
            Some(&last) => self.matrix[last][stop],
            None => 0.0,
        };
        self.order.push(stop);
        self.run(length + added);
        self.order.pop();
    }
}

fn branch_and_bound(group: &[&Request]) -> Vec<usize> {
    let matrix = distance_matrix(group);
    let mut search = Search {
        matrix: &matrix,
        requests: group.len(),
        order: Vec::with_capacity(group.len() * 2),
        picked: vec![false; group.len()],
        dropped: vec![false; group.len()],
        best_order: Vec::new(),
        best_length: f64::INFINITY,
    };
    search.run(0.0);
    search.best_order
}

/// Greedy fallback: starting from the first pickup, repeatedly visit the
/// nearest reachable stop (an unpicked request's pickup or an onboard
/// request's dropoff).
fn nearest_neighbor(group: &[&Request]) -> Vec<usize> {
    let matrix = distance_matrix(group);
    let requests = group.len();
    let mut picked = vec![false; requests];
    let mut dropped = vec![false; requests];
    let mut order = Vec::with_capacity(requests * 2);

    picked[0] = true;
    order.push(0);
    let mut current = 0usize;

    while order.len() < requests * 2 {
        let mut next: Option<(usize, f64)> = None;
        for request in 0..requests {
            let stop = if !picked[request] {
                request * 2
            } else if !dropped[request] {
                request * 2 + 1
            } else {
                continue;
            };
            let distance = matrix[current][stop];
            if next.map_or(true, |(_, best)| distance < best) {
                next = Some((stop, distance));
            }
        }
        let (stop, _) = next.expect("unvisited stop remains while route is incomplete");
        if stop % 2 == 0 {
            picked[stop / 2] = true;
        } else {
            dropped[stop / 2] = true;
        }
        order.push(stop);
        current = stop;
    }
    order
}
