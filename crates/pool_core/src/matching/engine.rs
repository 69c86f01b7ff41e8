use std::cmp::Ordering;

use itertools::Itertools;

use crate::domain::{PassengerLeg, Request, WaypointKind};
use crate::geo;
use crate::pricing::{self, FareParams, PricingConfig};
use crate::routing;

use super::constraints;
use super::types::{MatchResult, TripDraft};
use super::MatchingConfig;

/// Finds ranked pooled-trip options for one target request.
///
/// Pure over its inputs: for identical requests, surge snapshot and hour
/// the ranked output is reproducible. Score ties keep enumeration order
/// (solo first, then pairs before triples, ascending candidate index
/// within each size).
#[derive(Debug, Clone)]
pub struct MatchingEngine {
    matching: MatchingConfig,
    pricing: PricingConfig,
}

impl MatchingEngine {
    pub fn new(matching: MatchingConfig, pricing: PricingConfig) -> Self {
        Self { matching, pricing }
    }

    pub fn config(&self) -> &MatchingConfig {
        &self.matching
    }

    pub fn pricing(&self) -> &PricingConfig {
        &self.pricing
    }

    /// Rank up to `max_results` trip options for the target request.
    ///
    /// The candidate set is expected to be pre-filtered by the store query
    /// (radius and recency window); it is re-filtered here against the
    /// target's pickup so the engine never trusts a wider window. The solo
    /// option is always present in the output.
    pub fn find_matches(
        &self,
        target: &Request,
        candidates: &[Request],
        surge: f64,
        hour: u32,
    ) -> Vec<MatchResult> {
        let mut options = Vec::new();
        options.extend(self.evaluate_group(&[target], surge, hour));

        let nearby: Vec<&Request> = candidates
            .iter()
            .filter(|candidate| candidate.id != target.id)
            .filter(|candidate| {
                geo::distance_km(candidate.pickup.point, target.pickup.point)
                    <= self.matching.search_radius_km
            })
            .collect();

        for size in 1..=self.matching.max_pool_candidates {
            for combo in (0..nearby.len()).combinations(size) {
                let mut group: Vec<&Request> = Vec::with_capacity(size + 1);
                group.push(target);
                group.extend(combo.into_iter().map(|index| nearby[index]));
                if !constraints::group_within_capacity(&group, &self.matching) {
                    continue;
                }
                options.extend(self.evaluate_group(&group, surge, hour));
            }
        }

        options.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        options.truncate(self.matching.max_results);
        options
    }

    /// Route, validate and price one candidate group (target first).
    /// Returns `None` when any member's detour exceeds their tolerance; a
    /// group is admitted whole or not at all.
    fn evaluate_group(&self, group: &[&Request], surge: f64, hour: u32) -> Option<MatchResult> {
        let pooled = group.len() > 1;
        let plan = routing::optimize(group)?;
        let trip_passengers = constraints::group_passengers(group);

        let mut legs = Vec::with_capacity(group.len());
        let mut sum_direct_km = 0.0;
        let mut detour_sum = 0.0;
        let mut max_detour = 0u32;

        for member in group {
            let pickup = plan.position_of(member.id, WaypointKind::Pickup)?;
            let dropoff = plan.position_of(member.id, WaypointKind::Dropoff)?;
            let onboard_km = plan.distance_between_stops(pickup, dropoff);
            let direct_km = geo::distance_km(member.pickup.point, member.dropoff.point);
            let direct_minutes = geo::travel_minutes(direct_km);
            let detour_minutes = if pooled {
                geo::travel_minutes(onboard_km).saturating_sub(direct_minutes)
            } else {
                0
            };

            if pooled
                && !constraints::detour_within_tolerance(
                    detour_minutes,
                    direct_minutes,
                    member.max_detour_minutes,
                    self.matching.detour_slack_ratio,
                )
            {
                return None;
            }

            sum_direct_km += direct_km;
            detour_sum += f64::from(detour_minutes);
            max_detour = max_detour.max(detour_minutes);

            let fare = self.pricing.fare(FareParams {
                distance_km: onboard_km,
                passengers_in_booking: member.passengers,
                trip_passengers,
                surge,
                hour,
            });
            legs.push(PassengerLeg {
                request_id: member.id,
                passengers: member.passengers,
                pickup_index: pickup,
                dropoff_index: dropoff,
                fare: fare.total,
                detour_minutes,
            });
        }

        let score = if pooled {
            self.score(
                group.len(),
                sum_direct_km,
                plan.distance_km,
                detour_sum / group.len() as f64,
            )
        } else {
            self.matching.solo_score
        };

        let savings = if pooled {
            let target = group[0];
            let solo = self.pricing.fare(FareParams {
                distance_km: geo::distance_km(target.pickup.point, target.dropoff.point),
                passengers_in_booking: target.passengers,
                trip_passengers: target.passengers,
                surge,
                hour,
            });
            pricing::savings(solo.total, legs[0].fare)
        } else {
            0.0
        };

        Some(MatchResult {
            trip: TripDraft {
                distance_km: plan.distance_km,
                duration_minutes: plan.duration_minutes,
                base_price: self.pricing.route_base_price(plan.distance_km),
                surge,
                waypoints: plan.waypoints,
                legs,
            },
            score,
            savings,
            max_detour_minutes: max_detour,
        })
    }

    /// Fixed 40/40/20 weighting: group size, route efficiency (shared route
    /// length versus the sum of direct trips) and low average detour.
    fn score(
        &self,
        group_size: usize,
        sum_direct_km: f64,
        route_km: f64,
        avg_detour_minutes: f64,
    ) -> f64 {
        let size_term = group_size as f64 / 4.0 * 40.0;
        let efficiency = if route_km > 0.0 {
            sum_direct_km / route_km
        } else {
            1.0
        };
        let detour_term = (20.0 - avg_detour_minutes).max(0.0);
        (size_term + efficiency * 40.0 + detour_term).min(100.0)
    }
}
