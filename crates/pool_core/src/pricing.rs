//! Stateless fare computation: demand surge, time-of-day multipliers,
//! pooling discounts and per-leg fares.
//!
//! The pooling discount is keyed on the *total* occupancy of the shared
//! trip, while the passenger count of the individual booking scales the
//! revenue. A 2-passenger booking inside a 4-passenger pooled trip gets the
//! 4-passenger discount tier; this is what keeps per-leg billing fair and
//! must not be collapsed into a single passenger count.

use serde::{Deserialize, Serialize};

/// Tunable pricing knobs, owned by the composition root.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PricingConfig {
    /// Flag-fall in currency units.
    pub base_fare: f64,
    /// Per-kilometre rate in currency units.
    pub per_km_rate: f64,
    /// No fare total goes below this, discounts included.
    pub minimum_fare: f64,
    /// Upper clamp for the demand surge factor.
    pub max_surge: f64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            base_fare: 2.50,
            per_km_rate: 1.50,
            minimum_fare: 5.00,
            max_surge: 3.0,
        }
    }
}

/// Inputs to a single fare computation.
#[derive(Debug, Clone, Copy)]
pub struct FareParams {
    /// Distance this booking actually travels, in kilometres.
    pub distance_km: f64,
    /// Passengers in this booking; scales revenue, not the discount tier.
    pub passengers_in_booking: u8,
    /// Total passengers sharing the trip; selects the discount tier.
    pub trip_passengers: u8,
    /// Demand surge snapshot, already clamped.
    pub surge: f64,
    /// Local hour of day, 0..24.
    pub hour: u32,
}

/// A computed fare with the multipliers that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FareBreakdown {
    pub per_passenger: f64,
    pub total: f64,
    pub surge: f64,
    pub time_multiplier: f64,
    pub pooling_discount: f64,
}

/// Round a currency amount to two decimal places.
fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

impl PricingConfig {
    /// Demand-based surge factor in `[1.0, max_surge]`.
    ///
    /// `surge = 1 + min(demand_ratio, 2)^2`, clamped; zero available
    /// vehicles returns the maximum immediately.
    pub fn surge_factor(&self, active_requests: u64, available_vehicles: u64) -> f64 {
        if available_vehicles == 0 {
            return self.max_surge;
        }
        let demand_ratio = active_requests as f64 / available_vehicles as f64;
        let capped = demand_ratio.min(2.0);
        (1.0 + capped * capped).clamp(1.0, self.max_surge)
    }

    /// Authoritative fare for one booking inside a (possibly pooled) trip.
    ///
    /// `per_passenger = (base + km * rate) * surge * time * (1 - discount)`,
    /// totalled over the booking's passengers, floored at the minimum fare
    /// and rounded to cents.
    pub fn fare(&self, params: FareParams) -> FareBreakdown {
        let time_multiplier = time_multiplier(params.hour);
        let pooling_discount = pooling_discount(params.trip_passengers);
        let per_passenger = (self.base_fare + params.distance_km * self.per_km_rate)
            * params.surge
            * time_multiplier
            * (1.0 - pooling_discount);
        let total = (per_passenger * f64::from(params.passengers_in_booking)).max(self.minimum_fare);
        let total = round_cents(total);
        FareBreakdown {
            per_passenger: round_cents(total / f64::from(params.passengers_in_booking)),
            total,
            surge: params.surge,
            time_multiplier,
            pooling_discount,
        }
    }

    /// Un-multiplied route price: flag-fall plus distance. Recorded on the
    /// trip for auditing; per-leg fares stay authoritative.
    pub fn route_base_price(&self, distance_km: f64) -> f64 {
        round_cents(self.base_fare + distance_km * self.per_km_rate)
    }
}

/// Time-of-day multiplier: rush hours 1.5, late night 1.3, otherwise 1.0.
pub fn time_multiplier(hour: u32) -> f64 {
    match hour {
        7..=8 | 17..=18 => 1.5,
        23 | 0..=4 => 1.3,
        _ => 1.0,
    }
}

/// Discount tier by total trip occupancy: 0% / 20% / 30% / 40%.
pub fn pooling_discount(trip_passengers: u8) -> f64 {
    match trip_passengers {
        0 | 1 => 0.0,
        2 => 0.20,
        3 => 0.30,
        _ => 0.40,
    }
}

/// Informational proportional split of a total fare by distance share.
/// Not authoritative; billing uses the per-leg [`PricingConfig::fare`].
pub fn split_fare(total_fare: f64, per_passenger_distances: &[f64]) -> Vec<f64> {
    let sum: f64 = per_passenger_distances.iter().sum();
    if sum <= 0.0 {
        let even = total_fare / per_passenger_distances.len().max(1) as f64;
        return per_passenger_distances.iter().map(|_| round_cents(even)).collect();
    }
    per_passenger_distances
        .iter()
        .map(|distance| round_cents(total_fare * distance / sum))
        .collect()
}

/// What a rider saves versus travelling solo, rounded to cents.
pub fn savings(solo_fare: f64, pooled_fare: f64) -> f64 {
    round_cents(solo_fare - pooled_fare)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PricingConfig {
        PricingConfig::default()
    }

    #[test]
    fn surge_is_max_when_no_vehicles() {
        assert_eq!(config().surge_factor(10, 0), 3.0);
    }

    #[test]
    fn surge_clamps_high_demand_ratio() {
        // demand ratio 2 -> 1 + 2^2 = 5, clamped to the 3.0 ceiling.
        assert_eq!(config().surge_factor(200, 100), 3.0);
    }

    #[test]
    fn low_demand_yields_near_floor_surge() {
        let surge = config().surge_factor(10, 100);
        assert!((surge - 1.01).abs() < 1e-9, "got {surge}");
    }

    #[test]
    fn time_multiplier_covers_rush_night_and_default() {
        assert_eq!(time_multiplier(7), 1.5);
        assert_eq!(time_multiplier(8), 1.5);
        assert_eq!(time_multiplier(9), 1.0);
        assert_eq!(time_multiplier(17), 1.5);
        assert_eq!(time_multiplier(19), 1.0);
        assert_eq!(time_multiplier(23), 1.3);
        assert_eq!(time_multiplier(0), 1.3);
        assert_eq!(time_multiplier(4), 1.3);
        assert_eq!(time_multiplier(5), 1.0);
        assert_eq!(time_multiplier(12), 1.0);
    }

    #[test]
    fn pooling_discount_tiers() {
        assert_eq!(pooling_discount(1), 0.0);
        assert_eq!(pooling_discount(2), 0.20);
        assert_eq!(pooling_discount(3), 0.30);
        assert_eq!(pooling_discount(4), 0.40);
        assert_eq!(pooling_discount(6), 0.40);
    }

    #[test]
    fn pooled_booking_gets_total_occupancy_discount() {
        // Two passengers booking inside a four-passenger trip must be
        // priced at the 4-passenger tier, not the 2-passenger tier.
        let fare = config().fare(FareParams {
            distance_km: 10.0,
            passengers_in_booking: 2,
            trip_passengers: 4,
            surge: 1.0,
            hour: 12,
        });
        assert_eq!(fare.pooling_discount, 0.40);
        let expected: f64 = (2.50 + 10.0 * 1.50) * 0.60 * 2.0;
        assert!((fare.total - (expected * 100.0).round() / 100.0).abs() < 1e-9);
    }

    #[test]
    fn fare_is_monotonic_in_distance_and_surge() {
        let base = FareParams {
            distance_km: 5.0,
            passengers_in_booking: 1,
            trip_passengers: 1,
            surge: 1.0,
            hour: 12,
        };
        let short = config().fare(base).total;
        let long = config()
            .fare(FareParams {
                distance_km: 9.0,
                ..base
            })
            .total;
        assert!(long >= short);

        let surged = config()
            .fare(FareParams {
                surge: 2.5,
                ..base
            })
            .total;
        assert!(surged >= short);
    }

    #[test]
    fn fare_never_drops_below_minimum() {
        let fare = config().fare(FareParams {
            distance_km: 0.1,
            passengers_in_booking: 1,
            trip_passengers: 4,
            surge: 1.0,
            hour: 12,
        });
        assert!(fare.total >= config().minimum_fare);
    }

    #[test]
    fn split_fare_is_proportional_to_distance() {
        let shares = split_fare(30.0, &[1.0, 2.0]);
        assert_eq!(shares, vec![10.0, 20.0]);
    }

    #[test]
    fn savings_is_rounded_difference() {
        assert_eq!(savings(20.0, 14.555), 5.45);
        assert_eq!(savings(10.0, 10.0), 0.0);
    }
}
