//! Matching engine: spatial filtering, candidate-group enumeration,
//! constraint checking, route and price evaluation, scoring and ranking.

pub mod constraints;
pub mod engine;
pub mod types;

pub use engine::MatchingEngine;
pub use types::{MatchResult, TripDraft};

/// Tunable matching knobs, owned by the composition root.
#[derive(Debug, Clone, Copy)]
pub struct MatchingConfig {
    /// Candidates farther than this from the target's pickup are ignored.
    pub search_radius_km: f64,
    /// Combined passengers allowed in one pooled group.
    pub max_group_passengers: u8,
    /// Combined luggage capacity units allowed in one pooled group.
    pub max_luggage_units: u8,
    /// Pooling candidates added to the target per group (groups of up to
    /// `1 + max_pool_candidates` requests).
    pub max_pool_candidates: usize,
    /// Ranked options returned per query.
    pub max_results: usize,
    /// Fixed baseline score assigned to the solo option.
    pub solo_score: f64,
    /// Detour slack as a fraction of the member's direct travel time; the
    /// per-request tolerance wins when it is larger.
    pub detour_slack_ratio: f64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            search_radius_km: 5.0,
            max_group_passengers: 4,
            max_luggage_units: 6,
            max_pool_candidates: 3,
            max_results: 5,
            solo_score: 50.0,
            detour_slack_ratio: 0.20,
        }
    }
}
