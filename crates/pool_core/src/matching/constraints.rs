//! Group admission checks: capacity and detour tolerance.

use crate::domain::Request;

use super::MatchingConfig;

/// Combined passenger count of a candidate group.
pub fn group_passengers(group: &[&Request]) -> u8 {
    group.iter().map(|request| request.passengers).sum()
}

/// Combined luggage capacity units of a candidate group.
pub fn group_luggage_units(group: &[&Request]) -> u8 {
    group.iter().map(|request| request.luggage_units()).sum()
}

/// Whether a group fits a shared vehicle: passengers and luggage both
/// within the configured caps.
pub fn group_within_capacity(group: &[&Request], config: &MatchingConfig) -> bool {
    group_passengers(group) <= config.max_group_passengers
        && group_luggage_units(group) <= config.max_luggage_units
}

/// Whether one member's detour is tolerable.
///
/// The bound is `max(direct_minutes * slack_ratio, member tolerance)`: the
/// larger of the two wins, so a member with a very short direct trip still
/// gets their full configured tolerance.
pub fn detour_within_tolerance(
    detour_minutes: u32,
    direct_minutes: u32,
    max_detour_minutes: u32,
    slack_ratio: f64,
) -> bool {
    let bound = (f64::from(direct_minutes) * slack_ratio).max(f64::from(max_detour_minutes));
    f64::from(detour_minutes) <= bound
}
