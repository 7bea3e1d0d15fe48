//! Multiplier Growth
//!
//! Continuous compounding with speed tiers, integrated one frame at a time.
//! The rate is a step function of the current multiplier (not of elapsed
//! time), re-evaluated every frame from the previous frame's value.

/// Speed tiers as `(upper bound, rate)`. A multiplier below the bound grows
/// at that rate; anything at or past the last bound uses [`MAX_TIER_SPEED`].
pub const SPEED_TIERS: [(f64, f64); 6] = [
    (6.0, 0.06),
    (10.0, 0.10),
    (18.0, 0.18),
    (28.0, 0.28),
    (45.0, 0.45),
    (70.0, 0.70),
];

/// Growth rate once the multiplier reaches 70x.
pub const MAX_TIER_SPEED: f64 = 1.20;

/// Multiplier every round starts from.
pub const START_MULTIPLIER: f64 = 1.00;

/// Proportional growth rate (per second) at multiplier `m`.
#[inline]
pub fn tier_speed(m: f64) -> f64 {
    SPEED_TIERS
        .iter()
        .find(|(bound, _)| m < *bound)
        .map(|(_, rate)| *rate)
        .unwrap_or(MAX_TIER_SPEED)
}

/// Advance the multiplier by one frame of `dt` seconds.
///
/// Negative or non-finite `dt` is treated as zero so the multiplier can
/// never move backwards.
#[inline]
pub fn step(current: f64, dt: f64) -> f64 {
    let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };
    current + current * tier_speed(current) * dt
}

/// Upper bound on how far one frame can carry the multiplier past a crash
/// point, given the largest frame duration in use.
///
/// The last pre-crash value is below `crash_point`, so a single step adds
/// at most `crash_point * MAX_TIER_SPEED * max_dt`.
pub fn overshoot_bound(crash_point: f64, max_dt: f64) -> f64 {
    crash_point * MAX_TIER_SPEED * max_dt
}

/// Format a multiplier for display, e.g. `2.37x`.
pub fn format_multiplier(m: f64) -> String {
    format!("{:.2}x", m)
}
