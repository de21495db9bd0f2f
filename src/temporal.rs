//! Temporal helpers: attestation age and half-life decay.
//!
//! Attestations lose weight exponentially with age:
//! `decay = 0.5 ^ (age_days / half_life_days)`.
//! A timestamp at or after the query time has age zero, so decay never
//! exceeds 1.0.

use crate::entity::Timestamp;

/// Seconds in one day.
pub const SECS_PER_DAY: f64 = 86_400.0;

/// Age of an event in fractional days at `now`.
///
/// Events timestamped in the future are treated as age 0, never negative.
pub fn age_days(created_at: Timestamp, now: Timestamp) -> f64 {
    if now <= created_at {
        return 0.0;
    }
    (now - created_at) as f64 / SECS_PER_DAY
}

/// Exponential half-life decay factor in `(0.0, 1.0]`.
///
/// A non-positive half-life disables decay.
pub fn half_life_decay(age_days: f64, half_life_days: f64) -> f64 {
    if half_life_days <= 0.0 || age_days <= 0.0 {
        return 1.0;
    }
    0.5_f64.powf(age_days / half_life_days)
}

/// Convert whole days to seconds.
pub fn days(n: u64) -> Timestamp {
    n * SECS_PER_DAY as u64
}
