//! ---
//! psc_section: "01-core-functionality"
//! psc_subsection: "module"
//! psc_type: "source"
//! psc_scope: "code"
//! psc_description: "Shared primitives and utilities for the decision kernel."
//! psc_version: "v0.0.0-prealpha"
//! psc_owner: "tbd"
//! ---
use chrono::{DateTime, Duration as ChronoDuration, Utc};

/// One control tick.
pub const TICK_MINUTES: i64 = 15;

/// Ticks per hour at the 15-minute cadence.
pub const TICKS_PER_HOUR: usize = 4;

/// Ticks per rolling day.
pub const TICKS_PER_DAY: usize = 96;

/// Fraction of an hour covered by one tick.
pub const TICK_HOURS: f64 = 0.25;

/// Convert a number of ticks into hours.
pub fn ticks_to_hours(ticks: usize) -> f64 {
    ticks as f64 * TICK_HOURS
}

/// Wall-clock instant of the tick `offset` steps after `start`.
pub fn tick_at(start: DateTime<Utc>, offset: usize) -> DateTime<Utc> {
    start + ChronoDuration::minutes(TICK_MINUTES * offset as i64)
}

/// Elapsed whole hours between two instants, as a float.
pub fn hours_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> f64 {
    (later - earlier).num_seconds() as f64 / 3600.0
}
