//! ---
//! psc_section: "02-hydraulic-models"
//! psc_subsection: "module"
//! psc_type: "source"
//! psc_scope: "code"
//! psc_description: "Pump physics, constraints and plant state."
//! psc_version: "v0.0.0-prealpha"
//! psc_owner: "tbd"
//! ---
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Static, process-wide operational bounds for the station.
///
/// The values come from the station's operating permit and are immutable
/// after start-up; the whole kernel shares one instance.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConstraintSet {
    /// Minimum tunnel level (m).
    pub l1_min_m: f64,
    /// Alarm threshold (m).
    pub l1_alarm_m: f64,
    /// Hard maximum tunnel level (m).
    pub l1_max_m: f64,
    /// Daily-emptying target level (m).
    pub l1_empty_target_m: f64,
    /// Maximum total pumped flow (m³/h).
    pub f2_max_m3h: f64,
    /// Minimum operating frequency when a pump runs (Hz).
    pub freq_min_hz: f64,
    /// Nominal frequency (Hz).
    pub freq_nominal_hz: f64,
    /// A started pump must keep running for at least this long.
    pub min_runtime: Duration,
    /// At least this many pumps run at all times.
    pub min_active_pumps: usize,
    /// Inflow below this is considered dry weather (m³/15min).
    pub dry_weather_inflow_m3_15min: f64,
    /// The tunnel must touch the empty target within each rolling window
    /// of this length during dry weather.
    pub emptying_window: Duration,
}

impl Default for ConstraintSet {
    fn default() -> Self {
        Self {
            l1_min_m: 0.0,
            l1_alarm_m: 7.2,
            l1_max_m: 8.0,
            l1_empty_target_m: 0.5,
            f2_max_m3h: 16_000.0,
            freq_min_hz: 47.8,
            freq_nominal_hz: 50.0,
            min_runtime: Duration::from_secs(2 * 3600),
            min_active_pumps: 1,
            dry_weather_inflow_m3_15min: 1_000.0,
            emptying_window: Duration::from_secs(24 * 3600),
        }
    }
}

/// Classification of a tunnel level reading against the bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LevelStatus {
    Ok,
    Alarm,
    OutOfRange,
}

impl ConstraintSet {
    /// Dry-weather classification used by the emptying rule.
    pub fn is_dry_weather(&self, f1_m3_15min: f64) -> bool {
        f1_m3_15min < self.dry_weather_inflow_m3_15min
    }

    /// Whether `frequency_hz` is admissible for a running pump. The ramp
    /// exception (below band during transitions) never applies to a
    /// committed command.
    pub fn frequency_in_band(&self, frequency_hz: f64, allow_ramp: bool) -> bool {
        if !frequency_hz.is_finite() {
            return false;
        }
        if allow_ramp {
            (0.0..=self.freq_nominal_hz).contains(&frequency_hz)
        } else {
            (self.freq_min_hz..=self.freq_nominal_hz).contains(&frequency_hz)
        }
    }

    pub fn level_status(&self, l1_m: f64) -> LevelStatus {
        if !(self.l1_min_m..=self.l1_max_m).contains(&l1_m) {
            LevelStatus::OutOfRange
        } else if l1_m > self.l1_alarm_m {
            LevelStatus::Alarm
        } else {
            LevelStatus::Ok
        }
    }

    pub fn total_flow_in_bound(&self, f2_m3h: f64) -> bool {
        f2_m3h <= self.f2_max_m3h
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frequency_band() {
        let c = ConstraintSet::default();
        assert!(c.frequency_in_band(47.8, false));
        assert!(c.frequency_in_band(50.0, false));
        assert!(!c.frequency_in_band(47.0, false));
        assert!(c.frequency_in_band(47.0, true));
        assert!(!c.frequency_in_band(f64::NAN, true));
        assert!(!c.frequency_in_band(51.0, true));
    }

    #[test]
    fn level_classification() {
        let c = ConstraintSet::default();
        assert_eq!(c.level_status(1.8), LevelStatus::Ok);
        assert_eq!(c.level_status(7.5), LevelStatus::Alarm);
        assert_eq!(c.level_status(8.5), LevelStatus::OutOfRange);
        assert_eq!(c.level_status(-0.1), LevelStatus::OutOfRange);
    }

    #[test]
    fn dry_weather_threshold() {
        let c = ConstraintSet::default();
        assert!(c.is_dry_weather(800.0));
        assert!(!c.is_dry_weather(1_200.0));
    }
}
