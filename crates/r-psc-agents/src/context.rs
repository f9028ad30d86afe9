//! ---
//! psc_section: "05-agent-reasoning"
//! psc_subsection: "module"
//! psc_type: "source"
//! psc_scope: "code"
//! psc_description: "Specialist agents and coordinator synthesis."
//! psc_version: "v0.0.0-prealpha"
//! psc_owner: "tbd"
//! ---
use std::sync::Arc;

use r_psc_forecast::ForecastSnapshot;
use r_psc_hydraulics::{ConstraintSet, PumpFleet, RuntimeTracker, SystemState, TunnelGeometry};

/// Frozen per-tick context shared by all six specialists. The agents are
/// independent: none of them may observe another's output, only this.
#[derive(Debug, Clone)]
pub struct AssessmentContext {
    pub state: SystemState,
    pub forecast: ForecastSnapshot,
    /// Spot prices for the next 24 h (96 steps), truncated near dataset end.
    pub prices_24h: Vec<f64>,
    pub fleet: Arc<PumpFleet>,
    pub constraints: ConstraintSet,
    pub geometry: Arc<TunnelGeometry>,
    /// Snapshot of the runtime tracker; the live tracker is driver-owned.
    pub tracker: RuntimeTracker,
}

impl AssessmentContext {
    /// The flow the station should move this tick: the projected inflow for
    /// the next 15 minutes, floored by what the smallest pump delivers at
    /// minimum frequency (one pump always runs).
    pub fn target_flow_m3h(&self) -> f64 {
        let projected_15min = self
            .forecast
            .inflow_at(0)
            .max(self.state.f1_m3_15min);
        let min_pump_flow = self
            .fleet
            .specs()
            .map(|spec| spec.rated_flow_m3h * self.constraints.freq_min_hz / spec.optimal_frequency_hz)
            .fold(f64::INFINITY, f64::min);
        (projected_15min * 4.0).max(min_pump_flow)
    }

}

/// Greedy pump subset staying at or under `target_m3h` at a uniform
/// frequency, best efficiency first; always at least one pump. Used for
/// staged transitions, where overshooting the step limit defeats the point.
pub fn pumps_within_flow(
    fleet: &PumpFleet,
    constraints: &ConstraintSet,
    l1_m: f64,
    target_m3h: f64,
    frequency_hz: f64,
) -> Vec<String> {
    let mut chosen = Vec::new();
    let mut flow = 0.0;
    for pump_id in fleet.ranked_by_efficiency(l1_m, frequency_hz, None) {
        if let Ok(perf) = fleet.performance(&pump_id, frequency_hz, l1_m) {
            let next = flow + perf.flow_m3h;
            if next > target_m3h.min(constraints.f2_max_m3h) && !chosen.is_empty() {
                continue;
            }
            flow = next;
            chosen.push(pump_id);
        }
    }
    chosen
}

/// Greedy pump subset meeting `target_m3h` at a uniform frequency, best
/// efficiency first. Stops at the fleet's flow cap.
pub fn pumps_for_flow(
    fleet: &PumpFleet,
    constraints: &ConstraintSet,
    l1_m: f64,
    target_m3h: f64,
    frequency_hz: f64,
) -> Vec<String> {
    let mut chosen = Vec::new();
    let mut flow = 0.0;
    for pump_id in fleet.ranked_by_efficiency(l1_m, frequency_hz, None) {
        if flow >= target_m3h || flow >= constraints.f2_max_m3h {
            break;
        }
        if let Ok(perf) = fleet.performance(&pump_id, frequency_hz, l1_m) {
            if flow + perf.flow_m3h > constraints.f2_max_m3h {
                continue;
            }
            flow += perf.flow_m3h;
            chosen.push(pump_id);
        }
    }
    chosen
}

#[cfg(test)]
pub(crate) mod testkit {
    use super::*;
    use chrono::{TimeZone, Utc};
    use r_psc_common::config::Scenario;
    use r_psc_forecast::Trend;

    pub(crate) fn test_context(l1_m: f64, f1_m3_15min: f64, price: f64) -> AssessmentContext {
        let fleet = Arc::new(PumpFleet::default_station());
        let geometry = Arc::new(TunnelGeometry::default());
        let tracker = RuntimeTracker::new(fleet.pump_ids().map(str::to_owned));
        AssessmentContext {
            state: SystemState {
                timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
                l1_m,
                v_m3: geometry.level_to_volume(l1_m),
                f1_m3_15min,
                f2_m3h: f1_m3_15min * 4.0,
                electricity_price_eur_kwh: price,
                price_scenario: Scenario::Normal,
                history_index: 500,
            },
            forecast: ForecastSnapshot {
                next_6h: vec![f1_m3_15min; 24],
                next_24h: vec![f1_m3_15min; 96],
                peak_value: f1_m3_15min,
                peak_offset_steps: 0,
                trend: Trend::Stable,
                storm_detected: false,
                confidence: 0.85,
                degraded: false,
            },
            prices_24h: vec![price; 96],
            fleet,
            constraints: ConstraintSet::default(),
            geometry,
            tracker,
        }
    }
}
