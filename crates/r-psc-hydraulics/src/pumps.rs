//! ---
//! psc_section: "02-hydraulic-models"
//! psc_subsection: "module"
//! psc_type: "source"
//! psc_scope: "code"
//! psc_description: "Pump physics, constraints and plant state."
//! psc_version: "v0.0.0-prealpha"
//! psc_owner: "tbd"
//! ---
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::errors::{HydraulicsError, Result};

/// Fixed intake elevation of the treatment plant (m).
pub const WWTP_INTAKE_M: f64 = 30.0;

/// Frequency band for a running pump (Hz).
pub const FREQ_MIN_HZ: f64 = 47.8;
pub const FREQ_NOMINAL_HZ: f64 = 50.0;

/// Tunnel level range the model is defined over (m).
const L1_MODEL_MIN_M: f64 = 0.0;
const L1_MODEL_MAX_M: f64 = 8.0;

/// Fallback efficiency when no curve data exists for a pump.
const FALLBACK_EFFICIENCY: f64 = 0.80;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PumpClass {
    Large,
    Small,
}

/// Static specification of one pump at 50 Hz.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PumpSpec {
    pub pump_id: String,
    pub class: PumpClass,
    pub rated_power_kw: f64,
    pub rated_flow_m3h: f64,
    pub rated_head_m: f64,
    pub optimal_frequency_hz: f64,
    #[serde(default)]
    pub curve: Option<EfficiencyCurve>,
}

/// Per-pump efficiency curve evaluated at the operating point.
///
/// Peak efficiency at rated speed and head; linear penalty on speed
/// deviation, quadratic on head deviation, clamped to the plausible band
/// observed in the station's records.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EfficiencyCurve {
    pub peak_efficiency: f64,
    pub speed_falloff: f64,
    pub head_falloff: f64,
}

impl EfficiencyCurve {
    pub fn for_class(class: PumpClass) -> Self {
        let peak = match class {
            PumpClass::Large => 0.848,
            PumpClass::Small => 0.816,
        };
        Self {
            peak_efficiency: peak,
            speed_falloff: 0.5,
            head_falloff: 0.08,
        }
    }

    pub fn efficiency_at(&self, speed_ratio: f64, head_ratio: f64) -> f64 {
        let speed_penalty = self.speed_falloff * (speed_ratio - 1.0).abs();
        let head_penalty = self.head_falloff * (head_ratio - 1.0).powi(2);
        (self.peak_efficiency * (1.0 - speed_penalty - head_penalty)).clamp(0.70, 0.90)
    }
}

/// Result of evaluating one pump at an operating point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PumpPerformance {
    pub flow_m3h: f64,
    pub power_kw: f64,
    pub efficiency: f64,
    /// Input was outside the model box and evaluated at the boundary.
    pub clamped: bool,
    /// Efficiency came from the fixed fallback, not curve data.
    pub approximate: bool,
}

impl PumpPerformance {
    pub const STOPPED: PumpPerformance = PumpPerformance {
        flow_m3h: 0.0,
        power_kw: 0.0,
        efficiency: 0.0,
        clamped: false,
        approximate: false,
    };
}

/// The station's pump fleet. Read-only after initialisation.
#[derive(Debug, Clone)]
pub struct PumpFleet {
    specs: IndexMap<String, PumpSpec>,
}

impl PumpFleet {
    pub fn new(specs: Vec<PumpSpec>) -> Self {
        Self {
            specs: specs
                .into_iter()
                .map(|spec| (spec.pump_id.clone(), spec))
                .collect(),
        }
    }

    /// The eight calibrated pumps of the station. Rated powers at 50 Hz were
    /// reverse-engineered from operational records via P_rated = P / (f/50)³.
    pub fn default_station() -> Self {
        let calibration: [(&str, f64, PumpClass); 8] = [
            ("1.1", 192.7, PumpClass::Small),
            ("1.2", 381.1, PumpClass::Large),
            ("1.3", 381.1, PumpClass::Large),
            ("1.4", 398.0, PumpClass::Large),
            ("2.1", 192.3, PumpClass::Small),
            ("2.2", 393.9, PumpClass::Large),
            ("2.3", 394.6, PumpClass::Large),
            ("2.4", 368.4, PumpClass::Large),
        ];
        let specs = calibration
            .into_iter()
            .map(|(pump_id, rated_power_kw, class)| PumpSpec {
                pump_id: pump_id.to_owned(),
                class,
                rated_power_kw,
                rated_flow_m3h: match class {
                    PumpClass::Large => 3_330.0,
                    PumpClass::Small => 1_670.0,
                },
                rated_head_m: 31.5,
                optimal_frequency_hz: FREQ_NOMINAL_HZ,
                curve: Some(EfficiencyCurve::for_class(class)),
            })
            .collect();
        Self::new(specs)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn pump_ids(&self) -> impl Iterator<Item = &str> {
        self.specs.keys().map(String::as_str)
    }

    pub fn specs(&self) -> impl Iterator<Item = &PumpSpec> {
        self.specs.values()
    }

    pub fn spec(&self, pump_id: &str) -> Result<&PumpSpec> {
        self.specs
            .get(pump_id)
            .ok_or_else(|| HydraulicsError::UnknownPump(pump_id.to_owned()))
    }

    /// Pumping head at tunnel level `l1_m`.
    pub fn head(&self, l1_m: f64) -> f64 {
        WWTP_INTAKE_M - l1_m
    }

    /// Shaft power implied by lifting `flow_m3h` of water over `head_m`,
    /// before efficiency losses. Used to cross-check curve output.
    pub fn hydraulic_power_kw(flow_m3h: f64, head_m: f64) -> f64 {
        // ρ g Q H with Q converted from m³/h to kg/s, expressed in kW.
        1000.0 * 9.81 * (flow_m3h / 3600.0) * head_m / 1000.0
    }

    /// Evaluate one pump at `(frequency_hz, l1_m)` using the affinity laws:
    /// Q ∝ f/50 and P ∝ (f/50)³, with efficiency read from the pump's curve
    /// at the operating point.
    ///
    /// A zero frequency yields a stopped performance. Inputs outside the
    /// defined level box are evaluated at the boundary with `clamped` set;
    /// a non-zero frequency outside the band is an error, never clamped.
    pub fn performance(
        &self,
        pump_id: &str,
        frequency_hz: f64,
        l1_m: f64,
    ) -> Result<PumpPerformance> {
        let spec = self.spec(pump_id)?;
        if frequency_hz == 0.0 {
            return Ok(PumpPerformance::STOPPED);
        }
        if !frequency_hz.is_finite()
            || !(FREQ_MIN_HZ..=FREQ_NOMINAL_HZ).contains(&frequency_hz)
        {
            return Err(HydraulicsError::FrequencyOutOfBand(frequency_hz));
        }

        let mut clamped = false;
        let l1 = if (L1_MODEL_MIN_M..=L1_MODEL_MAX_M).contains(&l1_m) {
            l1_m
        } else {
            clamped = true;
            l1_m.clamp(L1_MODEL_MIN_M, L1_MODEL_MAX_M)
        };

        let speed_ratio = frequency_hz / spec.optimal_frequency_hz;
        let flow_m3h = spec.rated_flow_m3h * speed_ratio;
        let power_kw = spec.rated_power_kw * speed_ratio.powi(3);

        let (efficiency, approximate) = match &spec.curve {
            Some(curve) => {
                let head_ratio = self.head(l1) / spec.rated_head_m;
                (curve.efficiency_at(speed_ratio, head_ratio), false)
            }
            None => (FALLBACK_EFFICIENCY, true),
        };

        Ok(PumpPerformance {
            flow_m3h,
            power_kw,
            efficiency,
            clamped,
            approximate,
        })
    }

    /// Pump ids ordered by descending efficiency at `(l1_m, frequency_hz)`,
    /// restricted to `candidates` when given.
    pub fn ranked_by_efficiency(
        &self,
        l1_m: f64,
        frequency_hz: f64,
        candidates: Option<&[&str]>,
    ) -> Vec<String> {
        let mut ranked: Vec<(String, f64)> = self
            .specs
            .values()
            .filter(|spec| {
                candidates
                    .map(|ids| ids.contains(&spec.pump_id.as_str()))
                    .unwrap_or(true)
            })
            .filter_map(|spec| {
                self.performance(&spec.pump_id, frequency_hz, l1_m)
                    .ok()
                    .map(|perf| (spec.pump_id.clone(), perf.efficiency))
            })
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked.into_iter().map(|(id, _)| id).collect()
    }

    /// The single pump with the best efficiency at the operating point.
    pub fn most_efficient(&self, l1_m: f64, frequency_hz: f64) -> Option<String> {
        self.ranked_by_efficiency(l1_m, frequency_hz, None)
            .into_iter()
            .next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rated_point_matches_spec_sheet() {
        let fleet = PumpFleet::default_station();
        // At 50 Hz the affinity laws reproduce the rated values exactly; the
        // property bound is ±2 %.
        let perf = fleet.performance("1.2", 50.0, 0.0).unwrap();
        let spec = fleet.spec("1.2").unwrap();
        assert!((perf.flow_m3h - spec.rated_flow_m3h).abs() / spec.rated_flow_m3h < 0.02);
        assert!((perf.power_kw - spec.rated_power_kw).abs() / spec.rated_power_kw < 0.02);
        assert!(perf.efficiency > 0.0 && perf.efficiency <= 0.90);
        assert!(!perf.clamped);
        assert!(!perf.approximate);
    }

    #[test]
    fn zero_frequency_is_stopped() {
        let fleet = PumpFleet::default_station();
        let perf = fleet.performance("2.2", 0.0, 3.0).unwrap();
        assert_eq!(perf, PumpPerformance::STOPPED);
    }

    #[test]
    fn affinity_scaling() {
        let fleet = PumpFleet::default_station();
        let full = fleet.performance("2.3", 50.0, 2.0).unwrap();
        let low = fleet.performance("2.3", 47.8, 2.0).unwrap();
        let ratio = 47.8 / 50.0;
        assert!((low.flow_m3h - full.flow_m3h * ratio).abs() < 1e-9);
        assert!((low.power_kw - full.power_kw * ratio.powi(3)).abs() < 1e-9);
    }

    #[test]
    fn out_of_band_frequency_is_rejected() {
        let fleet = PumpFleet::default_station();
        assert!(matches!(
            fleet.performance("1.1", 47.0, 2.0),
            Err(HydraulicsError::FrequencyOutOfBand(_))
        ));
        assert!(matches!(
            fleet.performance("1.1", 50.5, 2.0),
            Err(HydraulicsError::FrequencyOutOfBand(_))
        ));
        assert!(matches!(
            fleet.performance("1.1", f64::NAN, 2.0),
            Err(HydraulicsError::FrequencyOutOfBand(_))
        ));
    }

    #[test]
    fn unknown_pump_is_rejected() {
        let fleet = PumpFleet::default_station();
        assert!(matches!(
            fleet.performance("9.9", 50.0, 2.0),
            Err(HydraulicsError::UnknownPump(_))
        ));
    }

    #[test]
    fn level_outside_box_clamps_and_flags() {
        let fleet = PumpFleet::default_station();
        let at_boundary = fleet.performance("1.4", 49.0, 8.0).unwrap();
        let beyond = fleet.performance("1.4", 49.0, 9.5).unwrap();
        assert!(beyond.clamped);
        assert!(!at_boundary.clamped);
        assert_eq!(beyond.flow_m3h, at_boundary.flow_m3h);
        assert_eq!(beyond.efficiency, at_boundary.efficiency);
    }

    #[test]
    fn missing_curve_falls_back_to_fixed_efficiency() {
        let fleet = PumpFleet::new(vec![PumpSpec {
            pump_id: "x.1".to_owned(),
            class: PumpClass::Large,
            rated_power_kw: 380.0,
            rated_flow_m3h: 3_330.0,
            rated_head_m: 31.5,
            optimal_frequency_hz: 50.0,
            curve: None,
        }]);
        let perf = fleet.performance("x.1", 49.0, 2.0).unwrap();
        assert!(perf.approximate);
        assert_eq!(perf.efficiency, 0.80);
    }

    #[test]
    fn curve_efficiency_is_physically_plausible() {
        // Shaft power must exceed the hydraulic power implied by the
        // operating point; efficiency stays within the clamp band.
        let fleet = PumpFleet::default_station();
        for id in ["1.1", "1.2", "2.4"] {
            let perf = fleet.performance(id, 50.0, 2.0).unwrap();
            let hydraulic = PumpFleet::hydraulic_power_kw(perf.flow_m3h, fleet.head(2.0));
            assert!(hydraulic < perf.power_kw, "pump {} violates power balance", id);
            assert!((0.70..=0.90).contains(&perf.efficiency));
        }
    }

    #[test]
    fn ranking_prefers_large_pumps() {
        let fleet = PumpFleet::default_station();
        let best = fleet.most_efficient(1.8, 47.8).unwrap();
        assert_eq!(fleet.spec(&best).unwrap().class, PumpClass::Large);
    }
}
