//! ---
//! psc_section: "02-hydraulic-models"
//! psc_subsection: "module"
//! psc_type: "source"
//! psc_scope: "code"
//! psc_description: "Pump physics, constraints and plant state."
//! psc_version: "v0.0.0-prealpha"
//! psc_owner: "tbd"
//! ---
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use r_psc_common::config::Scenario;

/// Sanity ceiling for the absolute spot price (EUR/kWh). Prices beyond this
/// indicate a corrupted reading, not a market event.
const PRICE_SANITY_EUR_KWH: f64 = 4_000.0;

/// Immutable per-tick snapshot of the station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemState {
    pub timestamp: DateTime<Utc>,
    /// Tunnel water level (m).
    pub l1_m: f64,
    /// Tunnel volume (m³).
    pub v_m3: f64,
    /// Current inflow (m³ per 15 minutes).
    pub f1_m3_15min: f64,
    /// Current total outflow reading (m³/h); sanity only.
    pub f2_m3h: f64,
    /// Spot price, signed; may be negative.
    pub electricity_price_eur_kwh: f64,
    pub price_scenario: Scenario,
    /// Row offset into the historical arrays used by the forecaster.
    pub history_index: usize,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("non-finite field '{0}' in system state")]
    NonFinite(&'static str),
    #[error("tunnel level {0} m is negative")]
    NegativeLevel(String),
    #[error("tunnel volume {0} m³ is negative")]
    NegativeVolume(String),
    #[error("electricity price {0} EUR/kWh outside sanity range")]
    PriceOutOfRange(String),
}

impl SystemState {
    /// Input validation at the `decide` boundary. This is the only error
    /// class that propagates out of the kernel.
    pub fn validate(&self) -> Result<(), StateError> {
        for (name, value) in [
            ("l1_m", self.l1_m),
            ("v_m3", self.v_m3),
            ("f1_m3_15min", self.f1_m3_15min),
            ("f2_m3h", self.f2_m3h),
            ("electricity_price_eur_kwh", self.electricity_price_eur_kwh),
        ] {
            if !value.is_finite() {
                return Err(StateError::NonFinite(name));
            }
        }
        if self.l1_m < 0.0 {
            return Err(StateError::NegativeLevel(format!("{:.3}", self.l1_m)));
        }
        if self.v_m3 < 0.0 {
            return Err(StateError::NegativeVolume(format!("{:.1}", self.v_m3)));
        }
        if self.electricity_price_eur_kwh.abs() > PRICE_SANITY_EUR_KWH {
            return Err(StateError::PriceOutOfRange(format!(
                "{:.3}",
                self.electricity_price_eur_kwh
            )));
        }
        Ok(())
    }

    /// Current inflow expressed as an hourly rate (m³/h).
    pub fn inflow_m3h(&self) -> f64 {
        self.f1_m3_15min * 4.0
    }
}

/// A control command for one pump. Performance figures are attached by the
/// validator when the command is finalised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PumpCommand {
    pub pump_id: String,
    pub start: bool,
    pub frequency_hz: f64,
}

impl PumpCommand {
    pub fn run(pump_id: impl Into<String>, frequency_hz: f64) -> Self {
        Self {
            pump_id: pump_id.into(),
            start: true,
            frequency_hz,
        }
    }

    pub fn stop(pump_id: impl Into<String>) -> Self {
        Self {
            pump_id: pump_id.into(),
            start: false,
            frequency_hz: 0.0,
        }
    }
}
