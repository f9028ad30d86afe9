//! ---
//! psc_section: "01-core-functionality"
//! psc_subsection: "module"
//! psc_type: "source"
//! psc_scope: "code"
//! psc_description: "Decision driver, validator and cost calculation."
//! psc_version: "v0.0.0-prealpha"
//! psc_owner: "tbd"
//! ---
use serde_json::json;

use r_psc_hydraulics::{ConstraintSet, SystemState};

use crate::decision::{ConstraintViolation, CostCalculation};
use crate::validator::ValidatedPlan;

/// One tick is a quarter hour.
const TICK_HOURS: f64 = 0.25;

/// Decision-level cost figures. The sign of the price is preserved: a
/// negative spot price makes the tick's cost negative (income).
pub fn cost_calculation(plan: &ValidatedPlan, price_eur_kwh: f64) -> CostCalculation {
    let total_power_kw = plan.total_power_kw();
    let energy_consumed_kwh = total_power_kw * TICK_HOURS;
    let cost_eur = energy_consumed_kwh * price_eur_kwh;
    let flow_pumped_m3 = plan.total_flow_m3h() * TICK_HOURS;
    let specific_energy_kwh_per_m3 = if flow_pumped_m3 > 0.0 {
        energy_consumed_kwh / flow_pumped_m3
    } else {
        0.0
    };
    CostCalculation {
        total_power_kw,
        energy_consumed_kwh,
        cost_eur,
        flow_pumped_m3,
        specific_energy_kwh_per_m3,
    }
}

/// Final re-check of every static rule against the validated plan. Empty
/// whenever the validator did its job; anything here is a defect signal.
pub fn check_violations(
    state: &SystemState,
    plan: &ValidatedPlan,
    constraints: &ConstraintSet,
) -> Vec<ConstraintViolation> {
    let mut violations = Vec::new();

    if state.l1_m < constraints.l1_min_m || state.l1_m > constraints.l1_max_m {
        violations.push(ConstraintViolation {
            kind: "L1_OUT_OF_RANGE".to_owned(),
            value: state.l1_m,
            limit: json!(format!(
                "{}-{}",
                constraints.l1_min_m, constraints.l1_max_m
            )),
        });
    }

    let total_flow = plan.total_flow_m3h();
    if total_flow > constraints.f2_max_m3h {
        violations.push(ConstraintViolation {
            kind: "F2_EXCEEDED".to_owned(),
            value: total_flow,
            limit: json!(constraints.f2_max_m3h),
        });
    }

    for validated in &plan.commands {
        if validated.command.start
            && !constraints.frequency_in_band(validated.command.frequency_hz, false)
        {
            violations.push(ConstraintViolation {
                kind: "FREQ_OUT_OF_BAND".to_owned(),
                value: validated.command.frequency_hz,
                limit: json!(format!(
                    "{}-{}",
                    constraints.freq_min_hz, constraints.freq_nominal_hz
                )),
            });
        }
    }

    if plan.running() < constraints.min_active_pumps {
        violations.push(ConstraintViolation {
            kind: "NO_PUMPS_RUNNING".to_owned(),
            value: plan.running() as f64,
            limit: json!(constraints.min_active_pumps),
        });
    }

    violations
}
