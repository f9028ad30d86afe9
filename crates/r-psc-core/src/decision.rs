//! ---
//! psc_section: "01-core-functionality"
//! psc_subsection: "module"
//! psc_type: "source"
//! psc_scope: "code"
//! psc_description: "Decision driver, validator and cost calculation."
//! psc_version: "v0.0.0-prealpha"
//! psc_owner: "tbd"
//! ---
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use serde_json::Value;

use r_psc_agents::{Priority, Recommendation};
use r_psc_hydraulics::SystemState;

use crate::validator::ValidatedCommand;

/// Downstream consumers parse `Decision` bit-for-bit; every field name and
/// shape here is part of the external contract and must not drift.
#[derive(Debug, Clone, Serialize)]
pub struct Decision {
    #[serde(serialize_with = "serialize_minute")]
    pub timestamp: DateTime<Utc>,
    pub pump_commands: Vec<PumpCommandRecord>,
    pub coordinator_reasoning: String,
    pub priority_applied: Priority,
    pub conflicts_resolved: Vec<String>,
    pub confidence: f64,
    pub cost_calculation: CostCalculation,
    pub constraint_violations: Vec<ConstraintViolation>,
    pub agent_messages: Vec<AgentMessage>,
    /// Copy of the input state the decision was computed from. Available to
    /// callers, absent from the wire shape.
    #[serde(skip_serializing)]
    pub system_state: SystemState,
}

impl Decision {
    pub fn running_pumps(&self) -> usize {
        self.pump_commands.iter().filter(|c| c.start).count()
    }

    pub fn aggregate_frequency_hz(&self) -> f64 {
        self.pump_commands
            .iter()
            .filter(|c| c.start)
            .map(|c| c.frequency_hz)
            .sum()
    }

    pub fn total_flow_m3h(&self) -> f64 {
        self.pump_commands
            .iter()
            .filter(|c| c.start)
            .map(|c| c.flow_m3h)
            .sum()
    }
}

/// One pump's final command with the performance the model attributes to it.
#[derive(Debug, Clone, Serialize)]
pub struct PumpCommandRecord {
    pub pump_id: String,
    pub start: bool,
    #[serde(rename = "frequency")]
    pub frequency_hz: f64,
    pub flow_m3h: f64,
    pub power_kw: f64,
    pub efficiency: f64,
}

impl From<&ValidatedCommand> for PumpCommandRecord {
    fn from(validated: &ValidatedCommand) -> Self {
        Self {
            pump_id: validated.command.pump_id.clone(),
            start: validated.command.start,
            frequency_hz: validated.command.frequency_hz,
            flow_m3h: validated.performance.flow_m3h,
            power_kw: validated.performance.power_kw,
            efficiency: validated.performance.efficiency,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostCalculation {
    pub total_power_kw: f64,
    pub energy_consumed_kwh: f64,
    pub cost_eur: f64,
    pub flow_pumped_m3: f64,
    pub specific_energy_kwh_per_m3: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConstraintViolation {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: f64,
    /// String for ranges, number for scalar limits.
    pub limit: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentMessage {
    pub agent_name: String,
    pub priority: Priority,
    pub confidence: f64,
    pub recommendation_type: String,
    pub reasoning: String,
    pub key_data: Value,
}

impl From<&Recommendation> for AgentMessage {
    fn from(rec: &Recommendation) -> Self {
        Self {
            agent_name: rec.agent_name.clone(),
            priority: rec.priority,
            confidence: rec.confidence,
            recommendation_type: rec.recommendation_type.clone(),
            reasoning: rec.reasoning.clone(),
            key_data: rec.data.clone(),
        }
    }
}

/// ISO-8601 at minute resolution, e.g. `2024-03-01T12:15`.
fn serialize_minute<S: Serializer>(
    timestamp: &DateTime<Utc>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&timestamp.format("%Y-%m-%dT%H:%M").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use r_psc_common::config::Scenario;
    use serde_json::json;

    fn sample_decision() -> Decision {
        Decision {
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 12, 15, 0).unwrap(),
            pump_commands: vec![PumpCommandRecord {
                pump_id: "1.2".to_owned(),
                start: true,
                frequency_hz: 47.8,
                flow_m3h: 3_183.5,
                power_kw: 333.0,
                efficiency: 0.8,
            }],
            coordinator_reasoning: "baseline".to_owned(),
            priority_applied: Priority::Medium,
            conflicts_resolved: vec![],
            confidence: 0.85,
            cost_calculation: CostCalculation {
                total_power_kw: 333.0,
                energy_consumed_kwh: 83.25,
                cost_eur: 11.66,
                flow_pumped_m3: 795.9,
                specific_energy_kwh_per_m3: 0.105,
            },
            constraint_violations: vec![ConstraintViolation {
                kind: "F2_EXCEEDED".to_owned(),
                value: 17_000.0,
                limit: json!(16_000.0),
            }],
            agent_messages: vec![],
            system_state: SystemState {
                timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 12, 15, 0).unwrap(),
                l1_m: 1.82,
                v_m3: 5_405.0,
                f1_m3_15min: 700.0,
                f2_m3h: 3_000.0,
                electricity_price_eur_kwh: 0.14,
                price_scenario: Scenario::Normal,
                history_index: 0,
            },
        }
    }

    #[test]
    fn wire_shape_is_stable() {
        let decision = sample_decision();
        let value = serde_json::to_value(&decision).unwrap();
        assert_eq!(value["timestamp"], "2024-03-01T12:15");
        assert_eq!(value["pump_commands"][0]["frequency"], 47.8);
        assert!(value["pump_commands"][0].get("frequency_hz").is_none());
        assert_eq!(value["priority_applied"], "MEDIUM");
        assert_eq!(value["constraint_violations"][0]["type"], "F2_EXCEEDED");
        // The state summary never leaks onto the wire.
        assert!(value.get("system_state").is_none());

        // Field order is part of the contract; Value maps reorder, so check
        // the rendered string.
        let rendered = serde_json::to_string(&decision).unwrap();
        let expected_order = [
            "\"timestamp\"",
            "\"pump_commands\"",
            "\"coordinator_reasoning\"",
            "\"priority_applied\"",
            "\"conflicts_resolved\"",
            "\"confidence\"",
            "\"cost_calculation\"",
            "\"constraint_violations\"",
            "\"agent_messages\"",
        ];
        let mut cursor = 0;
        for key in expected_order {
            let found = rendered[cursor..]
                .find(key)
                .unwrap_or_else(|| panic!("missing key {}", key));
            cursor += found;
        }
    }

    #[test]
    fn aggregates() {
        let decision = sample_decision();
        assert_eq!(decision.running_pumps(), 1);
        assert_eq!(decision.aggregate_frequency_hz(), 47.8);
        assert!((decision.total_flow_m3h() - 3_183.5).abs() < 1e-9);
    }
}
