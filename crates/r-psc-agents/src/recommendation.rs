//! ---
//! psc_section: "05-agent-reasoning"
//! psc_subsection: "module"
//! psc_type: "source"
//! psc_scope: "code"
//! psc_description: "Specialist agents and coordinator synthesis."
//! psc_version: "v0.0.0-prealpha"
//! psc_owner: "tbd"
//! ---
use serde::{Deserialize, Serialize};
use serde_json::Value;

use r_psc_hydraulics::PumpCommand;

/// Recommendation priority. Ordered: `Low < Medium < High < Critical`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Priority::Low => "LOW",
            Priority::Medium => "MEDIUM",
            Priority::High => "HIGH",
            Priority::Critical => "CRITICAL",
        };
        f.write_str(label)
    }
}

/// One specialist's output for one tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub agent_name: String,
    pub priority: Priority,
    pub confidence: f64,
    pub recommendation_type: String,
    /// Narrative only; downstream logic never parses this.
    pub reasoning: String,
    /// Structured, agent-specific payload. All machine-consumed fields live
    /// here.
    pub data: Value,
    pub can_veto: bool,
    /// Concrete corrective command set backing a veto or a baseline
    /// proposal. Internal to the kernel; the JSON surface carries `data`.
    #[serde(skip)]
    pub command_set: Option<Vec<PumpCommand>>,
}

impl Recommendation {
    /// Neutral replacement used when an agent misses its deadline or errors.
    pub fn timeout_stub(agent_name: &str) -> Self {
        Self {
            agent_name: agent_name.to_owned(),
            priority: Priority::Low,
            confidence: 0.0,
            recommendation_type: "timeout".to_owned(),
            reasoning: "timeout".to_owned(),
            data: Value::Null,
            can_veto: false,
            command_set: None,
        }
    }

    /// A vetoing recommendation at CRITICAL forces the coordinator to adopt
    /// its command set verbatim.
    pub fn is_critical_veto(&self) -> bool {
        self.can_veto && self.priority == Priority::Critical
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_ordering() {
        assert!(Priority::Critical > Priority::High);
        assert!(Priority::High > Priority::Medium);
        assert!(Priority::Medium > Priority::Low);
    }

    #[test]
    fn priority_wire_format() {
        assert_eq!(serde_json::to_string(&Priority::Critical).unwrap(), "\"CRITICAL\"");
        let parsed: Priority = serde_json::from_str("\"HIGH\"").unwrap();
        assert_eq!(parsed, Priority::High);
    }

    #[test]
    fn stub_is_neutral() {
        let stub = Recommendation::timeout_stub("energy_cost");
        assert_eq!(stub.priority, Priority::Low);
        assert_eq!(stub.confidence, 0.0);
        assert_eq!(stub.reasoning, "timeout");
        assert!(!stub.is_critical_veto());
    }
}
