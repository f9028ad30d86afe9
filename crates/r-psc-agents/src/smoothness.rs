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

use async_trait::async_trait;
use serde_json::json;

use crate::context::{pumps_within_flow, AssessmentContext};
use crate::llm::Narrator;
use crate::recommendation::{Priority, Recommendation};
use crate::Specialist;

/// Largest acceptable outflow change per tick (m³/h). Bigger jumps shock the
/// treatment plant's biology.
pub const MAX_STEP_M3H: f64 = 2_000.0;

/// Steps above this escalate the priority.
const HARD_STEP_M3H: f64 = 4_000.0;

/// Frequency used when sketching the intermediate stage of a ramp.
const STAGING_FREQ_HZ: f64 = 48.5;

/// Keeps outflow transitions gradual: when the tick's implied flow change
/// exceeds the step limit, proposes a plan spread over two ticks.
pub struct FlowSmoothnessAgent {
    narrator: Arc<Narrator>,
}

impl FlowSmoothnessAgent {
    pub const NAME: &'static str = "flow_smoothness";

    pub fn new(narrator: Arc<Narrator>) -> Self {
        Self { narrator }
    }
}

#[async_trait]
impl Specialist for FlowSmoothnessAgent {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn assess(&self, ctx: &AssessmentContext) -> anyhow::Result<Recommendation> {
        // The efficiency agent derives the same target from the same shared
        // context; recomputing it here keeps the agents independent.
        let proposed = ctx.target_flow_m3h();
        let previous = ctx.state.f2_m3h;
        let delta = proposed - previous;
        let needs_staging = delta.abs() > MAX_STEP_M3H;

        let staged = if needs_staging {
            let intermediate = previous + delta.clamp(-MAX_STEP_M3H, MAX_STEP_M3H);
            let stage_pumps = pumps_within_flow(
                &ctx.fleet,
                &ctx.constraints,
                ctx.state.l1_m,
                intermediate,
                STAGING_FREQ_HZ,
            );
            vec![
                json!({
                    "delay_ticks": 0,
                    "pumps": stage_pumps,
                    "flow": intermediate,
                }),
                json!({
                    "delay_ticks": 1,
                    "pumps": serde_json::Value::Null,
                    "flow": proposed,
                }),
            ]
        } else {
            Vec::new()
        };

        let priority = if delta.abs() > HARD_STEP_M3H {
            Priority::Medium
        } else {
            Priority::Low
        };

        let fallback = if needs_staging {
            format!(
                "Implied outflow step {:.0} m³/h exceeds {:.0}; stage the change over two ticks.",
                delta.abs(),
                MAX_STEP_M3H,
            )
        } else {
            format!(
                "Implied outflow step {:.0} m³/h is within the {:.0} m³/h limit.",
                delta.abs(),
                MAX_STEP_M3H,
            )
        };
        let prompt = format!(
            "Flow-smoothness check for a lift station feeding a treatment plant.\n\
             Previous outflow {:.0} m³/h, tick target {:.0} m³/h, step {:.0} m³/h, limit {:.0}.\n\
             Staging needed: {}. Describe the downstream impact in one or two sentences.",
            previous,
            proposed,
            delta,
            MAX_STEP_M3H,
            needs_staging,
        );
        let reasoning = self
            .narrator
            .narrate(
                "You are a treatment plant operator protecting a biological process.",
                &prompt,
                fallback,
            )
            .await;

        Ok(Recommendation {
            agent_name: Self::NAME.to_owned(),
            priority,
            confidence: 0.85,
            recommendation_type: "flow_smoothness".to_owned(),
            reasoning,
            data: json!({
                "flow_variability": delta.abs(),
                "max_step_m3h": MAX_STEP_M3H,
                "previous_flow_m3h": previous,
                "proposed_flow_m3h": proposed,
                "staged": staged,
            }),
            can_veto: false,
            command_set: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testkit::test_context;

    #[tokio::test]
    async fn small_step_needs_no_staging() {
        let agent = FlowSmoothnessAgent::new(Arc::new(Narrator::Template));
        let ctx = test_context(1.82, 1_708.0, 0.14);
        let rec = agent.assess(&ctx).await.unwrap();
        assert_eq!(rec.priority, Priority::Low);
        assert!(rec.data["staged"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn large_step_is_staged_over_two_ticks() {
        let agent = FlowSmoothnessAgent::new(Arc::new(Narrator::Template));
        let mut ctx = test_context(3.0, 2_500.0, 0.14);
        // Previous outflow far below the tick target.
        ctx.state.f2_m3h = 2_000.0;
        let rec = agent.assess(&ctx).await.unwrap();
        let staged = rec.data["staged"].as_array().unwrap();
        assert_eq!(staged.len(), 2);
        assert_eq!(staged[0]["delay_ticks"], 0);
        assert_eq!(staged[0]["flow"], 4_000.0);
        assert_eq!(staged[1]["flow"], 10_000.0);
        assert_eq!(rec.priority, Priority::Medium);
    }

    #[tokio::test]
    async fn moderate_step_stays_low_priority() {
        let agent = FlowSmoothnessAgent::new(Arc::new(Narrator::Template));
        let mut ctx = test_context(3.0, 1_000.0, 0.14);
        ctx.state.f2_m3h = 1_000.0;
        // Step = 3000: staged but still LOW.
        let rec = agent.assess(&ctx).await.unwrap();
        assert_eq!(rec.priority, Priority::Low);
        assert_eq!(rec.data["staged"].as_array().unwrap().len(), 2);
    }
}
