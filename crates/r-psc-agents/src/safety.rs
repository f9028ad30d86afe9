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
use serde::Serialize;
use serde_json::json;

use r_psc_hydraulics::PumpCommand;

use crate::context::{pumps_for_flow, AssessmentContext};
use crate::llm::Narrator;
use crate::recommendation::{Priority, Recommendation};
use crate::Specialist;

/// Ticks projected ahead.
const PROJECTION_STEPS: usize = 4;

/// Inflow sensitivity applied to the forecast during projection.
const RISING_INFLOW_FACTOR: f64 = 1.15;

/// Watch threshold: a trajectory crossing this level deserves attention.
const WATCH_LEVEL_M: f64 = 6.0;

/// Extra outflow margin demanded when reversing a dangerous trend (m³/h).
const RISK_DRAWDOWN_M3H: f64 = 1_500.0;
const CRITICAL_DRAWDOWN_M3H: f64 = 3_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SafetyStatus {
    Safe,
    Watch,
    Risk,
    Critical,
}

impl SafetyStatus {
    fn priority(self) -> Priority {
        match self {
            SafetyStatus::Safe => Priority::Low,
            SafetyStatus::Watch => Priority::Medium,
            SafetyStatus::Risk => Priority::High,
            SafetyStatus::Critical => Priority::Critical,
        }
    }

    const fn as_str(self) -> &'static str {
        match self {
            SafetyStatus::Safe => "SAFE",
            SafetyStatus::Watch => "WATCH",
            SafetyStatus::Risk => "RISK",
            SafetyStatus::Critical => "CRITICAL",
        }
    }
}

/// Projects the tunnel level over the next hour and vetoes the tick when the
/// trajectory approaches the hard limits. The only agent besides compliance
/// that can override cost optimisation.
pub struct WaterLevelSafetyAgent {
    narrator: Arc<Narrator>,
}

impl WaterLevelSafetyAgent {
    pub const NAME: &'static str = "water_level_safety";

    pub fn new(narrator: Arc<Narrator>) -> Self {
        Self { narrator }
    }

    /// Mass balance under the current outflow with a rising-inflow margin.
    fn project_levels(ctx: &AssessmentContext) -> Vec<f64> {
        let outflow_m3h = ctx.state.f2_m3h;
        let mut volume = ctx.state.v_m3;
        let mut levels = Vec::with_capacity(PROJECTION_STEPS);
        for step in 0..PROJECTION_STEPS {
            let inflow_15min = ctx.forecast.inflow_at(step) * RISING_INFLOW_FACTOR;
            volume = (volume + inflow_15min - outflow_m3h * 0.25).max(0.0);
            levels.push(ctx.geometry.volume_to_level(volume));
        }
        levels
    }

    fn classify(ctx: &AssessmentContext, trajectory: &[f64]) -> SafetyStatus {
        let alarm = ctx.constraints.l1_alarm_m;
        let max = ctx.constraints.l1_max_m;
        let crest = trajectory.iter().copied().fold(ctx.state.l1_m, f64::max);
        if ctx.state.l1_m >= alarm || crest >= max {
            SafetyStatus::Critical
        } else if crest >= alarm {
            SafetyStatus::Risk
        } else if crest >= WATCH_LEVEL_M {
            SafetyStatus::Watch
        } else {
            SafetyStatus::Safe
        }
    }

    /// Pump set sufficient to reverse the trend: beat the worst projected
    /// inflow plus a drawdown margin, at nominal frequency.
    fn corrective_commands(ctx: &AssessmentContext, status: SafetyStatus) -> Vec<PumpCommand> {
        let margin = match status {
            SafetyStatus::Critical => CRITICAL_DRAWDOWN_M3H,
            _ => RISK_DRAWDOWN_M3H,
        };
        let worst_inflow_m3h = (0..PROJECTION_STEPS)
            .map(|step| ctx.forecast.inflow_at(step))
            .fold(ctx.state.f1_m3_15min, f64::max)
            * 4.0
            * RISING_INFLOW_FACTOR;
        let required = (worst_inflow_m3h + margin).min(ctx.constraints.f2_max_m3h);
        let chosen = pumps_for_flow(
            &ctx.fleet,
            &ctx.constraints,
            ctx.state.l1_m,
            required,
            ctx.constraints.freq_nominal_hz,
        );
        let mut commands: Vec<PumpCommand> = chosen
            .into_iter()
            .map(|id| PumpCommand::run(id, ctx.constraints.freq_nominal_hz))
            .collect();
        for id in ctx.fleet.pump_ids() {
            if !commands.iter().any(|c| c.pump_id == id) {
                commands.push(PumpCommand::stop(id));
            }
        }
        commands
    }
}

#[async_trait]
impl Specialist for WaterLevelSafetyAgent {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn assess(&self, ctx: &AssessmentContext) -> anyhow::Result<Recommendation> {
        let trajectory = Self::project_levels(ctx);
        let status = Self::classify(ctx, &trajectory);
        let can_veto = matches!(status, SafetyStatus::Risk | SafetyStatus::Critical);
        let command_set = can_veto.then(|| Self::corrective_commands(ctx, status));

        let crest = trajectory.iter().copied().fold(ctx.state.l1_m, f64::max);
        let fallback = format!(
            "L1 {:.2} m, projected crest {:.2} m over the next hour: {}.",
            ctx.state.l1_m,
            crest,
            status.as_str(),
        );
        let prompt = format!(
            "Safety assessment for a wastewater tunnel.\n\
             Level now {:.2} m; alarm {:.1} m; hard maximum {:.1} m.\n\
             Projected levels for the next four ticks: {:?}.\n\
             Status: {}. Explain the risk posture in two sentences.",
            ctx.state.l1_m,
            ctx.constraints.l1_alarm_m,
            ctx.constraints.l1_max_m,
            trajectory,
            status.as_str(),
        );
        let reasoning = self
            .narrator
            .narrate(
                "You are a safety officer who never takes unnecessary risks.",
                &prompt,
                fallback,
            )
            .await;

        let required_pumps = command_set
            .as_ref()
            .map(|cmds| cmds.iter().filter(|c| c.start).count())
            .unwrap_or(0);

        Ok(Recommendation {
            agent_name: Self::NAME.to_owned(),
            priority: status.priority(),
            confidence: 0.95,
            recommendation_type: "safety_assessment".to_owned(),
            reasoning,
            data: json!({
                "current_level_m": ctx.state.l1_m,
                "status": status.as_str(),
                "projected_levels_m": trajectory,
                "projected_crest_m": crest,
                "required_pumps": required_pumps,
            }),
            can_veto,
            command_set,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testkit::test_context;

    #[tokio::test]
    async fn low_level_is_safe() {
        let agent = WaterLevelSafetyAgent::new(Arc::new(Narrator::Template));
        let ctx = test_context(1.82, 700.0, 0.14);
        let rec = agent.assess(&ctx).await.unwrap();
        assert_eq!(rec.priority, Priority::Low);
        assert_eq!(rec.data["status"], "SAFE");
        assert!(!rec.can_veto);
        assert!(rec.command_set.is_none());
    }

    #[tokio::test]
    async fn alarm_level_is_critical_with_veto() {
        let agent = WaterLevelSafetyAgent::new(Arc::new(Narrator::Template));
        let mut ctx = test_context(7.5, 1_800.0, 0.5);
        ctx.state.f2_m3h = 4_000.0;
        let rec = agent.assess(&ctx).await.unwrap();
        assert_eq!(rec.priority, Priority::Critical);
        assert_eq!(rec.data["status"], "CRITICAL");
        assert!(rec.is_critical_veto());
        let commands = rec.command_set.unwrap();
        let running = commands.iter().filter(|c| c.start).count();
        assert!(running >= 3, "expected at least 3 pumps, got {}", running);
        assert_eq!(commands.len(), ctx.fleet.len());
    }

    #[tokio::test]
    async fn rising_trajectory_reaches_watch() {
        let agent = WaterLevelSafetyAgent::new(Arc::new(Narrator::Template));
        // 5.9 m with strong inflow and no outflow: crosses 6 m within an hour.
        let mut ctx = test_context(5.9, 2_000.0, 0.14);
        ctx.state.f2_m3h = 0.0;
        let rec = agent.assess(&ctx).await.unwrap();
        assert!(rec.priority >= Priority::Medium);
        assert_ne!(rec.data["status"], "SAFE");
    }

    #[tokio::test]
    async fn projection_crossing_alarm_is_risk_with_veto() {
        let agent = WaterLevelSafetyAgent::new(Arc::new(Narrator::Template));
        // 7.0 m, inflow far above outflow: trajectory crosses 7.2 m.
        let mut ctx = test_context(7.0, 3_000.0, 0.14);
        ctx.state.f2_m3h = 1_000.0;
        ctx.forecast.next_24h = vec![3_000.0; 96];
        let rec = agent.assess(&ctx).await.unwrap();
        assert!(rec.can_veto);
        assert!(rec.priority >= Priority::High);
    }
}
