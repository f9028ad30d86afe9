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
use serde_json::{json, Value};

use r_psc_common::time::hours_between;
use r_psc_hydraulics::PumpCommand;

use crate::context::AssessmentContext;
use crate::llm::Narrator;
use crate::recommendation::{Priority, Recommendation};
use crate::Specialist;

/// Enforces the hard operational rules against the running plan visible in
/// the shared context: minimum runtime, frequency band, flow cap, the
/// min-one-pump rule and the rolling daily-emptying requirement. Vetoes with
/// a concrete corrective command set when a rule is broken or about to be.
pub struct ConstraintComplianceAgent {
    narrator: Arc<Narrator>,
}

impl ConstraintComplianceAgent {
    pub const NAME: &'static str = "constraint_compliance";

    pub fn new(narrator: Arc<Narrator>) -> Self {
        Self { narrator }
    }

    fn check_running_plan(ctx: &AssessmentContext) -> (Vec<Value>, Vec<Value>, f64) {
        let mut violations = Vec::new();
        let mut warnings = Vec::new();

        // A tracker with no runtime history at all is a process cold start,
        // not a stopped station; the min-one-pump rule is enforced on the
        // outgoing plan by the coordinator and validator either way.
        let has_history = ctx
            .tracker
            .pumps()
            .any(|(_, rt)| rt.running || rt.started_at.is_some() || rt.cumulative_runtime_secs > 0);
        if ctx.tracker.running_count() < ctx.constraints.min_active_pumps {
            if has_history {
                violations.push(json!({
                    "type": "NO_PUMPS_RUNNING",
                    "detail": "at least one pump must always be running",
                }));
            } else {
                warnings.push(json!({
                    "type": "COLD_START",
                    "detail": "no runtime history yet",
                }));
            }
        }

        let mut total_flow = 0.0;
        for (id, rt) in ctx.tracker.pumps() {
            if !rt.running {
                continue;
            }
            if !ctx.constraints.frequency_in_band(rt.frequency_hz, false) {
                violations.push(json!({
                    "type": "FREQ_OUT_OF_BAND",
                    "pump": id,
                    "frequency_hz": rt.frequency_hz,
                }));
            }
            if let Ok(perf) = ctx
                .fleet
                .performance(id, rt.frequency_hz.clamp(
                    ctx.constraints.freq_min_hz,
                    ctx.constraints.freq_nominal_hz,
                ), ctx.state.l1_m)
            {
                total_flow += perf.flow_m3h;
            }
            let hours = ctx.tracker.runtime_hours(id, ctx.state.timestamp);
            if hours < ctx.constraints.min_runtime.as_secs_f64() / 3600.0 {
                warnings.push(json!({
                    "type": "MIN_RUNTIME_HOLD",
                    "pump": id,
                    "runtime_hours": hours,
                }));
            }
        }
        if total_flow > ctx.constraints.f2_max_m3h {
            violations.push(json!({
                "type": "F2_EXCEEDED",
                "value": total_flow,
                "limit": ctx.constraints.f2_max_m3h,
            }));
        }
        (violations, warnings, total_flow)
    }

    fn check_emptying(ctx: &AssessmentContext) -> Value {
        let dry = ctx.constraints.is_dry_weather(ctx.state.f1_m3_15min);
        let emptied_now = ctx.state.l1_m < ctx.constraints.l1_empty_target_m;
        let window_hours = ctx.constraints.emptying_window.as_secs_f64() / 3600.0;
        let hours_since = ctx
            .tracker
            .last_empty_below_target_at
            .map(|at| hours_between(at, ctx.state.timestamp));
        let overdue = !emptied_now
            && hours_since.map(|h| h > window_hours).unwrap_or(true);
        let status = if emptied_now {
            "EMPTIED"
        } else if dry && overdue {
            "EMPTYING_DUE"
        } else if dry {
            "DRY_WEATHER_OK"
        } else {
            "WET_WEATHER_CANNOT_EMPTY"
        };
        json!({
            "status": status,
            "is_dry_weather": dry,
            "hours_since_last_empty": hours_since,
            "window_hours": window_hours,
            "action_needed": dry && overdue,
        })
    }

    /// Minimal corrected plan: keep the running set, clip frequencies, start
    /// one pump if none runs, shed the least efficient pumps over the cap.
    fn corrective_commands(ctx: &AssessmentContext) -> Vec<PumpCommand> {
        let c = &ctx.constraints;
        let mut commands: Vec<PumpCommand> = Vec::new();
        for (id, rt) in ctx.tracker.pumps() {
            if rt.running {
                let freq = if rt.frequency_hz.is_finite() {
                    rt.frequency_hz.clamp(c.freq_min_hz, c.freq_nominal_hz)
                } else {
                    c.freq_min_hz
                };
                commands.push(PumpCommand::run(id, freq));
            } else {
                commands.push(PumpCommand::stop(id));
            }
        }
        if !commands.iter().any(|cmd| cmd.start) {
            if let Some(best) = ctx.fleet.most_efficient(ctx.state.l1_m, c.freq_min_hz) {
                if let Some(cmd) = commands.iter_mut().find(|cmd| cmd.pump_id == best) {
                    *cmd = PumpCommand::run(best, c.freq_min_hz);
                }
            }
        }
        // Shed flow over the cap, least efficient running pump first.
        loop {
            let total: f64 = commands
                .iter()
                .filter(|cmd| cmd.start)
                .filter_map(|cmd| {
                    ctx.fleet
                        .performance(&cmd.pump_id, cmd.frequency_hz, ctx.state.l1_m)
                        .ok()
                })
                .map(|perf| perf.flow_m3h)
                .sum();
            if total <= c.f2_max_m3h {
                break;
            }
            let running: Vec<&str> = commands
                .iter()
                .filter(|cmd| cmd.start)
                .map(|cmd| cmd.pump_id.as_str())
                .collect();
            if running.len() <= c.min_active_pumps {
                break;
            }
            let ranked = ctx
                .fleet
                .ranked_by_efficiency(ctx.state.l1_m, c.freq_min_hz, Some(&running));
            let Some(worst) = ranked.last().cloned() else {
                break;
            };
            if let Some(cmd) = commands.iter_mut().find(|cmd| cmd.pump_id == worst) {
                *cmd = PumpCommand::stop(worst);
            }
        }
        commands
    }
}

#[async_trait]
impl Specialist for ConstraintComplianceAgent {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn assess(&self, ctx: &AssessmentContext) -> anyhow::Result<Recommendation> {
        let (violations, warnings, running_flow) = Self::check_running_plan(ctx);
        let emptying = Self::check_emptying(ctx);
        let action_needed = emptying["action_needed"].as_bool().unwrap_or(false);

        let (priority, can_veto) = if !violations.is_empty() {
            (Priority::Critical, true)
        } else if action_needed {
            (Priority::High, false)
        } else {
            (Priority::Low, false)
        };
        let command_set = can_veto.then(|| Self::corrective_commands(ctx));

        let fallback = if violations.is_empty() {
            format!(
                "All hard constraints hold; running flow {:.0} m³/h; emptying status {}.",
                running_flow,
                emptying["status"].as_str().unwrap_or("UNKNOWN"),
            )
        } else {
            format!(
                "{} constraint violation(s) detected; corrective command set issued.",
                violations.len(),
            )
        };
        let prompt = format!(
            "Compliance audit of a pumping plan.\n\
             Violations: {}. Warnings: {}. Running flow {:.0} m³/h (cap {:.0}).\n\
             Emptying: {}. State the compliance verdict plainly.",
            violations.len(),
            warnings.len(),
            running_flow,
            ctx.constraints.f2_max_m3h,
            emptying["status"].as_str().unwrap_or("UNKNOWN"),
        );
        let reasoning = self
            .narrator
            .narrate(
                "You are a compliance officer enforcing hard operational rules.",
                &prompt,
                fallback,
            )
            .await;

        Ok(Recommendation {
            agent_name: Self::NAME.to_owned(),
            priority,
            confidence: 0.98,
            recommendation_type: "constraint_compliance".to_owned(),
            reasoning,
            data: json!({
                "compliance_status": if violations.is_empty() { "COMPLIANT" } else { "VIOLATIONS" },
                "violations": violations,
                "warnings": warnings,
                "running_flow_m3h": running_flow,
                "emptying_check": emptying,
                "corrective_commands": &command_set,
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
    use chrono::Duration as ChronoDuration;

    #[tokio::test]
    async fn all_pumps_stopped_is_critical_veto() {
        let agent = ConstraintComplianceAgent::new(Arc::new(Narrator::Template));
        let mut ctx = test_context(1.82, 700.0, 0.14);
        let constraints = ctx.constraints;
        // The station ran earlier; now everything is off.
        let earlier = ctx.state.timestamp - ChronoDuration::hours(6);
        ctx.tracker
            .commit(&[PumpCommand::run("1.2", 49.0)], earlier, 1.82, &constraints);
        ctx.tracker
            .commit(&[PumpCommand::run("1.2", 49.0)], earlier, 1.82, &constraints);
        ctx.tracker
            .commit(&[PumpCommand::stop("1.2")], ctx.state.timestamp, 1.82, &constraints);
        let rec = agent.assess(&ctx).await.unwrap();
        assert!(rec.is_critical_veto());
        let commands = rec.command_set.unwrap();
        assert_eq!(commands.iter().filter(|c| c.start).count(), 1);
        let started = commands.iter().find(|c| c.start).unwrap();
        assert_eq!(started.frequency_hz, 47.8);
    }

    #[tokio::test]
    async fn cold_start_is_not_a_violation() {
        let agent = ConstraintComplianceAgent::new(Arc::new(Narrator::Template));
        let ctx = test_context(1.82, 1_200.0, 0.14);
        let rec = agent.assess(&ctx).await.unwrap();
        assert!(!rec.can_veto);
        assert_eq!(rec.data["compliance_status"], "COMPLIANT");
    }

    #[tokio::test]
    async fn healthy_plan_is_compliant() {
        let agent = ConstraintComplianceAgent::new(Arc::new(Narrator::Template));
        let mut ctx = test_context(1.82, 700.0, 0.14);
        let started = ctx.state.timestamp - ChronoDuration::hours(3);
        let commands = [PumpCommand::run("1.2", 49.0)];
        let constraints = ctx.constraints;
        ctx.tracker.commit(&commands, started, 1.82, &constraints);
        // Recent emptying keeps the rolling rule quiet.
        ctx.tracker.last_empty_below_target_at =
            Some(ctx.state.timestamp - ChronoDuration::hours(5));
        let rec = agent.assess(&ctx).await.unwrap();
        assert_eq!(rec.priority, Priority::Low);
        assert_eq!(rec.data["compliance_status"], "COMPLIANT");
        assert!(!rec.can_veto);
    }

    #[tokio::test]
    async fn out_of_band_frequency_is_corrected() {
        let agent = ConstraintComplianceAgent::new(Arc::new(Narrator::Template));
        let mut ctx = test_context(1.82, 700.0, 0.14);
        let constraints = ctx.constraints;
        // Force an illegal tracked frequency through a manual plan.
        ctx.tracker
            .commit(&[PumpCommand::run("1.2", 45.0)], ctx.state.timestamp, 1.82, &constraints);
        let rec = agent.assess(&ctx).await.unwrap();
        assert!(rec.is_critical_veto());
        let commands = rec.command_set.unwrap();
        let cmd = commands.iter().find(|c| c.pump_id == "1.2").unwrap();
        assert!(cmd.start);
        assert_eq!(cmd.frequency_hz, 47.8);
    }

    #[tokio::test]
    async fn overdue_dry_weather_emptying_is_high() {
        let agent = ConstraintComplianceAgent::new(Arc::new(Narrator::Template));
        let mut ctx = test_context(2.5, 600.0, 0.14);
        let constraints = ctx.constraints;
        let started = ctx.state.timestamp - ChronoDuration::hours(30);
        ctx.tracker
            .commit(&[PumpCommand::run("1.2", 48.0)], started, 2.5, &constraints);
        ctx.tracker.last_empty_below_target_at =
            Some(ctx.state.timestamp - ChronoDuration::hours(30));
        let rec = agent.assess(&ctx).await.unwrap();
        assert_eq!(rec.priority, Priority::High);
        assert_eq!(rec.data["emptying_check"]["action_needed"], true);
        assert!(!rec.can_veto);
    }
}
