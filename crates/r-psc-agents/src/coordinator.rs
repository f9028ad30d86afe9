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

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use r_psc_hydraulics::{PumpCommand, PumpFleet};

use crate::compliance::ConstraintComplianceAgent;
use crate::context::{pumps_within_flow, AssessmentContext};
use crate::cost::EnergyCostAgent;
use crate::efficiency::PumpEfficiencyAgent;
use crate::llm::Narrator;
use crate::recommendation::{Priority, Recommendation};
use crate::safety::WaterLevelSafetyAgent;
use crate::smoothness::{FlowSmoothnessAgent, MAX_STEP_M3H};

/// Frequency used for the intermediate stage of a smoothed transition.
const STAGING_FREQ_HZ: f64 = 48.5;

/// The coordinator's tentative result, pre-validator.
#[derive(Debug, Clone)]
pub struct CoordinatorOutcome {
    pub commands: Vec<PumpCommand>,
    pub reasoning: String,
    pub priority_applied: Priority,
    pub conflicts_resolved: Vec<String>,
    pub confidence: f64,
}

/// Synthesises the six recommendations into tentative pump commands.
///
/// Priority hierarchy is strict: Safety > Compliance > Cost > Efficiency =
/// Smoothness > Forecast. A vetoing agent at CRITICAL is adopted verbatim.
/// With an LLM configured, synthesis is attempted there first and any
/// malformed output falls back to the deterministic algorithm.
pub struct Coordinator {
    narrator: Arc<Narrator>,
}

impl Coordinator {
    pub fn new(narrator: Arc<Narrator>) -> Self {
        Self { narrator }
    }

    pub async fn synthesize(
        &self,
        ctx: &AssessmentContext,
        recs: &[Recommendation],
    ) -> CoordinatorOutcome {
        // Vetoes first; the safety agent outranks compliance.
        for (agent, label) in [
            (WaterLevelSafetyAgent::NAME, "safety_veto_applied"),
            (ConstraintComplianceAgent::NAME, "compliance_veto_applied"),
        ] {
            let veto = recs
                .iter()
                .find(|r| r.agent_name == agent && r.is_critical_veto());
            if let Some(rec) = veto {
                if let Some(commands) = &rec.command_set {
                    debug!(agent, "adopting veto command set verbatim");
                    let commands = full_plan(&ctx.fleet, commands.clone());
                    let fallback = format!(
                        "{} vetoed at CRITICAL; its corrective command set was adopted verbatim. {}",
                        agent, rec.reasoning
                    );
                    let reasoning = self.narrate_outcome(ctx, recs, &fallback).await;
                    return CoordinatorOutcome {
                        commands,
                        reasoning,
                        priority_applied: Priority::Critical,
                        conflicts_resolved: vec![label.to_owned()],
                        confidence: rec.confidence,
                    };
                }
            }
        }

        let mut conflicts = Vec::new();
        if self.narrator.is_llm() {
            match self.llm_synthesize(ctx, recs).await {
                Some(outcome) => return outcome,
                None => {
                    warn!("LLM synthesis unusable; deterministic fallback engaged");
                    conflicts.push("llm_synthesis_fallback".to_owned());
                }
            }
        }
        self.deterministic(ctx, recs, conflicts).await
    }

    /// The canonical multi-objective synthesis.
    async fn deterministic(
        &self,
        ctx: &AssessmentContext,
        recs: &[Recommendation],
        mut conflicts: Vec<String>,
    ) -> CoordinatorOutcome {
        let find = |name: &str| recs.iter().find(|r| r.agent_name == name);
        let efficiency = find(PumpEfficiencyAgent::NAME);
        let cost = find(EnergyCostAgent::NAME);
        let safety = find(WaterLevelSafetyAgent::NAME);
        let smoothness = find(FlowSmoothnessAgent::NAME);

        let mut drivers: Vec<(Priority, f64)> = Vec::new();

        // 1. Efficiency's subset is the baseline.
        let mut commands = efficiency
            .and_then(|r| r.command_set.clone())
            .unwrap_or_else(|| min_pump_plan(ctx));
        if let Some(rec) = efficiency {
            drivers.push((rec.priority, rec.confidence));
        }

        // 2. Cost may shrink the mix toward deferral, but only while safe.
        let safety_is_safe = safety
            .map(|r| r.priority == Priority::Low && !r.can_veto)
            .unwrap_or(false);
        let wants_defer = cost
            .and_then(|r| r.data.get("recommendation"))
            .and_then(Value::as_str)
            == Some("DEFER");
        if wants_defer && safety_is_safe {
            commands = min_pump_plan(ctx);
            conflicts.push("cost_deferral_applied".to_owned());
            if let Some(rec) = cost {
                drivers.push((rec.priority, rec.confidence));
            }
        }

        // 3. Smoothness overrides to a staged plan on a too-large step.
        let baseline_flow = plan_flow(ctx, &commands);
        let previous_flow = ctx.state.f2_m3h;
        let delta = baseline_flow - previous_flow;
        if delta.abs() > MAX_STEP_M3H {
            let intermediate =
                (previous_flow + delta.clamp(-MAX_STEP_M3H, MAX_STEP_M3H)).max(0.0);
            let staged = pumps_within_flow(
                &ctx.fleet,
                &ctx.constraints,
                ctx.state.l1_m,
                intermediate,
                STAGING_FREQ_HZ,
            );
            if !staged.is_empty() {
                commands = staged
                    .into_iter()
                    .map(|id| PumpCommand::run(id, STAGING_FREQ_HZ))
                    .collect();
                conflicts.push("smoothness_staged_transition".to_owned());
                if let Some(rec) = smoothness {
                    drivers.push((rec.priority, rec.confidence));
                }
            }
        }

        // 4. At least one pump must run.
        if !commands.iter().any(|c| c.start) {
            commands = min_pump_plan(ctx);
            conflicts.push("min_one_pump_forced".to_owned());
        }

        // 5. Clip every started frequency into the band.
        for cmd in commands.iter_mut().filter(|c| c.start) {
            let clipped = cmd
                .frequency_hz
                .clamp(ctx.constraints.freq_min_hz, ctx.constraints.freq_nominal_hz);
            if clipped != cmd.frequency_hz {
                conflicts.push(format!("frequency_clipped:{}", cmd.pump_id));
                cmd.frequency_hz = clipped;
            }
        }

        let commands = full_plan(&ctx.fleet, commands);
        let priority_applied = drivers
            .iter()
            .map(|(p, _)| *p)
            .max()
            .unwrap_or(Priority::Medium);
        let confidence = if drivers.is_empty() {
            0.8
        } else {
            (drivers.iter().map(|(_, c)| *c).sum::<f64>() / drivers.len() as f64).clamp(0.0, 1.0)
        };

        let fallback = format!(
            "Baseline from pump efficiency; {}. Running {} pump(s) for {:.0} m³/h.",
            if conflicts.is_empty() {
                "no conflicts".to_owned()
            } else {
                conflicts.join(", ")
            },
            commands.iter().filter(|c| c.start).count(),
            plan_flow(ctx, &commands),
        );
        let reasoning = self.narrate_outcome(ctx, recs, &fallback).await;

        CoordinatorOutcome {
            commands,
            reasoning,
            priority_applied,
            conflicts_resolved: conflicts,
            confidence,
        }
    }

    /// Ask the LLM for a full decision and parse it; `None` on any defect.
    async fn llm_synthesize(
        &self,
        ctx: &AssessmentContext,
        recs: &[Recommendation],
    ) -> Option<CoordinatorOutcome> {
        let prompt = synthesis_prompt(ctx, recs);
        let raw = match self
            .narrator
            .complete(
                "You are the coordinator of a multi-agent pump control system. \
                 Respond with a single JSON object and nothing else.",
                &prompt,
            )
            .await
        {
            Ok(raw) => raw,
            Err(err) => {
                warn!(error = %err, "coordinator LLM call failed");
                return None;
            }
        };
        let parsed: LlmDecision = serde_json::from_str(extract_json(&raw)?).ok()?;

        let mut commands = Vec::new();
        for cmd in parsed.pump_commands {
            // Unknown pump ids invalidate the whole response.
            ctx.fleet.spec(&cmd.pump_id).ok()?;
            if cmd.run {
                commands.push(PumpCommand::run(cmd.pump_id, cmd.frequency_hz));
            } else {
                commands.push(PumpCommand::stop(cmd.pump_id));
            }
        }
        if !commands.iter().any(|c| c.start) {
            return None;
        }
        for cmd in commands.iter_mut().filter(|c| c.start) {
            cmd.frequency_hz = cmd
                .frequency_hz
                .clamp(ctx.constraints.freq_min_hz, ctx.constraints.freq_nominal_hz);
        }
        let mut conflicts = parsed.conflicts_resolved;
        conflicts.push("llm_synthesis".to_owned());
        Some(CoordinatorOutcome {
            commands: full_plan(&ctx.fleet, commands),
            reasoning: parsed.reasoning,
            priority_applied: parsed.priority_applied,
            conflicts_resolved: conflicts,
            confidence: parsed.confidence.clamp(0.0, 1.0),
        })
    }

    async fn narrate_outcome(
        &self,
        ctx: &AssessmentContext,
        recs: &[Recommendation],
        fallback: &str,
    ) -> String {
        let prompt = format!(
            "{}\nSummarise the final decision rationale in at most three sentences.",
            synthesis_prompt(ctx, recs)
        );
        self.narrator
            .narrate(
                "You are the coordinator of a multi-agent pump control system.",
                &prompt,
                fallback.to_owned(),
            )
            .await
    }
}

/// One command per fleet pump: proposals win, everything else stops.
fn full_plan(fleet: &PumpFleet, proposals: Vec<PumpCommand>) -> Vec<PumpCommand> {
    fleet
        .pump_ids()
        .map(|id| {
            proposals
                .iter()
                .find(|cmd| cmd.pump_id == id)
                .cloned()
                .unwrap_or_else(|| PumpCommand::stop(id))
        })
        .collect()
}

/// The single most efficient pump at minimum frequency.
fn min_pump_plan(ctx: &AssessmentContext) -> Vec<PumpCommand> {
    ctx.fleet
        .most_efficient(ctx.state.l1_m, ctx.constraints.freq_min_hz)
        .map(|id| vec![PumpCommand::run(id, ctx.constraints.freq_min_hz)])
        .unwrap_or_default()
}

fn plan_flow(ctx: &AssessmentContext, commands: &[PumpCommand]) -> f64 {
    commands
        .iter()
        .filter(|cmd| cmd.start)
        .filter_map(|cmd| {
            ctx.fleet
                .performance(
                    &cmd.pump_id,
                    cmd.frequency_hz
                        .clamp(ctx.constraints.freq_min_hz, ctx.constraints.freq_nominal_hz),
                    ctx.state.l1_m,
                )
                .ok()
        })
        .map(|perf| perf.flow_m3h)
        .sum()
}

fn synthesis_prompt(ctx: &AssessmentContext, recs: &[Recommendation]) -> String {
    use std::fmt::Write;
    let mut prompt = format!(
        "SYSTEM STATE: level {:.2} m, volume {:.0} m³, inflow {:.0} m³/15min, \
         outflow {:.0} m³/h, price {:.3} EUR/kWh.\n\nAGENT RECOMMENDATIONS:\n",
        ctx.state.l1_m,
        ctx.state.v_m3,
        ctx.state.f1_m3_15min,
        ctx.state.f2_m3h,
        ctx.state.electricity_price_eur_kwh,
    );
    for rec in recs {
        let reasoning: String = rec.reasoning.chars().take(200).collect();
        let _ = writeln!(
            prompt,
            "- {} [{} | confidence {:.2} | veto {}]: {} data={}",
            rec.agent_name, rec.priority, rec.confidence, rec.can_veto, reasoning, rec.data,
        );
    }
    prompt.push_str(
        "\nPRIORITY HIERARCHY (STRICT): safety > compliance > cost > efficiency = \
         smoothness > forecast.\nRULES: at least one pump always runs; running \
         frequencies within 47.8-50 Hz; total flow at most 16000 m3/h.\n\
         Respond with JSON: {\"reasoning\": string, \"pump_commands\": \
         [{\"pump_id\": string, \"frequency_hz\": number, \"run\": bool}], \
         \"priority_applied\": \"LOW\"|\"MEDIUM\"|\"HIGH\"|\"CRITICAL\", \
         \"conflicts_resolved\": [string], \"confidence\": number}",
    );
    prompt
}

/// Slice the first balanced-looking JSON object out of an LLM reply.
fn extract_json(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

#[derive(Debug, Deserialize)]
struct LlmDecision {
    #[serde(default)]
    reasoning: String,
    pump_commands: Vec<LlmPumpCommand>,
    #[serde(default)]
    priority_applied: Priority,
    #[serde(default)]
    conflicts_resolved: Vec<String>,
    #[serde(default = "default_confidence")]
    confidence: f64,
}

fn default_confidence() -> f64 {
    0.8
}

#[derive(Debug, Deserialize)]
struct LlmPumpCommand {
    pump_id: String,
    #[serde(default)]
    frequency_hz: f64,
    #[serde(default)]
    run: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testkit::test_context;
    use serde_json::json;

    fn rec(name: &str, priority: Priority) -> Recommendation {
        Recommendation {
            agent_name: name.to_owned(),
            priority,
            confidence: 0.9,
            recommendation_type: "test".to_owned(),
            reasoning: String::new(),
            data: Value::Null,
            can_veto: false,
            command_set: None,
        }
    }

    #[tokio::test]
    async fn critical_safety_veto_is_adopted_verbatim() {
        let coordinator = Coordinator::new(Arc::new(Narrator::Template));
        let ctx = test_context(7.5, 1_800.0, 0.5);
        let mut safety = rec("water_level_safety", Priority::Critical);
        safety.can_veto = true;
        safety.command_set = Some(vec![
            PumpCommand::run("1.2", 50.0),
            PumpCommand::run("1.4", 50.0),
            PumpCommand::run("2.2", 50.0),
        ]);
        let mut efficiency = rec("pump_efficiency", Priority::Medium);
        efficiency.command_set = Some(vec![PumpCommand::run("1.1", 47.8)]);
        let outcome = coordinator
            .synthesize(&ctx, &[safety, efficiency])
            .await;
        assert_eq!(outcome.priority_applied, Priority::Critical);
        assert_eq!(
            outcome.conflicts_resolved,
            vec!["safety_veto_applied".to_owned()]
        );
        let started: Vec<&str> = outcome
            .commands
            .iter()
            .filter(|c| c.start)
            .map(|c| c.pump_id.as_str())
            .collect();
        assert_eq!(started, vec!["1.2", "1.4", "2.2"]);
        assert_eq!(outcome.commands.len(), ctx.fleet.len());
    }

    #[tokio::test]
    async fn baseline_comes_from_efficiency() {
        let coordinator = Coordinator::new(Arc::new(Narrator::Template));
        let mut ctx = test_context(1.82, 400.0, 0.14);
        ctx.state.f2_m3h = 1_500.0;
        let mut efficiency = rec("pump_efficiency", Priority::Medium);
        efficiency.command_set = Some(vec![PumpCommand::run("2.3", 48.5)]);
        let outcome = coordinator.synthesize(&ctx, &[efficiency]).await;
        let cmd = outcome
            .commands
            .iter()
            .find(|c| c.pump_id == "2.3")
            .unwrap();
        assert!(cmd.start);
        assert_eq!(cmd.frequency_hz, 48.5);
    }

    #[tokio::test]
    async fn deferral_shrinks_to_min_pump_when_safe() {
        let coordinator = Coordinator::new(Arc::new(Narrator::Template));
        let mut ctx = test_context(3.0, 400.0, 80.0);
        ctx.state.f2_m3h = 3_200.0;
        let mut efficiency = rec("pump_efficiency", Priority::Medium);
        efficiency.command_set = Some(vec![
            PumpCommand::run("1.2", 50.0),
            PumpCommand::run("2.2", 50.0),
        ]);
        let mut cost = rec("energy_cost", Priority::High);
        cost.data = json!({"recommendation": "DEFER"});
        let safety = rec("water_level_safety", Priority::Low);
        let outcome = coordinator
            .synthesize(&ctx, &[efficiency, cost, safety])
            .await;
        assert!(outcome
            .conflicts_resolved
            .contains(&"cost_deferral_applied".to_owned()));
        assert_eq!(outcome.commands.iter().filter(|c| c.start).count(), 1);
        assert_eq!(outcome.priority_applied, Priority::High);
    }

    #[tokio::test]
    async fn deferral_refused_when_not_safe() {
        let coordinator = Coordinator::new(Arc::new(Narrator::Template));
        let mut ctx = test_context(6.5, 1_500.0, 80.0);
        ctx.state.f2_m3h = 6_500.0;
        let mut efficiency = rec("pump_efficiency", Priority::Medium);
        efficiency.command_set = Some(vec![
            PumpCommand::run("1.2", 50.0),
            PumpCommand::run("2.2", 50.0),
        ]);
        let mut cost = rec("energy_cost", Priority::High);
        cost.data = json!({"recommendation": "DEFER"});
        let safety = rec("water_level_safety", Priority::Medium);
        let outcome = coordinator
            .synthesize(&ctx, &[efficiency, cost, safety])
            .await;
        assert!(!outcome
            .conflicts_resolved
            .contains(&"cost_deferral_applied".to_owned()));
        assert_eq!(outcome.commands.iter().filter(|c| c.start).count(), 2);
    }

    #[tokio::test]
    async fn all_stopped_forces_min_one_pump() {
        let coordinator = Coordinator::new(Arc::new(Narrator::Template));
        let mut ctx = test_context(1.82, 350.0, 0.14);
        ctx.state.f2_m3h = 1_500.0;
        let mut efficiency = rec("pump_efficiency", Priority::Medium);
        efficiency.command_set = Some(vec![PumpCommand::stop("1.2")]);
        let outcome = coordinator.synthesize(&ctx, &[efficiency]).await;
        assert!(outcome
            .conflicts_resolved
            .contains(&"min_one_pump_forced".to_owned()));
        let started: Vec<&PumpCommand> =
            outcome.commands.iter().filter(|c| c.start).collect();
        assert_eq!(started.len(), 1);
        assert_eq!(started[0].frequency_hz, 47.8);
    }

    #[tokio::test]
    async fn out_of_band_proposal_is_clipped() {
        let coordinator = Coordinator::new(Arc::new(Narrator::Template));
        let mut ctx = test_context(1.82, 400.0, 0.14);
        ctx.state.f2_m3h = 3_200.0;
        let mut efficiency = rec("pump_efficiency", Priority::Medium);
        efficiency.command_set = Some(vec![PumpCommand::run("1.2", 52.0)]);
        let outcome = coordinator.synthesize(&ctx, &[efficiency]).await;
        let cmd = outcome
            .commands
            .iter()
            .find(|c| c.pump_id == "1.2")
            .unwrap();
        assert_eq!(cmd.frequency_hz, 50.0);
        assert!(outcome
            .conflicts_resolved
            .iter()
            .any(|c| c.starts_with("frequency_clipped")));
    }

    #[tokio::test]
    async fn big_step_is_staged() {
        let coordinator = Coordinator::new(Arc::new(Narrator::Template));
        let mut ctx = test_context(3.0, 2_400.0, 0.14);
        ctx.state.f2_m3h = 2_000.0;
        let mut efficiency = rec("pump_efficiency", Priority::Medium);
        // Proposal jumps ~9900 m³/h against 2000 previously.
        efficiency.command_set = Some(vec![
            PumpCommand::run("1.2", 50.0),
            PumpCommand::run("2.2", 50.0),
            PumpCommand::run("2.3", 50.0),
        ]);
        let smoothness = rec("flow_smoothness", Priority::Medium);
        let outcome = coordinator
            .synthesize(&ctx, &[efficiency, smoothness])
            .await;
        assert!(outcome
            .conflicts_resolved
            .contains(&"smoothness_staged_transition".to_owned()));
        let staged_flow = outcome
            .commands
            .iter()
            .filter(|c| c.start)
            .map(|c| {
                ctx.fleet
                    .performance(&c.pump_id, c.frequency_hz, ctx.state.l1_m)
                    .unwrap()
                    .flow_m3h
            })
            .sum::<f64>();
        assert!(staged_flow < 6_000.0, "staged flow {} too large", staged_flow);
    }

    #[test]
    fn json_extraction_tolerates_prose() {
        let raw = "Sure, here is the decision:\n{\"a\": 1}\nthanks";
        assert_eq!(extract_json(raw), Some("{\"a\": 1}"));
        assert_eq!(extract_json("no json"), None);
    }
}
