//! ---
//! psc_section: "05-agent-reasoning"
//! psc_subsection: "module"
//! psc_type: "source"
//! psc_scope: "code"
//! psc_description: "Specialist agents and coordinator synthesis."
//! psc_version: "v0.0.0-prealpha"
//! psc_owner: "tbd"
//! ---
use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use r_psc_hydraulics::{PumpCommand, PumpFleet};

use crate::context::{pumps_for_flow, AssessmentContext};
use crate::llm::Narrator;
use crate::recommendation::{Priority, Recommendation};
use crate::Specialist;

/// Candidate operating frequencies for subset enumeration.
const CANDIDATE_FREQS: [f64; 6] = [47.8, 48.0, 48.5, 49.0, 49.5, 50.0];

/// Accept combinations within this band around the target flow.
const FLOW_BAND: (f64, f64) = (0.8, 1.2);

#[derive(Debug, Clone)]
struct Combination {
    pumps: Vec<(String, f64)>,
    total_flow_m3h: f64,
    total_power_kw: f64,
    avg_efficiency: f64,
    score: f64,
}

/// Selects the pump subset and frequencies that move the target flow at the
/// best efficiency.
pub struct PumpEfficiencyAgent {
    narrator: Arc<Narrator>,
}

impl PumpEfficiencyAgent {
    pub const NAME: &'static str = "pump_efficiency";

    pub fn new(narrator: Arc<Narrator>) -> Self {
        Self { narrator }
    }

    /// Enumerate singles, mixed-frequency pairs and uniform-frequency
    /// triples; score by efficiency × flow match. Ties break toward higher
    /// efficiency, then fewer running pumps.
    fn best_combination(
        fleet: &PumpFleet,
        l1_m: f64,
        target_m3h: f64,
        f2_max_m3h: f64,
    ) -> Option<Combination> {
        let ids: Vec<String> = fleet.pump_ids().map(str::to_owned).collect();
        let mut combos: Vec<Combination> = Vec::new();

        let mut push = |pumps: Vec<(String, f64)>| {
            let mut flow = 0.0;
            let mut power = 0.0;
            let mut eff_sum = 0.0;
            for (id, freq) in &pumps {
                let Ok(perf) = fleet.performance(id, *freq, l1_m) else {
                    return;
                };
                flow += perf.flow_m3h;
                power += perf.power_kw;
                eff_sum += perf.efficiency;
            }
            if flow > f2_max_m3h
                || flow < FLOW_BAND.0 * target_m3h
                || flow > FLOW_BAND.1 * target_m3h
            {
                return;
            }
            let avg_efficiency = eff_sum / pumps.len() as f64;
            let match_quality = 1.0 - (flow - target_m3h).abs() / target_m3h;
            combos.push(Combination {
                pumps,
                total_flow_m3h: flow,
                total_power_kw: power,
                avg_efficiency,
                score: avg_efficiency * match_quality,
            });
        };

        for id in &ids {
            for f in CANDIDATE_FREQS {
                push(vec![(id.clone(), f)]);
            }
        }
        for (i, a) in ids.iter().enumerate() {
            for b in ids.iter().skip(i + 1) {
                for fa in CANDIDATE_FREQS {
                    for fb in CANDIDATE_FREQS {
                        push(vec![(a.clone(), fa), (b.clone(), fb)]);
                    }
                }
            }
        }
        for (i, a) in ids.iter().enumerate() {
            for (j, b) in ids.iter().enumerate().skip(i + 1) {
                for c in ids.iter().skip(j + 1) {
                    for f in CANDIDATE_FREQS {
                        push(vec![(a.clone(), f), (b.clone(), f), (c.clone(), f)]);
                    }
                }
            }
        }

        combos.sort_by(|x, y| {
            y.score
                .partial_cmp(&x.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(
                    y.avg_efficiency
                        .partial_cmp(&x.avg_efficiency)
                        .unwrap_or(std::cmp::Ordering::Equal),
                )
                .then(x.pumps.len().cmp(&y.pumps.len()))
        });
        combos.into_iter().next()
    }

    /// High-flow fallback when no enumerated subset reaches the band:
    /// greedily add the most efficient pumps at nominal frequency.
    fn greedy_combination(ctx: &AssessmentContext, target_m3h: f64) -> Combination {
        let ids = pumps_for_flow(
            &ctx.fleet,
            &ctx.constraints,
            ctx.state.l1_m,
            target_m3h,
            50.0,
        );
        let mut flow = 0.0;
        let mut power = 0.0;
        let mut eff_sum = 0.0;
        let mut pumps = Vec::new();
        for id in ids {
            if let Ok(perf) = ctx.fleet.performance(&id, 50.0, ctx.state.l1_m) {
                flow += perf.flow_m3h;
                power += perf.power_kw;
                eff_sum += perf.efficiency;
                pumps.push((id, 50.0));
            }
        }
        let n = pumps.len().max(1) as f64;
        Combination {
            avg_efficiency: eff_sum / n,
            score: 0.0,
            total_flow_m3h: flow,
            total_power_kw: power,
            pumps,
        }
    }
}

#[async_trait]
impl Specialist for PumpEfficiencyAgent {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn assess(&self, ctx: &AssessmentContext) -> anyhow::Result<Recommendation> {
        let target = ctx.target_flow_m3h();
        let combo = Self::best_combination(
            &ctx.fleet,
            ctx.state.l1_m,
            target,
            ctx.constraints.f2_max_m3h,
        )
        .unwrap_or_else(|| Self::greedy_combination(ctx, target));

        let specific_energy = if combo.total_flow_m3h > 0.0 {
            combo.total_power_kw / combo.total_flow_m3h
        } else {
            0.0
        };
        let frequencies: BTreeMap<&str, f64> = combo
            .pumps
            .iter()
            .map(|(id, f)| (id.as_str(), *f))
            .collect();
        let recommended: Vec<&str> = combo.pumps.iter().map(|(id, _)| id.as_str()).collect();

        let fallback = format!(
            "Target {:.0} m³/h: run {:?} for {:.0} m³/h at {:.1} % efficiency, {:.4} kWh/m³.",
            target,
            recommended,
            combo.total_flow_m3h,
            combo.avg_efficiency * 100.0,
            specific_energy,
        );
        let prompt = format!(
            "You chose a pump combination for a lift station.\n\
             Target flow {:.0} m³/h at level {:.2} m (head {:.1} m).\n\
             Selection: {:?} delivering {:.0} m³/h using {:.0} kW.\n\
             Explain why this subset balances efficiency and flow match.",
            target,
            ctx.state.l1_m,
            ctx.fleet.head(ctx.state.l1_m),
            frequencies,
            combo.total_flow_m3h,
            combo.total_power_kw,
        );
        let reasoning = self
            .narrator
            .narrate(
                "You are a mechanical engineer optimising pump performance.",
                &prompt,
                fallback,
            )
            .await;

        let command_set = combo
            .pumps
            .iter()
            .map(|(id, f)| PumpCommand::run(id.clone(), *f))
            .collect::<Vec<_>>();

        Ok(Recommendation {
            agent_name: Self::NAME.to_owned(),
            priority: Priority::Medium,
            confidence: 0.85,
            recommendation_type: "pump_selection".to_owned(),
            reasoning,
            data: json!({
                "target_flow_m3h": target,
                "recommended_pumps": recommended,
                "frequencies": frequencies,
                "specific_energy": specific_energy,
                "efficiency": combo.avg_efficiency,
                "total_flow_m3h": combo.total_flow_m3h,
                "total_power_kw": combo.total_power_kw,
            }),
            can_veto: false,
            command_set: Some(command_set),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testkit::test_context;

    #[tokio::test]
    async fn small_target_runs_one_pump() {
        let agent = PumpEfficiencyAgent::new(Arc::new(Narrator::Template));
        // Dry-weather inflow: the minimum-pump floor dominates.
        let ctx = test_context(1.82, 350.0, 0.14);
        let rec = agent.assess(&ctx).await.unwrap();
        let pumps = rec.data["recommended_pumps"].as_array().unwrap();
        assert_eq!(pumps.len(), 1);
        let commands = rec.command_set.as_ref().unwrap();
        assert_eq!(commands.len(), 1);
        assert!(commands[0].frequency_hz >= 47.8 && commands[0].frequency_hz <= 50.0);
    }

    #[tokio::test]
    async fn medium_target_matches_band() {
        let agent = PumpEfficiencyAgent::new(Arc::new(Narrator::Template));
        let ctx = test_context(1.82, 1_708.0, 0.14);
        let rec = agent.assess(&ctx).await.unwrap();
        let flow = rec.data["total_flow_m3h"].as_f64().unwrap();
        let target = rec.data["target_flow_m3h"].as_f64().unwrap();
        assert!(flow >= 0.8 * target && flow <= 1.2 * target);
        assert!(flow <= 16_000.0);
        let eff = rec.data["efficiency"].as_f64().unwrap();
        assert!((0.70..=0.90).contains(&eff));
    }

    #[tokio::test]
    async fn storm_target_falls_back_to_greedy() {
        let agent = PumpEfficiencyAgent::new(Arc::new(Narrator::Template));
        let mut ctx = test_context(5.0, 4_500.0, 0.14);
        ctx.forecast.next_24h = vec![4_500.0; 96];
        ctx.forecast.next_6h = vec![4_500.0; 24];
        // Target 18 000 m³/h exceeds any in-band subset under the cap.
        let rec = agent.assess(&ctx).await.unwrap();
        let flow = rec.data["total_flow_m3h"].as_f64().unwrap();
        assert!(flow <= 16_000.0);
        assert!(rec.command_set.as_ref().unwrap().len() >= 4);
    }

    #[tokio::test]
    async fn specific_energy_is_reported() {
        let agent = PumpEfficiencyAgent::new(Arc::new(Narrator::Template));
        let ctx = test_context(1.82, 1_000.0, 0.14);
        let rec = agent.assess(&ctx).await.unwrap();
        let se = rec.data["specific_energy"].as_f64().unwrap();
        assert!(se > 0.0 && se < 1.0);
    }
}
