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

use r_psc_data::{cheap_windows, expensive_windows, spread_ratio, PriceWindow};

use crate::context::AssessmentContext;
use crate::llm::Narrator;
use crate::recommendation::{Priority, Recommendation};
use crate::Specialist;

const CHEAP_PERCENTILE: f64 = 25.0;
const EXPENSIVE_PERCENTILE: f64 = 75.0;

/// Tactical recommendation the coordinator understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CostAction {
    PumpNow,
    Defer,
    PumpNormally,
}

impl CostAction {
    pub const fn as_str(self) -> &'static str {
        match self {
            CostAction::PumpNow => "PUMP_NOW",
            CostAction::Defer => "DEFER",
            CostAction::PumpNormally => "PUMP_NORMALLY",
        }
    }
}

/// Finds temporal arbitrage in the 24-hour price window: pump hard while
/// electricity is cheap, defer while it is expensive and the tunnel has room.
pub struct EnergyCostAgent {
    narrator: Arc<Narrator>,
}

impl EnergyCostAgent {
    pub const NAME: &'static str = "energy_cost";

    pub fn new(narrator: Arc<Narrator>) -> Self {
        Self { narrator }
    }

    fn classify(
        ctx: &AssessmentContext,
        cheap: &[PriceWindow],
        expensive: &[PriceWindow],
    ) -> CostAction {
        let current = ctx.state.electricity_price_eur_kwh;
        let in_cheap_now = cheap.iter().any(|w| w.start_step == 0);
        let in_expensive_now = expensive.iter().any(|w| w.start_step == 0);
        let cheap_soon = cheap
            .iter()
            .any(|w| w.start_step > 0 && w.start_hours() <= 6.0);
        // Deferral needs storage headroom; above 5 m the tunnel is the
        // safety agent's problem, not an arbitrage asset.
        let has_headroom = ctx.state.l1_m < 5.0;
        if in_cheap_now || current <= 0.0 {
            CostAction::PumpNow
        } else if in_expensive_now && cheap_soon && has_headroom {
            CostAction::Defer
        } else {
            CostAction::PumpNormally
        }
    }
}

#[async_trait]
impl Specialist for EnergyCostAgent {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn assess(&self, ctx: &AssessmentContext) -> anyhow::Result<Recommendation> {
        let prices = &ctx.prices_24h;
        let current = ctx.state.electricity_price_eur_kwh;
        let cheap = cheap_windows(prices, CHEAP_PERCENTILE);
        let expensive = expensive_windows(prices, EXPENSIVE_PERCENTILE);
        let ratio = spread_ratio(prices);

        let next_cheap = cheap.iter().find(|w| w.start_step > 0).cloned();
        let next_expensive = expensive.iter().find(|w| w.start_step > 0).cloned();
        let best_cheap_price = cheap
            .iter()
            .map(|w| w.avg_price_eur_kwh)
            .fold(f64::INFINITY, f64::min);
        // Savings from shifting one MWh of pumping into the cheapest window.
        let arbitrage_value_eur = if best_cheap_price.is_finite() {
            ((current - best_cheap_price) * 1_000.0).max(0.0)
        } else {
            0.0
        };

        let action = Self::classify(ctx, &cheap, &expensive);
        let priority = if ratio > 10.0 {
            Priority::High
        } else if ratio > 5.0 {
            Priority::Medium
        } else {
            Priority::Low
        };

        let fallback = format!(
            "Price {:.3} EUR/kWh, 24 h spread ratio {:.1}; {} cheap window(s) ahead; action {}.",
            current,
            if ratio.is_finite() { ratio } else { 999.0 },
            cheap.len(),
            action.as_str(),
        );
        let prompt = format!(
            "You are assessing electricity arbitrage for a pumping station.\n\
             Current price: {:.3} EUR/kWh ({:?} scenario). 24 h max/min ratio: {:.1}.\n\
             Cheapest upcoming window average: {:.3} EUR/kWh. Shift value: {:.0} EUR/MWh.\n\
             Tunnel level: {:.2} m of 8.0 m. Chosen action: {}.\n\
             Explain the trade-off briefly, as an energy trader would.",
            current,
            ctx.state.price_scenario,
            if ratio.is_finite() { ratio } else { 999.0 },
            if best_cheap_price.is_finite() { best_cheap_price } else { current },
            arbitrage_value_eur,
            ctx.state.l1_m,
            action.as_str(),
        );
        let reasoning = self
            .narrator
            .narrate("You are an energy trader.", &prompt, fallback)
            .await;

        Ok(Recommendation {
            agent_name: Self::NAME.to_owned(),
            priority,
            confidence: 0.8,
            recommendation_type: "cost_optimization".to_owned(),
            reasoning,
            data: json!({
                "current_price": current,
                "next_cheap_window": next_cheap,
                "next_expensive_window": next_expensive,
                "arbitrage_value_eur": arbitrage_value_eur,
                "recommendation": action.as_str(),
                "spread_ratio": if ratio.is_finite() { ratio } else { f64::MAX },
            }),
            can_veto: false,
            command_set: None,
        })
    }
}
