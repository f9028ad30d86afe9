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

use crate::context::AssessmentContext;
use crate::llm::Narrator;
use crate::recommendation::{Priority, Recommendation};
use crate::Specialist;

/// Interprets the shared forecast for the other agents: storm alerts, peaks,
/// dry-weather status.
pub struct InflowForecastingAgent {
    narrator: Arc<Narrator>,
}

impl InflowForecastingAgent {
    pub const NAME: &'static str = "inflow_forecasting";

    pub fn new(narrator: Arc<Narrator>) -> Self {
        Self { narrator }
    }
}

#[async_trait]
impl Specialist for InflowForecastingAgent {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn assess(&self, ctx: &AssessmentContext) -> anyhow::Result<Recommendation> {
        let forecast = &ctx.forecast;
        let current = ctx.state.f1_m3_15min;
        let is_dry = ctx.constraints.is_dry_weather(current);

        let priority = if forecast.storm_detected || forecast.peak_value > 2.0 * current.max(1.0) {
            Priority::High
        } else {
            Priority::Medium
        };

        let fallback = format!(
            "Inflow {:.0} m³/15min, trend {:?}; peak {:.0} m³/15min in {:.1} h; storm {}; {} weather.",
            current,
            forecast.trend,
            forecast.peak_value,
            forecast.peak_offset_hours(),
            if forecast.storm_detected { "expected" } else { "not expected" },
            if is_dry { "dry" } else { "wet" },
        );
        let prompt = format!(
            "Interpret this inflow forecast for a wastewater pumping station.\n\
             Current inflow: {:.0} m³/15min (dry-weather threshold {:.0}).\n\
             Next 6 h: {:?}\n\
             Peak: {:.0} m³/15min in {:.1} h. Storm detected: {}. Confidence {:.2}.\n\
             Summarise what the other control agents should expect.",
            current,
            ctx.constraints.dry_weather_inflow_m3_15min,
            &forecast.next_6h[..forecast.next_6h.len().min(8)],
            forecast.peak_value,
            forecast.peak_offset_hours(),
            forecast.storm_detected,
            forecast.confidence,
        );
        let reasoning = self
            .narrator
            .narrate("You are an experienced hydrologist.", &prompt, fallback)
            .await;

        Ok(Recommendation {
            agent_name: Self::NAME.to_owned(),
            priority,
            confidence: forecast.confidence,
            recommendation_type: "inflow_forecast".to_owned(),
            reasoning,
            data: json!({
                "predicted_inflow": forecast.next_6h,
                "forecast_horizon_steps": forecast.next_24h.len(),
                "trend": forecast.trend,
                "storm_detected": forecast.storm_detected,
                "peak_inflow": forecast.peak_value,
                "peak_in_hours": forecast.peak_offset_hours(),
                "is_dry_weather": is_dry,
                "degraded": forecast.degraded,
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
    async fn quiet_forecast_is_medium() {
        let agent = InflowForecastingAgent::new(Arc::new(Narrator::Template));
        let ctx = test_context(1.8, 700.0, 0.1);
        let rec = agent.assess(&ctx).await.unwrap();
        assert_eq!(rec.priority, Priority::Medium);
        assert_eq!(rec.recommendation_type, "inflow_forecast");
        assert_eq!(rec.data["storm_detected"], false);
        assert!(!rec.can_veto);
    }

    #[tokio::test]
    async fn storm_forecast_is_high() {
        let agent = InflowForecastingAgent::new(Arc::new(Narrator::Template));
        let mut ctx = test_context(1.8, 700.0, 0.1);
        ctx.forecast.storm_detected = true;
        ctx.forecast.peak_value = 2_400.0;
        let rec = agent.assess(&ctx).await.unwrap();
        assert_eq!(rec.priority, Priority::High);
        assert_eq!(rec.data["storm_detected"], true);
    }

    #[tokio::test]
    async fn doubled_peak_is_high_without_storm_flag() {
        let agent = InflowForecastingAgent::new(Arc::new(Narrator::Template));
        let mut ctx = test_context(1.8, 400.0, 0.1);
        ctx.forecast.peak_value = 900.0;
        let rec = agent.assess(&ctx).await.unwrap();
        assert_eq!(rec.priority, Priority::High);
    }
}
