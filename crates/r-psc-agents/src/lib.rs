//! ---
//! psc_section: "05-agent-reasoning"
//! psc_subsection: "module"
//! psc_type: "source"
//! psc_scope: "code"
//! psc_description: "Specialist agents and coordinator synthesis."
//! psc_version: "v0.0.0-prealpha"
//! psc_owner: "tbd"
//! ---
//! The multi-agent layer of the kernel: six independent specialists that each
//! turn the shared per-tick context into one [`Recommendation`], and the
//! coordinator that synthesises those recommendations into tentative pump
//! commands under a strict priority hierarchy.
//!
//! Every machine-consumed quantity is computed in code and placed in a
//! recommendation's `data`; the optional LLM produces narrative text only and
//! is never parsed for control values (the coordinator's LLM synthesis being
//! the one exception, and it falls back to the deterministic algorithm on any
//! parse failure).

pub mod compliance;
pub mod context;
pub mod coordinator;
pub mod cost;
pub mod efficiency;
pub mod inflow;
pub mod llm;
pub mod recommendation;
pub mod safety;
pub mod smoothness;

use std::sync::Arc;

use async_trait::async_trait;

pub use context::AssessmentContext;
pub use coordinator::{Coordinator, CoordinatorOutcome};
pub use llm::{LlmClient, Narrator};
pub use recommendation::{Priority, Recommendation};

/// The single capability every specialist implements.
#[async_trait]
pub trait Specialist: Send + Sync {
    fn name(&self) -> &'static str;

    /// Produce exactly one recommendation over the shared context. Transient
    /// reasoning failures are absorbed inside the agent; errors returned here
    /// are replaced by a neutral stub at the driver boundary.
    async fn assess(&self, ctx: &AssessmentContext) -> anyhow::Result<Recommendation>;
}

/// The six specialists in registry order. The coordinator never relies on
/// this order for arrival; it is only the fan-out order.
pub fn specialist_registry(narrator: Arc<Narrator>) -> Vec<Arc<dyn Specialist>> {
    vec![
        Arc::new(inflow::InflowForecastingAgent::new(narrator.clone())),
        Arc::new(cost::EnergyCostAgent::new(narrator.clone())),
        Arc::new(efficiency::PumpEfficiencyAgent::new(narrator.clone())),
        Arc::new(safety::WaterLevelSafetyAgent::new(narrator.clone())),
        Arc::new(smoothness::FlowSmoothnessAgent::new(narrator.clone())),
        Arc::new(compliance::ConstraintComplianceAgent::new(narrator)),
    ]
}
