//! ---
//! psc_section: "01-core-functionality"
//! psc_subsection: "module"
//! psc_type: "source"
//! psc_scope: "code"
//! psc_description: "Decision driver, validator and cost calculation."
//! psc_version: "v0.0.0-prealpha"
//! psc_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{info, warn};

use r_psc_agents::{
    specialist_registry, AssessmentContext, Coordinator, CoordinatorOutcome, Narrator,
    Recommendation, Specialist,
};
use r_psc_common::config::{PscConfig, Scenario};
use r_psc_data::{load_geometry_csv, DataError, HistoryStore};
use r_psc_forecast::{ForecastSnapshot, InflowForecaster};
use r_psc_hydraulics::{
    ConstraintSet, PumpCommand, PumpFleet, RuntimeTracker, StateError, SystemState,
    TunnelGeometry,
};
use r_psc_metrics::KernelMetrics;

use crate::costing;
use crate::decision::{AgentMessage, Decision};
use crate::validator;

/// Synthetic-dataset fallback size: two weeks of ticks.
const SYNTHETIC_ROWS: usize = 1_344;
const SYNTHETIC_SEED: u64 = 0xA11CE;

/// Price horizon handed to the cost agent (steps).
const PRICE_HORIZON_STEPS: usize = 96;

#[derive(Debug, Error)]
pub enum DriverError {
    /// The only error class that escapes `decide`.
    #[error("invalid system state: {0}")]
    InvalidState(#[from] StateError),
}

/// Aggregates of the previously committed decision, kept for trend checks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreviousSummary {
    pub running_pumps: usize,
    pub aggregate_frequency_hz: f64,
    pub total_flow_m3h: f64,
}

/// The decision kernel: owns the immutable models, the specialist registry,
/// the coordinator and the single mutable `RuntimeTracker`.
///
/// `decide` is serialised by an internal tick gate; at most one tick is in
/// flight per process. All stages before the tracker commit are pure over
/// the tracker snapshot, so a kill mid-tick leaves the tracker unchanged.
pub struct DecisionKernel {
    fleet: Arc<PumpFleet>,
    constraints: ConstraintSet,
    geometry: Arc<TunnelGeometry>,
    forecaster: Option<Arc<InflowForecaster>>,
    history: Arc<HistoryStore>,
    specialists: Vec<Arc<dyn Specialist>>,
    coordinator: Coordinator,
    fallback_coordinator: Coordinator,
    scenario: Scenario,
    assess_deadline: Duration,
    coordinator_deadline: Duration,
    tracker: Mutex<RuntimeTracker>,
    previous: Mutex<Option<PreviousSummary>>,
    tick_gate: tokio::sync::Mutex<()>,
    metrics: Option<KernelMetrics>,
}

impl DecisionKernel {
    /// Wire a kernel from parts. `forecaster = None` degrades every tick to
    /// a persistence forecast.
    pub fn new(
        history: Arc<HistoryStore>,
        forecaster: Option<Arc<InflowForecaster>>,
        geometry: Arc<TunnelGeometry>,
        narrator: Arc<Narrator>,
        config: &PscConfig,
        metrics: Option<KernelMetrics>,
    ) -> Self {
        let fleet = Arc::new(PumpFleet::default_station());
        let tracker = RuntimeTracker::new(fleet.pump_ids().map(str::to_owned));
        Self {
            specialists: specialist_registry(narrator.clone()),
            coordinator: Coordinator::new(narrator),
            fallback_coordinator: Coordinator::new(Arc::new(Narrator::Template)),
            constraints: ConstraintSet::default(),
            scenario: config.scenario,
            assess_deadline: config.agents.assess_deadline,
            coordinator_deadline: config.agents.coordinator_deadline,
            tracker: Mutex::new(tracker),
            previous: Mutex::new(None),
            tick_gate: tokio::sync::Mutex::new(()),
            fleet,
            geometry,
            forecaster,
            history,
            metrics,
        }
    }

    /// Build the kernel from configuration: dataset, geometry and model
    /// artifact from their configured paths, with synthetic/built-in
    /// fallbacks for replay and development.
    pub fn from_config(config: &PscConfig, metrics: Option<KernelMetrics>) -> anyhow::Result<Self> {
        let history = match &config.station.dataset_path {
            Some(path) => Arc::new(HistoryStore::from_csv(path)?),
            None => {
                warn!("no dataset configured; using the synthetic history");
                Arc::new(HistoryStore::synthetic(SYNTHETIC_ROWS, SYNTHETIC_SEED))
            }
        };
        let geometry = match &config.station.geometry_path {
            Some(path) => Arc::new(TunnelGeometry::from_points(load_geometry_csv(path)?)?),
            None => Arc::new(TunnelGeometry::default()),
        };
        let forecaster = match &config.station.forecaster_model_path {
            Some(path) => Some(Arc::new(InflowForecaster::from_path(path)?)),
            None => {
                warn!("no forecaster model configured; persistence forecasts only");
                None
            }
        };
        let narrator = Arc::new(Narrator::from_config(&config.llm));
        Ok(Self::new(
            history, forecaster, geometry, narrator, config, metrics,
        ))
    }

    pub fn fleet(&self) -> &PumpFleet {
        &self.fleet
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn previous_summary(&self) -> Option<PreviousSummary> {
        *self.previous.lock()
    }

    pub fn tracker_snapshot(&self) -> RuntimeTracker {
        self.tracker.lock().clone()
    }

    /// Read the historical state at `index` under the bound scenario.
    pub fn state_at(&self, index: usize) -> Result<SystemState, DataError> {
        self.history.state_at(index, self.scenario)
    }

    /// Execute one control tick. For any valid state this returns a feasible
    /// decision; every internal failure is absorbed on the way.
    pub async fn decide(&self, state: SystemState) -> Result<Decision, DriverError> {
        state.validate()?;
        let _gate = self.tick_gate.lock().await;
        let started = Instant::now();

        let tracker_snapshot = self.tracker.lock().clone();
        let forecast = self.run_forecast(&state);
        let prices_24h =
            self.history
                .price_window(state.history_index, PRICE_HORIZON_STEPS, state.price_scenario);

        let ctx = Arc::new(AssessmentContext {
            state: state.clone(),
            forecast: forecast.clone(),
            prices_24h,
            fleet: self.fleet.clone(),
            constraints: self.constraints,
            geometry: self.geometry.clone(),
            tracker: tracker_snapshot,
        });

        let recommendations = self.fan_out(&ctx).await;
        let outcome = self.synthesize(&ctx, &recommendations).await;

        let safety_vetoed = recommendations
            .iter()
            .any(|r| r.agent_name == "water_level_safety" && r.is_critical_veto());
        let mut plan = validator::validate(
            &outcome.commands,
            &state,
            &ctx.tracker,
            &self.fleet,
            &self.constraints,
            &self.geometry,
            forecast.inflow_at(0),
            safety_vetoed,
        );

        let cost = costing::cost_calculation(&plan, state.electricity_price_eur_kwh);
        let violations = costing::check_violations(&state, &plan, &self.constraints);

        let mut conflicts = outcome.conflicts_resolved;
        conflicts.append(&mut plan.conflicts);
        if let Some(metrics) = &self.metrics {
            for conflict in &conflicts {
                let kind = conflict.split(':').next().unwrap_or(conflict);
                metrics.record_rewrite(kind);
            }
            metrics.observe_decision(started.elapsed().as_secs_f64(), cost.cost_eur);
        }

        let final_commands: Vec<PumpCommand> = plan
            .commands
            .iter()
            .map(|v| v.command.clone())
            .collect();

        // The single mutation of the tick, committed only now that every
        // stage has succeeded.
        {
            let mut tracker = self.tracker.lock();
            tracker.commit(
                &final_commands,
                state.timestamp,
                state.l1_m,
                &self.constraints,
            );
        }
        let summary = PreviousSummary {
            running_pumps: plan.running(),
            aggregate_frequency_hz: plan
                .commands
                .iter()
                .filter(|c| c.command.start)
                .map(|c| c.command.frequency_hz)
                .sum(),
            total_flow_m3h: plan.total_flow_m3h(),
        };
        *self.previous.lock() = Some(summary);

        info!(
            tick = state.history_index,
            l1_m = state.l1_m,
            running = summary.running_pumps,
            flow_m3h = summary.total_flow_m3h,
            cost_eur = cost.cost_eur,
            priority = %outcome.priority_applied,
            conflicts = conflicts.len(),
            latency_ms = started.elapsed().as_millis() as u64,
            "decision committed"
        );

        Ok(Decision {
            timestamp: state.timestamp,
            pump_commands: plan.commands.iter().map(Into::into).collect(),
            coordinator_reasoning: outcome.reasoning,
            priority_applied: outcome.priority_applied,
            conflicts_resolved: conflicts,
            confidence: outcome.confidence,
            cost_calculation: cost,
            constraint_violations: violations,
            agent_messages: recommendations.iter().map(AgentMessage::from).collect(),
            system_state: state,
        })
    }

    fn run_forecast(&self, state: &SystemState) -> ForecastSnapshot {
        match &self.forecaster {
            Some(forecaster) => {
                forecaster.forecast(&self.history.inflow_series(), state.history_index)
            }
            None => ForecastSnapshot::persistence(state.f1_m3_15min),
        }
    }

    /// Run the six specialists concurrently, each under its own deadline.
    /// Timeouts and failures become neutral stubs; siblings are unaffected.
    /// Results are reassembled in registry order so downstream output never
    /// depends on arrival order.
    async fn fan_out(&self, ctx: &Arc<AssessmentContext>) -> Vec<Recommendation> {
        let mut tasks: JoinSet<(usize, Option<Recommendation>)> = JoinSet::new();
        for (slot, specialist) in self.specialists.iter().enumerate() {
            let specialist = specialist.clone();
            let ctx = ctx.clone();
            let deadline = self.assess_deadline;
            tasks.spawn(async move {
                let result = tokio::time::timeout(deadline, specialist.assess(&ctx)).await;
                match result {
                    Ok(Ok(rec)) => (slot, Some(rec)),
                    Ok(Err(_)) | Err(_) => (slot, None),
                }
            });
        }

        let mut slots: Vec<Option<Recommendation>> = vec![None; self.specialists.len()];
        while let Some(joined) = tasks.join_next().await {
            if let Ok((slot, rec)) = joined {
                slots[slot] = rec;
            }
        }
        self.specialists
            .iter()
            .zip(slots)
            .map(|(specialist, slot)| {
                slot.unwrap_or_else(|| {
                    warn!(agent = specialist.name(), "specialist replaced by stub");
                    if let Some(metrics) = &self.metrics {
                        metrics.record_agent_timeout(specialist.name());
                    }
                    Recommendation::timeout_stub(specialist.name())
                })
            })
            .collect()
    }

    async fn synthesize(
        &self,
        ctx: &Arc<AssessmentContext>,
        recommendations: &[Recommendation],
    ) -> CoordinatorOutcome {
        match tokio::time::timeout(
            self.coordinator_deadline,
            self.coordinator.synthesize(ctx, recommendations),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!("coordinator missed its deadline; deterministic fallback");
                let mut outcome = self
                    .fallback_coordinator
                    .synthesize(ctx, recommendations)
                    .await;
                outcome
                    .conflicts_resolved
                    .push("coordinator_timeout_fallback".to_owned());
                outcome
            }
        }
    }
}
