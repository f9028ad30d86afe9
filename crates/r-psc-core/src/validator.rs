//! ---
//! psc_section: "01-core-functionality"
//! psc_subsection: "module"
//! psc_type: "source"
//! psc_scope: "code"
//! psc_description: "Decision driver, validator and cost calculation."
//! psc_version: "v0.0.0-prealpha"
//! psc_owner: "tbd"
//! ---
use chrono::{DateTime, Utc};
use tracing::debug;

use r_psc_hydraulics::{
    ConstraintSet, PumpCommand, PumpFleet, PumpPerformance, RuntimeTracker, SystemState,
    TunnelGeometry,
};

/// Frequency reduction step when shedding flow over the cap (Hz).
const F2_REDUCTION_STEP_HZ: f64 = 0.5;

/// The sufficient-flow guard keeps the projected next-tick level at or
/// below this (m). Deliberately below the 7.2 m alarm.
const PROJECTION_CEILING_M: f64 = 7.0;

/// A final command with the performance the pump model attributes to it.
#[derive(Debug, Clone)]
pub struct ValidatedCommand {
    pub command: PumpCommand,
    pub performance: PumpPerformance,
}

/// The feasible command set plus the record of every rewrite applied.
#[derive(Debug, Clone)]
pub struct ValidatedPlan {
    pub commands: Vec<ValidatedCommand>,
    pub conflicts: Vec<String>,
}

impl ValidatedPlan {
    pub fn total_flow_m3h(&self) -> f64 {
        self.commands
            .iter()
            .filter(|c| c.command.start)
            .map(|c| c.performance.flow_m3h)
            .sum()
    }

    pub fn total_power_kw(&self) -> f64 {
        self.commands
            .iter()
            .filter(|c| c.command.start)
            .map(|c| c.performance.power_kw)
            .sum()
    }

    pub fn running(&self) -> usize {
        self.commands.iter().filter(|c| c.command.start).count()
    }
}

/// Rewrite `tentative` into a feasible command set. Never fails; every edit
/// is recorded in the returned conflicts.
///
/// Rewrites, in order: frequency clamp, min-one-pump, F2 cap, minimum
/// runtime, sufficient-flow guard. The F2 reduction never stops a pump the
/// runtime rule protects; those only lose frequency.
#[allow(clippy::too_many_arguments)]
pub fn validate(
    tentative: &[PumpCommand],
    state: &SystemState,
    tracker: &RuntimeTracker,
    fleet: &PumpFleet,
    constraints: &ConstraintSet,
    geometry: &TunnelGeometry,
    next_inflow_m3_15min: f64,
    safety_vetoed: bool,
) -> ValidatedPlan {
    let mut conflicts = Vec::new();
    let mut commands = normalize(tentative, fleet, constraints, &mut conflicts);

    ensure_min_one_pump(&mut commands, state, fleet, constraints, &mut conflicts);
    enforce_flow_cap(
        &mut commands,
        state,
        tracker,
        fleet,
        constraints,
        &mut conflicts,
    );
    enforce_min_runtime(
        &mut commands,
        state.timestamp,
        tracker,
        constraints,
        &mut conflicts,
    );
    // Runtime holds can push the total back over the cap; shed frequency
    // again without stopping anything that must keep running.
    enforce_flow_cap(
        &mut commands,
        state,
        tracker,
        fleet,
        constraints,
        &mut conflicts,
    );
    sufficient_flow_guard(
        &mut commands,
        state,
        fleet,
        constraints,
        geometry,
        next_inflow_m3_15min,
        safety_vetoed,
        &mut conflicts,
    );

    let commands = commands
        .into_iter()
        .map(|command| {
            let performance = if command.start {
                fleet
                    .performance(&command.pump_id, command.frequency_hz, state.l1_m)
                    .unwrap_or(PumpPerformance::STOPPED)
            } else {
                PumpPerformance::STOPPED
            };
            ValidatedCommand {
                command,
                performance,
            }
        })
        .collect();

    if !conflicts.is_empty() {
        debug!(rewrites = ?conflicts, "validator rewrote tentative commands");
    }
    ValidatedPlan {
        commands,
        conflicts,
    }
}

/// One well-formed command per fleet pump: unknown ids are dropped, missing
/// pumps stop, degenerate frequencies stop the pump, low/high frequencies
/// clamp into the band.
fn normalize(
    tentative: &[PumpCommand],
    fleet: &PumpFleet,
    constraints: &ConstraintSet,
    conflicts: &mut Vec<String>,
) -> Vec<PumpCommand> {
    for cmd in tentative {
        if fleet.spec(&cmd.pump_id).is_err() {
            conflicts.push(format!("unknown_pump_dropped:{}", cmd.pump_id));
        }
    }
    fleet
        .pump_ids()
        .map(|id| {
            let Some(cmd) = tentative.iter().find(|c| c.pump_id == id) else {
                return PumpCommand::stop(id);
            };
            if !cmd.start {
                return PumpCommand::stop(id);
            }
            if !cmd.frequency_hz.is_finite() || cmd.frequency_hz <= 0.0 {
                conflicts.push(format!("degenerate_frequency_stopped:{}", id));
                return PumpCommand::stop(id);
            }
            let clamped = cmd
                .frequency_hz
                .clamp(constraints.freq_min_hz, constraints.freq_nominal_hz);
            if clamped != cmd.frequency_hz {
                conflicts.push(format!("frequency_clamped:{}", id));
            }
            PumpCommand::run(id, clamped)
        })
        .collect()
}

fn ensure_min_one_pump(
    commands: &mut [PumpCommand],
    state: &SystemState,
    fleet: &PumpFleet,
    constraints: &ConstraintSet,
    conflicts: &mut Vec<String>,
) {
    if commands.iter().any(|c| c.start) {
        return;
    }
    let Some(best) = fleet.most_efficient(state.l1_m, constraints.freq_min_hz) else {
        return;
    };
    if let Some(cmd) = commands.iter_mut().find(|c| c.pump_id == best) {
        *cmd = PumpCommand::run(best, constraints.freq_min_hz);
        conflicts.push("min_one_pump_forced".to_owned());
    }
}

/// Reduce the least-efficient running pump in 0.5 Hz steps down to the band
/// floor, then stop it, until the total flow fits under the cap. Protected
/// pumps (runtime rule) and the last running pump are never stopped.
fn enforce_flow_cap(
    commands: &mut [PumpCommand],
    state: &SystemState,
    tracker: &RuntimeTracker,
    fleet: &PumpFleet,
    constraints: &ConstraintSet,
    conflicts: &mut Vec<String>,
) {
    loop {
        let total = plan_flow(commands, fleet, state.l1_m);
        if total <= constraints.f2_max_m3h {
            return;
        }
        // Least efficient running pump that can still give something up.
        let running_ids: Vec<String> = commands
            .iter()
            .filter(|c| c.start)
            .map(|c| c.pump_id.clone())
            .collect();
        let running_refs: Vec<&str> = running_ids.iter().map(String::as_str).collect();
        let ranked =
            fleet.ranked_by_efficiency(state.l1_m, constraints.freq_min_hz, Some(&running_refs));
        let mut acted = false;
        for victim in ranked.iter().rev() {
            let protected =
                tracker.must_keep_running(victim, state.timestamp, constraints);
            let last_running = running_ids.len() <= constraints.min_active_pumps;
            let Some(cmd) = commands.iter_mut().find(|c| &c.pump_id == victim) else {
                continue;
            };
            if cmd.frequency_hz > constraints.freq_min_hz {
                cmd.frequency_hz = (cmd.frequency_hz - F2_REDUCTION_STEP_HZ)
                    .max(constraints.freq_min_hz);
                conflicts.push(format!(
                    "F2_EXCEEDED:reduced {} to {:.1} Hz",
                    victim, cmd.frequency_hz
                ));
                acted = true;
                break;
            }
            if !protected && !last_running {
                *cmd = PumpCommand::stop(victim.clone());
                conflicts.push(format!("F2_EXCEEDED:stopped {}", victim));
                acted = true;
                break;
            }
        }
        if !acted {
            // Everything left is protected at band floor; nothing legal
            // remains to shed.
            conflicts.push("F2_EXCEEDED:unresolvable_under_runtime_holds".to_owned());
            return;
        }
    }
}

/// A running pump under its minimum runtime may not be stopped by this
/// decision; it keeps running at its previous frequency, clipped.
fn enforce_min_runtime(
    commands: &mut [PumpCommand],
    now: DateTime<Utc>,
    tracker: &RuntimeTracker,
    constraints: &ConstraintSet,
    conflicts: &mut Vec<String>,
) {
    for cmd in commands.iter_mut() {
        if cmd.start || !tracker.must_keep_running(&cmd.pump_id, now, constraints) {
            continue;
        }
        let previous = tracker
            .pump(&cmd.pump_id)
            .map(|rt| rt.frequency_hz)
            .filter(|f| f.is_finite() && *f > 0.0)
            .unwrap_or(constraints.freq_min_hz)
            .clamp(constraints.freq_min_hz, constraints.freq_nominal_hz);
        conflicts.push(format!("runtime_hold:{}", cmd.pump_id));
        *cmd = PumpCommand::run(cmd.pump_id.clone(), previous);
    }
}

/// If the projected next-tick level would exceed the ceiling and safety has
/// not already dictated the plan, start the next-best stopped pump at
/// nominal frequency until the projection clears or the fleet is exhausted.
#[allow(clippy::too_many_arguments)]
fn sufficient_flow_guard(
    commands: &mut [PumpCommand],
    state: &SystemState,
    fleet: &PumpFleet,
    constraints: &ConstraintSet,
    geometry: &TunnelGeometry,
    next_inflow_m3_15min: f64,
    safety_vetoed: bool,
    conflicts: &mut Vec<String>,
) {
    if safety_vetoed {
        return;
    }
    loop {
        let outflow = plan_flow(commands, fleet, state.l1_m);
        let projected_v = (state.v_m3 + next_inflow_m3_15min - outflow * 0.25).max(0.0);
        if geometry.volume_to_level(projected_v) <= PROJECTION_CEILING_M {
            return;
        }
        let stopped: Vec<&str> = commands
            .iter()
            .filter(|c| !c.start)
            .map(|c| c.pump_id.as_str())
            .collect();
        if stopped.is_empty() {
            return;
        }
        let Some(next_best) = fleet
            .ranked_by_efficiency(state.l1_m, constraints.freq_nominal_hz, Some(&stopped))
            .into_iter()
            .next()
        else {
            return;
        };
        if let Some(cmd) = commands.iter_mut().find(|c| c.pump_id == next_best) {
            *cmd = PumpCommand::run(next_best.clone(), constraints.freq_nominal_hz);
            conflicts.push(format!("insufficient_flow:started {}", next_best));
        } else {
            return;
        }
    }
}

fn plan_flow(commands: &[PumpCommand], fleet: &PumpFleet, l1_m: f64) -> f64 {
    commands
        .iter()
        .filter(|c| c.start)
        .filter_map(|c| fleet.performance(&c.pump_id, c.frequency_hz, l1_m).ok())
        .map(|perf| perf.flow_m3h)
        .sum()
}
