//! ---
//! psc_section: "02-hydraulic-models"
//! psc_subsection: "module"
//! psc_type: "source"
//! psc_scope: "code"
//! psc_description: "Pump physics, constraints and plant state."
//! psc_version: "v0.0.0-prealpha"
//! psc_owner: "tbd"
//! ---
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::constraints::ConstraintSet;
use crate::state::PumpCommand;

/// Runtime bookkeeping for one pump.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PumpRuntime {
    pub running: bool,
    /// Last commanded frequency while running (Hz).
    pub frequency_hz: f64,
    pub started_at: Option<DateTime<Utc>>,
    pub cumulative_runtime_secs: u64,
}

/// Process-scoped mutable state of the kernel. Owned by the decision driver;
/// every other stage sees a frozen clone. Mutated exactly once per committed
/// decision, strictly after the pure stages succeed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeTracker {
    pumps: IndexMap<String, PumpRuntime>,
    pub last_empty_below_target_at: Option<DateTime<Utc>>,
}

impl RuntimeTracker {
    pub fn new(pump_ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            pumps: pump_ids
                .into_iter()
                .map(|id| (id.into(), PumpRuntime::default()))
                .collect(),
            last_empty_below_target_at: None,
        }
    }

    pub fn pump(&self, pump_id: &str) -> Option<&PumpRuntime> {
        self.pumps.get(pump_id)
    }

    pub fn pumps(&self) -> impl Iterator<Item = (&str, &PumpRuntime)> {
        self.pumps.iter().map(|(id, rt)| (id.as_str(), rt))
    }

    pub fn running_ids(&self) -> Vec<String> {
        self.pumps
            .iter()
            .filter(|(_, rt)| rt.running)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn running_count(&self) -> usize {
        self.pumps.values().filter(|rt| rt.running).count()
    }

    /// Hours a running pump has been on since its last start.
    pub fn runtime_hours(&self, pump_id: &str, now: DateTime<Utc>) -> f64 {
        match self.pumps.get(pump_id) {
            Some(rt) if rt.running => rt
                .started_at
                .map(|started| (now - started).num_seconds().max(0) as f64 / 3600.0)
                .unwrap_or(0.0),
            _ => 0.0,
        }
    }

    /// Whether the minimum-runtime rule forbids stopping this pump now.
    pub fn must_keep_running(
        &self,
        pump_id: &str,
        now: DateTime<Utc>,
        constraints: &ConstraintSet,
    ) -> bool {
        match self.pumps.get(pump_id) {
            Some(rt) if rt.running => {
                self.runtime_hours(pump_id, now) < constraints.min_runtime.as_secs_f64() / 3600.0
            }
            _ => false,
        }
    }

    /// Apply one committed decision. For each pump: `false→true` stamps
    /// `started_at`, `true→true` accrues one tick of runtime, `true→false`
    /// resets. A tick observing the tunnel below the emptying target
    /// refreshes the rolling-emptying clock.
    pub fn commit(
        &mut self,
        commands: &[PumpCommand],
        now: DateTime<Utc>,
        l1_m: f64,
        constraints: &ConstraintSet,
    ) {
        for cmd in commands {
            let Some(rt) = self.pumps.get_mut(&cmd.pump_id) else {
                continue;
            };
            match (rt.running, cmd.start) {
                (false, true) => {
                    rt.running = true;
                    rt.started_at = Some(now);
                    rt.frequency_hz = cmd.frequency_hz;
                }
                (true, true) => {
                    rt.cumulative_runtime_secs += 900;
                    rt.frequency_hz = cmd.frequency_hz;
                }
                (true, false) => {
                    rt.running = false;
                    rt.started_at = None;
                    rt.frequency_hz = 0.0;
                }
                (false, false) => {}
            }
        }
        if l1_m < constraints.l1_empty_target_m {
            self.last_empty_below_target_at = Some(now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 6, 0, 0).unwrap()
    }

    fn tracker() -> RuntimeTracker {
        RuntimeTracker::new(["1.1", "1.2"])
    }

    #[test]
    fn start_transition_stamps_started_at() {
        let constraints = ConstraintSet::default();
        let mut t = tracker();
        t.commit(&[PumpCommand::run("1.2", 49.0)], now(), 2.0, &constraints);
        let rt = t.pump("1.2").unwrap();
        assert!(rt.running);
        assert_eq!(rt.started_at, Some(now()));
        assert_eq!(rt.cumulative_runtime_secs, 0);
    }

    #[test]
    fn steady_running_accrues_one_tick() {
        let constraints = ConstraintSet::default();
        let mut t = tracker();
        t.commit(&[PumpCommand::run("1.2", 49.0)], now(), 2.0, &constraints);
        t.commit(
            &[PumpCommand::run("1.2", 48.5)],
            now() + chrono::Duration::minutes(15),
            2.0,
            &constraints,
        );
        let rt = t.pump("1.2").unwrap();
        assert_eq!(rt.cumulative_runtime_secs, 900);
        assert_eq!(rt.frequency_hz, 48.5);
    }

    #[test]
    fn stop_transition_resets() {
        let constraints = ConstraintSet::default();
        let mut t = tracker();
        t.commit(&[PumpCommand::run("1.1", 47.8)], now(), 2.0, &constraints);
        t.commit(&[PumpCommand::stop("1.1")], now(), 2.0, &constraints);
        let rt = t.pump("1.1").unwrap();
        assert!(!rt.running);
        assert_eq!(rt.started_at, None);
        assert_eq!(rt.frequency_hz, 0.0);
    }

    #[test]
    fn min_runtime_rule() {
        let constraints = ConstraintSet::default();
        let mut t = tracker();
        t.commit(&[PumpCommand::run("1.2", 50.0)], now(), 2.0, &constraints);
        let after_90min = now() + chrono::Duration::minutes(90);
        assert!(t.must_keep_running("1.2", after_90min, &constraints));
        let after_3h = now() + chrono::Duration::hours(3);
        assert!(!t.must_keep_running("1.2", after_3h, &constraints));
        assert!(!t.must_keep_running("1.1", after_90min, &constraints));
    }

    #[test]
    fn emptying_clock_refreshes_below_target() {
        let constraints = ConstraintSet::default();
        let mut t = tracker();
        t.commit(&[], now(), 0.4, &constraints);
        assert_eq!(t.last_empty_below_target_at, Some(now()));
        t.commit(&[], now() + chrono::Duration::hours(1), 2.0, &constraints);
        assert_eq!(t.last_empty_below_target_at, Some(now()));
    }
}
