//! ---
//! psc_section: "02-hydraulic-models"
//! psc_subsection: "module"
//! psc_type: "source"
//! psc_scope: "code"
//! psc_description: "Pump physics, constraints and plant state."
//! psc_version: "v0.0.0-prealpha"
//! psc_owner: "tbd"
//! ---
//! Hydraulic plant model: pump fleet performance (affinity laws + efficiency
//! curves), the static constraint set, tunnel geometry, and the per-tick
//! system state / runtime tracking types the rest of the kernel operates on.

pub mod constraints;
pub mod errors;
pub mod pumps;
pub mod state;
pub mod tracker;
pub mod tunnel;

pub use constraints::{ConstraintSet, LevelStatus};
pub use errors::{HydraulicsError, Result};
pub use pumps::{EfficiencyCurve, PumpClass, PumpFleet, PumpPerformance, PumpSpec};
pub use state::{PumpCommand, StateError, SystemState};
pub use tracker::{PumpRuntime, RuntimeTracker};
pub use tunnel::TunnelGeometry;
