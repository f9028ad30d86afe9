//! ---
//! psc_section: "02-hydraulic-models"
//! psc_subsection: "module"
//! psc_type: "source"
//! psc_scope: "code"
//! psc_description: "Pump physics, constraints and plant state."
//! psc_version: "v0.0.0-prealpha"
//! psc_owner: "tbd"
//! ---
use thiserror::Error;

pub type Result<T> = std::result::Result<T, HydraulicsError>;

#[derive(Debug, Error)]
pub enum HydraulicsError {
    #[error("pump '{0}' is not part of the fleet")]
    UnknownPump(String),
    #[error("frequency {0} Hz outside the allowed band (0, or 47.8 to 50.0)")]
    FrequencyOutOfBand(f64),
    #[error("tunnel geometry requires at least two monotonic points")]
    DegenerateGeometry,
}
