//! ---
//! psc_section: "08-energy-models-optimization"
//! psc_subsection: "module"
//! psc_type: "source"
//! psc_scope: "code"
//! psc_description: "Inflow forecasting model inference."
//! psc_version: "v0.0.0-prealpha"
//! psc_owner: "tbd"
//! ---
//! Inflow forecasting for the decision kernel.
//!
//! A sequence model trained offline predicts the next six hours of tunnel
//! inflow from a 12-hour window of history plus calendar features; the
//! 24-hour horizon is produced by recursive application over the model's own
//! output. Only inference lives here; the weight artifact is a single JSON
//! file loaded at start-up. Inference never fails hard: a window that is too
//! short, or an artifact whose shapes do not line up, degrades to a
//! persistence forecast with low confidence.

pub mod features;
pub mod model;
pub mod snapshot;

pub use model::{InflowForecaster, ModelArtifact};
pub use snapshot::{ForecastSnapshot, InflowSeries, Trend};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ForecastError>;

#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("weight artifact error: {0}")]
    Artifact(#[from] serde_json::Error),
    #[error("weight artifact shape mismatch: {0}")]
    Shape(String),
}
