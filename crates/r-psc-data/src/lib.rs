//! ---
//! psc_section: "11-simulation-test-harness"
//! psc_subsection: "module"
//! psc_type: "source"
//! psc_scope: "code"
//! psc_description: "Historical dataset bindings and price outlook."
//! psc_version: "v0.0.0-prealpha"
//! psc_owner: "tbd"
//! ---
//! Historical dataset contract of the kernel: a CSV table indexed by row
//! number providing every `SystemState` field, the inflow window consumed by
//! the forecaster, and the rolling price window consumed by the cost agent.
//! A seeded synthetic generator backs tests and replay runs without a file.

pub mod dataset;
pub mod prices;

pub use dataset::{load_geometry_csv, DataError, HistoryStore};
pub use prices::{cheap_windows, expensive_windows, spread_ratio, PriceWindow};
