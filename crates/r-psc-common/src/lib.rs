//! ---
//! psc_section: "01-core-functionality"
//! psc_subsection: "module"
//! psc_type: "source"
//! psc_scope: "code"
//! psc_description: "Shared primitives and utilities for the decision kernel."
//! psc_version: "v0.0.0-prealpha"
//! psc_owner: "tbd"
//! ---
//! Configuration, logging and tick-time primitives shared across R-PSC crates.

pub mod config;
pub mod logging;
pub mod time;

pub use config::{PscConfig, Scenario};
pub use logging::{init_tracing, LogFormat};
