//! ---
//! psc_section: "01-core-functionality"
//! psc_subsection: "module"
//! psc_type: "source"
//! psc_scope: "code"
//! psc_description: "Decision driver, validator and cost calculation."
//! psc_version: "v0.0.0-prealpha"
//! psc_owner: "tbd"
//! ---
//! The kernel's spine: the tick driver (`decide`), the feasibility validator
//! that rewrites any tentative command set into a legal one, the cost and
//! violation calculator, and the bit-significant `Decision` wire shape.

pub mod costing;
pub mod decision;
pub mod driver;
pub mod validator;

pub use decision::{AgentMessage, ConstraintViolation, CostCalculation, Decision, PumpCommandRecord};
pub use driver::{DecisionKernel, DriverError};
pub use validator::{validate, ValidatedCommand, ValidatedPlan};
