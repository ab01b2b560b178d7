//! Workflow layer: the orchestrator, the roles built on it and the scheduled actions

mod actions;
mod orchestrator;
pub mod report;
mod roles;

pub use actions::{BUILTIN_ACTIONS, DrainAction, HealthCheckAction, builtin_registry};
pub use orchestrator::{DrainReport, Workflow};
pub use roles::{Drainer, Producer};
