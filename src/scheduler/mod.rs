//! Scheduler module for periodic maintenance and dispatch actions.
//!
//! This module provides:
//! - **Cron parsing**: five-field expressions with ranges, steps, lists and names.
//! - **Schedule**: the validated task list loaded from `schedule.yaml`.
//! - **Registry**: action names mapped to async handlers.
//! - **Engine**: due-checks against persisted last-run times and dispatch.

mod cron;
mod engine;
mod registry;
mod schedule;

pub use cron::CronSchedule;
pub use engine::{CheckReport, DispatchOutcome, ScheduleEngine, should_run};
pub use registry::{ActionHandler, ActionRegistry};
pub use schedule::{MANUAL_PREFIX, Schedule, ScheduleFile, ScheduleTask, ScheduledTask};
