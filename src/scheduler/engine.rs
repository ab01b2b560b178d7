//! Schedule engine: decides which tasks are due and dispatches their actions.
//!
//! Per task there are two states. A task that never ran fires only when a check lands
//! exactly on one of its occurrences. A task with a recorded `last_run` is due once the
//! first occurrence after `last_run` has passed; `last_run` then moves to the check time,
//! so any further missed occurrences are absorbed into that single run.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use log::{error, info, warn};

use crate::clock::truncate_to_minute;
use crate::daemon::Tick;
use crate::error::Result;
use crate::scheduler::cron::CronSchedule;
use crate::scheduler::registry::ActionRegistry;
use crate::scheduler::schedule::{MANUAL_PREFIX, Schedule, ScheduledTask};
use crate::storage::StateStore;

/// Whether a task with this cron and last run is due at `now`
pub fn should_run(cron: &CronSchedule, last_run: Option<NaiveDateTime>, now: NaiveDateTime) -> bool {
    match last_run {
        None => cron.prev_at_or_before(now) == Some(now),
        Some(last) => cron.next_after(last).is_some_and(|next| next <= now),
    }
}

/// What happened when an action was dispatched
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Handler ran to completion
    Completed,
    /// No handler registered under that name; treated as a no-op
    Unknown,
    /// Handler returned an error
    Failed(String),
}

impl DispatchOutcome {
    /// Whether the run should be recorded as the task's last run
    pub fn counts_as_run(&self) -> bool {
        !matches!(self, DispatchOutcome::Failed(_))
    }
}

/// Result of one schedule check
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CheckReport {
    /// Tasks whose run was recorded
    pub ran: Vec<String>,
    /// Tasks whose handler failed; they stay due
    pub failed: Vec<String>,
}

impl CheckReport {
    pub fn total(&self) -> usize {
        self.ran.len() + self.failed.len()
    }
}

/// Schedule, last-run state and action handlers for one scheduler process
#[derive(Debug)]
pub struct ScheduleEngine {
    schedule: Schedule,
    state: StateStore,
    actions: ActionRegistry,
}

impl ScheduleEngine {
    pub fn new(schedule: Schedule, state: StateStore, actions: ActionRegistry) -> Self {
        Self {
            schedule,
            state,
            actions,
        }
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub fn state(&self) -> &StateStore {
        &self.state
    }

    pub fn actions(&self) -> &ActionRegistry {
        &self.actions
    }

    pub fn last_run(&self, task: &str) -> Option<NaiveDateTime> {
        self.state.get_last_run(task)
    }

    /// Whether a declared task is due at `now`
    pub fn is_due(&self, task: &ScheduledTask, now: NaiveDateTime) -> bool {
        should_run(&task.cron, self.last_run(&task.task.name), now)
    }

    /// When the task will next be due, as seen from `now`
    pub fn next_due(&self, task: &ScheduledTask, now: NaiveDateTime) -> Option<NaiveDateTime> {
        match self.last_run(&task.task.name) {
            Some(last) => task.cron.next_after(last),
            None => {
                let now = truncate_to_minute(now);
                if task.cron.prev_at_or_before(now) == Some(now) {
                    Some(now)
                } else {
                    task.cron.next_after(now)
                }
            }
        }
    }

    /// Run the handler registered for `action`
    pub async fn dispatch(&self, action: &str, now: NaiveDateTime) -> DispatchOutcome {
        let Some(handler) = self.actions.get(action) else {
            warn!("Unknown action: {}", action);
            return DispatchOutcome::Unknown;
        };

        info!("Running action: {}", action);
        match handler.run(now).await {
            Ok(()) => {
                info!("Completed action: {}", action);
                DispatchOutcome::Completed
            }
            Err(e) => {
                error!("Error running action {}: {}", action, e);
                DispatchOutcome::Failed(e.to_string())
            }
        }
    }

    /// Run every enabled task that is due at `now`, recording each run immediately
    pub async fn check(&mut self, now: NaiveDateTime) -> CheckReport {
        let due: Vec<(String, String)> = self
            .schedule
            .enabled()
            .filter(|task| self.is_due(task, now))
            .map(|task| (task.task.name.clone(), task.task.action.clone()))
            .collect();

        let mut report = CheckReport::default();
        for (name, action) in due {
            info!("Task '{}' is due to run", name);
            let outcome = self.dispatch(&action, now).await;
            if outcome.counts_as_run() {
                self.record(&name, now);
                report.ran.push(name);
            } else {
                report.failed.push(name);
            }
        }
        report
    }

    /// Run one action immediately, outside the schedule
    ///
    /// The run is recorded under `manual_<action>` so it never shifts a scheduled
    /// task's cadence.
    pub async fn run_manual(&mut self, action: &str, now: NaiveDateTime) -> DispatchOutcome {
        let outcome = self.dispatch(action, now).await;
        if outcome.counts_as_run() {
            self.record(&format!("{}{}", MANUAL_PREFIX, action), now);
        }
        outcome
    }

    fn record(&mut self, task: &str, at: NaiveDateTime) {
        if let Err(e) = self.state.set_last_run(task, at) {
            error!("Failed to persist last run of '{}': {}", task, e);
        }
    }
}

#[async_trait]
impl Tick for ScheduleEngine {
    fn name(&self) -> &str {
        "scheduler"
    }

    async fn tick(&mut self, now: NaiveDateTime) -> Result<usize> {
        let report = self.check(truncate_to_minute(now)).await;
        Ok(report.total())
    }
}
