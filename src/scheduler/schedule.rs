//! Schedule declarations loaded from `schedule.yaml`

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VaultflowError};
use crate::scheduler::cron::CronSchedule;
use crate::storage::is_reserved_key;

/// Prefix under which manual runs record their last-run time
pub const MANUAL_PREFIX: &str = "manual_";

/// One declared task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleTask {
    pub name: String,
    /// Cron expression
    pub frequency: String,
    /// Registered action to dispatch
    pub action: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn default_enabled() -> bool {
    true
}

impl ScheduleTask {
    pub fn new(name: impl Into<String>, frequency: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            frequency: frequency.into(),
            action: action.into(),
            enabled: true,
            description: None,
        }
    }
}

/// On-disk shape of the schedule file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScheduleFile {
    #[serde(default)]
    pub schedule: Vec<ScheduleTask>,
}

impl ScheduleFile {
    /// Schedule written by `init`: one task per built-in action
    pub fn starter() -> Self {
        let task = |name: &str, frequency: &str, action: &str, description: &str| ScheduleTask {
            description: Some(description.to_string()),
            ..ScheduleTask::new(name, frequency, action)
        };
        Self {
            schedule: vec![
                task("morning_report", "0 8 * * *", "daily_report", "Daily summary in Accounting/"),
                task("send_queue", "*/5 * * * *", "send_emails", "Deliver approved emails"),
                task("linkedin_queue", "0 9 * * 1-5", "post_linkedin", "Publish approved posts"),
                task("email_triage", "*/15 * * * *", "process_emails", "Count email items awaiting action"),
                task("weekly_briefing", "0 10 * * SUN", "weekly_audit", "Weekly briefing in Briefings/"),
                task("hourly_health", "0 * * * *", "health_check", "Check vault folders"),
                task("log_cleanup", "0 3 * * *", "cleanup_logs", "Delete expired logs"),
            ],
        }
    }
}

/// A declared task with its parsed cron expression
#[derive(Debug, Clone)]
pub struct ScheduledTask {
    pub task: ScheduleTask,
    pub cron: CronSchedule,
}

/// Validated, ordered list of tasks
#[derive(Debug, Clone, Default)]
pub struct Schedule {
    tasks: Vec<ScheduledTask>,
}

impl Schedule {
    /// Load and validate a schedule file; a missing file is a configuration error
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(VaultflowError::Configuration(format!(
                "Schedule file not found: {}",
                path.display()
            )));
        }
        let content = fs::read_to_string(path)?;
        let schedule = Self::from_yaml(&content)?;
        info!("Loaded {} scheduled tasks from {}", schedule.len(), path.display());
        Ok(schedule)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let file: ScheduleFile = serde_yaml::from_str(content)?;
        Self::from_tasks(file.schedule)
    }

    /// Validate declarations: parsable cron, non-empty and unique names, usable as state keys
    pub fn from_tasks(tasks: Vec<ScheduleTask>) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut compiled = Vec::with_capacity(tasks.len());

        for task in tasks {
            if task.name.trim().is_empty() {
                return Err(VaultflowError::Parse("scheduled task with an empty name".to_string()));
            }
            if task.action.trim().is_empty() {
                return Err(VaultflowError::Parse(format!("task '{}' has no action", task.name)));
            }
            if is_reserved_key(&task.name) || task.name.starts_with(MANUAL_PREFIX) {
                return Err(VaultflowError::Parse(format!(
                    "task name '{}' is reserved",
                    task.name
                )));
            }
            if !seen.insert(task.name.clone()) {
                return Err(VaultflowError::Parse(format!("duplicate task name '{}'", task.name)));
            }
            let cron = CronSchedule::parse(&task.frequency)?;
            compiled.push(ScheduledTask { task, cron });
        }

        Ok(Self { tasks: compiled })
    }

    pub fn tasks(&self) -> &[ScheduledTask] {
        &self.tasks
    }

    pub fn enabled(&self) -> impl Iterator<Item = &ScheduledTask> {
        self.tasks.iter().filter(|t| t.task.enabled)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
