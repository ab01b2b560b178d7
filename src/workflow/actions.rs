//! Built-in scheduled actions

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use log::{info, warn};

use crate::config::{Config, SUPPORT_DIRS};
use crate::domain::{Lane, Stage};
use crate::error::Result;
use crate::external::Sender;
use crate::scheduler::{ActionHandler, ActionRegistry};
use crate::workflow::orchestrator::Workflow;
use crate::workflow::report;

/// Names of every built-in action
pub const BUILTIN_ACTIONS: [&str; 7] = [
    "send_emails",
    "post_linkedin",
    "daily_report",
    "weekly_audit",
    "health_check",
    "cleanup_logs",
    "process_emails",
];

/// Drains a ready lane, or lists it when no sender is configured for it
pub struct DrainAction {
    workflow: Arc<Workflow>,
    lane: Lane,
    sender: Option<Arc<dyn Sender>>,
}

impl DrainAction {
    pub fn new(workflow: Arc<Workflow>, lane: Lane, sender: Option<Arc<dyn Sender>>) -> Self {
        Self { workflow, lane, sender }
    }
}

#[async_trait]
impl ActionHandler for DrainAction {
    async fn run(&self, now: NaiveDateTime) -> Result<()> {
        let Some(sender) = &self.sender else {
            let items = self.workflow.consume_ready(&self.lane)?;
            if items.is_empty() {
                info!("Nothing ready in {}", self.lane);
            }
            for item in items {
                info!("Ready in {} (no sender configured): {}", self.lane, item.file_name());
            }
            return Ok(());
        };

        let report = self.workflow.drain(&self.lane, sender.as_ref(), now).await?;
        if report.is_empty() {
            info!("Nothing ready in {}", self.lane);
        }
        Ok(())
    }
}

pub struct DailyReportAction {
    workflow: Arc<Workflow>,
}

#[async_trait]
impl ActionHandler for DailyReportAction {
    async fn run(&self, now: NaiveDateTime) -> Result<()> {
        report::daily_report(self.workflow.queue(), now).map(|_| ())
    }
}

pub struct WeeklyAuditAction {
    workflow: Arc<Workflow>,
}

#[async_trait]
impl ActionHandler for WeeklyAuditAction {
    async fn run(&self, now: NaiveDateTime) -> Result<()> {
        report::weekly_briefing(self.workflow.queue(), now).map(|_| ())
    }
}

/// Warns about every expected folder that is missing
pub struct HealthCheckAction {
    workflow: Arc<Workflow>,
    lanes: Vec<Lane>,
}

impl HealthCheckAction {
    /// Expected folders that do not exist
    pub fn missing(&self) -> Vec<PathBuf> {
        let queue = self.workflow.queue();
        let mut expected: Vec<PathBuf> = Stage::ALL
            .iter()
            .map(|stage| queue.lane_dir(&Lane::new(*stage)))
            .collect();
        expected.extend(self.lanes.iter().map(|lane| queue.lane_dir(lane)));
        expected.extend(SUPPORT_DIRS.iter().map(|dir| queue.root().join(dir)));
        expected.into_iter().filter(|dir| !dir.is_dir()).collect()
    }
}

#[async_trait]
impl ActionHandler for HealthCheckAction {
    async fn run(&self, _now: NaiveDateTime) -> Result<()> {
        info!("Running health check");
        let missing = self.missing();
        for dir in &missing {
            warn!("Missing folder: {}", dir.display());
        }
        info!("Health check complete: {} folders missing", missing.len());
        Ok(())
    }
}

pub struct CleanupLogsAction {
    log_dir: PathBuf,
    retention_days: u32,
}

#[async_trait]
impl ActionHandler for CleanupLogsAction {
    async fn run(&self, _now: NaiveDateTime) -> Result<()> {
        let removed = report::cleanup_logs(&self.log_dir, self.retention_days, SystemTime::now())?;
        info!("Log cleanup removed {} files from {}", removed, self.log_dir.display());
        Ok(())
    }
}

/// Reports how many email items are waiting in Needs_Action
pub struct ProcessEmailsAction {
    workflow: Arc<Workflow>,
}

#[async_trait]
impl ActionHandler for ProcessEmailsAction {
    async fn run(&self, _now: NaiveDateTime) -> Result<()> {
        let items = self.workflow.queue().scan(&Lane::new(Stage::NeedsAction))?;
        let emails: Vec<_> = items.iter().filter(|i| i.item_type() == Some("email")).collect();
        info!("{} email items awaiting action", emails.len());
        for item in emails {
            info!("  [{}] {}", item.priority, item.file_name());
        }
        Ok(())
    }
}

/// Registry with every built-in action wired to `workflow`
///
/// `send_emails` and `post_linkedin` drain through the senders named `email` and
/// `linkedin` when present in `senders`.
pub fn builtin_registry(
    workflow: Arc<Workflow>,
    senders: &BTreeMap<String, Arc<dyn Sender>>,
    config: &Config,
) -> ActionRegistry {
    let drain = |name: &str, fallback: Lane| -> Arc<dyn ActionHandler> {
        let lane = config.sender(name).map(|s| s.lane.clone()).unwrap_or(fallback);
        Arc::new(DrainAction::new(workflow.clone(), lane, senders.get(name).cloned()))
    };

    let mut registry = ActionRegistry::new();
    registry.register(
        "send_emails",
        drain("email", Lane::with_channel(Stage::ReadyToSend, "Email")),
    );
    registry.register(
        "post_linkedin",
        drain("linkedin", Lane::with_channel(Stage::ReadyToPost, "LinkedIn")),
    );
    registry.register(
        "daily_report",
        Arc::new(DailyReportAction {
            workflow: workflow.clone(),
        }),
    );
    registry.register(
        "weekly_audit",
        Arc::new(WeeklyAuditAction {
            workflow: workflow.clone(),
        }),
    );
    registry.register(
        "health_check",
        Arc::new(HealthCheckAction {
            workflow: workflow.clone(),
            lanes: config.lanes(),
        }),
    );
    registry.register(
        "cleanup_logs",
        Arc::new(CleanupLogsAction {
            log_dir: config.log_dir(),
            retention_days: config.reports.log_retention_days,
        }),
    );
    registry.register("process_emails", Arc::new(ProcessEmailsAction { workflow }));
    registry
}
