//! Workflow orchestrator: the operations watchers and senders call
//!
//! Producers go through `produce`, consumers through `consume_ready` followed by
//! `complete` (or nothing, on failure). Humans move items with `approve` and `reject`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};
use log::{error, info, warn};

use crate::clock::format_timestamp;
use crate::config::Config;
use crate::domain::{Lane, PriorityClassifier, RawItem, Stage, WorkItem};
use crate::error::{Result, VaultflowError};
use crate::external::Sender;
use crate::queue::{Admission, QueueFolder};
use crate::storage::StateStore;
use crate::workflow::report::append_activity;

/// Outcome of draining a ready lane
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DrainReport {
    /// Paths of delivered items, now in Done
    pub sent: Vec<PathBuf>,
    /// File name and reason of every item left in the lane
    pub failed: Vec<(String, String)>,
}

impl DrainReport {
    pub fn is_empty(&self) -> bool {
        self.sent.is_empty() && self.failed.is_empty()
    }
}

/// Queue plus the per-type rules that govern it
#[derive(Debug, Clone)]
pub struct Workflow {
    queue: QueueFolder,
    classifier: PriorityClassifier,
    required_keys: BTreeMap<String, Vec<String>>,
    routes: BTreeMap<String, Lane>,
}

impl Workflow {
    pub fn new(queue: QueueFolder, classifier: PriorityClassifier) -> Self {
        Self {
            queue,
            classifier,
            required_keys: BTreeMap::new(),
            routes: BTreeMap::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            QueueFolder::new(&config.vault_path),
            PriorityClassifier::new(&config.priority),
        )
        .with_required_keys(config.required_keys.clone())
        .with_routes(config.routes.clone())
    }

    pub fn with_required_keys(mut self, required_keys: BTreeMap<String, Vec<String>>) -> Self {
        self.required_keys = required_keys;
        self
    }

    pub fn with_routes(mut self, routes: BTreeMap<String, Lane>) -> Self {
        self.routes = routes;
        self
    }

    pub fn queue(&self) -> &QueueFolder {
        &self.queue
    }

    pub fn classifier(&self) -> &PriorityClassifier {
        &self.classifier
    }

    /// Check the keys the item's declared type requires
    pub fn validate(&self, raw: &RawItem) -> Result<()> {
        let Some(item_type) = raw.item_type() else {
            return Ok(());
        };
        let Some(keys) = self.required_keys.get(item_type) else {
            return Ok(());
        };
        for key in keys {
            if raw.frontmatter.get(key).is_none_or(|v| v.is_empty()) {
                return Err(VaultflowError::MissingField {
                    item_type: item_type.to_string(),
                    field: key.clone(),
                });
            }
        }
        Ok(())
    }

    /// Admit a producer's item
    ///
    /// Fills `created` and `status` when absent and classifies priority from the title
    /// and body unless the producer already set one. Lands in the item's lane, or
    /// `Needs_Action`. Producers may only target entry stages; anything else is an
    /// `InvalidTransition` and nothing is written.
    pub fn produce(&self, mut raw: RawItem, state: &mut StateStore, now: NaiveDateTime) -> Result<Admission> {
        let lane = raw.lane.take().unwrap_or_else(|| Lane::new(Stage::NeedsAction));
        if !lane.stage.is_entry() {
            return Err(VaultflowError::InvalidTransition {
                from: raw.origin.clone(),
                to: lane.to_string(),
            });
        }
        self.validate(&raw)?;

        if raw.frontmatter.priority_opt().is_none() {
            let priority = self.classifier.classify(&format!("{}\n{}", raw.title, raw.body));
            raw.frontmatter.set("priority", priority.as_str());
        }
        raw.frontmatter.set_default("status", "pending");
        raw.frontmatter.set_default("created", format_timestamp(now));

        self.queue.admit(&lane, &raw, state, now)
    }

    /// Items a terminal sender should act on, most urgent first
    pub fn consume_ready(&self, lane: &Lane) -> Result<Vec<WorkItem>> {
        if !matches!(lane.stage, Stage::ReadyToSend | Stage::ReadyToPost) {
            return Err(VaultflowError::InvalidTransition {
                from: lane.to_string(),
                to: Stage::Done.to_string(),
            });
        }
        let mut items = self.queue.scan(lane)?;
        items.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id)));
        Ok(items)
    }

    /// Move a delivered item to Done
    pub fn complete(&self, item: &WorkItem, tag: &str, on: NaiveDate) -> Result<PathBuf> {
        self.queue.transition(item, &Lane::new(Stage::Done), Some(tag), on)
    }

    /// Move an item to the rejected lane of its channel
    pub fn reject(&self, item: &WorkItem, on: NaiveDate) -> Result<PathBuf> {
        self.queue.transition(item, &item.lane.to_stage(Stage::Rejected), None, on)
    }

    /// Hand an action item to a human for review
    pub fn request_approval(&self, item: &WorkItem, channel: Option<&str>, on: NaiveDate) -> Result<PathBuf> {
        let lane = match channel {
            Some(channel) => Lane::with_channel(Stage::PendingApproval, channel),
            None => Lane::new(Stage::PendingApproval),
        };
        self.queue.transition(item, &lane, None, on)
    }

    /// Lane an approved item of this type moves to
    pub fn route_for(&self, item: &WorkItem) -> Option<Lane> {
        item.item_type().and_then(|t| self.routes.get(t)).cloned()
    }

    /// Release a reviewed item to its ready lane
    pub fn approve(&self, item: &WorkItem, to: Option<Lane>, on: NaiveDate) -> Result<PathBuf> {
        let destination = match to.or_else(|| self.route_for(item)) {
            Some(lane) => lane,
            None => {
                return Err(VaultflowError::Configuration(format!(
                    "no route for item type '{}'; pass a destination lane",
                    item.item_type().unwrap_or("unknown")
                )));
            }
        };
        self.queue.transition(item, &destination, None, on)
    }

    /// Find an item by path, or by file name within a stage and its channels
    pub fn locate(&self, target: &str, stage: Stage) -> Result<WorkItem> {
        let path = Path::new(target);
        if path.is_file() {
            let absolute = path.canonicalize()?;
            let root = self.queue.root().canonicalize()?;
            let lane = QueueFolder::new(root).lane_of(&absolute)?;
            return WorkItem::load(path, lane);
        }

        let wanted = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| target.to_string());
        let mut lanes = vec![Lane::new(stage)];
        lanes.extend(
            self.queue
                .channels(stage)
                .into_iter()
                .map(|channel| Lane::with_channel(stage, channel)),
        );

        for lane in lanes {
            for item in self.queue.scan(&lane)? {
                if item.file_name() == wanted || item.id == wanted {
                    return Ok(item);
                }
            }
        }
        Err(VaultflowError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("no item '{}' in {}", target, stage),
        )))
    }

    /// Deliver every item in a ready lane through `sender`
    ///
    /// Delivered items move to Done tagged with the sender's verb and are logged to the
    /// sender's monthly activity file. A failed item stays in the lane for the next
    /// poll; it never stops the rest of the batch.
    pub async fn drain(&self, lane: &Lane, sender: &dyn Sender, now: NaiveDateTime) -> Result<DrainReport> {
        let items = self.consume_ready(lane)?;
        let mut report = DrainReport::default();
        if items.is_empty() {
            return Ok(report);
        }
        info!("Found {} items in {} for {}", items.len(), lane, sender.name());

        for item in items {
            if let Err(e) = sender.send(&item).await {
                warn!("{} failed to deliver {}: {}", sender.name(), item.file_name(), e);
                report.failed.push((item.file_name(), e.to_string()));
                continue;
            }

            match self.complete(&item, sender.tag(), now.date()) {
                Ok(done) => {
                    if let Err(e) = append_activity(self.queue.root(), sender.name(), sender.tag(), &item, now) {
                        warn!("Failed to record activity for {}: {}", item.file_name(), e);
                    }
                    report.sent.push(done);
                }
                Err(e) => {
                    // Delivered but still in the ready lane; the next poll delivers it again
                    error!("{} delivered {} but could not move it to Done: {}", sender.name(), item.file_name(), e);
                    report.failed.push((item.file_name(), e.to_string()));
                }
            }
        }

        info!(
            "{}: {} delivered, {} left in {}",
            sender.name(),
            report.sent.len(),
            report.failed.len(),
            lane
        );
        Ok(report)
    }
}
