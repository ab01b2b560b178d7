//! Long-running roles driven by the tick loop: producers and drainers

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use log::{debug, info, warn};

use crate::daemon::Tick;
use crate::domain::Lane;
use crate::error::Result;
use crate::external::{Sender, Source};
use crate::queue::Admission;
use crate::storage::StateStore;
use crate::workflow::orchestrator::Workflow;

/// Polls a source and admits what it returns, owning the source's dedup state
pub struct Producer {
    workflow: Arc<Workflow>,
    source: Box<dyn Source>,
    state: StateStore,
}

impl Producer {
    pub fn new(workflow: Arc<Workflow>, source: Box<dyn Source>, state: StateStore) -> Self {
        Self {
            workflow,
            source,
            state,
        }
    }

    pub fn state(&self) -> &StateStore {
        &self.state
    }

    /// Poll once; returns how many new items were admitted
    ///
    /// An item that fails validation or writing is logged and skipped; the rest of the
    /// batch still goes through.
    pub async fn poll_once(&mut self, now: NaiveDateTime) -> Result<usize> {
        let raw_items = self.source.poll(&self.state).await?;
        let mut admitted = 0;
        for raw in raw_items {
            let title = raw.title.clone();
            match self.workflow.produce(raw, &mut self.state, now) {
                Ok(Admission::Admitted(path)) => {
                    debug!("{} admitted {}", self.source.name(), path.display());
                    admitted += 1;
                }
                Ok(Admission::Skipped) => {}
                Err(e) => warn!("{} could not admit '{}': {}", self.source.name(), title, e),
            }
        }
        if admitted > 0 {
            info!("{} admitted {} new items", self.source.name(), admitted);
        }
        Ok(admitted)
    }
}

#[async_trait]
impl Tick for Producer {
    fn name(&self) -> &str {
        self.source.name()
    }

    async fn tick(&mut self, now: NaiveDateTime) -> Result<usize> {
        self.poll_once(now).await
    }
}

/// Drains one ready lane through one sender on every tick
pub struct Drainer {
    workflow: Arc<Workflow>,
    lane: Lane,
    sender: Arc<dyn Sender>,
}

impl Drainer {
    pub fn new(workflow: Arc<Workflow>, lane: Lane, sender: Arc<dyn Sender>) -> Self {
        Self { workflow, lane, sender }
    }
}

#[async_trait]
impl Tick for Drainer {
    fn name(&self) -> &str {
        self.sender.name()
    }

    async fn tick(&mut self, now: NaiveDateTime) -> Result<usize> {
        let report = self.workflow.drain(&self.lane, self.sender.as_ref(), now).await?;
        Ok(report.sent.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::domain::{RawItem, Stage};
    use crate::error::VaultflowError;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 1, 15)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    struct Fixed(Vec<RawItem>);

    #[async_trait]
    impl Source for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn poll(&self, _state: &StateStore) -> Result<Vec<RawItem>> {
            Ok(self.0.clone())
        }
    }

    struct Broken;

    #[async_trait]
    impl Source for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        async fn poll(&self, _state: &StateStore) -> Result<Vec<RawItem>> {
            Err(VaultflowError::External("mailbox unreachable".to_string()))
        }
    }

    fn workflow(temp: &TempDir) -> Arc<Workflow> {
        let config = Config {
            vault_path: temp.path().join("vault"),
            ..Config::default()
        };
        Arc::new(Workflow::from_config(&config))
    }

    #[tokio::test]
    async fn test_producer_admits_once_and_isolates_bad_items() {
        let temp = TempDir::new().unwrap();
        let workflow = workflow(&temp);
        let items = vec![
            RawItem::new("gmail", "email", "Invoice")
                .with_dedup_id("gmail-abc123")
                .with_field("from", "a@b.c")
                .with_field("subject", "Invoice"),
            // Missing `from`
            RawItem::new("gmail", "email", "Broken").with_dedup_id("gmail-bad"),
            // Producers cannot skip review
            RawItem::new("gmail", "email", "Shortcut")
                .with_dedup_id("gmail-ready")
                .with_field("from", "a@b.c")
                .with_field("subject", "Shortcut")
                .with_lane(Lane::with_channel(Stage::ReadyToSend, "Email")),
        ];
        let state = StateStore::load(temp.path().join("gmail_state.json"));
        let mut producer = Producer::new(workflow.clone(), Box::new(Fixed(items)), state);

        assert_eq!(producer.tick(now()).await.unwrap(), 1);
        assert_eq!(producer.tick(now()).await.unwrap(), 0);
        assert!(producer.state().contains("gmail-abc123"));
        assert!(!producer.state().contains("gmail-bad"));
        assert!(!producer.state().contains("gmail-ready"));
        assert_eq!(workflow.queue().count(&Lane::new(Stage::NeedsAction)), 1);
        assert_eq!(workflow.queue().count_stage(Stage::ReadyToSend), 0);
    }

    #[tokio::test]
    async fn test_source_failure_is_pass_error() {
        let temp = TempDir::new().unwrap();
        let state = StateStore::load(temp.path().join("s.json"));
        let mut producer = Producer::new(workflow(&temp), Box::new(Broken), state);
        assert!(producer.tick(now()).await.unwrap_err().is_transient());
    }
}
