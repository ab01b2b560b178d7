//! Queue and workflow integration tests
//!
//! Drives admission, transitions and draining through the public API against a
//! temporary vault.

use std::fs;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use tempfile::TempDir;

use vaultflow::config::Config;
use vaultflow::daemon::Tick;
use vaultflow::domain::{Lane, Priority, RawItem, Stage, WorkItem};
use vaultflow::error::{Result, VaultflowError};
use vaultflow::external::{InboxSource, Sender};
use vaultflow::id::transition_file_name;
use vaultflow::queue::Admission;
use vaultflow::storage::StateStore;
use vaultflow::workflow::{Producer, Workflow};

fn at(h: u32, m: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 1, 15)
        .unwrap()
        .and_hms_opt(h, m, 0)
        .unwrap()
}

fn setup() -> (Workflow, Config, TempDir) {
    let temp = TempDir::new().unwrap();
    let config = Config {
        vault_path: temp.path().join("vault"),
        ..Config::default()
    };
    let workflow = Workflow::from_config(&config);
    workflow.queue().ensure_layout(&config.lanes()).unwrap();
    (workflow, config, temp)
}

fn email(title: &str) -> RawItem {
    RawItem::new("gmail", "email", title)
        .with_field("from", "client@example.com")
        .with_field("subject", title)
}

fn draft(title: &str) -> RawItem {
    RawItem::new("draft", "email_draft", title)
        .with_field("to", "client@example.com")
        .with_field("subject", title)
}

/// Mock sender that fails any item whose subject mentions "bounce"
struct MockSender {
    seen: Mutex<Vec<String>>,
}

impl MockSender {
    fn new() -> Self {
        Self { seen: Mutex::new(Vec::new()) }
    }
}

#[async_trait]
impl Sender for MockSender {
    fn name(&self) -> &str {
        "email"
    }

    async fn send(&self, item: &WorkItem) -> Result<()> {
        self.seen.lock().unwrap().push(item.file_name());
        match item.frontmatter.get("subject") {
            Some(subject) if subject.contains("bounce") => {
                Err(VaultflowError::External("mailbox full".to_string()))
            }
            _ => Ok(()),
        }
    }
}

#[test]
fn test_same_dedup_id_admitted_once() {
    let (workflow, _config, temp) = setup();
    let mut state = StateStore::load(temp.path().join("gmail_state.json"));
    let raw = email("Invoice overdue").with_dedup_id("gmail-abc123");

    let first = workflow.produce(raw.clone(), &mut state, at(9, 0)).unwrap();
    assert!(!first.is_skipped());
    assert!(state.contains("gmail-abc123"));

    let second = workflow.produce(raw, &mut state, at(9, 5)).unwrap();
    assert_eq!(second, Admission::Skipped);

    let needs_action = Lane::new(Stage::NeedsAction);
    assert_eq!(workflow.queue().count(&needs_action), 1);

    // A restarted producer reads the same state back
    let reloaded = StateStore::load(temp.path().join("gmail_state.json"));
    assert!(reloaded.contains("gmail-abc123"));
}

#[test]
fn test_produce_fills_defaults() {
    let (workflow, _config, temp) = setup();
    let mut state = StateStore::load(temp.path().join("s.json"));
    let admission = workflow
        .produce(email("URGENT: server down"), &mut state, at(9, 0))
        .unwrap();

    let path = admission.path().unwrap();
    let name = path.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("2026-01-15_090000_gmail_"), "{}", name);

    let item = WorkItem::load(path, Lane::new(Stage::NeedsAction)).unwrap();
    assert_eq!(item.priority, Priority::Critical);
    assert_eq!(item.frontmatter.get("status"), Some("pending"));
    assert!(item.created_at.is_some());
}

#[test]
fn test_missing_required_key_rejected() {
    let (workflow, _config, temp) = setup();
    let mut state = StateStore::load(temp.path().join("s.json"));
    let raw = RawItem::new("gmail", "email", "No sender").with_dedup_id("gmail-x");

    let err = workflow.produce(raw, &mut state, at(9, 0)).unwrap_err();
    assert!(matches!(err, VaultflowError::MissingField { .. }));
    assert!(!state.contains("gmail-x"));
    assert_eq!(workflow.queue().count(&Lane::new(Stage::NeedsAction)), 0);
}

#[test]
fn test_external_item_cannot_choose_a_late_lane() {
    let (workflow, _config, temp) = setup();
    let mut state = StateStore::load(temp.path().join("s.json"));
    for lane in ["Ready_To_Send/Email", "Done", "Rejected/Email"] {
        let json = format!(
            r#"{{"origin": "gmail", "title": "Wire transfer", "dedup_id": "gmail-{0}", "lane": "{0}",
                "frontmatter": {{"type": "email", "from": "x@example.com", "subject": "Wire transfer"}}}}"#,
            lane
        );
        let raw: RawItem = serde_json::from_str(&json).unwrap();
        assert_eq!(raw.lane.as_ref().map(ToString::to_string).as_deref(), Some(lane));

        let err = workflow.produce(raw, &mut state, at(9, 0)).unwrap_err();
        assert!(matches!(err, VaultflowError::InvalidTransition { .. }), "{}", lane);
        assert!(!state.contains(&format!("gmail-{}", lane)));
    }
    for stage in [Stage::ReadyToSend, Stage::Done, Stage::Rejected] {
        assert_eq!(workflow.queue().count_stage(stage), 0);
    }

    // Review lanes stay open to producers
    let raw: RawItem = serde_json::from_str(
        r#"{"origin": "draft", "title": "Reply", "lane": "Pending_Approval/Email",
            "frontmatter": {"type": "email_draft", "to": "x@example.com", "subject": "Reply"}}"#,
    )
    .unwrap();
    assert!(!workflow.produce(raw, &mut state, at(9, 0)).unwrap().is_skipped());
}

#[test]
fn test_collision_leaves_source_untouched() {
    let (workflow, _config, temp) = setup();
    let mut state = StateStore::load(temp.path().join("s.json"));
    let pending = Lane::with_channel(Stage::PendingApproval, "Email");
    let admission = workflow
        .produce(draft("Proposal").with_lane(pending.clone()), &mut state, at(9, 0))
        .unwrap();
    let source = admission.path().unwrap().to_path_buf();
    let original = fs::read_to_string(&source).unwrap();

    let item = WorkItem::load(&source, pending).unwrap();
    let ready = Lane::with_channel(Stage::ReadyToSend, "Email");
    let dest_dir = workflow.queue().lane_dir(&ready);
    let taken = transition_file_name(at(9, 0).date(), "approved", &item.id);
    fs::write(dest_dir.join(&taken), "occupied").unwrap();

    let err = workflow.queue().move_exact(&item.path, &dest_dir, &taken).unwrap_err();
    assert!(matches!(err, VaultflowError::Collision { .. }));
    assert_eq!(fs::read_to_string(&source).unwrap(), original);
    assert_eq!(fs::read_to_string(dest_dir.join(&taken)).unwrap(), "occupied");

    // A transition picks a suffixed name instead of overwriting
    let moved = workflow
        .queue()
        .transition(&item, &ready, Some("approved"), at(9, 0).date())
        .unwrap();
    assert_ne!(moved, dest_dir.join(&taken));
    assert!(!source.exists());
    assert_eq!(workflow.queue().count(&ready), 2);
    assert_eq!(fs::read_to_string(dest_dir.join(&taken)).unwrap(), "occupied");
}

#[test]
fn test_approve_routes_by_type_and_reject_keeps_channel() {
    let (workflow, _config, temp) = setup();
    let mut state = StateStore::load(temp.path().join("s.json"));
    let pending = Lane::with_channel(Stage::PendingApproval, "Email");
    let name_of = |admission: Admission| {
        admission.path().unwrap().file_name().unwrap().to_string_lossy().into_owned()
    };
    let proposal = workflow
        .produce(draft("Proposal").with_lane(pending.clone()), &mut state, at(9, 0))
        .unwrap();
    let spam = workflow
        .produce(draft("Spam reply").with_lane(pending.clone()), &mut state, at(9, 1))
        .unwrap();
    assert_eq!(name_of(spam.clone()), "2026-01-15_090100_draft_Spam_reply.md");

    let item = workflow.locate(&name_of(proposal), Stage::PendingApproval).unwrap();
    let approved = workflow.approve(&item, None, at(10, 0).date()).unwrap();
    assert!(approved.starts_with(workflow.queue().lane_dir(&Lane::with_channel(Stage::ReadyToSend, "Email"))));

    // Lookup by stem works too
    let item = workflow.locate("2026-01-15_090100_draft_Spam_reply", Stage::PendingApproval).unwrap();
    let rejected = workflow.reject(&item, at(10, 0).date()).unwrap();
    assert!(rejected.starts_with(workflow.queue().lane_dir(&Lane::with_channel(Stage::Rejected, "Email"))));
    assert_eq!(workflow.queue().count_stage(Stage::PendingApproval), 0);
}

#[tokio::test]
async fn test_drain_moves_successes_and_keeps_failures() {
    let (workflow, _config, temp) = setup();
    let mut state = StateStore::load(temp.path().join("s.json"));
    let ready = Lane::with_channel(Stage::ReadyToSend, "Email");
    let queue = workflow.queue();
    queue.admit(&ready, &draft("Quarterly numbers"), &mut state, at(9, 0)).unwrap();
    queue.admit(&ready, &draft("Will bounce"), &mut state, at(9, 1)).unwrap();

    let sender = MockSender::new();
    let report = workflow.drain(&ready, &sender, at(9, 30)).await.unwrap();
    assert_eq!(report.sent.len(), 1);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(workflow.queue().count(&ready), 1);

    let done = workflow.queue().scan(&Lane::new(Stage::Done)).unwrap();
    assert_eq!(done.len(), 1);
    assert!(done[0].file_name().starts_with("2026-01-15_sent_"));

    let activity = workflow.queue().root().join("Accounting/Email_Activity_2026-01.md");
    assert!(fs::read_to_string(activity).unwrap().contains("Quarterly numbers"));

    // The failed item is retried on the next poll
    let report = workflow.drain(&ready, &sender, at(9, 35)).await.unwrap();
    assert!(report.sent.is_empty());
    assert_eq!(report.failed.len(), 1);
    assert_eq!(sender.seen.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn test_inbox_watcher_admits_each_file_once() {
    let (workflow, config, temp) = setup();
    let inbox = workflow.queue().lane_dir(&Lane::new(Stage::Inbox));
    fs::write(inbox.join("urgent_contract.txt"), "line one\nline two\n").unwrap();
    fs::write(inbox.join(".hidden"), "skip me").unwrap();

    let source = InboxSource::new(&inbox, config.inbox.clone(), workflow.classifier().clone());
    let state = StateStore::load(temp.path().join("watcher_state.json"));
    let workflow = std::sync::Arc::new(workflow);
    let mut producer = Producer::new(workflow.clone(), Box::new(source), state);

    assert_eq!(producer.tick(at(9, 0)).await.unwrap(), 1);
    assert_eq!(producer.tick(at(9, 1)).await.unwrap(), 0);

    let items = workflow.queue().scan(&Lane::new(Stage::NeedsAction)).unwrap();
    assert_eq!(items.len(), 1);
    let item = &items[0];
    assert_eq!(item.item_type(), Some("file_inbox"));
    assert_eq!(item.priority, Priority::Critical);
    assert_eq!(item.frontmatter.get("file_type"), Some(".txt"));
    assert!(item.body.contains("line two"));

    // Inbox files stay where they were dropped
    assert!(inbox.join("urgent_contract.txt").exists());
}
