//! Markdown reports written into the vault's support folders

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{NaiveDate, NaiveDateTime};
use log::{debug, info, warn};

use crate::domain::{Lane, Stage, WorkItem};
use crate::error::Result;
use crate::queue::QueueFolder;

const ACCOUNTING_DIR: &str = "Accounting";
const BRIEFINGS_DIR: &str = "Briefings";

/// How many completed items the daily report lists by name
const DAILY_LISTED: usize = 10;

/// Date a queue file name starts with (`2026-01-15_...`)
pub fn leading_date(file_name: &str) -> Option<NaiveDate> {
    file_name
        .get(..10)
        .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
}

/// Verb a transition wrote into the name (`2026-01-16_sent_...` -> `sent`)
fn leading_tag(file_name: &str) -> Option<&str> {
    leading_date(file_name)?;
    file_name.get(11..)?.split('_').next().filter(|tag| !tag.is_empty())
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn write_report(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)?;
    Ok(())
}

fn file_names(queue: &QueueFolder, lane: &Lane) -> Vec<String> {
    queue
        .scan_paths(lane)
        .unwrap_or_default()
        .iter()
        .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .collect()
}

/// Write `Accounting/Daily_Report_{date}.md`
pub fn daily_report(queue: &QueueFolder, now: NaiveDateTime) -> Result<PathBuf> {
    let today = now.date();
    let stamp = today.format("%Y-%m-%d").to_string();

    let mut completed: Vec<String> = file_names(queue, &Lane::new(Stage::Done))
        .into_iter()
        .filter(|name| name.contains(&stamp))
        .collect();
    completed.sort();
    let pending = queue.count(&Lane::new(Stage::NeedsAction));
    let awaiting = queue.count_stage(Stage::PendingApproval);

    let mut content = format!(
        "# Daily Report - {stamp}\n\n\
         ## Summary\n\
         - Tasks Processed: {done}\n\
         - Pending Items: {pending}\n\
         - Awaiting Approval: {awaiting}\n\n\
         ## Tasks Completed\n",
        stamp = stamp,
        done = completed.len(),
        pending = pending,
        awaiting = awaiting,
    );
    let skip = completed.len().saturating_sub(DAILY_LISTED);
    for name in &completed[skip..] {
        content.push_str(&format!("- {}\n", name));
    }
    content.push_str(&format!(
        "\n## Pending Items\n\
         - {} items in Needs_Action\n\
         - {} items awaiting approval\n\n\
         ---\n*Generated: {}*\n",
        pending,
        awaiting,
        now.format("%Y-%m-%d %H:%M:%S")
    ));

    let path = queue
        .root()
        .join(ACCOUNTING_DIR)
        .join(format!("Daily_Report_{}.md", stamp));
    write_report(&path, &content)?;
    info!("Daily report generated: {}", path.display());
    Ok(path)
}

/// Write `Briefings/Weekly_Briefing_{date}.md` covering the seven days ending `now`
pub fn weekly_briefing(queue: &QueueFolder, now: NaiveDateTime) -> Result<PathBuf> {
    let today = now.date();
    let since = today - chrono::Duration::days(6);
    let in_week = |name: &str| leading_date(name).is_some_and(|d| d >= since && d <= today);

    let done: Vec<String> = file_names(queue, &Lane::new(Stage::Done))
        .into_iter()
        .filter(|n| in_week(n))
        .collect();

    let mut by_tag: BTreeMap<String, usize> = BTreeMap::new();
    for name in &done {
        *by_tag.entry(leading_tag(name).unwrap_or("done").to_string()).or_default() += 1;
    }

    let mut rejected: BTreeMap<String, usize> = BTreeMap::new();
    let mut rejected_lanes = vec![Lane::new(Stage::Rejected)];
    rejected_lanes.extend(
        queue
            .channels(Stage::Rejected)
            .into_iter()
            .map(|c| Lane::with_channel(Stage::Rejected, c)),
    );
    for lane in &rejected_lanes {
        let count = file_names(queue, lane).iter().filter(|n| in_week(n)).count();
        if count > 0 {
            rejected.insert(lane.to_string(), count);
        }
    }

    let mut content = format!(
        "# Weekly Briefing - {} to {}\n\n## Completed\n- Total: {}\n",
        since.format("%Y-%m-%d"),
        today.format("%Y-%m-%d"),
        done.len()
    );
    for (tag, count) in &by_tag {
        content.push_str(&format!("- {}: {}\n", capitalize(tag), count));
    }

    content.push_str(&format!("\n## Rejected\n- Total: {}\n", rejected.values().sum::<usize>()));
    for (lane, count) in &rejected {
        content.push_str(&format!("- {}: {}\n", lane, count));
    }

    content.push_str(&format!(
        "\n## Open Work\n\
         - Needs_Action: {}\n\
         - Pending_Approval: {}\n\
         - Ready_To_Send: {}\n\
         - Ready_To_Post: {}\n\n\
         ---\n*Generated: {}*\n",
        queue.count(&Lane::new(Stage::NeedsAction)),
        queue.count_stage(Stage::PendingApproval),
        queue.count_stage(Stage::ReadyToSend),
        queue.count_stage(Stage::ReadyToPost),
        now.format("%Y-%m-%d %H:%M:%S")
    ));

    let path = queue
        .root()
        .join(BRIEFINGS_DIR)
        .join(format!("Weekly_Briefing_{}.md", today.format("%Y-%m-%d")));
    write_report(&path, &content)?;
    info!("Weekly briefing generated: {}", path.display());
    Ok(path)
}

/// Append one line to `Accounting/{Sender}_Activity_{YYYY-MM}.md`
pub fn append_activity(root: &Path, sender: &str, tag: &str, item: &WorkItem, at: NaiveDateTime) -> Result<PathBuf> {
    let dir = root.join(ACCOUNTING_DIR);
    fs::create_dir_all(&dir)?;
    let name = capitalize(sender);
    let month = at.format("%Y-%m").to_string();
    let path = dir.join(format!("{}_Activity_{}.md", name, month));

    let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
    if file.metadata()?.len() == 0 {
        writeln!(file, "# {} Activity - {}\n", name, month)?;
    }
    let subject = item
        .frontmatter
        .get("subject")
        .or_else(|| item.frontmatter.get("title"))
        .unwrap_or(&item.id);
    writeln!(
        file,
        "- {} {} {} ({})",
        at.format("%Y-%m-%d %H:%M:%S"),
        tag,
        subject,
        item.file_name()
    )?;
    Ok(path)
}

/// Delete `*.log` files in `dir` last modified more than `retention_days` ago
pub fn cleanup_logs(dir: &Path, retention_days: u32, now: SystemTime) -> Result<usize> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("Log directory {} does not exist", dir.display());
            return Ok(0);
        }
        Err(e) => return Err(e.into()),
    };

    let retention = Duration::from_secs(u64::from(retention_days) * 24 * 60 * 60);
    let cutoff = now.checked_sub(retention).unwrap_or(SystemTime::UNIX_EPOCH);

    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() || path.extension().is_none_or(|ext| ext != "log") {
            continue;
        }
        let modified = match entry.metadata().and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(e) => {
                warn!("Cannot read age of {}: {}", path.display(), e);
                continue;
            }
        };
        if modified < cutoff {
            match fs::remove_file(&path) {
                Ok(()) => {
                    info!("Removed old log {}", path.display());
                    removed += 1;
                }
                Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
            }
        }
    }
    Ok(removed)
}
