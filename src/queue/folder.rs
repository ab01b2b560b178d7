//! Queue folder: stage directories used as a multi-process work queue.
//!
//! Three rules keep the folders consistent without locks:
//! - a new item is written under a hidden temporary name and only then linked into its
//!   lane, so scanners never see a half-written file;
//! - an existing destination name is never overwritten; movers pick a fresh name with a
//!   random suffix instead;
//! - an item changes stage by a single `rename`, so at any instant it is visible in
//!   exactly one lane.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};
use glob::{MatchOptions, Pattern};
use log::{debug, error, info, warn};

use crate::domain::frontmatter;
use crate::domain::{DEDUP_KEY, Lane, RawItem, Stage, WorkItem};
use crate::error::{Result, VaultflowError};
use crate::id::{ITEM_EXTENSION, disambiguate, item_file_name, transition_file_name};
use crate::storage::StateStore;

/// How many names (base name, then suffixed ones) a writer tries before giving up
pub const MAX_NAME_ATTEMPTS: usize = 8;

/// Result of an admission attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// A new file was written at this path
    Admitted(PathBuf),
    /// The dedup id was already processed; nothing was written
    Skipped,
}

impl Admission {
    pub fn path(&self) -> Option<&Path> {
        match self {
            Admission::Admitted(path) => Some(path),
            Admission::Skipped => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Admission::Skipped)
    }
}

/// The stage directory tree rooted at the vault path
#[derive(Debug, Clone)]
pub struct QueueFolder {
    root: PathBuf,
}

impl QueueFolder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of a lane
    pub fn lane_dir(&self, lane: &Lane) -> PathBuf {
        lane.dir(&self.root)
    }

    /// Create every stage folder plus the given channel lanes
    pub fn ensure_layout(&self, lanes: &[Lane]) -> Result<()> {
        for stage in Stage::ALL {
            fs::create_dir_all(self.root.join(stage.dir_name()))?;
        }
        for lane in lanes {
            fs::create_dir_all(self.lane_dir(lane))?;
        }
        Ok(())
    }

    /// Lane a path belongs to, derived from its parent directory
    pub fn lane_of(&self, path: &Path) -> Result<Lane> {
        let parent = path
            .parent()
            .ok_or_else(|| VaultflowError::UnknownStage(path.display().to_string()))?;
        let relative = parent
            .strip_prefix(&self.root)
            .map_err(|_| VaultflowError::UnknownStage(format!("{} is outside the vault", path.display())))?;
        let lane = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        lane.parse()
    }

    /// Item files currently in a lane, in filesystem order
    ///
    /// Hidden files and files with another extension are skipped. A missing lane
    /// directory is an empty lane.
    pub fn scan_paths(&self, lane: &Lane) -> Result<Vec<PathBuf>> {
        let dir = self.lane_dir(lane);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let pattern = format!(
            "{}/*.{}",
            Pattern::escape(&dir.to_string_lossy()),
            ITEM_EXTENSION
        );
        let options = MatchOptions {
            require_literal_leading_dot: true,
            ..MatchOptions::default()
        };

        let entries = glob::glob_with(&pattern, options)
            .map_err(|e| VaultflowError::Parse(format!("bad scan pattern {}: {}", pattern, e)))?;

        let mut paths = Vec::new();
        for entry in entries {
            match entry {
                Ok(path) if path.is_file() => paths.push(path),
                Ok(_) => {}
                Err(e) => warn!("Skipping unreadable entry in {}: {}", dir.display(), e),
            }
        }
        Ok(paths)
    }

    /// Items currently in a lane
    ///
    /// Each file is read independently; one unreadable file is logged and skipped
    /// without hiding the rest of the lane.
    pub fn scan(&self, lane: &Lane) -> Result<Vec<WorkItem>> {
        let mut items = Vec::new();
        for path in self.scan_paths(lane)? {
            match WorkItem::load(&path, lane.clone()) {
                Ok(item) => items.push(item),
                Err(VaultflowError::Io(e)) if e.kind() == ErrorKind::NotFound => {
                    debug!("{} was taken by another consumer", path.display());
                }
                Err(e) => warn!("Skipping unreadable item {}: {}", path.display(), e),
            }
        }
        Ok(items)
    }

    /// Number of items in a lane
    pub fn count(&self, lane: &Lane) -> usize {
        self.scan_paths(lane).map(|p| p.len()).unwrap_or(0)
    }

    /// Number of items in a stage folder and all of its channel sub-folders
    pub fn count_stage(&self, stage: Stage) -> usize {
        let top = Lane::new(stage);
        let mut total = self.count(&top);
        if let Ok(entries) = fs::read_dir(self.lane_dir(&top)) {
            for entry in entries.flatten() {
                let path = entry.path();
                if !path.is_dir() {
                    continue;
                }
                if let Some(channel) = path.file_name().and_then(|n| n.to_str()) {
                    total += self.count(&Lane::with_channel(stage, channel));
                }
            }
        }
        total
    }

    /// Channel sub-folders currently present under a stage
    pub fn channels(&self, stage: Stage) -> Vec<String> {
        let mut channels: Vec<String> = fs::read_dir(self.lane_dir(&Lane::new(stage)))
            .map(|entries| {
                entries
                    .flatten()
                    .filter(|e| e.path().is_dir())
                    .filter_map(|e| e.file_name().to_str().map(str::to_string))
                    .filter(|name| !name.starts_with('.'))
                    .collect()
            })
            .unwrap_or_default();
        channels.sort();
        channels
    }

    /// Write a new item into a lane, deduplicated against `state`
    ///
    /// The file is named `{timestamp}_{origin}_{slug}.md`. When the item carries a dedup
    /// id that `state` already knows, nothing is written. Otherwise the id is recorded
    /// and flushed right after the file lands; if that flush fails the id is still held
    /// in memory and the failure is logged.
    pub fn admit(&self, lane: &Lane, item: &RawItem, state: &mut StateStore, at: NaiveDateTime) -> Result<Admission> {
        if let Some(id) = &item.dedup_id {
            if state.contains(id) {
                debug!("Skipping already-processed item {}", id);
                return Ok(Admission::Skipped);
            }
        }

        let mut header = item.frontmatter.clone();
        if let Some(id) = &item.dedup_id {
            header.set(DEDUP_KEY, id.clone());
        }
        let content = frontmatter::encode(&header, &item.body);
        let path = self.write_new(lane, &item_file_name(at, &item.origin, &item.title), &content)?;
        info!("Admitted {} into {}", file_name(&path), lane);

        if let Some(id) = &item.dedup_id {
            if let Err(e) = state.mark_processed(id.clone()) {
                error!("Admitted {} but failed to persist dedup id {}: {}", path.display(), id, e);
            }
        }

        Ok(Admission::Admitted(path))
    }

    /// Write `content` into a lane under `file_name`, or a suffixed variant if taken
    pub fn write_new(&self, lane: &Lane, file_name: &str, content: &str) -> Result<PathBuf> {
        let dir = self.lane_dir(lane);
        fs::create_dir_all(&dir)?;

        let tmp = dir.join(format!(".{}.tmp", disambiguate(file_name)));
        fs::write(&tmp, content)?;

        let result = self.link_fresh(&tmp, &dir, file_name);
        if let Err(e) = fs::remove_file(&tmp) {
            if e.kind() != ErrorKind::NotFound {
                warn!("Failed to remove temporary file {}: {}", tmp.display(), e);
            }
        }
        result
    }

    fn link_fresh(&self, tmp: &Path, dir: &Path, file_name: &str) -> Result<PathBuf> {
        let mut candidate = file_name.to_string();
        for _ in 0..MAX_NAME_ATTEMPTS {
            let target = dir.join(&candidate);
            match fs::hard_link(tmp, &target) {
                Ok(()) => return Ok(target),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    debug!("{} is taken, picking another name", target.display());
                }
                Err(e) => {
                    // Filesystems without hard links fall back to check-then-rename
                    debug!("hard link unavailable ({}), renaming instead", e);
                    if !target.exists() {
                        fs::rename(tmp, &target)?;
                        return Ok(target);
                    }
                }
            }
            candidate = disambiguate(file_name);
        }
        Err(VaultflowError::Collision {
            path: dir.join(file_name),
        })
    }

    /// Move an item file to `dir/file_name`, failing if that name is taken
    ///
    /// The source is left untouched on any failure. An existing file at the target
    /// is never replaced, even if it appears while the move is in flight.
    pub fn move_exact(&self, from: &Path, dir: &Path, file_name: &str) -> Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let target = dir.join(file_name);
        rename_no_replace(from, &target)?;
        Ok(target)
    }

    /// Move an item to another lane
    ///
    /// The new name is `{date}_{tag}_{stem}.md`, with `tag` defaulting to the
    /// destination stage's tag. If that name is taken a random suffix is appended.
    /// After success the item is gone from its old lane.
    pub fn transition(&self, item: &WorkItem, to: &Lane, tag: Option<&str>, on: NaiveDate) -> Result<PathBuf> {
        let from = &item.lane;
        if !from.stage.can_transition_to(to.stage) {
            return Err(VaultflowError::InvalidTransition {
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        let dir = self.lane_dir(to);
        let base = transition_file_name(on, tag.unwrap_or(to.stage.default_tag()), &item.id);
        let mut candidate = base.clone();
        for _ in 0..MAX_NAME_ATTEMPTS {
            match self.move_exact(&item.path, &dir, &candidate) {
                Ok(path) => {
                    info!("Moved {} from {} to {}", item.file_name(), from, to);
                    return Ok(path);
                }
                Err(VaultflowError::Collision { path }) => {
                    warn!("Destination {} exists, retrying with a suffix", path.display());
                    candidate = disambiguate(&base);
                }
                Err(e) => return Err(e),
            }
        }
        Err(VaultflowError::Collision { path: dir.join(base) })
    }
}

/// Atomic rename that fails with `Collision` when `to` exists
#[cfg(target_os = "linux")]
fn rename_no_replace(from: &Path, to: &Path) -> Result<()> {
    use rustix::fs::{CWD, RenameFlags, renameat_with};
    use rustix::io::Errno;

    match renameat_with(CWD, from, CWD, to, RenameFlags::NOREPLACE) {
        Ok(()) => Ok(()),
        Err(e) if e == Errno::EXIST => Err(VaultflowError::Collision { path: to.to_path_buf() }),
        // Kernel or filesystem without RENAME_NOREPLACE
        Err(e) if e == Errno::INVAL || e == Errno::NOSYS => {
            debug!("no-replace rename unsupported for {}, checking first", to.display());
            rename_checked(from, to)
        }
        Err(e) => Err(VaultflowError::Io(e.into())),
    }
}

#[cfg(not(target_os = "linux"))]
fn rename_no_replace(from: &Path, to: &Path) -> Result<()> {
    rename_checked(from, to)
}

/// Check-then-rename; a file created between the two steps is replaced
fn rename_checked(from: &Path, to: &Path) -> Result<()> {
    if to.exists() {
        return Err(VaultflowError::Collision { path: to.to_path_buf() });
    }
    fs::rename(from, to)?;
    Ok(())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
