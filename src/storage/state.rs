//! Dedup and last-run state persisted as a small JSON document.
//!
//! Producer state files look like `{"processed_ids": ["a", "b"]}`; scheduler state files
//! look like `{"daily": "2026-01-15T09:00:00"}`. Both shapes are read by the same store,
//! so a process can keep either kind (or both) in one file. Every mutation is flushed
//! before the call returns. A missing or malformed file loads as empty state.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use log::{debug, info, warn};
use serde_json::{Map, Value};

use crate::clock::{format_timestamp, parse_timestamp};
use crate::error::{Result, VaultflowError};

/// Key holding the dedup id list
pub const PROCESSED_IDS_KEY: &str = "processed_ids";

/// Older producers stored the same list under this key
const LEGACY_PROCESSED_KEY: &str = "processed_files";

/// Returns true if `name` cannot be used as a task name in a state file
pub fn is_reserved_key(name: &str) -> bool {
    name == PROCESSED_IDS_KEY || name == LEGACY_PROCESSED_KEY
}

/// Dedup ids and per-task last-run times, backed by one JSON file
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    processed_ids: BTreeSet<String>,
    last_run: BTreeMap<String, NaiveDateTime>,
}

impl StateStore {
    /// Load state from `path`; never fails
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let mut store = Self {
            path,
            processed_ids: BTreeSet::new(),
            last_run: BTreeMap::new(),
        };

        let content = match fs::read_to_string(&store.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No state file at {}, starting empty", store.path.display());
                return store;
            }
            Err(e) => {
                warn!("Failed to read state file {}: {}; starting empty", store.path.display(), e);
                return store;
            }
        };

        match serde_json::from_str::<Value>(&content) {
            Ok(value) => store.absorb(value),
            Err(e) => warn!("Malformed state file {}: {}; starting empty", store.path.display(), e),
        }

        info!(
            "Loaded state from {}: {} processed ids, {} task run times",
            store.path.display(),
            store.processed_ids.len(),
            store.last_run.len()
        );
        store
    }

    fn absorb(&mut self, value: Value) {
        match value {
            Value::Array(ids) => self.absorb_ids(ids),
            Value::Object(map) => {
                for (key, value) in map {
                    if is_reserved_key(&key) {
                        match value {
                            Value::Array(ids) => self.absorb_ids(ids),
                            other => warn!("Ignoring non-list '{}' in state file: {}", key, other),
                        }
                        continue;
                    }
                    match value.as_str().and_then(parse_timestamp) {
                        Some(at) => {
                            self.last_run.insert(key, at);
                        }
                        None => warn!("Ignoring unreadable last-run time for task '{}': {}", key, value),
                    }
                }
            }
            other => warn!("Unexpected state file shape in {}: {}", self.path.display(), other),
        }
    }

    fn absorb_ids(&mut self, ids: Vec<Value>) {
        for id in ids {
            match id {
                Value::String(id) => {
                    self.processed_ids.insert(id);
                }
                other => debug!("Skipping non-string processed id: {}", other),
            }
        }
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true if the dedup id was already admitted
    pub fn contains(&self, id: &str) -> bool {
        self.processed_ids.contains(id)
    }

    /// Record a dedup id and flush.
    ///
    /// On a write failure the id stays recorded in memory and the error is returned.
    pub fn mark_processed(&mut self, id: impl Into<String>) -> Result<()> {
        self.processed_ids.insert(id.into());
        self.flush()
    }

    pub fn processed_count(&self) -> usize {
        self.processed_ids.len()
    }

    pub fn get_last_run(&self, task: &str) -> Option<NaiveDateTime> {
        self.last_run.get(task).copied()
    }

    /// Record a task's last run and flush.
    ///
    /// On a write failure the time stays recorded in memory and the error is returned.
    pub fn set_last_run(&mut self, task: &str, at: NaiveDateTime) -> Result<()> {
        if is_reserved_key(task) {
            return Err(VaultflowError::Configuration(format!(
                "'{}' is reserved and cannot be used as a task name",
                task
            )));
        }
        self.last_run.insert(task.to_string(), at);
        self.flush()
    }

    pub fn last_runs(&self) -> impl Iterator<Item = (&str, NaiveDateTime)> {
        self.last_run.iter().map(|(k, v)| (k.as_str(), *v))
    }

    fn to_json(&self) -> Value {
        let mut map = Map::new();
        if !self.processed_ids.is_empty() || self.last_run.is_empty() {
            let ids = self.processed_ids.iter().cloned().map(Value::String).collect();
            map.insert(PROCESSED_IDS_KEY.to_string(), Value::Array(ids));
        }
        for (task, at) in &self.last_run {
            map.insert(task.clone(), Value::String(format_timestamp(*at)));
        }
        Value::Object(map)
    }

    /// Write the whole state to disk, replacing the previous file atomically
    pub fn flush(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let rendered = serde_json::to_string_pretty(&self.to_json())?;
        let mut tmp_name = self.path.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(".tmp");
        let tmp = self.path.with_file_name(tmp_name);

        fs::write(&tmp, rendered)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
