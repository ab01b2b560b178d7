//! Collaborators backed by external programs
//!
//! A `CommandSender` runs its program with the item path as the last argument; exit code
//! zero means the item was delivered. A `CommandSource` runs its program and reads a JSON
//! array of raw items from stdout. Both go through `sh -c` so configured commands may
//! use the shell, and both are bounded by a timeout.

use std::path::Path;
use std::process::{Output, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use serde_json::Value;
use tokio::process::Command;

use crate::config::{SenderConfig, SourceConfig};
use crate::domain::{RawItem, WorkItem};
use crate::error::{Result, VaultflowError};
use crate::external::env::check_process_env;
use crate::external::traits::{Sender, Source};
use crate::storage::StateStore;

/// Environment variable carrying the item path for sender programs
pub const ITEM_ENV: &str = "VAULTFLOW_ITEM";

/// Run `command args... [extra]` through the shell, bounded by `timeout`
async fn execute(
    command: &str,
    args: &[String],
    item: Option<&Path>,
    timeout: Duration,
) -> std::io::Result<Output> {
    let mut cmd = Command::new("sh");
    // "$@" forwards the positional arguments untouched by word splitting
    cmd.arg("-c")
        .arg(format!("{} \"$@\"", command))
        .arg(env!("CARGO_PKG_NAME"))
        .args(args);
    if let Some(item) = item {
        cmd.arg(item).env(ITEM_ENV, item);
    }
    cmd.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());
    cmd.kill_on_drop(true);

    let child = cmd.spawn()?;
    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result,
        Err(_) => Err(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            format!("Command timed out after {}s", timeout.as_secs()),
        )),
    }
}

fn failure(owner: &str, output: &Output) -> VaultflowError {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let mut message = format!("'{}' failed with exit code: {:?}", owner, output.status.code());
    if !stderr.trim().is_empty() {
        message.push_str(&format!("; stderr: {}", stderr.trim()));
    }
    VaultflowError::External(message)
}

/// Sender that hands each item to an external program
#[derive(Debug, Clone)]
pub struct CommandSender {
    config: SenderConfig,
}

impl CommandSender {
    pub fn new(config: SenderConfig) -> Self {
        Self { config }
    }

    /// Build from config, failing if a required credential is missing
    pub fn from_config(config: &SenderConfig) -> Result<Self> {
        check_process_env(&format!("sender '{}'", config.name), &config.required_env)?;
        Ok(Self::new(config.clone()))
    }

    pub fn config(&self) -> &SenderConfig {
        &self.config
    }
}

#[async_trait]
impl Sender for CommandSender {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn tag(&self) -> &str {
        &self.config.tag
    }

    async fn send(&self, item: &WorkItem) -> Result<()> {
        debug!("{} delivering {}", self.config.name, item.path.display());
        let timeout = Duration::from_secs(self.config.timeout_secs);
        let output = execute(&self.config.command, &self.config.args, Some(&item.path), timeout)
            .await
            .map_err(|e| VaultflowError::External(format!("'{}': {}", self.config.name, e)))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(failure(&self.config.name, &output))
        }
    }
}

/// Source that reads raw items from an external program's stdout
#[derive(Debug, Clone)]
pub struct CommandSource {
    config: SourceConfig,
}

impl CommandSource {
    pub fn new(config: SourceConfig) -> Self {
        Self { config }
    }

    /// Build from config, failing if a required credential is missing
    pub fn from_config(config: &SourceConfig) -> Result<Self> {
        check_process_env(&format!("source '{}'", config.name), &config.required_env)?;
        Ok(Self::new(config.clone()))
    }

    /// Decode the program's output; elements that do not decode are skipped
    fn decode(&self, stdout: &[u8], state: &StateStore) -> Result<Vec<RawItem>> {
        let text = String::from_utf8_lossy(stdout);
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let values: Vec<Value> = serde_json::from_str(&text).map_err(|e| {
            VaultflowError::Parse(format!("'{}' did not print a JSON array: {}", self.config.name, e))
        })?;

        let mut items = Vec::with_capacity(values.len());
        for value in values {
            match serde_json::from_value::<RawItem>(value) {
                Ok(mut item) => {
                    if item.dedup_id.as_deref().is_some_and(|id| state.contains(id)) {
                        continue;
                    }
                    if item.origin.is_empty() {
                        item.origin = self.config.origin().to_string();
                    }
                    items.push(item);
                }
                Err(e) => warn!("'{}' emitted an unreadable item: {}", self.config.name, e),
            }
        }
        Ok(items)
    }
}

#[async_trait]
impl Source for CommandSource {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn poll(&self, state: &StateStore) -> Result<Vec<RawItem>> {
        let timeout = Duration::from_secs(self.config.timeout_secs);
        let output = execute(&self.config.command, &self.config.args, None, timeout)
            .await
            .map_err(|e| VaultflowError::External(format!("'{}': {}", self.config.name, e)))?;

        if !output.status.success() {
            return Err(failure(&self.config.name, &output));
        }
        self.decode(&output.stdout, state)
    }
}
