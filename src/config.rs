use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::{KeywordTiers, Lane, Stage};
use crate::error::{Result, VaultflowError};

/// Folders that live in the vault next to the stage folders
pub const SUPPORT_DIRS: [&str; 3] = ["Plans", "Accounting", "Briefings"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root of the stage folder tree; relative paths below resolve against it
    pub vault_path: PathBuf,
    pub log_level: Option<String>,
    pub log_dir: Option<PathBuf>,
    pub scheduler: SchedulerConfig,
    pub inbox: InboxConfig,
    pub priority: KeywordTiers,
    /// Item type -> header keys an item of that type must carry
    pub required_keys: BTreeMap<String, Vec<String>>,
    /// Item type -> lane an approved item of that type moves to
    pub routes: BTreeMap<String, Lane>,
    pub senders: Vec<SenderConfig>,
    pub sources: Vec<SourceConfig>,
    pub reports: ReportsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub schedule_file: PathBuf,
    pub state_file: PathBuf,
    pub poll_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            schedule_file: PathBuf::from("schedule.yaml"),
            state_file: PathBuf::from("scheduler_state.json"),
            poll_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InboxConfig {
    pub state_file: PathBuf,
    pub interval_secs: u64,
    pub preview_lines: usize,
    pub max_preview_bytes: u64,
    /// Extensions (without the dot) whose content is previewed
    pub text_extensions: Vec<String>,
}

impl Default for InboxConfig {
    fn default() -> Self {
        Self {
            state_file: PathBuf::from("watcher_state.json"),
            interval_secs: 5,
            preview_lines: 10,
            max_preview_bytes: 100_000,
            text_extensions: ["txt", "md", "py", "js", "json", "csv", "html", "css"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// An external program that delivers ready items
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SenderConfig {
    pub name: String,
    /// Ready lane this sender drains
    pub lane: Lane,
    /// Program to run; the item path is appended as the last argument
    pub command: String,
    pub args: Vec<String>,
    /// Environment variables that must be set at startup
    pub required_env: Vec<String>,
    /// Verb used in the Done filename (`sent`, `posted`)
    pub tag: String,
    pub timeout_secs: u64,
    pub interval_secs: u64,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            lane: Lane::with_channel(Stage::ReadyToSend, "Email"),
            command: String::new(),
            args: Vec::new(),
            required_env: Vec::new(),
            tag: "sent".to_string(),
            timeout_secs: 120,
            interval_secs: 60,
        }
    }
}

/// An external program that emits new raw items as JSON on stdout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    /// Origin tag used when an emitted item does not name one
    pub origin: String,
    pub required_env: Vec<String>,
    /// Defaults to `<name>_state.json`
    pub state_file: Option<PathBuf>,
    pub timeout_secs: u64,
    pub interval_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            command: String::new(),
            args: Vec::new(),
            origin: String::new(),
            required_env: Vec::new(),
            state_file: None,
            timeout_secs: 120,
            interval_secs: 120,
        }
    }
}

impl SourceConfig {
    pub fn origin(&self) -> &str {
        if self.origin.is_empty() { &self.name } else { &self.origin }
    }

    pub fn state_file(&self) -> PathBuf {
        self.state_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("{}_state.json", self.name)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportsConfig {
    pub log_retention_days: u32,
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self { log_retention_days: 30 }
    }
}

fn default_required_keys() -> BTreeMap<String, Vec<String>> {
    let mut keys = BTreeMap::new();
    keys.insert("email".to_string(), vec!["from".to_string(), "subject".to_string()]);
    keys.insert("email_draft".to_string(), vec!["to".to_string(), "subject".to_string()]);
    keys.insert("file_inbox".to_string(), vec!["original_file".to_string()]);
    keys
}

fn default_routes() -> BTreeMap<String, Lane> {
    let mut routes = BTreeMap::new();
    routes.insert("email_draft".to_string(), Lane::with_channel(Stage::ReadyToSend, "Email"));
    routes.insert("linkedin_post".to_string(), Lane::with_channel(Stage::ReadyToPost, "LinkedIn"));
    routes
}

impl Default for Config {
    fn default() -> Self {
        Self {
            vault_path: PathBuf::from("vault"),
            log_level: Some("info".to_string()),
            log_dir: None,
            scheduler: SchedulerConfig::default(),
            inbox: InboxConfig::default(),
            priority: KeywordTiers::default(),
            required_keys: default_required_keys(),
            routes: default_routes(),
            senders: Vec::new(),
            sources: Vec::new(),
            reports: ReportsConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, it must load
        if let Some(path) = config_path {
            return Self::load_from_file(path).map_err(|e| {
                VaultflowError::Configuration(format!("Failed to load config from {}: {}", path.display(), e))
            });
        }

        let project_name = env!("CARGO_PKG_NAME");

        // Try primary location: ~/.config/<project>/<project>.yml
        if let Some(config_dir) = dirs::config_dir() {
            let primary_config = config_dir.join(project_name).join(format!("{}.yml", project_name));
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", primary_config.display(), e);
                    }
                }
            }
        }

        // Try fallback location: ./<project>.yml
        let fallback_config = PathBuf::from(format!("{}.yml", project_name));
        if fallback_config.exists() {
            match Self::load_from_file(&fallback_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", fallback_config.display(), e);
                }
            }
        }

        // No config file found, use defaults
        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)?;
        let config = Self::from_yaml(&content)?;
        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings no process could run with
    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for sender in &self.senders {
            if sender.name.is_empty() || sender.command.is_empty() {
                return Err(VaultflowError::Configuration(
                    "every sender needs a name and a command".to_string(),
                ));
            }
            if !matches!(sender.lane.stage, Stage::ReadyToSend | Stage::ReadyToPost) {
                return Err(VaultflowError::Configuration(format!(
                    "sender '{}' must drain a ready lane, not {}",
                    sender.name, sender.lane
                )));
            }
            if !names.insert(sender.name.as_str()) {
                return Err(VaultflowError::Configuration(format!("duplicate sender '{}'", sender.name)));
            }
        }

        let mut names = HashSet::new();
        for source in &self.sources {
            if source.name.is_empty() || source.command.is_empty() {
                return Err(VaultflowError::Configuration(
                    "every source needs a name and a command".to_string(),
                ));
            }
            if source.name == "inbox" || !names.insert(source.name.as_str()) {
                return Err(VaultflowError::Configuration(format!(
                    "source name '{}' is already taken",
                    source.name
                )));
            }
        }

        for (item_type, lane) in &self.routes {
            if !matches!(lane.stage, Stage::ReadyToSend | Stage::ReadyToPost) {
                return Err(VaultflowError::Configuration(format!(
                    "route for '{}' must point at a ready lane, not {}",
                    item_type, lane
                )));
            }
        }

        if self.scheduler.poll_interval_secs == 0 || self.inbox.interval_secs == 0 {
            return Err(VaultflowError::Configuration("poll intervals must be positive".to_string()));
        }
        Ok(())
    }

    /// Resolve a configured path against the vault root
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.vault_path.join(path)
        }
    }

    pub fn log_dir(&self) -> PathBuf {
        self.log_dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(env!("CARGO_PKG_NAME"))
                .join("logs")
        })
    }

    pub fn sender(&self, name: &str) -> Option<&SenderConfig> {
        self.senders.iter().find(|s| s.name == name)
    }

    pub fn source(&self, name: &str) -> Option<&SourceConfig> {
        self.sources.iter().find(|s| s.name == name)
    }

    /// Channel lanes the vault should have: the approval, ready and rejected lane of
    /// every routed channel plus every sender lane
    pub fn lanes(&self) -> Vec<Lane> {
        let mut lanes: Vec<Lane> = Vec::new();
        let ready = self.routes.values().chain(self.senders.iter().map(|s| &s.lane));
        for lane in ready {
            let mut related = vec![lane.clone()];
            if lane.channel.is_some() {
                related.push(lane.to_stage(Stage::PendingApproval));
                related.push(lane.to_stage(Stage::Rejected));
            }
            for lane in related {
                if !lanes.contains(&lane) {
                    lanes.push(lane);
                }
            }
        }
        lanes.sort_by_key(|lane| (lane.stage, lane.channel.clone()));
        lanes
    }
}
