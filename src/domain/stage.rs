//! Workflow stages and lanes
//!
//! A `Stage` is one folder of the workflow life cycle. A `Lane` is a stage plus an
//! optional channel sub-folder, e.g. `Ready_To_Send/Email`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::VaultflowError;

/// The workflow stages, each backed by a top-level folder of the vault
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    Inbox,
    NeedsAction,
    PendingApproval,
    ReadyToSend,
    ReadyToPost,
    Done,
    Rejected,
}

impl Stage {
    /// Every stage, in life-cycle order
    pub const ALL: [Stage; 7] = [
        Stage::Inbox,
        Stage::NeedsAction,
        Stage::PendingApproval,
        Stage::ReadyToSend,
        Stage::ReadyToPost,
        Stage::Done,
        Stage::Rejected,
    ];

    /// Folder name on disk
    pub fn dir_name(&self) -> &'static str {
        match self {
            Stage::Inbox => "Inbox",
            Stage::NeedsAction => "Needs_Action",
            Stage::PendingApproval => "Pending_Approval",
            Stage::ReadyToSend => "Ready_To_Send",
            Stage::ReadyToPost => "Ready_To_Post",
            Stage::Done => "Done",
            Stage::Rejected => "Rejected",
        }
    }

    /// Tag embedded in the filename of an item entering this stage
    pub fn default_tag(&self) -> &'static str {
        match self {
            Stage::Inbox => "inbox",
            Stage::NeedsAction => "action",
            Stage::PendingApproval => "review",
            Stage::ReadyToSend | Stage::ReadyToPost => "approved",
            Stage::Done => "done",
            Stage::Rejected => "rejected",
        }
    }

    /// Returns true if no workflow transition leaves this stage
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Done | Stage::Rejected)
    }

    /// Returns true if producers may admit new items here
    ///
    /// Ready lanes are only reachable through approval.
    pub fn is_entry(&self) -> bool {
        matches!(self, Stage::Inbox | Stage::NeedsAction | Stage::PendingApproval)
    }

    /// Returns true if an item may move directly from `self` to `to`
    pub fn can_transition_to(&self, to: Stage) -> bool {
        matches!(
            (self, to),
            (Stage::Inbox, Stage::NeedsAction)
                | (Stage::NeedsAction, Stage::PendingApproval)
                | (Stage::NeedsAction, Stage::Done)
                | (Stage::PendingApproval, Stage::ReadyToSend)
                | (Stage::PendingApproval, Stage::ReadyToPost)
                | (Stage::PendingApproval, Stage::Rejected)
                | (Stage::ReadyToSend, Stage::Done)
                | (Stage::ReadyToSend, Stage::Rejected)
                | (Stage::ReadyToPost, Stage::Done)
                | (Stage::ReadyToPost, Stage::Rejected)
        )
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

impl FromStr for Stage {
    type Err = VaultflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().replace('-', "_");
        Stage::ALL
            .into_iter()
            .find(|stage| {
                stage.dir_name().eq_ignore_ascii_case(&wanted)
                    || stage.dir_name().replace('_', "").eq_ignore_ascii_case(&wanted)
            })
            .ok_or_else(|| VaultflowError::UnknownStage(s.to_string()))
    }
}

/// A stage folder with an optional channel sub-folder
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Lane {
    pub stage: Stage,
    pub channel: Option<String>,
}

impl Lane {
    /// Lane for the top-level folder of a stage
    pub fn new(stage: Stage) -> Self {
        Self { stage, channel: None }
    }

    /// Lane for a channel sub-folder of a stage
    pub fn with_channel(stage: Stage, channel: impl Into<String>) -> Self {
        Self {
            stage,
            channel: Some(channel.into()),
        }
    }

    /// Same channel, different stage
    pub fn to_stage(&self, stage: Stage) -> Self {
        Self {
            stage,
            channel: self.channel.clone(),
        }
    }

    /// Directory of this lane below the vault root
    pub fn dir(&self, root: &Path) -> PathBuf {
        let base = root.join(self.stage.dir_name());
        match &self.channel {
            Some(channel) => base.join(channel),
            None => base,
        }
    }
}

impl From<Stage> for Lane {
    fn from(stage: Stage) -> Self {
        Lane::new(stage)
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.channel {
            Some(channel) => write!(f, "{}/{}", self.stage, channel),
            None => write!(f, "{}", self.stage),
        }
    }
}

impl FromStr for Lane {
    type Err = VaultflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_matches('/');
        let (stage, channel) = match trimmed.split_once('/') {
            Some((stage, channel)) => (stage, Some(channel.trim_matches('/'))),
            None => (trimmed, None),
        };

        let stage = stage.parse::<Stage>()?;
        match channel {
            Some(channel) if channel.is_empty() || channel.contains('/') || channel.contains("..") => {
                Err(VaultflowError::UnknownStage(s.to_string()))
            }
            Some(channel) => Ok(Lane::with_channel(stage, channel)),
            None => Ok(Lane::new(stage)),
        }
    }
}

impl TryFrom<String> for Lane {
    type Error = VaultflowError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Lane> for String {
    fn from(lane: Lane) -> Self {
        lane.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_dir_names() {
        assert_eq!(Stage::NeedsAction.dir_name(), "Needs_Action");
        assert_eq!(Stage::ReadyToPost.dir_name(), "Ready_To_Post");
        assert_eq!(Stage::Done.to_string(), "Done");
    }

    #[test]
    fn test_stage_parse_variants() {
        assert_eq!("Needs_Action".parse::<Stage>().unwrap(), Stage::NeedsAction);
        assert_eq!("needs-action".parse::<Stage>().unwrap(), Stage::NeedsAction);
        assert_eq!("pendingapproval".parse::<Stage>().unwrap(), Stage::PendingApproval);
        assert!("Archive".parse::<Stage>().is_err());
    }

    #[test]
    fn test_forward_transitions_allowed() {
        assert!(Stage::Inbox.can_transition_to(Stage::NeedsAction));
        assert!(Stage::NeedsAction.can_transition_to(Stage::PendingApproval));
        assert!(Stage::PendingApproval.can_transition_to(Stage::ReadyToSend));
        assert!(Stage::PendingApproval.can_transition_to(Stage::ReadyToPost));
        assert!(Stage::ReadyToSend.can_transition_to(Stage::Done));
        assert!(Stage::ReadyToPost.can_transition_to(Stage::Rejected));
    }

    #[test]
    fn test_backward_transitions_rejected() {
        assert!(!Stage::Done.can_transition_to(Stage::Inbox));
        assert!(!Stage::Rejected.can_transition_to(Stage::PendingApproval));
        assert!(!Stage::ReadyToSend.can_transition_to(Stage::PendingApproval));
        assert!(!Stage::NeedsAction.can_transition_to(Stage::NeedsAction));
    }

    #[test]
    fn test_entry_stages() {
        let entry: Vec<Stage> = Stage::ALL.into_iter().filter(|s| s.is_entry()).collect();
        assert_eq!(entry, vec![Stage::Inbox, Stage::NeedsAction, Stage::PendingApproval]);
    }

    #[test]
    fn test_terminal_stages() {
        assert!(Stage::Done.is_terminal());
        assert!(Stage::Rejected.is_terminal());
        assert!(!Stage::ReadyToSend.is_terminal());
    }

    #[test]
    fn test_lane_display_and_parse() {
        let lane: Lane = "Ready_To_Send/Email".parse().unwrap();
        assert_eq!(lane.stage, Stage::ReadyToSend);
        assert_eq!(lane.channel.as_deref(), Some("Email"));
        assert_eq!(lane.to_string(), "Ready_To_Send/Email");

        let plain: Lane = "Done".parse().unwrap();
        assert_eq!(plain, Lane::new(Stage::Done));
    }

    #[test]
    fn test_lane_rejects_nested_channels() {
        assert!("Done/a/b".parse::<Lane>().is_err());
        assert!("Done/..".parse::<Lane>().is_err());
    }

    #[test]
    fn test_lane_dir() {
        let root = Path::new("/vault");
        let lane = Lane::with_channel(Stage::ReadyToPost, "LinkedIn");
        assert_eq!(lane.dir(root), PathBuf::from("/vault/Ready_To_Post/LinkedIn"));
        assert_eq!(lane.to_stage(Stage::Done).dir(root), PathBuf::from("/vault/Done/LinkedIn"));
    }

    #[test]
    fn test_lane_serde_as_string() {
        let lane = Lane::with_channel(Stage::PendingApproval, "Email");
        let json = serde_json::to_string(&lane).unwrap();
        assert_eq!(json, "\"Pending_Approval/Email\"");
        let back: Lane = serde_json::from_str(&json).unwrap();
        assert_eq!(back, lane);
    }
}
