//! Work items and raw producer submissions

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::domain::frontmatter::{self, Frontmatter};
use crate::domain::priority::Priority;
use crate::domain::stage::Lane;
use crate::error::Result;

/// Header key holding the producer's dedup id
pub const DEDUP_KEY: &str = "dedup_id";

/// One queued file, as read from a lane folder
#[derive(Debug, Clone, PartialEq)]
pub struct WorkItem {
    /// File stem, unique within its lane
    pub id: String,
    /// Lane the file was read from
    pub lane: Lane,
    /// Full path of the file
    pub path: PathBuf,
    pub priority: Priority,
    pub created_at: Option<NaiveDateTime>,
    pub dedup_id: Option<String>,
    pub frontmatter: Frontmatter,
    pub body: String,
}

impl WorkItem {
    /// Read and decode an item file
    pub fn load(path: &Path, lane: Lane) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(Self::from_text(path, lane, &text))
    }

    /// Build an item from already-read file text
    pub fn from_text(path: &Path, lane: Lane, text: &str) -> Self {
        let (frontmatter, body) = frontmatter::decode(text);
        let id = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        Self {
            id,
            lane,
            path: path.to_path_buf(),
            priority: frontmatter.priority(),
            created_at: frontmatter.timestamp("created"),
            dedup_id: frontmatter.get(DEDUP_KEY).map(str::to_string),
            frontmatter,
            body,
        }
    }

    /// Declared `type` header, if any
    pub fn item_type(&self) -> Option<&str> {
        self.frontmatter.get("type")
    }

    /// Filename including extension
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.id.clone())
    }
}

/// An item a producer wants to enqueue
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawItem {
    /// Short producer tag embedded in the filename (`gmail`, `inbox`, `draft`)
    pub origin: String,
    /// Human title; becomes the filename slug and feeds priority classification
    pub title: String,
    /// Producer-chosen id for idempotent admission
    pub dedup_id: Option<String>,
    pub frontmatter: Frontmatter,
    pub body: String,
    /// Destination lane; `Needs_Action` when absent. Only entry stages are accepted
    /// on admission.
    pub lane: Option<Lane>,
}

impl RawItem {
    pub fn new(origin: impl Into<String>, item_type: impl Into<String>, title: impl Into<String>) -> Self {
        let mut frontmatter = Frontmatter::new();
        frontmatter.set("type", item_type);
        Self {
            origin: origin.into(),
            title: title.into(),
            frontmatter,
            ..Default::default()
        }
    }

    pub fn with_dedup_id(mut self, id: impl Into<String>) -> Self {
        self.dedup_id = Some(id.into());
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.frontmatter.set(key, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_lane(mut self, lane: Lane) -> Self {
        self.lane = Some(lane);
        self
    }

    pub fn item_type(&self) -> Option<&str> {
        self.frontmatter.get("type")
    }
}
