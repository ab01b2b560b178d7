//! Priority tiers and the keyword classifier.
//!
//! Text is matched case-insensitively against three keyword tiers. Tiers are scanned
//! critical, then high, then low, so the highest tier with any hit wins; text with no
//! hit at all is `Normal`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::VaultflowError;

/// Priority of a work item. Ordered so that `Critical` sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum Priority {
    Critical,
    High,
    #[default]
    Normal,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Critical => "Critical",
            Priority::High => "High",
            Priority::Normal => "Normal",
            Priority::Low => "Low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = VaultflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "critical" => Ok(Priority::Critical),
            "high" => Ok(Priority::High),
            "normal" | "medium" => Ok(Priority::Normal),
            "low" => Ok(Priority::Low),
            other => Err(VaultflowError::Parse(format!("unknown priority: {}", other))),
        }
    }
}

/// Keyword lists for each non-default tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordTiers {
    pub critical: Vec<String>,
    pub high: Vec<String>,
    pub low: Vec<String>,
}

impl Default for KeywordTiers {
    fn default() -> Self {
        fn words(list: &[&str]) -> Vec<String> {
            list.iter().map(|w| w.to_string()).collect()
        }

        Self {
            critical: words(&["urgent", "emergency", "critical", "asap", "deadline"]),
            high: words(&["important", "priority", "please review", "action required"]),
            low: words(&["fyi", "for your information", "newsletter", "unsubscribe", "update"]),
        }
    }
}

/// Maps free text to a priority tier
#[derive(Debug, Clone)]
pub struct PriorityClassifier {
    tiers: Vec<(Priority, Vec<String>)>,
}

impl PriorityClassifier {
    pub fn new(keywords: &KeywordTiers) -> Self {
        let lower = |list: &[String]| -> Vec<String> {
            list.iter()
                .map(|w| w.trim().to_lowercase())
                .filter(|w| !w.is_empty())
                .collect()
        };

        Self {
            tiers: vec![
                (Priority::Critical, lower(&keywords.critical)),
                (Priority::High, lower(&keywords.high)),
                (Priority::Low, lower(&keywords.low)),
            ],
        }
    }

    /// Classify text; first tier (in priority order) with a substring hit wins
    pub fn classify(&self, text: &str) -> Priority {
        let haystack = text.to_lowercase();
        self.tiers
            .iter()
            .find(|(_, words)| words.iter().any(|w| haystack.contains(w.as_str())))
            .map(|(priority, _)| *priority)
            .unwrap_or_default()
    }
}

impl Default for PriorityClassifier {
    fn default() -> Self {
        Self::new(&KeywordTiers::default())
    }
}
