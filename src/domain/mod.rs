//! Domain types for vaultflow
//!
//! Stages and lanes, priorities, the frontmatter codec and the work items built on it.

pub mod frontmatter;
pub mod item;
pub mod priority;
pub mod stage;

pub use frontmatter::Frontmatter;
pub use item::{DEDUP_KEY, RawItem, WorkItem};
pub use priority::{KeywordTiers, Priority, PriorityClassifier};
pub use stage::{Lane, Stage};
