//! Vaultflow - a folder-based workflow queue with a cron dispatch engine
//!
//! Work items are markdown files with a YAML-style header. Each stage of the workflow
//! is a folder in the vault, and moving an item between stages is a rename. Producers
//! admit new items, a human approves or rejects drafts, senders deliver ready items,
//! and the scheduler runs maintenance and dispatch actions on cron expressions.

pub mod clock;
pub mod config;
pub mod daemon;
pub mod domain;
pub mod error;
pub mod external;
pub mod id;
pub mod queue;
pub mod scheduler;
pub mod storage;
pub mod workflow;

pub use error::{Result, VaultflowError};
