//! Storage layer for vaultflow - per-process state files.
//!
//! Each watcher or scheduler process owns exactly one state file. Nothing here is shared
//! between processes; the stage folders are the only shared resource.

mod state;

pub use state::{PROCESSED_IDS_KEY, StateStore, is_reserved_key};
