//! Daemon Core - the shared polling loop and shutdown signal
//!
//! Every long-running role (scheduler, watcher, sender) is a `Tick` driven by
//! `run_loop` until shutdown is requested.

pub mod tick;

pub use tick::*;
