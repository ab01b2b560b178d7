//! CLI module for vaultflow - command-line interface and subcommands.
//!
//! One binary serves every role: scheduler, watchers, senders and the manual queue
//! helpers.

pub mod commands;

pub use commands::Cli;
