//! Tick Loop - the polling loop every long-running role shares
//!
//! Each tick:
//! - reads the time from the injected clock
//! - runs one pass of the role's work
//! - sleeps for the poll interval, waking early on shutdown
//!
//! A failing pass is logged and counted; the loop keeps going.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use log::{debug, error, info};
use tokio::sync::watch;

use crate::clock::Clock;
use crate::error::Result;

/// One pass of polled work (a scheduler check, a watcher poll, a drain)
#[async_trait]
pub trait Tick: Send {
    /// Short name used in log lines
    fn name(&self) -> &str;

    /// Do one pass; returns how many units of work were done
    async fn tick(&mut self, now: NaiveDateTime) -> Result<usize>;
}

/// Configuration for the tick loop
#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Interval between passes
    pub tick_interval: Duration,
    /// Stop after this many passes (`Some(1)` is `--check-once`)
    pub max_ticks: Option<u64>,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(60),
            max_ticks: None,
        }
    }
}

impl TickConfig {
    /// Create a new tick config
    pub fn new(tick_interval: Duration) -> Self {
        Self {
            tick_interval,
            max_ticks: None,
        }
    }

    /// Run a single pass then stop
    pub fn once() -> Self {
        Self::default().with_max_ticks(1)
    }

    pub fn with_max_ticks(mut self, max_ticks: u64) -> Self {
        self.max_ticks = Some(max_ticks);
        self
    }
}

/// Counters kept across passes
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickState {
    /// Number of passes since start
    pub tick_count: u64,
    /// Units of work done this session
    pub total_work: u64,
    /// Passes that returned an error
    pub total_failed: u64,
    /// Whether shutdown has been requested
    pub shutdown_requested: bool,
}

impl TickState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finished pass
    pub fn tick(&mut self, work: usize) {
        self.tick_count += 1;
        self.total_work += work as u64;
    }

    /// Record a failed pass
    pub fn failed(&mut self) {
        self.tick_count += 1;
        self.total_failed += 1;
    }

    pub fn request_shutdown(&mut self) {
        self.shutdown_requested = true;
    }

    fn reached(&self, config: &TickConfig) -> bool {
        config.max_ticks.is_some_and(|max| self.tick_count >= max)
    }
}

/// Create the shutdown channel; send `true` to stop every loop holding a receiver
pub fn shutdown_channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

/// Drive `task` until shutdown or `max_ticks`
///
/// Shutdown is checked between passes, never inside one, so an in-flight pass always
/// finishes its state writes.
pub async fn run_loop<T: Tick + ?Sized>(
    task: &mut T,
    clock: &dyn Clock,
    config: &TickConfig,
    mut shutdown: watch::Receiver<bool>,
) -> TickState {
    let mut state = TickState::new();
    info!("{} loop started, polling every {:?}", task.name(), config.tick_interval);

    loop {
        if *shutdown.borrow() {
            state.request_shutdown();
            break;
        }

        let now = clock.now();
        match task.tick(now).await {
            Ok(work) => {
                debug!("{} pass {} did {} units of work", task.name(), state.tick_count + 1, work);
                state.tick(work);
            }
            Err(e) => {
                error!("{} pass failed: {}", task.name(), e);
                state.failed();
            }
        }

        if state.reached(config) {
            break;
        }

        tokio::select! {
            _ = clock.sleep(config.tick_interval) => {}
            changed = shutdown.changed() => {
                if changed.is_err() {
                    // Sender gone; nobody can stop us any more, so stop now
                    state.request_shutdown();
                    break;
                }
            }
        }
    }

    info!(
        "{} loop stopped after {} passes ({} units of work, {} failed)",
        task.name(),
        state.tick_count,
        state.total_work,
        state.total_failed
    );
    state
}
