//! Per-run context shared by the orchestrator, the pool and its workers

use crate::cancellation::CancellationCoordinator;
use crate::config::MAX_WORKERS;
use crate::db::Ledger;
use crate::runner::JobRunner;
use crate::types::Event;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Capacity of the event channel
///
/// Slow subscribers lag and skip events rather than blocking workers.
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Everything one run needs, passed explicitly
///
/// Cloning is cheap; all fields are handles.
#[derive(Clone)]
pub struct RunContext {
    workers: usize,
    /// Dedup ledger
    pub ledger: Ledger,
    /// Runner invoked for every dispatched job
    pub runner: Arc<dyn JobRunner>,
    /// Event stream
    pub events: broadcast::Sender<Event>,
    /// Run-wide cancellation
    pub cancel: CancellationCoordinator,
}

impl RunContext {
    /// Build a context
    ///
    /// `workers` is clamped to `1..=MAX_WORKERS`; configuration validation
    /// rejects 0 before it gets here.
    pub fn new(
        workers: usize,
        ledger: Ledger,
        runner: Arc<dyn JobRunner>,
        events: broadcast::Sender<Event>,
        cancel: CancellationCoordinator,
    ) -> Self {
        Self {
            workers: workers.clamp(1, MAX_WORKERS),
            ledger,
            runner,
            events,
            cancel,
        }
    }

    /// Worker bound for this run
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Subscribe to this run's events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// Emit an event to all subscribers
    pub(crate) fn emit(&self, event: Event) {
        // send() returns Err if there are no receivers, which is fine - we just drop the event
        self.events.send(event).ok();
    }
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("workers", &self.workers)
            .field("runner", &self.runner.name())
            .field("cancel", &self.cancel)
            .finish_non_exhaustive()
    }
}
