//! Common test utilities for sopti integration tests

#[allow(dead_code)]
pub mod runners;

#[allow(unused_imports)]
pub use runners::*;

use sopti::types::{Event, Job, Quality};
use sopti::{CancellationCoordinator, JobRunner, Ledger, Orchestrator, RunContext};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast;

/// A track job whose destination lives under `root`
#[allow(dead_code)]
pub fn track_job(key: &str, root: &Path) -> Job {
    Job::new(
        key,
        format!("https://open.spotify.com/track/{key}"),
        root.join("Mix"),
        Quality::default(),
    )
}

/// `count` distinct jobs named `t000`, `t001`, ...
#[allow(dead_code)]
pub fn numbered_jobs(count: usize, root: &Path) -> Vec<Job> {
    (0..count)
        .map(|i| track_job(&format!("t{i:03}"), root))
        .collect()
}

/// Ledger in a temporary directory plus the plumbing to build orchestrators
#[allow(dead_code)]
pub struct TestRun {
    pub dir: TempDir,
    pub ledger: Ledger,
    pub events: broadcast::Sender<Event>,
    pub cancel: CancellationCoordinator,
}

#[allow(dead_code)]
impl TestRun {
    pub async fn new() -> Self {
        Self::with_grace(Duration::from_secs(2)).await
    }

    pub async fn with_grace(grace: Duration) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let ledger = Ledger::open(&dir.path().join("downloads.db"))
            .await
            .expect("Failed to open ledger");
        let (events, _) = broadcast::channel(4096);
        Self {
            dir,
            ledger,
            events,
            cancel: CancellationCoordinator::new(grace),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn orchestrator(&self, workers: usize, runner: Arc<dyn JobRunner>) -> Orchestrator {
        Orchestrator::new(RunContext::new(
            workers,
            self.ledger.clone(),
            runner,
            self.events.clone(),
            self.cancel.clone(),
        ))
    }
}

/// Drain every event currently buffered in `rx`
#[allow(dead_code)]
pub fn drain(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
