//! Two-pass orchestration
//!
//! The controller runs a job list through the worker pool twice at most:
//!
//! 1. **Pass 1**: every unique job. Items already in the ledger are skipped.
//! 2. **Residual**: each non-cancelled pass-1 failure is rechecked against the
//!    ledger. Keys that are present by now are reclassified as already present;
//!    the rest form the residual set.
//! 3. **Pass 2**: the residual set, if any. Its outcomes are final.
//!
//! Cancellation at any point ends the run in [`RunState::CancelledDone`] with a
//! partial summary. Individual job failures never abort the run.

mod residual;
mod summary;

pub use residual::{Residual, recheck_failures};
pub use summary::{RunReport, mirror_outcome, partition_unique, summarize};

use crate::context::RunContext;
use crate::pool::WorkerPool;
use crate::types::{Event, Job, JobKey, Outcome, Pass, RunState};
use std::collections::HashMap;
use tokio::sync::watch;

/// Drives one run from job list to summary
///
/// # Example
///
/// ```no_run
/// use sopti::cancellation::CancellationCoordinator;
/// use sopti::context::RunContext;
/// use sopti::db::Ledger;
/// use sopti::orchestrator::Orchestrator;
/// use sopti::runner::SpotdlRunner;
/// use std::path::Path;
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # #[tokio::main]
/// # async fn main() -> sopti::Result<()> {
/// let ledger = Ledger::open(Path::new("/tmp/downloads.db")).await?;
/// let runner = Arc::new(SpotdlRunner::from_path().expect("spotdl not installed"));
/// let (events, _) = tokio::sync::broadcast::channel(64);
/// let cancel = CancellationCoordinator::new(Duration::from_secs(10));
///
/// let ctx = RunContext::new(3, ledger.clone(), runner, events, cancel);
/// let report = Orchestrator::new(ctx).run(vec![]).await;
/// println!("exit status {}", report.summary.exit_code());
/// ledger.close().await;
/// # Ok(())
/// # }
/// ```
pub struct Orchestrator {
    pool: WorkerPool,
    state: watch::Sender<RunState>,
}

impl Orchestrator {
    /// Create an idle orchestrator
    pub fn new(ctx: RunContext) -> Self {
        let (state, _) = watch::channel(RunState::Idle);
        Self {
            pool: WorkerPool::new(ctx),
            state,
        }
    }

    /// Current state
    pub fn state(&self) -> RunState {
        *self.state.borrow()
    }

    /// Observe state transitions
    pub fn watch_state(&self) -> watch::Receiver<RunState> {
        self.state.subscribe()
    }

    fn ctx(&self) -> &RunContext {
        self.pool.context()
    }

    fn transition(&self, next: RunState) {
        let previous = self.state.send_replace(next);
        tracing::debug!(from = ?previous, to = ?next, "run state");
    }

    /// Execute the two-pass protocol over `jobs`
    ///
    /// Consumes the orchestrator: one instance drives exactly one run.
    pub async fn run(self, jobs: Vec<Job>) -> RunReport {
        let (unique, duplicates) = partition_unique(jobs);
        if !duplicates.is_empty() {
            tracing::info!(
                duplicates = duplicates.len(),
                "duplicate keys in job list, each is dispatched once"
            );
        }

        self.ctx().emit(Event::RunStarted {
            total: unique.len(),
            duplicates: duplicates.len(),
        });

        // Pass 1
        self.transition(RunState::Pass1Running);
        let mut results = self.run_pass(unique, Pass::First).await;

        let mut reclassified = Vec::new();
        let mut retried = Vec::new();

        if !self.ctx().cancel.is_cancelled() {
            let residual = recheck_failures(&self.ctx().ledger, &mut results).await;
            for key in &residual.reclassified {
                self.ctx().emit(Event::Reclassified { key: key.clone() });
            }
            reclassified = residual.reclassified.clone();
            self.transition(RunState::ResidualComputed);

            if !residual.is_empty() && !self.ctx().cancel.is_cancelled() {
                // Pass 2
                self.transition(RunState::Pass2Running);
                let retry_jobs: Vec<Job> = residual
                    .indices
                    .iter()
                    .map(|&i| results[i].0.clone())
                    .collect();
                retried = retry_jobs.iter().map(|j| j.key.clone()).collect();

                let second = self.run_pass(retry_jobs, Pass::Second).await;
                for (&index, (_, outcome)) in residual.indices.iter().zip(second) {
                    results[index].1 = outcome;
                }
            } else if !residual.is_empty() {
                tracing::info!(
                    residual = residual.indices.len(),
                    "run cancelled, skipping second pass"
                );
            }
        }

        let cancelled = self.ctx().cancel.is_cancelled();

        let failed_jobs: Vec<Job> = results
            .iter()
            .filter(|(_, outcome)| matches!(outcome, Outcome::Failed { .. }))
            .map(|(job, _)| job.clone())
            .collect();
        if !failed_jobs.is_empty() {
            self.ctx().runner.cleanup(&failed_jobs).await;
        }

        let mut outcomes: Vec<(JobKey, Outcome)> = results
            .into_iter()
            .map(|(job, outcome)| (job.key, outcome))
            .collect();

        let primary: HashMap<JobKey, Outcome> = outcomes.iter().cloned().collect();
        for dup in duplicates {
            let outcome = primary
                .get(&dup.key)
                .map(mirror_outcome)
                .unwrap_or_else(Outcome::cancelled);
            outcomes.push((dup.key, outcome));
        }

        let summary = summarize(outcomes.iter().map(|(k, o)| (k, o)), cancelled);

        self.transition(if cancelled {
            RunState::CancelledDone
        } else {
            RunState::Done
        });

        tracing::info!(
            succeeded = summary.succeeded,
            already_present = summary.already_present,
            failed = summary.failed.len(),
            cancelled,
            "run finished"
        );
        self.ctx().emit(Event::RunFinished {
            summary: summary.clone(),
        });

        RunReport {
            outcomes,
            reclassified,
            retried,
            summary,
        }
    }

    async fn run_pass(&self, jobs: Vec<Job>, pass: Pass) -> Vec<(Job, Outcome)> {
        self.ctx().emit(Event::PassStarted {
            pass,
            pending: jobs.len(),
        });

        let results = self.pool.execute_all(jobs, pass).await;

        let completed = results.iter().filter(|(_, o)| o.is_complete()).count();
        self.ctx().emit(Event::PassFinished {
            pass,
            completed,
            failed: results.len() - completed,
        });

        results
    }
}
