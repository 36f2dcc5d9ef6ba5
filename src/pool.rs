//! Bounded worker pool
//!
//! One pass over a job list: a shared FIFO queue feeds exactly
//! `min(workers, jobs)` executor tasks. Each executor repeatedly takes the next
//! job, skips it if the ledger already has it, otherwise runs it, records
//! completions in the ledger and reports the outcome. Every submitted job ends
//! the pass with exactly one outcome.

use crate::context::RunContext;
use crate::types::{Event, FailureReason, Job, Outcome, Pass};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinSet;

/// Shared state of one pass
struct PassState {
    jobs: Vec<Job>,
    queue: Mutex<VecDeque<usize>>,
    outcomes: Mutex<Vec<Option<Outcome>>>,
}

/// Runs passes over job lists with bounded concurrency
#[derive(Clone, Debug)]
pub struct WorkerPool {
    ctx: RunContext,
}

impl WorkerPool {
    /// Create a pool over `ctx`
    pub fn new(ctx: RunContext) -> Self {
        Self { ctx }
    }

    /// The pool's run context
    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    /// Process every job and return each with its outcome, in submission order
    ///
    /// Dispatch stops as soon as the run is cancelled. In-flight jobs then get
    /// the grace period to finish (runners terminate their processes); whatever
    /// is still running afterwards is aborted. Jobs that were never dispatched,
    /// or never reported, are given `Failed { Cancelled }`.
    pub async fn execute_all(&self, jobs: Vec<Job>, pass: Pass) -> Vec<(Job, Outcome)> {
        let total = jobs.len();
        if total == 0 {
            return Vec::new();
        }

        let executors = self.ctx.workers().min(total);
        tracing::info!(pass = %pass, jobs = total, executors, "starting pass");

        let state = Arc::new(PassState {
            jobs,
            queue: Mutex::new((0..total).collect()),
            outcomes: Mutex::new(vec![None; total]),
        });

        let mut executor_set = JoinSet::new();
        for worker_id in 0..executors {
            let ctx = self.ctx.clone();
            let state = Arc::clone(&state);
            executor_set.spawn(async move { run_executor(worker_id, ctx, state, pass).await });
        }

        let token = self.ctx.cancel.token();
        tokio::select! {
            () = join_all(&mut executor_set) => {}
            () = token.cancelled() => {}
        }

        if !executor_set.is_empty() {
            self.ctx.emit(Event::Cancelling);
            let grace = self.ctx.cancel.grace_period();
            tracing::info!(
                pass = %pass,
                in_flight = executor_set.len(),
                grace_period_secs = grace.as_secs_f64(),
                "waiting for in-flight jobs to stop"
            );

            if tokio::time::timeout(grace, join_all(&mut executor_set))
                .await
                .is_err()
            {
                tracing::warn!(
                    pass = %pass,
                    remaining = executor_set.len(),
                    "grace period elapsed, aborting remaining workers"
                );
                executor_set.abort_all();
                join_all(&mut executor_set).await;
            }
        }

        let cancelled = self.ctx.cancel.is_cancelled();
        let outcomes = std::mem::take(&mut *state.outcomes.lock().await);

        let mut results = Vec::with_capacity(total);
        for (job, outcome) in state.jobs.iter().zip(outcomes) {
            let outcome = match outcome {
                Some(outcome) => outcome,
                None => {
                    // Never dispatched, or its worker was aborted or panicked
                    let outcome = if cancelled {
                        Outcome::cancelled()
                    } else {
                        Outcome::Failed {
                            reason: FailureReason::Other {
                                message: "worker stopped unexpectedly".into(),
                            },
                        }
                    };
                    self.ctx.emit(Event::ItemFinished {
                        key: job.key.clone(),
                        name: job.display_name().to_string(),
                        outcome: outcome.clone(),
                        pass,
                    });
                    outcome
                }
            };
            results.push((job.clone(), outcome));
        }

        tracing::info!(pass = %pass, jobs = total, cancelled, "pass finished");
        results
    }
}

async fn join_all(set: &mut JoinSet<()>) {
    while let Some(joined) = set.join_next().await {
        if let Err(e) = joined
            && e.is_panic()
        {
            tracing::error!(error = %e, "worker panicked");
        }
    }
}

async fn run_executor(worker_id: usize, ctx: RunContext, state: Arc<PassState>, pass: Pass) {
    let token = ctx.cancel.token();

    loop {
        if token.is_cancelled() {
            tracing::debug!(worker_id, "cancelled, stopping dispatch");
            break;
        }

        let next = state.queue.lock().await.pop_front();
        let Some(index) = next else {
            break;
        };
        let job = &state.jobs[index];

        let outcome = process_job(&ctx, job, pass).await;

        state.outcomes.lock().await[index] = Some(outcome.clone());
        ctx.emit(Event::ItemFinished {
            key: job.key.clone(),
            name: job.display_name().to_string(),
            outcome,
            pass,
        });
    }
}

async fn process_job(ctx: &RunContext, job: &Job, pass: Pass) -> Outcome {
    match ctx.ledger.contains(&job.key).await {
        Ok(true) => {
            tracing::debug!(job = %job.key, pass = %pass, "already in ledger, skipping");
            return Outcome::AlreadyPresent;
        }
        Ok(false) => {}
        Err(e) => {
            tracing::warn!(job = %job.key, error = %e, "ledger lookup failed, treating as absent");
        }
    }

    let token = ctx.cancel.token();
    tracing::debug!(job = %job.key, pass = %pass, runner = ctx.runner.name(), "dispatching");
    let outcome = ctx.runner.run(job, &token).await;

    if outcome.is_complete() {
        if let Err(e) = ctx.ledger.record(job).await {
            tracing::error!(job = %job.key, error = %e, "failed to record completion in ledger");
        }
    } else if let Some(reason) = outcome.failure() {
        if !outcome.is_cancelled() {
            tracing::debug!(job = %job.key, pass = %pass, reason = %reason, "job failed");
        }
    }

    outcome
}
