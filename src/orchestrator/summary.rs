//! Aggregation of final outcomes

use crate::types::{FailedItem, Job, JobKey, Outcome, RunSummary};
use serde::Serialize;

/// Everything a finished run produced
#[derive(Clone, Debug, Serialize)]
pub struct RunReport {
    /// Final outcome of every submitted job: unique jobs in submission order,
    /// then duplicate submissions
    pub outcomes: Vec<(JobKey, Outcome)>,
    /// First-pass failures overturned by the ledger recheck
    pub reclassified: Vec<JobKey>,
    /// Keys submitted to the second pass
    pub retried: Vec<JobKey>,
    /// Aggregated counts
    pub summary: RunSummary,
}

impl RunReport {
    /// Final outcome for `key` (the first one, for duplicated keys)
    pub fn outcome(&self, key: &JobKey) -> Option<&Outcome> {
        self.outcomes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, outcome)| outcome)
    }
}

/// Fold final outcomes into a [`RunSummary`]
pub fn summarize<'a, I>(outcomes: I, cancelled: bool) -> RunSummary
where
    I: IntoIterator<Item = (&'a JobKey, &'a Outcome)>,
{
    let mut summary = RunSummary {
        cancelled,
        ..Default::default()
    };

    for (key, outcome) in outcomes {
        match outcome {
            Outcome::Success => summary.succeeded += 1,
            Outcome::AlreadyPresent => summary.already_present += 1,
            Outcome::Failed { reason } => summary.failed.push(FailedItem {
                key: key.clone(),
                reason: reason.clone(),
            }),
        }
    }

    summary
}

/// Split a job list into first occurrences and repeats of an earlier key
pub fn partition_unique(jobs: Vec<Job>) -> (Vec<Job>, Vec<Job>) {
    let mut seen = std::collections::HashSet::new();
    let mut unique = Vec::with_capacity(jobs.len());
    let mut duplicates = Vec::new();

    for job in jobs {
        if seen.insert(job.key.clone()) {
            unique.push(job);
        } else {
            duplicates.push(job);
        }
    }

    (unique, duplicates)
}

/// Outcome recorded for a duplicate submission, given its primary's outcome
///
/// The duplicate was never dispatched: if the primary completed, the item is
/// already present for the duplicate; otherwise it shares the primary's fate.
pub fn mirror_outcome(primary: &Outcome) -> Outcome {
    if primary.is_complete() {
        Outcome::AlreadyPresent
    } else {
        primary.clone()
    }
}
