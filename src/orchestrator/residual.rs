//! Residual computation between the two passes

use crate::db::Ledger;
use crate::types::{Job, JobKey, Outcome};

/// Result of rechecking first-pass failures
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Residual {
    /// Positions (into the first-pass results) of jobs to run again
    pub indices: Vec<usize>,
    /// Keys whose failure was overturned by a ledger record
    pub reclassified: Vec<JobKey>,
}

impl Residual {
    /// Whether a second pass is needed
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Recheck every non-cancelled first-pass failure against the ledger
///
/// A failure whose key is in the ledger by now (a concurrent process, or an
/// earlier run finishing it) is rewritten to `AlreadyPresent` in place and
/// excluded from the second pass. A failed lookup counts as "absent".
pub async fn recheck_failures(ledger: &Ledger, results: &mut [(Job, Outcome)]) -> Residual {
    let mut residual = Residual::default();

    for (index, (job, outcome)) in results.iter_mut().enumerate() {
        if !matches!(outcome, Outcome::Failed { .. }) || outcome.is_cancelled() {
            continue;
        }

        match ledger.contains(&job.key).await {
            Ok(true) => {
                tracing::info!(job = %job.key, "failed job found in ledger, reclassified as already present");
                *outcome = Outcome::AlreadyPresent;
                residual.reclassified.push(job.key.clone());
            }
            Ok(false) => residual.indices.push(index),
            Err(e) => {
                tracing::warn!(job = %job.key, error = %e, "ledger recheck failed, treating as absent");
                residual.indices.push(index);
            }
        }
    }

    residual
}
