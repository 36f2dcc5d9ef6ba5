//! The unit-of-work runner seam

use crate::types::{Job, Outcome};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Executes one job to a terminal [`Outcome`]
///
/// Implementations never return errors: anything that goes wrong while
/// acquiring a single item becomes `Outcome::Failed` with a reason, so one bad
/// item never aborts the run.
///
/// # Cancellation
///
/// If `cancel` is already cancelled when `run` is called, the implementation
/// must return `Failed { Cancelled }` without starting any work. If it fires
/// while work is in progress, the implementation must stop that work
/// (terminating any child process) and return `Failed { Cancelled }`.
///
/// # Examples
///
/// ```no_run
/// use sopti::runner::{JobRunner, SpotdlRunner};
/// use sopti::types::{Job, Quality};
/// use tokio_util::sync::CancellationToken;
///
/// # #[tokio::main]
/// # async fn main() {
/// let runner = SpotdlRunner::from_path().expect("spotdl not found");
/// let job = Job::new(
///     "4uLU6hMCjMI75M1A2tKUQC",
///     "https://open.spotify.com/track/4uLU6hMCjMI75M1A2tKUQC",
///     "/music",
///     Quality::default(),
/// );
///
/// let outcome = runner.run(&job, &CancellationToken::new()).await;
/// println!("{outcome:?}");
/// # }
/// ```
#[async_trait]
pub trait JobRunner: Send + Sync {
    /// Acquire `job`, observing `cancel`
    async fn run(&self, job: &Job, cancel: &CancellationToken) -> Outcome;

    /// Housekeeping once the run is over
    ///
    /// Called with every job that ended the run failed, after all runners have
    /// stopped. The default does nothing.
    async fn cleanup(&self, _failed: &[Job]) {}

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}
