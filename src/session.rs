//! Scoped run
//!
//! A session owns everything one invocation acquires: it runs preflight, opens
//! the ledger, installs the signal listener and the reporter, drives the
//! orchestrator, and releases all of it again on every exit path.

use crate::cancellation::CancellationCoordinator;
use crate::config::Config;
use crate::context::{EVENT_CHANNEL_CAPACITY, RunContext};
use crate::orchestrator::{Orchestrator, RunReport};
use crate::preflight::{ensure_tools, ensure_writable, open_ledger};
use crate::reporter::{ReportMode, Reporter};
use crate::runner::{JobRunner, SpotdlRunner};
use crate::types::{Job, RunSummary};
use crate::Result;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Run `jobs` with the spotdl runner
///
/// Fails only on fatal startup conditions (missing tools, unwritable
/// destination, unavailable ledger); item failures are in the summary.
///
/// # Example
///
/// ```no_run
/// use sopti::config::Config;
/// use sopti::session::run_session;
/// use sopti::types::{WorkItem, flatten_work_items};
///
/// # #[tokio::main]
/// # async fn main() -> sopti::Result<()> {
/// let config = Config::default().validate()?;
/// let items: Vec<WorkItem> = serde_json::from_str(&std::fs::read_to_string("jobs.json")?)?;
/// let jobs = flatten_work_items(&items, &config.download.music_dir, &config.quality());
///
/// let summary = run_session(&config, jobs).await?;
/// std::process::exit(summary.exit_code());
/// # }
/// ```
pub async fn run_session(config: &Config, jobs: Vec<Job>) -> Result<RunSummary> {
    let tools = ensure_tools(&config.tools)?;
    let runner = SpotdlRunner::from_config(tools.spotdl, &config.tools, &config.retry);

    let cancel = CancellationCoordinator::from_config(&config.shutdown);
    let report = run_session_with(config, jobs, Arc::new(runner), cancel).await?;
    Ok(report.summary)
}

/// Run `jobs` with any runner and a caller-supplied coordinator
///
/// Skips the tool check (the runner is already constructed) but otherwise
/// behaves like [`run_session`].
pub async fn run_session_with(
    config: &Config,
    jobs: Vec<Job>,
    runner: Arc<dyn JobRunner>,
    cancel: CancellationCoordinator,
) -> Result<RunReport> {
    ensure_writable(&config.download.music_dir).await?;
    let ledger = open_ledger(&config.persistence.ledger_path).await?;

    tracing::info!(
        jobs = jobs.len(),
        workers = config.download.workers,
        runner = runner.name(),
        ledger = %config.persistence.ledger_path.display(),
        "session started"
    );

    let listener = if config.shutdown.handle_signals {
        Some(cancel.listen_for_signals())
    } else {
        None
    };

    let (events, reporter_rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
    let reporter = Reporter::new(ReportMode::from_quiet(config.download.quiet)).spawn(reporter_rx);

    let ctx = RunContext::new(
        config.download.workers,
        ledger.clone(),
        runner,
        events,
        cancel.clone(),
    );
    let report = Orchestrator::new(ctx).run(jobs).await;

    if let Some(listener) = listener {
        listener.abort();
    }
    ledger.close().await;

    match reporter.await {
        Ok(tally) if tally.lagged > 0 => {
            tracing::debug!(lagged = tally.lagged, "reporter skipped events");
        }
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "reporter task failed"),
    }

    if let Some(reason) = cancel.reason() {
        tracing::info!(reason = %reason, "session ended after cancellation");
    }

    Ok(report)
}
