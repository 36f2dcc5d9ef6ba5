//! Progress and result reporting
//!
//! The reporter is a pure consumer of the run's [`Event`] stream. In
//! interactive mode it draws one progress bar per pass and prints failures and
//! the final summary to the terminal. In quiet mode it prints nothing: failed
//! items (cancelled ones included) and the summary go to the log, and
//! [`QUIET_LOG_FILTER`] keeps everything else below `warn` out of it.

use crate::types::{Event, Outcome, Pass, RunSummary};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::fmt::Write as _;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

/// Default log filter for quiet runs
///
/// Lets this module's per-item and summary lines through at `info` while the
/// rest of the crate only reaches the log file at `warn` or above.
pub const QUIET_LOG_FILTER: &str = "warn,sopti::reporter=info";

/// How results are presented
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReportMode {
    /// Progress bars and a printed summary
    Interactive,
    /// Log sink only
    Quiet,
}

impl ReportMode {
    /// `Quiet` when `quiet` is set
    pub fn from_quiet(quiet: bool) -> Self {
        if quiet { Self::Quiet } else { Self::Interactive }
    }
}

/// What the reporter saw, returned when it stops
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReportTally {
    /// `ItemFinished` events consumed
    pub items_finished: usize,
    /// Failures reported (printed or logged)
    pub failures_reported: usize,
    /// Events lost because the reporter fell behind
    pub lagged: u64,
    /// Final summary, if the run finished
    pub summary: Option<RunSummary>,
}

/// Event consumer
pub struct Reporter {
    mode: ReportMode,
    hidden: bool,
    bar: Option<ProgressBar>,
    cancelling: bool,
    tally: ReportTally,
}

impl Reporter {
    /// Create a reporter
    pub fn new(mode: ReportMode) -> Self {
        Self {
            mode,
            hidden: false,
            bar: None,
            cancelling: false,
            tally: ReportTally::default(),
        }
    }

    /// Draw nothing (progress state is still tracked)
    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    /// Counters so far
    pub fn tally(&self) -> &ReportTally {
        &self.tally
    }

    /// Consume `events` on a background task until the run finishes or the
    /// channel closes
    pub fn spawn(mut self, mut events: broadcast::Receiver<Event>) -> JoinHandle<ReportTally> {
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        let done = matches!(event, Event::RunFinished { .. });
                        self.handle(&event);
                        if done {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "reporter fell behind, events dropped");
                        self.tally.lagged += skipped;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            self.finish_bar();
            self.tally
        })
    }

    /// Apply one event
    pub fn handle(&mut self, event: &Event) {
        match event {
            Event::RunStarted { total, duplicates } => {
                tracing::debug!(total, duplicates, "run started");
            }
            Event::PassStarted { pass, pending } => self.start_pass(*pass, *pending),
            Event::ItemFinished {
                key,
                name,
                outcome,
                pass,
            } => {
                self.tally.items_finished += 1;
                if let Some(bar) = &self.bar {
                    bar.inc(1);
                }
                if let Outcome::Failed { reason } = outcome {
                    if outcome.is_cancelled() {
                        if self.mode == ReportMode::Quiet {
                            tracing::warn!(job = %key, pass = %pass, "download cancelled");
                        }
                        return;
                    }
                    self.tally.failures_reported += 1;
                    match self.mode {
                        ReportMode::Quiet => {
                            tracing::error!(job = %key, pass = %pass, reason = %reason, "download failed");
                        }
                        ReportMode::Interactive => {
                            self.print(&format!("✗ {name} ({reason})"));
                        }
                    }
                }
            }
            Event::PassFinished {
                pass,
                completed,
                failed,
            } => {
                tracing::debug!(pass = %pass, completed, failed, "pass finished");
                self.finish_bar();
            }
            Event::Reclassified { key } => {
                tracing::debug!(job = %key, "failed job was completed elsewhere");
            }
            Event::Cancelling => {
                if !self.cancelling {
                    self.cancelling = true;
                    if let Some(bar) = &self.bar {
                        bar.set_message("cancelling...");
                    }
                    if self.mode == ReportMode::Interactive {
                        self.print("Cancelling, waiting for running downloads to stop...");
                    }
                }
            }
            Event::RunFinished { summary } => {
                self.finish_bar();
                match self.mode {
                    ReportMode::Quiet => {
                        tracing::info!(
                            succeeded = summary.succeeded,
                            already_present = summary.already_present,
                            failed = summary.failed.len(),
                            cancelled = summary.cancelled,
                            "{}",
                            summary_line(summary)
                        );
                    }
                    ReportMode::Interactive => {
                        if !self.hidden {
                            println!("{}", format_summary(summary));
                        }
                    }
                }
                self.tally.summary = Some(summary.clone());
            }
        }
    }

    fn start_pass(&mut self, pass: Pass, pending: usize) {
        self.finish_bar();
        if self.mode == ReportMode::Quiet || pending == 0 {
            return;
        }

        let bar = ProgressBar::new(pending as u64);
        if self.hidden {
            bar.set_draw_target(ProgressDrawTarget::hidden());
        }
        bar.set_style(bar_style());
        bar.set_prefix(match pass {
            Pass::First => "Downloading",
            Pass::Second => "Retrying",
        });
        self.bar = Some(bar);
    }

    fn finish_bar(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish();
        }
    }

    fn print(&self, line: &str) {
        if self.hidden {
            return;
        }
        match &self.bar {
            Some(bar) => bar.println(line),
            None => eprintln!("{line}"),
        }
    }
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{prefix:>12.cyan.bold} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
    )
    .map(|style| style.progress_chars("█▓░"))
    .unwrap_or_else(|_| ProgressStyle::default_bar())
}

/// One-line summary
pub fn summary_line(summary: &RunSummary) -> String {
    let mut line = format!(
        "{} downloaded, {} already present, {} failed",
        summary.succeeded,
        summary.already_present,
        summary.failed.len()
    );
    let cancelled = summary.cancelled_count();
    if cancelled > 0 {
        let _ = write!(line, " ({cancelled} cancelled)");
    }
    line
}

/// Multi-line summary with one line per failure
pub fn format_summary(summary: &RunSummary) -> String {
    let mut out = String::new();
    if summary.cancelled {
        out.push_str("Run cancelled.\n");
    }
    let _ = write!(out, "Completed: {}", summary_line(summary));

    let genuine: Vec<_> = summary.genuine_failures().collect();
    if !genuine.is_empty() {
        out.push_str("\nFailed:");
        for item in genuine {
            let _ = write!(out, "\n  {} ({})", item.key, item.reason);
        }
    }
    out
}
