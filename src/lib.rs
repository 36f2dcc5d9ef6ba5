//! # sopti
//!
//! Bulk playlist downloader: fans resolved tracks out to `spotdl` with bounded
//! parallelism, skips everything a durable ledger says is already done, gives
//! failures a second chance, and shuts down cleanly on Ctrl+C.
//!
//! ## Design
//!
//! - **Ledger is authoritative** - an item is complete if and only if its key
//!   is in the SQLite ledger, across restarts
//! - **Two passes** - failures of the first pass are rechecked against the
//!   ledger and the rest retried once
//! - **Bounded** - at most `workers` tool processes at any instant (1..=64)
//! - **Cancellable** - one token reaches every worker; running processes are
//!   terminated within a grace period and nothing is left orphaned
//! - **Event-driven** - progress is an event stream; reporters only consume it
//!
//! ## Quick Start
//!
//! ```no_run
//! use sopti::{Config, run_session};
//! use sopti::types::{PlaylistRef, TrackRef, WorkItem, flatten_work_items};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default().validate()?;
//!
//!     let items = vec![WorkItem::Playlist(PlaylistRef {
//!         id: "37i9dQZF1DXcBWIGoYBM5M".to_string(),
//!         name: "Today's Top Hits".to_string(),
//!         tracks: vec![TrackRef {
//!             id: "4uLU6hMCjMI75M1A2tKUQC".to_string(),
//!             url: "https://open.spotify.com/track/4uLU6hMCjMI75M1A2tKUQC".to_string(),
//!             title: None,
//!         }],
//!     })];
//!     let jobs = flatten_work_items(&items, &config.download.music_dir, &config.quality());
//!
//!     let summary = run_session(&config, jobs).await?;
//!     println!("{} downloaded, {} failed", summary.succeeded, summary.failed.len());
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Run-wide cancellation and signal handling
pub mod cancellation;
/// Configuration types
pub mod config;
/// Per-run context
pub mod context;
/// Dedup ledger
pub mod db;
/// Error types
pub mod error;
/// Two-pass orchestration
pub mod orchestrator;
/// Bounded worker pool
pub mod pool;
/// Startup checks
pub mod preflight;
/// Progress and result reporting
pub mod reporter;
/// Retry logic with exponential backoff
pub mod retry;
/// Unit-of-work runners
pub mod runner;
/// Scoped run
pub mod session;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use cancellation::{CancelReason, CancellationCoordinator};
pub use config::Config;
pub use context::RunContext;
pub use db::Ledger;
pub use error::{Error, LedgerError, Result, StartupError};
pub use orchestrator::{Orchestrator, RunReport};
pub use pool::WorkerPool;
pub use runner::{JobRunner, SpotdlRunner};
pub use session::{run_session, run_session_with};
pub use types::{
    AudioFormat, Event, FailedItem, FailureReason, Job, JobKey, Outcome, Pass, Quality, RunState,
    RunSummary, WorkItem,
};
