//! Unit-of-work runners
//!
//! A runner acquires one [`Job`](crate::types::Job) and reports a terminal
//! [`Outcome`](crate::types::Outcome). The worker pool only depends on the
//! [`JobRunner`] trait, so tests can substitute scripted runners.
//!
//! ## Architecture
//!
//! - [`SpotdlRunner`]: spawns the external `spotdl` binary per job, maps its
//!   exit status and output to an outcome, and terminates it on cancellation
//!
//! ## Usage
//!
//! ```no_run
//! use sopti::runner::{JobRunner, SpotdlRunner};
//! use sopti::types::{Job, Quality};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let runner = SpotdlRunner::from_path().expect("spotdl binary not found");
//!     let cancel = CancellationToken::new();
//!
//!     let job = Job::new("id", "https://open.spotify.com/track/id", "/music", Quality::default());
//!     let outcome = runner.run(&job, &cancel).await;
//!     println!("{}: {:?}", runner.name(), outcome);
//! }
//! ```

mod cli;
mod parser;
mod traits;

pub use cli::{ARCHIVE_FILE_NAME, SpotdlRunner};
pub use parser::{ExitStatus, classify_output};
pub use traits::JobRunner;
