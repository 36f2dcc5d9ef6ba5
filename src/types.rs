//! Core types for sopti

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::utils::safe_folder_name;

/// Stable identity of one item across runs (the track id)
///
/// This is the ledger's primary key and the unit of deduplication.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobKey(pub String);

impl JobKey {
    /// Create a new JobKey
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Borrow the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for JobKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl From<String> for JobKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Output container/codec understood by spotdl
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    /// MPEG-1 Layer III
    Mp3,
    /// Free Lossless Audio Codec (default)
    #[default]
    Flac,
    /// Ogg Vorbis
    Ogg,
    /// Opus
    Opus,
    /// AAC in MP4 container
    M4a,
    /// Uncompressed PCM
    Wav,
}

impl AudioFormat {
    /// Value passed to `--format`
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Flac => "flac",
            AudioFormat::Ogg => "ogg",
            AudioFormat::Opus => "opus",
            AudioFormat::M4a => "m4a",
            AudioFormat::Wav => "wav",
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AudioFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mp3" => Ok(AudioFormat::Mp3),
            "flac" => Ok(AudioFormat::Flac),
            "ogg" => Ok(AudioFormat::Ogg),
            "opus" => Ok(AudioFormat::Opus),
            "m4a" => Ok(AudioFormat::M4a),
            "wav" => Ok(AudioFormat::Wav),
            other => Err(format!(
                "unsupported format '{other}' (expected mp3, flac, ogg, opus, m4a or wav)"
            )),
        }
    }
}

/// Quality parameters forwarded to the acquisition tool
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quality {
    /// Output format
    pub format: AudioFormat,
    /// Bitrate (`auto`, `disable`, `128k`, `320k`, ...)
    pub bitrate: String,
}

impl Default for Quality {
    fn default() -> Self {
        Self {
            format: AudioFormat::default(),
            bitrate: "auto".to_string(),
        }
    }
}

/// One unit of acquisition work
///
/// Built once per run from the resolved work list and never mutated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Job {
    /// Identity used for ledger lookups and dedup
    pub key: JobKey,
    /// Track URL handed to the acquisition tool
    pub source: String,
    /// Directory the tool writes into
    pub destination: PathBuf,
    /// Format and bitrate
    pub quality: Quality,
    /// Display title, if known
    pub title: Option<String>,
    /// Playlist this job came from, if any
    pub playlist_id: Option<String>,
}

impl Job {
    /// Create a job for a single track
    pub fn new(
        key: impl Into<JobKey>,
        source: impl Into<String>,
        destination: impl Into<PathBuf>,
        quality: Quality,
    ) -> Self {
        Self {
            key: key.into(),
            source: source.into(),
            destination: destination.into(),
            quality,
            title: None,
            playlist_id: None,
        }
    }

    /// Attach a display title
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Name shown in progress output and logs
    pub fn display_name(&self) -> &str {
        self.title.as_deref().unwrap_or(self.key.as_str())
    }
}

/// A track inside a resolved work list
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackRef {
    /// Track id (becomes the [`JobKey`])
    pub id: String,
    /// Track URL
    pub url: String,
    /// Track title
    #[serde(default)]
    pub title: Option<String>,
}

/// A resolved playlist
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistRef {
    /// Playlist id
    pub id: String,
    /// Playlist name (used for the destination subfolder)
    pub name: String,
    /// Tracks in playlist order
    pub tracks: Vec<TrackRef>,
}

/// Resolved input, tagged by what the user pointed at
///
/// The variant is only looked at here: [`flatten_work_items`] turns every
/// variant into uniform [`Job`]s before anything is dispatched.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkItem {
    /// A single track, downloaded into the destination root
    Track(TrackRef),
    /// A playlist, downloaded into its own subfolder
    Playlist(PlaylistRef),
    /// A user profile: all of its playlists
    Profile {
        /// The profile's playlists
        playlists: Vec<PlaylistRef>,
    },
}

/// Turn resolved work items into the job list of one run
pub fn flatten_work_items(items: &[WorkItem], root: &Path, quality: &Quality) -> Vec<Job> {
    let mut jobs = Vec::new();
    for item in items {
        match item {
            WorkItem::Track(track) => jobs.push(track_job(track, root, quality, None)),
            WorkItem::Playlist(playlist) => push_playlist(&mut jobs, playlist, root, quality),
            WorkItem::Profile { playlists } => {
                for playlist in playlists {
                    push_playlist(&mut jobs, playlist, root, quality);
                }
            }
        }
    }
    jobs
}

fn push_playlist(jobs: &mut Vec<Job>, playlist: &PlaylistRef, root: &Path, quality: &Quality) {
    let folder = safe_folder_name(&playlist.name, root);
    for track in &playlist.tracks {
        jobs.push(track_job(track, &folder, quality, Some(&playlist.id)));
    }
}

fn track_job(track: &TrackRef, dest: &Path, quality: &Quality, playlist_id: Option<&str>) -> Job {
    Job {
        key: JobKey::new(track.id.clone()),
        source: track.url.clone(),
        destination: dest.to_path_buf(),
        quality: quality.clone(),
        title: track.title.clone(),
        playlist_id: playlist_id.map(str::to_string),
    }
}

/// Why a job did not complete
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FailureReason {
    /// The run was interrupted before or while this job ran
    Cancelled,
    /// The acquisition tool exited unsuccessfully
    ToolExit {
        /// Exit code (None when killed by a signal)
        code: Option<i32>,
        /// Last diagnostic line the tool printed, if any
        detail: Option<String>,
    },
    /// The acquisition tool could not be started
    Spawn {
        /// OS error text
        message: String,
    },
    /// Anything else (I/O while supervising the process, panicked worker)
    Other {
        /// What went wrong
        message: String,
    },
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Cancelled => f.write_str("cancelled"),
            FailureReason::ToolExit { code, detail } => {
                match code {
                    Some(code) => write!(f, "tool exited with status {code}")?,
                    None => f.write_str("tool terminated by signal")?,
                }
                if let Some(detail) = detail {
                    write!(f, ": {detail}")?;
                }
                Ok(())
            }
            FailureReason::Spawn { message } => {
                write!(f, "failed to start tool: {message}")
            }
            FailureReason::Other { message } => f.write_str(message),
        }
    }
}

/// Terminal result of attempting a job in one pass
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// Downloaded in this attempt
    Success,
    /// Skipped: already in the ledger or reported present by the tool
    AlreadyPresent,
    /// Not completed
    Failed {
        /// Why
        reason: FailureReason,
    },
}

impl Outcome {
    /// Shorthand for a cancelled failure
    pub fn cancelled() -> Self {
        Outcome::Failed {
            reason: FailureReason::Cancelled,
        }
    }

    /// True for Success and AlreadyPresent (both get a ledger entry)
    pub fn is_complete(&self) -> bool {
        matches!(self, Outcome::Success | Outcome::AlreadyPresent)
    }

    /// True for `Failed { Cancelled }`
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Outcome::Failed {
                reason: FailureReason::Cancelled
            }
        )
    }

    /// The failure reason, if any
    pub fn failure(&self) -> Option<&FailureReason> {
        match self {
            Outcome::Failed { reason } => Some(reason),
            _ => None,
        }
    }
}

/// Which sweep of the worker pool produced an outcome
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pass {
    /// Full job list
    First,
    /// Residual set
    Second,
}

impl Pass {
    /// 1 or 2
    pub fn number(&self) -> u8 {
        match self {
            Pass::First => 1,
            Pass::Second => 2,
        }
    }
}

impl fmt::Display for Pass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

/// Controller state machine
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Waiting for a job list
    Idle,
    /// First sweep running
    Pass1Running,
    /// Failed first-pass jobs rechecked against the ledger
    ResidualComputed,
    /// Second sweep running
    Pass2Running,
    /// Finished normally
    Done,
    /// Finished after cancellation
    CancelledDone,
}

impl RunState {
    /// Done and CancelledDone are terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done | RunState::CancelledDone)
    }
}

/// A job that did not complete, as reported in the summary
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedItem {
    /// The job's identity
    pub key: JobKey,
    /// Final failure reason
    pub reason: FailureReason,
}

/// Aggregated result of one run
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Jobs downloaded during this run
    pub succeeded: usize,
    /// Jobs skipped because they were already complete
    pub already_present: usize,
    /// Jobs that did not complete, with reasons
    pub failed: Vec<FailedItem>,
    /// Whether the run ended in CancelledDone
    pub cancelled: bool,
}

/// Exit status when every job completed
pub const EXIT_OK: i32 = 0;
/// Exit status when at least one job genuinely failed
pub const EXIT_FAILURES: i32 = 1;
/// Exit status for fatal startup errors
pub const EXIT_FATAL: i32 = 2;
/// Exit status for an interrupted run (128 + SIGINT)
pub const EXIT_CANCELLED: i32 = 130;

impl RunSummary {
    /// Total number of jobs accounted for
    pub fn total(&self) -> usize {
        self.succeeded + self.already_present + self.failed.len()
    }

    /// Failed items whose reason is cancellation
    pub fn cancelled_count(&self) -> usize {
        self.failed
            .iter()
            .filter(|f| f.reason == FailureReason::Cancelled)
            .count()
    }

    /// Failed items that were not cancelled
    pub fn genuine_failures(&self) -> impl Iterator<Item = &FailedItem> {
        self.failed
            .iter()
            .filter(|f| f.reason != FailureReason::Cancelled)
    }

    /// Process exit status for this summary
    pub fn exit_code(&self) -> i32 {
        if self.cancelled {
            EXIT_CANCELLED
        } else if self.failed.is_empty() {
            EXIT_OK
        } else {
            EXIT_FAILURES
        }
    }
}

/// Event emitted during a run
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Job list accepted
    RunStarted {
        /// Unique jobs to process
        total: usize,
        /// Duplicate submissions folded into another job
        duplicates: usize,
    },

    /// A pass is about to dispatch jobs
    PassStarted {
        /// Which pass
        pass: Pass,
        /// Jobs submitted to this pass
        pending: usize,
    },

    /// One job finished within a pass
    ItemFinished {
        /// The job's identity
        key: JobKey,
        /// Display name
        name: String,
        /// The outcome
        outcome: Outcome,
        /// Which pass
        pass: Pass,
    },

    /// A pass finished
    PassFinished {
        /// Which pass
        pass: Pass,
        /// Completed jobs in this pass
        completed: usize,
        /// Failed jobs in this pass
        failed: usize,
    },

    /// A first-pass failure turned out to be in the ledger
    Reclassified {
        /// The job's identity
        key: JobKey,
    },

    /// Cancellation was requested; in-flight jobs are winding down
    Cancelling,

    /// The run reached a terminal state
    RunFinished {
        /// Final summary
        summary: RunSummary,
    },
}
