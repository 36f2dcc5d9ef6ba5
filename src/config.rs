//! Configuration types for sopti

use crate::error::{Error, Result};
use crate::types::{AudioFormat, Quality};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Upper bound on concurrently running acquisition processes
pub const MAX_WORKERS: usize = 64;

/// Download behavior configuration (destination, concurrency, quality)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Destination root for downloaded music (default: "~/Music")
    #[serde(default = "default_music_dir")]
    pub music_dir: PathBuf,

    /// Number of parallel acquisition processes (default: 3, clamped to 64)
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Audio format passed to the acquisition tool (default: flac)
    #[serde(default)]
    pub preferred_format: AudioFormat,

    /// Bitrate passed to the acquisition tool (default: "auto")
    #[serde(default = "default_bitrate")]
    pub bitrate: String,

    /// Suppress console output; failures and the summary go to the log file only
    #[serde(default)]
    pub quiet: bool,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            music_dir: default_music_dir(),
            workers: default_workers(),
            preferred_format: AudioFormat::default(),
            bitrate: default_bitrate(),
            quiet: false,
        }
    }
}

/// External tool paths and credentials forwarded to the acquisition tool
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Path to spotdl executable (auto-detected if None)
    #[serde(default)]
    pub spotdl_path: Option<PathBuf>,

    /// Path to ffmpeg executable (auto-detected if None)
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,

    /// Whether to search PATH for external binaries if explicit paths not set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,

    /// Spotify API client id
    #[serde(default, alias = "spotify_client_id")]
    pub client_id: Option<String>,

    /// Spotify API client secret
    #[serde(default, alias = "spotify_client_secret")]
    pub client_secret: Option<String>,

    /// Ask spotdl to authenticate as the user (private playlists)
    #[serde(default)]
    pub user_auth: bool,

    /// How long to wait after SIGTERM before killing a tool process (default: 5 seconds)
    #[serde(default = "default_terminate_timeout", with = "duration_serde")]
    pub terminate_timeout: Duration,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            spotdl_path: None,
            ffmpeg_path: None,
            search_path: true,
            client_id: None,
            client_secret: None,
            user_auth: false,
            terminate_timeout: default_terminate_timeout(),
        }
    }
}

/// Retry configuration for a single job inside one pass
///
/// The second pass is the main recovery mechanism, so in-runner retries are
/// off unless configured.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first (default: 0)
    #[serde(default)]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 2 seconds)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 0,
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Data storage locations
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Dedup ledger database path (default: "~/.cache/sopti/downloads.db")
    #[serde(default = "default_ledger_path")]
    pub ledger_path: PathBuf,

    /// Log file used in quiet mode (default: "~/.cache/sopti/sopti.log")
    #[serde(default = "default_log_path")]
    pub log_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            ledger_path: default_ledger_path(),
            log_path: default_log_path(),
        }
    }
}

/// Interrupt handling
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ShutdownConfig {
    /// Bounded wait for in-flight jobs after cancellation (default: 10 seconds)
    #[serde(default = "default_grace_period", with = "duration_serde")]
    pub grace_period: Duration,

    /// Install SIGINT/SIGTERM handlers for the session (default: true)
    #[serde(default = "default_true")]
    pub handle_signals: bool,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_period: default_grace_period(),
            handle_signals: true,
        }
    }
}

/// Main configuration for a sopti session
///
/// Fields are organized into logical sub-configs:
/// - [`download`](DownloadConfig): destination, concurrency, quality
/// - [`tools`](ToolsConfig): external binaries and credentials
/// - [`retry`](RetryConfig): per-job retry inside a pass
/// - [`persistence`](PersistenceConfig): ledger and log locations
/// - [`shutdown`](ShutdownConfig): cancellation grace period
///
/// `download` and `tools` are flattened so the JSON file keeps the flat
/// `music_dir` / `workers` / `spotify_client_id` layout.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Download behavior settings
    #[serde(flatten)]
    pub download: DownloadConfig,

    /// External tool settings
    #[serde(flatten)]
    pub tools: ToolsConfig,

    /// Retry settings
    #[serde(default)]
    pub retry: RetryConfig,

    /// Storage locations
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Cancellation settings
    #[serde(default)]
    pub shutdown: ShutdownConfig,
}

impl Config {
    /// Load configuration from a JSON file
    ///
    /// Missing keys take their defaults. The file is never written back.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("failed to read {}: {}", path.display(), e),
            key: None,
        })?;
        let config: Config = serde_json::from_str(&raw)?;
        Ok(config)
    }

    /// Default location of the JSON config file (`~/.config/sopti/config.json`)
    pub fn default_path() -> PathBuf {
        home_dir().join(".config").join("sopti").join("config.json")
    }

    /// Validate settings and clamp the worker count into `1..=MAX_WORKERS`
    pub fn validate(mut self) -> Result<Self> {
        if self.download.workers == 0 {
            return Err(Error::Config {
                message: "workers must be a positive integer".to_string(),
                key: Some("workers".to_string()),
            });
        }
        if self.download.workers > MAX_WORKERS {
            tracing::warn!(
                requested = self.download.workers,
                max = MAX_WORKERS,
                "Clamping worker count"
            );
            self.download.workers = MAX_WORKERS;
        }
        if self.download.bitrate.trim().is_empty() {
            return Err(Error::Config {
                message: "bitrate must not be empty".to_string(),
                key: Some("bitrate".to_string()),
            });
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(Error::Config {
                message: "backoff_multiplier must be at least 1.0".to_string(),
                key: Some("retry.backoff_multiplier".to_string()),
            });
        }
        Ok(self)
    }

    /// Quality parameters applied to every job of the session
    pub fn quality(&self) -> Quality {
        Quality {
            format: self.download.preferred_format,
            bitrate: self.download.bitrate.clone(),
        }
    }
}

fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn cache_dir() -> PathBuf {
    home_dir().join(".cache").join("sopti")
}

fn default_music_dir() -> PathBuf {
    home_dir().join("Music")
}

fn default_workers() -> usize {
    3
}

fn default_bitrate() -> String {
    "auto".to_string()
}

fn default_ledger_path() -> PathBuf {
    cache_dir().join("downloads.db")
}

fn default_log_path() -> PathBuf {
    cache_dir().join("sopti.log")
}

fn default_true() -> bool {
    true
}

fn default_terminate_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(2)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_grace_period() -> Duration {
    Duration::from_secs(10)
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
