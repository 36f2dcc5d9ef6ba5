//! sopti command line

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use sopti::config::Config;
use sopti::reporter::QUIET_LOG_FILTER;
use sopti::types::{AudioFormat, EXIT_FATAL, WorkItem, flatten_work_items};
use sopti::utils::looks_like_spotify_url;
use sopti::{Error, Result, run_session};

/// Download resolved playlists with spotdl, skipping what is already done
#[derive(Parser, Debug)]
#[command(name = "sopti", version, about)]
struct Cli {
    /// JSON file with the resolved work items (tracks, playlists, profiles)
    #[arg(short, long, value_name = "FILE")]
    jobs: PathBuf,

    /// Destination root directory
    #[arg(short, long, value_name = "DIR")]
    dest: Option<PathBuf>,

    /// Maximum number of concurrent downloads (1-64)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Output format: mp3, flac, ogg, opus, m4a, wav
    #[arg(short, long)]
    format: Option<AudioFormat>,

    /// Bitrate passed to spotdl (auto, disable, 128k, 320k, ...)
    #[arg(short, long)]
    bitrate: Option<String>,

    /// No terminal output; failures and the summary go to the log file
    #[arg(short, long)]
    quiet: bool,

    /// Unattended mode for scheduled runs (implies --quiet)
    #[arg(long)]
    sync: bool,

    /// Configuration file (default: ~/.config/sopti/config.json)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Ledger database (default: ~/.cache/sopti/downloads.db)
    #[arg(long, value_name = "FILE")]
    ledger: Option<PathBuf>,

    /// Seconds running downloads get to stop after Ctrl+C
    #[arg(long, value_name = "SECS")]
    grace_period: Option<u64>,

    /// Extra attempts per track within a pass
    #[arg(long)]
    retries: Option<u32>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(EXIT_FATAL);
        }
    };

    init_logging(&config);

    let config = match config.validate() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, code = e.error_code(), "invalid configuration");
            eprintln!("error: {e}");
            std::process::exit(EXIT_FATAL);
        }
    };

    match run(&cli, &config).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            tracing::error!(error = %e, code = e.error_code(), "fatal error");
            eprintln!("error: {e}");
            std::process::exit(EXIT_FATAL);
        }
    }
}

async fn run(cli: &Cli, config: &Config) -> Result<i32> {
    let items = read_work_items(&cli.jobs)?;
    let jobs = flatten_work_items(&items, &config.download.music_dir, &config.quality());

    for job in jobs.iter().filter(|j| !looks_like_spotify_url(&j.source)) {
        tracing::warn!(job = %job.key, source = %job.source, "source is not an open.spotify.com link");
    }

    let summary = run_session(config, jobs).await?;
    Ok(summary.exit_code())
}

fn read_work_items(path: &Path) -> Result<Vec<WorkItem>> {
    let raw = std::fs::read_to_string(path).map_err(|e| Error::Config {
        message: format!("cannot read job file {}: {}", path.display(), e),
        key: Some("jobs".to_string()),
    })?;
    Ok(serde_json::from_str(&raw)?)
}

/// Configuration file plus command-line overrides, not yet validated
fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_json_file(path)?,
        None => {
            let default_path = Config::default_path();
            if default_path.is_file() {
                Config::from_json_file(&default_path)?
            } else {
                Config::default()
            }
        }
    };

    if let Some(dest) = &cli.dest {
        config.download.music_dir = dest.clone();
    }
    if let Some(workers) = cli.workers {
        config.download.workers = workers;
    }
    if let Some(format) = cli.format {
        config.download.preferred_format = format;
    }
    if let Some(bitrate) = &cli.bitrate {
        config.download.bitrate = bitrate.clone();
    }
    config.download.quiet = config.download.quiet || cli.quiet || cli.sync;
    if let Some(ledger) = &cli.ledger {
        config.persistence.ledger_path = ledger.clone();
    }
    if let Some(secs) = cli.grace_period {
        config.shutdown.grace_period = Duration::from_secs(secs);
    }
    if let Some(retries) = cli.retries {
        config.retry.max_attempts = retries;
    }

    Ok(config)
}

/// Interactive runs log warnings to stderr; quiet runs append failed items and
/// the summary to the log file
fn init_logging(config: &Config) {
    let default_filter = if config.download.quiet {
        QUIET_LOG_FILTER
    } else {
        "warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    if config.download.quiet {
        match open_log_file(&config.persistence.log_path) {
            Ok(file) => {
                tracing_subscriber::fmt()
                    .with_env_filter(filter)
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .init();
                return;
            }
            Err(e) => {
                eprintln!(
                    "warning: cannot open log file {}: {}",
                    config.persistence.log_path.display(),
                    e
                );
            }
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn open_log_file(path: &Path) -> std::io::Result<std::fs::File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::OpenOptions::new().create(true).append(true).open(path)
}
