//! spotdl runner using the external spotdl binary

use super::parser::{ExitStatus, classify_output};
use super::traits::JobRunner;
use crate::config::{RetryConfig, ToolsConfig};
use crate::retry::download_with_retry;
use crate::types::{FailureReason, Job, Outcome};
use crate::utils::remove_partials;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// File spotdl keeps its own record of downloaded tracks in, per destination
pub const ARCHIVE_FILE_NAME: &str = ".sopti-archive.txt";

/// How long to wait for the output pipes to drain after the process exits
const PIPE_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Runner that shells out to `spotdl download`
///
/// One process per job, single-threaded inside spotdl (`--threads 1`); the
/// worker pool provides the parallelism.
///
/// # Examples
///
/// ```no_run
/// use sopti::runner::SpotdlRunner;
/// use std::path::PathBuf;
/// use std::time::Duration;
///
/// // Explicit path
/// let runner = SpotdlRunner::new(PathBuf::from("/usr/local/bin/spotdl"))
///     .with_terminate_timeout(Duration::from_secs(2));
///
/// // Or auto-discover from PATH
/// let runner = SpotdlRunner::from_path().expect("spotdl not found in PATH");
/// ```
#[derive(Debug, Clone)]
pub struct SpotdlRunner {
    binary_path: PathBuf,
    ffmpeg_path: Option<PathBuf>,
    client_id: Option<String>,
    client_secret: Option<String>,
    user_auth: bool,
    terminate_timeout: Duration,
    retry: RetryConfig,
}

impl SpotdlRunner {
    /// Create a runner with an explicit binary path and default settings
    pub fn new(binary_path: PathBuf) -> Self {
        let tools = ToolsConfig::default();
        Self {
            binary_path,
            ffmpeg_path: None,
            client_id: None,
            client_secret: None,
            user_auth: false,
            terminate_timeout: tools.terminate_timeout,
            retry: RetryConfig::default(),
        }
    }

    /// Attempt to find spotdl in PATH
    ///
    /// `None` if the binary is not installed.
    pub fn from_path() -> Option<Self> {
        which::which("spotdl").ok().map(Self::new)
    }

    /// Create a runner from tool and retry settings
    ///
    /// `binary_path` is the resolved spotdl location (see
    /// [`ensure_tools`](crate::preflight::ensure_tools)).
    pub fn from_config(binary_path: PathBuf, tools: &ToolsConfig, retry: &RetryConfig) -> Self {
        Self {
            binary_path,
            ffmpeg_path: tools.ffmpeg_path.clone(),
            client_id: tools.client_id.clone(),
            client_secret: tools.client_secret.clone(),
            user_auth: tools.user_auth,
            terminate_timeout: tools.terminate_timeout,
            retry: retry.clone(),
        }
    }

    /// Set the in-runner retry policy
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Set how long a terminated process gets before it is killed
    pub fn with_terminate_timeout(mut self, timeout: Duration) -> Self {
        self.terminate_timeout = timeout;
        self
    }

    /// Path of the spotdl binary
    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    /// Command-line arguments for `job`
    pub fn build_args(&self, job: &Job) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "download".into(),
            job.source.clone().into(),
            "--output".into(),
            job.destination.clone().into_os_string(),
            "--overwrite".into(),
            "skip".into(),
            "--threads".into(),
            "1".into(),
            "--archive".into(),
            job.destination.join(ARCHIVE_FILE_NAME).into_os_string(),
            "--format".into(),
            job.quality.format.as_str().into(),
        ];

        if !job.quality.bitrate.is_empty() {
            args.push("--bitrate".into());
            args.push(job.quality.bitrate.clone().into());
        }
        if let Some(ffmpeg) = &self.ffmpeg_path {
            args.push("--ffmpeg".into());
            args.push(ffmpeg.clone().into_os_string());
        }
        if let Some(id) = &self.client_id {
            args.push("--client-id".into());
            args.push(id.clone().into());
        }
        if let Some(secret) = &self.client_secret {
            args.push("--client-secret".into());
            args.push(secret.clone().into());
        }
        if self.user_auth {
            args.push("--user-auth".into());
        }

        args
    }

    /// One spotdl invocation
    ///
    /// `Err` carries the failure reason so the retry helper can classify it.
    async fn attempt(&self, job: &Job, cancel: &CancellationToken) -> Result<Outcome, FailureReason> {
        if cancel.is_cancelled() {
            return Err(FailureReason::Cancelled);
        }

        tokio::fs::create_dir_all(&job.destination)
            .await
            .map_err(|e| FailureReason::Other {
                message: format!("failed to create {}: {}", job.destination.display(), e),
            })?;

        tracing::debug!(job = %job.key, binary = %self.binary_path.display(), "spawning spotdl");

        let mut command = Command::new(&self.binary_path);
        command
            .args(self.build_args(job))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group, so ffmpeg and yt-dlp are signalled along with spotdl
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|e| FailureReason::Spawn {
            message: e.to_string(),
        })?;

        let stdout_reader = child.stdout.take().map(spawn_reader);
        let stderr_reader = child.stderr.take().map(spawn_reader);

        let waited = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            status = child.wait() => Some(status),
        };

        let Some(status) = waited else {
            tracing::info!(job = %job.key, "cancellation requested, terminating spotdl");
            terminate(&mut child, self.terminate_timeout).await;
            abort_reader(stdout_reader);
            abort_reader(stderr_reader);
            return Err(FailureReason::Cancelled);
        };

        let status = status
            .map_err(|e| FailureReason::Other {
                message: format!("failed to wait for spotdl: {}", e),
            })?;

        let stdout = drain_reader(stdout_reader).await;
        let stderr = drain_reader(stderr_reader).await;

        tracing::debug!(
            job = %job.key,
            status = %status,
            stdout_bytes = stdout.len(),
            stderr_bytes = stderr.len(),
            "spotdl exited"
        );

        match classify_output(&stdout, &stderr, ExitStatus::from(status)) {
            Outcome::Failed { reason } => Err(reason),
            outcome => Ok(outcome),
        }
    }
}

#[async_trait]
impl JobRunner for SpotdlRunner {
    async fn run(&self, job: &Job, cancel: &CancellationToken) -> Outcome {
        if cancel.is_cancelled() {
            return Outcome::cancelled();
        }

        match download_with_retry(&self.retry, cancel, || self.attempt(job, cancel)).await {
            Ok(outcome) => outcome,
            Err(FailureReason::Cancelled) => {
                let removed = remove_partials(vec![job.destination.clone()]).await;
                if removed > 0 {
                    tracing::debug!(job = %job.key, removed, "removed partial files");
                }
                Outcome::cancelled()
            }
            Err(reason) => Outcome::Failed { reason },
        }
    }

    async fn cleanup(&self, failed: &[Job]) {
        let destinations: BTreeSet<PathBuf> = failed.iter().map(|j| j.destination.clone()).collect();
        let removed = remove_partials(destinations.into_iter().collect()).await;
        if removed > 0 {
            tracing::info!(removed, "removed partial files left by failed downloads");
        }
    }

    fn name(&self) -> &'static str {
        "spotdl"
    }
}

fn spawn_reader<R>(mut pipe: R) -> JoinHandle<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Err(e) = pipe.read_to_end(&mut buf).await {
            tracing::debug!(error = %e, "error reading spotdl output");
        }
        buf
    })
}

async fn drain_reader(reader: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    let Some(handle) = reader else {
        return Vec::new();
    };
    let abort = handle.abort_handle();
    match tokio::time::timeout(PIPE_DRAIN_TIMEOUT, handle).await {
        Ok(Ok(buf)) => buf,
        Ok(Err(_)) => Vec::new(),
        Err(_) => {
            // Something outside the process group inherited the pipe
            abort.abort();
            Vec::new()
        }
    }
}

fn abort_reader(reader: Option<JoinHandle<Vec<u8>>>) {
    if let Some(handle) = reader {
        handle.abort();
    }
}

/// Stop `child` and its process group: SIGTERM, wait up to `timeout`, then
/// SIGKILL
///
/// Always reaps the process before returning. Group members still alive once
/// the leader is gone are killed outright.
async fn terminate(child: &mut Child, timeout: Duration) {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            let group = pid as libc::pid_t;
            // SAFETY: `pid` is our own child and has not been reaped yet
            // (`id()` returns None after that), so its group id cannot have
            // been reused.
            let rc = unsafe { libc::killpg(group, libc::SIGTERM) };
            if rc == 0 {
                match tokio::time::timeout(timeout, child.wait()).await {
                    Ok(Ok(status)) => {
                        tracing::debug!(pid, status = %status, "spotdl exited after SIGTERM");
                        kill_group(group);
                        return;
                    }
                    Ok(Err(e)) => {
                        tracing::warn!(pid, error = %e, "failed waiting for spotdl after SIGTERM");
                    }
                    Err(_) => {
                        tracing::warn!(
                            pid,
                            timeout_secs = timeout.as_secs_f64(),
                            "spotdl ignored SIGTERM, killing"
                        );
                    }
                }
            }
            kill_group(group);
        }
    }

    #[cfg(not(unix))]
    let _ = timeout;

    if let Err(e) = child.kill().await {
        tracing::warn!(error = %e, "failed to kill spotdl");
    }
}

/// SIGKILL every remaining member of `group`
#[cfg(unix)]
fn kill_group(group: libc::pid_t) {
    // SAFETY: plain syscall; ESRCH just means the group is already empty
    let rc = unsafe { libc::killpg(group, libc::SIGKILL) };
    if rc != 0 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            tracing::debug!(group, error = %err, "failed to kill spotdl process group");
        }
    }
}
