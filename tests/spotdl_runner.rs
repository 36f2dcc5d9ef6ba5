//! SpotdlRunner against shell scripts posing as spotdl
//!
//! Argument positions the scripts rely on: `$1` is `download`, `$2` the track
//! URL and `$4` the output directory.

#![cfg(unix)]

mod common;

use common::TestRun;
use sopti::config::{Config, RetryConfig};
use sopti::runner::{ARCHIVE_FILE_NAME, JobRunner, SpotdlRunner};
use sopti::types::{EXIT_OK, FailureReason, Job, JobKey, Outcome, Quality};
use sopti::{Ledger, run_session};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn fake_spotdl(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("spotdl");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn job_in(dir: &Path, key: &str) -> Job {
    Job::new(
        key,
        format!("https://open.spotify.com/track/{key}"),
        dir.join("Mix"),
        Quality::default(),
    )
}

async fn wait_for_file(path: &Path) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !path.exists() {
        assert!(Instant::now() < deadline, "{} never appeared", path.display());
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

fn process_alive(pid: i32) -> bool {
    // SAFETY: signal 0 only checks for existence
    unsafe { libc::kill(pid, 0) == 0 }
}

/// Alive and not a zombie waiting for a parent that is gone
fn process_running(pid: i32) -> bool {
    if !process_alive(pid) {
        return false;
    }
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => stat
            .rsplit_once(") ")
            .is_none_or(|(_, rest)| !rest.starts_with('Z')),
        Err(_) => true,
    }
}

async fn wait_until_gone(pid: i32) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while process_running(pid) {
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    true
}

fn read_pid(path: &Path) -> i32 {
    std::fs::read_to_string(path).unwrap().trim().parse().unwrap()
}

#[tokio::test]
async fn test_successful_download() {
    let dir = TempDir::new().unwrap();
    let script = fake_spotdl(
        dir.path(),
        r#"echo "$@" > "$4/args.txt"
echo "Downloaded \"Artist - Song\": $2""#,
    );
    let runner = SpotdlRunner::new(script);
    let job = job_in(dir.path(), "abc");

    let outcome = runner.run(&job, &CancellationToken::new()).await;

    assert_eq!(outcome, Outcome::Success);
    let args = std::fs::read_to_string(job.destination.join("args.txt")).unwrap();
    assert!(args.starts_with("download https://open.spotify.com/track/abc --output "));
    assert!(args.contains(ARCHIVE_FILE_NAME));
    assert!(args.contains("--threads 1"));
}

#[tokio::test]
async fn test_already_present_output_wins_over_exit_code() {
    let dir = TempDir::new().unwrap();
    let script = fake_spotdl(
        dir.path(),
        r#"echo "Skipping Artist - Song (file already exists) (duplicate)"
exit 1"#,
    );
    let runner = SpotdlRunner::new(script);

    let outcome = runner
        .run(&job_in(dir.path(), "abc"), &CancellationToken::new())
        .await;

    assert_eq!(outcome, Outcome::AlreadyPresent);
}

#[tokio::test]
async fn test_nonzero_exit_carries_last_error_line() {
    let dir = TempDir::new().unwrap();
    let script = fake_spotdl(
        dir.path(),
        r#"echo "Processing query"
echo "LookupError: No results found for song: abc" >&2
exit 3"#,
    );
    let runner = SpotdlRunner::new(script);

    let outcome = runner
        .run(&job_in(dir.path(), "abc"), &CancellationToken::new())
        .await;

    assert_eq!(
        outcome,
        Outcome::Failed {
            reason: FailureReason::ToolExit {
                code: Some(3),
                detail: Some("LookupError: No results found for song: abc".to_string()),
            }
        }
    );
}

#[tokio::test]
async fn test_in_runner_retry_recovers_transient_failure() {
    let dir = TempDir::new().unwrap();
    let script = fake_spotdl(
        dir.path(),
        r#"if [ -f "$4/attempted" ]; then
  echo "Downloaded"
  exit 0
fi
touch "$4/attempted"
echo "HTTPError: 500" >&2
exit 1"#,
    );
    let runner = SpotdlRunner::new(script).with_retry(RetryConfig {
        max_attempts: 1,
        initial_delay: Duration::from_millis(10),
        jitter: false,
        ..Default::default()
    });

    let outcome = runner
        .run(&job_in(dir.path(), "abc"), &CancellationToken::new())
        .await;

    assert_eq!(outcome, Outcome::Success);
}

#[tokio::test]
async fn test_cancel_terminates_process_and_removes_partials() {
    let dir = TempDir::new().unwrap();
    let script = fake_spotdl(
        dir.path(),
        r#"echo $$ > "$4/pid"
touch "$4/Artist - Song.mp3.part"
exec sleep 30"#,
    );
    let runner = Arc::new(SpotdlRunner::new(script));
    let job = job_in(dir.path(), "abc");
    let cancel = CancellationToken::new();

    let task = {
        let runner = runner.clone();
        let job = job.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { runner.run(&job, &cancel).await })
    };

    let pid_file = job.destination.join("pid");
    wait_for_file(&pid_file).await;
    let pid: i32 = std::fs::read_to_string(&pid_file)
        .unwrap()
        .trim()
        .parse()
        .unwrap();
    assert!(process_alive(pid));

    let started = Instant::now();
    cancel.cancel();
    let outcome = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("runner must stop promptly")
        .unwrap();

    assert_eq!(outcome, Outcome::cancelled());
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(!process_alive(pid), "spotdl process left running");
    assert!(!job.destination.join("Artist - Song.mp3.part").exists());
}

#[tokio::test]
async fn test_process_ignoring_sigterm_is_killed() {
    let dir = TempDir::new().unwrap();
    let script = fake_spotdl(
        dir.path(),
        r#"trap '' TERM
echo $$ > "$4/pid"
while :; do sleep 1; done"#,
    );
    let runner =
        Arc::new(SpotdlRunner::new(script).with_terminate_timeout(Duration::from_millis(300)));
    let job = job_in(dir.path(), "abc");
    let cancel = CancellationToken::new();

    let task = {
        let runner = runner.clone();
        let job = job.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { runner.run(&job, &cancel).await })
    };

    let pid_file = job.destination.join("pid");
    wait_for_file(&pid_file).await;
    let pid: i32 = std::fs::read_to_string(&pid_file)
        .unwrap()
        .trim()
        .parse()
        .unwrap();

    cancel.cancel();
    let outcome = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("runner must stop promptly")
        .unwrap();

    assert_eq!(outcome, Outcome::cancelled());
    assert!(!process_alive(pid), "spotdl process left running");
}

#[tokio::test]
async fn test_cancel_also_stops_helper_processes() {
    let dir = TempDir::new().unwrap();
    let script = fake_spotdl(
        dir.path(),
        r#"sleep 30 &
echo $! > "$4/helper"
echo $$ > "$4/pid"
wait"#,
    );
    let runner = Arc::new(SpotdlRunner::new(script));
    let job = job_in(dir.path(), "abc");
    let cancel = CancellationToken::new();

    let task = {
        let runner = runner.clone();
        let job = job.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { runner.run(&job, &cancel).await })
    };

    wait_for_file(&job.destination.join("pid")).await;
    let helper = read_pid(&job.destination.join("helper"));
    assert!(process_alive(helper));

    cancel.cancel();
    let outcome = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("runner must stop promptly")
        .unwrap();

    assert_eq!(outcome, Outcome::cancelled());
    assert!(wait_until_gone(helper).await, "helper process {helper} outlived cancellation");
}

#[tokio::test]
async fn test_cleanup_sweeps_partials_of_failed_jobs() {
    let dir = TempDir::new().unwrap();
    let script = fake_spotdl(
        dir.path(),
        r#"touch "$4/Artist - Song.mp3.part"
exit 1"#,
    );
    let runner = SpotdlRunner::new(script);
    let job = job_in(dir.path(), "abc");

    let outcome = runner.run(&job, &CancellationToken::new()).await;
    assert!(matches!(outcome, Outcome::Failed { .. }));
    let partial = job.destination.join("Artist - Song.mp3.part");
    assert!(partial.exists(), "left alone while other jobs may be writing");

    runner.cleanup(std::slice::from_ref(&job)).await;

    assert!(!partial.exists());
}

#[tokio::test]
async fn test_orchestrated_run_with_fake_tool() {
    let run = TestRun::new().await;
    let script = fake_spotdl(
        run.root(),
        r#"case "$2" in
  */bad) echo "AudioProviderError: YT-DLP download error" >&2; exit 1 ;;
  *) echo "Downloaded"; exit 0 ;;
esac"#,
    );
    let runner: Arc<dyn JobRunner> = Arc::new(SpotdlRunner::new(script));
    let jobs = vec![
        job_in(run.root(), "one"),
        job_in(run.root(), "two"),
        job_in(run.root(), "bad"),
    ];

    let report = run.orchestrator(2, runner).run(jobs).await;

    assert_eq!(report.summary.succeeded, 2);
    assert_eq!(report.summary.failed.len(), 1);
    assert_eq!(report.retried, vec![JobKey::from("bad")]);
    assert_eq!(run.ledger.count().await.unwrap(), 2);
}

#[tokio::test]
async fn test_run_session_with_configured_tools() {
    let dir = TempDir::new().unwrap();
    let tools = dir.path().join("bin");
    std::fs::create_dir_all(&tools).unwrap();
    let script = fake_spotdl(&tools, r#"echo "Downloaded""#);
    let ffmpeg = tools.join("ffmpeg");
    std::fs::write(&ffmpeg, b"").unwrap();

    let mut config = Config::default();
    config.download.music_dir = dir.path().join("music");
    config.download.quiet = true;
    config.tools.spotdl_path = Some(script);
    config.tools.ffmpeg_path = Some(ffmpeg);
    config.tools.search_path = false;
    config.persistence.ledger_path = dir.path().join("downloads.db");
    config.shutdown.handle_signals = false;
    let config = config.validate().unwrap();

    let jobs = vec![
        job_in(&config.download.music_dir, "one"),
        job_in(&config.download.music_dir, "two"),
    ];
    let summary = run_session(&config, jobs).await.unwrap();

    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.exit_code(), EXIT_OK);

    let ledger = Ledger::open(&config.persistence.ledger_path).await.unwrap();
    assert_eq!(ledger.count().await.unwrap(), 2);
    ledger.close().await;
}
