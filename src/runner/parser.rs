//! Classification of spotdl process results

use crate::types::{FailureReason, Outcome};
use regex::Regex;
use std::str;
use std::sync::LazyLock;

/// Exit status of an external command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// The command exited with code 0
    Success,
    /// The command exited with a non-zero code, or was killed (`None`)
    Failure(Option<i32>),
}

impl ExitStatus {
    /// Returns `true` if the exit status represents success
    pub fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

impl From<std::process::ExitStatus> for ExitStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        if status.success() {
            Self::Success
        } else {
            Self::Failure(status.code())
        }
    }
}

/// Lines spotdl prints when the track is already on disk or in its archive
static ALREADY_PRESENT: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)(already downloaded|file already exists|skipping\b)").ok()
});

/// Classify a finished spotdl run
///
/// An "already present" signal in either stream wins over the exit code,
/// since spotdl exits 0 or 1 inconsistently when it skips. Otherwise a zero
/// exit is a success and anything else is a failure carrying the exit code
/// and the last non-empty line of output, if there is one.
pub fn classify_output(stdout: &[u8], stderr: &[u8], exit_status: ExitStatus) -> Outcome {
    let output = String::from_utf8_lossy(stdout);
    let error_output = String::from_utf8_lossy(stderr);

    if reports_already_present(&output) || reports_already_present(&error_output) {
        return Outcome::AlreadyPresent;
    }

    match exit_status {
        ExitStatus::Success => Outcome::Success,
        ExitStatus::Failure(code) => Outcome::Failed {
            reason: FailureReason::ToolExit {
                code,
                detail: last_diagnostic_line(&error_output)
                    .or_else(|| last_diagnostic_line(&output)),
            },
        },
    }
}

fn reports_already_present(text: &str) -> bool {
    match ALREADY_PRESENT.as_ref() {
        Some(re) => re.is_match(text),
        None => {
            let lower = text.to_lowercase();
            lower.contains("already downloaded") || lower.contains("file already exists")
        }
    }
}

/// Last non-blank line, trimmed and capped for display
fn last_diagnostic_line(text: &str) -> Option<String> {
    const MAX_DETAIL_CHARS: usize = 200;

    text.lines()
        .map(str::trim)
        .rfind(|line| !line.is_empty())
        .map(|line| line.chars().take(MAX_DETAIL_CHARS).collect())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_exit_is_success() {
        let outcome = classify_output(
            b"Downloaded \"Artist - Song\": https://youtube.com/watch?v=x\n",
            b"",
            ExitStatus::Success,
        );
        assert_eq!(outcome, Outcome::Success);
    }

    #[test]
    fn test_skip_signal_is_already_present() {
        let outcome = classify_output(
            b"Skipping Artist - Song (file already exists) (duplicate)\n",
            b"",
            ExitStatus::Success,
        );
        assert_eq!(outcome, Outcome::AlreadyPresent);
    }

    #[test]
    fn test_skip_signal_wins_over_nonzero_exit() {
        let outcome = classify_output(
            b"",
            b"Artist - Song is already downloaded\n",
            ExitStatus::Failure(Some(1)),
        );
        assert_eq!(outcome, Outcome::AlreadyPresent);
    }

    #[test]
    fn test_nonzero_exit_without_output() {
        let outcome = classify_output(b"", b"", ExitStatus::Failure(Some(2)));
        assert_eq!(
            outcome,
            Outcome::Failed {
                reason: FailureReason::ToolExit {
                    code: Some(2),
                    detail: None
                }
            }
        );
        assert_eq!(
            outcome.failure().unwrap().to_string(),
            "tool exited with status 2"
        );
    }

    #[test]
    fn test_nonzero_exit_keeps_last_stderr_line() {
        let outcome = classify_output(
            b"Processing query\n",
            b"Traceback (most recent call last):\n  ...\nAudioProviderError: YT-DLP download error\n\n",
            ExitStatus::Failure(Some(1)),
        );
        assert_eq!(
            outcome.failure().unwrap().to_string(),
            "tool exited with status 1: AudioProviderError: YT-DLP download error"
        );
    }

    #[test]
    fn test_nonzero_exit_falls_back_to_stdout() {
        let outcome = classify_output(
            b"LookupError: No results found for song\n",
            b"",
            ExitStatus::Failure(Some(1)),
        );
        match outcome {
            Outcome::Failed {
                reason: FailureReason::ToolExit { detail, .. },
            } => assert_eq!(
                detail.as_deref(),
                Some("LookupError: No results found for song")
            ),
            other => panic!("expected tool exit, got {other:?}"),
        }
    }

    #[test]
    fn test_killed_process_has_no_code() {
        let outcome = classify_output(b"", b"", ExitStatus::Failure(None));
        assert_eq!(
            outcome.failure().unwrap().to_string(),
            "tool terminated by signal"
        );
    }

    #[test]
    fn test_detail_is_capped() {
        let long = "x".repeat(1000);
        let detail = last_diagnostic_line(&long).unwrap();
        assert_eq!(detail.len(), 200);
    }
}
