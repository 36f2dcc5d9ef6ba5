//! Error types for sopti
//!
//! Only run-terminating conditions are modelled as [`Error`]s. A single job that
//! fails or is cancelled is not an error at this level: it resolves to a
//! [`FailureReason`](crate::types::FailureReason) inside its
//! [`Outcome`](crate::types::Outcome) and flows into the run summary.
//!
//! - [`StartupError`] - fatal preflight conditions (ledger, destination, tools)
//! - [`LedgerError`] - failures of the SQLite dedup ledger
//! - Everything else wraps the underlying library error with context

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for sopti operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for sopti
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "workers")
        key: Option<String>,
    },

    /// Fatal condition detected before any job was dispatched
    #[error("startup failed: {0}")]
    Startup(#[from] StartupError),

    /// Dedup ledger operation failed
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error (config and work-item files)
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// External tool execution failed outside of a job (spawn, pipes)
    #[error("external tool error: {0}")]
    ExternalTool(String),
}

/// Fatal startup conditions
///
/// Any of these aborts the session before the first job is dispatched, so no
/// partial ledger writes can happen.
#[derive(Debug, Error)]
pub enum StartupError {
    /// The ledger could not be opened or migrated
    #[error("ledger unavailable at {path}: {reason}")]
    LedgerUnavailable {
        /// Path of the ledger database
        path: PathBuf,
        /// Underlying cause
        reason: String,
    },

    /// The destination directory cannot be created or written to
    #[error("destination {path} is not writable: {reason}")]
    DestinationUnwritable {
        /// The destination root
        path: PathBuf,
        /// Underlying cause
        reason: String,
    },

    /// Required external binaries are not installed
    #[error("missing dependencies: {}. Install them and try again", .missing.join(", "))]
    MissingTools {
        /// Names of the binaries that could not be located
        missing: Vec<String>,
    },
}

/// Ledger-related errors
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Failed to connect to database
    #[error("failed to connect to ledger: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run ledger migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("ledger query failed: {0}")]
    QueryFailed(String),
}

impl Error {
    /// Machine-readable error code, used as a structured log field
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Startup(e) => match e {
                StartupError::LedgerUnavailable { .. } => "ledger_unavailable",
                StartupError::DestinationUnwritable { .. } => "destination_unwritable",
                StartupError::MissingTools { .. } => "missing_tools",
            },
            Error::Ledger(e) => match e {
                LedgerError::ConnectionFailed(_) => "ledger_connection_failed",
                LedgerError::MigrationFailed(_) => "ledger_migration_failed",
                LedgerError::QueryFailed(_) => "ledger_query_failed",
            },
            Error::Sqlx(_) => "database_error",
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
            Error::ExternalTool(_) => "external_tool_error",
        }
    }

    /// Whether this error is one of the fatal startup conditions
    pub fn is_fatal_startup(&self) -> bool {
        matches!(self, Error::Startup(_))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_tools_message_lists_every_binary() {
        let err = Error::Startup(StartupError::MissingTools {
            missing: vec!["spotdl".into(), "ffmpeg".into()],
        });

        let msg = err.to_string();
        assert!(msg.contains("spotdl, ffmpeg"), "got: {msg}");
        assert_eq!(err.error_code(), "missing_tools");
        assert!(err.is_fatal_startup());
    }

    #[test]
    fn ledger_unavailable_mentions_path() {
        let err = Error::from(StartupError::LedgerUnavailable {
            path: PathBuf::from("/nonexistent/downloads.db"),
            reason: "permission denied".into(),
        });

        assert!(err.to_string().contains("/nonexistent/downloads.db"));
        assert_eq!(err.error_code(), "ledger_unavailable");
    }

    #[test]
    fn ledger_query_failure_is_not_fatal() {
        let err = Error::Ledger(LedgerError::QueryFailed("pool closed".into()));

        assert!(!err.is_fatal_startup());
        assert_eq!(err.error_code(), "ledger_query_failed");
    }

    #[test]
    fn io_error_converts_with_question_mark() {
        fn fails() -> Result<()> {
            Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope"))?;
            Ok(())
        }

        let err = fails().unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        assert_eq!(err.error_code(), "io_error");
    }

    #[test]
    fn config_error_displays_message() {
        let err = Error::Config {
            message: "workers must be a positive integer".into(),
            key: Some("workers".into()),
        };

        assert_eq!(
            err.to_string(),
            "configuration error: workers must be a positive integer"
        );
    }
}
