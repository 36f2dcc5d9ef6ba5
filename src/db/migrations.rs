//! Ledger lifecycle and schema migrations.

use crate::error::LedgerError;
use crate::{Error, Result};
use sqlx::{Row, SqliteConnection};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use super::Ledger;

/// How long a statement waits on a locked database file before failing
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

impl Ledger {
    /// Open (or create) the ledger at `path`
    ///
    /// Creates the parent directory and the database file if needed and runs
    /// migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Error::Ledger(LedgerError::ConnectionFailed(format!(
                    "Failed to create ledger directory: {}",
                    e
                )))
            })?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .map_err(|e| {
                Error::Ledger(LedgerError::ConnectionFailed(format!(
                    "Failed to parse ledger path: {}",
                    e
                )))
            })?
            .create_if_missing(true)
            .busy_timeout(BUSY_TIMEOUT)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .acquire_timeout(BUSY_TIMEOUT * 2)
            .connect_with(options)
            .await
            .map_err(|e| {
                Error::Ledger(LedgerError::ConnectionFailed(format!(
                    "Failed to connect to ledger: {}",
                    e
                )))
            })?;

        let ledger = Self { pool };
        ledger.run_migrations().await?;

        tracing::debug!(path = %path.display(), "ledger opened");
        Ok(ledger)
    }

    /// Run schema migrations
    async fn run_migrations(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await.map_err(|e| {
            Error::Ledger(LedgerError::ConnectionFailed(format!(
                "Failed to acquire connection: {}",
                e
            )))
        })?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            Error::Ledger(LedgerError::MigrationFailed(format!(
                "Failed to create schema_version table: {}",
                e
            )))
        })?;

        let current_version: Option<i64> =
            sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
                .fetch_optional(&mut *conn)
                .await
                .map_err(|e| {
                    Error::Ledger(LedgerError::QueryFailed(format!(
                        "Failed to query schema version: {}",
                        e
                    )))
                })?
                .flatten();

        let current_version = current_version.unwrap_or(0);
        if current_version < 1 {
            Self::migrate_v1(&mut conn).await?;
        }
        if current_version < 2 {
            Self::migrate_v2(&mut conn).await?;
        }

        Ok(())
    }

    /// Migration v1: completed-items table
    ///
    /// Leaves an existing `downloads` table as it is; v2 brings its columns up
    /// to date.
    async fn migrate_v1(conn: &mut SqliteConnection) -> Result<()> {
        tracing::info!("Applying ledger migration v1");

        sqlx::query("BEGIN")
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                Error::Ledger(LedgerError::MigrationFailed(format!(
                    "Failed to begin transaction: {}",
                    e
                )))
            })?;

        let result = async {
            sqlx::query(
                r#"
                CREATE TABLE IF NOT EXISTS downloads (
                    id TEXT PRIMARY KEY,
                    url TEXT NOT NULL,
                    destination TEXT NOT NULL,
                    title TEXT,
                    playlist_id TEXT,
                    recorded_at INTEGER NOT NULL
                )
                "#,
            )
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                Error::Ledger(LedgerError::MigrationFailed(format!(
                    "Failed to create downloads table: {}",
                    e
                )))
            })?;

            sqlx::query(
                "CREATE INDEX IF NOT EXISTS idx_downloads_playlist ON downloads(playlist_id)",
            )
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                Error::Ledger(LedgerError::MigrationFailed(format!(
                    "Failed to create index: {}",
                    e
                )))
            })?;

            Self::record_migration(conn, 1).await?;
            Ok::<(), Error>(())
        }
        .await;

        match result {
            Ok(()) => {
                sqlx::query("COMMIT")
                    .execute(&mut *conn)
                    .await
                    .map_err(|e| {
                        Error::Ledger(LedgerError::MigrationFailed(format!(
                            "Failed to commit migration v1: {}",
                            e
                        )))
                    })?;
            }
            Err(e) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                return Err(e);
            }
        }

        tracing::info!("Ledger migration v1 complete");
        Ok(())
    }

    /// Columns `record` writes, with the definition used to add them to an
    /// older `downloads` table
    const LEDGER_COLUMNS: &'static [(&'static str, &'static str)] = &[
        ("url", "url TEXT"),
        ("destination", "destination TEXT NOT NULL DEFAULT ''"),
        ("title", "title TEXT"),
        ("playlist_id", "playlist_id TEXT"),
        ("recorded_at", "recorded_at INTEGER NOT NULL DEFAULT 0"),
    ];

    /// Migration v2: adopt `downloads` tables from the Python spotdl wrapper
    ///
    /// Those share the table name and key column but lack `destination` and
    /// `recorded_at` (and carry `artists`/`album`, which are left in place).
    async fn migrate_v2(conn: &mut SqliteConnection) -> Result<()> {
        tracing::info!("Applying ledger migration v2");

        sqlx::query("BEGIN")
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                Error::Ledger(LedgerError::MigrationFailed(format!(
                    "Failed to begin transaction: {}",
                    e
                )))
            })?;

        let result = async {
            let existing: Vec<String> = sqlx::query("PRAGMA table_info(downloads)")
                .fetch_all(&mut *conn)
                .await
                .map_err(|e| {
                    Error::Ledger(LedgerError::MigrationFailed(format!(
                        "Failed to inspect downloads table: {}",
                        e
                    )))
                })?
                .iter()
                .map(|row| row.get::<String, _>("name"))
                .collect();

            for (name, definition) in Self::LEDGER_COLUMNS {
                if existing.iter().any(|c| c == name) {
                    continue;
                }
                tracing::info!(column = *name, "adding ledger column");
                let statement = format!("ALTER TABLE downloads ADD COLUMN {definition}");
                sqlx::query(&statement)
                    .execute(&mut *conn)
                    .await
                    .map_err(|e| {
                        Error::Ledger(LedgerError::MigrationFailed(format!(
                            "Failed to add column {}: {}",
                            name, e
                        )))
                    })?;
            }

            Self::record_migration(conn, 2).await?;
            Ok::<(), Error>(())
        }
        .await;

        match result {
            Ok(()) => {
                sqlx::query("COMMIT")
                    .execute(&mut *conn)
                    .await
                    .map_err(|e| {
                        Error::Ledger(LedgerError::MigrationFailed(format!(
                            "Failed to commit migration v2: {}",
                            e
                        )))
                    })?;
            }
            Err(e) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                return Err(e);
            }
        }

        tracing::info!("Ledger migration v2 complete");
        Ok(())
    }

    async fn record_migration(conn: &mut SqliteConnection, version: i32) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query("INSERT INTO schema_version (version, applied_at) VALUES (?, ?)")
            .bind(version)
            .bind(now)
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                Error::Ledger(LedgerError::MigrationFailed(format!(
                    "Failed to record migration: {}",
                    e
                )))
            })?;

        Ok(())
    }

    /// Close the ledger
    ///
    /// Waits for the connection to be returned; any later query on a clone of
    /// this handle fails with an error instead of hanging.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Whether [`close`](Self::close) has been called
    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    /// Get the underlying connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
