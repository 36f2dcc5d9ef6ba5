//! Lookups and inserts of completed items.

use crate::error::LedgerError;
use crate::types::{Job, JobKey};
use crate::{Error, Result};

use super::{Ledger, LedgerEntry};

impl Ledger {
    /// Whether `key` has a completion record
    pub async fn contains(&self, key: &JobKey) -> Result<bool> {
        let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM downloads WHERE id = ? LIMIT 1")
            .bind(key.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                Error::Ledger(LedgerError::QueryFailed(format!(
                    "Failed to look up {}: {}",
                    key, e
                )))
            })?;

        Ok(found.is_some())
    }

    /// Record `job` as completed
    ///
    /// Idempotent: recording a key that is already present keeps the first row.
    pub async fn record(&self, job: &Job) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let destination = job.destination.to_string_lossy().into_owned();

        sqlx::query(
            r#"
            INSERT OR IGNORE INTO downloads (id, url, destination, title, playlist_id, recorded_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(job.key.as_str())
        .bind(&job.source)
        .bind(destination)
        .bind(job.title.as_deref())
        .bind(job.playlist_id.as_deref())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Ledger(LedgerError::QueryFailed(format!(
                "Failed to record {}: {}",
                job.key, e
            )))
        })?;

        Ok(())
    }

    /// Fetch the record for `key`, if any
    pub async fn get(&self, key: &JobKey) -> Result<Option<LedgerEntry>> {
        let row = sqlx::query_as::<_, LedgerEntry>(
            r#"
            SELECT id, COALESCE(url, '') AS url, destination, title, playlist_id, recorded_at
            FROM downloads
            WHERE id = ?
            "#,
        )
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Ledger(LedgerError::QueryFailed(format!(
                "Failed to fetch {}: {}",
                key, e
            )))
        })?;

        Ok(row)
    }

    /// Number of completed items
    pub async fn count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM downloads")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                Error::Ledger(LedgerError::QueryFailed(format!(
                    "Failed to count ledger entries: {}",
                    e
                )))
            })?;

        Ok(count.max(0) as u64)
    }

    /// All recorded keys, sorted
    pub async fn recorded_keys(&self) -> Result<Vec<JobKey>> {
        let keys: Vec<String> = sqlx::query_scalar("SELECT id FROM downloads ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                Error::Ledger(LedgerError::QueryFailed(format!(
                    "Failed to list ledger entries: {}",
                    e
                )))
            })?;

        Ok(keys.into_iter().map(JobKey::from).collect())
    }
}
