//! Dedup ledger for sopti
//!
//! A durable SQLite record of every item that completed (downloaded, or found
//! already present). Presence of a key is the only signal that an item does
//! not need to be attempted again, across process restarts.
//!
//! ## Submodules
//!
//! Methods on [`Ledger`] are organized by concern:
//! - `migrations`: Ledger lifecycle, schema migrations
//! - `entries`: Lookups and inserts of completed items

use sqlx::{FromRow, sqlite::SqlitePool};

mod entries;
mod migrations;

/// A completed item as stored in the ledger
#[derive(Debug, Clone, FromRow)]
pub struct LedgerEntry {
    /// Job key (track id)
    pub id: String,
    /// Source URL the item was acquired from
    pub url: String,
    /// Destination directory the tool wrote into
    pub destination: String,
    /// Display title, if known
    pub title: Option<String>,
    /// Playlist the item came from, if any
    pub playlist_id: Option<String>,
    /// Unix timestamp when the item was recorded
    pub recorded_at: i64,
}

/// Ledger handle
///
/// Backed by a single-connection pool, so concurrent workers are serialized
/// by sqlx rather than racing on the file.
#[derive(Clone, Debug)]
pub struct Ledger {
    pool: SqlitePool,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
