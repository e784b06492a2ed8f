//! Persistent relational state, spec §4.1.
//!
//! Backed by SQLite through `sqlx`. Migrations are embedded into the binary
//! and run once at `Store::open`; the watermark lives in sqlx's own
//! `_sqlx_migrations` table (the "monotonic integer version with an
//! idempotent recorded watermark" the spec calls for).

mod encoding_log;
mod exclusions;
mod files;
mod kv;
mod libraries;
mod stats;

use crate::error::{ReencodeError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

pub use files::QueuePick;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("pool_size", &self.pool.size())
            .field("idle_connections", &self.pool.num_idle())
            .finish()
    }
}

impl Store {
    /// Open (creating if absent) the database file at `path`, run migrations,
    /// and enforce the journaling + foreign-key pragmas spec §6 requires.
    pub async fn open(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path.display()))
            .map_err(|e| ReencodeError::Storage(e))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        MIGRATOR.run(&pool).await.map_err(|e| {
            ReencodeError::Storage(sqlx::Error::Migrate(Box::new(e)))
        })?;

        info!(path = %path.display(), "store opened and migrated");
        Ok(Self { pool })
    }

    #[cfg(any(test, feature = "test-support"))]
    pub async fn open_in_memory() -> Result<Self> {
        // A shared cache is required once more than one pooled connection can
        // reach this database: without it, each new connection opens its own
        // private `:memory:` instance and sees no tables.
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| ReencodeError::Storage(e))?
            .shared_cache(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        MIGRATOR.run(&pool).await.map_err(|e| {
            ReencodeError::Storage(sqlx::Error::Migrate(Box::new(e)))
        })?;
        Ok(Self { pool })
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Recovery contract after a crash (spec §4.1): any row stuck in
    /// `encoding` goes back to `queued` with `started_at` cleared.
    pub async fn reset_encoding(&self) -> Result<u64> {
        let result = sqlx::query(
            "update files set status = 'queued', started_at = null, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') where status = 'encoding'",
        )
        .execute(&self.pool)
        .await?;
        let affected = result.rows_affected();
        if affected > 0 {
            info!(count = affected, "recovered files stuck in encoding");
        }
        Ok(affected)
    }
}
