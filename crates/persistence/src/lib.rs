#![deny(warnings)]

//! Persistence layer: SQLite schema and ledger queries.
//!
//! Query functions take a `&mut SqliteConnection` so callers can compose
//! several of them inside one transaction. Every mutation that could break an
//! invariant (negative coins, selling locked or missing fish, spending bait
//! that is not there) is a conditional update reporting whether it applied.

use sqlx::migrate::Migrator;
use sqlx::{ConnectOptions, Connection};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

mod holdings;
mod journal;
mod ledger;

pub use holdings::{add_holding, holding, holdings, remove_holding, set_sell_lock, Holding};
pub use journal::{
    best_catches, claim_daily, fisher_stats, has_claimed, record_catch, BestCatch, FisherStats,
};
pub use ledger::{
    add_bait, auto_play_users, bait_inventory, clear_active_bait, credit_coins, debit_coins,
    ensure_ledger, ledger, record_attempt, set_active_bait, set_auto_play, take_bait,
    ActiveBait, UserLedger,
};
pub use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Errors raised by the store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    /// A stored value no longer maps onto a domain type.
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Returns the default SQLite URL used for local saves.
pub fn default_sqlite_url() -> &'static str {
    "sqlite://./data/fishing.db"
}

/// Create the parent directory of a file-backed SQLite URL.
pub fn prepare_sqlite_path(url: &str) -> std::io::Result<()> {
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"));
    if let Some(path) = path.filter(|p| !p.starts_with(":memory:")) {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
    }
    Ok(())
}

/// Open (creating if needed) a file database and apply migrations.
pub async fn init_db(url: &str) -> Result<SqlitePool> {
    let opts = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5))
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(opts)
        .await?;
    MIGRATOR.run(&pool).await?;
    info!(url, "database ready");
    Ok(pool)
}

/// A private in-memory database for tests and throwaway runs.
///
/// The database is a named shared-cache memory database, so it outlives any
/// single pool connection: a keeper connection outside the pool holds it open
/// until the pool is closed or dropped. The pool itself stays at one
/// connection because shared-cache tables lock rather than wait.
pub async fn open_in_memory() -> Result<SqlitePool> {
    let opts = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
    let keeper = opts.connect().await?;
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(opts)
        .await?;
    MIGRATOR.run(&pool).await?;
    let closed = pool.close_event();
    tokio::spawn(async move {
        closed.await;
        if let Err(e) = keeper.close().await {
            debug!(error = %e, "in-memory keeper close failed");
        }
    });
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_is_sqlite() {
        assert!(default_sqlite_url().starts_with("sqlite://"));
    }

    #[test]
    fn memory_urls_need_no_directory() {
        prepare_sqlite_path("sqlite::memory:").unwrap();
    }

    #[tokio::test]
    async fn migrations_apply_to_fresh_memory_db() {
        let pool = open_in_memory().await.unwrap();
        let (n,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN \
             ('ledgers', 'holdings', 'bait_inventory', 'daily_claims', 'catch_journal')",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(n, 5);
    }

    #[tokio::test]
    async fn memory_db_survives_a_replaced_connection() {
        let pool = open_in_memory().await.unwrap();
        let mut conn = pool.acquire().await.unwrap();
        ensure_ledger(&mut conn, &pond_core::UserId::new("kept"), 100, 0)
            .await
            .unwrap();
        // Take the pinned connection out of the pool and close it, as sqlx
        // does with a connection whose query was cancelled.
        conn.detach().close().await.unwrap();

        let mut fresh = pool.acquire().await.unwrap();
        let kept = ledger(&mut fresh, &pond_core::UserId::new("kept"))
            .await
            .unwrap();
        assert_eq!(kept.coins, 100);
    }

    #[tokio::test]
    async fn memory_dbs_are_private() {
        let a = open_in_memory().await.unwrap();
        let b = open_in_memory().await.unwrap();
        ensure_ledger(&mut *a.acquire().await.unwrap(), &pond_core::UserId::new("x"), 5, 0)
            .await
            .unwrap();
        let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM ledgers")
            .fetch_one(&b)
            .await
            .unwrap();
        assert_eq!(n, 0);
    }
}
