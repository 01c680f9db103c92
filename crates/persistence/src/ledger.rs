//! Per-user ledger rows and bait inventory.

use crate::{Result, StoreError};
use pond_core::{BaitKind, UserId};
use serde::Serialize;
use sqlx::{FromRow, SqliteConnection};

/// Bait currently equipped, as stored. Whether it is still inside its window
/// is decided by the caller against the catalog duration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ActiveBait {
    pub kind: BaitKind,
    pub activated_at: i64,
}

/// Durable per-user record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UserLedger {
    pub user_id: UserId,
    pub coins: i64,
    pub active_bait: Option<ActiveBait>,
    /// Unix seconds of the last accepted catch attempt.
    pub last_catch_at: Option<i64>,
    pub auto_play: bool,
    pub total_attempts: i64,
    pub created_at: i64,
}

#[derive(FromRow)]
struct LedgerRow {
    user_id: String,
    coins: i64,
    active_bait: Option<String>,
    bait_activated_at: Option<i64>,
    last_catch_at: Option<i64>,
    auto_play: bool,
    total_attempts: i64,
    created_at: i64,
}

impl TryFrom<LedgerRow> for UserLedger {
    type Error = StoreError;

    fn try_from(row: LedgerRow) -> Result<Self> {
        let active_bait = match (row.active_bait, row.bait_activated_at) {
            (Some(key), Some(activated_at)) => {
                let kind = BaitKind::from_key(&key)
                    .ok_or_else(|| StoreError::Corrupt(format!("unknown bait key {key:?}")))?;
                Some(ActiveBait { kind, activated_at })
            }
            _ => None,
        };
        Ok(UserLedger {
            user_id: UserId(row.user_id),
            coins: row.coins,
            active_bait,
            last_catch_at: row.last_catch_at,
            auto_play: row.auto_play,
            total_attempts: row.total_attempts,
            created_at: row.created_at,
        })
    }
}

/// Create the ledger with its starting grant unless it exists. Returns whether
/// a row was created. Being a write, it also takes the database write lock
/// when issued first in a transaction.
pub async fn ensure_ledger(
    conn: &mut SqliteConnection,
    user: &UserId,
    starting_coins: i64,
    now: i64,
) -> Result<bool> {
    let res = sqlx::query(
        "INSERT OR IGNORE INTO ledgers (user_id, coins, created_at) VALUES (?, ?, ?)",
    )
    .bind(user.as_str())
    .bind(starting_coins)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(res.rows_affected() == 1)
}

/// Load an existing ledger.
pub async fn ledger(conn: &mut SqliteConnection, user: &UserId) -> Result<UserLedger> {
    let row: LedgerRow = sqlx::query_as(
        "SELECT user_id, coins, active_bait, bait_activated_at, last_catch_at, auto_play, \
         total_attempts, created_at FROM ledgers WHERE user_id = ?",
    )
    .bind(user.as_str())
    .fetch_one(&mut *conn)
    .await?;
    row.try_into()
}

/// Consume one catch attempt: stamp `last_catch_at`, charge `cost` and bump
/// the attempt counter, only if the cooldown has elapsed and the balance
/// covers the cost. Returns whether the attempt was recorded.
pub async fn record_attempt(
    conn: &mut SqliteConnection,
    user: &UserId,
    now: i64,
    cooldown_secs: i64,
    cost: i64,
) -> Result<bool> {
    let res = sqlx::query(
        "UPDATE ledgers SET last_catch_at = ?, coins = coins - ?, \
         total_attempts = total_attempts + 1 \
         WHERE user_id = ? AND coins >= ? AND (last_catch_at IS NULL OR last_catch_at <= ?)",
    )
    .bind(now)
    .bind(cost)
    .bind(user.as_str())
    .bind(cost)
    .bind(now - cooldown_secs)
    .execute(&mut *conn)
    .await?;
    Ok(res.rows_affected() == 1)
}

pub async fn credit_coins(conn: &mut SqliteConnection, user: &UserId, amount: i64) -> Result<()> {
    sqlx::query("UPDATE ledgers SET coins = coins + ? WHERE user_id = ?")
        .bind(amount)
        .bind(user.as_str())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Debit only if the balance covers it. Returns whether it applied.
pub async fn debit_coins(conn: &mut SqliteConnection, user: &UserId, amount: i64) -> Result<bool> {
    let res = sqlx::query("UPDATE ledgers SET coins = coins - ? WHERE user_id = ? AND coins >= ?")
        .bind(amount)
        .bind(user.as_str())
        .bind(amount)
        .execute(&mut *conn)
        .await?;
    Ok(res.rows_affected() == 1)
}

pub async fn set_auto_play(conn: &mut SqliteConnection, user: &UserId, on: bool) -> Result<()> {
    sqlx::query("UPDATE ledgers SET auto_play = ? WHERE user_id = ?")
        .bind(on)
        .bind(user.as_str())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Users with auto-play on, in id order.
pub async fn auto_play_users(conn: &mut SqliteConnection) -> Result<Vec<UserId>> {
    let rows: Vec<(String,)> =
        sqlx::query_as("SELECT user_id FROM ledgers WHERE auto_play = 1 ORDER BY user_id")
            .fetch_all(&mut *conn)
            .await?;
    Ok(rows.into_iter().map(|(id,)| UserId(id)).collect())
}

pub async fn set_active_bait(
    conn: &mut SqliteConnection,
    user: &UserId,
    kind: BaitKind,
    now: i64,
) -> Result<()> {
    sqlx::query("UPDATE ledgers SET active_bait = ?, bait_activated_at = ? WHERE user_id = ?")
        .bind(kind.key())
        .bind(now)
        .bind(user.as_str())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn clear_active_bait(conn: &mut SqliteConnection, user: &UserId) -> Result<()> {
    sqlx::query("UPDATE ledgers SET active_bait = NULL, bait_activated_at = NULL WHERE user_id = ?")
        .bind(user.as_str())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn add_bait(
    conn: &mut SqliteConnection,
    user: &UserId,
    kind: BaitKind,
    quantity: i64,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO bait_inventory (user_id, bait, quantity) VALUES (?, ?, ?) \
         ON CONFLICT (user_id, bait) DO UPDATE SET quantity = quantity + excluded.quantity",
    )
    .bind(user.as_str())
    .bind(kind.key())
    .bind(quantity)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Remove one unit of bait if any is held. Returns whether it applied.
pub async fn take_bait(conn: &mut SqliteConnection, user: &UserId, kind: BaitKind) -> Result<bool> {
    let res = sqlx::query(
        "UPDATE bait_inventory SET quantity = quantity - 1 \
         WHERE user_id = ? AND bait = ? AND quantity > 0",
    )
    .bind(user.as_str())
    .bind(kind.key())
    .execute(&mut *conn)
    .await?;
    Ok(res.rows_affected() == 1)
}

/// Held bait kinds with quantity > 0, in kind order.
pub async fn bait_inventory(
    conn: &mut SqliteConnection,
    user: &UserId,
) -> Result<Vec<(BaitKind, i64)>> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        "SELECT bait, quantity FROM bait_inventory WHERE user_id = ? AND quantity > 0",
    )
    .bind(user.as_str())
    .fetch_all(&mut *conn)
    .await?;
    let mut out = rows
        .into_iter()
        .map(|(key, qty)| {
            BaitKind::from_key(&key)
                .map(|k| (k, qty))
                .ok_or_else(|| StoreError::Corrupt(format!("unknown bait key {key:?}")))
        })
        .collect::<Result<Vec<_>>>()?;
    out.sort_by_key(|(k, _)| *k);
    Ok(out)
}
