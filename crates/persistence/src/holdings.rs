//! Owned fish per user.

use crate::Result;
use pond_core::{SpeciesId, UserId};
use serde::Serialize;
use sqlx::{FromRow, SqliteConnection};

/// One held species. Rows with quantity 0 are never returned, so a zero row
/// and a missing row read the same.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Holding {
    pub species: SpeciesId,
    pub quantity: i64,
    pub sell_lock_until: Option<i64>,
}

impl Holding {
    pub fn is_locked(&self, now: i64) -> bool {
        self.sell_lock_until.is_some_and(|until| until > now)
    }

    /// Seconds until the lock lifts; 0 when unlocked.
    pub fn remaining_lock_secs(&self, now: i64) -> i64 {
        self.sell_lock_until.map_or(0, |until| (until - now).max(0))
    }
}

#[derive(FromRow)]
struct HoldingRow {
    species_id: i64,
    quantity: i64,
    sell_lock_until: Option<i64>,
}

impl From<HoldingRow> for Holding {
    fn from(r: HoldingRow) -> Self {
        Holding {
            species: SpeciesId(r.species_id as u32),
            quantity: r.quantity,
            sell_lock_until: r.sell_lock_until,
        }
    }
}

/// All non-empty holdings of a user, in species order.
pub async fn holdings(conn: &mut SqliteConnection, user: &UserId) -> Result<Vec<Holding>> {
    let rows: Vec<HoldingRow> = sqlx::query_as(
        "SELECT species_id, quantity, sell_lock_until FROM holdings \
         WHERE user_id = ? AND quantity > 0 ORDER BY species_id",
    )
    .bind(user.as_str())
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows.into_iter().map(Holding::from).collect())
}

pub async fn holding(
    conn: &mut SqliteConnection,
    user: &UserId,
    species: SpeciesId,
) -> Result<Option<Holding>> {
    let row: Option<HoldingRow> = sqlx::query_as(
        "SELECT species_id, quantity, sell_lock_until FROM holdings \
         WHERE user_id = ? AND species_id = ? AND quantity > 0",
    )
    .bind(user.as_str())
    .bind(i64::from(species.0))
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row.map(Holding::from))
}

/// Add units of a species. An existing sell lock is left as is.
pub async fn add_holding(
    conn: &mut SqliteConnection,
    user: &UserId,
    species: SpeciesId,
    quantity: i64,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO holdings (user_id, species_id, quantity) VALUES (?, ?, ?) \
         ON CONFLICT (user_id, species_id) DO UPDATE SET quantity = quantity + excluded.quantity",
    )
    .bind(user.as_str())
    .bind(i64::from(species.0))
    .bind(quantity)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Remove units only if enough are held and no lock is in force at `now`.
/// Returns whether it applied.
pub async fn remove_holding(
    conn: &mut SqliteConnection,
    user: &UserId,
    species: SpeciesId,
    quantity: i64,
    now: i64,
) -> Result<bool> {
    let res = sqlx::query(
        "UPDATE holdings SET quantity = quantity - ? \
         WHERE user_id = ? AND species_id = ? AND quantity >= ? \
         AND (sell_lock_until IS NULL OR sell_lock_until <= ?)",
    )
    .bind(quantity)
    .bind(user.as_str())
    .bind(i64::from(species.0))
    .bind(quantity)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(res.rows_affected() == 1)
}

/// Forbid selling a species until `until`. A later existing lock wins.
pub async fn set_sell_lock(
    conn: &mut SqliteConnection,
    user: &UserId,
    species: SpeciesId,
    until: i64,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO holdings (user_id, species_id, quantity, sell_lock_until) VALUES (?, ?, 0, ?) \
         ON CONFLICT (user_id, species_id) DO UPDATE SET sell_lock_until = \
         MAX(COALESCE(sell_lock_until, excluded.sell_lock_until), excluded.sell_lock_until)",
    )
    .bind(user.as_str())
    .bind(i64::from(species.0))
    .bind(until)
    .execute(&mut *conn)
    .await?;
    Ok(())
}
