//! Catch journal and daily bonus claims.

use crate::{Result, StoreError};
use chrono::NaiveDate;
use pond_core::{CatchResult, Rarity, SpeciesId, UserId};
use serde::Serialize;
use sqlx::{FromRow, SqliteConnection};

/// Lifetime catch statistics of one user.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct FisherStats {
    pub catch_count: i64,
    pub total_value: i64,
    pub avg_value: f64,
    /// Share of catches in the lowest tier.
    pub trash_rate: f64,
}

/// A single high-value journal entry.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BestCatch {
    pub user_id: UserId,
    pub species: SpeciesId,
    pub rarity: Rarity,
    pub weight_kg: f64,
    pub value: i64,
    pub caught_at: i64,
}

pub async fn record_catch(
    conn: &mut SqliteConnection,
    user: &UserId,
    catch: &CatchResult,
    auto: bool,
    now: i64,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO catch_journal (user_id, species_id, rarity, weight_kg, value, auto, caught_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(user.as_str())
    .bind(i64::from(catch.species.0))
    .bind(i64::from(catch.rarity.tier()))
    .bind(catch.weight_kg)
    .bind(catch.value)
    .bind(auto)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn fisher_stats(conn: &mut SqliteConnection, user: &UserId) -> Result<FisherStats> {
    let (count, total, trash): (i64, i64, i64) = sqlx::query_as(
        "SELECT COUNT(*), COALESCE(SUM(value), 0), \
         COALESCE(SUM(CASE WHEN rarity = 1 THEN 1 ELSE 0 END), 0) \
         FROM catch_journal WHERE user_id = ?",
    )
    .bind(user.as_str())
    .fetch_one(&mut *conn)
    .await?;
    if count == 0 {
        return Ok(FisherStats::default());
    }
    Ok(FisherStats {
        catch_count: count,
        total_value: total,
        avg_value: total as f64 / count as f64,
        trash_rate: trash as f64 / count as f64,
    })
}

#[derive(FromRow)]
struct BestCatchRow {
    user_id: String,
    species_id: i64,
    rarity: i64,
    weight_kg: f64,
    value: i64,
    caught_at: i64,
}

/// Highest-value catches across all users, ties broken by earliest.
pub async fn best_catches(conn: &mut SqliteConnection, limit: u32) -> Result<Vec<BestCatch>> {
    let rows: Vec<BestCatchRow> = sqlx::query_as(
        "SELECT user_id, species_id, rarity, weight_kg, value, caught_at FROM catch_journal \
         ORDER BY value DESC, caught_at ASC, id ASC LIMIT ?",
    )
    .bind(i64::from(limit))
    .fetch_all(&mut *conn)
    .await?;
    rows.into_iter()
        .map(|r| {
            let rarity = u8::try_from(r.rarity)
                .ok()
                .and_then(Rarity::from_tier)
                .ok_or_else(|| StoreError::Corrupt(format!("rarity tier {}", r.rarity)))?;
            Ok(BestCatch {
                user_id: UserId(r.user_id),
                species: SpeciesId(r.species_id as u32),
                rarity,
                weight_kg: r.weight_kg,
                value: r.value,
                caught_at: r.caught_at,
            })
        })
        .collect()
}

/// Record the daily bonus for `date` unless already claimed. Returns whether
/// this call made the claim.
pub async fn claim_daily(
    conn: &mut SqliteConnection,
    user: &UserId,
    date: NaiveDate,
    amount: i64,
    now: i64,
) -> Result<bool> {
    let res = sqlx::query(
        "INSERT OR IGNORE INTO daily_claims (user_id, claim_date, amount, claimed_at) \
         VALUES (?, ?, ?, ?)",
    )
    .bind(user.as_str())
    .bind(date.to_string())
    .bind(amount)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(res.rows_affected() == 1)
}

pub async fn has_claimed(conn: &mut SqliteConnection, user: &UserId, date: NaiveDate) -> Result<bool> {
    let (n,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM daily_claims WHERE user_id = ? AND claim_date = ?")
            .bind(user.as_str())
            .bind(date.to_string())
            .fetch_one(&mut *conn)
            .await?;
    Ok(n > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ensure_ledger, open_in_memory};

    fn catch(species: u32, rarity: Rarity, value: i64) -> CatchResult {
        CatchResult {
            species: SpeciesId(species),
            name: format!("fish {species}"),
            rarity,
            weight_kg: 1.25,
            value,
        }
    }

    #[tokio::test]
    async fn stats_aggregate_the_journal() {
        let pool = open_in_memory().await.unwrap();
        let mut conn = pool.acquire().await.unwrap();
        let u = UserId::new("u");
        ensure_ledger(&mut conn, &u, 0, 0).await.unwrap();
        assert_eq!(fisher_stats(&mut conn, &u).await.unwrap(), FisherStats::default());

        record_catch(&mut conn, &u, &catch(1, Rarity::Trash, 10), false, 1).await.unwrap();
        record_catch(&mut conn, &u, &catch(8, Rarity::Trash, 20), true, 2).await.unwrap();
        record_catch(&mut conn, &u, &catch(7, Rarity::Legendary, 1_470), true, 3).await.unwrap();
        record_catch(&mut conn, &u, &catch(4, Rarity::Rare, 100), false, 4).await.unwrap();

        let s = fisher_stats(&mut conn, &u).await.unwrap();
        assert_eq!(s.catch_count, 4);
        assert_eq!(s.total_value, 1_600);
        assert!((s.avg_value - 400.0).abs() < 1e-9);
        assert!((s.trash_rate - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn best_catches_rank_by_value() {
        let pool = open_in_memory().await.unwrap();
        let mut conn = pool.acquire().await.unwrap();
        let (a, b) = (UserId::new("a"), UserId::new("b"));
        ensure_ledger(&mut conn, &a, 0, 0).await.unwrap();
        ensure_ledger(&mut conn, &b, 0, 0).await.unwrap();
        record_catch(&mut conn, &a, &catch(1, Rarity::Trash, 12), false, 1).await.unwrap();
        record_catch(&mut conn, &b, &catch(7, Rarity::Legendary, 1_200), false, 2).await.unwrap();
        record_catch(&mut conn, &a, &catch(6, Rarity::Epic, 600), false, 3).await.unwrap();

        let top = best_catches(&mut conn, 2).await.unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].user_id, b);
        assert_eq!(top[0].rarity, Rarity::Legendary);
        assert_eq!(top[1].value, 600);
    }

    #[tokio::test]
    async fn daily_claim_is_once_per_date() {
        let pool = open_in_memory().await.unwrap();
        let mut conn = pool.acquire().await.unwrap();
        let u = UserId::new("u");
        ensure_ledger(&mut conn, &u, 0, 0).await.unwrap();
        let d1 = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let d2 = d1.succ_opt().unwrap();

        assert!(!has_claimed(&mut conn, &u, d1).await.unwrap());
        assert!(claim_daily(&mut conn, &u, d1, 80, 0).await.unwrap());
        assert!(!claim_daily(&mut conn, &u, d1, 90, 1).await.unwrap());
        assert!(has_claimed(&mut conn, &u, d1).await.unwrap());
        assert!(claim_daily(&mut conn, &u, d2, 70, 2).await.unwrap());
    }
}
