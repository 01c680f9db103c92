#![deny(warnings)]

use persistence::{default_sqlite_url, init_db, prepare_sqlite_path};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| default_sqlite_url().to_string());
    prepare_sqlite_path(&url)?;
    let pool = init_db(&url).await?;
    let (users,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM ledgers")
        .fetch_one(&pool)
        .await?;
    pool.close().await;
    println!("DB migrated at {} ({} ledgers)", url, users);
    Ok(())
}
