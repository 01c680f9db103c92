#![deny(warnings)]

//! Headless driver for the pond: run one economy operation against a
//! database and print the result as JSON, or serve the auto-play scheduler.

use anyhow::{anyhow, bail, Result};
use pond_core::{GameConfig, SystemClock, UserId};
use pond_runtime::{AutoFisher, Economy, EconomyError};
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: cli [--db URL] [--config FILE] [--catalog FILE] <command>

commands:
  balance <user>                 coin balance (creates the ledger)
  fish <user>                    one catch attempt
  auto <user>                    toggle auto-play
  shop                           bait price list
  baits <user>                   owned bait
  bait <user>                    equipped bait still in force
  buy-bait <user> <bait>         buy one unit of bait
  use-bait <user> <bait>         equip one unit of bait
  pond <user>                    held fish
  sell <user> <species> [qty]    sell fish at base value
  sell-all <user>                sell every unlocked fish
  lock <user> <species> <secs>   forbid selling a species for a while
  checkin <user>                 daily bonus
  guide                          species table
  stats <user>                   catch statistics
  top [limit]                    most valuable catches
  serve                          run the auto-play scheduler until Ctrl-C";

#[derive(Debug, Default)]
struct Args {
    db: Option<String>,
    config: Option<PathBuf>,
    catalog: Option<PathBuf>,
    version: bool,
    rest: Vec<String>,
}

fn parse_args() -> Args {
    let mut args = Args::default();
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--db" => args.db = it.next(),
            "--config" => args.config = it.next().map(PathBuf::from),
            "--catalog" => args.catalog = it.next().map(PathBuf::from),
            "--version" | "-V" => args.version = true,
            _ => args.rest.push(arg),
        }
    }
    args
}

#[derive(Debug)]
enum Command {
    Balance(UserId),
    Fish(UserId),
    Auto(UserId),
    Shop,
    Baits(UserId),
    Bait(UserId),
    BuyBait(UserId, String),
    UseBait(UserId, String),
    Pond(UserId),
    Sell(UserId, String, i64),
    SellAll(UserId),
    Lock(UserId, String, i64),
    Checkin(UserId),
    Guide,
    Stats(UserId),
    Top(u32),
    Serve,
}

fn parse_command(rest: &[String]) -> Result<Command> {
    let arg = |i: usize| -> Result<&str> {
        rest.get(i)
            .map(String::as_str)
            .ok_or_else(|| anyhow!("missing argument\n\n{USAGE}"))
    };
    let user = || arg(1).map(UserId::from);
    let cmd = match arg(0)? {
        "balance" => Command::Balance(user()?),
        "fish" => Command::Fish(user()?),
        "auto" => Command::Auto(user()?),
        "shop" => Command::Shop,
        "baits" => Command::Baits(user()?),
        "bait" => Command::Bait(user()?),
        "buy-bait" => Command::BuyBait(user()?, arg(2)?.to_string()),
        "use-bait" => Command::UseBait(user()?, arg(2)?.to_string()),
        "pond" => Command::Pond(user()?),
        "sell" => {
            let qty: i64 = match rest.get(3) {
                Some(q) => q.parse()?,
                None => 1,
            };
            Command::Sell(user()?, arg(2)?.to_string(), qty)
        }
        "sell-all" => Command::SellAll(user()?),
        "lock" => Command::Lock(user()?, arg(2)?.to_string(), arg(3)?.parse()?),
        "checkin" => Command::Checkin(user()?),
        "guide" => Command::Guide,
        "stats" => Command::Stats(user()?),
        "top" => Command::Top(match rest.get(1) {
            Some(n) => n.parse()?,
            None => 10,
        }),
        "serve" => Command::Serve,
        other => bail!("unknown command {other:?}\n\n{USAGE}"),
    };
    Ok(cmd)
}

fn emit<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(economy: Arc<Economy>, cfg: &GameConfig, cmd: Command) -> Result<()> {
    match cmd {
        Command::Balance(u) => {
            let coins = economy.get_balance(&u).await?;
            emit(&json!({ "user": u, "coins": coins }))
        }
        Command::Fish(u) => emit(&economy.attempt_catch(&u, false).await?),
        Command::Auto(u) => {
            let on = economy.toggle_auto_play(&u).await?;
            emit(&json!({ "user": u, "auto_play": on }))
        }
        Command::Shop => emit(&economy.bait_shop()),
        Command::Baits(u) => {
            let owned: Vec<_> = economy
                .list_baits(&u)
                .await?
                .into_iter()
                .map(|(kind, quantity)| json!({ "bait": kind, "quantity": quantity }))
                .collect();
            emit(&owned)
        }
        Command::Bait(u) => emit(&economy.active_bait(&u).await?),
        Command::BuyBait(u, name) => {
            let kind = economy.resolve_bait(&name)?;
            emit(&economy.purchase_bait(&u, kind).await?)
        }
        Command::UseBait(u, name) => {
            let kind = economy.resolve_bait(&name)?;
            emit(&economy.equip_bait(&u, kind).await?)
        }
        Command::Pond(u) => emit(&economy.list_holdings(&u).await?),
        Command::Sell(u, name, qty) => {
            let species = economy.resolve_species(&name)?;
            emit(&economy.sell(&u, species, qty).await?)
        }
        Command::SellAll(u) => emit(&economy.sell_all(&u).await?),
        Command::Lock(u, name, secs) => {
            let species = economy.resolve_species(&name)?;
            let until = economy.lock_species(&u, species, secs).await?;
            emit(&json!({ "user": u, "species": species, "locked_until": until }))
        }
        Command::Checkin(u) => emit(&economy.daily_bonus(&u).await?),
        Command::Guide => emit(&economy.fish_guide()),
        Command::Stats(u) => {
            let ledger = economy.ledger(&u).await?;
            let stats = economy.fisher_stats(&u).await?;
            emit(&json!({ "ledger": ledger, "catches": stats }))
        }
        Command::Top(limit) => emit(&economy.best_catches(limit).await?),
        Command::Serve => {
            if !cfg.economy.auto_play_enabled {
                warn!("auto-play is disabled, scheduler not started");
                return Ok(());
            }
            let handle = AutoFisher::new(economy, cfg.scheduler.clone())?.spawn();
            tokio::signal::ctrl_c().await?;
            info!("shutdown requested");
            handle.shutdown().await?;
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout stays machine-readable.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args();
    if args.version {
        println!(
            "cli {} ({} {})",
            env!("CARGO_PKG_VERSION"),
            env!("GIT_SHA"),
            env!("BUILD_DATE")
        );
        return Ok(());
    }
    let cmd = parse_command(&args.rest)?;

    let mut cfg = match &args.config {
        Some(path) => GameConfig::load(path)?,
        None => GameConfig::default(),
    };
    if let Some(db) = args.db {
        cfg.database_url = db;
    }
    if args.catalog.is_some() {
        cfg.catalog_path = args.catalog;
    }
    let catalog = Arc::new(cfg.catalog()?);
    info!(db = %cfg.database_url, species = catalog.species().len(), "starting CLI");

    persistence::prepare_sqlite_path(&cfg.database_url)?;
    let pool = persistence::init_db(&cfg.database_url).await?;
    let economy = Arc::new(Economy::new(
        pool.clone(),
        catalog,
        cfg.economy.clone(),
        Arc::new(SystemClock),
    )?);

    let result = run(economy, &cfg, cmd).await;
    pool.close().await;
    match result {
        Err(e) => match e.downcast_ref::<EconomyError>() {
            // Refusals are answers, not crashes.
            Some(refusal) if !matches!(refusal, EconomyError::Store(_)) => {
                emit(&json!({
                    "error": refusal.to_string(),
                    "retryable": refusal.is_retryable(),
                }))?;
                std::process::exit(2);
            }
            _ => Err(e),
        },
        ok => ok,
    }
}
