//! Per-user economy state machine over the ledger store.
//!
//! Every mutating operation takes the user's exclusive section, then runs in
//! one store transaction that opens with the lazy ledger insert, so the
//! database write lock is held from the first statement on. State is re-read
//! inside that transaction on every call.

use crate::error::EconomyError;
use crate::locks::UserLocks;
use chrono::NaiveDate;
use persistence::{Sqlite, SqliteConnection, SqlitePool, StoreError, Transaction, UserLedger};
use pond_catch::{generate_catch, roll_success, success_rate, RarityTable};
use pond_core::{
    BaitDefinition, BaitKind, CatalogEntry, CatchResult, Catalog, Clock, EconomyConfig, Rarity,
    SpeciesId, UserId,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error, info, warn};

type Tx = Transaction<'static, Sqlite>;

/// Why an auto-play attempt was passed over without a charge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Cooldown,
    /// The user switched auto-play off after the tick listed them.
    AutoPlayOff,
    /// Balance below the attempt cost; auto-play was switched off.
    OutOfFunds,
}

/// Result of one catch attempt.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CatchOutcome {
    Caught { cost: i64, catch: CatchResult },
    EmptyHanded { cost: i64 },
    /// Only produced for auto-play attempts. Nothing was charged.
    Skipped { reason: SkipReason },
}

impl CatchOutcome {
    /// Whether the attempt consumed the cooldown and the cost.
    pub fn accepted(&self) -> bool {
        !matches!(self, CatchOutcome::Skipped { .. })
    }

    pub fn success(&self) -> bool {
        matches!(self, CatchOutcome::Caught { .. })
    }

    pub fn cost(&self) -> i64 {
        match self {
            CatchOutcome::Caught { cost, .. } | CatchOutcome::EmptyHanded { cost } => *cost,
            CatchOutcome::Skipped { .. } => 0,
        }
    }

    pub fn catch(&self) -> Option<&CatchResult> {
        match self {
            CatchOutcome::Caught { catch, .. } => Some(catch),
            _ => None,
        }
    }
}

/// An equipped bait still inside its window.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BaitStatus {
    pub kind: BaitKind,
    pub name: String,
    pub bonus: f64,
    pub remaining_secs: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Purchase {
    pub kind: BaitKind,
    pub price: i64,
    /// Balance after the purchase.
    pub coins: i64,
}

/// One sold species.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Sale {
    pub species: SpeciesId,
    pub name: String,
    pub quantity: i64,
    pub unit_price: i64,
    pub coins_gained: i64,
}

/// What `sell_all` sold and what it had to leave behind.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SellManifest {
    pub sold: Vec<Sale>,
    pub locked: Vec<SpeciesId>,
    pub coins_gained: i64,
    pub coins: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DailyBonus {
    Granted { amount: i64, coins: i64 },
    AlreadyClaimed { date: NaiveDate },
}

/// A holding joined with its catalog entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HoldingView {
    pub species: SpeciesId,
    pub name: String,
    pub rarity: Rarity,
    pub grade: &'static str,
    pub quantity: i64,
    pub base_value: i64,
    pub remaining_lock_secs: i64,
}

/// One row of the species table.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GuideEntry<'a> {
    #[serde(flatten)]
    pub species: &'a CatalogEntry,
    pub grade: &'static str,
    /// Chance that an attempt draws this species' tier.
    pub tier_odds: f64,
}

/// The gatekeeper for every ledger mutation. Share it behind an `Arc`.
#[derive(Debug)]
pub struct Economy {
    pool: SqlitePool,
    catalog: Arc<Catalog>,
    config: EconomyConfig,
    table: RarityTable,
    clock: Arc<dyn Clock>,
    rng: Mutex<ChaCha8Rng>,
    locks: UserLocks,
}

impl Economy {
    pub fn new(
        pool: SqlitePool,
        catalog: Arc<Catalog>,
        config: EconomyConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, EconomyError> {
        config.validate()?;
        let table = RarityTable::new(config.rarity_weights)?;
        let rng = match config.rng_seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::seed_from_u64(rand::random()),
        };
        Ok(Self {
            pool,
            catalog,
            config,
            table,
            clock,
            rng: Mutex::new(rng),
            locks: UserLocks::default(),
        })
    }

    /// The species and bait tables this economy draws from.
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Validated tunables the economy was built with.
    pub fn config(&self) -> &EconomyConfig {
        &self.config
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Take a user's exclusive section, stalling their operations until the
    /// guard drops.
    #[cfg(test)]
    pub(crate) async fn hold_user(&self, user: &UserId) -> tokio::sync::OwnedMutexGuard<()> {
        self.locks.lock(user).await
    }

    /// Unix seconds on the economy's clock.
    pub(crate) fn unix_now(&self) -> i64 {
        self.clock.unix_now()
    }

    fn with_rng<T>(&self, f: impl FnOnce(&mut ChaCha8Rng) -> T) -> T {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut rng)
    }

    /// Open a transaction on the user's ledger, creating it on first contact.
    async fn begin(&self, user: &UserId, ts: i64) -> Result<Tx, EconomyError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;
        if persistence::ensure_ledger(&mut tx, user, self.config.starting_coins, ts).await? {
            info!(user = %user, coins = self.config.starting_coins, "ledger created");
        }
        Ok(tx)
    }

    pub fn resolve_species(&self, name_or_id: &str) -> Result<SpeciesId, EconomyError> {
        self.catalog
            .resolve_species(name_or_id)
            .map(|e| e.id)
            .ok_or_else(|| EconomyError::UnknownSpecies(name_or_id.to_string()))
    }

    pub fn resolve_bait(&self, name: &str) -> Result<BaitKind, EconomyError> {
        self.catalog
            .resolve_bait(name)
            .map(|b| b.kind)
            .ok_or_else(|| EconomyError::UnknownBait(name.to_string()))
    }

    pub async fn get_balance(&self, user: &UserId) -> Result<i64, EconomyError> {
        Ok(self.ledger(user).await?.coins)
    }

    /// Snapshot of the stored ledger.
    pub async fn ledger(&self, user: &UserId) -> Result<UserLedger, EconomyError> {
        let ts = self.unix_now();
        let mut tx = self.begin(user, ts).await?;
        let ledger = persistence::ledger(&mut tx, user).await?;
        commit(tx).await?;
        Ok(ledger)
    }

    /// One catch attempt: cooldown, affordability, attempt marker and debit,
    /// success roll, then the catch itself.
    ///
    /// Foreground refusals come back as errors. Auto-play refusals come back
    /// as [`CatchOutcome::Skipped`]; running out of funds also turns
    /// auto-play off.
    pub async fn attempt_catch(
        &self,
        user: &UserId,
        is_auto: bool,
    ) -> Result<CatchOutcome, EconomyError> {
        let _guard = self.locks.lock(user).await;
        let ts = self.unix_now();
        let mut tx = self.begin(user, ts).await?;
        let ledger = persistence::ledger(&mut tx, user).await?;
        let cost = self.config.attempt_cost;

        if is_auto && !ledger.auto_play {
            commit(tx).await?;
            return Ok(skipped(SkipReason::AutoPlayOff));
        }
        if let Some(last) = ledger.last_catch_at {
            let elapsed = ts - last;
            if elapsed < self.config.cooldown_secs {
                if is_auto {
                    commit(tx).await?;
                    return Ok(skipped(SkipReason::Cooldown));
                }
                let remaining_secs = self.config.cooldown_secs - elapsed;
                return refuse(tx, EconomyError::CooldownActive { remaining_secs }).await;
            }
        }
        if ledger.coins < cost {
            if is_auto {
                persistence::set_auto_play(&mut tx, user, false).await?;
                commit(tx).await?;
                return Ok(skipped(SkipReason::OutOfFunds));
            }
            let err = EconomyError::InsufficientFunds {
                needed: cost,
                available: ledger.coins,
            };
            return refuse(tx, err).await;
        }

        let bonus = self
            .live_bait(&mut tx, user, &ledger, ts)
            .await?
            .map_or(0.0, |b| b.bonus);
        if !persistence::record_attempt(&mut tx, user, ts, self.config.cooldown_secs, cost).await?
        {
            return Err(StoreError::Corrupt(format!("attempt guard refused checked ledger {user}")).into());
        }

        let rate = success_rate(
            self.config.base_success_rate,
            bonus,
            self.config.max_success_rate,
        );
        let rolled = self.with_rng(|rng| {
            roll_success(rate, rng).then(|| generate_catch(&self.table, &self.catalog, rng))
        });
        let outcome = match rolled {
            None => CatchOutcome::EmptyHanded { cost },
            Some(Ok(catch)) => {
                persistence::add_holding(&mut tx, user, catch.species, 1).await?;
                persistence::record_catch(&mut tx, user, &catch, is_auto, ts).await?;
                CatchOutcome::Caught { cost, catch }
            }
            Some(Err(e)) => {
                tx.rollback().await.map_err(StoreError::from)?;
                error!(user = %user, error = %e, "catch generation failed, attempt rolled back");
                return Err(e.into());
            }
        };
        commit(tx).await?;
        debug!(
            user = %user,
            auto = is_auto,
            rate,
            success = outcome.success(),
            "catch attempt accepted"
        );
        Ok(outcome)
    }

    /// Bait in force, clearing an expired one. The window is
    /// `[activated_at, activated_at + duration)`.
    async fn live_bait(
        &self,
        conn: &mut SqliteConnection,
        user: &UserId,
        ledger: &UserLedger,
        ts: i64,
    ) -> Result<Option<BaitStatus>, EconomyError> {
        let Some(active) = ledger.active_bait else {
            return Ok(None);
        };
        if let Some(def) = self.catalog.bait(active.kind) {
            let ends = active.activated_at + def.duration_secs;
            if active.activated_at <= ts && ts < ends {
                return Ok(Some(BaitStatus {
                    kind: def.kind,
                    name: def.name.clone(),
                    bonus: def.success_bonus,
                    remaining_secs: ends - ts,
                }));
            }
        }
        persistence::clear_active_bait(conn, user).await?;
        debug!(user = %user, bait = %active.kind, "bait expired");
        Ok(None)
    }

    /// Equipped bait, if still active. Expired bait is cleared.
    pub async fn active_bait(&self, user: &UserId) -> Result<Option<BaitStatus>, EconomyError> {
        let _guard = self.locks.lock(user).await;
        let ts = self.unix_now();
        let mut tx = self.begin(user, ts).await?;
        let ledger = persistence::ledger(&mut tx, user).await?;
        let status = self.live_bait(&mut tx, user, &ledger, ts).await?;
        commit(tx).await?;
        Ok(status)
    }

    /// Success-rate bonus currently granted by bait; 0 when none is active.
    pub async fn bait_bonus(&self, user: &UserId) -> Result<f64, EconomyError> {
        Ok(self.active_bait(user).await?.map_or(0.0, |b| b.bonus))
    }

    fn bait_def(&self, kind: BaitKind) -> Result<&BaitDefinition, EconomyError> {
        self.catalog
            .bait(kind)
            .ok_or_else(|| EconomyError::UnknownBait(kind.to_string()))
    }

    /// Buy one unit of bait at its catalog price into the user's inventory.
    /// Buying does not equip it; see [`Economy::equip_bait`].
    pub async fn purchase_bait(
        &self,
        user: &UserId,
        kind: BaitKind,
    ) -> Result<Purchase, EconomyError> {
        let def = self.bait_def(kind)?;
        let _guard = self.locks.lock(user).await;
        let ts = self.unix_now();
        let mut tx = self.begin(user, ts).await?;
        if !persistence::debit_coins(&mut tx, user, def.price).await? {
            let available = persistence::ledger(&mut tx, user).await?.coins;
            let err = EconomyError::InsufficientFunds {
                needed: def.price,
                available,
            };
            return refuse(tx, err).await;
        }
        persistence::add_bait(&mut tx, user, kind, 1).await?;
        let coins = persistence::ledger(&mut tx, user).await?.coins;
        commit(tx).await?;
        info!(user = %user, bait = %kind, price = def.price, "bait purchased");
        Ok(Purchase {
            kind,
            price: def.price,
            coins,
        })
    }

    /// Consume one unit from inventory and start its window now. Replaces any
    /// active bait without refund.
    pub async fn equip_bait(&self, user: &UserId, kind: BaitKind) -> Result<BaitStatus, EconomyError> {
        let def = self.bait_def(kind)?;
        let _guard = self.locks.lock(user).await;
        let ts = self.unix_now();
        let mut tx = self.begin(user, ts).await?;
        if !persistence::take_bait(&mut tx, user, kind).await? {
            return refuse(tx, EconomyError::BaitNotOwned(kind)).await;
        }
        persistence::set_active_bait(&mut tx, user, kind, ts).await?;
        commit(tx).await?;
        info!(user = %user, bait = %kind, duration = def.duration_secs, "bait equipped");
        Ok(BaitStatus {
            kind,
            name: def.name.clone(),
            bonus: def.success_bonus,
            remaining_secs: def.duration_secs,
        })
    }

    /// Owned bait with quantity > 0.
    pub async fn list_baits(&self, user: &UserId) -> Result<Vec<(BaitKind, i64)>, EconomyError> {
        let ts = self.unix_now();
        let mut tx = self.begin(user, ts).await?;
        let baits = persistence::bait_inventory(&mut tx, user).await?;
        commit(tx).await?;
        Ok(baits)
    }

    /// Price list of every bait kind in catalog order.
    pub fn bait_shop(&self) -> Vec<BaitDefinition> {
        self.catalog.baits().cloned().collect()
    }

    /// Sell units of one species at its catalog base value.
    pub async fn sell(
        &self,
        user: &UserId,
        species: SpeciesId,
        quantity: i64,
    ) -> Result<Sale, EconomyError> {
        if quantity <= 0 {
            return Err(EconomyError::InvalidQuantity(quantity));
        }
        let entry = self.species(species)?;
        let _guard = self.locks.lock(user).await;
        let ts = self.unix_now();
        let mut tx = self.begin(user, ts).await?;
        let held = persistence::holding(&mut tx, user, species).await?;
        let owned = held.as_ref().map_or(0, |h| h.quantity);
        if owned < quantity {
            let err = EconomyError::InsufficientHoldings {
                species,
                held: owned,
                requested: quantity,
            };
            return refuse(tx, err).await;
        }
        if let Some(h) = held.filter(|h| h.is_locked(ts)) {
            let err = EconomyError::SellLocked {
                species,
                remaining_secs: h.remaining_lock_secs(ts),
            };
            return refuse(tx, err).await;
        }
        let sale = self.sell_in(&mut tx, user, entry, quantity, ts).await?;
        commit(tx).await?;
        info!(user = %user, species = %species, quantity, coins = sale.coins_gained, "sold");
        Ok(sale)
    }

    async fn sell_in(
        &self,
        conn: &mut SqliteConnection,
        user: &UserId,
        entry: &CatalogEntry,
        quantity: i64,
        ts: i64,
    ) -> Result<Sale, EconomyError> {
        if !persistence::remove_holding(conn, user, entry.id, quantity, ts).await? {
            return Err(StoreError::Corrupt(format!("holding {} changed under lock", entry.id)).into());
        }
        let coins_gained = quantity * entry.base_value;
        persistence::credit_coins(conn, user, coins_gained).await?;
        Ok(Sale {
            species: entry.id,
            name: entry.name.clone(),
            quantity,
            unit_price: entry.base_value,
            coins_gained,
        })
    }

    /// Sell every unlocked holding in one pass.
    pub async fn sell_all(&self, user: &UserId) -> Result<SellManifest, EconomyError> {
        let _guard = self.locks.lock(user).await;
        let ts = self.unix_now();
        let mut tx = self.begin(user, ts).await?;
        let mut manifest = SellManifest::default();
        for h in persistence::holdings(&mut tx, user).await? {
            let Some(entry) = self.catalog.get(h.species) else {
                warn!(user = %user, species = %h.species, "holding not in catalog, left unsold");
                continue;
            };
            if h.is_locked(ts) {
                manifest.locked.push(h.species);
                continue;
            }
            let sale = self.sell_in(&mut tx, user, entry, h.quantity, ts).await?;
            manifest.coins_gained += sale.coins_gained;
            manifest.sold.push(sale);
        }
        manifest.coins = persistence::ledger(&mut tx, user).await?.coins;
        commit(tx).await?;
        info!(
            user = %user,
            species = manifest.sold.len(),
            locked = manifest.locked.len(),
            coins = manifest.coins_gained,
            "sold all"
        );
        Ok(manifest)
    }

    /// Forbid selling a held species for `duration_secs`. A longer lock
    /// already in place is kept. Returns the lock end in Unix seconds.
    pub async fn lock_species(
        &self,
        user: &UserId,
        species: SpeciesId,
        duration_secs: i64,
    ) -> Result<i64, EconomyError> {
        if duration_secs <= 0 {
            return Err(EconomyError::InvalidQuantity(duration_secs));
        }
        self.species(species)?;
        let _guard = self.locks.lock(user).await;
        let ts = self.unix_now();
        let mut tx = self.begin(user, ts).await?;
        if persistence::holding(&mut tx, user, species).await?.is_none() {
            let err = EconomyError::InsufficientHoldings {
                species,
                held: 0,
                requested: 1,
            };
            return refuse(tx, err).await;
        }
        let Some(requested) = ts.checked_add(duration_secs) else {
            return refuse(tx, EconomyError::InvalidQuantity(duration_secs)).await;
        };
        persistence::set_sell_lock(&mut tx, user, species, requested).await?;
        let until = persistence::holding(&mut tx, user, species)
            .await?
            .and_then(|h| h.sell_lock_until)
            .unwrap_or(requested);
        commit(tx).await?;
        Ok(until)
    }

    /// One random grant per UTC calendar date.
    pub async fn daily_bonus(&self, user: &UserId) -> Result<DailyBonus, EconomyError> {
        let _guard = self.locks.lock(user).await;
        let now = self.clock.now();
        let (date, ts) = (now.date_naive(), now.timestamp());
        let mut tx = self.begin(user, ts).await?;
        if persistence::has_claimed(&mut tx, user, date).await? {
            commit(tx).await?;
            return Ok(DailyBonus::AlreadyClaimed { date });
        }
        let amount = self.with_rng(|rng| {
            rng.gen_range(self.config.daily_bonus_min..=self.config.daily_bonus_max)
        });
        if !persistence::claim_daily(&mut tx, user, date, amount, ts).await? {
            commit(tx).await?;
            return Ok(DailyBonus::AlreadyClaimed { date });
        }
        persistence::credit_coins(&mut tx, user, amount).await?;
        let coins = persistence::ledger(&mut tx, user).await?.coins;
        commit(tx).await?;
        info!(user = %user, %date, amount, "daily bonus granted");
        Ok(DailyBonus::Granted { amount, coins })
    }

    /// Flip auto-play and return the new state. Enabling requires the admin
    /// switch and a balance covering one attempt; disabling always works.
    pub async fn toggle_auto_play(&self, user: &UserId) -> Result<bool, EconomyError> {
        let _guard = self.locks.lock(user).await;
        let ts = self.unix_now();
        let mut tx = self.begin(user, ts).await?;
        let ledger = persistence::ledger(&mut tx, user).await?;
        let enable = !ledger.auto_play;
        if enable {
            if !self.config.auto_play_enabled {
                return refuse(tx, EconomyError::AutoPlayDisabled).await;
            }
            if ledger.coins < self.config.attempt_cost {
                let err = EconomyError::InsufficientFunds {
                    needed: self.config.attempt_cost,
                    available: ledger.coins,
                };
                return refuse(tx, err).await;
            }
        }
        persistence::set_auto_play(&mut tx, user, enable).await?;
        commit(tx).await?;
        info!(user = %user, enabled = enable, "auto-play toggled");
        Ok(enable)
    }

    /// Holdings sorted by tier descending, then base value descending.
    pub async fn list_holdings(&self, user: &UserId) -> Result<Vec<HoldingView>, EconomyError> {
        let ts = self.unix_now();
        let mut tx = self.begin(user, ts).await?;
        let rows = persistence::holdings(&mut tx, user).await?;
        commit(tx).await?;
        let mut out: Vec<HoldingView> = rows
            .into_iter()
            .filter_map(|h| {
                let entry = self.catalog.get(h.species)?;
                Some(HoldingView {
                    species: h.species,
                    name: entry.name.clone(),
                    rarity: entry.rarity,
                    grade: entry.rarity.grade(),
                    quantity: h.quantity,
                    base_value: entry.base_value,
                    remaining_lock_secs: h.remaining_lock_secs(ts),
                })
            })
            .collect();
        out.sort_by(|a, b| {
            b.rarity
                .cmp(&a.rarity)
                .then(b.base_value.cmp(&a.base_value))
                .then(a.species.cmp(&b.species))
        });
        Ok(out)
    }

    /// Every species, lowest tier and value first, with the configured odds
    /// of landing in its tier.
    pub fn fish_guide(&self) -> Vec<GuideEntry<'_>> {
        self.catalog
            .guide()
            .into_iter()
            .map(|species| GuideEntry {
                species,
                grade: species.rarity.grade(),
                tier_odds: self.table.probability(species.rarity),
            })
            .collect()
    }

    /// Catch totals from the journal. Read-only; creates no ledger.
    pub async fn fisher_stats(&self, user: &UserId) -> Result<persistence::FisherStats, EconomyError> {
        let mut conn = self.pool.acquire().await.map_err(StoreError::from)?;
        Ok(persistence::fisher_stats(&mut conn, user).await?)
    }

    /// The `limit` most valuable catches across all users, best first.
    pub async fn best_catches(&self, limit: u32) -> Result<Vec<persistence::BestCatch>, EconomyError> {
        let mut conn = self.pool.acquire().await.map_err(StoreError::from)?;
        Ok(persistence::best_catches(&mut conn, limit).await?)
    }

    fn species(&self, id: SpeciesId) -> Result<&CatalogEntry, EconomyError> {
        self.catalog
            .get(id)
            .ok_or_else(|| EconomyError::UnknownSpecies(id.to_string()))
    }
}

fn skipped(reason: SkipReason) -> CatchOutcome {
    CatchOutcome::Skipped { reason }
}

async fn commit(tx: Tx) -> Result<(), EconomyError> {
    tx.commit().await.map_err(StoreError::from)?;
    Ok(())
}

/// Keep the lazily created ledger, report the refusal.
async fn refuse<T>(tx: Tx, err: EconomyError) -> Result<T, EconomyError> {
    commit(tx).await?;
    Err(err)
}
