//! Background auto-play loop.

use crate::economy::{CatchOutcome, Economy, SkipReason};
use crate::error::EconomyError;
use persistence::StoreError;
use pond_core::{SchedulerConfig, UserId};
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::{timeout, MissedTickBehavior};
use tracing::{error, info, warn};

/// Tally of one tick.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub users: usize,
    pub caught: usize,
    pub empty_handed: usize,
    pub skipped: usize,
    /// Switched off for lack of funds.
    pub stopped: usize,
    pub failed: usize,
    pub timed_out: usize,
    /// Overran the timeout but the attempt had already committed; charged.
    pub late: usize,
}

/// How one user's turn ended.
enum Turn {
    Done(Result<CatchOutcome, EconomyError>),
    Late,
    TimedOut,
}

/// Drives `attempt_catch(user, true)` for every opted-in user once per tick.
///
/// At most `max_in_flight` attempts run at once. A user's timeout starts when
/// their attempt is admitted, so waiting behind other users never counts
/// against it.
#[derive(Clone, Debug)]
pub struct AutoFisher {
    economy: Arc<Economy>,
    config: SchedulerConfig,
    admission: Arc<Semaphore>,
    /// Where in the user list the next tick starts.
    rotation: Arc<AtomicUsize>,
}

/// A running [`AutoFisher`] task.
#[derive(Debug)]
pub struct SchedulerHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Signal the loop and wait for it to exit. An in-flight tick finishes
    /// first; a pending sleep is cut short.
    pub async fn shutdown(self) -> Result<(), JoinError> {
        let _ = self.stop.send(true);
        self.task.await
    }
}

impl AutoFisher {
    pub fn new(economy: Arc<Economy>, config: SchedulerConfig) -> Result<Self, EconomyError> {
        config.validate()?;
        Ok(Self {
            admission: Arc::new(Semaphore::new(config.max_in_flight)),
            rotation: Arc::new(AtomicUsize::new(0)),
            economy,
            config,
        })
    }

    pub fn spawn(self) -> SchedulerHandle {
        let (stop, rx) = watch::channel(false);
        let task = tokio::spawn(self.run(rx));
        SchedulerHandle { stop, task }
    }

    /// Tick until `stop` turns true or its sender is dropped. The first tick
    /// fires immediately.
    pub async fn run(self, mut stop: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.config.tick());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            tick_secs = self.config.tick_secs,
            max_in_flight = self.config.max_in_flight,
            "auto-fisher started"
        );
        while !*stop.borrow() {
            tokio::select! {
                biased;
                changed = stop.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = interval.tick() => match self.run_tick().await {
                    Ok(r) => info!(
                        users = r.users,
                        caught = r.caught,
                        empty = r.empty_handed,
                        skipped = r.skipped,
                        stopped = r.stopped,
                        failed = r.failed,
                        timed_out = r.timed_out,
                        late = r.late,
                        "auto-fisher tick"
                    ),
                    Err(e) => error!(error = %e, "auto-fisher tick failed"),
                },
            }
        }
        info!("auto-fisher stopped");
    }

    /// Opted-in users in this tick's order. The start moves one place per
    /// tick so no user is always served last.
    async fn roster(&self) -> Result<Vec<UserId>, EconomyError> {
        let mut conn = self
            .economy
            .pool()
            .acquire()
            .await
            .map_err(StoreError::from)?;
        let mut users = persistence::auto_play_users(&mut conn).await?;
        if !users.is_empty() {
            let start = self.rotation.fetch_add(1, Ordering::Relaxed) % users.len();
            users.rotate_left(start);
        }
        Ok(users)
    }

    /// One pass over the opted-in users. Each user runs in its own task under
    /// a timeout; a failure is counted and logged, never propagated.
    pub async fn run_tick(&self) -> Result<TickReport, EconomyError> {
        let users = self.roster().await?;
        let mut report = TickReport {
            users: users.len(),
            ..TickReport::default()
        };

        let limit = self.config.user_timeout();
        let mut tasks = JoinSet::new();
        for user in users {
            let economy = self.economy.clone();
            let admission = self.admission.clone();
            tasks.spawn(async move {
                // The semaphore is never closed.
                let _permit = admission.acquire_owned().await.ok();
                let turn = take_turn(&economy, &user, limit).await;
                (user, turn)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let (user, turn): (UserId, Turn) = match joined {
                Ok(done) => done,
                Err(e) => {
                    report.failed += 1;
                    error!(error = %e, "auto attempt task aborted");
                    continue;
                }
            };
            match turn {
                Turn::Done(Ok(CatchOutcome::Caught { .. })) => report.caught += 1,
                Turn::Done(Ok(CatchOutcome::EmptyHanded { .. })) => report.empty_handed += 1,
                Turn::Done(Ok(CatchOutcome::Skipped {
                    reason: SkipReason::OutOfFunds,
                })) => {
                    report.stopped += 1;
                    info!(user = %user, "auto-play stopped, balance below attempt cost");
                }
                Turn::Done(Ok(CatchOutcome::Skipped { .. })) => report.skipped += 1,
                Turn::Done(Err(e)) => {
                    report.failed += 1;
                    if e.is_config_fault() {
                        error!(user = %user, error = %e, "auto attempt failed");
                    } else {
                        warn!(user = %user, error = %e, "auto attempt failed");
                    }
                }
                Turn::Late => {
                    report.late += 1;
                    warn!(user = %user, timeout_secs = self.config.user_timeout_secs, "auto attempt committed after its timeout");
                }
                Turn::TimedOut => {
                    report.timed_out += 1;
                    warn!(user = %user, timeout_secs = self.config.user_timeout_secs, "auto attempt timed out");
                }
            }
        }
        Ok(report)
    }
}

/// Run one attempt under `limit`. On timeout the ledger is re-read: a cancelled
/// commit may still have landed, and then the user was charged.
async fn take_turn(economy: &Economy, user: &UserId, limit: Duration) -> Turn {
    let started = economy.unix_now();
    match timeout(limit, economy.attempt_catch(user, true)).await {
        Ok(res) => Turn::Done(res),
        Err(_) => match timeout(limit, economy.ledger(user)).await {
            Ok(Ok(ledger)) if ledger.last_catch_at.is_some_and(|at| at >= started) => Turn::Late,
            _ => Turn::TimedOut,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use persistence::open_in_memory;
    use pond_core::{Catalog, EconomyConfig, ManualClock};
    use std::time::Duration;

    async fn setup(cfg: EconomyConfig) -> (Arc<Economy>, ManualClock) {
        let clock = ManualClock::from_unix(1_000_000);
        let pool = open_in_memory().await.unwrap();
        let eco = Economy::new(
            pool,
            Arc::new(Catalog::standard().unwrap()),
            cfg,
            Arc::new(clock.clone()),
        )
        .unwrap();
        (Arc::new(eco), clock)
    }

    fn certain() -> EconomyConfig {
        EconomyConfig {
            base_success_rate: 1.0,
            max_success_rate: 1.0,
            rng_seed: Some(3),
            ..EconomyConfig::default()
        }
    }

    fn fisher(eco: &Arc<Economy>, tick_secs: u64) -> AutoFisher {
        AutoFisher::new(
            eco.clone(),
            SchedulerConfig {
                tick_secs,
                user_timeout_secs: 5,
                max_in_flight: 4,
            },
        )
        .unwrap()
    }

    async fn opt_in(eco: &Economy, names: impl IntoIterator<Item = String>) -> Vec<UserId> {
        let mut users = Vec::new();
        for name in names {
            let u = UserId::new(name);
            assert!(eco.toggle_auto_play(&u).await.unwrap());
            users.push(u);
        }
        users
    }

    #[tokio::test]
    async fn rejects_invalid_config() {
        let (eco, _) = setup(certain()).await;
        for cfg in [
            SchedulerConfig {
                tick_secs: 0,
                ..SchedulerConfig::default()
            },
            SchedulerConfig {
                max_in_flight: 0,
                ..SchedulerConfig::default()
            },
        ] {
            let err = AutoFisher::new(eco.clone(), cfg).unwrap_err();
            assert!(matches!(err, EconomyError::Config(_)));
            assert!(err.is_config_fault());
        }
    }

    #[tokio::test]
    async fn queued_users_get_a_full_timeout_once_admitted() {
        let (eco, _) = setup(certain()).await;
        let users = opt_in(&eco, (0..40).map(|i| format!("user-{i:02}"))).await;
        let f = AutoFisher::new(
            eco.clone(),
            SchedulerConfig {
                tick_secs: 60,
                user_timeout_secs: 1,
                max_in_flight: 1,
            },
        )
        .unwrap();

        // One stalled user occupies the only slot for a whole timeout; everyone
        // queued behind them must still be played.
        let stalled = eco.hold_user(&users[0]).await;
        let r = f.run_tick().await.unwrap();
        drop(stalled);
        assert_eq!((r.users, r.caught, r.timed_out, r.late), (40, 39, 1, 0));
        assert_eq!(eco.get_balance(&users[0]).await.unwrap(), 100);
        assert_eq!(eco.get_balance(&users[39]).await.unwrap(), 50);
    }

    #[tokio::test]
    async fn tick_order_rotates() {
        let (eco, _) = setup(certain()).await;
        let users = opt_in(&eco, ["a", "b", "c"].map(String::from)).await;
        let f = fisher(&eco, 60);
        assert_eq!(f.roster().await.unwrap(), users);
        assert_eq!(
            f.roster().await.unwrap(),
            vec![users[1].clone(), users[2].clone(), users[0].clone()]
        );
        assert_eq!(f.roster().await.unwrap()[0], users[2]);
        assert_eq!(f.roster().await.unwrap(), users);
    }

    #[tokio::test]
    async fn tick_plays_only_opted_in_users() {
        let (eco, clock) = setup(certain()).await;
        let (a, b, idle) = (UserId::new("a"), UserId::new("b"), UserId::new("idle"));
        eco.toggle_auto_play(&a).await.unwrap();
        eco.toggle_auto_play(&b).await.unwrap();
        eco.get_balance(&idle).await.unwrap();

        let f = fisher(&eco, 60);
        let r = f.run_tick().await.unwrap();
        assert_eq!((r.users, r.caught), (2, 2));
        assert_eq!(eco.get_balance(&idle).await.unwrap(), 100);

        // Same cooldown rules as a foreground attempt.
        let r = f.run_tick().await.unwrap();
        assert_eq!((r.skipped, r.caught), (2, 0));

        clock.advance_secs(300);
        f.run_tick().await.unwrap();
        clock.advance_secs(300);
        let r = f.run_tick().await.unwrap();
        assert_eq!(r.stopped, 2);
        assert_eq!(f.run_tick().await.unwrap().users, 0);
        assert_eq!(eco.fisher_stats(&a).await.unwrap().catch_count, 2);
    }

    #[tokio::test]
    async fn one_failing_user_does_not_stop_the_others() {
        let (eco, _) = setup(certain()).await;
        let (good, bad) = (UserId::new("good"), UserId::new("bad"));
        eco.toggle_auto_play(&good).await.unwrap();
        eco.toggle_auto_play(&bad).await.unwrap();
        sqlx::query("UPDATE ledgers SET active_bait = 'mystery', bait_activated_at = 0 WHERE user_id = ?")
            .bind(bad.as_str())
            .execute(eco.pool())
            .await
            .unwrap();

        let r = fisher(&eco, 60).run_tick().await.unwrap();
        assert_eq!((r.users, r.caught, r.failed), (2, 1, 1));
        assert_eq!(eco.get_balance(&good).await.unwrap(), 50);
    }

    #[tokio::test]
    async fn spawned_loop_ticks_and_stops_on_signal() {
        let (eco, _) = setup(certain()).await;
        let u = UserId::new("u");
        eco.toggle_auto_play(&u).await.unwrap();

        let handle = fisher(&eco, 3_600).spawn();
        let mut attempts = 0;
        for _ in 0..100 {
            attempts = eco.ledger(&u).await.unwrap().total_attempts;
            if attempts > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(attempts, 1);

        // The hour-long sleep is interrupted.
        tokio::time::timeout(Duration::from_secs(2), handle.shutdown())
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn dropping_the_sender_stops_the_loop() {
        let (eco, _) = setup(certain()).await;
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(fisher(&eco, 3_600).run(rx));
        drop(tx);
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
    }
}
