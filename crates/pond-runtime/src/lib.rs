#![deny(warnings)]

//! Async runtime for the pond: the economy engine that gates every ledger
//! mutation, and the scheduler that plays for opted-in users.

mod economy;
mod error;
mod locks;
mod scheduler;

pub use economy::{
    BaitStatus, CatchOutcome, DailyBonus, Economy, GuideEntry, HoldingView, Purchase, Sale,
    SellManifest, SkipReason,
};
pub use error::EconomyError;
pub use persistence::{BestCatch, FisherStats, UserLedger};
pub use scheduler::{AutoFisher, SchedulerHandle, TickReport};
