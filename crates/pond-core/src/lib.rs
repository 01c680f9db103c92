#![deny(warnings)]

//! Core domain models and invariants for the fishing pond.
//!
//! This crate defines the serializable types shared by the catch engine, the
//! ledger store and the runtime, plus validation helpers guaranteeing that the
//! static catalog and the game configuration are sane before anything runs.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

mod catalog;
mod clock;
mod config;

pub use catalog::{BaitDefinition, Catalog, CatalogEntry, CatalogError};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, EconomyConfig, GameConfig, SchedulerConfig};

/// Opaque, stable identifier of a player as supplied by the host.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Catalog identifier of a fish species.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpeciesId(pub u32);

impl fmt::Display for SpeciesId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Rarity tier of a species. Tier 1 is the most common and cheapest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Rarity {
    Trash = 1,
    Common = 2,
    Rare = 3,
    Epic = 4,
    Legendary = 5,
}

impl Rarity {
    /// All tiers in ascending order.
    pub const ALL: [Rarity; 5] = [
        Rarity::Trash,
        Rarity::Common,
        Rarity::Rare,
        Rarity::Epic,
        Rarity::Legendary,
    ];

    /// Ordinal tier in 1..=5.
    pub fn tier(self) -> u8 {
        self as u8
    }

    /// Zero-based position in [`Rarity::ALL`].
    pub fn index(self) -> usize {
        self as usize - 1
    }

    pub fn from_tier(tier: u8) -> Option<Self> {
        match tier {
            1 => Some(Rarity::Trash),
            2 => Some(Rarity::Common),
            3 => Some(Rarity::Rare),
            4 => Some(Rarity::Epic),
            5 => Some(Rarity::Legendary),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Rarity::Trash => "Trash",
            Rarity::Common => "Common",
            Rarity::Rare => "Rare",
            Rarity::Epic => "Epic",
            Rarity::Legendary => "Legendary",
        }
    }

    /// Short grade code shown next to a catch (C, N, R, SR, SSR).
    pub fn grade(self) -> &'static str {
        match self {
            Rarity::Trash => "C",
            Rarity::Common => "N",
            Rarity::Rare => "R",
            Rarity::Epic => "SR",
            Rarity::Legendary => "SSR",
        }
    }
}

impl TryFrom<u8> for Rarity {
    type Error = ValidationError;

    fn try_from(tier: u8) -> Result<Self, Self::Error> {
        Rarity::from_tier(tier).ok_or(ValidationError::TierOutOfRange(tier))
    }
}

impl From<Rarity> for u8 {
    fn from(r: Rarity) -> u8 {
        r.tier()
    }
}

impl fmt::Display for Rarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Kinds of bait sold by the shop. The set is closed; catalog files only
/// attach prices and effects to these keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaitKind {
    Common,
    Premium,
    Deluxe,
}

impl BaitKind {
    pub const ALL: [BaitKind; 3] = [BaitKind::Common, BaitKind::Premium, BaitKind::Deluxe];

    /// Stable key used in storage and catalog files.
    pub fn key(self) -> &'static str {
        match self {
            BaitKind::Common => "common",
            BaitKind::Premium => "premium",
            BaitKind::Deluxe => "deluxe",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        BaitKind::ALL.into_iter().find(|k| k.key() == key)
    }
}

impl fmt::Display for BaitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// A generated catch. Only successful attempts produce one.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CatchResult {
    /// Species caught.
    pub species: SpeciesId,
    /// Display name copied from the catalog at generation time.
    pub name: String,
    /// Tier the species belongs to.
    pub rarity: Rarity,
    /// Generated weight in kg, rounded to two decimals.
    pub weight_kg: f64,
    /// Weight-adjusted value in coins (>= the species base value).
    pub value: i64,
}

/// Validation errors for domain invariants.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    /// Rarity tiers are 1..=5.
    #[error("rarity tier {0} is out of range [1, 5]")]
    TierOutOfRange(u8),
    /// Weight range must be finite with 0 < min <= max.
    #[error("species {0} has an invalid weight range")]
    InvalidWeightRange(SpeciesId),
    /// Base value must be strictly positive.
    #[error("species {0} must have a base value > 0")]
    NonPositiveValue(SpeciesId),
    #[error("duplicate species id {0}")]
    DuplicateSpecies(SpeciesId),
    #[error("species {0} has an empty name")]
    EmptyName(SpeciesId),
    #[error("duplicate species name {0:?}")]
    DuplicateName(String),
    /// Bait bonus must be within [0, 1], price >= 0 and duration > 0.
    #[error("bait {0} has an invalid price, bonus or duration")]
    InvalidBait(BaitKind),
    #[error("duplicate bait {0}")]
    DuplicateBait(BaitKind),
    /// Probability-like field outside [0, 1].
    #[error("{0} must be within [0, 1]")]
    RateOutOfRange(&'static str),
    /// Numeric field must be strictly positive.
    #[error("{0} must be > 0")]
    NonPositive(&'static str),
    /// Lower bound of a configured range exceeds its upper bound.
    #[error("{0} range is inverted")]
    InvertedRange(&'static str),
    #[error("non-finite numeric value encountered")]
    NonFinite,
}
