#![deny(warnings)]

//! Catch generation for the fishing pond.
//!
//! Everything here is pure given its random source:
//! - Weighted rarity-tier draw over a cumulative table
//! - Uniform species pick within the drawn tier
//! - Weight roll and weight-adjusted value
//! - Success-rate composition and the success roll

use pond_core::{Catalog, CatalogEntry, CatchResult, Rarity};
use rand::seq::SliceRandom;
use rand::Rng;
use thiserror::Error;

/// Default tier weights, tier 1 first.
pub const STANDARD_WEIGHTS: [f64; 5] = [0.40, 0.30, 0.20, 0.08, 0.02];

/// Share of the base value added at the top of a species' weight range.
pub const WEIGHT_PREMIUM: f64 = 0.5;

/// Errors produced by catch generation.
#[derive(Debug, Error, PartialEq)]
pub enum CatchError {
    /// The drawn tier has no species; a catalog configuration fault.
    #[error("catalog has no species in tier {0}")]
    CatalogEmpty(Rarity),
    /// Weights must be finite, non-negative and sum to a positive total.
    #[error("invalid rarity weights")]
    InvalidWeights,
}

/// Cumulative probability table over the five rarity tiers.
#[derive(Clone, Debug, PartialEq)]
pub struct RarityTable {
    weights: [f64; 5],
    cumulative: [f64; 5],
}

impl RarityTable {
    /// Build a table from tier weights (tier 1 first). Weights need not sum to 1;
    /// draws are taken over their total.
    pub fn new(weights: [f64; 5]) -> Result<Self, CatchError> {
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(CatchError::InvalidWeights);
        }
        let table = Self::accumulate(weights);
        if table.total() <= 0.0 {
            return Err(CatchError::InvalidWeights);
        }
        Ok(table)
    }

    /// The table built from [`STANDARD_WEIGHTS`].
    pub fn standard() -> Self {
        Self::accumulate(STANDARD_WEIGHTS)
    }

    fn accumulate(weights: [f64; 5]) -> Self {
        let mut cumulative = [0.0; 5];
        let mut acc = 0.0;
        for (c, w) in cumulative.iter_mut().zip(weights) {
            acc += w;
            *c = acc;
        }
        Self {
            weights,
            cumulative,
        }
    }

    pub fn total(&self) -> f64 {
        self.cumulative[4]
    }

    /// Normalized probability of one tier.
    pub fn probability(&self, rarity: Rarity) -> f64 {
        self.weights[rarity.index()] / self.total()
    }

    /// Map a draw in `[0, total)` to a tier: the first tier whose cumulative
    /// weight is >= the draw. Draws past the end land on the last tier.
    pub fn pick(&self, draw: f64) -> Rarity {
        let i = self.cumulative.partition_point(|&c| c < draw);
        Rarity::ALL.get(i).copied().unwrap_or(Rarity::Legendary)
    }

    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> Rarity {
        self.pick(rng.gen_range(0.0..self.total()))
    }
}

impl Default for RarityTable {
    fn default() -> Self {
        Self::standard()
    }
}

/// Generate one catch: draw a tier, pick a species uniformly within it, roll
/// its weight and derive its value.
pub fn generate_catch<R: Rng + ?Sized>(
    table: &RarityTable,
    catalog: &Catalog,
    rng: &mut R,
) -> Result<CatchResult, CatchError> {
    let rarity = table.draw(rng);
    let entry = catalog
        .tier(rarity)
        .choose(rng)
        .ok_or(CatchError::CatalogEmpty(rarity))?;
    let weight_kg = roll_weight(entry, rng);
    Ok(CatchResult {
        species: entry.id,
        name: entry.name.clone(),
        rarity,
        weight_kg,
        value: catch_value(entry, weight_kg),
    })
}

/// Uniform weight within the species range, rounded to two decimals.
pub fn roll_weight<R: Rng + ?Sized>(entry: &CatalogEntry, rng: &mut R) -> f64 {
    let (lo, hi) = (entry.min_weight_kg, entry.max_weight_kg);
    let raw = rng.gen_range(lo..=hi);
    ((raw * 100.0).round() / 100.0).clamp(lo, hi)
}

/// `base * (1 + 0.5 * (w - min) / (max - min))`, truncated.
///
/// A degenerate range (min == max) contributes no premium.
pub fn catch_value(entry: &CatalogEntry, weight_kg: f64) -> i64 {
    let (lo, hi) = (entry.min_weight_kg, entry.max_weight_kg);
    let span = hi - lo;
    let frac = if span > 0.0 {
        ((weight_kg - lo) / span).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let value = (entry.base_value as f64 * (1.0 + WEIGHT_PREMIUM * frac)).trunc() as i64;
    value.max(entry.base_value)
}

/// Base rate plus bait bonus, capped.
pub fn success_rate(base_rate: f64, bait_bonus: f64, max_rate: f64) -> f64 {
    (base_rate + bait_bonus).min(max_rate)
}

/// Succeeds iff a uniform draw in `[0, 1)` falls below `rate`.
pub fn roll_success<R: Rng + ?Sized>(rate: f64, rng: &mut R) -> bool {
    rng.gen::<f64>() < rate
}
