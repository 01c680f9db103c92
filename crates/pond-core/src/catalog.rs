//! Static species and bait tables.

use crate::{BaitKind, Rarity, SpeciesId, ValidationError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::ops::Range;
use std::path::Path;
use thiserror::Error;
use tracing::warn;

const STANDARD_CATALOG: &str = include_str!("../../../assets/catalog.yaml");

/// One fish species.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: SpeciesId,
    pub name: String,
    pub rarity: Rarity,
    /// Sale price per unit and the baseline of the catch value.
    pub base_value: i64,
    pub min_weight_kg: f64,
    pub max_weight_kg: f64,
}

/// Price and effect of a bait kind.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BaitDefinition {
    pub kind: BaitKind,
    pub name: String,
    pub price: i64,
    /// Additive bonus to the catch success rate while active.
    pub success_bonus: f64,
    /// Effect window in seconds, starting when the bait is equipped.
    pub duration_secs: i64,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid catalog file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

#[derive(Deserialize)]
struct CatalogFile {
    species: Vec<CatalogEntry>,
    #[serde(default)]
    baits: Vec<BaitDefinition>,
}

/// Immutable, validated lookup tables for species and baits.
///
/// Species are kept grouped by tier so a tier can be handed out as a slice.
#[derive(Clone, Debug)]
pub struct Catalog {
    species: Vec<CatalogEntry>,
    tiers: [Range<usize>; 5],
    by_id: HashMap<SpeciesId, usize>,
    by_name: HashMap<String, usize>,
    baits: BTreeMap<BaitKind, BaitDefinition>,
}

impl Catalog {
    /// Build a catalog, validating every entry.
    pub fn new(
        mut species: Vec<CatalogEntry>,
        baits: Vec<BaitDefinition>,
    ) -> Result<Self, ValidationError> {
        for s in &species {
            validate_entry(s)?;
        }
        species.sort_by_key(|s| (s.rarity, s.id));

        let mut by_id = HashMap::with_capacity(species.len());
        let mut by_name = HashMap::with_capacity(species.len());
        for (i, s) in species.iter().enumerate() {
            if by_id.insert(s.id, i).is_some() {
                return Err(ValidationError::DuplicateSpecies(s.id));
            }
            if by_name.insert(s.name.to_lowercase(), i).is_some() {
                return Err(ValidationError::DuplicateName(s.name.clone()));
            }
        }

        let tiers = Rarity::ALL.map(|r| {
            let start = species.partition_point(|s| s.rarity < r);
            let end = species.partition_point(|s| s.rarity <= r);
            start..end
        });
        for r in Rarity::ALL {
            if tiers[r.index()].is_empty() {
                warn!(tier = r.tier(), "catalog tier has no species");
            }
        }

        let mut bait_map = BTreeMap::new();
        for b in baits {
            validate_bait(&b)?;
            let kind = b.kind;
            if bait_map.insert(kind, b).is_some() {
                return Err(ValidationError::DuplicateBait(kind));
            }
        }

        Ok(Self {
            species,
            tiers,
            by_id,
            by_name,
            baits: bait_map,
        })
    }

    /// The built-in species and bait table.
    pub fn standard() -> Result<Self, CatalogError> {
        Self::from_yaml_str(STANDARD_CATALOG)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = serde_yaml::from_str(text)?;
        Ok(Self::new(file.species, file.baits)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, CatalogError> {
        let text = fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    /// All species, grouped by ascending tier.
    pub fn species(&self) -> &[CatalogEntry] {
        &self.species
    }

    /// Members of one tier; empty when the catalog defines none.
    pub fn tier(&self, rarity: Rarity) -> &[CatalogEntry] {
        &self.species[self.tiers[rarity.index()].clone()]
    }

    pub fn get(&self, id: SpeciesId) -> Option<&CatalogEntry> {
        self.by_id.get(&id).map(|&i| &self.species[i])
    }

    /// Look a species up by display name (case-insensitive) or numeric id.
    pub fn resolve_species(&self, name_or_id: &str) -> Option<&CatalogEntry> {
        let key = name_or_id.trim();
        if let Some(&i) = self.by_name.get(&key.to_lowercase()) {
            return Some(&self.species[i]);
        }
        key.parse::<u32>().ok().and_then(|id| self.get(SpeciesId(id)))
    }

    pub fn bait(&self, kind: BaitKind) -> Option<&BaitDefinition> {
        self.baits.get(&kind)
    }

    /// Look a bait up by key ("premium") or display name ("Premium Bait").
    pub fn resolve_bait(&self, name: &str) -> Option<&BaitDefinition> {
        let key = name.trim();
        if let Some(kind) = BaitKind::from_key(&key.to_lowercase()) {
            return self.bait(kind);
        }
        self.baits
            .values()
            .find(|b| b.name.eq_ignore_ascii_case(key))
    }

    /// Shop listing in kind order.
    pub fn baits(&self) -> impl Iterator<Item = &BaitDefinition> {
        self.baits.values()
    }

    /// Species ordered by tier ascending, then base value descending.
    pub fn guide(&self) -> Vec<&CatalogEntry> {
        let mut out: Vec<&CatalogEntry> = self.species.iter().collect();
        out.sort_by(|a, b| {
            a.rarity
                .cmp(&b.rarity)
                .then(b.base_value.cmp(&a.base_value))
        });
        out
    }
}

fn validate_entry(s: &CatalogEntry) -> Result<(), ValidationError> {
    if s.base_value <= 0 {
        return Err(ValidationError::NonPositiveValue(s.id));
    }
    let (lo, hi) = (s.min_weight_kg, s.max_weight_kg);
    if !(lo.is_finite() && hi.is_finite()) || lo <= 0.0 || lo > hi {
        return Err(ValidationError::InvalidWeightRange(s.id));
    }
    if s.name.trim().is_empty() {
        return Err(ValidationError::EmptyName(s.id));
    }
    Ok(())
}

fn validate_bait(b: &BaitDefinition) -> Result<(), ValidationError> {
    let bonus_ok = b.success_bonus.is_finite() && (0.0..=1.0).contains(&b.success_bonus);
    if !bonus_ok || b.price < 0 || b.duration_secs <= 0 {
        return Err(ValidationError::InvalidBait(b.kind));
    }
    Ok(())
}
