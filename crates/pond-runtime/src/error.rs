use persistence::StoreError;
use pond_catch::CatchError;
use pond_core::{BaitKind, Rarity, SpeciesId, ValidationError};
use thiserror::Error;

/// Every way an economy operation can be refused or fail.
#[derive(Debug, Error)]
pub enum EconomyError {
    #[error("still on cooldown for {remaining_secs}s")]
    CooldownActive { remaining_secs: i64 },
    #[error("need {needed} coins, have {available}")]
    InsufficientFunds { needed: i64, available: i64 },
    #[error("quantity must be positive, got {0}")]
    InvalidQuantity(i64),
    #[error("species {species} held {held}, requested {requested}")]
    InsufficientHoldings {
        species: SpeciesId,
        held: i64,
        requested: i64,
    },
    #[error("species {species} is locked for {remaining_secs}s")]
    SellLocked {
        species: SpeciesId,
        remaining_secs: i64,
    },
    #[error("unknown species {0:?}")]
    UnknownSpecies(String),
    #[error("unknown bait {0:?}")]
    UnknownBait(String),
    #[error("no {0} bait in inventory")]
    BaitNotOwned(BaitKind),
    #[error("auto-play is disabled on this server")]
    AutoPlayDisabled,
    /// A drawn tier has no species. Fatal to the attempt, never charged.
    #[error("catalog has no species in tier {0}")]
    CatalogEmpty(Rarity),
    #[error("invalid rarity weights")]
    InvalidWeights,
    #[error("invalid economy config: {0}")]
    Config(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EconomyError {
    /// The same request may succeed later without the caller changing it.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EconomyError::CooldownActive { .. } | EconomyError::SellLocked { .. }
        )
    }

    /// Faults of the deployment rather than of the request.
    pub fn is_config_fault(&self) -> bool {
        matches!(
            self,
            EconomyError::CatalogEmpty(_) | EconomyError::InvalidWeights | EconomyError::Config(_)
        )
    }
}

impl From<CatchError> for EconomyError {
    fn from(e: CatchError) -> Self {
        match e {
            CatchError::CatalogEmpty(tier) => EconomyError::CatalogEmpty(tier),
            CatchError::InvalidWeights => EconomyError::InvalidWeights,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(EconomyError::CooldownActive { remaining_secs: 3 }.is_retryable());
        assert!(EconomyError::SellLocked {
            species: SpeciesId(1),
            remaining_secs: 9
        }
        .is_retryable());
        assert!(!EconomyError::InvalidQuantity(0).is_retryable());
        assert!(EconomyError::from(CatchError::CatalogEmpty(Rarity::Epic)).is_config_fault());
        assert!(!EconomyError::AutoPlayDisabled.is_config_fault());
    }

    #[test]
    fn messages_carry_the_details() {
        let e = EconomyError::InsufficientFunds {
            needed: 50,
            available: 20,
        };
        assert_eq!(e.to_string(), "need 50 coins, have 20");
        assert_eq!(
            EconomyError::CatalogEmpty(Rarity::Legendary).to_string(),
            "catalog has no species in tier Legendary"
        );
    }
}
