//! Lovelace amounts
//!
//! The API speaks ADA as a decimal number. Everything past the boundary is
//! integer lovelace so balance arithmetic is exact and can never go negative.

use crate::error::{TreasuryError, TreasuryResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lovelace in one ADA
pub const LOVELACE_PER_ADA: u64 = 1_000_000;

/// An amount of lovelace (1 ADA = 1,000,000 lovelace)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Lovelace(pub u64);

impl Lovelace {
    pub const ZERO: Lovelace = Lovelace(0);

    /// Convert an ADA amount to lovelace, truncating below one lovelace.
    ///
    /// Rejects NaN, infinities, negative values and values too large to
    /// represent. Zero is accepted here; callers that need a strictly
    /// positive amount use [`Lovelace::positive_from_ada`].
    pub fn from_ada(ada: f64) -> TreasuryResult<Self> {
        if !ada.is_finite() {
            return Err(TreasuryError::InvalidInput(format!(
                "amount must be finite, got {}",
                ada
            )));
        }
        if ada < 0.0 {
            return Err(TreasuryError::InvalidInput(format!(
                "amount must not be negative, got {}",
                ada
            )));
        }
        let lovelace = (ada * LOVELACE_PER_ADA as f64).floor();
        if lovelace >= u64::MAX as f64 {
            return Err(TreasuryError::InvalidInput(format!(
                "amount {} ADA is out of range",
                ada
            )));
        }
        Ok(Lovelace(lovelace as u64))
    }

    /// Convert an ADA amount that must be at least one lovelace
    pub fn positive_from_ada(ada: f64) -> TreasuryResult<Self> {
        if ada.is_finite() && ada <= 0.0 {
            return Err(TreasuryError::InvalidInput(format!(
                "amount must be greater than 0, got {}",
                ada
            )));
        }
        let amount = Self::from_ada(ada)?;
        if amount.is_zero() {
            return Err(TreasuryError::InvalidInput(format!(
                "amount {} ADA is smaller than one lovelace",
                ada
            )));
        }
        Ok(amount)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_sub(self, other: Lovelace) -> Option<Lovelace> {
        self.0.checked_sub(other.0).map(Lovelace)
    }
}

impl fmt::Display for Lovelace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / LOVELACE_PER_ADA;
        let frac = self.0 % LOVELACE_PER_ADA;
        if frac == 0 {
            write!(f, "{} ADA", whole)
        } else {
            let frac = format!("{:06}", frac);
            write!(f, "{}.{} ADA", whole, frac.trim_end_matches('0'))
        }
    }
}

impl From<u64> for Lovelace {
    fn from(value: u64) -> Self {
        Lovelace(value)
    }
}
