//! Ledger value primitives.
//!
//! Identities are opaque principals (accounts, organizers, component
//! addresses). Amounts are unsigned integers in the ledger's smallest unit;
//! there is no floating point anywhere in the ledger.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque caller identity.
///
/// The ledger compares identities byte-for-byte and never interprets them;
/// address normalization belongs to whoever constructs the identity.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Creates an identity from any string-like value
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identity as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Amount in the ledger's smallest unit
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Amount(u64);

impl Amount {
    /// The zero amount
    pub const ZERO: Self = Self(0);

    /// Creates an amount from raw units
    #[must_use]
    pub const fn new(units: u64) -> Self {
        Self(units)
    }

    /// Returns the raw units
    #[must_use]
    pub const fn units(self) -> u64 {
        self.0
    }

    /// Checks if this amount is zero
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Adds two amounts, `None` on overflow
    #[must_use]
    pub const fn checked_add(self, other: Self) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(units) => Some(Self(units)),
            None => None,
        }
    }

    /// Subtracts `other`, `None` if it would go below zero
    #[must_use]
    pub const fn checked_sub(self, other: Self) -> Option<Self> {
        match self.0.checked_sub(other.0) {
            Some(units) => Some(Self(units)),
            None => None,
        }
    }

    /// Multiplies by a count, `None` on overflow
    #[must_use]
    pub const fn checked_mul(self, count: u64) -> Option<Self> {
        match self.0.checked_mul(count) {
            Some(units) => Some(Self(units)),
            None => None,
        }
    }

    /// Takes `bps` basis points of this amount, rounding down.
    ///
    /// Computed in `u128`, so it cannot overflow for any `u64` amount and any
    /// `bps` up to 10 000. Returns `None` if `bps` exceeds 10 000.
    #[must_use]
    pub fn basis_points(self, bps: u16) -> Option<Self> {
        if bps > 10_000 {
            return None;
        }
        let share = u128::from(self.0) * u128::from(bps) / 10_000;
        u64::try_from(share).ok().map(Self)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Amount {
    fn from(units: u64) -> Self {
        Self(units)
    }
}
