//! Value objects: equality by value, not identity.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by their attribute values. To
/// "modify" one, build a new one.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}

/// A non-negative amount of purchasable credit.
///
/// Used for account balances, course costs and payment amounts. The
/// constructor rejects negative values and arithmetic is checked, so a
/// `Credits` value can never represent a negative balance.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Credits(i64);

impl ValueObject for Credits {}

impl Credits {
    pub const ZERO: Credits = Credits(0);

    pub fn new(amount: i64) -> Result<Self, DomainError> {
        if amount < 0 {
            return Err(DomainError::validation(format!(
                "credit amount must not be negative (got {amount})"
            )));
        }
        Ok(Self(amount))
    }

    pub fn amount(self) -> i64 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// `None` on overflow.
    pub fn checked_add(self, other: Credits) -> Option<Credits> {
        self.0.checked_add(other.0).map(Credits)
    }

    /// `None` when the result would be negative.
    pub fn checked_sub(self, other: Credits) -> Option<Credits> {
        match self.0.checked_sub(other.0) {
            Some(v) if v >= 0 => Some(Credits(v)),
            _ => None,
        }
    }
}

impl TryFrom<i64> for Credits {
    type Error = DomainError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Credits::new(value)
    }
}

impl From<Credits> for i64 {
    fn from(value: Credits) -> Self {
        value.0
    }
}

impl core::fmt::Display for Credits {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}
