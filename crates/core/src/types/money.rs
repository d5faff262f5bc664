//! Money arithmetic shared between pricing and the payment boundary.
//!
//! Decimal amounts stay unrounded through intermediate pricing steps and
//! are only rounded to two places at aggregate-output time. Conversion to
//! the processor's integer minor units happens exactly once, at the
//! gateway boundary; nothing downstream of that boundary reintroduces
//! floating rounding.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An amount expressed in the processor's smallest currency unit
/// (cents for USD).
pub type MinorUnits = i64;

/// Money conversion failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoneyError {
    /// The decimal amount does not fit the processor's integer type.
    #[error("amount out of range for minor units: {0}")]
    OutOfRange(Decimal),

    /// Charges cannot be negative.
    #[error("negative amount: {0}")]
    Negative(Decimal),
}

/// Round a decimal money amount to two places, half away from zero.
///
/// Used at aggregate-output time only; intermediate accumulation stays
/// exact.
#[must_use]
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Convert a decimal currency amount to integer minor units via
/// `round(amount * 100)`.
///
/// # Errors
///
/// Returns `MoneyError::Negative` for negative amounts and
/// `MoneyError::OutOfRange` if the result does not fit an `i64`.
pub fn to_minor_units(amount: Decimal) -> Result<MinorUnits, MoneyError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(MoneyError::Negative(amount));
    }
    let cents = (amount * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    cents.to_i64().ok_or(MoneyError::OutOfRange(amount))
}

/// Convert integer minor units back to a two-place decimal amount.
#[must_use]
pub fn from_minor_units(cents: MinorUnits) -> Decimal {
    Decimal::new(cents, 2)
}

/// Fraction of a vendor's gross that the vendor keeps after the platform
/// fee. The default retains 94.8% of the gross, a 5.2% platform fee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeeRate(Decimal);

impl FeeRate {
    /// Platform default: 5.2% fee, vendor retains 0.948 of gross.
    pub const DEFAULT_RETAIN_RATE: Decimal = Decimal::from_parts(948, 0, 0, false, 3);

    /// Create a retain rate. Values outside (0, 1] are rejected; a shop
    /// cannot owe more than it grossed, nor retain nothing.
    #[must_use]
    pub fn new(retain: Decimal) -> Option<Self> {
        (retain > Decimal::ZERO && retain <= Decimal::ONE).then_some(Self(retain))
    }

    /// The vendor-retained fraction of gross.
    #[must_use]
    pub const fn retain(self) -> Decimal {
        self.0
    }

    /// Amount owed to the vendor: `round(gross * retain, 2)`.
    #[must_use]
    pub fn apply(self, gross: Decimal) -> Decimal {
        round_money(gross * self.0)
    }
}

impl Default for FeeRate {
    fn default() -> Self {
        Self(Self::DEFAULT_RETAIN_RATE)
    }
}
