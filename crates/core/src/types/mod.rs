//! Core types for Minishops.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod country;
pub mod id;
pub mod money;

pub use country::Country;
pub use id::*;
pub use money::{FeeRate, MinorUnits, MoneyError, from_minor_units, round_money, to_minor_units};
