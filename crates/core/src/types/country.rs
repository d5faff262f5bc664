//! Destination country for shipping eligibility.

use serde::{Deserialize, Serialize};

/// A destination country as entered on a shipping class.
///
/// Comparison is case-insensitive; vendors type these by hand and the
/// purchaser's country comes from a separate address form, so "canada"
/// and "Canada" must match.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Country(String);

impl Country {
    /// Create a country from a display name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The country name as entered.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl PartialEq for Country {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Eq for Country {}

impl std::fmt::Display for Country {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Country {
    fn from(name: &str) -> Self {
        Self(name.to_owned())
    }
}
