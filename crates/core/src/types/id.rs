//! Newtype IDs for type-safe entity references.
//!
//! Use the `define_id!` macro to create type-safe ID wrappers that prevent
//! accidentally mixing IDs from different entity types. Entity IDs are
//! dash-stripped UUID v4 strings; processor references (customer, payout
//! account, charge) are opaque strings minted by the payment processor.

/// Macro to define a type-safe ID wrapper.
///
/// Creates a newtype wrapper around `String` with:
/// - `Serialize`/`Deserialize` with `#[serde(transparent)]`
/// - `Debug`, `Clone`, `PartialEq`, `Eq`, `Hash`, `PartialOrd`, `Ord`
/// - Conversion methods: `new()`, `as_str()`
/// - `From<String>` and `From<&str>` implementations
///
/// # Example
///
/// ```rust
/// # use minishops_core::define_id;
/// define_id!(WidgetId);
///
/// let id = WidgetId::new("abc123");
/// assert_eq!(id.as_str(), "abc123");
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            ::serde::Serialize,
            ::serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create an ID from an existing string value.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Mint a fresh random ID (dash-stripped UUID v4).
            #[must_use]
            pub fn random() -> Self {
                Self($crate::types::id::random_id())
            }

            /// Get the underlying string value.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

/// Generate a dash-stripped UUID v4 string.
///
/// IDs are stored without dashes so they survive systems that treat `-`
/// as a separator.
#[must_use]
pub fn random_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

// Entity IDs
define_id!(UserId);
define_id!(ShopId);
define_id!(ProductId);
define_id!(OrderId);
define_id!(PaymentId);

// ClassUuid is shop-scoped, not globally unique; two shops may
// legitimately hold classes with the same uuid.
define_id!(ClassUuid);

// Payment-processor references (opaque, minted by the processor)
define_id!(CustomerRef);
define_id!(PayoutAccountRef);
define_id!(ChargeId);
define_id!(TransferId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_id_is_dash_stripped() {
        let id = random_id();
        assert_eq!(id.len(), 32);
        assert!(!id.contains('-'));
    }

    #[test]
    fn ids_round_trip_through_serde() {
        let id = OrderId::new("deadbeef");
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, "\"deadbeef\"");
        let back: OrderId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, id);
    }

    #[test]
    fn distinct_id_types_do_not_compare() {
        // Compile-time property: ShopId and ProductId are different types.
        let shop = ShopId::new("a");
        let product = ProductId::new("a");
        assert_eq!(shop.as_str(), product.as_str());
    }
}
