//! Unified error handling and the boundary response envelope.
//!
//! Every operation exposed to a client serializes as `{data, error}`:
//! exactly one side is populated. Buyer-actionable failures keep their
//! message; store and transport failures collapse to a generic message
//! so internals never leak past the boundary.

use serde::Serialize;
use thiserror::Error;

use crate::cart::{CartError, PricingError};
use crate::catalog::{CatalogError, ShippingClassError};
use crate::checkout::CheckoutError;
use crate::config::ConfigError;
use crate::ledger::LedgerError;
use crate::payment::GatewayError;
use crate::users::UserStoreError;

/// Application-level error type for the marketplace.
#[derive(Debug, Error)]
pub enum MarketError {
    #[error(transparent)]
    Checkout(#[from] CheckoutError),

    #[error(transparent)]
    Cart(#[from] CartError),

    #[error(transparent)]
    ShippingClass(#[from] ShippingClassError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    User(#[from] UserStoreError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl MarketError {
    /// The message a client is allowed to see.
    ///
    /// Checkout gate failures and validation errors are the buyer's or
    /// vendor's to act on and pass through verbatim. Everything else is
    /// an internal failure and collapses to a generic message.
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            Self::Checkout(err) => match err {
                CheckoutError::EmptyCart
                | CheckoutError::ShippingReassigned
                | CheckoutError::NoPaymentMethod
                | CheckoutError::NoValidCard
                | CheckoutError::VendorUnpayable(_)
                | CheckoutError::QuantityAdjusted(_)
                | CheckoutError::TotalMismatch { .. }
                | CheckoutError::ChargeDeclined { .. }
                | CheckoutError::ChargeOutcomeUnknown { .. } => err.to_string(),
                CheckoutError::Pricing(PricingError::NoShippingClass { .. }) => err.to_string(),
                _ => internal_message(),
            },
            Self::Cart(err @ (CartError::UnknownProduct(_) | CartError::Unpublished(_))) => {
                err.to_string()
            }
            Self::ShippingClass(err) => err.to_string(),
            _ => internal_message(),
        }
    }
}

fn internal_message() -> String {
    "Something went wrong on our end. Please try again.".to_owned()
}

/// The `{data, error}` envelope every boundary operation returns.
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T> {
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    #[must_use]
    pub fn ok(data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
        }
    }

    #[must_use]
    pub fn err(error: impl Into<MarketError>) -> Self {
        let error = error.into();
        tracing::error!(%error, "request failed");
        Self {
            data: None,
            error: Some(error.client_message()),
        }
    }
}

impl<T, E: Into<MarketError>> From<Result<T, E>> for ApiResponse<T> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(err) => Self::err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use minishops_core::ProductId;

    #[test]
    fn envelope_populates_exactly_one_side() {
        let ok = ApiResponse::ok(1);
        assert_eq!(ok.data, Some(1));
        assert!(ok.error.is_none());

        let err: ApiResponse<i32> =
            ApiResponse::err(CartError::UnknownProduct(ProductId::new("p1")));
        assert!(err.data.is_none());
        assert!(err.error.is_some());
    }

    #[test]
    fn actionable_errors_keep_their_message() {
        let err = MarketError::from(CheckoutError::EmptyCart);
        assert_eq!(err.client_message(), "cart is empty");
    }

    #[test]
    fn store_failures_are_not_exposed() {
        let err = MarketError::from(CatalogError::Store("neo4j bolt reset".to_owned()));
        let message = err.client_message();
        assert!(!message.contains("neo4j"));
    }

    #[test]
    fn envelope_serializes_as_data_and_error() {
        let json = serde_json::to_string(&ApiResponse::ok(serde_json::json!({"total": "25.00"})))
            .expect("serialize");
        assert_eq!(json, r#"{"data":{"total":"25.00"},"error":null}"#);
    }
}
