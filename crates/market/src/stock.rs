//! Quantity reconciliation against live stock.
//!
//! The confirm path never rejects a cart: a shortfall caps the requested
//! quantity and flags the line. What the flag means depends on the
//! caller. Add-to-cart tolerates a cap; checkout treats any cap as
//! blocking and aborts before charging.
//!
//! The commit path decrements stock only after a committed sale, through
//! the store's conditional decrement so two concurrent buyers cannot
//! drive a count negative.

use serde::Serialize;
use thiserror::Error;
use tracing::instrument;

use crate::cart::CartItem;
use crate::catalog::{CatalogError, CatalogStore, Product};

/// Stock reconciliation failures.
#[derive(Debug, Error)]
pub enum StockError {
    #[error("product not found: {0}")]
    UnknownProduct(minishops_core::ProductId),

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// One confirmed cart line, parallel to the input.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfirmedItem {
    pub item: CartItem,
    /// Units actually available for this variant.
    pub available: u32,
    /// True when the requested quantity had to be capped.
    pub changed_quantity: bool,
}

/// Live stock for the variant a cart line refers to, `None` when the
/// variant cannot be resolved at all.
#[must_use]
pub fn available_stock(product: &Product, style: &str, option: &str) -> Option<u32> {
    product
        .resolve_option(style, option)
        .map(|option| option.quantity)
}

/// Confirm claimed quantities against live stock, capping rather than
/// rejecting.
///
/// # Errors
///
/// Fails only when a product cannot be read at all; a missing variant
/// degrades to zero available (fully capped line).
#[instrument(skip_all, fields(lines = items.len()))]
pub async fn confirm_quantities<C: CatalogStore>(
    catalog: &C,
    items: &[CartItem],
) -> Result<Vec<ConfirmedItem>, StockError> {
    let mut confirmed = Vec::with_capacity(items.len());
    for item in items {
        let product = catalog
            .get_product(&item.product_id)
            .await?
            .ok_or_else(|| StockError::UnknownProduct(item.product_id.clone()))?;
        let available = available_stock(&product, &item.style, &item.option).unwrap_or(0);

        let mut item = item.clone();
        let changed_quantity = item.quantity > available;
        if changed_quantity {
            tracing::info!(
                product = %item.product_id,
                requested = item.quantity,
                available,
                "capping cart line to available stock"
            );
            item.quantity = available;
        }
        confirmed.push(ConfirmedItem {
            item,
            available,
            changed_quantity,
        });
    }
    Ok(confirmed)
}

/// Decrement stock for every line of a committed sale.
///
/// # Errors
///
/// Surfaces the store's conditional-decrement failure
/// ([`CatalogError::InsufficientStock`]) when a concurrent buyer got
/// there first. The caller decides the compensation; the decrement
/// itself never goes negative.
#[instrument(skip_all, fields(lines = items.len()))]
pub async fn commit_sale<C: CatalogStore>(
    catalog: &C,
    items: &[CartItem],
) -> Result<(), StockError> {
    for item in items {
        catalog
            .decrement_stock(&item.product_id, &item.style, &item.option, item.quantity)
            .await?;
    }
    Ok(())
}
