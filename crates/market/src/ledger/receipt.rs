//! Single-order receipt assembly.
//!
//! Annotates each line of a stored order with its fulfillment state,
//! derived from the owning shop's pending index: once a shop has moved
//! the order out of pending, its lines count as shipped. Times are
//! formatted server-side so clients do not each convert differently.

use serde::Serialize;
use tracing::instrument;

use minishops_core::OrderId;

use super::{Ledger, LedgerError, Order};

/// A priced order line plus fulfillment state.
#[derive(Debug, Clone, Serialize)]
pub struct LineFulfillment {
    pub item: crate::cart::PricedItem,
    pub shipped: bool,
}

/// A stored order prepared for receipt display.
#[derive(Debug, Clone, Serialize)]
pub struct OrderReceipt {
    pub order: Order,
    pub lines: Vec<LineFulfillment>,
    /// Human-readable creation time, formatted server-side.
    pub converted_time: Option<String>,
}

/// Fetch one order and annotate it for receipt display.
///
/// A shop whose index cannot be read degrades to `shipped = false` for
/// its lines; a missing index record must not break the receipt.
///
/// # Errors
///
/// Returns `LedgerError::OrderNotFound` if the order does not exist.
#[instrument(skip(ledger))]
pub async fn single_order_receipt<L: Ledger>(
    ledger: &L,
    order_id: &OrderId,
) -> Result<OrderReceipt, LedgerError> {
    let order = ledger
        .get_order(order_id)
        .await?
        .ok_or_else(|| LedgerError::OrderNotFound(order_id.clone()))?;

    let mut lines = Vec::with_capacity(order.cart.len());
    for item in &order.cart {
        let shipped = match ledger.shop_orders(&item.shop_id).await {
            Ok((pending, _complete)) => !pending.iter().any(|entry| &entry.order_id == order_id),
            Err(err) => {
                tracing::warn!(shop = %item.shop_id, error = %err, "shop index unreadable, marking line unshipped");
                false
            }
        };
        lines.push(LineFulfillment {
            item: item.clone(),
            shipped,
        });
    }

    let converted_time = order
        .created_time
        .map(|time| time.format("%B %e, %Y %l:%M %p UTC").to_string());

    Ok(OrderReceipt {
        order,
        lines,
        converted_time,
    })
}
