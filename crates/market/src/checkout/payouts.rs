//! Vendor payout fan-out.
//!
//! Runs only for orders whose capture reconciled exactly. Transfers to
//! distinct shops are mutually independent, so they are dispatched
//! concurrently and joined. Every attempt leaves a payment record and a
//! pending-index entry behind whatever the transfer outcome; a payout
//! failure is recorded for manual retry, never rolled back into the
//! already-recorded order.

use std::collections::BTreeMap;

use futures::future::join_all;
use rust_decimal::Decimal;
use tracing::instrument;

use minishops_core::{OrderId, PaymentId, PayoutAccountRef, ShopId, to_minor_units};

use crate::cart::ShopTotals;
use crate::catalog::CatalogStore;
use crate::ledger::{Ledger, PaymentRecord, PayoutResult, ShopOrderEntry};
use crate::payment::{GatewayError, PaymentGateway};

/// Transfer each shop's adjusted share and record the outcome.
///
/// Returns the payment records in shop order. Ledger write failures are
/// logged loudly but do not abort the remaining shops; one vendor's
/// broken record must not swallow another vendor's money.
#[instrument(skip_all, fields(%order_id, shops = shops.len()))]
pub(super) async fn fan_out<C, L, G>(
    catalog: &C,
    ledger: &L,
    gateway: &G,
    order_id: &OrderId,
    shops: &BTreeMap<ShopId, ShopTotals>,
    accounts: &BTreeMap<ShopId, PayoutAccountRef>,
) -> Vec<PaymentRecord>
where
    C: CatalogStore,
    L: Ledger,
    G: PaymentGateway,
{
    let settlements = shops.iter().map(|(shop_id, totals)| async move {
        settle_shop(catalog, ledger, gateway, order_id, shop_id, totals, accounts).await
    });
    join_all(settlements).await
}

async fn settle_shop<C, L, G>(
    catalog: &C,
    ledger: &L,
    gateway: &G,
    order_id: &OrderId,
    shop_id: &ShopId,
    totals: &ShopTotals,
    accounts: &BTreeMap<ShopId, PayoutAccountRef>,
) -> PaymentRecord
where
    C: CatalogStore,
    L: Ledger,
    G: PaymentGateway,
{
    let complete_total = totals.total_shipping + totals.total_product_costs;
    let retain = match catalog.get_shop(shop_id).await {
        Ok(Some(shop)) => shop.retain_rate(),
        // The fee override is a convenience; a read failure here must
        // not block the vendor's money.
        Ok(None) | Err(_) => minishops_core::FeeRate::default(),
    };
    let adjusted_total = retain.apply(complete_total);

    let (results, note) = execute_transfer(gateway, accounts.get(shop_id), adjusted_total).await;

    let record = PaymentRecord {
        id: PaymentId::random(),
        shop_id: shop_id.clone(),
        complete_total,
        adjusted_total,
        order_id: order_id.clone(),
        results: results.clone(),
        note,
    };
    if let Err(err) = ledger.create_payment(record.clone()).await {
        tracing::error!(%order_id, shop = %shop_id, error = %err, "failed to persist payment record");
    }

    let entry = ShopOrderEntry {
        order_id: order_id.clone(),
        bill: complete_total,
        paid: results,
    };
    if let Err(err) = ledger.push_pending(shop_id, entry).await {
        tracing::error!(%order_id, shop = %shop_id, error = %err, "failed to index order on shop");
    }

    record
}

/// Run one transfer, folding every failure mode into a recordable
/// result. Zero-value settlements complete without touching the
/// processor.
async fn execute_transfer<G: PaymentGateway>(
    gateway: &G,
    account: Option<&PayoutAccountRef>,
    adjusted_total: Decimal,
) -> (PayoutResult, Option<String>) {
    let Some(account) = account else {
        // Payment-method validation guarantees an account; reaching this
        // arm means the caller skipped it.
        return (
            PayoutResult::FAILED,
            Some("no payout account resolved for shop".to_owned()),
        );
    };

    let amount = match to_minor_units(adjusted_total) {
        Ok(amount) => amount,
        Err(err) => {
            return (PayoutResult::FAILED, Some(err.to_string()));
        }
    };
    if amount == 0 {
        return (PayoutResult::COMPLETED, None);
    }

    match gateway.transfer(account, amount).await {
        Ok(transfer_id) => (
            PayoutResult::COMPLETED,
            Some(format!("transfer {transfer_id}")),
        ),
        Err(GatewayError::TransferFailed { code }) => {
            tracing::warn!(%account, %code, "vendor transfer refused by processor");
            (PayoutResult::processor_code(code), None)
        }
        Err(err) => {
            tracing::warn!(%account, error = %err, "vendor transfer failed");
            (PayoutResult::FAILED, Some(err.to_string()))
        }
    }
}
