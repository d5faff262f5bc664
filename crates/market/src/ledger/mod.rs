//! Durable order and payout records.
//!
//! Orders are written once per checkout attempt that reaches the charge
//! step and never deleted. Per-vendor payment records are written once
//! per shop per order and are immutable afterwards except through the
//! note amendment path. Shops keep pending/complete order indices so a
//! vendor can work their fulfillment queue.

pub mod receipt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use minishops_core::{ChargeId, CustomerRef, MinorUnits, OrderId, PaymentId, ShopId};

use crate::cart::{PricedItem, Totals};

pub use receipt::{LineFulfillment, OrderReceipt, single_order_receipt};

/// A durable order record.
///
/// A checkout that attempted a charge must leave exactly one of these
/// behind regardless of the charge outcome; money may have moved, and
/// transactions without records cannot be reconciled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    /// Processor customer reference of the purchaser.
    pub customer_id: Option<CustomerRef>,
    /// Minor units actually captured.
    pub amount_captured: Option<MinorUnits>,
    /// Minor units we expected to capture.
    pub expected_total: Option<MinorUnits>,
    pub charge_id: Option<ChargeId>,
    /// True only when the capture reconciled exactly (or the order was
    /// free).
    pub payment_fulfilled: bool,
    /// Capture did not match expectation; payouts are withheld for
    /// manual settlement.
    pub requires_review: bool,
    #[serde(default)]
    pub receipt_url: String,
    pub created_time: Option<DateTime<Utc>>,
    pub payment_intent_id: Option<String>,
    pub payment_method_id: Option<String>,
    pub payment_method_details: Option<serde_json::Value>,
    pub billing_details: Option<serde_json::Value>,
    pub outcome: Option<serde_json::Value>,
    /// The distinct shops involved in this order.
    pub shops: Vec<ShopId>,
    /// Priced line items as charged.
    pub cart: Vec<PricedItem>,
    pub totals: Option<Totals>,
    pub currency: Option<String>,
    /// Free checkout: no charge was attempted by design.
    pub pro_bono: bool,
    /// Client-supplied key that makes retried submissions safe.
    pub idempotency_key: Option<String>,
}

impl Order {
    /// A skeletal order carrying whatever data survived a failed
    /// checkout step. Better a nearly empty record than none.
    #[must_use]
    pub fn skeletal(id: OrderId, customer_id: Option<CustomerRef>) -> Self {
        Self {
            id,
            customer_id,
            amount_captured: None,
            expected_total: None,
            charge_id: None,
            payment_fulfilled: false,
            requires_review: false,
            receipt_url: String::new(),
            created_time: None,
            payment_intent_id: None,
            payment_method_id: None,
            payment_method_details: None,
            billing_details: None,
            outcome: None,
            shops: Vec::new(),
            cart: Vec::new(),
            totals: None,
            currency: None,
            pro_bono: false,
            idempotency_key: None,
        }
    }
}

/// The recorded result of one vendor payout attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PayoutResult {
    Known(KnownPayoutResult),
    /// A processor error code recorded verbatim.
    Processor(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KnownPayoutResult {
    Completed,
    Failed,
}

impl PayoutResult {
    pub const COMPLETED: Self = Self::Known(KnownPayoutResult::Completed);
    pub const FAILED: Self = Self::Known(KnownPayoutResult::Failed);

    #[must_use]
    pub fn processor_code(code: impl Into<String>) -> Self {
        Self::Processor(code.into())
    }

    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Known(KnownPayoutResult::Completed))
    }
}

/// A per-vendor payout record, one per shop per order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: PaymentId,
    pub shop_id: ShopId,
    /// The shop's gross for this order (line totals plus shipping).
    pub complete_total: Decimal,
    /// Gross after the platform fee: `round(complete_total * retain, 2)`.
    pub adjusted_total: Decimal,
    pub order_id: OrderId,
    pub results: PayoutResult,
    pub note: Option<String>,
}

/// An entry in a shop's pending or complete order index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShopOrderEntry {
    pub order_id: OrderId,
    /// The shop's gross for the order.
    pub bill: Decimal,
    /// Payout result at association time.
    pub paid: PayoutResult,
}

/// Ledger store failures.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("order not found: {0}")]
    OrderNotFound(OrderId),

    #[error("order id collision: {0}")]
    IdCollision(OrderId),

    #[error("order {order} is not pending for shop {shop}")]
    NotPending { shop: ShopId, order: OrderId },

    #[error("ledger store error: {0}")]
    Store(String),
}

/// Injected durable storage for orders, payment records, and shop order
/// indices.
pub trait Ledger: Send + Sync {
    /// Persist a new order. Fails on id collision; never overwrites.
    fn create_order(
        &self,
        order: Order,
    ) -> impl Future<Output = Result<Order, LedgerError>> + Send;

    fn get_order(
        &self,
        id: &OrderId,
    ) -> impl Future<Output = Result<Option<Order>, LedgerError>> + Send;

    /// Find an order previously recorded under an idempotency key.
    fn find_order_by_key(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Option<Order>, LedgerError>> + Send;

    /// Persist a per-vendor payout record.
    fn create_payment(
        &self,
        record: PaymentRecord,
    ) -> impl Future<Output = Result<PaymentRecord, LedgerError>> + Send;

    fn payments_for_order(
        &self,
        order: &OrderId,
    ) -> impl Future<Output = Result<Vec<PaymentRecord>, LedgerError>> + Send;

    /// Amend the free-text note on a payment record. The only mutation
    /// payment records support.
    fn amend_payment_note(
        &self,
        id: &PaymentId,
        note: String,
    ) -> impl Future<Output = Result<(), LedgerError>> + Send;

    /// Append an order to a shop's pending index.
    fn push_pending(
        &self,
        shop: &ShopId,
        entry: ShopOrderEntry,
    ) -> impl Future<Output = Result<(), LedgerError>> + Send;

    /// Move an order from a shop's pending index to its complete index
    /// in one step.
    fn complete_order(
        &self,
        shop: &ShopId,
        order: &OrderId,
    ) -> impl Future<Output = Result<(), LedgerError>> + Send;

    /// Read a shop's pending and complete indices.
    fn shop_orders(
        &self,
        shop: &ShopId,
    ) -> impl Future<Output = Result<(Vec<ShopOrderEntry>, Vec<ShopOrderEntry>), LedgerError>> + Send;
}

/// Mint an order id that does not collide with an existing order.
///
/// Retries up to five times on collision; past that, returns the last
/// candidate and lets [`Ledger::create_order`]'s collision check catch
/// the one-in-several-billion repeat rather than crashing.
///
/// # Errors
///
/// Propagates ledger read failures.
pub async fn mint_order_id<L: Ledger>(ledger: &L) -> Result<OrderId, LedgerError> {
    let mut candidate = OrderId::random();
    for _ in 0..5 {
        if ledger.get_order(&candidate).await?.is_none() {
            return Ok(candidate);
        }
        candidate = OrderId::random();
    }
    Ok(candidate)
}
