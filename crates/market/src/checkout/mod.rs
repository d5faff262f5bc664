//! Checkout orchestration.
//!
//! Drives a checkout attempt through its states in order: price the
//! server-side cart, validate payment methods on both ends, reconcile
//! stock, charge, record, pay vendors out, and clear the cart. Every
//! gate before CHARGING aborts cleanly with the cart preserved; once a
//! charge has been attempted an order record is written no matter what
//! comes back, because a captured charge with no record is the one state
//! the system can never repair on its own.

mod payouts;

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::instrument;

use minishops_core::{CustomerRef, MoneyError, OrderId, PayoutAccountRef, ShopId, UserId, to_minor_units};

use crate::cart::{Cart, CheckoutTruths, PricingError, Totals, price_cart};
use crate::catalog::{CatalogError, CatalogStore};
use crate::ledger::{Ledger, LedgerError, Order, PaymentRecord, mint_order_id};
use crate::payment::{ChargeOutcome, GatewayError, PaymentGateway};
use crate::stock::{ConfirmedItem, StockError, commit_sale, confirm_quantities};
use crate::users::{UserStore, UserStoreError};

// =============================================================================
// Request / response
// =============================================================================

/// One checkout submission.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub user: UserId,
    /// The totals the client displayed to the buyer. Checkout refuses to
    /// charge anything other than what the buyer saw.
    pub claimed_totals: Totals,
    /// Client-minted key making resubmission of the same attempt safe.
    pub idempotency_key: Option<String>,
}

/// A completed (or review-held) checkout.
#[derive(Debug, Clone)]
pub struct CheckoutSuccess {
    pub order: Order,
    /// Per-vendor payout records, empty when payouts were withheld.
    pub payments: Vec<PaymentRecord>,
    /// True when an earlier attempt with the same idempotency key had
    /// already been recorded and was returned instead of re-charging.
    pub replayed: bool,
}

/// Checkout failures, split by what the buyer can do about them.
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("cart is empty")]
    EmptyCart,

    /// A line's shipping class was reassigned during pricing; the buyer
    /// must review the new quote before paying.
    #[error("shipping selection changed; review your cart and retry")]
    ShippingReassigned,

    /// The purchaser has no processor customer reference.
    #[error("no payment method on file")]
    NoPaymentMethod,

    /// The purchaser's customer exists but holds no usable card.
    #[error("your card is not valid for this purchase")]
    NoValidCard,

    /// A vendor in the cart cannot receive money, through no fault of
    /// the buyer.
    #[error("a vendor's account cannot accept payment for shop {0}")]
    VendorUnpayable(ShopId),

    /// One or more quantities were capped against live stock. Carries
    /// the reconciled lines so the client can show what changed.
    #[error("item quantities were adjusted to available stock")]
    QuantityAdjusted(Vec<ConfirmedItem>),

    /// The totals the client displayed no longer match the server's.
    #[error("the quoted total no longer matches; refresh and retry")]
    TotalMismatch { claimed: Totals, actual: Totals },

    /// The processor declined the charge. An order was still recorded.
    #[error("charge declined: {code}")]
    ChargeDeclined {
        order_id: OrderId,
        code: String,
        message: String,
    },

    /// The charge outcome could not be determined. A review-flagged
    /// order was recorded; nothing downstream of CHARGING ran.
    #[error("charge outcome unknown; order {order_id} held for review")]
    ChargeOutcomeUnknown { order_id: OrderId },

    #[error(transparent)]
    Pricing(#[from] PricingError),

    #[error(transparent)]
    Money(#[from] MoneyError),

    #[error(transparent)]
    User(#[from] UserStoreError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Stock(#[from] StockError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

// =============================================================================
// Service
// =============================================================================

/// The checkout orchestrator, generic over its stores and gateway so the
/// whole flow runs against in-memory doubles in tests.
pub struct CheckoutService<C, U, L, G> {
    catalog: Arc<C>,
    users: Arc<U>,
    ledger: Arc<L>,
    gateway: Arc<G>,
    currency: String,
}

impl<C, U, L, G> CheckoutService<C, U, L, G>
where
    C: CatalogStore,
    U: UserStore,
    L: Ledger,
    G: PaymentGateway,
{
    pub fn new(
        catalog: Arc<C>,
        users: Arc<U>,
        ledger: Arc<L>,
        gateway: Arc<G>,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            catalog,
            users,
            ledger,
            gateway,
            currency: currency.into(),
        }
    }

    /// Run one checkout attempt end to end.
    ///
    /// # Errors
    ///
    /// Errors up to and including [`CheckoutError::TotalMismatch`] abort
    /// before any money moves and leave the cart intact. The two charge
    /// errors mean an order record exists; everything else is a store or
    /// transport failure.
    #[instrument(skip(self, request), fields(user = %request.user))]
    pub async fn process_checkout(
        &self,
        request: CheckoutRequest,
    ) -> Result<CheckoutSuccess, CheckoutError> {
        // A resubmitted attempt returns the already-recorded outcome
        // instead of reaching the processor a second time.
        if let Some(key) = request.idempotency_key.as_deref() {
            if let Some(order) = self.ledger.find_order_by_key(key).await? {
                tracing::info!(order = %order.id, "returning recorded order for resubmitted key");
                let payments = self.ledger.payments_for_order(&order.id).await?;
                return Ok(CheckoutSuccess {
                    order,
                    payments,
                    replayed: true,
                });
            }
        }

        // PRICING: the server's cart is the only pricing input.
        let cart = self.users.get_cart(&request.user).await?;
        if cart.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }
        let profile = self.users.get_profile(&request.user).await?;
        let truths = price_cart(self.catalog.as_ref(), &cart, &profile.country).await?;
        if truths.shipping_changed {
            return Err(CheckoutError::ShippingReassigned);
        }

        // VALIDATING_PAYMENT_METHODS: both ends of every money movement
        // must be reachable before anything is charged.
        let customer = profile
            .customer_ref
            .clone()
            .ok_or(CheckoutError::NoPaymentMethod)?;
        if !self.gateway.has_valid_card(&customer).await? {
            return Err(CheckoutError::NoValidCard);
        }
        let accounts = self.resolve_payout_accounts(&truths).await?;

        // VALIDATING_STOCK: quantities are capped, never rejected, and a
        // cap means the buyer must re-approve the adjusted cart.
        let confirmed = confirm_quantities(self.catalog.as_ref(), &cart.items).await?;
        if confirmed.iter().any(|line| line.changed_quantity) {
            return Err(CheckoutError::QuantityAdjusted(confirmed));
        }

        if request.claimed_totals != truths.totals {
            return Err(CheckoutError::TotalMismatch {
                claimed: request.claimed_totals.clone(),
                actual: truths.totals,
            });
        }

        // CHARGING: a zero-value cart skips the processor entirely.
        let expected = to_minor_units(truths.totals.total)?;
        let order_id = mint_order_id(self.ledger.as_ref()).await?;
        let charge_result = if expected == 0 {
            tracing::info!(order = %order_id, "zero-value cart; skipping charge");
            Ok(ChargeOutcome::default())
        } else {
            self.gateway
                .charge_default_card(&customer, expected, request.idempotency_key.as_deref())
                .await
        };

        match charge_result {
            Ok(outcome) => {
                self.record_and_settle(&request, &cart, &truths, &customer, &accounts, order_id, outcome, expected == 0)
                    .await
            }
            Err(GatewayError::Declined { code, message }) => {
                // The processor answered; the attempt is still recorded.
                let outcome = ChargeOutcome {
                    amount_expected: expected,
                    ..ChargeOutcome::default()
                };
                let order = self.build_order(order_id, &customer, &truths, &request, outcome, false);
                let order = self.ledger.create_order(order).await?;
                tracing::warn!(order = %order.id, %code, "charge declined");
                Err(CheckoutError::ChargeDeclined {
                    order_id: order.id,
                    code,
                    message,
                })
            }
            Err(err @ (GatewayError::Unknown(_) | GatewayError::Malformed(_))) => {
                // Money may have moved. Record what we know and hold the
                // order for manual settlement; no payouts, no cart clear.
                let mut order = Order::skeletal(order_id, Some(customer.clone()));
                order.expected_total = Some(expected);
                order.requires_review = true;
                order.shops = truths.shop_ids();
                order.cart = truths.cart.clone();
                order.totals = Some(truths.totals.clone());
                order.currency = Some(self.currency.clone());
                order.idempotency_key = request.idempotency_key.clone();
                order.created_time = Some(Utc::now());
                let order = self.ledger.create_order(order).await?;
                tracing::error!(order = %order.id, error = %err, "charge outcome unknown; order held for review");
                Err(CheckoutError::ChargeOutcomeUnknown { order_id: order.id })
            }
            Err(GatewayError::NoCard) => Err(CheckoutError::NoValidCard),
            // Transport failure before the request went out: nothing
            // moved, nothing to record.
            Err(err) => Err(err.into()),
        }
    }

    /// RECORDING through CLEARING_CART for a charge the processor
    /// answered.
    #[allow(clippy::too_many_arguments)]
    async fn record_and_settle(
        &self,
        request: &CheckoutRequest,
        cart: &Cart,
        truths: &CheckoutTruths,
        customer: &CustomerRef,
        accounts: &BTreeMap<ShopId, PayoutAccountRef>,
        order_id: OrderId,
        outcome: ChargeOutcome,
        pro_bono: bool,
    ) -> Result<CheckoutSuccess, CheckoutError> {
        let captured = outcome.amount_captured;
        let mut order = self.build_order(order_id, customer, truths, request, outcome, pro_bono);

        // The sale is committed against stock only once it is paid for.
        if order.payment_fulfilled {
            if let Err(err) = commit_sale(self.catalog.as_ref(), &cart.items).await {
                tracing::error!(order = %order.id, error = %err, "stock decrement failed after capture");
                order.requires_review = true;
            }
        }

        let order = self.ledger.create_order(order).await?;

        // PAYING_OUT: only for orders whose capture reconciled exactly.
        let payments = if order.payment_fulfilled && !order.requires_review {
            payouts::fan_out(
                self.catalog.as_ref(),
                self.ledger.as_ref(),
                self.gateway.as_ref(),
                &order.id,
                &truths.shops,
                accounts,
            )
            .await
        } else {
            tracing::warn!(order = %order.id, "capture did not reconcile; withholding payouts");
            Vec::new()
        };

        // CLEARING_CART: only once the order is durably recorded, and
        // only when the buyer actually paid (or the order was free). A
        // declined or zero-capture attempt leaves the cart for retry.
        if captured > 0 || order.pro_bono {
            self.users.put_cart(&request.user, &Cart::empty()).await?;
        }

        tracing::info!(order = %order.id, captured, payouts = payments.len(), "checkout recorded");
        Ok(CheckoutSuccess {
            order,
            payments,
            replayed: false,
        })
    }

    /// Resolve every vendor's payout account up front. One unpayable
    /// vendor fails the whole attempt; a partial marketplace order is
    /// worse than none.
    async fn resolve_payout_accounts(
        &self,
        truths: &CheckoutTruths,
    ) -> Result<BTreeMap<ShopId, PayoutAccountRef>, CheckoutError> {
        let mut accounts = BTreeMap::new();
        for shop_id in truths.shop_ids() {
            let owner = self
                .catalog
                .shop_owner(&shop_id)
                .await?
                .ok_or_else(|| CheckoutError::VendorUnpayable(shop_id.clone()))?;
            let profile = self.users.get_profile(&owner).await.map_err(|err| match err {
                UserStoreError::NotFound(_) => CheckoutError::VendorUnpayable(shop_id.clone()),
                other => CheckoutError::User(other),
            })?;
            let account = profile
                .payout_account
                .ok_or_else(|| CheckoutError::VendorUnpayable(shop_id.clone()))?;
            accounts.insert(shop_id, account);
        }
        Ok(accounts)
    }

    fn build_order(
        &self,
        id: OrderId,
        customer: &CustomerRef,
        truths: &CheckoutTruths,
        request: &CheckoutRequest,
        outcome: ChargeOutcome,
        pro_bono: bool,
    ) -> Order {
        let created_time = outcome
            .created
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .or_else(|| Some(Utc::now()));
        let payment_fulfilled = outcome.captured_in_full();
        Order {
            id,
            customer_id: Some(customer.clone()),
            amount_captured: Some(outcome.amount_captured),
            expected_total: Some(outcome.amount_expected),
            charge_id: outcome.charge_id,
            payment_fulfilled,
            // Review is for money that moved but does not reconcile; a
            // clean decline captured nothing and needs no settlement.
            requires_review: !payment_fulfilled && outcome.amount_captured != 0,
            receipt_url: outcome.receipt_url.unwrap_or_default(),
            created_time,
            payment_intent_id: outcome.payment_intent_id,
            payment_method_id: outcome.payment_method_id,
            payment_method_details: outcome.payment_method_details,
            billing_details: outcome.billing_details,
            outcome: outcome.outcome,
            shops: truths.shop_ids(),
            cart: truths.cart.clone(),
            totals: Some(truths.totals.clone()),
            currency: outcome.currency.or_else(|| Some(self.currency.clone())),
            pro_bono,
            idempotency_key: request.idempotency_key.clone(),
        }
    }
}
