//! Payment gateway adapter.
//!
//! Wraps the external processor's charge, transfer, and cancellation
//! operations. Every amount crosses this boundary as integer minor
//! units (cents); nothing downstream of the boundary reintroduces
//! decimal rounding.

pub mod stripe;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use minishops_core::{ChargeId, CustomerRef, MinorUnits, PayoutAccountRef, TransferId};

pub use stripe::StripeGateway;

/// Gateway call failures.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The processor refused the charge (declined card, no funds).
    #[error("charge declined: {code}")]
    Declined { code: String, message: String },

    /// The customer has no usable card on file.
    #[error("no valid card on file")]
    NoCard,

    /// The processor refused a transfer; the code is recorded verbatim
    /// on the vendor's payment record.
    #[error("transfer failed: {code}")]
    TransferFailed { code: String },

    /// The call did not complete and the outcome is unknown. Money may
    /// have moved; callers must record-and-review, never treat this as
    /// a clean failure.
    #[error("gateway outcome unknown: {0}")]
    Unknown(String),

    /// Transport-level failure before the request was sent.
    #[error("gateway transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// The processor answered with something we could not parse.
    #[error("malformed gateway response: {0}")]
    Malformed(String),
}

impl GatewayError {
    /// Whether money may have moved despite the error.
    #[must_use]
    pub const fn outcome_unknown(&self) -> bool {
        matches!(self, Self::Unknown(_))
    }
}

/// The result of a charge attempt that reached the processor, successful
/// or short. Carries the metadata the order record persists.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChargeOutcome {
    pub charge_id: Option<ChargeId>,
    pub payment_intent_id: Option<String>,
    pub payment_method_id: Option<String>,
    /// Amount actually captured, minor units.
    pub amount_captured: MinorUnits,
    /// Amount the processor was asked for, minor units.
    pub amount_expected: MinorUnits,
    pub receipt_url: Option<String>,
    pub currency: Option<String>,
    /// Processor's charge outcome blob, kept verbatim for reconciliation.
    pub outcome: Option<serde_json::Value>,
    pub billing_details: Option<serde_json::Value>,
    pub payment_method_details: Option<serde_json::Value>,
    /// Processor-side creation time, epoch seconds.
    pub created: Option<i64>,
}

impl ChargeOutcome {
    /// Whether the capture reconciles exactly with what was asked.
    #[must_use]
    pub const fn captured_in_full(&self) -> bool {
        self.amount_captured == self.amount_expected
    }
}

/// The external payment processor, behind a trait so checkout can be
/// exercised against a scripted double.
pub trait PaymentGateway: Send + Sync {
    /// Whether the customer has at least one valid card on file.
    fn has_valid_card(
        &self,
        customer: &CustomerRef,
    ) -> impl Future<Output = Result<bool, GatewayError>> + Send;

    /// Charge the customer's default payment method. The idempotency key
    /// is forwarded to the processor so a client retry cannot produce a
    /// second charge.
    fn charge_default_card(
        &self,
        customer: &CustomerRef,
        amount: MinorUnits,
        idempotency_key: Option<&str>,
    ) -> impl Future<Output = Result<ChargeOutcome, GatewayError>> + Send;

    /// Transfer funds to a vendor's payout account.
    fn transfer(
        &self,
        destination: &PayoutAccountRef,
        amount: MinorUnits,
    ) -> impl Future<Output = Result<TransferId, GatewayError>> + Send;

    /// Compensate an already-captured charge. Used by manual settlement,
    /// never by an automatic rollback.
    fn cancel_charge(
        &self,
        charge: &ChargeId,
    ) -> impl Future<Output = Result<(), GatewayError>> + Send;
}
