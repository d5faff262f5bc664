//! Stripe implementation of the payment gateway.
//!
//! Plain REST with form-encoded bodies. Calls are bounded by a timeout;
//! a timed-out charge is an *unknown* outcome (money may have moved
//! despite the client-side timeout) and maps to
//! [`GatewayError::Unknown`], never to a clean failure.

use std::sync::Arc;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::instrument;

use minishops_core::{ChargeId, CustomerRef, MinorUnits, PayoutAccountRef, TransferId};

use crate::config::GatewayConfig;

use super::{ChargeOutcome, GatewayError, PaymentGateway};

/// Client for the Stripe API.
#[derive(Clone)]
pub struct StripeGateway {
    inner: Arc<StripeGatewayInner>,
}

struct StripeGatewayInner {
    client: reqwest::Client,
    api_base: String,
    secret_key: SecretString,
    currency: String,
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Deserialize)]
struct PaymentMethodList {
    #[serde(default)]
    data: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct PaymentIntent {
    id: String,
    amount: MinorUnits,
    #[serde(default)]
    amount_received: MinorUnits,
    #[serde(default)]
    payment_method: Option<String>,
    #[serde(default)]
    latest_charge: Option<Charge>,
}

#[derive(Debug, Deserialize)]
struct Charge {
    id: String,
    #[serde(default)]
    receipt_url: Option<String>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    created: Option<i64>,
    #[serde(default)]
    outcome: Option<serde_json::Value>,
    #[serde(default)]
    billing_details: Option<serde_json::Value>,
    #[serde(default)]
    payment_method_details: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct Transfer {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl ApiError {
    fn code_or_kind(&self) -> String {
        self.code
            .clone()
            .or_else(|| self.kind.clone())
            .unwrap_or_else(|| "unknown_error".to_owned())
    }
}

// =============================================================================
// Client
// =============================================================================

impl StripeGateway {
    /// Create a Stripe client from gateway configuration.
    ///
    /// # Errors
    ///
    /// Returns the underlying builder error if the HTTP client cannot be
    /// constructed.
    pub fn new(config: &GatewayConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            inner: Arc::new(StripeGatewayInner {
                client,
                api_base: config.api_base.trim_end_matches('/').to_owned(),
                secret_key: config.secret_key.clone(),
                currency: config.currency.clone(),
            }),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.inner.api_base)
    }

    /// Send a form-encoded POST and decode the response, mapping
    /// post-connect transport failures to unknown outcomes.
    async fn post_form<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        form: &[(&str, String)],
        idempotency_key: Option<&str>,
    ) -> Result<T, GatewayError> {
        let mut request = self
            .inner
            .client
            .post(self.url(path))
            .bearer_auth(self.inner.secret_key.expose_secret())
            .form(form);
        if let Some(key) = idempotency_key {
            request = request.header("Idempotency-Key", key);
        }

        let response = request.send().await.map_err(classify_transport)?;
        decode_response(response).await
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, GatewayError> {
        let response = self
            .inner
            .client
            .get(self.url(path))
            .bearer_auth(self.inner.secret_key.expose_secret())
            .send()
            .await
            .map_err(classify_transport)?;
        decode_response(response).await
    }
}

/// A failure to establish the connection (or to build the request)
/// never reached the processor and is a plain transport error. Any
/// error past that point, including timeouts, resets, and truncated
/// response bodies, leaves the outcome unknown: the request may have
/// been processed even though we never saw the answer.
fn classify_transport(err: reqwest::Error) -> GatewayError {
    if err.is_connect() || err.is_builder() {
        GatewayError::Http(err)
    } else {
        GatewayError::Unknown(err.to_string())
    }
}

async fn decode_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, GatewayError> {
    let status = response.status();
    let body = response.text().await.map_err(classify_transport)?;

    if status.is_success() {
        return serde_json::from_str(&body).map_err(|err| {
            GatewayError::Malformed(format!("{err}: {}", truncate(&body, 200)))
        });
    }

    match serde_json::from_str::<ApiErrorEnvelope>(&body) {
        Ok(envelope) => {
            let code = envelope.error.code_or_kind();
            let message = envelope.error.message.unwrap_or_default();
            tracing::warn!(%status, %code, "processor rejected request");
            Err(GatewayError::Declined { code, message })
        }
        Err(_) => Err(GatewayError::Malformed(format!(
            "HTTP {status}: {}",
            truncate(&body, 200)
        ))),
    }
}

fn truncate(body: &str, limit: usize) -> String {
    body.chars().take(limit).collect()
}

impl PaymentGateway for StripeGateway {
    #[instrument(skip(self))]
    async fn has_valid_card(&self, customer: &CustomerRef) -> Result<bool, GatewayError> {
        let list: PaymentMethodList = self
            .get(&format!(
                "/v1/customers/{customer}/payment_methods?type=card"
            ))
            .await?;
        Ok(!list.data.is_empty())
    }

    #[instrument(skip(self), fields(%customer, amount))]
    async fn charge_default_card(
        &self,
        customer: &CustomerRef,
        amount: MinorUnits,
        idempotency_key: Option<&str>,
    ) -> Result<ChargeOutcome, GatewayError> {
        let form = [
            ("amount", amount.to_string()),
            ("currency", self.inner.currency.clone()),
            ("customer", customer.to_string()),
            ("confirm", "true".to_owned()),
            ("off_session", "true".to_owned()),
            ("expand[]", "latest_charge".to_owned()),
        ];
        let intent: PaymentIntent = self
            .post_form("/v1/payment_intents", &form, idempotency_key)
            .await?;

        let charge = intent.latest_charge;
        Ok(ChargeOutcome {
            charge_id: charge.as_ref().map(|c| ChargeId::new(c.id.clone())),
            payment_intent_id: Some(intent.id),
            payment_method_id: intent.payment_method,
            amount_captured: intent.amount_received,
            amount_expected: intent.amount,
            receipt_url: charge.as_ref().and_then(|c| c.receipt_url.clone()),
            currency: charge.as_ref().and_then(|c| c.currency.clone()),
            outcome: charge.as_ref().and_then(|c| c.outcome.clone()),
            billing_details: charge.as_ref().and_then(|c| c.billing_details.clone()),
            payment_method_details: charge
                .as_ref()
                .and_then(|c| c.payment_method_details.clone()),
            created: charge.as_ref().and_then(|c| c.created),
        })
    }

    #[instrument(skip(self), fields(%destination, amount))]
    async fn transfer(
        &self,
        destination: &PayoutAccountRef,
        amount: MinorUnits,
    ) -> Result<TransferId, GatewayError> {
        let form = [
            ("amount", amount.to_string()),
            ("currency", self.inner.currency.clone()),
            ("destination", destination.to_string()),
        ];
        let transfer: Transfer = self
            .post_form("/v1/transfers", &form, None)
            .await
            .map_err(|err| match err {
                GatewayError::Declined { code, .. } => GatewayError::TransferFailed { code },
                other => other,
            })?;
        Ok(TransferId::new(transfer.id))
    }

    #[instrument(skip(self), fields(%charge))]
    async fn cancel_charge(&self, charge: &ChargeId) -> Result<(), GatewayError> {
        let form = [("charge", charge.to_string())];
        let _refund: serde_json::Value = self.post_form("/v1/refunds", &form, None).await?;
        Ok(())
    }
}
