use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::cart::Cart;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PurchaseState {
    Initial,
    Validating,
    Quoting,
    Quoted,
    Purchasing,
    Purchased,
    Polling,
    Completed,
    Failed,
    PollingTimeout,
}

impl PurchaseState {
    /// No further automatic transitions occur from a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::PollingTimeout)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteSummary {
    pub one_time_charge: Decimal,
    pub quote_reference: Option<String>,
}

/// One checkout attempt against the carrier. Ephemeral: created when the
/// orchestrator starts, discarded when it reaches a terminal state. A later
/// run can re-enter status-only from a known `transaction_id`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseTransaction {
    pub state: PurchaseState,
    pub client_account_id: String,
    pub transaction_id: Option<String>,
    pub quote: Option<QuoteSummary>,
    pub payment_status: Option<String>,
    pub order_status: Option<String>,
    pub payment_url: Option<String>,
    pub payment_url_expiry: Option<DateTime<Utc>>,
    pub poll_attempts: u32,
}

impl PurchaseTransaction {
    /// Start a fresh attempt. The client account id is generated exactly
    /// once here and reused by both the quote and purchase calls; two
    /// independent attempts never share one.
    pub fn begin() -> Self {
        Self {
            state: PurchaseState::Initial,
            client_account_id: Uuid::new_v4().to_string(),
            transaction_id: None,
            quote: None,
            payment_status: None,
            order_status: None,
            payment_url: None,
            payment_url_expiry: None,
            poll_attempts: 0,
        }
    }

    /// Re-enter an existing carrier transaction for status polling only.
    pub fn resume(transaction_id: impl Into<String>) -> Self {
        let mut transaction = Self::begin();
        transaction.state = PurchaseState::Purchased;
        transaction.transaction_id = Some(transaction_id.into());
        transaction
    }
}

/// Caller-facing outcome of `start_checkout`/`check_status`. Retains enough
/// context (state, ids) that a later status call can pick up the thread
/// without re-running quote or purchase.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseResult {
    pub state: PurchaseState,
    pub client_account_id: Option<String>,
    pub transaction_id: Option<String>,
    pub total: Option<Decimal>,
    pub payment_status: Option<String>,
    pub order_status: Option<String>,
    pub payment_url: Option<String>,
    pub payment_url_expiry: Option<DateTime<Utc>>,
    pub poll_attempts: u32,
    pub message: String,
}

impl PurchaseResult {
    pub fn from_transaction(transaction: &PurchaseTransaction, message: impl Into<String>) -> Self {
        Self {
            state: transaction.state,
            client_account_id: Some(transaction.client_account_id.clone()),
            transaction_id: transaction.transaction_id.clone(),
            total: transaction.quote.as_ref().map(|quote| quote.one_time_charge),
            payment_status: transaction.payment_status.clone(),
            order_status: transaction.order_status.clone(),
            payment_url: transaction.payment_url.clone(),
            payment_url_expiry: transaction.payment_url_expiry,
            poll_attempts: transaction.poll_attempts,
            message: message.into(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub first_name: String,
    pub last_name: String,
    pub street: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
    pub contact_phone: String,
}

impl ShippingAddress {
    /// Names of required fields that are empty or whitespace-only.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let fields: [(&'static str, &str); 8] = [
            ("first_name", &self.first_name),
            ("last_name", &self.last_name),
            ("street", &self.street),
            ("city", &self.city),
            ("state", &self.state),
            ("postal_code", &self.postal_code),
            ("country", &self.country),
            ("contact_phone", &self.contact_phone),
        ];
        fields
            .into_iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| name)
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutPayload {
    pub session_id: String,
    pub shipping_address: ShippingAddress,
    pub cart: Cart,
}
