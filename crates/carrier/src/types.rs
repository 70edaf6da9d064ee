//! Carrier wire shapes. The JSON is carrier-specific and opaque to the
//! orchestrator beyond the fields named here.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressPayload {
    pub first_name: String,
    pub last_name: String,
    pub street: String,
    pub city: String,
    pub state_code: String,
    pub postal_code: String,
    pub country: String,
    pub contact_phone: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItemPayload {
    pub line_number: usize,
    /// Exact catalog display name, data-quantity annotation stripped.
    pub plan_name: String,
    pub sim_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sim_icc_id: Option<String>,
}

/// Shared request body for the quote and purchase calls. The two calls
/// differ only in `collection_amount` (zero for quote, the quoted total
/// for purchase) and must carry the same `client_account_id`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequest {
    pub client_account_id: String,
    pub tenant: String,
    pub collection_amount: Decimal,
    pub shipping_address: AddressPayload,
    pub line_items: Vec<LineItemPayload>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteResponse {
    pub quote_id: Option<String>,
    pub one_time_charge: Option<Decimal>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseResponse {
    pub transaction_id: Option<String>,
    pub status: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub payment_status: Option<String>,
    pub order_status: Option<String>,
    pub payment_url: Option<String>,
    pub payment_url_expiry: Option<DateTime<Utc>>,
}

impl StatusResponse {
    pub fn is_terminal_success(&self) -> bool {
        let order_done = status_matches(self.order_status.as_deref(), &["DONE"]);
        let payment_ok = status_matches(self.payment_status.as_deref(), &["SUCCESS", "APPROVED"]);
        order_done || payment_ok
    }

    pub fn is_terminal_failure(&self) -> bool {
        status_matches(self.order_status.as_deref(), &["FAILED"])
            || status_matches(self.payment_status.as_deref(), &["FAILED"])
    }
}

fn status_matches(value: Option<&str>, accepted: &[&str]) -> bool {
    value
        .map(|value| accepted.iter().any(|candidate| value.eq_ignore_ascii_case(candidate)))
        .unwrap_or(false)
}
