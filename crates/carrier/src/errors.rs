use serde::{Deserialize, Serialize};
use thiserror::Error;

use lineup_core::domain::purchase::PurchaseState;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self { field: field.into(), message: message.into() }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("carrier credentials are not configured")]
    MissingCredentials,
    #[error("token endpoint rejected the request (status {status}): {body}")]
    TokenRejected { status: u16, body: String },
    #[error("token request failed: {0}")]
    Transport(String),
    #[error("token response was missing an access token")]
    MalformedToken,
}

/// Failure taxonomy for one checkout attempt. Validation failures list
/// every violated field, not just the first; external-call failures carry
/// the HTTP status and raw body for diagnostics.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CheckoutError {
    #[error("checkout payload failed validation with {} violation(s)", .violations.len())]
    Validation { violations: Vec<FieldViolation> },
    #[error("quote call failed (status {status:?}): {body}")]
    Quote { status: Option<u16>, body: String },
    #[error("purchase call failed (status {status:?}): {body}")]
    Purchase { status: Option<u16>, body: String },
    #[error("status call failed (status {status:?}): {body}")]
    Status { status: Option<u16>, body: String },
    #[error("carrier does not know transaction `{transaction_id}`")]
    NotFound { transaction_id: String },
    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl CheckoutError {
    /// Unknown-transaction errors are fatal to a polling loop; there is no
    /// point retrying them.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// A `CheckoutError` annotated with where the orchestration was when it
/// failed, plus the identifiers a later status call needs to pick up the
/// thread without re-running quote or purchase.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("checkout failed during {state:?}: {source}")]
pub struct FlowError {
    pub state: PurchaseState,
    pub client_account_id: Option<String>,
    pub transaction_id: Option<String>,
    #[source]
    pub source: CheckoutError,
}

impl FlowError {
    pub fn new(state: PurchaseState, source: CheckoutError) -> Self {
        Self { state, client_account_id: None, transaction_id: None, source }
    }

    pub fn with_ids(
        mut self,
        client_account_id: impl Into<String>,
        transaction_id: Option<String>,
    ) -> Self {
        self.client_account_id = Some(client_account_id.into());
        self.transaction_id = transaction_id;
        self
    }
}
