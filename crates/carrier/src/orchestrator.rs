use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, info, warn};

use lineup_core::config::OrchestratorConfig;
use lineup_core::domain::purchase::{
    CheckoutPayload, PurchaseResult, PurchaseState, PurchaseTransaction, QuoteSummary,
};
use lineup_core::normalize::{normalize_state_code, strip_data_annotation};
use rust_decimal::Decimal;

use crate::catalog::PlanCatalog;
use crate::client::CarrierApi;
use crate::errors::{CheckoutError, FieldViolation, FlowError};
use crate::types::{AddressPayload, LineItemPayload, TransactionRequest};

#[derive(Clone, Debug)]
pub struct CheckoutOptions {
    pub skip_polling: bool,
    pub max_poll_attempts: u32,
    pub initial_poll_delay: Duration,
    pub poll_interval: Duration,
    pub max_backoff_delay: Duration,
    /// Caller-supplied cancellation bound for the polling phase. Elapsing
    /// stops polling without touching the carrier-side transaction.
    pub timeout: Option<Duration>,
}

impl Default for CheckoutOptions {
    fn default() -> Self {
        Self {
            skip_polling: false,
            max_poll_attempts: 10,
            initial_poll_delay: Duration::from_secs(2),
            poll_interval: Duration::from_secs(3),
            max_backoff_delay: Duration::from_secs(30),
            timeout: None,
        }
    }
}

impl CheckoutOptions {
    pub fn from_config(config: &OrchestratorConfig) -> Self {
        Self {
            skip_polling: false,
            max_poll_attempts: config.max_poll_attempts,
            initial_poll_delay: Duration::from_millis(config.initial_poll_delay_ms),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            max_backoff_delay: Duration::from_millis(config.max_backoff_delay_ms),
            timeout: None,
        }
    }

    /// One immediate status probe; the shape `check_status` wants.
    pub fn status_only() -> Self {
        Self {
            max_poll_attempts: 1,
            initial_poll_delay: Duration::ZERO,
            ..Self::default()
        }
    }
}

enum PollEnd {
    Finished(Result<(), CheckoutError>),
    TimedOut,
}

/// Drives one checkout attempt through the carrier's quote → purchase →
/// status workflow.
///
/// The client account id is generated once per attempt and shared by the
/// quote and purchase calls; purchasing under a different id would orphan
/// the quote on the carrier side.
pub struct PurchaseOrchestrator<A, C> {
    api: A,
    catalog: C,
    tenant: String,
}

impl<A, C> PurchaseOrchestrator<A, C>
where
    A: CarrierApi,
    C: PlanCatalog,
{
    pub fn new(api: A, catalog: C, tenant: impl Into<String>) -> Self {
        Self { api, catalog, tenant: tenant.into() }
    }

    pub async fn start_checkout(
        &self,
        payload: &CheckoutPayload,
        options: &CheckoutOptions,
    ) -> Result<PurchaseResult, FlowError> {
        let mut transaction = PurchaseTransaction::begin();
        info!(
            session_id = %payload.session_id,
            client_account_id = %transaction.client_account_id,
            "starting checkout"
        );

        transaction.state = PurchaseState::Validating;
        let mut request = self
            .validate_and_build(payload, &transaction.client_account_id)
            .await
            .map_err(|source| flow_error(&transaction, source))?;

        transaction.state = PurchaseState::Quoting;
        let quote = self
            .api
            .quote(&request)
            .await
            .map_err(|source| flow_error(&transaction, source))?;
        let total = quote.one_time_charge.ok_or_else(|| {
            flow_error(
                &transaction,
                CheckoutError::Quote {
                    status: None,
                    body: "quote response carried no usable oneTimeCharge total".to_string(),
                },
            )
        })?;
        transaction.state = PurchaseState::Quoted;
        transaction.quote =
            Some(QuoteSummary { one_time_charge: total, quote_reference: quote.quote_id });
        debug!(%total, "quote accepted");

        transaction.state = PurchaseState::Purchasing;
        request.collection_amount = total;
        let purchase = self
            .api
            .purchase(&request)
            .await
            .map_err(|source| flow_error(&transaction, source))?;
        let transaction_id = purchase
            .transaction_id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| {
                // The HTTP call may have succeeded; without a transaction id
                // the purchase is unusable all the same.
                flow_error(
                    &transaction,
                    CheckoutError::Purchase {
                        status: None,
                        body: "purchase response carried no transactionId".to_string(),
                    },
                )
            })?;
        transaction.transaction_id = Some(transaction_id);
        transaction.state = PurchaseState::Purchased;
        info!(
            transaction_id = transaction.transaction_id.as_deref().unwrap_or_default(),
            "purchase created"
        );

        if options.skip_polling {
            transaction.state = PurchaseState::Completed;
            return Ok(PurchaseResult::from_transaction(
                &transaction,
                "purchase created; polling skipped at the caller's request",
            ));
        }

        transaction.state = PurchaseState::Polling;
        let outcome = self.poll_bounded(&mut transaction, options).await;
        match outcome {
            PollEnd::Finished(Ok(())) => {
                let message = outcome_message(&transaction);
                Ok(PurchaseResult::from_transaction(&transaction, message))
            }
            PollEnd::Finished(Err(source)) => Err(flow_error(&transaction, source)),
            PollEnd::TimedOut => Ok(PurchaseResult::from_transaction(
                &transaction,
                "checkout cancelled while polling; resume with check_status and the transaction id",
            )),
        }
    }

    /// Status-only re-entry: pick up an existing carrier transaction by id
    /// without re-running quote or purchase.
    pub async fn check_status(
        &self,
        transaction_id: &str,
        options: &CheckoutOptions,
    ) -> Result<PurchaseResult, FlowError> {
        let mut transaction = PurchaseTransaction::resume(transaction_id);
        transaction.state = PurchaseState::Polling;

        let outcome = self.poll_bounded(&mut transaction, options).await;
        match outcome {
            PollEnd::Finished(Ok(())) => {
                let message = outcome_message(&transaction);
                Ok(PurchaseResult::from_transaction(&transaction, message))
            }
            PollEnd::Finished(Err(source)) => Err(flow_error(&transaction, source)),
            PollEnd::TimedOut => Ok(PurchaseResult::from_transaction(
                &transaction,
                "status check cancelled; try again with the same transaction id",
            )),
        }
    }

    async fn poll_bounded(
        &self,
        transaction: &mut PurchaseTransaction,
        options: &CheckoutOptions,
    ) -> PollEnd {
        match options.timeout {
            Some(limit) => {
                match tokio::time::timeout(limit, self.poll(transaction, options)).await {
                    Ok(result) => PollEnd::Finished(result),
                    Err(_) => PollEnd::TimedOut,
                }
            }
            None => PollEnd::Finished(self.poll(transaction, options).await),
        }
    }

    async fn poll(
        &self,
        transaction: &mut PurchaseTransaction,
        options: &CheckoutOptions,
    ) -> Result<(), CheckoutError> {
        let Some(transaction_id) = transaction.transaction_id.clone() else {
            return Err(CheckoutError::Status {
                status: None,
                body: "no transaction id available to poll".to_string(),
            });
        };

        if !options.initial_poll_delay.is_zero() {
            sleep(options.initial_poll_delay).await;
        }

        let mut attempt: u32 = 0;
        while attempt < options.max_poll_attempts {
            transaction.poll_attempts = attempt + 1;
            match self.api.status(&transaction_id).await {
                Ok(response) => {
                    transaction.payment_status = response.payment_status.clone();
                    transaction.order_status = response.order_status.clone();

                    if let Some(url) = response.payment_url {
                        // The payment URL is the actionable artifact; surface
                        // it immediately instead of waiting for a terminal
                        // payment status.
                        transaction.payment_url = Some(url);
                        transaction.payment_url_expiry = response.payment_url_expiry;
                        transaction.state = PurchaseState::Completed;
                        return Ok(());
                    }
                    if response.is_terminal_success() {
                        transaction.state = PurchaseState::Completed;
                        return Ok(());
                    }
                    if response.is_terminal_failure() {
                        transaction.state = PurchaseState::Failed;
                        return Ok(());
                    }

                    attempt += 1;
                    if attempt < options.max_poll_attempts {
                        sleep(options.poll_interval).await;
                    }
                }
                Err(error) if error.is_not_found() => return Err(error),
                Err(error) => {
                    attempt += 1;
                    let delay = backoff_delay(options, attempt);
                    warn!(
                        attempt,
                        max_poll_attempts = options.max_poll_attempts,
                        error = %error,
                        "status poll failed, backing off"
                    );
                    if attempt < options.max_poll_attempts {
                        sleep(delay).await;
                    }
                }
            }
        }

        // Attempt budget exhausted without a terminal status. The purchase
        // exists; the caller is told to check back, not that it failed.
        transaction.state = PurchaseState::PollingTimeout;
        Ok(())
    }

    async fn validate_and_build(
        &self,
        payload: &CheckoutPayload,
        client_account_id: &str,
    ) -> Result<TransactionRequest, CheckoutError> {
        let mut violations = Vec::new();

        for field in payload.shipping_address.missing_fields() {
            violations
                .push(FieldViolation::new(format!("shipping_address.{field}"), "must not be empty"));
        }

        if payload.cart.lines.is_empty() {
            violations.push(FieldViolation::new("cart", "cart has no lines"));
        }

        let mut line_items = Vec::new();
        for line in &payload.cart.lines {
            let label = format!("cart.line_{}", line.line_number);

            if line.device.is_some() {
                violations.push(FieldViolation::new(
                    format!("{label}.device"),
                    "this checkout sells plan-only line items; a device cannot be included",
                ));
            }

            let sim_type = match &line.sim {
                Some(sim) => Some(sim),
                None => {
                    violations
                        .push(FieldViolation::new(format!("{label}.sim"), "line has no SIM type"));
                    None
                }
            };

            let plan_name = match &line.plan {
                Some(plan) => match self.catalog.plan_display_name(&plan.id).await {
                    Some(name) => Some(strip_data_annotation(&name)),
                    None => {
                        violations.push(FieldViolation::new(
                            format!("{label}.plan"),
                            format!("plan `{}` is not in the catalog", plan.id),
                        ));
                        None
                    }
                },
                None => {
                    violations
                        .push(FieldViolation::new(format!("{label}.plan"), "line has no plan"));
                    None
                }
            };

            if let (Some(sim), Some(plan_name)) = (sim_type, plan_name) {
                line_items.push(LineItemPayload {
                    line_number: line.line_number,
                    plan_name,
                    sim_type: sim.sim_type.as_str().to_string(),
                    sim_icc_id: sim.icc_id.clone(),
                });
            }
        }

        if !violations.is_empty() {
            return Err(CheckoutError::Validation { violations });
        }

        let address = &payload.shipping_address;
        let state_code = normalize_state_code(&address.state)
            .map(str::to_string)
            .unwrap_or_else(|| address.state.clone());

        Ok(TransactionRequest {
            client_account_id: client_account_id.to_string(),
            tenant: self.tenant.clone(),
            collection_amount: Decimal::ZERO,
            shipping_address: AddressPayload {
                first_name: address.first_name.clone(),
                last_name: address.last_name.clone(),
                street: address.street.clone(),
                city: address.city.clone(),
                state_code,
                postal_code: address.postal_code.clone(),
                country: address.country.clone(),
                contact_phone: address.contact_phone.clone(),
            },
            line_items,
        })
    }
}

fn flow_error(transaction: &PurchaseTransaction, source: CheckoutError) -> FlowError {
    FlowError::new(transaction.state, source)
        .with_ids(transaction.client_account_id.clone(), transaction.transaction_id.clone())
}

fn backoff_delay(options: &CheckoutOptions, attempt: u32) -> Duration {
    let exponent = attempt.min(16);
    let multiplier = 1_u32 << exponent;
    options.poll_interval.saturating_mul(multiplier).min(options.max_backoff_delay)
}

fn outcome_message(transaction: &PurchaseTransaction) -> &'static str {
    match transaction.state {
        PurchaseState::Completed if transaction.payment_url.is_some() => {
            "payment link ready; share it with the customer"
        }
        PurchaseState::Completed => "order completed",
        PurchaseState::Failed => "the carrier reported the purchase as failed",
        PurchaseState::PollingTimeout => {
            "purchase created but not final yet; check again later with the transaction id"
        }
        _ => "purchase in progress",
    }
}
