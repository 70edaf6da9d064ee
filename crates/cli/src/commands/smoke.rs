//! In-memory end-to-end smoke: drives a scripted two-line order through
//! the real tool surface against a canned carrier, no network or disk.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;

use lineup_agent::{
    AssignItemRequest, FlowContextManager, FlowToolService, StaticItemCatalog,
};
use lineup_carrier::{
    CarrierApi, CheckoutError, CheckoutOptions, PurchaseOrchestrator, PurchaseResponse,
    QuoteResponse, StaticPlanCatalog, StatusResponse, TransactionRequest,
};
use lineup_core::assignment::ItemKind;
use lineup_core::domain::purchase::{PurchaseState, ShippingAddress};
use lineup_db::InMemorySessionRepository;

use crate::commands::CommandResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum SmokeStatus {
    Pass,
    Fail,
}

#[derive(Debug, Serialize)]
struct SmokeStep {
    name: &'static str,
    status: SmokeStatus,
    elapsed_ms: u64,
    message: String,
}

#[derive(Debug, Serialize)]
struct SmokeReport {
    command: &'static str,
    status: SmokeStatus,
    summary: String,
    total_elapsed_ms: u64,
    steps: Vec<SmokeStep>,
}

struct CannedCarrier {
    statuses: Mutex<Vec<StatusResponse>>,
}

#[async_trait]
impl CarrierApi for CannedCarrier {
    async fn quote(&self, _request: &TransactionRequest) -> Result<QuoteResponse, CheckoutError> {
        Ok(QuoteResponse {
            quote_id: Some("Q-SMOKE-1".to_string()),
            one_time_charge: Some(Decimal::new(11_000, 2)),
        })
    }

    async fn purchase(
        &self,
        _request: &TransactionRequest,
    ) -> Result<PurchaseResponse, CheckoutError> {
        Ok(PurchaseResponse {
            transaction_id: Some("txn-smoke-1".to_string()),
            status: Some("CREATED".to_string()),
        })
    }

    async fn status(&self, _transaction_id: &str) -> Result<StatusResponse, CheckoutError> {
        let next = self.statuses.lock().ok().and_then(|mut statuses| statuses.pop());
        Ok(next.unwrap_or_default())
    }
}

pub fn run() -> CommandResult {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult {
                exit_code: 1,
                output: format!("smoke: could not build async runtime: {error}"),
            };
        }
    };

    let report = runtime.block_on(drive_smoke());
    let exit_code = if report.status == SmokeStatus::Pass { 0 } else { 1 };
    let output = serde_json::to_string_pretty(&report)
        .unwrap_or_else(|error| format!("smoke serialization failed: {error}"));
    CommandResult { exit_code, output }
}

async fn drive_smoke() -> SmokeReport {
    let started = Instant::now();
    let mut steps = Vec::new();

    let carrier = CannedCarrier {
        statuses: Mutex::new(vec![StatusResponse {
            payment_status: Some("PENDING".to_string()),
            order_status: None,
            payment_url: Some("https://pay.carrier.example/smoke".to_string()),
            payment_url_expiry: None,
        }]),
    };
    let catalog = StaticPlanCatalog::new()
        .with_plan("plan-unlimited", "Unlimited Plus (50GB)")
        .with_plan("plan-basic", "Essentials (5GB)");
    let items = StaticItemCatalog::new()
        .with_item(ItemKind::Plan, "plan-unlimited", "Unlimited Plus", Decimal::new(7_000, 2))
        .with_item(ItemKind::Plan, "plan-basic", "Essentials", Decimal::new(4_000, 2));
    let manager = FlowContextManager::new(Arc::new(InMemorySessionRepository::default()));
    let orchestrator = PurchaseOrchestrator::new(carrier, catalog, "smoke-tenant");
    let service =
        FlowToolService::new(manager, orchestrator, items).with_default_options(CheckoutOptions {
            initial_poll_delay: Duration::from_millis(1),
            poll_interval: Duration::from_millis(1),
            max_poll_attempts: 3,
            ..CheckoutOptions::default()
        });

    let session = "smoke-session";

    let step_started = Instant::now();
    match service.set_line_count(session, 2).await {
        Ok(context) => steps.push(step(
            "set_line_count",
            SmokeStatus::Pass,
            step_started,
            format!("configured {} lines", context.line_count),
        )),
        Err(error) => {
            steps.push(step("set_line_count", SmokeStatus::Fail, step_started, error.to_string()));
            return finalize(steps, started);
        }
    }

    for plan_id in ["plan-unlimited", "plan-basic"] {
        let step_started = Instant::now();
        match service
            .assign_item_to_line(AssignItemRequest::new(session, ItemKind::Plan, plan_id))
            .await
        {
            Ok(outcome) => steps.push(step(
                "assign_plan",
                SmokeStatus::Pass,
                step_started,
                format!(
                    "{plan_id} -> line {}",
                    outcome.assignment.target_line.unwrap_or_default()
                ),
            )),
            Err(error) => {
                steps.push(step("assign_plan", SmokeStatus::Fail, step_started, error.to_string()));
                return finalize(steps, started);
            }
        }
    }

    let step_started = Instant::now();
    let shipping = ShippingAddress {
        first_name: "Smoke".to_string(),
        last_name: "Test".to_string(),
        street: "1 Test Way".to_string(),
        city: "Testville".to_string(),
        state: "CA".to_string(),
        postal_code: "94000".to_string(),
        country: "US".to_string(),
        contact_phone: "415-555-0100".to_string(),
    };
    match service.start_checkout(session, shipping, None).await {
        Ok(result) if result.state == PurchaseState::Completed => steps.push(step(
            "checkout",
            SmokeStatus::Pass,
            step_started,
            format!(
                "completed; payment url {}",
                result.payment_url.as_deref().unwrap_or("(none)")
            ),
        )),
        Ok(result) => steps.push(step(
            "checkout",
            SmokeStatus::Fail,
            step_started,
            format!("unexpected terminal state {:?}", result.state),
        )),
        Err(error) => {
            steps.push(step("checkout", SmokeStatus::Fail, step_started, error.to_string()));
        }
    }

    finalize(steps, started)
}

fn step(
    name: &'static str,
    status: SmokeStatus,
    step_started: Instant,
    message: String,
) -> SmokeStep {
    SmokeStep { name, status, elapsed_ms: step_started.elapsed().as_millis() as u64, message }
}

fn finalize(steps: Vec<SmokeStep>, started: Instant) -> SmokeReport {
    let all_pass = steps.iter().all(|step| step.status == SmokeStatus::Pass);
    SmokeReport {
        command: "smoke",
        status: if all_pass { SmokeStatus::Pass } else { SmokeStatus::Fail },
        summary: if all_pass {
            "smoke: scripted order flow completed".to_string()
        } else {
            "smoke: scripted order flow failed".to_string()
        },
        total_elapsed_ms: started.elapsed().as_millis() as u64,
        steps,
    }
}
