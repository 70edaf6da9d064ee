use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use lineup_carrier::{CarrierApi, CheckoutOptions, FlowError, PlanCatalog, PurchaseOrchestrator};
use lineup_core::assignment::{resolve_line_assignment, ItemKind, LineAssignment};
use lineup_core::domain::cart::{CartItem, CartSim};
use lineup_core::domain::context::{ContextUpdate, ConversationEntry, FlowContext, Line, SimType};
use lineup_core::domain::purchase::{CheckoutPayload, PurchaseResult, ShippingAddress};
use lineup_core::gate::{self, FlowAction, GateDecision};
use lineup_core::normalize::normalize_sim_type;
use lineup_db::SessionRepository;

use crate::context::{FlowContextManager, ManagerError};

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("action blocked by gate: {:?}", .decision.gate_code)]
    Blocked { decision: GateDecision },
    #[error("unknown {kind:?} `{item_id}`")]
    UnknownItem { kind: ItemKind, item_id: String },
    #[error("a transaction id is required")]
    MissingTransactionId,
    #[error(transparent)]
    Manager(#[from] ManagerError),
    #[error(transparent)]
    Flow(#[from] FlowError),
}

/// Read-only lookup for purchasable items. Mirrors the external
/// plan/device/offer fetchers; the static variant backs tests and the
/// smoke flow.
#[async_trait]
pub trait ItemCatalog: Send + Sync {
    async fn item(&self, kind: ItemKind, item_id: &str) -> Option<CartItem>;
}

#[derive(Default)]
pub struct StaticItemCatalog {
    items: HashMap<(ItemKind, String), CartItem>,
}

impl StaticItemCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_item(
        mut self,
        kind: ItemKind,
        item_id: impl Into<String>,
        name: impl Into<String>,
        price: Decimal,
    ) -> Self {
        let item_id = item_id.into();
        self.items.insert(
            (kind, item_id.clone()),
            CartItem { id: item_id, name: name.into(), price },
        );
        self
    }
}

#[async_trait]
impl ItemCatalog for StaticItemCatalog {
    async fn item(&self, kind: ItemKind, item_id: &str) -> Option<CartItem> {
        self.items.get(&(kind, item_id.to_string())).cloned()
    }
}

#[derive(Clone, Debug)]
pub struct AssignItemRequest {
    pub session_id: String,
    pub kind: ItemKind,
    pub item_id: String,
    pub requested_line: Option<usize>,
    pub sim_type: Option<SimType>,
    pub sim_icc_id: Option<String>,
}

impl AssignItemRequest {
    pub fn new(session_id: impl Into<String>, kind: ItemKind, item_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            kind,
            item_id: item_id.into(),
            requested_line: None,
            sim_type: None,
            sim_icc_id: None,
        }
    }

    pub fn on_line(mut self, line: usize) -> Self {
        self.requested_line = Some(line);
        self
    }
}

#[derive(Clone, Debug)]
pub struct AssignItemOutcome {
    pub assignment: LineAssignment,
    pub context: FlowContext,
    pub cart_total: Decimal,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LineProgress {
    pub line_number: usize,
    pub plan_id: Option<String>,
    pub device_id: Option<String>,
    pub protection_id: Option<String>,
    pub sim_type: Option<SimType>,
    pub summary: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FlowProgress {
    pub session_id: String,
    pub line_count: usize,
    pub lines: Vec<LineProgress>,
    pub cart_total: Decimal,
    pub ready_for_checkout: bool,
    pub next_step: Option<String>,
}

enum AssignPayload {
    Priced(CartItem),
    Sim(SimType, Option<String>),
}

/// The tool-call surface: one method per exposed operation, each
/// synchronous from the caller's perspective apart from the polling call.
pub struct FlowToolService<R, A, C, I> {
    manager: FlowContextManager<R>,
    orchestrator: PurchaseOrchestrator<A, C>,
    items: I,
    defaults: CheckoutOptions,
}

impl<R, A, C, I> FlowToolService<R, A, C, I>
where
    R: SessionRepository,
    A: CarrierApi,
    C: PlanCatalog,
    I: ItemCatalog,
{
    pub fn new(
        manager: FlowContextManager<R>,
        orchestrator: PurchaseOrchestrator<A, C>,
        items: I,
    ) -> Self {
        Self { manager, orchestrator, items, defaults: CheckoutOptions::default() }
    }

    pub fn with_default_options(mut self, defaults: CheckoutOptions) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn manager(&self) -> &FlowContextManager<R> {
        &self.manager
    }

    pub async fn set_line_count(
        &self,
        session_id: &str,
        count: usize,
    ) -> Result<FlowContext, ToolError> {
        let context = self
            .manager
            .update(
                session_id,
                ContextUpdate {
                    line_count: Some(count),
                    last_action: Some("set_line_count".to_string()),
                    ..ContextUpdate::default()
                },
            )
            .await?;
        info!(session_id, count, "line count set");
        Ok(context)
    }

    pub async fn assign_item_to_line(
        &self,
        request: AssignItemRequest,
    ) -> Result<AssignItemOutcome, ToolError> {
        let payload = match request.kind {
            // For SIM assignments the item id is the raw sim-type mention
            // from the conversation ("esim", "physical", "sim card").
            ItemKind::Sim => AssignPayload::Sim(
                request
                    .sim_type
                    .or_else(|| normalize_sim_type(&request.item_id))
                    .unwrap_or(SimType::Esim),
                request.sim_icc_id.clone(),
            ),
            kind => {
                let item = self.items.item(kind, &request.item_id).await.ok_or_else(|| {
                    ToolError::UnknownItem { kind, item_id: request.item_id.clone() }
                })?;
                AssignPayload::Priced(item)
            }
        };

        let kind = request.kind;
        let item_id = request.item_id.clone();
        let requested_line = request.requested_line;

        let outcome = self
            .manager
            .with_session(&request.session_id, move |context, cart| {
                let assignment = resolve_line_assignment(context, kind, requested_line);
                let Some(target) = assignment.target_line else {
                    return Ok(AssignItemOutcome {
                        assignment,
                        context: context.clone(),
                        cart_total: cart.total,
                    });
                };

                match (&payload, kind) {
                    (AssignPayload::Priced(item), ItemKind::Plan) => {
                        context.assign_plan(target, item_id.as_str())?;
                        cart.set_plan(target, item.clone());
                    }
                    (AssignPayload::Priced(item), ItemKind::Device) => {
                        context.assign_device(target, item_id.as_str())?;
                        cart.set_device(target, item.clone());
                    }
                    (AssignPayload::Priced(item), ItemKind::Protection) => {
                        context.assign_protection(target, item_id.as_str())?;
                        cart.set_protection(target, item.clone());
                    }
                    (AssignPayload::Sim(sim_type, icc_id), _) => {
                        context.assign_sim(target, *sim_type, icc_id.clone())?;
                        cart.set_sim(
                            target,
                            CartSim { sim_type: *sim_type, icc_id: icc_id.clone() },
                        );
                    }
                    // A priced payload is only ever built for the three
                    // priced kinds above.
                    (AssignPayload::Priced(_), ItemKind::Sim) => {}
                }

                context.last_action = Some(kind_key(kind).to_string());
                context.record_history(ConversationEntry {
                    intent: kind_key(kind).to_string(),
                    action: "assigned".to_string(),
                    timestamp: Utc::now(),
                    data: serde_json::json!({ "line": target, "item": item_id }),
                });

                Ok(AssignItemOutcome {
                    assignment,
                    context: context.clone(),
                    cart_total: cart.total,
                })
            })
            .await?;

        Ok(outcome)
    }

    pub async fn get_flow_progress(&self, session_id: &str) -> Result<FlowProgress, ToolError> {
        let context = self.manager.get_or_create(session_id).await?;
        let cart = self
            .manager
            .repository()
            .load_cart(session_id)
            .await
            .map_err(ManagerError::from)?;

        let decision = gate::check_prerequisites(&context, FlowAction::Checkout);
        let lines = context.lines.iter().map(line_progress).collect();

        Ok(FlowProgress {
            session_id: context.session_id.clone(),
            line_count: context.line_count,
            lines,
            cart_total: cart.map(|cart| cart.total).unwrap_or(Decimal::ZERO),
            ready_for_checkout: decision.allowed,
            next_step: decision.reason,
        })
    }

    pub async fn check_prerequisites(
        &self,
        session_id: &str,
        action: FlowAction,
    ) -> Result<GateDecision, ToolError> {
        let context = self.manager.get_or_create(session_id).await?;
        Ok(gate::check_prerequisites(&context, action))
    }

    /// Runs the full quote → purchase → status workflow over the session's
    /// stored cart. The session lock is held only to snapshot state before
    /// the carrier calls and to record the outcome afterwards, never across
    /// the polling waits.
    pub async fn start_checkout(
        &self,
        session_id: &str,
        shipping_address: ShippingAddress,
        options: Option<CheckoutOptions>,
    ) -> Result<PurchaseResult, ToolError> {
        let (context, cart) = self
            .manager
            .with_session(session_id, |context, cart| Ok((context.clone(), cart.clone())))
            .await?;

        let decision = gate::check_prerequisites(&context, FlowAction::Checkout);
        if !decision.allowed {
            return Err(ToolError::Blocked { decision });
        }

        let payload =
            CheckoutPayload { session_id: session_id.to_string(), shipping_address, cart };
        let options = options.unwrap_or_else(|| self.defaults.clone());

        match self.orchestrator.start_checkout(&payload, &options).await {
            Ok(result) => {
                self.record_checkout_outcome(
                    session_id,
                    serde_json::json!({
                        "state": result.state,
                        "transaction_id": result.transaction_id,
                        "poll_attempts": result.poll_attempts,
                    }),
                )
                .await;
                Ok(result)
            }
            Err(flow_error) => {
                self.record_checkout_outcome(
                    session_id,
                    serde_json::json!({
                        "state": flow_error.state,
                        "transaction_id": flow_error.transaction_id,
                        "error": flow_error.to_string(),
                    }),
                )
                .await;
                Err(flow_error.into())
            }
        }
    }

    pub async fn check_status(&self, transaction_id: &str) -> Result<PurchaseResult, ToolError> {
        if transaction_id.trim().is_empty() {
            return Err(ToolError::MissingTransactionId);
        }
        let result =
            self.orchestrator.check_status(transaction_id, &CheckoutOptions::status_only()).await?;
        Ok(result)
    }

    async fn record_checkout_outcome(&self, session_id: &str, data: serde_json::Value) {
        let recorded = self
            .manager
            .with_session(session_id, |context, _cart| {
                context.last_action = Some("checkout".to_string());
                context.record_history(ConversationEntry {
                    intent: "checkout".to_string(),
                    action: "checkout_attempted".to_string(),
                    timestamp: Utc::now(),
                    data,
                });
                Ok(())
            })
            .await;
        if let Err(error) = recorded {
            // Bookkeeping must not mask the checkout outcome.
            warn!(session_id, %error, "failed to record checkout history");
        }
    }
}

fn kind_key(kind: ItemKind) -> &'static str {
    match kind {
        ItemKind::Plan => "add_plan",
        ItemKind::Device => "add_device",
        ItemKind::Protection => "add_protection",
        ItemKind::Sim => "select_sim",
    }
}

fn line_progress(line: &Line) -> LineProgress {
    let plan = line.plan_id.as_deref().unwrap_or("no plan");
    let device = line.device_id.as_deref().unwrap_or("no device");
    let sim = line.sim_type.map(|sim| sim.as_str()).unwrap_or("no SIM");
    let protection = if line.protection_selected { ", protected" } else { "" };
    LineProgress {
        line_number: line.line_number,
        plan_id: line.plan_id.clone(),
        device_id: line.device_id.clone(),
        protection_id: line.protection_id.clone(),
        sim_type: line.sim_type,
        summary: format!("Line {}: {plan}, {device}, {sim}{protection}", line.line_number),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use rust_decimal::Decimal;

    use lineup_carrier::{
        CarrierApi, CheckoutError, PurchaseOrchestrator, PurchaseResponse, QuoteResponse,
        StaticPlanCatalog, StatusResponse, TransactionRequest,
    };
    use lineup_core::assignment::{ItemKind, NO_DEVICE_FOR_PROTECTION};
    use lineup_core::gate::{FlowAction, GateCode};
    use lineup_db::InMemorySessionRepository;

    use crate::context::FlowContextManager;

    use super::{AssignItemRequest, FlowToolService, StaticItemCatalog, ToolError};

    /// Carrier double that is never expected to be reached.
    struct UnreachableCarrier;

    #[async_trait]
    impl CarrierApi for UnreachableCarrier {
        async fn quote(&self, _: &TransactionRequest) -> Result<QuoteResponse, CheckoutError> {
            Err(CheckoutError::Quote { status: None, body: "unexpected call".to_string() })
        }

        async fn purchase(
            &self,
            _: &TransactionRequest,
        ) -> Result<PurchaseResponse, CheckoutError> {
            Err(CheckoutError::Purchase { status: None, body: "unexpected call".to_string() })
        }

        async fn status(&self, _: &str) -> Result<StatusResponse, CheckoutError> {
            Err(CheckoutError::Status { status: None, body: "unexpected call".to_string() })
        }
    }

    fn service() -> FlowToolService<
        InMemorySessionRepository,
        UnreachableCarrier,
        StaticPlanCatalog,
        StaticItemCatalog,
    > {
        let manager = FlowContextManager::new(Arc::new(InMemorySessionRepository::default()));
        let orchestrator =
            PurchaseOrchestrator::new(UnreachableCarrier, StaticPlanCatalog::new(), "acme-mobile");
        let items = StaticItemCatalog::new()
            .with_item(ItemKind::Plan, "plan-unlimited", "Unlimited Plus", Decimal::new(7_000, 2))
            .with_item(ItemKind::Device, "device-a54", "Galaxy A54", Decimal::new(44_900, 2))
            .with_item(ItemKind::Protection, "prot-full", "Full Cover", Decimal::new(1_500, 2));
        FlowToolService::new(manager, orchestrator, items)
    }

    #[tokio::test]
    async fn plan_assignment_updates_context_and_cart_together() {
        let service = service();
        service.set_line_count("s-1", 2).await.expect("line count");

        let outcome = service
            .assign_item_to_line(AssignItemRequest::new("s-1", ItemKind::Plan, "plan-unlimited"))
            .await
            .expect("assign");

        assert_eq!(outcome.assignment.target_line, Some(1));
        assert!(outcome.context.plan_selected);
        assert_eq!(outcome.cart_total, Decimal::new(7_000, 2));
    }

    #[tokio::test]
    async fn unknown_items_are_rejected_before_any_mutation() {
        let service = service();
        service.set_line_count("s-1", 1).await.expect("line count");

        let error = service
            .assign_item_to_line(AssignItemRequest::new("s-1", ItemKind::Plan, "plan-nope"))
            .await
            .expect_err("item is unknown");
        assert!(matches!(error, ToolError::UnknownItem { .. }));

        let progress = service.get_flow_progress("s-1").await.expect("progress");
        assert_eq!(progress.cart_total, Decimal::ZERO);
    }

    #[tokio::test]
    async fn protection_without_a_device_is_a_structured_rejection() {
        let service = service();
        service.set_line_count("s-1", 1).await.expect("line count");

        let outcome = service
            .assign_item_to_line(AssignItemRequest::new("s-1", ItemKind::Protection, "prot-full"))
            .await
            .expect("resolver rejects without raising");

        assert_eq!(outcome.assignment.target_line, None);
        assert_eq!(outcome.assignment.reason, Some(NO_DEVICE_FOR_PROTECTION));
    }

    #[tokio::test]
    async fn progress_reflects_gate_readiness() {
        let service = service();
        service.set_line_count("s-1", 1).await.expect("line count");

        let before = service.get_flow_progress("s-1").await.expect("progress");
        assert!(!before.ready_for_checkout);
        assert!(before.next_step.is_some());

        service
            .assign_item_to_line(AssignItemRequest::new("s-1", ItemKind::Plan, "plan-unlimited"))
            .await
            .expect("assign");

        let after = service.get_flow_progress("s-1").await.expect("progress");
        assert!(after.ready_for_checkout);
        assert_eq!(after.lines.len(), 1);
        assert!(after.lines[0].summary.contains("plan-unlimited"));
    }

    #[tokio::test]
    async fn checkout_before_configuration_is_blocked_by_the_gate() {
        let service = service();
        let error = service
            .start_checkout("s-1", Default::default(), None)
            .await
            .expect_err("nothing configured");

        let ToolError::Blocked { decision } = error else {
            panic!("expected a gate block");
        };
        assert_eq!(decision.gate_code, GateCode::NeedLines);
    }

    #[tokio::test]
    async fn blank_transaction_id_is_rejected() {
        let service = service();
        let error = service.check_status("   ").await.expect_err("blank id");
        assert!(matches!(error, ToolError::MissingTransactionId));
    }

    #[tokio::test]
    async fn explicit_line_request_is_clamped_and_honored() {
        let service = service();
        service.set_line_count("s-1", 2).await.expect("line count");

        let outcome = service
            .assign_item_to_line(
                AssignItemRequest::new("s-1", ItemKind::Plan, "plan-unlimited").on_line(9),
            )
            .await
            .expect("assign clamps");

        assert_eq!(outcome.assignment.target_line, Some(2));
        assert!(outcome.assignment.suggestion.is_some());
        assert!(outcome.context.lines[1].plan_selected);
    }

    #[tokio::test]
    async fn sim_assignment_normalizes_the_raw_mention() {
        let service = service();
        service.set_line_count("s-1", 1).await.expect("line count");
        service
            .assign_item_to_line(AssignItemRequest::new("s-1", ItemKind::Plan, "plan-unlimited"))
            .await
            .expect("assign plan");

        let outcome = service
            .assign_item_to_line(AssignItemRequest::new("s-1", ItemKind::Sim, "physical"))
            .await
            .expect("assign sim");

        assert_eq!(outcome.assignment.target_line, Some(1));
        assert_eq!(
            outcome.context.lines[0].sim_type,
            Some(lineup_core::domain::context::SimType::Physical)
        );
    }

    #[tokio::test]
    async fn prerequisite_check_surface_matches_the_gate() {
        let service = service();
        service.set_line_count("s-1", 1).await.expect("line count");

        let decision = service
            .check_prerequisites("s-1", FlowAction::AddProtection)
            .await
            .expect("check");
        assert_eq!(decision.gate_code, GateCode::NeedDevice);

        service
            .assign_item_to_line(AssignItemRequest::new("s-1", ItemKind::Device, "device-a54"))
            .await
            .expect("assign device");

        let decision = service
            .check_prerequisites("s-1", FlowAction::AddProtection)
            .await
            .expect("check");
        assert!(decision.allowed);
    }
}
