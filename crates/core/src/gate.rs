use serde::{Deserialize, Serialize};

use crate::domain::context::FlowContext;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowAction {
    SetLineCount,
    AddPlan,
    AddDevice,
    AddProtection,
    SelectSim,
    Checkout,
    CheckStatus,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GateCode {
    Ok,
    NeedLines,
    NeedPlans,
    NeedSim,
    NeedDevice,
    Other,
}

/// Structured allow/deny outcome. The gate never raises; a blocked action
/// carries the reason and the missing pieces so the caller can redirect
/// conversationally.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateDecision {
    pub allowed: bool,
    pub reason: Option<String>,
    pub missing: Vec<String>,
    pub gate_code: GateCode,
}

impl GateDecision {
    pub fn ok() -> Self {
        Self { allowed: true, reason: None, missing: Vec::new(), gate_code: GateCode::Ok }
    }

    pub fn blocked(gate_code: GateCode, reason: impl Into<String>, missing: Vec<String>) -> Self {
        Self { allowed: false, reason: Some(reason.into()), missing, gate_code }
    }
}

/// Decide whether `action` is currently permitted given `context`.
///
/// Pure and side-effect free; calling it twice with no intervening mutation
/// yields identical results. For checkout the first violated condition wins,
/// in strict priority order: lines, then plans, then SIM types.
pub fn check_prerequisites(context: &FlowContext, action: FlowAction) -> GateDecision {
    match action {
        FlowAction::Checkout => check_checkout(context),
        // Device browsing is never blocked.
        FlowAction::AddDevice => GateDecision::ok(),
        FlowAction::AddProtection => check_add_protection(context),
        FlowAction::SelectSim => check_select_sim(context),
        FlowAction::SetLineCount | FlowAction::AddPlan | FlowAction::CheckStatus => {
            GateDecision::ok()
        }
    }
}

fn check_checkout(context: &FlowContext) -> GateDecision {
    if context.line_count == 0 {
        return GateDecision::blocked(
            GateCode::NeedLines,
            "Set how many lines you need before checking out.",
            vec!["line count".to_string()],
        );
    }

    let lines_without_plan = context
        .lines
        .iter()
        .filter(|line| !line.plan_selected)
        .map(|line| format!("Line {}", line.line_number))
        .collect::<Vec<_>>();
    if !lines_without_plan.is_empty() {
        return GateDecision::blocked(
            GateCode::NeedPlans,
            "Every line needs a plan before checkout.",
            lines_without_plan,
        );
    }

    let lines_without_sim = context
        .lines
        .iter()
        .filter(|line| line.sim_type.is_none())
        .map(|line| format!("Line {}", line.line_number))
        .collect::<Vec<_>>();
    if !lines_without_sim.is_empty() {
        return GateDecision::blocked(
            GateCode::NeedSim,
            "Every line needs a SIM type before checkout.",
            lines_without_sim,
        );
    }

    GateDecision::ok()
}

fn check_add_protection(context: &FlowContext) -> GateDecision {
    let has_device = context.lines.iter().any(|line| line.device_selected);
    if context.line_count == 0 || !has_device {
        return GateDecision::blocked(
            GateCode::NeedDevice,
            "Protection covers a device; add a device to a line first.",
            vec!["device".to_string()],
        );
    }
    GateDecision::ok()
}

fn check_select_sim(context: &FlowContext) -> GateDecision {
    if context.line_count == 0 {
        return GateDecision::blocked(
            GateCode::NeedPlans,
            "Pick a plan for at least one line before choosing SIM types.",
            vec!["line count".to_string()],
        );
    }
    GateDecision::ok()
}

#[cfg(test)]
mod tests {
    use crate::domain::context::{FlowContext, SimType};

    use super::{check_prerequisites, FlowAction, GateCode};

    fn context_with_lines(count: usize) -> FlowContext {
        let mut context = FlowContext::new("s-1");
        context.set_line_count(count);
        context
    }

    #[test]
    fn checkout_with_no_lines_needs_lines() {
        let context = FlowContext::new("s-1");
        let decision = check_prerequisites(&context, FlowAction::Checkout);
        assert!(!decision.allowed);
        assert_eq!(decision.gate_code, GateCode::NeedLines);
    }

    #[test]
    fn checkout_with_partial_plans_lists_every_missing_line() {
        // Scenario A: two lines, only line 1 has a plan.
        let mut context = context_with_lines(2);
        context.assign_plan(1, "plan-unlimited").expect("assign plan");

        let decision = check_prerequisites(&context, FlowAction::Checkout);
        assert!(!decision.allowed);
        assert_eq!(decision.gate_code, GateCode::NeedPlans);
        assert_eq!(decision.missing, vec!["Line 2".to_string()]);
    }

    #[test]
    fn checkout_with_plans_and_sims_everywhere_is_allowed() {
        // Scenario B: both lines fully configured.
        let mut context = context_with_lines(2);
        context.assign_plan(1, "plan-unlimited").expect("assign plan");
        context.assign_plan(2, "plan-basic").expect("assign plan");

        let decision = check_prerequisites(&context, FlowAction::Checkout);
        assert!(decision.allowed);
        assert_eq!(decision.gate_code, GateCode::Ok);
        assert!(decision.missing.is_empty());
    }

    #[test]
    fn missing_plans_outrank_missing_sims() {
        // Both violations present: gate must report NEED_PLANS, never NEED_SIM.
        let mut context = context_with_lines(2);
        context.assign_plan(1, "plan-unlimited").expect("assign plan");
        context.lines[0].sim_type = None;
        context.refresh_derived_flags();

        let decision = check_prerequisites(&context, FlowAction::Checkout);
        assert_eq!(decision.gate_code, GateCode::NeedPlans);
    }

    #[test]
    fn add_device_is_never_blocked() {
        let empty = FlowContext::new("s-1");
        assert!(check_prerequisites(&empty, FlowAction::AddDevice).allowed);

        let configured = context_with_lines(3);
        assert!(check_prerequisites(&configured, FlowAction::AddDevice).allowed);
    }

    #[test]
    fn protection_requires_a_device_somewhere() {
        let mut context = context_with_lines(2);
        let decision = check_prerequisites(&context, FlowAction::AddProtection);
        assert!(!decision.allowed);
        assert_eq!(decision.gate_code, GateCode::NeedDevice);

        context.assign_device(2, "device-a54").expect("assign device");
        assert!(check_prerequisites(&context, FlowAction::AddProtection).allowed);
    }

    #[test]
    fn select_sim_requires_configured_lines() {
        let context = FlowContext::new("s-1");
        let decision = check_prerequisites(&context, FlowAction::SelectSim);
        assert!(!decision.allowed);
        assert_eq!(decision.gate_code, GateCode::NeedPlans);

        let mut configured = context_with_lines(1);
        configured.assign_sim(1, SimType::Physical, None).expect("assign sim");
        assert!(check_prerequisites(&configured, FlowAction::SelectSim).allowed);
    }

    #[test]
    fn repeated_evaluation_is_idempotent() {
        let mut context = context_with_lines(2);
        context.assign_plan(1, "plan-unlimited").expect("assign plan");

        let first = check_prerequisites(&context, FlowAction::Checkout);
        let second = check_prerequisites(&context, FlowAction::Checkout);
        assert_eq!(first, second);
    }
}
