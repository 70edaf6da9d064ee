use lineup_core::domain::context::FlowContext;
use lineup_core::gate::{check_prerequisites, FlowAction, GateCode, GateDecision};

use crate::intent::{ClassifiedIntent, Intent};

/// Where to steer the conversation when the requested action is not
/// currently possible.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Redirect {
    pub gate_code: GateCode,
    pub prompt: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoutedAction {
    pub action: Option<FlowAction>,
    pub decision: GateDecision,
    pub redirect: Option<Redirect>,
}

/// Maps a classified intent plus the current flow context onto a target
/// action, consulting the prerequisite gate. Blocked actions become
/// conversational redirects instead of errors.
#[derive(Clone, Debug, Default)]
pub struct Router;

impl Router {
    pub fn new() -> Self {
        Self
    }

    pub fn route(&self, classified: &ClassifiedIntent, context: &FlowContext) -> RoutedAction {
        let action = match classified.intent {
            Intent::SetLineCount => FlowAction::SetLineCount,
            Intent::AddPlan => FlowAction::AddPlan,
            Intent::AddDevice => FlowAction::AddDevice,
            Intent::AddProtection => FlowAction::AddProtection,
            Intent::SelectSim => FlowAction::SelectSim,
            Intent::Checkout => FlowAction::Checkout,
            Intent::CheckStatus => FlowAction::CheckStatus,
            Intent::Unknown => {
                let decision = GateDecision::blocked(
                    GateCode::Other,
                    "I did not recognize that request.",
                    Vec::new(),
                );
                let redirect = Redirect {
                    gate_code: GateCode::Other,
                    prompt: "I can set up lines, add plans or devices, pick SIM types, and check out."
                        .to_string(),
                };
                return RoutedAction { action: None, decision, redirect: Some(redirect) };
            }
        };

        let decision = check_prerequisites(context, action);
        let redirect = (!decision.allowed).then(|| Redirect {
            gate_code: decision.gate_code,
            prompt: redirect_prompt(&decision),
        });

        RoutedAction { action: Some(action), decision, redirect }
    }
}

fn redirect_prompt(decision: &GateDecision) -> String {
    let reason = decision.reason.clone().unwrap_or_else(|| "That is not possible yet.".to_string());
    if decision.missing.is_empty() {
        reason
    } else {
        format!("{reason} Still needed: {}.", decision.missing.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use lineup_core::domain::context::FlowContext;
    use lineup_core::gate::{FlowAction, GateCode};

    use crate::intent::{ClassifiedIntent, Intent};

    use super::Router;

    fn classified(intent: Intent) -> ClassifiedIntent {
        ClassifiedIntent { intent, entities: BTreeMap::new() }
    }

    #[test]
    fn allowed_intent_routes_straight_through() {
        let mut context = FlowContext::new("s-1");
        context.set_line_count(1);
        context.assign_plan(1, "plan-basic").expect("assign plan");

        let routed = Router::new().route(&classified(Intent::Checkout), &context);
        assert_eq!(routed.action, Some(FlowAction::Checkout));
        assert!(routed.decision.allowed);
        assert!(routed.redirect.is_none());
    }

    #[test]
    fn blocked_checkout_redirects_with_the_missing_pieces() {
        let mut context = FlowContext::new("s-1");
        context.set_line_count(2);
        context.assign_plan(1, "plan-basic").expect("assign plan");

        let routed = Router::new().route(&classified(Intent::Checkout), &context);
        assert!(!routed.decision.allowed);
        let redirect = routed.redirect.expect("redirect expected");
        assert_eq!(redirect.gate_code, GateCode::NeedPlans);
        assert!(redirect.prompt.contains("Line 2"));
    }

    #[test]
    fn protection_without_devices_redirects_to_devices() {
        let mut context = FlowContext::new("s-1");
        context.set_line_count(1);

        let routed = Router::new().route(&classified(Intent::AddProtection), &context);
        let redirect = routed.redirect.expect("redirect expected");
        assert_eq!(redirect.gate_code, GateCode::NeedDevice);
    }

    #[test]
    fn unknown_intent_redirects_with_capabilities() {
        let context = FlowContext::new("s-1");
        let routed = Router::new().route(&classified(Intent::Unknown), &context);

        assert_eq!(routed.action, None);
        assert_eq!(routed.decision.gate_code, GateCode::Other);
        assert!(routed.redirect.expect("redirect").prompt.contains("check out"));
    }

    #[test]
    fn routing_is_pure_with_respect_to_the_context() {
        let context = FlowContext::new("s-1");
        let before = context.clone();
        let _ = Router::new().route(&classified(Intent::Checkout), &context);
        assert_eq!(context, before);
    }
}
