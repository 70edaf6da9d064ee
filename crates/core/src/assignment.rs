use serde::{Deserialize, Serialize};

use crate::domain::context::FlowContext;

pub const NO_DEVICE_FOR_PROTECTION: &str = "no_device_for_protection";

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Plan,
    Device,
    Protection,
    Sim,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineAssignment {
    pub target_line: Option<usize>,
    pub suggestion: Option<String>,
    pub needs_confirmation: bool,
    pub reason: Option<&'static str>,
}

impl LineAssignment {
    fn target(line: usize) -> Self {
        Self { target_line: Some(line), suggestion: None, needs_confirmation: false, reason: None }
    }

    fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    fn confirming(mut self) -> Self {
        self.needs_confirmation = true;
        self
    }

    fn rejected(reason: &'static str) -> Self {
        Self { target_line: None, suggestion: None, needs_confirmation: false, reason: Some(reason) }
    }
}

/// Choose which line an incoming item should attach to.
///
/// Deterministic: the heuristics below are evaluated only when the caller
/// did not name a line. An explicitly requested line is clamped to
/// `[1, line_count]` and corrected with a suggestion, never rejected. The
/// single hard error is protection with no device anywhere.
pub fn resolve_line_assignment(
    context: &FlowContext,
    kind: ItemKind,
    requested_line: Option<usize>,
) -> LineAssignment {
    if kind == ItemKind::Protection {
        let has_device = context.lines.iter().any(|line| line.device_selected);
        if !has_device {
            return LineAssignment::rejected(NO_DEVICE_FOR_PROTECTION);
        }
    }

    if let Some(requested) = requested_line {
        return clamp_requested(context, requested);
    }

    match kind {
        ItemKind::Plan => resolve_plan(context),
        ItemKind::Device => resolve_device(context),
        ItemKind::Protection => resolve_protection(context),
        ItemKind::Sim => resolve_sim(context),
    }
}

fn clamp_requested(context: &FlowContext, requested: usize) -> LineAssignment {
    if context.line_count == 0 {
        return LineAssignment::target(1)
            .with_suggestion("No lines are configured yet; starting with line 1.")
            .confirming();
    }
    if requested < 1 {
        return LineAssignment::target(1)
            .with_suggestion("Line numbers start at 1; using line 1.");
    }
    if requested > context.line_count {
        return LineAssignment::target(context.line_count).with_suggestion(format!(
            "This order only has {} line(s); using line {}.",
            context.line_count, context.line_count
        ));
    }
    LineAssignment::target(requested)
}

fn resolve_plan(context: &FlowContext) -> LineAssignment {
    if let Some(line) = context.lines.iter().find(|line| !line.plan_selected) {
        return LineAssignment::target(line.line_number);
    }
    if let Some(line) = context.lines.iter().find(|line| line.is_unconfigured()) {
        return LineAssignment::target(line.line_number);
    }
    LineAssignment::target(1)
        .with_suggestion("Every line already has a plan; this would replace the plan on line 1.")
        .confirming()
}

fn resolve_device(context: &FlowContext) -> LineAssignment {
    // Best fit: a line that already has a plan but no device yet.
    if let Some(line) =
        context.lines.iter().find(|line| line.plan_selected && !line.device_selected)
    {
        return LineAssignment::target(line.line_number);
    }
    if let Some(line) = context.lines.iter().find(|line| !line.device_selected) {
        return LineAssignment::target(line.line_number);
    }
    LineAssignment::target(1)
        .with_suggestion("Every line already has a device; this would replace the device on line 1.")
        .confirming()
}

fn resolve_protection(context: &FlowContext) -> LineAssignment {
    match context.lines.iter().find(|line| line.device_selected && !line.protection_selected) {
        Some(line) => LineAssignment::target(line.line_number),
        // Devices exist but all are covered already.
        None => LineAssignment::target(1)
            .with_suggestion("Every device already has protection; this would replace it on line 1.")
            .confirming(),
    }
}

// SIM type is implicit once a plan is attached (defaults to eSIM). This arm
// is kept for API compatibility and must never block a flow.
fn resolve_sim(context: &FlowContext) -> LineAssignment {
    let target = context
        .lines
        .iter()
        .find(|line| line.sim_type.is_none())
        .map(|line| line.line_number)
        .unwrap_or(1);
    LineAssignment::target(target)
        .with_suggestion("SIM type defaults to eSIM when a plan is attached.")
}

#[cfg(test)]
mod tests {
    use crate::domain::context::FlowContext;

    use super::{resolve_line_assignment, ItemKind, NO_DEVICE_FOR_PROTECTION};

    fn context_with_lines(count: usize) -> FlowContext {
        let mut context = FlowContext::new("s-1");
        context.set_line_count(count);
        context
    }

    #[test]
    fn plan_goes_to_first_line_without_one() {
        let mut context = context_with_lines(3);
        context.assign_plan(1, "plan-a").expect("assign plan");

        let assignment = resolve_line_assignment(&context, ItemKind::Plan, None);
        assert_eq!(assignment.target_line, Some(2));
        assert!(!assignment.needs_confirmation);
    }

    #[test]
    fn plan_fallback_to_line_one_needs_confirmation() {
        let mut context = context_with_lines(2);
        context.assign_plan(1, "plan-a").expect("assign plan");
        context.assign_plan(2, "plan-b").expect("assign plan");

        let assignment = resolve_line_assignment(&context, ItemKind::Plan, None);
        assert_eq!(assignment.target_line, Some(1));
        assert!(assignment.needs_confirmation);
        assert!(assignment.suggestion.is_some());
    }

    #[test]
    fn device_prefers_a_line_that_already_has_a_plan() {
        let mut context = context_with_lines(3);
        context.assign_plan(2, "plan-b").expect("assign plan");

        let assignment = resolve_line_assignment(&context, ItemKind::Device, None);
        assert_eq!(assignment.target_line, Some(2));
    }

    #[test]
    fn device_falls_back_to_first_line_without_one() {
        let mut context = context_with_lines(2);
        context.assign_device(1, "device-a").expect("assign device");

        let assignment = resolve_line_assignment(&context, ItemKind::Device, None);
        assert_eq!(assignment.target_line, Some(2));
    }

    #[test]
    fn protection_with_no_device_anywhere_is_a_hard_rejection() {
        // Scenario C: no device on any line.
        let context = context_with_lines(2);
        let assignment = resolve_line_assignment(&context, ItemKind::Protection, None);

        assert_eq!(assignment.target_line, None);
        assert_eq!(assignment.reason, Some(NO_DEVICE_FOR_PROTECTION));
    }

    #[test]
    fn protection_targets_first_uncovered_device() {
        let mut context = context_with_lines(3);
        context.assign_device(1, "device-a").expect("assign device");
        context.assign_device(3, "device-c").expect("assign device");
        context.assign_protection(1, "prot-a").expect("assign protection");

        let assignment = resolve_line_assignment(&context, ItemKind::Protection, None);
        assert_eq!(assignment.target_line, Some(3));
    }

    #[test]
    fn requested_line_above_range_is_clamped_with_a_suggestion() {
        let context = context_with_lines(2);
        let assignment = resolve_line_assignment(&context, ItemKind::Plan, Some(7));

        assert_eq!(assignment.target_line, Some(2));
        assert!(assignment.suggestion.as_deref().unwrap_or_default().contains("2 line"));
    }

    #[test]
    fn requested_line_zero_is_corrected_to_one() {
        let context = context_with_lines(2);
        let assignment = resolve_line_assignment(&context, ItemKind::Device, Some(0));
        assert_eq!(assignment.target_line, Some(1));
    }

    #[test]
    fn requested_line_in_range_is_honored_verbatim() {
        let context = context_with_lines(3);
        let assignment = resolve_line_assignment(&context, ItemKind::Plan, Some(2));
        assert_eq!(assignment.target_line, Some(2));
        assert!(assignment.suggestion.is_none());
    }

    #[test]
    fn sim_never_blocks_any_flow() {
        let empty = FlowContext::new("s-1");
        let assignment = resolve_line_assignment(&empty, ItemKind::Sim, None);
        assert!(assignment.target_line.is_some());
        assert!(assignment.reason.is_none());
    }
}
