use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::ContextError;

pub const CONVERSATION_HISTORY_LIMIT: usize = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SimType {
    Esim,
    Physical,
}

impl SimType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Esim => "ESIM",
            Self::Physical => "PHYSICAL",
        }
    }
}

/// One phone-number slot in a multi-line order.
///
/// `line_number` is 1-based and always equals the line's index in
/// `FlowContext::lines` plus one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Line {
    pub line_number: usize,
    pub plan_selected: bool,
    pub plan_id: Option<String>,
    pub device_selected: bool,
    pub device_id: Option<String>,
    pub protection_selected: bool,
    pub protection_id: Option<String>,
    pub sim_type: Option<SimType>,
    pub sim_icc_id: Option<String>,
}

impl Line {
    pub fn blank(line_number: usize) -> Self {
        Self {
            line_number,
            plan_selected: false,
            plan_id: None,
            device_selected: false,
            device_id: None,
            protection_selected: false,
            protection_id: None,
            sim_type: None,
            sim_icc_id: None,
        }
    }

    pub fn is_unconfigured(&self) -> bool {
        !self.plan_selected
            && !self.device_selected
            && !self.protection_selected
            && self.sim_type.is_none()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentQuestion {
    pub question_type: String,
    pub text: String,
    pub expected_entities: Vec<String>,
    pub asked_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub intent: String,
    pub action: String,
    pub timestamp: DateTime<Utc>,
    pub data: serde_json::Value,
}

/// Mergeable partial update applied through the Flow Context Manager.
///
/// Fields left as `None` are untouched. Clearing a field goes through the
/// dedicated `clear_*` methods instead of nested options.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ContextUpdate {
    pub line_count: Option<usize>,
    pub flow_stage: Option<String>,
    pub resume_step: Option<String>,
    pub current_question: Option<CurrentQuestion>,
    pub last_intent: Option<String>,
    pub last_action: Option<String>,
}

/// Per-session conversation and configuration state.
///
/// The derived booleans (`plan_selected` and friends) are cached projections
/// of `lines`/`line_count` and are recomputed on every mutation; they are
/// never independently settable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowContext {
    pub session_id: String,
    pub line_count: usize,
    pub lines: Vec<Line>,
    pub flow_stage: Option<String>,
    pub resume_step: Option<String>,
    pub current_question: Option<CurrentQuestion>,
    pub last_intent: Option<String>,
    pub last_action: Option<String>,
    pub conversation_history: Vec<ConversationEntry>,
    pub plan_selected: bool,
    pub device_selected: bool,
    pub protection_selected: bool,
    pub sim_selected: bool,
    pub lines_configured: bool,
    pub last_updated: DateTime<Utc>,
}

impl FlowContext {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            line_count: 0,
            lines: Vec::new(),
            flow_stage: None,
            resume_step: None,
            current_question: None,
            last_intent: None,
            last_action: None,
            conversation_history: Vec::new(),
            plan_selected: false,
            device_selected: false,
            protection_selected: false,
            sim_selected: false,
            lines_configured: false,
            last_updated: Utc::now(),
        }
    }

    pub fn line(&self, line_number: usize) -> Option<&Line> {
        if line_number == 0 {
            return None;
        }
        self.lines.get(line_number - 1)
    }

    /// Grow or shrink `lines` to `count`. New lines are blank; shrinking
    /// truncates from the tail. Previously-cleared line data must not
    /// resurrect when growing back to an earlier count.
    pub fn set_line_count(&mut self, count: usize) {
        if count < self.lines.len() {
            self.lines.truncate(count);
        } else {
            for line_number in self.lines.len() + 1..=count {
                self.lines.push(Line::blank(line_number));
            }
        }
        self.line_count = count;
        self.refresh_derived_flags();
    }

    pub fn assign_plan(
        &mut self,
        line_number: usize,
        plan_id: impl Into<String>,
    ) -> Result<(), ContextError> {
        let line = self.line_checked(line_number)?;
        line.plan_selected = true;
        line.plan_id = Some(plan_id.into());
        // SIM selection is implicit once a plan is attached; default to eSIM.
        if line.sim_type.is_none() {
            line.sim_type = Some(SimType::Esim);
        }
        self.refresh_derived_flags();
        Ok(())
    }

    pub fn assign_device(
        &mut self,
        line_number: usize,
        device_id: impl Into<String>,
    ) -> Result<(), ContextError> {
        let line = self.line_checked(line_number)?;
        line.device_selected = true;
        line.device_id = Some(device_id.into());
        self.refresh_derived_flags();
        Ok(())
    }

    pub fn assign_protection(
        &mut self,
        line_number: usize,
        protection_id: impl Into<String>,
    ) -> Result<(), ContextError> {
        let line = self.line_checked(line_number)?;
        if !line.device_selected {
            return Err(ContextError::ProtectionRequiresDevice { line: line_number });
        }
        line.protection_selected = true;
        line.protection_id = Some(protection_id.into());
        self.refresh_derived_flags();
        Ok(())
    }

    pub fn assign_sim(
        &mut self,
        line_number: usize,
        sim_type: SimType,
        icc_id: Option<String>,
    ) -> Result<(), ContextError> {
        let line = self.line_checked(line_number)?;
        line.sim_type = Some(sim_type);
        line.sim_icc_id = icc_id;
        self.refresh_derived_flags();
        Ok(())
    }

    /// Merge a partial update. A `line_count` change grows or shrinks
    /// `lines` before the derived flags are recomputed.
    pub fn apply_update(&mut self, update: ContextUpdate) {
        if let Some(stage) = update.flow_stage {
            self.flow_stage = Some(stage);
        }
        if let Some(step) = update.resume_step {
            self.resume_step = Some(step);
        }
        if let Some(question) = update.current_question {
            self.current_question = Some(question);
        }
        if let Some(intent) = update.last_intent {
            self.last_intent = Some(intent);
        }
        if let Some(action) = update.last_action {
            self.last_action = Some(action);
        }
        match update.line_count {
            Some(count) => self.set_line_count(count),
            None => self.refresh_derived_flags(),
        }
    }

    pub fn clear_resume_step(&mut self) {
        self.resume_step = None;
        self.refresh_derived_flags();
    }

    pub fn clear_current_question(&mut self) {
        self.current_question = None;
        self.refresh_derived_flags();
    }

    /// Append a history entry, evicting the oldest once the bound is hit.
    pub fn record_history(&mut self, entry: ConversationEntry) {
        self.conversation_history.push(entry);
        while self.conversation_history.len() > CONVERSATION_HISTORY_LIMIT {
            self.conversation_history.remove(0);
        }
        self.refresh_derived_flags();
    }

    /// Recompute the cached projections from `lines`/`line_count` and
    /// advance `last_updated`. Called after every mutation; skipping it is
    /// not an option.
    pub fn refresh_derived_flags(&mut self) {
        debug_assert_eq!(self.lines.len(), self.line_count);
        self.plan_selected = self.lines.iter().any(|line| line.plan_selected);
        self.device_selected = self.lines.iter().any(|line| line.device_selected);
        self.protection_selected = self.lines.iter().any(|line| line.protection_selected);
        self.sim_selected = self.lines.iter().any(|line| line.sim_type.is_some());
        self.lines_configured = self.line_count > 0;
        self.touch();
    }

    fn line_checked(&mut self, line_number: usize) -> Result<&mut Line, ContextError> {
        let line_count = self.line_count;
        if line_number == 0 || line_number > line_count {
            return Err(ContextError::LineOutOfRange { line: line_number, line_count });
        }
        Ok(&mut self.lines[line_number - 1])
    }

    // last_updated never moves backwards, even when the wall clock does.
    fn touch(&mut self) {
        let now = Utc::now();
        if now > self.last_updated {
            self.last_updated = now;
        }
    }
}
