use serde::{Deserialize, Serialize};

use crate::action::action_model::{ActionResult, FailureKind};

// ============================================================================
// Session report: what the engine did and how the session ended
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Success,
    Failure,
    /// Declined by the operator at the safety gate.
    Blocked,
}

/// One action taken (or refused) during the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub turn: u32,
    pub action: String,
    pub outcome: StepOutcome,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<FailureKind>,
    /// Issued by recovery rather than the decision engine.
    #[serde(default)]
    pub recovery: bool,
}

impl ActionRecord {
    pub fn new(turn: u32, action: impl Into<String>, result: &ActionResult) -> Self {
        let failure_kind = result.failure_kind();
        let outcome = match failure_kind {
            None => StepOutcome::Success,
            Some(FailureKind::DestructiveBlocked) => StepOutcome::Blocked,
            Some(_) => StepOutcome::Failure,
        };
        Self {
            turn,
            action: action.into(),
            outcome,
            message: result.message().to_string(),
            failure_kind,
            recovery: false,
        }
    }

    pub fn as_recovery(mut self) -> Self {
        self.recovery = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SessionOutcome {
    /// The decision engine returned `done`.
    Completed { summary: String },
    /// Autonomous progress stopped and the operator gave no guidance.
    Escalated { reason: String },
    TurnBudgetExhausted { max_turns: u32 },
    Cancelled,
    /// A resource-lifecycle failure ended the session.
    Failed { error: String },
}

impl SessionOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            SessionOutcome::Completed { .. } => "completed",
            SessionOutcome::Escalated { .. } => "escalated",
            SessionOutcome::TurnBudgetExhausted { .. } => "turn budget exhausted",
            SessionOutcome::Cancelled => "cancelled",
            SessionOutcome::Failed { .. } => "failed",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, SessionOutcome::Completed { .. })
    }
}

/// Final structured report of one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    pub start_url: String,
    #[serde(default)]
    pub final_url: Option<String>,
    pub outcome: SessionOutcome,
    pub turns: u32,
    pub actions: Vec<ActionRecord>,
    /// Human-readable account of how the session went.
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u128>,
}

impl SessionReport {
    pub fn new(start_url: &str, outcome: SessionOutcome, turns: u32, actions: Vec<ActionRecord>) -> Self {
        let summary = narrate(&outcome, &actions);
        Self {
            start_url: start_url.to_string(),
            final_url: None,
            outcome,
            turns,
            actions,
            summary,
            duration_ms: None,
        }
    }

    pub fn with_final_url(mut self, url: impl Into<String>) -> Self {
        self.final_url = Some(url.into());
        self
    }

    pub fn with_duration(mut self, duration_ms: u128) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn count(&self, outcome: StepOutcome) -> usize {
        self.actions.iter().filter(|a| a.outcome == outcome).count()
    }

    pub fn blocked(&self) -> impl Iterator<Item = &ActionRecord> {
        self.actions.iter().filter(|a| a.outcome == StepOutcome::Blocked)
    }
}

fn narrate(outcome: &SessionOutcome, actions: &[ActionRecord]) -> String {
    let ok = actions.iter().filter(|a| a.outcome == StepOutcome::Success).count();
    let failed = actions.iter().filter(|a| a.outcome == StepOutcome::Failure).count();
    let blocked = actions.iter().filter(|a| a.outcome == StepOutcome::Blocked).count();

    let head = match outcome {
        SessionOutcome::Completed { summary } => format!("Task completed: {summary}"),
        SessionOutcome::Escalated { reason } => format!("Stopped and asked for help: {reason}"),
        SessionOutcome::TurnBudgetExhausted { max_turns } => {
            format!("Turn budget of {max_turns} exhausted before the task was done")
        }
        SessionOutcome::Cancelled => "Session cancelled".to_string(),
        SessionOutcome::Failed { error } => format!("Session failed: {error}"),
    };

    let mut text = format!("{head}. {} actions: {ok} succeeded, {failed} failed", actions.len());
    if blocked > 0 {
        text.push_str(&format!(", {blocked} blocked by the safety gate"));
    }
    text.push('.');
    text
}
