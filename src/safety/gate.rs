use tracing::{info, warn};

use crate::agent::operator::Operator;

/// Words that mark an interaction as irreversible or high-consequence.
pub const DESTRUCTIVE_KEYWORDS: &[&str] = &[
    "delete", "remove", "spam", "submit", "payment", "checkout", "confirm", "purchase", "buy",
    "order",
];

pub const BLOCKED_MESSAGE: &str = "blocked: unconfirmed destructive action";

/// Deterministic destructive-action check over a `role name` description.
///
/// Matches whole words, case-insensitively. No model is consulted and the
/// decision engine has no way to override the outcome.
pub fn classify(description: &str) -> bool {
    description
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| DESTRUCTIVE_KEYWORDS.contains(&word))
}

/// Prompt shown to the operator before typing into a gated field.
pub fn describe_type(field: &str, text: &str) -> String {
    format!("type {text:?} into {field}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Allow,
    Confirmed,
    Blocked,
}

/// Applies [`classify`] and asks the operator when it fires.
#[derive(Debug, Default)]
pub struct SafetyGate {
    pub allowed: u32,
    pub confirmed: u32,
    pub blocked: u32,
}

impl SafetyGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// `classify` runs on the element description only; the typed text is
    /// shown to the operator but never decides whether to ask.
    pub async fn check(&mut self, element: &str, prompt: &str, operator: &dyn Operator) -> GateDecision {
        if !classify(element) {
            self.allowed += 1;
            return GateDecision::Allow;
        }

        if operator.confirm(prompt).await {
            info!(action = %prompt, "destructive action confirmed");
            self.confirmed += 1;
            GateDecision::Confirmed
        } else {
            warn!(action = %prompt, "destructive action declined");
            self.blocked += 1;
            GateDecision::Blocked
        }
    }
}
