use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    action::{action_model::{Action, ActionResult}, executor::ExecutorConfig},
    agent::error::EngineError,
    context::budget::BudgetConfig,
    recovery::controller::{RecoveryConfig, RecoveryState},
    snapshot::{builder::SnapshotConfig, snapshot_model::PageSnapshot},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Decision turns before the session ends as `TurnBudgetExhausted`.
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
        }
    }
}

fn default_max_turns() -> u32 { 30 }

/// Every knob of the interaction engine, one section per component.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub snapshot: SnapshotConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub recovery: RecoveryConfig,
    #[serde(default)]
    pub budget: BudgetConfig,
}

/// Everything the decision engine gets to see for one turn.
#[derive(Debug)]
pub struct DecisionView<'a> {
    pub turn: u32,
    pub max_turns: u32,
    pub snapshot: &'a PageSnapshot,
    pub last_result: Option<&'a ActionResult>,
    /// Compressed summary plus recent steps.
    pub history: String,
    /// Base64 PNG, present only when the snapshot fell back to vision.
    pub screenshot: Option<String>,
    /// Operator answer after an escalation.
    pub guidance: Option<&'a str>,
    pub recovery_state: RecoveryState,
}

impl DecisionView<'_> {
    /// Plain-text prompt form of the view.
    pub fn render(&self) -> String {
        let mut out = format!("Turn {} of {}\n\n{}\n", self.turn, self.max_turns, self.snapshot.render());

        if let Some(result) = self.last_result {
            let status = if result.is_success() { "succeeded" } else { "failed" };
            out.push_str(&format!("\nLast action {status}: {}\n", result.message()));
        }
        if !self.history.is_empty() {
            out.push_str(&format!("\nHistory:\n{}\n", self.history));
        }
        if let Some(guidance) = self.guidance {
            out.push_str(&format!("\nOperator guidance: {guidance}\n"));
        }
        if self.recovery_state != RecoveryState::Normal {
            out.push_str(&format!("\nRecovery state: {}\n", self.recovery_state));
        }
        out
    }
}

/// The process that picks the next action. Opaque to the engine.
#[async_trait]
pub trait DecisionEngine: Send {
    /// Exactly one action per turn.
    async fn next_action(&mut self, view: &DecisionView<'_>) -> Result<Action, EngineError>;

    /// Tool description sent along with every turn, counted against the context budget.
    fn tool_schema(&self) -> Option<String> {
        None
    }
}
