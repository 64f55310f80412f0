use std::collections::VecDeque;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::action::action_model::{Action, WaitSpec};
use crate::agent::agent_model::{DecisionEngine, DecisionView};
use crate::agent::error::EngineError;
use crate::snapshot::snapshot_model::{ElementRef, PageSnapshot};

/// Turns spent waiting for an addressed element before the script gives up.
const DEFAULT_PATIENCE: u32 = 3;
const PATIENCE_WAIT_MS: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocatedKind {
    Click,
    Type,
}

/// Click or type addressed by role and name, resolved against whatever
/// snapshot is current when the step comes up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocatedStep {
    pub action: LocatedKind,
    pub role: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub nth: usize,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScriptStep {
    Located(LocatedStep),
    Action(Action),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionScript {
    #[serde(default)]
    pub steps: Vec<ScriptStep>,
}

impl ActionScript {
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| EngineError::io(format!("reading script {}", path.display()), e))?;
        Self::from_yaml(&content).map_err(|e| EngineError::Protocol {
            command: "script".into(),
            error: format!("{}: {e}", path.display()),
        })
    }
}

/// Decision engine that replays a fixed script. An exhausted script
/// finishes with `done`.
pub struct ScriptedEngine {
    steps: VecDeque<ScriptStep>,
    patience: u32,
    waited: u32,
    issued: u32,
}

impl ScriptedEngine {
    pub fn new(script: ActionScript) -> Self {
        Self {
            steps: script.steps.into(),
            patience: DEFAULT_PATIENCE,
            waited: 0,
            issued: 0,
        }
    }

    pub fn from_actions(actions: impl IntoIterator<Item = Action>) -> Self {
        Self::new(ActionScript {
            steps: actions.into_iter().map(ScriptStep::Action).collect(),
        })
    }

    pub fn with_patience(mut self, patience: u32) -> Self {
        self.patience = patience;
        self
    }

    pub fn remaining(&self) -> usize {
        self.steps.len()
    }
}

#[async_trait]
impl DecisionEngine for ScriptedEngine {
    async fn next_action(&mut self, view: &DecisionView<'_>) -> Result<Action, EngineError> {
        let Some(step) = self.steps.front() else {
            info!(steps = self.issued, "script exhausted");
            return Ok(Action::Done {
                summary: format!("script finished after {} steps", self.issued),
            });
        };

        let action = match step {
            ScriptStep::Action(action) => action.clone(),
            ScriptStep::Located(located) => match locate(located, view.snapshot) {
                Some(action) => action,
                None if self.waited < self.patience => {
                    self.waited += 1;
                    debug!(role = %located.role, name = %located.name, "script target not on page yet");
                    return Ok(Action::Wait {
                        spec: WaitSpec::Duration { ms: PATIENCE_WAIT_MS },
                    });
                }
                None => {
                    return Err(EngineError::Interaction(format!(
                        "script step {}: no [{}] \"{}\" on {}",
                        self.issued + 1,
                        located.role,
                        located.name,
                        view.snapshot.url
                    )));
                }
            },
        };

        self.steps.pop_front();
        self.waited = 0;
        self.issued += 1;
        Ok(action)
    }
}

fn locate(step: &LocatedStep, snapshot: &PageSnapshot) -> Option<Action> {
    let target: ElementRef = snapshot
        .refs()
        .filter(|(_, el)| el.role == step.role && el.name == step.name)
        .nth(step.nth)
        .map(|(r, _)| r)?;

    Some(match step.action {
        LocatedKind::Click => Action::Click { target },
        LocatedKind::Type => Action::Type {
            target,
            text: step.text.clone().unwrap_or_default(),
        },
    })
}
