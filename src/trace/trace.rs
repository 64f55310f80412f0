use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::{
    action::action_model::{Action, ActionResult},
    recovery::controller::{Directive, RecoveryState},
};

/// One line of the step trace.
#[derive(Debug, Serialize)]
pub struct TraceEvent {
    pub timestamp_ms: u128,
    pub step: u32,

    pub recovery_state: String,
    pub snapshot_version: Option<u64>,
    pub notes: Vec<String>,

    pub action: Option<String>,
    pub result: Option<ActionResult>,
    pub directive: Option<Directive>,

    pub progressed: Option<bool>,
    pub event: Option<String>,
}

impl TraceEvent {
    pub fn now(step: u32, state: RecoveryState) -> Self {
        Self {
            timestamp_ms: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis())
                .unwrap_or_default(),
            step,
            recovery_state: state.to_string(),
            snapshot_version: None,
            notes: vec![],
            action: None,
            result: None,
            directive: None,
            progressed: None,
            event: None,
        }
    }

    pub fn with_snapshot(mut self, version: u64, notes: &[String]) -> Self {
        self.snapshot_version = Some(version);
        self.notes = notes.to_vec();
        self
    }

    pub fn with_action(mut self, action: &Action) -> Self {
        self.action = Some(action.to_string());
        self
    }

    pub fn with_result(mut self, result: &ActionResult) -> Self {
        self.result = Some(result.clone());
        self
    }

    pub fn with_directive(mut self, directive: &Directive) -> Self {
        self.directive = Some(directive.clone());
        self
    }

    pub fn with_progress(mut self, progressed: bool) -> Self {
        self.progressed = Some(progressed);
        self
    }

    pub fn with_event(mut self, event: impl ToString) -> Self {
        self.event = Some(event.to_string());
        self
    }
}
