use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::action::action_model::{ActionResult, ActionSignature};
use crate::context::history::BoundedHistory;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// Consecutive failures tolerated before the controller gives up retrying.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// First retry delay; doubles on every further failure.
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Consecutive actions without forward progress before the loop is stuck.
    #[serde(default = "default_stuck_threshold")]
    pub stuck_threshold: u32,

    #[serde(default = "default_signature_capacity")]
    pub signature_capacity: usize,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_backoff_ms: default_base_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            stuck_threshold: default_stuck_threshold(),
            signature_capacity: default_signature_capacity(),
        }
    }
}

fn default_max_attempts() -> u32 { 3 }
fn default_base_backoff_ms() -> u64 { 500 }
fn default_max_backoff_ms() -> u64 { 8_000 }
fn default_stuck_threshold() -> u32 { 5 }
fn default_signature_capacity() -> usize { 20 }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "attempt", rename_all = "snake_case")]
pub enum RecoveryState {
    Normal,
    Retrying(u32),
    Stuck,
    Escalated,
}

impl fmt::Display for RecoveryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecoveryState::Normal => f.write_str("normal"),
            RecoveryState::Retrying(n) => write!(f, "retrying({n})"),
            RecoveryState::Stuck => f.write_str("stuck"),
            RecoveryState::Escalated => f.write_str("escalated"),
        }
    }
}

/// Pre-execution verdict on a proposed action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Check {
    Proceed,
    /// The same signature failed on the last attempt.
    Refuse(String),
}

/// What the control loop must do after an attempt was recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "directive", rename_all = "snake_case")]
pub enum Directive {
    Continue,
    /// Sleep, re-observe, try to dismiss overlays, then let the engine choose again.
    Recover { backoff_ms: u64 },
    /// Put the page back into a known state. Issued once per stuck episode.
    Reset,
    /// Stop acting autonomously and ask the operator.
    Escalate { reason: String },
}

/// Failure-driven state machine: Normal, Retrying(n), Stuck, Escalated.
#[derive(Debug)]
pub struct RecoveryController {
    config: RecoveryConfig,
    state: RecoveryState,
    /// Signatures of recent failed attempts, newest last.
    failures: BoundedHistory<ActionSignature>,
    /// Signature of the last attempt, if it failed.
    last_failed: Option<ActionSignature>,
    consecutive_failures: u32,
    no_progress: u32,
    /// A reset was issued and the next attempt decides whether it worked.
    reset_pending: bool,
    stuck_entries: u32,
}

impl RecoveryController {
    pub fn new(config: RecoveryConfig) -> Self {
        let failures = BoundedHistory::new(config.signature_capacity);
        Self {
            config,
            state: RecoveryState::Normal,
            failures,
            last_failed: None,
            consecutive_failures: 0,
            no_progress: 0,
            reset_pending: false,
            stuck_entries: 0,
        }
    }

    pub fn state(&self) -> RecoveryState {
        self.state
    }

    /// Times the controller has entered `Stuck` since the last [`reset`](Self::reset).
    pub fn stuck_entries(&self) -> u32 {
        self.stuck_entries
    }

    /// Failures of `signature` still held in the bounded history.
    pub fn failure_count(&self, signature: &ActionSignature) -> usize {
        self.failures.iter().filter(|s| *s == signature).count()
    }

    pub fn failure_history_len(&self) -> usize {
        self.failures.len()
    }

    pub fn check(&self, signature: &ActionSignature) -> Check {
        match &self.last_failed {
            Some(last) if last == signature => Check::Refuse(format!(
                "refusing to repeat \"{signature}\" verbatim after it just failed; re-observe and choose a different action"
            )),
            _ => Check::Proceed,
        }
    }

    /// Record an attempt and its effect on the page.
    pub fn record(&mut self, signature: ActionSignature, result: &ActionResult, progressed: bool) -> Directive {
        if self.state == RecoveryState::Escalated {
            return Directive::Escalate {
                reason: "already escalated".into(),
            };
        }

        if progressed {
            self.no_progress = 0;
        } else {
            self.no_progress += 1;
        }

        if self.reset_pending {
            self.reset_pending = false;
            if result.is_success() && progressed {
                info!("reset restored progress");
                self.clear_episode();
                return Directive::Continue;
            }
            return self.escalate(format!(
                "resetting the page did not restore progress (last action: {signature}: {})",
                result.message()
            ));
        }

        match result {
            ActionResult::Success { .. } => {
                self.last_failed = None;
                self.consecutive_failures = 0;
                self.state = RecoveryState::Normal;

                if self.no_progress >= self.config.stuck_threshold {
                    return self.enter_stuck(format!(
                        "{} consecutive actions made no forward progress",
                        self.no_progress
                    ));
                }
                Directive::Continue
            }
            ActionResult::Failure { kind, message } => {
                self.failures.push(signature.clone());
                self.last_failed = Some(signature.clone());
                self.consecutive_failures += 1;
                warn!(
                    %signature,
                    ?kind,
                    %message,
                    consecutive = self.consecutive_failures,
                    "attempt failed"
                );

                if self.consecutive_failures >= self.config.max_attempts {
                    return self.enter_stuck(format!(
                        "{} consecutive failures, last: {signature}: {message}",
                        self.consecutive_failures
                    ));
                }
                if self.no_progress >= self.config.stuck_threshold {
                    return self.enter_stuck(format!(
                        "{} consecutive actions made no forward progress",
                        self.no_progress
                    ));
                }

                self.state = RecoveryState::Retrying(self.consecutive_failures);
                Directive::Recover {
                    backoff_ms: self.backoff_ms(self.consecutive_failures),
                }
            }
        }
    }

    /// Outcome of the reset issued for [`Directive::Reset`].
    pub fn record_reset(&mut self, result: &ActionResult) -> Directive {
        if result.is_success() {
            return Directive::Continue;
        }
        self.reset_pending = false;
        self.escalate(format!("page reset failed: {}", result.message()))
    }

    /// Start a fresh sub-task: back to `Normal` with empty counters.
    pub fn reset(&mut self) {
        self.failures.clear();
        self.clear_episode();
        self.stuck_entries = 0;
    }

    /// Delay before retry `attempt` (1-based): base, 2x base, 4x base, capped.
    pub fn backoff_ms(&self, attempt: u32) -> u64 {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        self.config
            .base_backoff_ms
            .saturating_mul(factor)
            .min(self.config.max_backoff_ms)
    }

    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_ms(attempt))
    }

    fn enter_stuck(&mut self, reason: String) -> Directive {
        if self.state == RecoveryState::Stuck {
            return self.escalate(reason);
        }
        warn!(%reason, "no forward progress, resetting page");
        self.state = RecoveryState::Stuck;
        self.stuck_entries += 1;
        self.reset_pending = true;
        Directive::Reset
    }

    fn escalate(&mut self, reason: String) -> Directive {
        warn!(%reason, "escalating to operator");
        self.state = RecoveryState::Escalated;
        Directive::Escalate { reason }
    }

    fn clear_episode(&mut self) {
        self.state = RecoveryState::Normal;
        self.last_failed = None;
        self.consecutive_failures = 0;
        self.no_progress = 0;
        self.reset_pending = false;
    }
}
