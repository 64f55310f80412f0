use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::action::action_model::{Action, ActionResult, ActionSignature, ExtractTarget, WaitSpec};
use crate::agent::error::EngineError;
use crate::agent::operator::Operator;
use crate::browser::page::{Extracted, Page};
use crate::registry::registry::ElementRegistry;
use crate::safety::gate::{self, GateDecision, SafetyGate};
use crate::snapshot::snapshot_model::ElementRef;

/// Characters of page text returned by a text extract.
pub const EXTRACT_TEXT_CHARS: usize = 4000;

/// Links or form fields listed by an extract.
pub const EXTRACT_LIST_LIMIT: usize = 20;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Bound on every single page operation.
    #[serde(default = "default_action_timeout_ms")]
    pub action_timeout_ms: u64,

    #[serde(default = "default_navigation_timeout_ms")]
    pub navigation_timeout_ms: u64,

    /// Longest wait the decision engine may request.
    #[serde(default = "default_wait_cap_ms")]
    pub wait_cap_ms: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            action_timeout_ms: default_action_timeout_ms(),
            navigation_timeout_ms: default_navigation_timeout_ms(),
            wait_cap_ms: default_wait_cap_ms(),
        }
    }
}

fn default_action_timeout_ms() -> u64 { 10_000 }
fn default_navigation_timeout_ms() -> u64 { 30_000 }
fn default_wait_cap_ms() -> u64 { 10_000 }

/// How the page is put back into a known state when recovery resets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetAction {
    GoBack,
    Reload,
}

impl std::fmt::Display for ResetAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResetAction::GoBack => f.write_str("go back"),
            ResetAction::Reload => f.write_str("reload"),
        }
    }
}

/// Signature used for repeat detection.
///
/// Element targets are described by role and name, so the same control keeps
/// its identity across snapshot versions.
pub fn action_signature(action: &Action, registry: &ElementRegistry) -> ActionSignature {
    let target = match action {
        Action::Click { target } | Action::Type { target, .. } => {
            registry.describe(target).unwrap_or_else(|| target.id())
        }
        Action::Press { key } => key.clone(),
        Action::Scroll { dx, dy } => format!("{dx},{dy}"),
        Action::Navigate { url } => url.clone(),
        Action::Wait { spec } => spec.to_string(),
        Action::Extract { target } => target.to_string(),
        Action::Done { .. } => String::new(),
    };

    ActionSignature {
        kind: action.kind().to_string(),
        target,
    }
}

/// Runs validated actions against the page.
///
/// Only resource-lifecycle failures come back as `Err`; everything else is
/// reported as an [`ActionResult::Failure`] the decision engine can read.
pub struct ActionExecutor {
    config: ExecutorConfig,
    gate: SafetyGate,
    operator: Arc<dyn Operator>,
}

impl ActionExecutor {
    pub fn new(config: ExecutorConfig, operator: Arc<dyn Operator>) -> Self {
        Self {
            config,
            gate: SafetyGate::new(),
            operator,
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn gate(&self) -> &SafetyGate {
        &self.gate
    }

    pub async fn execute(
        &mut self,
        action: &Action,
        registry: &mut ElementRegistry,
        page: &mut dyn Page,
    ) -> Result<ActionResult, EngineError> {
        debug!(%action, "executing action");

        let outcome = match action {
            Action::Click { target } => self.click(target, registry, page).await,
            Action::Type { target, text } => self.type_text(target, text, registry, page).await,
            Action::Press { key } => self.press(key, page).await,
            Action::Scroll { dx, dy } => self.scroll(*dx, *dy, page).await,
            Action::Navigate { url } => self.navigate(url, registry, page).await,
            Action::Wait { spec } => self.wait(*spec, page).await,
            Action::Extract { target } => self.extract(*target, page).await,
            Action::Done { summary } => Ok(ActionResult::success(summary.clone())),
        };

        match outcome {
            Ok(result) => {
                if let ActionResult::Failure { message, kind } = &result {
                    info!(%action, ?kind, %message, "action failed");
                }
                Ok(result)
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                info!(%action, error = %e, "action failed");
                Ok(ActionResult::failure(e.to_string(), e.failure_kind()))
            }
        }
    }

    /// Put the page back into a known state. A successful reset invalidates
    /// every outstanding ref.
    pub async fn reset(
        &mut self,
        reset: ResetAction,
        registry: &mut ElementRegistry,
        page: &mut dyn Page,
    ) -> Result<ActionResult, EngineError> {
        let limit = self.navigation_limit();
        let outcome = match reset {
            ResetAction::GoBack => bounded(limit, "go back", page.go_back()).await,
            ResetAction::Reload => bounded(limit, "reload", page.reload()).await,
        };

        match outcome {
            Ok(()) => {
                registry.bump_version();
                info!(%reset, "page reset");
                Ok(ActionResult::success(format!("Reset page ({reset})")))
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!(%reset, error = %e, "page reset failed");
                Ok(ActionResult::failure(e.to_string(), e.failure_kind()))
            }
        }
    }

    /// Give the page a chance to go network-idle before a later retry,
    /// bounded by the wait cap. Only fatal errors come back as `Err`.
    pub async fn settle(&mut self, page: &mut dyn Page) -> Result<(), EngineError> {
        let limit = Duration::from_millis(self.config.wait_cap_ms);
        match bounded(limit, "wait for network idle", page.wait_for_idle()).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                debug!(error = %e, "page did not settle");
                Ok(())
            }
        }
    }

    async fn click(
        &mut self,
        target: &ElementRef,
        registry: &ElementRegistry,
        page: &mut dyn Page,
    ) -> Result<ActionResult, EngineError> {
        let entry = registry.entry(target)?;
        let description = entry.describe();
        let locator = registry.resolve(target)?;

        if self.blocked(&description, &description).await {
            return Err(EngineError::DestructiveActionBlocked(description));
        }

        bounded(self.action_limit(), "click", page.click(&locator)).await?;
        Ok(ActionResult::success(format!(
            "Clicked [{}] \"{}\" ({})",
            locator.role,
            locator.name.as_deref().unwrap_or_default(),
            target.id()
        )))
    }

    async fn type_text(
        &mut self,
        target: &ElementRef,
        text: &str,
        registry: &ElementRegistry,
        page: &mut dyn Page,
    ) -> Result<ActionResult, EngineError> {
        let entry = registry.entry(target)?;
        let description = entry.describe();
        let locator = registry.resolve(target)?;

        if self.blocked(&description, &gate::describe_type(&description, text)).await {
            return Err(EngineError::DestructiveActionBlocked(description));
        }

        bounded(self.action_limit(), "type", page.fill(&locator, text)).await?;
        Ok(ActionResult::success(format!(
            "Typed {text:?} into [{}] \"{}\" ({})",
            locator.role,
            locator.name.as_deref().unwrap_or_default(),
            target.id()
        )))
    }

    async fn press(&mut self, key: &str, page: &mut dyn Page) -> Result<ActionResult, EngineError> {
        let key = key.trim();
        if key.is_empty() {
            return Err(EngineError::Interaction("no key given".into()));
        }
        bounded(self.action_limit(), "press", page.press(key)).await?;
        Ok(ActionResult::success(format!("Pressed {key}")))
    }

    async fn scroll(&mut self, dx: i32, dy: i32, page: &mut dyn Page) -> Result<ActionResult, EngineError> {
        if dx == 0 && dy == 0 {
            return Ok(ActionResult::success("Scroll by (0, 0): nothing to do"));
        }
        bounded(self.action_limit(), "scroll", page.scroll(dx, dy)).await?;
        Ok(ActionResult::success(format!("Scrolled by ({dx}, {dy})")))
    }

    async fn navigate(
        &mut self,
        url: &str,
        registry: &mut ElementRegistry,
        page: &mut dyn Page,
    ) -> Result<ActionResult, EngineError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(EngineError::Navigation("empty URL".into()));
        }

        match bounded(self.navigation_limit(), "navigate", page.navigate(url)).await {
            Ok(()) => {
                registry.bump_version();
                Ok(ActionResult::success(format!("Navigated to {url}")))
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(EngineError::Interaction(msg)) => Err(EngineError::Navigation(msg)),
            Err(e) => Err(e),
        }
    }

    async fn wait(&mut self, spec: WaitSpec, page: &mut dyn Page) -> Result<ActionResult, EngineError> {
        let cap = self.config.wait_cap_ms;
        match spec {
            WaitSpec::Duration { ms } => {
                let ms = ms.min(cap);
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(ActionResult::success(format!("Waited {ms}ms")))
            }
            WaitSpec::NetworkIdle { timeout_ms } => {
                let limit = Duration::from_millis(timeout_ms.min(cap));
                bounded(limit, "wait for network idle", page.wait_for_idle()).await?;
                Ok(ActionResult::success("Network is idle"))
            }
        }
    }

    async fn extract(&mut self, target: ExtractTarget, page: &mut dyn Page) -> Result<ActionResult, EngineError> {
        let extracted = bounded(self.action_limit(), "extract", page.extract(target)).await?;
        Ok(ActionResult::success(format_extracted(&extracted)))
    }

    /// True when the gate fires and the operator declines.
    async fn blocked(&mut self, element: &str, prompt: &str) -> bool {
        let decision = self.gate.check(element, prompt, self.operator.as_ref()).await;
        decision == GateDecision::Blocked
    }

    fn action_limit(&self) -> Duration {
        Duration::from_millis(self.config.action_timeout_ms)
    }

    fn navigation_limit(&self) -> Duration {
        Duration::from_millis(self.config.navigation_timeout_ms)
    }
}

/// Run a page operation under a deadline.
async fn bounded<T>(
    limit: Duration,
    operation: &str,
    fut: impl Future<Output = Result<T, EngineError>>,
) -> Result<T, EngineError> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(EngineError::ActionTimeout {
            operation: operation.to_string(),
            after_ms: limit.as_millis() as u64,
        }),
    }
}

pub fn format_extracted(extracted: &Extracted) -> String {
    match extracted {
        Extracted::Title(title) => format!("Page title: {title}"),
        Extracted::Url(url) => format!("Page URL: {url}"),
        Extracted::Text(text) => {
            let total = text.chars().count();
            let head: String = text.chars().take(EXTRACT_TEXT_CHARS).collect();
            if total > EXTRACT_TEXT_CHARS {
                format!("Page text ({EXTRACT_TEXT_CHARS} of {total} chars):\n{head}")
            } else {
                format!("Page text:\n{head}")
            }
        }
        Extracted::Links(links) => {
            let mut out = format!("Found {} links", links.len());
            if links.len() > EXTRACT_LIST_LIMIT {
                out.push_str(&format!(", showing first {EXTRACT_LIST_LIMIT}"));
            }
            out.push(':');
            for link in links.iter().take(EXTRACT_LIST_LIMIT) {
                out.push_str(&format!("\n- {} ({})", link.text.trim(), link.href));
            }
            out
        }
        Extracted::FormValues(fields) => {
            let mut out = format!("Found {} form fields", fields.len());
            if fields.len() > EXTRACT_LIST_LIMIT {
                out.push_str(&format!(", showing first {EXTRACT_LIST_LIMIT}"));
            }
            out.push(':');
            for field in fields.iter().take(EXTRACT_LIST_LIMIT) {
                out.push_str(&format!(
                    "\n- {} name={:?} placeholder={:?} value={:?}",
                    field.kind, field.name, field.placeholder, field.value
                ));
            }
            out
        }
    }
}
