use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    action::{
        action_model::{Action, ActionResult, FailureKind},
        executor::{ActionExecutor, ResetAction, action_signature},
    },
    agent::{
        agent_model::{AgentConfig, DecisionEngine, DecisionView, EngineConfig},
        error::EngineError,
        operator::Operator,
    },
    browser::page::Page,
    context::budget::{ContextBudgeter, StepRecord, UsageCategory, estimate_tokens},
    recovery::{
        controller::{Check, Directive, RecoveryController, RecoveryState},
        overlay::dismissal_plan,
        progress::ProgressTracker,
    },
    registry::registry::ElementRegistry,
    report::report_model::{ActionRecord, SessionOutcome, SessionReport},
    snapshot::{builder::SnapshotBuilder, snapshot_model::PageSnapshot},
    trace::{logger::TraceLogger, trace::TraceEvent},
};

/// Distinct successful extracts remembered for progress detection.
const EXTRACT_MEMORY: usize = 16;

/// The observe, decide, act, recover loop for one page.
pub struct Agent {
    config: AgentConfig,
    builder: SnapshotBuilder,
    registry: ElementRegistry,
    executor: ActionExecutor,
    recovery: RecoveryController,
    budget: ContextBudgeter,
    progress: ProgressTracker,
    operator: Arc<dyn Operator>,
    tracer: TraceLogger,
    observe_timeout: Duration,
    actions: Vec<ActionRecord>,
    guidance: Option<String>,
    /// Why autonomy stopped, handed to the engine in place of the last result
    /// when the operator lets the session resume.
    handoff: Option<ActionResult>,
    turn: u32,
}

impl Agent {
    pub fn new(config: EngineConfig, operator: Arc<dyn Operator>, tracer: TraceLogger) -> Result<Self, EngineError> {
        let mut budget = ContextBudgeter::new(config.budget);
        if config.snapshot.vision_fallback_threshold.is_some() {
            budget = budget.with_screenshots()?;
        }

        Ok(Agent {
            config: config.agent,
            builder: SnapshotBuilder::new(config.snapshot),
            registry: ElementRegistry::new(),
            observe_timeout: Duration::from_millis(config.executor.navigation_timeout_ms),
            executor: ActionExecutor::new(config.executor, operator.clone()),
            recovery: RecoveryController::new(config.recovery),
            budget,
            progress: ProgressTracker::new(EXTRACT_MEMORY),
            operator,
            tracer,
            actions: Vec::new(),
            guidance: None,
            handoff: None,
            turn: 0,
        })
    }

    /// Swap the snapshot builder, e.g. to plug in another ranking policy.
    pub fn with_builder(mut self, builder: SnapshotBuilder) -> Self {
        self.builder = builder;
        self
    }

    pub fn registry(&self) -> &ElementRegistry {
        &self.registry
    }

    pub fn recovery(&self) -> &RecoveryController {
        &self.recovery
    }

    pub fn budget(&self) -> &ContextBudgeter {
        &self.budget
    }

    pub fn executor(&self) -> &ActionExecutor {
        &self.executor
    }

    /// Drive the page until the engine is done, the turn budget runs out,
    /// recovery escalates, or `cancel` fires.
    ///
    /// Never closes the page; the caller owns it.
    pub async fn run(
        &mut self,
        start_url: Option<&str>,
        engine: &mut dyn DecisionEngine,
        page: &mut dyn Page,
        cancel: &CancellationToken,
    ) -> SessionReport {
        let started = Instant::now();
        info!(url = start_url.unwrap_or("(current page)"), max_turns = self.config.max_turns, "session started");

        let outcome = tokio::select! {
            _ = cancel.cancelled() => {
                warn!("session cancelled");
                SessionOutcome::Cancelled
            }
            result = self.drive(start_url, engine, page) => match result {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(error = %e, "session failed");
                    SessionOutcome::Failed { error: e.to_string() }
                }
            },
        };

        self.tracer.log(&TraceEvent::now(self.turn, self.recovery.state()).with_event(outcome.label()));
        info!(outcome = outcome.label(), turns = self.turn, "session finished");

        let start = start_url
            .map(str::to_string)
            .or_else(|| self.budget.url_history().next().cloned())
            .unwrap_or_default();
        let mut report = SessionReport::new(&start, outcome, self.turn, std::mem::take(&mut self.actions))
            .with_duration(started.elapsed().as_millis());
        if let Some(snapshot) = self.budget.snapshot() {
            report = report.with_final_url(snapshot.url.clone());
        }
        report
    }

    async fn drive(
        &mut self,
        start_url: Option<&str>,
        engine: &mut dyn DecisionEngine,
        page: &mut dyn Page,
    ) -> Result<SessionOutcome, EngineError> {
        if let Some(schema) = engine.tool_schema() {
            self.budget.set_usage(UsageCategory::ToolSchema, estimate_tokens(&schema));
        }

        if let Some(url) = start_url {
            let action = Action::Navigate { url: url.to_string() };
            let result = self.executor.execute(&action, &mut self.registry, page).await?;
            self.actions.push(ActionRecord::new(0, action.to_string(), &result));
        }

        let snapshot = self.observe(page).await?;
        self.progress.baseline(&snapshot);

        let mut last_result: Option<ActionResult> = None;

        for turn in 1..=self.config.max_turns {
            self.turn = turn;

            let action = self.decide(turn, engine, last_result.as_ref()).await?;
            debug!(turn, %action, "engine chose action");

            if let Action::Done { summary } = &action {
                let result = ActionResult::success(summary.clone());
                self.actions.push(ActionRecord::new(turn, action.to_string(), &result));
                self.tracer.log(&TraceEvent::now(turn, self.recovery.state()).with_action(&action).with_result(&result));
                return Ok(SessionOutcome::Completed { summary: summary.clone() });
            }

            let signature = action_signature(&action, &self.registry);
            let result = match self.recovery.check(&signature) {
                Check::Proceed => self.executor.execute(&action, &mut self.registry, page).await?,
                Check::Refuse(reason) => {
                    info!(%signature, "repeat refused");
                    ActionResult::failure(reason, FailureKind::RepeatRefused)
                }
            };
            self.actions.push(ActionRecord::new(turn, action.to_string(), &result));

            let snapshot = self.observe_or_keep(page).await?;
            let progressed = self.progress.assess(&action, &result, &snapshot);

            self.budget.record_step(StepRecord {
                step: turn,
                kind: action.kind().to_string(),
                action: action.to_string(),
                success: result.is_success(),
                message: result.message().to_string(),
                url: snapshot.url.clone(),
            });

            let state_before = self.recovery.state();
            let directive = self.recovery.record(signature, &result, progressed);
            self.tracer.log(
                &TraceEvent::now(turn, state_before)
                    .with_snapshot(snapshot.version, &snapshot.notes)
                    .with_action(&action)
                    .with_result(&result)
                    .with_progress(progressed)
                    .with_directive(&directive),
            );

            if let Some(outcome) = self.follow(turn, directive, page).await? {
                return Ok(outcome);
            }

            last_result = Some(self.handoff.take().unwrap_or(result));
        }

        warn!(max_turns = self.config.max_turns, "turn budget exhausted");
        Ok(SessionOutcome::TurnBudgetExhausted {
            max_turns: self.config.max_turns,
        })
    }

    async fn decide(
        &mut self,
        turn: u32,
        engine: &mut dyn DecisionEngine,
        last_result: Option<&ActionResult>,
    ) -> Result<Action, EngineError> {
        let screenshot = match self.budget.take_screenshot() {
            Ok(shot) => shot,
            Err(e) => {
                warn!(error = %e, "screenshot could not be read");
                None
            }
        };
        let history = self.budget.history_text();

        let Some(snapshot) = self.budget.snapshot() else {
            return Err(EngineError::Interaction("no snapshot to decide on".into()));
        };

        let view = DecisionView {
            turn,
            max_turns: self.config.max_turns,
            snapshot,
            last_result,
            history,
            screenshot,
            guidance: self.guidance.as_deref(),
            recovery_state: self.recovery.state(),
        };

        engine.next_action(&view).await
    }

    /// Act on what recovery asked for. `Some` ends the session.
    async fn follow(
        &mut self,
        turn: u32,
        directive: Directive,
        page: &mut dyn Page,
    ) -> Result<Option<SessionOutcome>, EngineError> {
        match directive {
            Directive::Continue => Ok(None),
            Directive::Recover { backoff_ms } => {
                debug!(backoff_ms, "backing off before retry");
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                // The first retry only re-observes; later ones let the page settle first.
                if matches!(self.recovery.state(), RecoveryState::Retrying(n) if n >= 2) {
                    self.executor.settle(page).await?;
                }
                self.dismiss_overlay(turn, page).await?;
                Ok(None)
            }
            Directive::Reset => {
                let next = self.reset_page(turn, page).await?;
                match next {
                    Directive::Escalate { reason } => self.escalate(reason).await,
                    _ => Ok(None),
                }
            }
            Directive::Escalate { reason } => self.escalate(reason).await,
        }
    }

    async fn dismiss_overlay(&mut self, turn: u32, page: &mut dyn Page) -> Result<(), EngineError> {
        let snapshot = self.observe_or_keep(page).await?;
        let Some(plan) = dismissal_plan(&snapshot) else {
            return Ok(());
        };

        info!(action = %plan, "dismissing overlay");
        let result = self.executor.execute(&plan, &mut self.registry, page).await?;
        self.actions.push(ActionRecord::new(turn, plan.to_string(), &result).as_recovery());

        let snapshot = self.observe_or_keep(page).await?;
        self.progress.baseline(&snapshot);
        Ok(())
    }

    async fn reset_page(&mut self, turn: u32, page: &mut dyn Page) -> Result<Directive, EngineError> {
        let reset = if self.budget.previous_url().is_some() {
            ResetAction::GoBack
        } else {
            ResetAction::Reload
        };

        let result = self.executor.reset(reset, &mut self.registry, page).await?;
        self.actions.push(ActionRecord::new(turn, reset.to_string(), &result).as_recovery());
        let directive = self.recovery.record_reset(&result);

        let snapshot = self.observe_or_keep(page).await?;
        self.progress.baseline(&snapshot);
        self.tracer.log(
            &TraceEvent::now(turn, self.recovery.state())
                .with_snapshot(snapshot.version, &snapshot.notes)
                .with_result(&result)
                .with_directive(&directive)
                .with_event(format!("reset: {reset}")),
        );
        Ok(directive)
    }

    /// Ask the operator. Guidance starts a fresh sub-task; silence ends the session.
    async fn escalate(&mut self, reason: String) -> Result<Option<SessionOutcome>, EngineError> {
        let stuck = EngineError::StuckState(reason);
        let reason = stuck.to_string();
        match self.operator.request_guidance(&reason).await {
            Some(guidance) => {
                info!(%guidance, "operator provided guidance, resuming");
                self.guidance = Some(guidance);
                self.handoff = Some(ActionResult::failure(reason, stuck.failure_kind()));
                self.recovery.reset();
                Ok(None)
            }
            None => Ok(Some(SessionOutcome::Escalated { reason })),
        }
    }

    /// Observe under a deadline and make the result the retained snapshot.
    async fn observe(&mut self, page: &mut dyn Page) -> Result<PageSnapshot, EngineError> {
        let observed = tokio::time::timeout(
            self.observe_timeout,
            self.builder.observe(page, &mut self.registry, self.budget.screenshots_mut()),
        )
        .await
        .unwrap_or_else(|_| {
            Err(EngineError::ActionTimeout {
                operation: "observe".into(),
                after_ms: self.observe_timeout.as_millis() as u64,
            })
        })?;

        self.budget.set_snapshot(observed.clone());
        Ok(observed)
    }

    /// Like [`observe`](Self::observe), but an action-level failure keeps the
    /// previous snapshot instead of ending the session.
    async fn observe_or_keep(&mut self, page: &mut dyn Page) -> Result<PageSnapshot, EngineError> {
        match self.observe(page).await {
            Ok(snapshot) => Ok(snapshot),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!(error = %e, "re-observation failed, keeping previous snapshot");
                self.budget
                    .snapshot()
                    .cloned()
                    .ok_or(e)
            }
        }
    }
}
