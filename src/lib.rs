use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::{
    agent::{
        agent::Agent,
        agent_model::{DecisionEngine, EngineConfig},
        operator::Operator,
    },
    browser::{page::Page, session::BrowserSession},
    cli::{commands::build_tracer, config::AppConfig},
    report::report_model::{SessionOutcome, SessionReport},
    trace::logger::TraceLogger,
};

pub mod action;
pub mod agent;
pub mod browser;
pub mod cli;
pub mod context;
pub mod recovery;
pub mod registry;
pub mod report;
pub mod safety;
pub mod snapshot;
pub mod trace;

/// Launch a browser, drive it from `url`, and release it exactly once.
///
/// Never returns an error: every failure, including a browser that will not
/// start, ends up as the outcome of the report.
pub async fn run_session(
    config: &AppConfig,
    url: &str,
    engine: &mut dyn DecisionEngine,
    operator: Arc<dyn Operator>,
    cancel: &CancellationToken,
) -> SessionReport {
    let mut session = match BrowserSession::launch(&config.browser).await {
        Ok(session) => session,
        Err(e) => {
            warn!(error = %e, "browser launch failed");
            return SessionReport::new(url, SessionOutcome::Failed { error: e.to_string() }, 0, Vec::new());
        }
    };

    run_on_page(
        &config.engine,
        build_tracer(config),
        Some(url),
        engine,
        operator,
        &mut session,
        cancel,
    )
    .await
}

/// Run one session against an already acquired page, then close it.
///
/// The page is closed on every exit path: completion, escalation, turn
/// budget, engine error, fatal browser error and cancellation.
pub async fn run_on_page(
    config: &EngineConfig,
    tracer: TraceLogger,
    start_url: Option<&str>,
    engine: &mut dyn DecisionEngine,
    operator: Arc<dyn Operator>,
    page: &mut dyn Page,
    cancel: &CancellationToken,
) -> SessionReport {
    let report = match Agent::new(config.clone(), operator, tracer) {
        Ok(mut agent) => agent.run(start_url, engine, page, cancel).await,
        Err(e) => SessionReport::new(
            start_url.unwrap_or_default(),
            SessionOutcome::Failed { error: e.to_string() },
            0,
            Vec::new(),
        ),
    };

    if let Err(e) = page.close().await {
        warn!(error = %e, "closing browser failed");
    }
    report
}
