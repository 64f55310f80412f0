use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::agent::operator::{ConsoleOperator, Operator, ScriptedOperator};
use crate::agent::scripted::{ActionScript, ScriptedEngine};
use crate::browser::page::Page;
use crate::browser::session::BrowserSession;
use crate::cli::config::{AppConfig, ReportFormat};
use crate::registry::registry::ElementRegistry;
use crate::report::console::{format_console_report, format_json_report};
use crate::report::report_model::SessionReport;
use crate::safety::gate::classify;
use crate::snapshot::builder::SnapshotBuilder;
use crate::snapshot::snapshot_model::PageSnapshot;
use crate::trace::logger::TraceLogger;

// ============================================================================
// run subcommand
// ============================================================================

/// Drive `url` with a scripted engine. Returns whether the session completed.
pub async fn cmd_run(
    config: &AppConfig,
    url: &str,
    script: Option<&Path>,
    max_turns: Option<u32>,
    yes: bool,
    format: ReportFormat,
    output: Option<&Path>,
) -> anyhow::Result<bool> {
    let script = match script {
        Some(path) => ActionScript::load(path).with_context(|| format!("loading script {}", path.display()))?,
        None => ActionScript::default(),
    };
    let mut engine = ScriptedEngine::new(script);

    let operator: Arc<dyn Operator> = if yes {
        Arc::new(ScriptedOperator::approving())
    } else {
        Arc::new(ConsoleOperator)
    };

    let mut config = config.clone();
    if let Some(turns) = max_turns {
        config.engine.agent.max_turns = turns;
    }

    let cancel = cancel_on_ctrl_c();
    let report = crate::run_session(&config, url, &mut engine, operator, &cancel).await;

    let rendered = render_report(&report, format)?;
    write_output(&rendered, output)?;

    Ok(report.outcome.is_success())
}

pub fn render_report(report: &SessionReport, format: ReportFormat) -> anyhow::Result<String> {
    Ok(match format {
        ReportFormat::Console => format_console_report(report),
        ReportFormat::Json => format_json_report(report).context("serializing report")?,
    })
}

// ============================================================================
// observe subcommand
// ============================================================================

pub async fn cmd_observe(config: &AppConfig, url: &str, json: bool) -> anyhow::Result<()> {
    let mut session = BrowserSession::launch(&config.browser).await?;
    let observed = observe_once(config, url, &mut session).await;

    if let Err(e) = session.close().await {
        warn!(error = %e, "closing browser failed");
    }

    let snapshot = observed?;
    let rendered = if json {
        serde_json::to_string_pretty(&snapshot).context("serializing snapshot")?
    } else {
        snapshot.render()
    };
    println!("{rendered}");
    Ok(())
}

async fn observe_once(config: &AppConfig, url: &str, page: &mut dyn Page) -> anyhow::Result<PageSnapshot> {
    page.navigate(url).await.with_context(|| format!("navigating to {url}"))?;
    let builder = SnapshotBuilder::new(config.engine.snapshot.clone());
    let mut registry = ElementRegistry::new();
    let snapshot = builder.observe(page, &mut registry, None).await?;
    Ok(snapshot)
}

// ============================================================================
// classify subcommand
// ============================================================================

/// Print and return the safety gate's verdict.
pub fn cmd_classify(description: &str) -> bool {
    let destructive = classify(description);
    let verdict = if destructive {
        "destructive: confirmation required"
    } else {
        "safe"
    };
    println!("{description:?}: {verdict}");
    destructive
}

// ============================================================================
// helpers
// ============================================================================

pub fn build_tracer(config: &AppConfig) -> TraceLogger {
    match &config.trace.path {
        Some(path) => TraceLogger::new(path),
        None => TraceLogger::disabled(),
    }
}

/// Token cancelled by the first Ctrl-C.
pub fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, cancelling session");
            trigger.cancel();
        }
    });
    token
}

fn write_output(rendered: &str, output: Option<&Path>) -> anyhow::Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, rendered).with_context(|| format!("writing report to {}", path.display()))?;
            eprintln!("Report written to {}", path.display());
        }
        None => print!("{rendered}"),
    }
    Ok(())
}
