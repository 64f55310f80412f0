use crate::report::report_model::{SessionOutcome, SessionReport, StepOutcome};

// ============================================================================
// Console reporter: formatted terminal output
// ============================================================================

/// Format a session report for the terminal.
///
/// ```text
/// === Session: https://example.com ===
///
///  1 ✓ click elem-3@v2          Clicked [link] "Docs" (elem-3)
///  2 ✗ type "x" into elem-0@v3  element elem-0@v2 ... is stale
///  3 ⛔ click elem-7@v4         BLOCKED blocked: unconfirmed destructive action
///
/// Outcome: completed (3 turns in 4.2s)
/// Task completed: ...
/// ```
pub fn format_console_report(report: &SessionReport) -> String {
    let mut out = String::new();

    out.push_str(&format!("=== Session: {} ===\n\n", report.start_url));

    if report.actions.is_empty() {
        out.push_str("  (no actions taken)\n");
    }

    for record in &report.actions {
        let marker = match record.outcome {
            StepOutcome::Success => "\u{2713}",
            StepOutcome::Failure => "\u{2717}",
            StepOutcome::Blocked => "\u{26d4}",
        };
        let origin = if record.recovery { " (recovery)" } else { "" };
        let detail = match record.outcome {
            StepOutcome::Blocked => format!("BLOCKED {}", record.message),
            _ => record.message.clone(),
        };

        out.push_str(&format!(
            "{:>3} {} {}{}\n      {}\n",
            record.turn, marker, record.action, origin, detail
        ));
    }

    let blocked: Vec<_> = report.blocked().collect();
    if !blocked.is_empty() {
        out.push_str("\nBlocked destructive actions (not performed):\n");
        for record in blocked {
            out.push_str(&format!("  - turn {}: {}\n", record.turn, record.action));
        }
    }

    out.push_str(&format!("\nOutcome: {} ({} turns", report.outcome.label(), report.turns));
    if let Some(ms) = report.duration_ms {
        let secs = ms as f64 / 1000.0;
        out.push_str(&format!(" in {:.1}s", secs));
    }
    out.push_str(")\n");

    if let Some(url) = &report.final_url {
        out.push_str(&format!("Final page: {url}\n"));
    }

    out.push_str(&report.summary);
    out.push('\n');

    if let SessionOutcome::Failed { error } = &report.outcome {
        out.push_str(&format!("[ERROR] {error}\n"));
    }

    out
}

/// Pretty-printed JSON form of the report.
pub fn format_json_report(report: &SessionReport) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(report)
}
