use std::sync::Arc;

use aria_pilot::{
    action::{
        action_model::{Action, ActionResult, ExtractTarget, FailureKind, WaitSpec},
        executor::{ActionExecutor, ExecutorConfig, ResetAction, action_signature, format_extracted},
    },
    agent::{error::EngineError, operator::ScriptedOperator},
    browser::page::{Extracted, LinkInfo},
    registry::registry::ElementRegistry,
    safety::gate::BLOCKED_MESSAGE,
    snapshot::{
        builder::{SnapshotBuilder, SnapshotConfig},
        snapshot_model::{ElementRef, PageSnapshot},
    },
};

use crate::common::{
    fake_page::FakePage,
    fixtures::{RESULTS_URL, account_page, home_page, results_page},
};

mod common;

fn executor(operator: Arc<ScriptedOperator>) -> ActionExecutor {
    ActionExecutor::new(ExecutorConfig::default(), operator)
}

fn quick_executor(operator: Arc<ScriptedOperator>) -> ActionExecutor {
    ActionExecutor::new(
        ExecutorConfig {
            action_timeout_ms: 50,
            navigation_timeout_ms: 50,
            wait_cap_ms: 20,
        },
        operator,
    )
}

async fn observe(page: &mut FakePage, registry: &mut ElementRegistry) -> PageSnapshot {
    SnapshotBuilder::new(SnapshotConfig::default())
        .observe(page, registry, None)
        .await
        .unwrap()
}

// =========================================================================
// Element actions
// =========================================================================

#[tokio::test]
async fn click_resolves_through_registry() {
    let mut page = FakePage::showing(home_page());
    let mut registry = ElementRegistry::new();
    let snapshot = observe(&mut page, &mut registry).await;
    let mut exec = executor(Arc::new(ScriptedOperator::declining()));

    let target = snapshot.find("button", "Search").unwrap();
    let result = exec.execute(&Action::Click { target }, &mut registry, &mut page).await.unwrap();

    assert_eq!(result, ActionResult::success("Clicked [button] \"Search\" (elem-4)"));
    assert_eq!(page.count("click"), 1);
    assert!(page.calls.contains(&"click button \"Search\" 0".to_string()));
}

#[tokio::test]
async fn click_on_second_duplicate_uses_nth() {
    let mut page = FakePage::showing(home_page());
    let mut registry = ElementRegistry::new();
    let snapshot = observe(&mut page, &mut registry).await;
    let mut exec = executor(Arc::new(ScriptedOperator::declining()));

    let target = snapshot.element_ref(2).unwrap();
    exec.execute(&Action::Click { target }, &mut registry, &mut page).await.unwrap();

    assert!(page.calls.contains(&"click link \"Docs\" 1".to_string()));
}

#[tokio::test]
async fn type_fills_the_field() {
    let mut page = FakePage::showing(home_page());
    let mut registry = ElementRegistry::new();
    let snapshot = observe(&mut page, &mut registry).await;
    let mut exec = executor(Arc::new(ScriptedOperator::declining()));

    let target = snapshot.find("searchbox", "Search products").unwrap();
    let action = Action::Type {
        target,
        text: "rust".into(),
    };
    let result = exec.execute(&action, &mut registry, &mut page).await.unwrap();

    assert!(result.is_success());
    assert_eq!(page.filled, vec![("Search products".to_string(), "rust".to_string())]);
}

// =========================================================================
// Safety gate
// =========================================================================

#[tokio::test]
async fn declined_destructive_click_never_touches_page() {
    let mut page = FakePage::showing(account_page());
    let mut registry = ElementRegistry::new();
    let snapshot = observe(&mut page, &mut registry).await;
    let operator = Arc::new(ScriptedOperator::declining());
    let mut exec = executor(operator.clone());

    let target = snapshot.find("button", "Delete Account").unwrap();
    let result = exec.execute(&Action::Click { target }, &mut registry, &mut page).await.unwrap();

    assert_eq!(result, ActionResult::failure(BLOCKED_MESSAGE, FailureKind::DestructiveBlocked));
    assert_eq!(page.count("click"), 0);
    assert!(!page.touched_page());
    assert_eq!(operator.prompts(), vec!["button Delete Account".to_string()]);
    assert_eq!(exec.gate().blocked, 1);
}

#[tokio::test]
async fn approved_destructive_click_runs() {
    let mut page = FakePage::showing(account_page());
    let mut registry = ElementRegistry::new();
    let snapshot = observe(&mut page, &mut registry).await;
    let mut exec = executor(Arc::new(ScriptedOperator::approving()));

    let target = snapshot.find("button", "Delete Account").unwrap();
    let result = exec.execute(&Action::Click { target }, &mut registry, &mut page).await.unwrap();

    assert!(result.is_success());
    assert_eq!(page.count("click"), 1);
    assert_eq!(exec.gate().confirmed, 1);
}

#[tokio::test]
async fn typing_destructive_words_into_plain_field_is_allowed() {
    let mut page = FakePage::showing(account_page());
    let mut registry = ElementRegistry::new();
    let snapshot = observe(&mut page, &mut registry).await;
    let operator = Arc::new(ScriptedOperator::declining());
    let mut exec = executor(operator.clone());

    let action = Action::Type {
        target: snapshot.find("textbox", "Display name").unwrap(),
        text: "delete my order".into(),
    };
    let result = exec.execute(&action, &mut registry, &mut page).await.unwrap();

    assert!(result.is_success());
    assert!(operator.prompts().is_empty());
}

// =========================================================================
// Ref validation
// =========================================================================

#[tokio::test]
async fn ref_from_before_navigation_is_stale() {
    let mut page = FakePage::showing(home_page()).add_page(results_page());
    let mut registry = ElementRegistry::new();
    let snapshot = observe(&mut page, &mut registry).await;
    let mut exec = executor(Arc::new(ScriptedOperator::declining()));
    let docs = snapshot.find("link", "Docs").unwrap();

    let nav = Action::Navigate {
        url: RESULTS_URL.into(),
    };
    let result = exec.execute(&nav, &mut registry, &mut page).await.unwrap();
    assert_eq!(result, ActionResult::success(format!("Navigated to {RESULTS_URL}")));

    let result = exec.execute(&Action::Click { target: docs }, &mut registry, &mut page).await.unwrap();
    assert_eq!(result.failure_kind(), Some(FailureKind::StaleElement));
    assert!(result.message().contains("re-observe"));
    assert_eq!(page.count("click"), 0);
}

#[tokio::test]
async fn rendered_ref_is_stale_after_navigation_and_reobserve() {
    let mut page = FakePage::showing(home_page()).add_page(results_page());
    let mut registry = ElementRegistry::new();
    let home = observe(&mut page, &mut registry).await;
    let mut exec = executor(Arc::new(ScriptedOperator::declining()));

    // What an engine reading the rendered snapshot would send back.
    let line = home.render().lines().find(|l| l.contains("[link] \"Home\"")).unwrap().to_string();
    let shown: ElementRef = line.trim_start_matches("- ").split(':').next().unwrap().parse().unwrap();
    assert_eq!(shown, ElementRef::pinned(0, home.version));

    let nav = Action::Navigate {
        url: RESULTS_URL.into(),
    };
    exec.execute(&nav, &mut registry, &mut page).await.unwrap();
    let results = observe(&mut page, &mut registry).await;
    assert_eq!(results.version, home.version + 2);

    let result = exec.execute(&Action::Click { target: shown }, &mut registry, &mut page).await.unwrap();
    assert_eq!(result.failure_kind(), Some(FailureKind::StaleElement));
    assert_eq!(page.count("click"), 0, "index 0 now names a different element");
}

#[tokio::test]
async fn unknown_ref_is_reported() {
    let mut page = FakePage::showing(home_page());
    let mut registry = ElementRegistry::new();
    observe(&mut page, &mut registry).await;
    let mut exec = executor(Arc::new(ScriptedOperator::declining()));

    let action = Action::Click {
        target: ElementRef::new(42),
    };
    let result = exec.execute(&action, &mut registry, &mut page).await.unwrap();

    assert_eq!(result.failure_kind(), Some(FailureKind::UnknownRef));
    assert_eq!(page.count("click"), 0);
}

// =========================================================================
// Bounded operations
// =========================================================================

#[tokio::test]
async fn settle_is_bounded_by_wait_cap() {
    let mut page = FakePage::showing(home_page()).hangs_on("wait_idle");
    let mut exec = quick_executor(Arc::new(ScriptedOperator::declining()));

    exec.settle(&mut page).await.unwrap();
    assert_eq!(page.count("wait_idle"), 1);
}

#[tokio::test]
async fn hanging_click_times_out() {
    let mut page = FakePage::showing(home_page()).hangs_on("click");
    let mut registry = ElementRegistry::new();
    let snapshot = observe(&mut page, &mut registry).await;
    let mut exec = quick_executor(Arc::new(ScriptedOperator::declining()));

    let target = snapshot.find("button", "Search").unwrap();
    let result = exec.execute(&Action::Click { target }, &mut registry, &mut page).await.unwrap();

    assert_eq!(result.failure_kind(), Some(FailureKind::Timeout));
    assert_eq!(result.message(), "click timed out after 50ms");
}

#[tokio::test]
async fn requested_wait_is_capped() {
    let mut page = FakePage::showing(home_page());
    let mut registry = ElementRegistry::new();
    let mut exec = quick_executor(Arc::new(ScriptedOperator::declining()));

    let action = Action::Wait {
        spec: WaitSpec::Duration { ms: 60_000 },
    };
    let result = exec.execute(&action, &mut registry, &mut page).await.unwrap();

    assert_eq!(result, ActionResult::success("Waited 20ms"));
}

#[tokio::test]
async fn network_idle_wait_is_bounded() {
    let mut page = FakePage::showing(home_page()).hangs_on("wait_idle");
    let mut registry = ElementRegistry::new();
    let mut exec = quick_executor(Arc::new(ScriptedOperator::declining()));

    let action = Action::Wait {
        spec: WaitSpec::NetworkIdle { timeout_ms: 60_000 },
    };
    let result = exec.execute(&action, &mut registry, &mut page).await.unwrap();

    assert_eq!(result.failure_kind(), Some(FailureKind::Timeout));
}

#[tokio::test]
async fn zero_scroll_is_a_no_op() {
    let mut page = FakePage::showing(home_page());
    let mut registry = ElementRegistry::new();
    let mut exec = executor(Arc::new(ScriptedOperator::declining()));

    let result = exec
        .execute(&Action::Scroll { dx: 0, dy: 0 }, &mut registry, &mut page)
        .await
        .unwrap();

    assert!(result.is_success());
    assert_eq!(page.count("scroll"), 0);

    exec.execute(&Action::Scroll { dx: 0, dy: 400 }, &mut registry, &mut page)
        .await
        .unwrap();
    assert!(page.calls.contains(&"scroll 0,400".to_string()));
}

#[tokio::test]
async fn empty_key_press_fails_without_page_call() {
    let mut page = FakePage::showing(home_page());
    let mut registry = ElementRegistry::new();
    let mut exec = executor(Arc::new(ScriptedOperator::declining()));

    let result = exec
        .execute(&Action::Press { key: "  ".into() }, &mut registry, &mut page)
        .await
        .unwrap();

    assert_eq!(result.failure_kind(), Some(FailureKind::Interaction));
    assert_eq!(page.count("press"), 0);
}

// =========================================================================
// Navigation
// =========================================================================

#[tokio::test]
async fn failed_navigation_keeps_version() {
    let mut page = FakePage::showing(home_page());
    let mut registry = ElementRegistry::new();
    let snapshot = observe(&mut page, &mut registry).await;
    let mut exec = executor(Arc::new(ScriptedOperator::declining()));

    let nav = Action::Navigate {
        url: "https://nowhere.test/".into(),
    };
    let result = exec.execute(&nav, &mut registry, &mut page).await.unwrap();

    assert_eq!(result.failure_kind(), Some(FailureKind::Navigation));
    assert!(result.message().contains("ERR_NAME_NOT_RESOLVED"));
    assert_eq!(registry.current_version(), snapshot.version);
}

#[tokio::test]
async fn empty_url_is_a_navigation_failure() {
    let mut page = FakePage::showing(home_page());
    let mut registry = ElementRegistry::new();
    let mut exec = executor(Arc::new(ScriptedOperator::declining()));

    let result = exec
        .execute(&Action::Navigate { url: " ".into() }, &mut registry, &mut page)
        .await
        .unwrap();

    assert_eq!(result.failure_kind(), Some(FailureKind::Navigation));
    assert_eq!(page.count("navigate"), 0);
}

#[tokio::test]
async fn reset_invalidates_refs() {
    let mut page = FakePage::showing(home_page());
    let mut registry = ElementRegistry::new();
    let snapshot = observe(&mut page, &mut registry).await;
    let mut exec = executor(Arc::new(ScriptedOperator::declining()));

    let result = exec.reset(ResetAction::Reload, &mut registry, &mut page).await.unwrap();

    assert_eq!(result, ActionResult::success("Reset page (reload)"));
    assert_eq!(page.count("reload"), 1);
    assert!(registry.current_version() > snapshot.version);
}

// =========================================================================
// Fatal errors
// =========================================================================

#[tokio::test]
async fn browser_crash_is_propagated() {
    let mut page = FakePage::showing(home_page()).crashes_on("click");
    let mut registry = ElementRegistry::new();
    let snapshot = observe(&mut page, &mut registry).await;
    let mut exec = executor(Arc::new(ScriptedOperator::declining()));

    let target = snapshot.find("button", "Search").unwrap();
    let err = exec.execute(&Action::Click { target }, &mut registry, &mut page).await.unwrap_err();

    assert!(matches!(err, EngineError::BrowserCrashed(_)));
    assert!(err.is_fatal());
}

// =========================================================================
// Extract and done
// =========================================================================

#[tokio::test]
async fn extract_lists_links() {
    let mut page = FakePage::showing(home_page());
    page.links = (0..25)
        .map(|i| LinkInfo {
            text: format!(" Link {i} "),
            href: format!("/page/{i}"),
        })
        .collect();
    let mut registry = ElementRegistry::new();
    let mut exec = executor(Arc::new(ScriptedOperator::declining()));

    let action = Action::Extract {
        target: ExtractTarget::Links,
    };
    let result = exec.execute(&action, &mut registry, &mut page).await.unwrap();
    let message = result.message();

    assert!(message.starts_with("Found 25 links, showing first 20:"));
    assert!(message.contains("\n- Link 0 (/page/0)"));
    assert!(!message.contains("Link 20"));
    assert_eq!(message.lines().count(), 21);
}

#[test]
fn long_text_extract_is_bounded() {
    let text = "x".repeat(5000);
    let formatted = format_extracted(&Extracted::Text(text));

    assert!(formatted.starts_with("Page text (4000 of 5000 chars):\n"));
    assert_eq!(formatted.lines().nth(1).map(str::len), Some(4000));
    assert_eq!(format_extracted(&Extracted::Title("Shop".into())), "Page title: Shop");
}

#[test]
fn free_form_extract_targets_map_to_generic_reads() {
    assert_eq!("the page title".parse::<ExtractTarget>().unwrap(), ExtractTarget::Title);
    assert_eq!("all links".parse::<ExtractTarget>().unwrap(), ExtractTarget::Links);
    assert_eq!("input values".parse::<ExtractTarget>().unwrap(), ExtractTarget::FormValues);
    assert_eq!("product prices".parse::<ExtractTarget>().unwrap(), ExtractTarget::Text);
}

#[tokio::test]
async fn done_echoes_summary() {
    let mut page = FakePage::showing(home_page());
    let mut registry = ElementRegistry::new();
    let mut exec = executor(Arc::new(ScriptedOperator::declining()));

    let action = Action::Done {
        summary: "found it".into(),
    };
    let result = exec.execute(&action, &mut registry, &mut page).await.unwrap();

    assert_eq!(result, ActionResult::success("found it"));
    assert!(page.calls.is_empty());
}

// =========================================================================
// Signatures
// =========================================================================

#[tokio::test]
async fn signature_survives_reobservation() {
    let mut page = FakePage::showing(home_page());
    let mut registry = ElementRegistry::new();
    let first = observe(&mut page, &mut registry).await;
    let before = action_signature(
        &Action::Click {
            target: first.find("button", "Search").unwrap(),
        },
        &registry,
    );

    let second = observe(&mut page, &mut registry).await;
    let after = action_signature(
        &Action::Click {
            target: second.find("button", "Search").unwrap(),
        },
        &registry,
    );

    assert_eq!(before, after);
    assert_eq!(before.to_string(), "click button Search");
}

#[test]
fn signature_of_unregistered_target_uses_id() {
    let registry = ElementRegistry::new();
    let sig = action_signature(
        &Action::Click {
            target: ElementRef::new(7),
        },
        &registry,
    );
    assert_eq!(sig.to_string(), "click elem-7");
}
