use aria_pilot::{
    context::{
        budget::{BudgetConfig, ContextBudgeter, StepRecord, UsageCategory, estimate_tokens},
        history::BoundedHistory,
        screenshot::ScreenshotStore,
    },
    registry::registry::ElementRegistry,
    snapshot::{
        builder::{SnapshotBuilder, SnapshotConfig},
        snapshot_model::PageSnapshot,
    },
};

use crate::common::{
    fake_page::FakePage,
    fixtures::{HOME_URL, RESULTS_URL, raw, results_page},
};

mod common;

fn snapshot(url: &str) -> PageSnapshot {
    SnapshotBuilder::new(SnapshotConfig::default()).build(&raw(url, "Page", "- button \"Go\"\n", "hello"), 1)
}

fn step(n: u32, kind: &str, success: bool) -> StepRecord {
    StepRecord {
        step: n,
        kind: kind.into(),
        action: format!("{kind} #{n}"),
        success,
        message: if success { "ok".into() } else { "failed".into() },
        url: HOME_URL.into(),
    }
}

// =========================================================================
// Bounded history
// =========================================================================

#[test]
fn bounded_history_evicts_oldest() {
    let mut history = BoundedHistory::new(3);
    let mut evicted = Vec::new();
    for i in 0..7 {
        evicted.extend(history.push(i));
    }

    assert_eq!(history.len(), 3);
    assert_eq!(history.iter().copied().collect::<Vec<_>>(), vec![4, 5, 6]);
    assert_eq!(evicted, vec![0, 1, 2, 3]);
}

#[test]
fn bounded_history_never_exceeds_capacity() {
    for capacity in [1, 2, 5, 16] {
        let mut history = BoundedHistory::new(capacity);
        for i in 0..50 {
            history.push(i);
            assert!(history.len() <= capacity);
        }
    }
}

#[test]
fn zero_capacity_is_bumped_to_one() {
    let mut history = BoundedHistory::new(0);
    history.push("a");
    history.push("b");
    assert_eq!(history.capacity(), 1);
    assert_eq!(history.last(), Some(&"b"));
}

#[test]
fn retain_recent_returns_folded_items() {
    let mut history = BoundedHistory::new(10);
    for i in 0..8 {
        history.push(i);
    }

    let folded = history.retain_recent(3);

    assert_eq!(folded, vec![0, 1, 2, 3, 4]);
    assert_eq!(history.recent(2).copied().collect::<Vec<_>>(), vec![6, 7]);
}

// =========================================================================
// Snapshot retention and URL history
// =========================================================================

#[test]
fn only_latest_snapshot_is_retained() {
    let mut budget = ContextBudgeter::new(BudgetConfig::default());
    budget.set_snapshot(snapshot(HOME_URL));
    budget.set_snapshot(snapshot(RESULTS_URL));

    assert_eq!(budget.snapshot().map(|s| s.url.as_str()), Some(RESULTS_URL));
    assert!(budget.usage(UsageCategory::Snapshot) > 0);
}

#[test]
fn url_history_skips_repeats_and_is_bounded() {
    let mut budget = ContextBudgeter::new(BudgetConfig {
        url_capacity: 3,
        ..BudgetConfig::default()
    });

    budget.set_snapshot(snapshot("https://a.test/"));
    budget.set_snapshot(snapshot("https://a.test/"));
    assert_eq!(budget.url_history().count(), 1);

    for url in ["https://b.test/", "https://c.test/", "https://d.test/"] {
        budget.set_snapshot(snapshot(url));
    }

    let urls: Vec<&String> = budget.url_history().collect();
    assert_eq!(urls, vec!["https://b.test/", "https://c.test/", "https://d.test/"]);
}

#[test]
fn previous_url_is_the_page_before_current() {
    let mut budget = ContextBudgeter::new(BudgetConfig::default());
    assert_eq!(budget.previous_url(), None);

    budget.set_snapshot(snapshot(HOME_URL));
    assert_eq!(budget.previous_url(), None);

    budget.set_snapshot(snapshot(RESULTS_URL));
    assert_eq!(budget.previous_url(), Some(HOME_URL));
}

// =========================================================================
// Step memory
// =========================================================================

#[test]
fn compression_keeps_recent_steps_detailed() {
    let mut budget = ContextBudgeter::new(BudgetConfig::default());

    for n in 1..=9 {
        budget.record_step(step(n, "click", true));
    }
    assert_eq!(budget.recent_steps().count(), 9);
    assert!(budget.memory_summary().is_none());

    budget.record_step(step(10, "scroll", false));

    let kept: Vec<u32> = budget.recent_steps().map(|s| s.step).collect();
    assert_eq!(kept, vec![6, 7, 8, 9, 10]);
    assert_eq!(budget.compressed().steps, 5);
    assert_eq!(budget.compressed().per_kind.get("click"), Some(&5));
}

#[test]
fn compression_repeats_every_interval() {
    let mut budget = ContextBudgeter::new(BudgetConfig::default());

    for n in 1..=25 {
        budget.record_step(step(n, if n % 2 == 0 { "type" } else { "click" }, n % 5 != 0));
    }

    assert_eq!(budget.recorded_steps(), 25);
    assert_eq!(budget.compressed().steps, 15);
    assert_eq!(budget.recent_steps().count(), 10);
    assert_eq!(budget.compressed().first_step, Some(1));
    assert_eq!(budget.compressed().last_step, Some(15));
}

#[test]
fn summary_reports_counts_and_current_page() {
    let mut budget = ContextBudgeter::new(BudgetConfig::default());
    budget.set_snapshot(snapshot(HOME_URL));
    for n in 1..=10 {
        budget.record_step(step(n, "click", n != 3));
    }

    let summary = budget.memory_summary().unwrap();

    assert_eq!(
        summary,
        format!("Earlier steps 1-5: 5 click; 4/5 succeeded (80%). Current page: Page ({HOME_URL})")
    );
    let history = budget.history_text();
    assert!(history.starts_with("Earlier steps 1-5"));
    assert!(history.contains("10. click #10 [ok] ok"));
}

#[test]
fn detailed_history_is_bounded_even_without_compression() {
    let mut budget = ContextBudgeter::new(BudgetConfig {
        history_capacity: 4,
        compression_interval: 0,
        ..BudgetConfig::default()
    });

    for n in 1..=12 {
        budget.record_step(step(n, "press", true));
    }

    assert_eq!(budget.recent_steps().count(), 4);
    assert_eq!(budget.compressed().steps, 8);
}

// =========================================================================
// Usage accounting
// =========================================================================

#[test]
fn token_estimate_rounds_up() {
    assert_eq!(estimate_tokens(""), 0);
    assert_eq!(estimate_tokens("abcd"), 1);
    assert_eq!(estimate_tokens("abcde"), 2);
}

#[test]
fn threshold_warning_fires_once() {
    let mut budget = ContextBudgeter::new(BudgetConfig {
        warn_threshold_tokens: 100,
        ..BudgetConfig::default()
    });

    budget.set_usage(UsageCategory::ToolSchema, 60);
    assert!(!budget.warned());

    budget.set_usage(UsageCategory::Other, 60);
    assert!(budget.over_threshold());
    assert!(budget.warned());

    budget.set_usage(UsageCategory::Other, 0);
    assert!(!budget.over_threshold());
    assert!(budget.warned(), "warning is not re-armed");
    assert_eq!(budget.total_usage(), 60);
}

// =========================================================================
// Screenshots
// =========================================================================

#[test]
fn screenshot_store_evicts_and_deletes_oldest() {
    let mut store = ScreenshotStore::new(2).unwrap();
    let paths: Vec<_> = (0..3)
        .map(|_| {
            let path = store.next_path();
            std::fs::write(&path, b"png").unwrap();
            store.register(path.clone());
            path
        })
        .collect();

    assert!(!paths[0].exists());
    assert!(paths[1].exists() && paths[2].exists());
    assert_eq!(store.len(), 2);
}

#[test]
fn screenshot_directory_is_removed_on_drop() {
    let store = ScreenshotStore::new(1).unwrap();
    let dir = store.dir().to_path_buf();
    assert!(dir.exists());

    drop(store);
    assert!(!dir.exists());
}

#[tokio::test]
async fn screenshot_is_handed_out_once_and_deleted() {
    let mut budget = ContextBudgeter::new(BudgetConfig::default()).with_screenshots().unwrap();
    let mut page = FakePage::showing(raw(HOME_URL, "Blank", "", ""));
    let mut registry = ElementRegistry::new();
    let builder = SnapshotBuilder::new(SnapshotConfig {
        vision_fallback_threshold: Some(1),
        ..SnapshotConfig::default()
    });

    let snap = builder
        .observe(&mut page, &mut registry, budget.screenshots_mut())
        .await
        .unwrap();
    let path = snap.screenshot_path.clone().unwrap();
    budget.set_snapshot(snap);

    let encoded = budget.take_screenshot().unwrap();
    assert!(encoded.is_some());
    assert!(!path.exists());
    assert_eq!(budget.take_screenshot().unwrap(), None);
}

#[tokio::test]
async fn unconsumed_screenshot_is_discarded_with_its_snapshot() {
    let mut budget = ContextBudgeter::new(BudgetConfig::default()).with_screenshots().unwrap();
    let mut page = FakePage::showing(raw(HOME_URL, "Blank", "", ""));
    let mut registry = ElementRegistry::new();
    let builder = SnapshotBuilder::new(SnapshotConfig {
        vision_fallback_threshold: Some(1),
        ..SnapshotConfig::default()
    });

    let first = builder
        .observe(&mut page, &mut registry, budget.screenshots_mut())
        .await
        .unwrap();
    let stale_path = first.screenshot_path.clone().unwrap();
    budget.set_snapshot(first);

    budget.set_snapshot(SnapshotBuilder::new(SnapshotConfig::default()).build(&results_page(), 2));

    assert!(!stale_path.exists());
    assert!(budget.screenshots_mut().unwrap().is_empty());
}
