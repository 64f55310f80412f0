use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::agent::error::EngineError;
use crate::context::history::BoundedHistory;
use crate::context::screenshot::ScreenshotStore;
use crate::snapshot::snapshot_model::PageSnapshot;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// Detailed step records kept in memory.
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    #[serde(default = "default_url_capacity")]
    pub url_capacity: usize,

    /// Compress task memory every this many steps.
    #[serde(default = "default_compression_interval")]
    pub compression_interval: u32,

    /// Steps left detailed after a compression.
    #[serde(default = "default_recent_keep")]
    pub recent_keep: usize,

    /// Approximate token usage above which a warning is logged once.
    #[serde(default = "default_warn_threshold_tokens")]
    pub warn_threshold_tokens: usize,

    #[serde(default = "default_screenshot_capacity")]
    pub screenshot_capacity: usize,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            history_capacity: default_history_capacity(),
            url_capacity: default_url_capacity(),
            compression_interval: default_compression_interval(),
            recent_keep: default_recent_keep(),
            warn_threshold_tokens: default_warn_threshold_tokens(),
            screenshot_capacity: default_screenshot_capacity(),
        }
    }
}

fn default_history_capacity() -> usize { 30 }
fn default_url_capacity() -> usize { 20 }
fn default_compression_interval() -> u32 { 10 }
fn default_recent_keep() -> usize { 5 }
fn default_warn_threshold_tokens() -> usize { 30_000 }
fn default_screenshot_capacity() -> usize { 3 }

/// Rough token estimate: four characters per token.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageCategory {
    Snapshot,
    History,
    ToolSchema,
    Other,
}

impl fmt::Display for UsageCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UsageCategory::Snapshot => "snapshot",
            UsageCategory::History => "history",
            UsageCategory::ToolSchema => "tool_schema",
            UsageCategory::Other => "other",
        };
        f.write_str(name)
    }
}

/// One step of task memory.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepRecord {
    pub step: u32,
    pub kind: String,
    pub action: String,
    pub success: bool,
    pub message: String,
    pub url: String,
}

impl StepRecord {
    pub fn render(&self) -> String {
        let mark = if self.success { "ok" } else { "failed" };
        format!("{}. {} [{mark}] {}", self.step, self.action, self.message)
    }
}

/// Aggregate of every step folded out of the detailed history.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CompressedMemory {
    pub steps: u32,
    pub successes: u32,
    pub per_kind: BTreeMap<String, u32>,
    pub first_step: Option<u32>,
    pub last_step: Option<u32>,
}

impl CompressedMemory {
    fn absorb(&mut self, record: &StepRecord) {
        self.steps += 1;
        if record.success {
            self.successes += 1;
        }
        *self.per_kind.entry(record.kind.clone()).or_insert(0) += 1;
        self.first_step.get_or_insert(record.step);
        self.last_step = Some(record.step);
    }
}

/// Keeps what the decision engine sees bounded.
///
/// Holds only the latest snapshot, bounded URL and step histories, and a
/// running summary of older steps. Tracks approximate token usage per
/// category and warns once when over the threshold.
pub struct ContextBudgeter {
    config: BudgetConfig,
    snapshot: Option<PageSnapshot>,
    urls: BoundedHistory<String>,
    steps: BoundedHistory<StepRecord>,
    compressed: CompressedMemory,
    recorded: u32,
    usage: BTreeMap<UsageCategory, usize>,
    warned: bool,
    screenshots: Option<ScreenshotStore>,
}

impl ContextBudgeter {
    pub fn new(config: BudgetConfig) -> Self {
        Self {
            urls: BoundedHistory::new(config.url_capacity),
            steps: BoundedHistory::new(config.history_capacity),
            config,
            snapshot: None,
            compressed: CompressedMemory::default(),
            recorded: 0,
            usage: BTreeMap::new(),
            warned: false,
            screenshots: None,
        }
    }

    /// Same budgeter with an ephemeral screenshot store attached.
    pub fn with_screenshots(mut self) -> Result<Self, EngineError> {
        self.screenshots = Some(ScreenshotStore::new(self.config.screenshot_capacity)?);
        Ok(self)
    }

    pub fn config(&self) -> &BudgetConfig {
        &self.config
    }

    pub fn screenshots_mut(&mut self) -> Option<&mut ScreenshotStore> {
        self.screenshots.as_mut()
    }

    /// Replace the retained snapshot. The previous one is dropped, along
    /// with any screenshot nobody consumed.
    pub fn set_snapshot(&mut self, snapshot: PageSnapshot) {
        if let Some(old) = self.snapshot.take() {
            if let (Some(path), Some(store)) = (old.screenshot_path.as_deref(), self.screenshots.as_mut()) {
                store.discard(path);
            }
        }

        if self.urls.last() != Some(&snapshot.url) {
            self.urls.push(snapshot.url.clone());
        }

        self.set_usage(UsageCategory::Snapshot, estimate_tokens(&snapshot.render()));
        self.snapshot = Some(snapshot);
    }

    pub fn snapshot(&self) -> Option<&PageSnapshot> {
        self.snapshot.as_ref()
    }

    /// Base64 of the current snapshot's screenshot. The file is deleted and
    /// the path cleared, so a screenshot is handed out at most once.
    pub fn take_screenshot(&mut self) -> Result<Option<String>, EngineError> {
        let Some(snapshot) = self.snapshot.as_mut() else {
            return Ok(None);
        };
        let (Some(path), Some(store)) = (snapshot.screenshot_path.take(), self.screenshots.as_mut()) else {
            return Ok(None);
        };
        store.consume(&path).map(Some)
    }

    pub fn url_history(&self) -> impl Iterator<Item = &String> {
        self.urls.iter()
    }

    /// The page visited before the current one, if remembered.
    pub fn previous_url(&self) -> Option<&str> {
        let mut recent = self.urls.iter().rev();
        recent.next();
        recent.next().map(String::as_str)
    }

    /// Append a step and compress task memory when the interval is reached.
    pub fn record_step(&mut self, record: StepRecord) {
        self.recorded += 1;
        if let Some(evicted) = self.steps.push(record) {
            self.compressed.absorb(&evicted);
        }

        let interval = self.config.compression_interval;
        if interval > 0 && self.recorded % interval == 0 {
            self.compress();
        }

        let history = self.history_text();
        self.set_usage(UsageCategory::History, estimate_tokens(&history));
    }

    pub fn recorded_steps(&self) -> u32 {
        self.recorded
    }

    /// Detailed steps still held, oldest first.
    pub fn recent_steps(&self) -> impl Iterator<Item = &StepRecord> {
        self.steps.iter()
    }

    pub fn compressed(&self) -> &CompressedMemory {
        &self.compressed
    }

    /// Short description of the steps folded out of the detailed history.
    pub fn memory_summary(&self) -> Option<String> {
        let c = &self.compressed;
        if c.steps == 0 {
            return None;
        }

        let kinds = c
            .per_kind
            .iter()
            .map(|(kind, n)| format!("{n} {kind}"))
            .collect::<Vec<_>>()
            .join(", ");
        let rate = c.successes as f64 * 100.0 / c.steps as f64;

        let mut summary = format!(
            "Earlier steps {}-{}: {kinds}; {}/{} succeeded ({rate:.0}%).",
            c.first_step.unwrap_or(0),
            c.last_step.unwrap_or(0),
            c.successes,
            c.steps
        );
        if let Some(snapshot) = &self.snapshot {
            summary.push_str(&format!(" Current page: {} ({})", snapshot.title, snapshot.url));
        }
        Some(summary)
    }

    /// Summary plus detailed recent steps, as handed to the decision engine.
    pub fn history_text(&self) -> String {
        let mut lines: Vec<String> = self.memory_summary().into_iter().collect();
        lines.extend(self.steps.iter().map(StepRecord::render));
        lines.join("\n")
    }

    /// Replace the usage estimate for one category.
    pub fn set_usage(&mut self, category: UsageCategory, tokens: usize) {
        self.usage.insert(category, tokens);
        self.check_threshold();
    }

    pub fn usage(&self, category: UsageCategory) -> usize {
        self.usage.get(&category).copied().unwrap_or(0)
    }

    pub fn total_usage(&self) -> usize {
        self.usage.values().sum()
    }

    pub fn over_threshold(&self) -> bool {
        self.total_usage() > self.config.warn_threshold_tokens
    }

    pub fn warned(&self) -> bool {
        self.warned
    }

    fn compress(&mut self) {
        let folded = self.steps.retain_recent(self.config.recent_keep);
        for record in &folded {
            self.compressed.absorb(record);
        }
        debug!(
            folded = folded.len(),
            kept = self.steps.len(),
            total = self.compressed.steps,
            "task memory compressed"
        );
    }

    fn check_threshold(&mut self) {
        if self.warned || !self.over_threshold() {
            return;
        }
        self.warned = true;
        let breakdown = self
            .usage
            .iter()
            .map(|(cat, n)| format!("{cat}={n}"))
            .collect::<Vec<_>>()
            .join(" ");
        warn!(
            total = self.total_usage(),
            threshold = self.config.warn_threshold_tokens,
            %breakdown,
            "context usage above threshold"
        );
    }
}
