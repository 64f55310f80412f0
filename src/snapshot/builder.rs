use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::agent::error::EngineError;
use crate::browser::page::{Page, RawPage};
use crate::context::screenshot::ScreenshotStore;
use crate::registry::registry::ElementRegistry;
use crate::snapshot::aria::{self, AriaEntry, AriaHeader};
use crate::snapshot::ranking::{DefaultRanking, RankingPolicy, select_indices};
use crate::snapshot::snapshot_model::{BoundingBox, InteractiveElement, PageSnapshot, Viewport};

pub const NOTE_OVERLAY: &str = "overlay detected";
pub const NOTE_NAVIGATING: &str = "navigation in progress";
pub const NOTE_TREE_UNAVAILABLE: &str = "accessibility tree unavailable";
pub const NOTE_TEXT_TRUNCATED: &str = "visible text truncated";
pub const NOTE_SCREENSHOT: &str = "screenshot attached for visual fallback";

/// Roles the decision engine may act on. Everything else is context only.
pub const INTERACTIVE_ROLES: &[&str] = &[
    "button",
    "link",
    "textbox",
    "searchbox",
    "combobox",
    "listbox",
    "option",
    "checkbox",
    "radio",
    "switch",
    "slider",
    "spinbutton",
    "menuitem",
    "menuitemcheckbox",
    "menuitemradio",
    "tab",
    "treeitem",
];

const MODAL_ROLES: &[&str] = &["dialog", "alertdialog"];

/// Share of the viewport a dialog must cover to count as an overlay.
const OVERLAY_COVERAGE: f64 = 0.5;

const VALUE_PREVIEW_CHARS: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConfig {
    #[serde(default = "default_max_elements")]
    pub max_elements: usize,

    #[serde(default = "default_max_text_chars")]
    pub max_text_chars: usize,

    /// Attach a screenshot when fewer interactive elements than this are found.
    #[serde(default)]
    pub vision_fallback_threshold: Option<usize>,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            max_elements: default_max_elements(),
            max_text_chars: default_max_text_chars(),
            vision_fallback_threshold: None,
        }
    }
}

fn default_max_elements() -> usize { 60 }
fn default_max_text_chars() -> usize { 3000 }

pub fn is_interactive_role(role: &str) -> bool {
    INTERACTIVE_ROLES.contains(&role)
}

/// Turns raw page state into a bounded [`PageSnapshot`].
pub struct SnapshotBuilder {
    config: SnapshotConfig,
    ranking: Box<dyn RankingPolicy>,
}

impl SnapshotBuilder {
    pub fn new(config: SnapshotConfig) -> Self {
        Self {
            config,
            ranking: Box::new(DefaultRanking),
        }
    }

    pub fn with_ranking(mut self, ranking: Box<dyn RankingPolicy>) -> Self {
        self.ranking = ranking;
        self
    }

    pub fn config(&self) -> &SnapshotConfig {
        &self.config
    }

    /// Observe the page: capture, supersede the registry version, register.
    ///
    /// Every call produces a new version, so refs from earlier snapshots go
    /// stale even when the page did not change.
    pub async fn observe(
        &self,
        page: &mut dyn Page,
        registry: &mut ElementRegistry,
        screenshots: Option<&mut ScreenshotStore>,
    ) -> Result<PageSnapshot, EngineError> {
        let raw = page.capture().await?;
        let version = registry.bump_version();
        let mut snapshot = self.build(&raw, version);
        registry.register(&snapshot.interactive_elements);

        let wants_visual = self
            .config
            .vision_fallback_threshold
            .is_some_and(|t| snapshot.interactive_elements.len() < t);

        if let (true, Some(store)) = (wants_visual, screenshots) {
            let path = store.next_path();
            match page.screenshot(&path).await {
                Ok(()) => {
                    store.register(path.clone());
                    snapshot.screenshot_path = Some(path);
                    snapshot.notes.push(NOTE_SCREENSHOT.to_string());
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => warn!(error = %e, "screenshot capture failed"),
            }
        }

        debug!(
            version,
            url = %snapshot.url,
            elements = snapshot.interactive_elements.len(),
            notes = ?snapshot.notes,
            "page observed"
        );
        Ok(snapshot)
    }

    /// Pure transformation from raw state to snapshot.
    pub fn build(&self, raw: &RawPage, version: u64) -> PageSnapshot {
        let mut notes = Vec::new();

        let entries = match aria::parse_tree(&raw.aria) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, url = %raw.url, "accessibility tree did not parse");
                notes.push(NOTE_TREE_UNAVAILABLE.to_string());
                Vec::new()
            }
        };

        let mut walk = TreeWalk {
            viewport: raw.viewport.as_ref(),
            elements: Vec::new(),
            malformed: 0,
            overlay: false,
        };
        walk.visit(&entries);

        if walk.overlay {
            notes.push(NOTE_OVERLAY.to_string());
        }
        if raw.loading || raw.pending_requests > 0 {
            notes.push(NOTE_NAVIGATING.to_string());
        }
        if walk.malformed > 0 {
            notes.push(format!("skipped {} malformed node(s)", walk.malformed));
        }

        let total = walk.elements.len();
        let keep = select_indices(
            &walk.elements,
            self.config.max_elements,
            raw.viewport.as_ref(),
            self.ranking.as_ref(),
        );
        if keep.len() < total {
            notes.push(format!(
                "interactive elements truncated: kept {} of {}",
                keep.len(),
                total
            ));
        }

        let mut pool: Vec<Option<InteractiveElement>> = walk.elements.into_iter().map(Some).collect();
        let interactive_elements = keep.into_iter().filter_map(|i| pool[i].take()).collect();

        let (visible_text_excerpt, truncated) = truncate_text(&raw.text, self.config.max_text_chars);
        if truncated {
            notes.push(NOTE_TEXT_TRUNCATED.to_string());
        }

        PageSnapshot {
            url: raw.url.clone(),
            title: raw.title.clone(),
            interactive_elements,
            visible_text_excerpt,
            screenshot_path: None,
            notes,
            version,
        }
    }
}

struct TreeWalk<'a> {
    viewport: Option<&'a Viewport>,
    elements: Vec<InteractiveElement>,
    malformed: usize,
    overlay: bool,
}

impl TreeWalk<'_> {
    /// Pre-order: a node is recorded before its children.
    fn visit(&mut self, entries: &[AriaEntry]) {
        for entry in entries {
            match entry {
                AriaEntry::Node {
                    header,
                    text,
                    children,
                } => {
                    if MODAL_ROLES.contains(&header.role.as_str()) && self.covers_page(header) {
                        self.overlay = true;
                    }
                    if is_interactive_role(&header.role) {
                        self.elements.push(element_from(header, text.as_deref()));
                    }
                    self.visit(children);
                }
                AriaEntry::Malformed {
                    raw,
                    reason,
                    children,
                } => {
                    debug!(node = %raw, %reason, "skipping malformed node");
                    self.malformed += 1;
                    self.visit(children);
                }
            }
        }
    }

    /// A dialog blocks the page when marked modal, when it covers a large
    /// share of the viewport, or when there is no geometry to judge by.
    fn covers_page(&self, header: &AriaHeader) -> bool {
        if header.has_flag("modal") {
            return true;
        }
        match (parse_box(header.attr_value("box")), self.viewport) {
            (Some(bbox), Some(vp)) if vp.area() > 0.0 => bbox.visible_area(vp) / vp.area() >= OVERLAY_COVERAGE,
            (Some(_), _) => false,
            (None, _) => true,
        }
    }
}

fn element_from(header: &AriaHeader, text: Option<&str>) -> InteractiveElement {
    let value = header.attr_value("value").or(text).map(str::trim).filter(|v| !v.is_empty());

    InteractiveElement {
        role: header.role.clone(),
        name: header.name.clone().unwrap_or_default(),
        name_is_pattern: header.name_is_pattern,
        aria_label: header.attr_value("aria-label").map(str::to_string),
        placeholder: header.attr_value("placeholder").map(str::to_string),
        value_preview: value.map(|v| v.chars().take(VALUE_PREVIEW_CHARS).collect()),
        bbox: parse_box(header.attr_value("box")),
    }
}

/// `x,y,width,height`; rejected if any component is missing or negative.
fn parse_box(raw: Option<&str>) -> Option<BoundingBox> {
    let parts: Vec<f64> = raw?
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .ok()?;

    match parts.as_slice() {
        [x, y, w, h] => BoundingBox::new(*x, *y, *w, *h),
        _ => None,
    }
}

/// Collapse whitespace and cut to at most `max` bytes, preferring the last
/// whitespace boundary inside the budget.
pub fn truncate_text(text: &str, max: usize) -> (String, bool) {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.len() <= max {
        return (collapsed, false);
    }

    let mut end = max;
    while !collapsed.is_char_boundary(end) {
        end -= 1;
    }

    let head = &collapsed[..end];
    let cut = match head.rfind(' ') {
        Some(pos) if pos > 0 => &head[..pos],
        _ => head,
    };

    (cut.trim_end().to_string(), true)
}
