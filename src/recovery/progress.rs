use sha1::{Digest, Sha1};

use crate::action::action_model::{Action, ActionResult};
use crate::context::history::BoundedHistory;
use crate::snapshot::snapshot_model::PageSnapshot;

/// Digests of the parts of a snapshot that signal forward progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressMarker {
    pub url: String,
    pub elements: String,
    pub text: String,
}

impl ProgressMarker {
    pub fn of(snapshot: &PageSnapshot) -> Self {
        let elements = snapshot
            .interactive_elements
            .iter()
            .map(|el| format!("{}\u{1f}{}", el.role, el.name))
            .collect::<Vec<_>>()
            .join("\u{1e}");

        Self {
            url: fingerprint(&snapshot.url),
            elements: fingerprint(&elements),
            text: fingerprint(&snapshot.visible_text_excerpt),
        }
    }
}

pub fn fingerprint(text: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Decides whether an action moved the task forward.
///
/// Progress means the page changed (URL, element set or visible text), or a
/// successful extract returned something not seen before.
#[derive(Debug)]
pub struct ProgressTracker {
    last: Option<ProgressMarker>,
    seen_extracts: BoundedHistory<String>,
}

impl ProgressTracker {
    pub fn new(extract_memory: usize) -> Self {
        Self {
            last: None,
            seen_extracts: BoundedHistory::new(extract_memory),
        }
    }

    /// Establish the baseline without judging progress.
    pub fn baseline(&mut self, snapshot: &PageSnapshot) {
        self.last = Some(ProgressMarker::of(snapshot));
    }

    pub fn assess(&mut self, action: &Action, result: &ActionResult, snapshot: &PageSnapshot) -> bool {
        let marker = ProgressMarker::of(snapshot);
        let page_changed = self.last.as_ref() != Some(&marker);
        self.last = Some(marker);

        let new_information = match (action, result) {
            (Action::Extract { .. }, ActionResult::Success { message }) => {
                let digest = fingerprint(message);
                let fresh = !self.seen_extracts.contains(&digest);
                if fresh {
                    self.seen_extracts.push(digest);
                }
                fresh
            }
            _ => false,
        };

        page_changed || new_information
    }
}
