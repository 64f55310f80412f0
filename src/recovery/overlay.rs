use crate::action::action_model::Action;
use crate::snapshot::builder::NOTE_OVERLAY;
use crate::snapshot::snapshot_model::{InteractiveElement, PageSnapshot};

/// Labels of generic close controls. Compared against the whole label.
const DISMISS_WORDS: &[&str] = &[
    "close", "cancel", "dismiss", "no", "no thanks", "not now", "later", "maybe later", "got it",
    "\u{00d7}", "\u{2715}", "x",
];

const DISMISS_ROLES: &[&str] = &["button", "link"];

/// Generic way out of an overlay reported in the snapshot notes.
///
/// Clicks the first close-like control, else presses Escape. Returns `None`
/// when no overlay was detected.
pub fn dismissal_plan(snapshot: &PageSnapshot) -> Option<Action> {
    if !snapshot.has_note(NOTE_OVERLAY) {
        return None;
    }

    let close = snapshot
        .refs()
        .find(|(_, el)| DISMISS_ROLES.contains(&el.role.as_str()) && is_close_control(el))
        .map(|(r, _)| r);

    Some(match close {
        Some(target) => Action::Click { target },
        None => Action::Press {
            key: "Escape".into(),
        },
    })
}

fn is_close_control(element: &InteractiveElement) -> bool {
    [Some(element.name.as_str()), element.aria_label.as_deref()]
        .into_iter()
        .flatten()
        .any(|label| {
            let label = label.trim().to_lowercase();
            DISMISS_WORDS.contains(&label.as_str())
        })
}
