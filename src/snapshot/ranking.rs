use std::collections::HashMap;

use crate::snapshot::snapshot_model::{InteractiveElement, Viewport};

/// Decides which elements survive when a page exposes more than the cap.
///
/// Higher scores survive. Truncation never reorders: survivors are returned
/// in document order.
pub trait RankingPolicy: Send + Sync {
    fn score(&self, element: &InteractiveElement, viewport: Option<&Viewport>) -> i32;
}

/// Labelled and on-screen elements first; no geometry ranks below visible
/// elements, and off-screen elements rank lowest.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultRanking;

impl RankingPolicy for DefaultRanking {
    fn score(&self, element: &InteractiveElement, viewport: Option<&Viewport>) -> i32 {
        let mut score = 0;

        if element.is_labelled() {
            score += 4;
        }

        match (&element.bbox, viewport) {
            (Some(bbox), Some(vp)) if bbox.is_on_screen(vp) => score += 2,
            (Some(_), Some(_)) => score -= 4,
            (Some(_), None) => score += 1,
            (None, _) => {}
        }

        score
    }
}

/// Indices of the elements to keep, in document order.
///
/// An element's effective score is capped by the effective score of the
/// previous element in its `(role, name)` group, so the survivors of every
/// group are a prefix of that group and `nth` still addresses the same
/// element on the live page. Inside one group a later element can therefore
/// never outrank an earlier one, aria-label or not.
pub fn select_indices(
    elements: &[InteractiveElement],
    cap: usize,
    viewport: Option<&Viewport>,
    policy: &dyn RankingPolicy,
) -> Vec<usize> {
    if elements.len() <= cap {
        return (0..elements.len()).collect();
    }

    let mut group_floor: HashMap<(&str, &str, bool), i32> = HashMap::new();
    let mut scored: Vec<(i32, usize)> = elements
        .iter()
        .enumerate()
        .map(|(i, el)| {
            let raw = policy.score(el, viewport);
            let key = (el.role.as_str(), el.name.as_str(), el.name_is_pattern);
            let effective = group_floor.get(&key).map_or(raw, |floor| raw.min(*floor));
            group_floor.insert(key, effective);
            (effective, i)
        })
        .collect();

    scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

    let mut kept: Vec<usize> = scored.into_iter().take(cap).map(|(_, i)| i).collect();
    kept.sort_unstable();
    kept
}
