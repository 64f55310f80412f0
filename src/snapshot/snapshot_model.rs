use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ============================================================================
// Observation data model: what the decision engine sees of a page
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    /// Returns `None` for negative or non-finite geometry.
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Option<Self> {
        let values = [x, y, width, height];
        if values.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return None;
        }
        Some(Self {
            x,
            y,
            width,
            height,
        })
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    /// Area of this box that falls inside the viewport.
    pub fn visible_area(&self, viewport: &Viewport) -> f64 {
        let right = (self.x + self.width).min(viewport.width);
        let bottom = (self.y + self.height).min(viewport.height);
        let w = (right - self.x).max(0.0);
        let h = (bottom - self.y).max(0.0);
        w * h
    }

    pub fn is_on_screen(&self, viewport: &Viewport) -> bool {
        self.visible_area(viewport) > 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Viewport {
    pub fn area(&self) -> f64 {
        self.width * self.height
    }
}

/// An element the decision engine may act on.
///
/// `name` may be empty: unlabelled controls are common and remain valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractiveElement {
    pub role: String,
    pub name: String,
    /// `name` is a regular expression over the accessible name.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub name_is_pattern: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aria_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_preview: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,
}

impl InteractiveElement {
    pub fn new(role: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            name: name.into(),
            name_is_pattern: false,
            aria_label: None,
            placeholder: None,
            value_preview: None,
            bbox: None,
        }
    }

    pub fn with_bbox(mut self, bbox: BoundingBox) -> Self {
        self.bbox = Some(bbox);
        self
    }

    pub fn with_name_pattern(mut self) -> Self {
        self.name_is_pattern = true;
        self
    }

    pub fn with_aria_label(mut self, label: impl Into<String>) -> Self {
        self.aria_label = Some(label.into());
        self
    }

    /// Whether the element carries any human-readable label.
    pub fn is_labelled(&self) -> bool {
        !self.name.trim().is_empty()
            || self
                .aria_label
                .as_deref()
                .is_some_and(|l| !l.trim().is_empty())
    }
}

/// Opaque, versioned handle to an element of one snapshot.
///
/// Refs handed out with a snapshot, including the ones in its rendered text,
/// are pinned to its version and read `elem-N@vV`. A bare `elem-N` parses
/// unpinned and is only checked against the entry currently at that index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ElementRef {
    pub index: usize,
    pub version: Option<u64>,
}

impl ElementRef {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            version: None,
        }
    }

    pub fn pinned(index: usize, version: u64) -> Self {
        Self {
            index,
            version: Some(version),
        }
    }

    pub fn id(&self) -> String {
        format!("elem-{}", self.index)
    }
}

impl fmt::Display for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.version {
            Some(v) => write!(f, "elem-{}@v{}", self.index, v),
            None => write!(f, "elem-{}", self.index),
        }
    }
}

impl FromStr for ElementRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .trim()
            .strip_prefix("elem-")
            .ok_or_else(|| format!("not an element reference: {s:?}"))?;

        let (index, version) = match rest.split_once("@v") {
            Some((i, v)) => (i, Some(v)),
            None => (rest, None),
        };

        let index = index
            .parse::<usize>()
            .map_err(|_| format!("bad element index in {s:?}"))?;
        let version = version
            .map(|v| v.parse::<u64>())
            .transpose()
            .map_err(|_| format!("bad snapshot version in {s:?}"))?;

        Ok(Self { index, version })
    }
}

impl TryFrom<String> for ElementRef {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ElementRef> for String {
    fn from(value: ElementRef) -> Self {
        value.to_string()
    }
}

/// A bounded, immutable view of a page at one registry version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageSnapshot {
    pub url: String,
    pub title: String,
    /// Document order.
    pub interactive_elements: Vec<InteractiveElement>,
    pub visible_text_excerpt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot_path: Option<PathBuf>,
    pub notes: Vec<String>,
    pub version: u64,
}

impl PageSnapshot {
    /// Ref for the element at `index`, pinned to this snapshot's version.
    pub fn element_ref(&self, index: usize) -> Option<ElementRef> {
        (index < self.interactive_elements.len()).then(|| ElementRef::pinned(index, self.version))
    }

    pub fn refs(&self) -> impl Iterator<Item = (ElementRef, &InteractiveElement)> {
        self.interactive_elements
            .iter()
            .enumerate()
            .map(|(i, el)| (ElementRef::pinned(i, self.version), el))
    }

    /// First element with this role and exact name.
    pub fn find(&self, role: &str, name: &str) -> Option<ElementRef> {
        self.refs()
            .find(|(_, el)| el.role == role && el.name == name)
            .map(|(r, _)| r)
    }

    pub fn has_note(&self, note: &str) -> bool {
        self.notes.iter().any(|n| n == note)
    }

    /// Compact text form handed to the decision engine.
    pub fn render(&self) -> String {
        let mut lines = vec![
            format!("Page: {}", self.title),
            format!("URL: {}", self.url),
            format!("Snapshot version: {}", self.version),
            String::new(),
            "Interactive Elements:".to_string(),
        ];

        for (r, el) in self.refs() {
            let mut line = if el.name_is_pattern {
                format!("- {}: [{}] /{}/", r, el.role, el.name)
            } else {
                format!("- {}: [{}] \"{}\"", r, el.role, el.name)
            };
            if let Some(label) = &el.aria_label {
                line.push_str(&format!(" (aria-label: {label})"));
            }
            if let Some(placeholder) = &el.placeholder {
                line.push_str(&format!(" (placeholder: {placeholder})"));
            }
            if let Some(value) = &el.value_preview {
                line.push_str(&format!(" (value: {value})"));
            }
            lines.push(line);
        }

        if self.interactive_elements.is_empty() {
            lines.push("  (no interactive elements found)".to_string());
        }

        if !self.notes.is_empty() {
            lines.push(String::new());
            lines.push("Notes:".to_string());
            lines.extend(self.notes.iter().map(|n| format!("- {n}")));
        }

        lines.push(String::new());
        lines.push(format!("Visible Text:\n{}", self.visible_text_excerpt));
        lines.join("\n")
    }
}
