use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::snapshot::snapshot_model::ElementRef;

/// One atomic operation requested by the decision engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Click {
        target: ElementRef,
    },
    Type {
        target: ElementRef,
        text: String,
    },
    Press {
        key: String,
    },
    Scroll {
        #[serde(default)]
        dx: i32,
        #[serde(default)]
        dy: i32,
    },
    Navigate {
        url: String,
    },
    Wait {
        spec: WaitSpec,
    },
    Extract {
        target: ExtractTarget,
    },
    Done {
        summary: String,
    },
}

impl Action {
    pub fn kind(&self) -> &'static str {
        match self {
            Action::Click { .. } => "click",
            Action::Type { .. } => "type",
            Action::Press { .. } => "press",
            Action::Scroll { .. } => "scroll",
            Action::Navigate { .. } => "navigate",
            Action::Wait { .. } => "wait",
            Action::Extract { .. } => "extract",
            Action::Done { .. } => "done",
        }
    }

    pub fn target(&self) -> Option<&ElementRef> {
        match self {
            Action::Click { target } | Action::Type { target, .. } => Some(target),
            _ => None,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Action::Done { .. })
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Click { target } => write!(f, "click {target}"),
            Action::Type { target, text } => write!(f, "type {text:?} into {target}"),
            Action::Press { key } => write!(f, "press {key}"),
            Action::Scroll { dx, dy } => write!(f, "scroll ({dx}, {dy})"),
            Action::Navigate { url } => write!(f, "navigate to {url}"),
            Action::Wait { spec } => write!(f, "wait {spec}"),
            Action::Extract { target } => write!(f, "extract {target}"),
            Action::Done { summary } => write!(f, "done: {summary}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "until", rename_all = "snake_case")]
pub enum WaitSpec {
    /// Sleep for a fixed duration.
    Duration { ms: u64 },
    /// Wait until the page reports no pending network activity.
    NetworkIdle { timeout_ms: u64 },
}

impl fmt::Display for WaitSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitSpec::Duration { ms } => write!(f, "{ms}ms"),
            WaitSpec::NetworkIdle { timeout_ms } => write!(f, "for network idle (up to {timeout_ms}ms)"),
        }
    }
}

/// Generic page reads. Nothing task-specific lives here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractTarget {
    Title,
    Url,
    Text,
    Links,
    FormValues,
}

impl fmt::Display for ExtractTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExtractTarget::Title => "title",
            ExtractTarget::Url => "url",
            ExtractTarget::Text => "text",
            ExtractTarget::Links => "links",
            ExtractTarget::FormValues => "form_values",
        };
        f.write_str(name)
    }
}

impl FromStr for ExtractTarget {
    type Err = std::convert::Infallible;

    /// Free-form targets map by keyword; anything else reads page text.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        let target = if lower.contains("title") {
            ExtractTarget::Title
        } else if lower.contains("url") || lower.contains("address") {
            ExtractTarget::Url
        } else if lower.contains("link") || lower.contains("anchor") {
            ExtractTarget::Links
        } else if lower.contains("input") || lower.contains("form") {
            ExtractTarget::FormValues
        } else {
            ExtractTarget::Text
        };
        Ok(target)
    }
}

impl<'de> Deserialize<'de> for ExtractTarget {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(raw.parse().unwrap_or(ExtractTarget::Text))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    StaleElement,
    UnknownRef,
    Timeout,
    Navigation,
    DestructiveBlocked,
    /// Recovery refused to repeat an action that just failed.
    RepeatRefused,
    Stuck,
    Interaction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ActionResult {
    Success { message: String },
    Failure { message: String, kind: FailureKind },
}

impl ActionResult {
    pub fn success(message: impl Into<String>) -> Self {
        ActionResult::Success {
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>, kind: FailureKind) -> Self {
        ActionResult::Failure {
            message: message.into(),
            kind,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ActionResult::Success { .. })
    }

    pub fn message(&self) -> &str {
        match self {
            ActionResult::Success { message } | ActionResult::Failure { message, .. } => message,
        }
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            ActionResult::Success { .. } => None,
            ActionResult::Failure { kind, .. } => Some(*kind),
        }
    }
}

/// Identity of an attempt for repeat detection: action type plus target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ActionSignature {
    pub kind: String,
    pub target: String,
}

impl fmt::Display for ActionSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.target.is_empty() {
            f.write_str(&self.kind)
        } else {
            write!(f, "{} {}", self.kind, self.target)
        }
    }
}
