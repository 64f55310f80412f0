use thiserror::Error;

use crate::action::action_model::FailureKind;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Ref was issued against a registry version that has since been superseded
    #[error("element {element_ref} from snapshot version {issued} is stale (current version: {current}); re-observe the page to get fresh element references")]
    StaleElement {
        element_ref: String,
        issued: u64,
        current: u64,
    },

    /// Ref was never issued by this registry
    #[error("element reference {0} was never issued")]
    UnknownRef(String),

    /// Bounded wait exceeded
    #[error("{operation} timed out after {after_ms}ms")]
    ActionTimeout { operation: String, after_ms: u64 },

    #[error("navigation failed: {0}")]
    Navigation(String),

    /// Safety gate fired and the operator declined; carries the element description
    #[error("blocked: unconfirmed destructive action")]
    DestructiveActionBlocked(String),

    /// Recovery gave up on autonomous progress
    #[error("stuck: {0}")]
    StuckState(String),

    /// Browser reported that an interaction could not be performed
    #[error("interaction failed: {0}")]
    Interaction(String),

    /// Browser driver failed to spawn or never signalled readiness
    #[error("browser failed to launch: {0}")]
    BrowserLaunch(String),

    /// Browser driver went away mid-session
    #[error("browser process terminated: {0}")]
    BrowserCrashed(String),

    /// Driver produced a response that does not follow the protocol
    #[error("driver protocol error ({command}): {error}")]
    Protocol { command: String, error: String },

    #[error("I/O error ({context}): {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error ({context}): {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

impl EngineError {
    /// Resource-lifecycle failures end the session instead of becoming an `ActionResult`.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EngineError::BrowserLaunch(_)
                | EngineError::BrowserCrashed(_)
                | EngineError::Protocol { .. }
                | EngineError::Io { .. }
                | EngineError::Json { .. }
        )
    }

    pub fn failure_kind(&self) -> FailureKind {
        match self {
            EngineError::StaleElement { .. } => FailureKind::StaleElement,
            EngineError::UnknownRef(_) => FailureKind::UnknownRef,
            EngineError::ActionTimeout { .. } => FailureKind::Timeout,
            EngineError::Navigation(_) => FailureKind::Navigation,
            EngineError::DestructiveActionBlocked(_) => FailureKind::DestructiveBlocked,
            EngineError::StuckState(_) => FailureKind::Stuck,
            _ => FailureKind::Interaction,
        }
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        EngineError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn json(context: impl Into<String>, source: serde_json::Error) -> Self {
        EngineError::Json {
            context: context.into(),
            source,
        }
    }
}
