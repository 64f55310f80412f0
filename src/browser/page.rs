use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::action::action_model::ExtractTarget;
use crate::agent::error::EngineError;
use crate::registry::registry::LocatorDescriptor;
use crate::snapshot::snapshot_model::Viewport;

/// Raw page state as delivered by the browser, before any bounding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawPage {
    pub url: String,
    #[serde(default)]
    pub title: String,
    /// ARIA-snapshot YAML of the document body.
    #[serde(default)]
    pub aria: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub viewport: Option<Viewport>,
    #[serde(default)]
    pub pending_requests: u32,
    /// Document has not finished loading.
    #[serde(default)]
    pub loading: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkInfo {
    pub text: String,
    #[serde(default)]
    pub href: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormValue {
    pub kind: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub placeholder: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Extracted {
    Title(String),
    Url(String),
    Text(String),
    Links(Vec<LinkInfo>),
    FormValues(Vec<FormValue>),
}

/// The browser capability surface the engine drives.
///
/// Implementations never expose node handles: elements are always addressed
/// through a [`LocatorDescriptor`] and re-located at call time.
#[async_trait]
pub trait Page: Send {
    async fn capture(&mut self) -> Result<RawPage, EngineError>;

    async fn navigate(&mut self, url: &str) -> Result<(), EngineError>;

    async fn click(&mut self, target: &LocatorDescriptor) -> Result<(), EngineError>;

    /// Replace the content of an editable element.
    async fn fill(&mut self, target: &LocatorDescriptor, text: &str) -> Result<(), EngineError>;

    async fn press(&mut self, key: &str) -> Result<(), EngineError>;

    async fn scroll(&mut self, dx: i32, dy: i32) -> Result<(), EngineError>;

    /// Resolves once no network requests are pending.
    async fn wait_for_idle(&mut self) -> Result<(), EngineError>;

    async fn extract(&mut self, target: ExtractTarget) -> Result<Extracted, EngineError>;

    async fn go_back(&mut self) -> Result<(), EngineError>;

    async fn reload(&mut self) -> Result<(), EngineError>;

    async fn screenshot(&mut self, path: &Path) -> Result<(), EngineError>;

    async fn current_url(&mut self) -> Result<String, EngineError>;

    /// Release the browser. Must be safe to call more than once.
    async fn close(&mut self) -> Result<(), EngineError>;
}
