use std::collections::{HashMap, HashSet};
use std::path::Path;

use async_trait::async_trait;

use aria_pilot::{
    action::action_model::ExtractTarget,
    agent::error::EngineError,
    browser::page::{Extracted, LinkInfo, Page, RawPage},
    registry::registry::LocatorDescriptor,
};

/// In-memory page collaborator.
///
/// Pages are keyed by URL. Clicks can be scripted to navigate, fail, hang or
/// crash; every call is appended to `calls`.
#[derive(Debug, Default)]
pub struct FakePage {
    pages: HashMap<String, RawPage>,
    pub current: RawPage,
    history: Vec<String>,
    pub calls: Vec<String>,
    click_targets: HashMap<String, String>,
    failing_clicks: HashSet<String>,
    hanging: HashSet<&'static str>,
    crashing: HashSet<&'static str>,
    pub links: Vec<LinkInfo>,
    pub filled: Vec<(String, String)>,
    pub closed: u32,
}

impl FakePage {
    /// A page already showing `raw`.
    pub fn showing(raw: RawPage) -> Self {
        let mut page = FakePage::default();
        page.history.push(raw.url.clone());
        page.pages.insert(raw.url.clone(), raw.clone());
        page.current = raw;
        page
    }

    /// A blank page that knows how to reach `pages`.
    pub fn with_pages(pages: impl IntoIterator<Item = RawPage>) -> Self {
        let mut page = FakePage::default();
        for raw in pages {
            page.pages.insert(raw.url.clone(), raw);
        }
        page
    }

    pub fn add_page(mut self, raw: RawPage) -> Self {
        self.pages.insert(raw.url.clone(), raw);
        self
    }

    /// Clicking the element named `name` navigates to `url`.
    pub fn click_navigates(mut self, name: &str, url: &str) -> Self {
        self.click_targets.insert(name.to_string(), url.to_string());
        self
    }

    pub fn click_fails(mut self, name: &str) -> Self {
        self.failing_clicks.insert(name.to_string());
        self
    }

    /// Operation never completes.
    pub fn hangs_on(mut self, op: &'static str) -> Self {
        self.hanging.insert(op);
        self
    }

    /// Operation reports the browser process gone.
    pub fn crashes_on(mut self, op: &'static str) -> Self {
        self.crashing.insert(op);
        self
    }

    pub fn count(&self, op: &str) -> usize {
        self.calls.iter().filter(|c| c.split(' ').next() == Some(op)).count()
    }

    pub fn touched_page(&self) -> bool {
        self.calls
            .iter()
            .any(|c| !(c.starts_with("capture") || c.starts_with("current_url") || c.starts_with("close")))
    }

    async fn enter(&mut self, op: &'static str, detail: String) -> Result<(), EngineError> {
        self.calls.push(if detail.is_empty() { op.to_string() } else { format!("{op} {detail}") });
        if self.crashing.contains(op) {
            return Err(EngineError::BrowserCrashed(format!("{op}: target closed")));
        }
        if self.hanging.contains(op) {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    fn go_to(&mut self, url: &str) -> Result<(), EngineError> {
        let raw = self
            .pages
            .get(url)
            .cloned()
            .ok_or_else(|| EngineError::Interaction(format!("net::ERR_NAME_NOT_RESOLVED at {url}")))?;
        self.current = raw;
        self.history.push(url.to_string());
        Ok(())
    }
}

fn describe(target: &LocatorDescriptor) -> String {
    format!("{} {:?} {}", target.role, target.name.as_deref().unwrap_or(""), target.nth)
}

#[async_trait]
impl Page for FakePage {
    async fn capture(&mut self) -> Result<RawPage, EngineError> {
        self.enter("capture", String::new()).await?;
        Ok(self.current.clone())
    }

    async fn navigate(&mut self, url: &str) -> Result<(), EngineError> {
        self.enter("navigate", url.to_string()).await?;
        self.go_to(url)
    }

    async fn click(&mut self, target: &LocatorDescriptor) -> Result<(), EngineError> {
        self.enter("click", describe(target)).await?;
        let name = target.name.clone().unwrap_or_default();
        if self.failing_clicks.contains(&name) {
            return Err(EngineError::Interaction(format!("element [{}] \"{name}\" is not clickable", target.role)));
        }
        if let Some(url) = self.click_targets.get(&name).cloned() {
            self.go_to(&url)?;
        }
        Ok(())
    }

    async fn fill(&mut self, target: &LocatorDescriptor, text: &str) -> Result<(), EngineError> {
        self.enter("fill", describe(target)).await?;
        self.filled.push((target.name.clone().unwrap_or_default(), text.to_string()));
        Ok(())
    }

    async fn press(&mut self, key: &str) -> Result<(), EngineError> {
        self.enter("press", key.to_string()).await
    }

    async fn scroll(&mut self, dx: i32, dy: i32) -> Result<(), EngineError> {
        self.enter("scroll", format!("{dx},{dy}")).await
    }

    async fn wait_for_idle(&mut self) -> Result<(), EngineError> {
        self.enter("wait_idle", String::new()).await
    }

    async fn extract(&mut self, target: ExtractTarget) -> Result<Extracted, EngineError> {
        self.enter("extract", target.to_string()).await?;
        Ok(match target {
            ExtractTarget::Title => Extracted::Title(self.current.title.clone()),
            ExtractTarget::Url => Extracted::Url(self.current.url.clone()),
            ExtractTarget::Text => Extracted::Text(self.current.text.clone()),
            ExtractTarget::Links => Extracted::Links(self.links.clone()),
            ExtractTarget::FormValues => Extracted::FormValues(Vec::new()),
        })
    }

    async fn go_back(&mut self) -> Result<(), EngineError> {
        self.enter("go_back", String::new()).await?;
        if self.history.len() > 1 {
            self.history.pop();
            if let Some(url) = self.history.last().cloned() {
                if let Some(raw) = self.pages.get(&url).cloned() {
                    self.current = raw;
                }
            }
        }
        Ok(())
    }

    async fn reload(&mut self) -> Result<(), EngineError> {
        self.enter("reload", String::new()).await
    }

    async fn screenshot(&mut self, path: &Path) -> Result<(), EngineError> {
        self.enter("screenshot", path.display().to_string()).await?;
        std::fs::write(path, b"\x89PNG fake").map_err(|e| EngineError::io("writing screenshot", e))
    }

    async fn current_url(&mut self) -> Result<String, EngineError> {
        self.enter("current_url", String::new()).await?;
        Ok(self.current.url.clone())
    }

    async fn close(&mut self) -> Result<(), EngineError> {
        self.calls.push("close".to_string());
        self.closed += 1;
        Ok(())
    }
}
