use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, warn};

use crate::action::action_model::ExtractTarget;
use crate::agent::error::EngineError;
use crate::browser::page::{Extracted, Page, RawPage};
use crate::registry::registry::LocatorDescriptor;

const QUIT_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Interpreter for the driver script.
    #[serde(default = "default_node")]
    pub node: String,

    #[serde(default = "default_driver")]
    pub driver: PathBuf,

    #[serde(default = "default_headless")]
    pub headless: bool,

    /// Persistent profile owned by whoever manages sessions; used as-is.
    #[serde(default)]
    pub profile_dir: Option<PathBuf>,

    /// Ask the driver to clear the HTTP cache once at startup.
    #[serde(default)]
    pub clear_cache: bool,

    #[serde(default = "default_launch_timeout_ms")]
    pub launch_timeout_ms: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            node: default_node(),
            driver: default_driver(),
            headless: default_headless(),
            profile_dir: None,
            clear_cache: false,
            launch_timeout_ms: default_launch_timeout_ms(),
        }
    }
}

fn default_node() -> String { "node".into() }
fn default_driver() -> PathBuf { PathBuf::from("driver/browser_server.js") }
fn default_headless() -> bool { true }
fn default_launch_timeout_ms() -> u64 { 30_000 }

/// Command sent to browser_server.js (one JSON line, tagged by `cmd`).
#[derive(Debug, Serialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum DriverCommand<'a> {
    Snapshot,
    Navigate { url: &'a str },
    Click { target: &'a LocatorDescriptor },
    Fill { target: &'a LocatorDescriptor, text: &'a str },
    Press { key: &'a str },
    Scroll { dx: i32, dy: i32 },
    WaitIdle,
    Extract { target: ExtractTarget },
    GoBack,
    Reload,
    Screenshot { path: &'a Path },
    CurrentUrl,
    ClearCache,
    Quit,
}

impl DriverCommand<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            DriverCommand::Snapshot => "snapshot",
            DriverCommand::Navigate { .. } => "navigate",
            DriverCommand::Click { .. } => "click",
            DriverCommand::Fill { .. } => "fill",
            DriverCommand::Press { .. } => "press",
            DriverCommand::Scroll { .. } => "scroll",
            DriverCommand::WaitIdle => "wait_idle",
            DriverCommand::Extract { .. } => "extract",
            DriverCommand::GoBack => "go_back",
            DriverCommand::Reload => "reload",
            DriverCommand::Screenshot { .. } => "screenshot",
            DriverCommand::CurrentUrl => "current_url",
            DriverCommand::ClearCache => "clear_cache",
            DriverCommand::Quit => "quit",
        }
    }
}

#[derive(Debug, Serialize)]
struct DriverRequest<'a> {
    id: u64,
    #[serde(flatten)]
    command: &'a DriverCommand<'a>,
}

/// Response line from browser_server.js.
#[derive(Debug, Deserialize)]
pub struct DriverResponse {
    #[serde(default)]
    pub id: Option<u64>,
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub ready: Option<bool>,
}

/// A persistent browser session backed by browser_server.js.
///
/// A long-lived Node.js process keeps Chromium open. Requests carry an id;
/// a response whose id does not match the pending request belongs to one
/// that already timed out and is discarded.
pub struct BrowserSession {
    child: Child,
    stdin: ChildStdin,
    lines: Lines<BufReader<ChildStdout>>,
    next_id: u64,
    closed: bool,
}

impl BrowserSession {
    /// Spawn the driver and wait for its ready line.
    pub async fn launch(config: &BrowserConfig) -> Result<Self, EngineError> {
        let mut command = Command::new(&config.node);
        command
            .arg(&config.driver)
            .env("ARIA_PILOT_HEADLESS", if config.headless { "1" } else { "0" })
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(profile) = &config.profile_dir {
            command.env("ARIA_PILOT_PROFILE", profile);
        }

        let mut child = command.spawn().map_err(|e| {
            EngineError::BrowserLaunch(format!("could not start {} {}: {e}", config.node, config.driver.display()))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| EngineError::BrowserLaunch("driver stdin not captured".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::BrowserLaunch("driver stdout not captured".into()))?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "aria_pilot::driver", "{line}");
                }
            });
        }

        let mut lines = BufReader::new(stdout).lines();
        let limit = Duration::from_millis(config.launch_timeout_ms);
        let ready = match tokio::time::timeout(limit, lines.next_line()).await {
            Err(_) => {
                return Err(EngineError::BrowserLaunch(format!(
                    "no ready signal within {}ms",
                    config.launch_timeout_ms
                )));
            }
            Ok(Err(e)) => return Err(EngineError::BrowserLaunch(format!("reading ready signal: {e}"))),
            Ok(Ok(None)) => return Err(EngineError::BrowserLaunch("driver exited before signalling ready".into())),
            Ok(Ok(Some(line))) => line,
        };

        let response: DriverResponse = serde_json::from_str(ready.trim())
            .map_err(|e| EngineError::BrowserLaunch(format!("malformed ready signal {ready:?}: {e}")))?;
        if !response.ok || response.ready != Some(true) {
            return Err(EngineError::BrowserLaunch(
                response.error.unwrap_or_else(|| "driver did not report ready".into()),
            ));
        }

        info!(driver = %config.driver.display(), headless = config.headless, "browser session ready");

        let mut session = BrowserSession {
            child,
            stdin,
            lines,
            next_id: 0,
            closed: false,
        };

        if config.clear_cache {
            session.send_ok(&DriverCommand::ClearCache).await?;
            debug!("browser cache cleared");
        }

        Ok(session)
    }

    /// Send a command and read its response. Transport problems are fatal.
    async fn send(&mut self, command: &DriverCommand<'_>) -> Result<DriverResponse, EngineError> {
        if self.closed {
            return Err(EngineError::BrowserCrashed("session already closed".into()));
        }

        self.next_id += 1;
        let id = self.next_id;
        let mut json = serde_json::to_string(&DriverRequest { id, command })
            .map_err(|e| EngineError::json("serializing driver request", e))?;
        json.push('\n');

        self.stdin
            .write_all(json.as_bytes())
            .await
            .map_err(|e| EngineError::BrowserCrashed(format!("writing to driver: {e}")))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| EngineError::BrowserCrashed(format!("flushing driver stdin: {e}")))?;

        loop {
            let line = self
                .lines
                .next_line()
                .await
                .map_err(|e| EngineError::BrowserCrashed(format!("reading from driver: {e}")))?
                .ok_or_else(|| EngineError::BrowserCrashed("driver closed its output".into()))?;

            if line.trim().is_empty() {
                continue;
            }

            let response: DriverResponse = serde_json::from_str(line.trim()).map_err(|e| EngineError::Protocol {
                command: command.name().into(),
                error: format!("unparseable response {line:?}: {e}"),
            })?;

            match response.id {
                Some(rid) if rid == id => return Ok(response),
                Some(rid) => debug!(expected = id, got = rid, "discarding late driver response"),
                None => warn!(command = command.name(), "driver response without id discarded"),
            }
        }
    }

    /// Send a command; a driver-side error becomes an interaction failure.
    async fn send_ok(&mut self, command: &DriverCommand<'_>) -> Result<DriverResponse, EngineError> {
        let response = self.send(command).await?;
        if !response.ok {
            return Err(EngineError::Interaction(format!(
                "{}: {}",
                command.name(),
                response.error.unwrap_or_else(|| "unknown driver error".into())
            )));
        }
        Ok(response)
    }

    async fn send_data<T: serde::de::DeserializeOwned>(&mut self, command: &DriverCommand<'_>) -> Result<T, EngineError> {
        let response = self.send_ok(command).await?;
        let data = response.data.ok_or_else(|| EngineError::Protocol {
            command: command.name().into(),
            error: "response carries no data".into(),
        })?;
        serde_json::from_value(data).map_err(|e| EngineError::Protocol {
            command: command.name().into(),
            error: e.to_string(),
        })
    }
}

#[async_trait]
impl Page for BrowserSession {
    async fn capture(&mut self) -> Result<RawPage, EngineError> {
        self.send_data(&DriverCommand::Snapshot).await
    }

    async fn navigate(&mut self, url: &str) -> Result<(), EngineError> {
        self.send_ok(&DriverCommand::Navigate { url }).await.map(|_| ())
    }

    async fn click(&mut self, target: &LocatorDescriptor) -> Result<(), EngineError> {
        self.send_ok(&DriverCommand::Click { target }).await.map(|_| ())
    }

    async fn fill(&mut self, target: &LocatorDescriptor, text: &str) -> Result<(), EngineError> {
        self.send_ok(&DriverCommand::Fill { target, text }).await.map(|_| ())
    }

    async fn press(&mut self, key: &str) -> Result<(), EngineError> {
        self.send_ok(&DriverCommand::Press { key }).await.map(|_| ())
    }

    async fn scroll(&mut self, dx: i32, dy: i32) -> Result<(), EngineError> {
        self.send_ok(&DriverCommand::Scroll { dx, dy }).await.map(|_| ())
    }

    async fn wait_for_idle(&mut self) -> Result<(), EngineError> {
        self.send_ok(&DriverCommand::WaitIdle).await.map(|_| ())
    }

    async fn extract(&mut self, target: ExtractTarget) -> Result<Extracted, EngineError> {
        self.send_data(&DriverCommand::Extract { target }).await
    }

    async fn go_back(&mut self) -> Result<(), EngineError> {
        self.send_ok(&DriverCommand::GoBack).await.map(|_| ())
    }

    async fn reload(&mut self) -> Result<(), EngineError> {
        self.send_ok(&DriverCommand::Reload).await.map(|_| ())
    }

    async fn screenshot(&mut self, path: &Path) -> Result<(), EngineError> {
        self.send_ok(&DriverCommand::Screenshot { path }).await.map(|_| ())
    }

    async fn current_url(&mut self) -> Result<String, EngineError> {
        let response = self.send_ok(&DriverCommand::CurrentUrl).await?;
        response.url.ok_or_else(|| EngineError::Protocol {
            command: "current_url".into(),
            error: "no url in response".into(),
        })
    }

    async fn close(&mut self) -> Result<(), EngineError> {
        if self.closed {
            return Ok(());
        }

        // Best-effort quit; the process is killed if it does not go quietly.
        let quit = tokio::time::timeout(QUIT_GRACE, self.send(&DriverCommand::Quit)).await;
        self.closed = true;
        if !matches!(quit, Ok(Ok(_))) {
            debug!("driver did not acknowledge quit");
        }

        match tokio::time::timeout(QUIT_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => debug!(%status, "driver exited"),
            _ => {
                warn!("driver still running after quit, killing it");
                self.child
                    .kill()
                    .await
                    .map_err(|e| EngineError::io("killing browser driver", e))?;
            }
        }

        info!("browser session closed");
        Ok(())
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        if !self.closed {
            let _ = self.child.start_kill();
        }
    }
}
