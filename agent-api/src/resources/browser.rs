//! Browser session contract and the headless Chrome implementation.
//!
//! Chrome is driven through its DevTools endpoints: the HTTP `/json/*` routes
//! open pages and list targets, and each page's debugger WebSocket evaluates
//! the scripts in [`dom`](super::dom) for clicking, typing and reading.

use std::fmt;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::TempDir;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::{cdp, dom};
use crate::config::BrowserConfig;

/// Fixed launch flags: headless, no sandbox (containers), no GPU or extensions.
const CHROME_ARGS: &[&str] = &[
    "--headless=new",
    "--no-sandbox",
    "--disable-dev-shm-usage",
    "--disable-gpu",
    "--disable-background-timer-throttling",
    "--disable-renderer-backgrounding",
    "--disable-backgrounding-occluded-windows",
    "--disable-extensions",
    "--disable-plugins",
    "--no-first-run",
    "--disable-default-apps",
];

/// Chrome writes its bound DevTools port here, inside the profile directory.
const DEVTOOLS_PORT_FILE: &str = "DevToolsActivePort";

const READINESS_POLL: Duration = Duration::from_millis(100);
const DEVTOOLS_REQUEST_TIMEOUT: Duration = Duration::from_secs(2);
const TITLE_POLL: Duration = Duration::from_millis(250);
const TITLE_POLL_ATTEMPTS: usize = 20;
const LOAD_POLL: Duration = Duration::from_millis(250);
const LOAD_POLL_ATTEMPTS: usize = 20;

pub type SharedBrowser = Arc<dyn BrowserSession>;

/// Where a navigation landed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSnapshot {
    pub url: String,
    pub title: String,
}

/// What the agent can see of the current page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageObservation {
    pub url: String,
    pub title: String,
    /// Visible text, truncated
    pub text: String,
    /// Short descriptions of visible links, buttons and form fields
    pub elements: Vec<String>,
}

/// An element addressed by CSS selector or by its visible label.
/// The selector wins when both are given.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ElementTarget {
    pub selector: Option<String>,
    pub label: Option<String>,
}

impl ElementTarget {
    pub fn selector(selector: impl Into<String>) -> Self {
        Self {
            selector: Some(selector.into()),
            label: None,
        }
    }

    pub fn label(label: impl Into<String>) -> Self {
        Self {
            selector: None,
            label: Some(label.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        let blank = |s: &Option<String>| s.as_deref().map_or(true, |s| s.trim().is_empty());
        blank(&self.selector) && blank(&self.label)
    }
}

impl fmt::Display for ElementTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.selector, &self.label) {
            (Some(selector), _) => write!(f, "selector '{selector}'"),
            (None, Some(label)) => write!(f, "label '{label}'"),
            (None, None) => f.write_str("no element"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BrowserError {
    #[error("failed to spawn browser {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },
    #[error("browser process exited during startup ({0})")]
    ExitedEarly(String),
    #[error("devtools request failed: {0}")]
    DevTools(#[from] reqwest::Error),
    #[error("devtools socket failed: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("devtools protocol error: {0}")]
    Cdp(String),
    #[error("invalid url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("no element matching {0}")]
    ElementNotFound(String),
    #[error("no page is open, navigate first")]
    NoPage,
    #[error("browser session is closed")]
    Closed,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl BrowserError {
    /// Errors the agent can react to by choosing a different action.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::InvalidUrl { .. } | Self::ElementNotFound(_) | Self::NoPage
        )
    }
}

/// A running browser shared by every task.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Open `url` and return the loaded page.
    async fn navigate(&self, url: &str) -> Result<PageSnapshot, BrowserError>;

    /// Text and interactive elements of the current page, if one is open.
    async fn observe(&self) -> Result<Option<PageObservation>, BrowserError>;

    async fn click(&self, target: &ElementTarget) -> Result<(), BrowserError>;

    /// Replace the value of a form field.
    async fn type_text(&self, target: &ElementTarget, text: &str) -> Result<(), BrowserError>;

    /// Visible text of an element, or of the whole page when `target` is `None`.
    async fn read_text(&self, target: Option<&ElementTarget>) -> Result<String, BrowserError>;

    /// Whether the underlying browser can still serve requests.
    async fn is_alive(&self) -> bool;

    async fn close(&self) -> Result<(), BrowserError>;
}

/// Builds a browser session. Each call is one expensive construction.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<SharedBrowser, BrowserError>;
}

/// `/json/version` body. Only a DevTools server fills in `Browser`.
#[derive(Debug, Deserialize)]
struct VersionInfo {
    #[serde(rename = "Browser")]
    browser: String,
}

pub struct ChromeLauncher {
    config: BrowserConfig,
    client: reqwest::Client,
}

impl ChromeLauncher {
    pub fn new(config: BrowserConfig) -> Result<Self, BrowserError> {
        let client = reqwest::Client::builder().timeout(DEVTOOLS_REQUEST_TIMEOUT).build()?;
        Ok(Self { config, client })
    }

    /// Wait until the spawned process publishes its DevTools port and that port
    /// answers as a browser. Returns the port. The caller bounds the wait.
    ///
    /// The port is read from the profile directory, which only this child
    /// writes to, so another process listening on a configured port is never
    /// mistaken for the browser.
    async fn wait_until_ready(
        &self,
        child: &mut Child,
        profile_dir: &Path,
    ) -> Result<u16, BrowserError> {
        let port_file = profile_dir.join(DEVTOOLS_PORT_FILE);
        loop {
            if let Some(status) = child.try_wait()? {
                return Err(BrowserError::ExitedEarly(status.to_string()));
            }
            let published = tokio::fs::read_to_string(&port_file)
                .await
                .ok()
                .and_then(|contents| parse_devtools_active_port(&contents));
            if let Some(port) = published {
                if let Some(version) = self.browser_version(port).await {
                    if let Some(status) = child.try_wait()? {
                        return Err(BrowserError::ExitedEarly(status.to_string()));
                    }
                    debug!(port, %version, "devtools answered");
                    return Ok(port);
                }
            }
            sleep(READINESS_POLL).await;
        }
    }

    async fn browser_version(&self, port: u16) -> Option<String> {
        let res = self
            .client
            .get(format!("http://127.0.0.1:{port}/json/version"))
            .send()
            .await
            .ok()?;
        if !res.status().is_success() {
            debug!(status = %res.status(), "devtools not ready");
            return None;
        }
        let info = res.json::<VersionInfo>().await.ok()?;
        Some(info.browser).filter(|browser| !browser.is_empty())
    }
}

/// First line of `DevToolsActivePort` is the port; the second is the browser
/// WebSocket path.
fn parse_devtools_active_port(contents: &str) -> Option<u16> {
    contents
        .lines()
        .next()?
        .trim()
        .parse::<u16>()
        .ok()
        .filter(|port| *port != 0)
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn launch(&self) -> Result<SharedBrowser, BrowserError> {
        let profile_dir = tempfile::Builder::new()
            .prefix("agent-api-chrome-")
            .tempdir()?;
        let binary = self.config.executable.display().to_string();

        info!(%binary, requested_port = self.config.debug_port, "launching headless browser");
        let mut child = Command::new(&self.config.executable)
            .args(CHROME_ARGS)
            .arg(format!("--remote-debugging-port={}", self.config.debug_port))
            .arg(format!("--user-data-dir={}", profile_dir.path().display()))
            .arg("about:blank")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| BrowserError::Spawn {
                binary: binary.clone(),
                source,
            })?;

        let port = self.wait_until_ready(&mut child, profile_dir.path()).await?;
        info!(port, "browser devtools ready");

        Ok(Arc::new(ChromeSession {
            endpoint: format!("http://127.0.0.1:{port}"),
            client: self.client.clone(),
            child: Mutex::new(Some(child)),
            current_target: Mutex::new(None),
            _profile_dir: profile_dir,
        }))
    }
}

/// Target entry returned by `/json/new` and `/json/list`.
#[derive(Debug, Clone, Deserialize)]
struct DevToolsTarget {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(rename = "webSocketDebuggerUrl", default)]
    ws_url: Option<String>,
}

impl From<DevToolsTarget> for PageSnapshot {
    fn from(target: DevToolsTarget) -> Self {
        Self {
            url: target.url,
            title: target.title,
        }
    }
}

/// The page opened by the last navigation.
#[derive(Debug, Clone)]
struct ActivePage {
    id: String,
    ws_url: String,
}

pub struct ChromeSession {
    endpoint: String,
    client: reqwest::Client,
    child: Mutex<Option<Child>>,
    current_target: Mutex<Option<ActivePage>>,
    _profile_dir: TempDir,
}

impl ChromeSession {
    /// Fails once the process has exited, and forgets the dead handle.
    async fn ensure_open(&self) -> Result<(), BrowserError> {
        let mut child = self.child.lock().await;
        let Some(process) = child.as_mut() else {
            return Err(BrowserError::Closed);
        };
        if let Some(status) = process.try_wait()? {
            warn!(%status, "browser process exited");
            child.take();
            return Err(BrowserError::Closed);
        }
        Ok(())
    }

    async fn active_page(&self) -> Result<ActivePage, BrowserError> {
        self.ensure_open().await?;
        self.current_target
            .lock()
            .await
            .clone()
            .ok_or(BrowserError::NoPage)
    }

    async fn list_targets(&self) -> Result<Vec<DevToolsTarget>, BrowserError> {
        let targets = self
            .client
            .get(format!("{}/json/list", self.endpoint))
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<DevToolsTarget>>()
            .await?;
        Ok(targets)
    }

    async fn find_target(&self, id: &str) -> Result<Option<DevToolsTarget>, BrowserError> {
        Ok(self.list_targets().await?.into_iter().find(|t| t.id == id))
    }

    /// Chrome reports the URL as title until the document title is parsed.
    async fn wait_for_title(&self, target: DevToolsTarget) -> Result<DevToolsTarget, BrowserError> {
        let mut latest = target;
        for _ in 0..TITLE_POLL_ATTEMPTS {
            if !latest.title.is_empty() && latest.title != latest.url {
                break;
            }
            sleep(TITLE_POLL).await;
            match self.find_target(&latest.id).await? {
                Some(target) => latest = target,
                None => break,
            }
        }
        Ok(latest)
    }

    /// A click may start a navigation. Wait for the document to settle;
    /// evaluation errors while the old document unloads count as not ready.
    async fn wait_for_load(&self, ws_url: &str) {
        for _ in 0..LOAD_POLL_ATTEMPTS {
            sleep(LOAD_POLL).await;
            if let Ok(Value::String(state)) = cdp::evaluate(ws_url, dom::READY_STATE).await {
                if state == "complete" {
                    return;
                }
            }
        }
        debug!("page still loading, continuing");
    }

    async fn run_element_script(
        &self,
        page: &ActivePage,
        target: &str,
        script: &str,
    ) -> Result<dom::ElementOutcome, BrowserError> {
        let value = cdp::evaluate(&page.ws_url, script).await?;
        let outcome: dom::ElementOutcome = serde_json::from_value(value)
            .map_err(|e| BrowserError::Cdp(format!("unexpected script result: {e}")))?;
        if !outcome.found {
            return Err(BrowserError::ElementNotFound(target.to_string()));
        }
        Ok(outcome)
    }

    async fn close_target(&self, id: &str) {
        let url = format!("{}/json/close/{id}", self.endpoint);
        if let Err(e) = self.client.get(url).send().await {
            warn!(target_id = id, error = %e, "failed to close previous page");
        }
    }
}

#[async_trait]
impl BrowserSession for ChromeSession {
    async fn navigate(&self, url: &str) -> Result<PageSnapshot, BrowserError> {
        self.ensure_open().await?;
        let parsed = validate_url(url)?;

        let target = self
            .client
            .put(format!("{}/json/new?{}", self.endpoint, parsed.as_str()))
            .send()
            .await?
            .error_for_status()?
            .json::<DevToolsTarget>()
            .await?;
        let ws_url = target
            .ws_url
            .clone()
            .ok_or_else(|| BrowserError::Cdp("new page has no debugger url".to_string()))?;

        let previous = self.current_target.lock().await.replace(ActivePage {
            id: target.id.clone(),
            ws_url,
        });
        if let Some(previous) = previous {
            self.close_target(&previous.id).await;
        }

        let loaded = self.wait_for_title(target).await?;
        debug!(url = %loaded.url, title = %loaded.title, "page loaded");
        Ok(loaded.into())
    }

    async fn observe(&self) -> Result<Option<PageObservation>, BrowserError> {
        let page = match self.active_page().await {
            Ok(page) => page,
            Err(BrowserError::NoPage) => return Ok(None),
            Err(e) => return Err(e),
        };
        let value = cdp::evaluate(&page.ws_url, &dom::observe()).await?;
        let observed: dom::ObservedPage = serde_json::from_value(value)
            .map_err(|e| BrowserError::Cdp(format!("unexpected observation: {e}")))?;
        Ok(Some(PageObservation {
            url: observed.url,
            title: observed.title,
            text: observed.text,
            elements: observed.elements,
        }))
    }

    async fn click(&self, target: &ElementTarget) -> Result<(), BrowserError> {
        if target.is_empty() {
            return Err(BrowserError::ElementNotFound(target.to_string()));
        }
        let page = self.active_page().await?;
        self.run_element_script(&page, &target.to_string(), &dom::click(target))
            .await?;
        debug!(%target, "clicked");
        self.wait_for_load(&page.ws_url).await;
        Ok(())
    }

    async fn type_text(&self, target: &ElementTarget, text: &str) -> Result<(), BrowserError> {
        if target.is_empty() {
            return Err(BrowserError::ElementNotFound(target.to_string()));
        }
        let page = self.active_page().await?;
        self.run_element_script(&page, &target.to_string(), &dom::type_text(target, text))
            .await?;
        debug!(%target, chars = text.chars().count(), "typed into field");
        Ok(())
    }

    async fn read_text(&self, target: Option<&ElementTarget>) -> Result<String, BrowserError> {
        let page = self.active_page().await?;
        let described = target.map_or_else(|| "page body".to_string(), ToString::to_string);
        let outcome = self
            .run_element_script(&page, &described, &dom::read_text(target))
            .await?;
        Ok(outcome.text)
    }

    async fn is_alive(&self) -> bool {
        self.ensure_open().await.is_ok()
    }

    async fn close(&self) -> Result<(), BrowserError> {
        let Some(mut child) = self.child.lock().await.take() else {
            return Ok(());
        };
        child.kill().await?;
        info!("browser closed");
        Ok(())
    }
}

/// Only absolute http(s) URLs are navigable.
pub fn validate_url(raw: &str) -> Result<url::Url, BrowserError> {
    let invalid = |reason: String| BrowserError::InvalidUrl {
        url: raw.to_string(),
        reason,
    };
    let parsed = url::Url::parse(raw.trim()).map_err(|e| invalid(e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(invalid(format!("unsupported scheme '{other}'"))),
    }
}
