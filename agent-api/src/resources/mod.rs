//! Process-wide browser and LLM singletons.
//!
//! Each handle is created on first demand and reused by every task. The
//! mutex guarding a slot is held across construction, so concurrent cold-start
//! callers wait for the first one and then share its handle. A failed or
//! timed-out construction leaves the slot empty and the next call retries.
//! A cached browser whose process has died is dropped and relaunched.

pub mod browser;
pub mod cdp;
pub mod dom;
pub mod llm;

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use shared_types::BrowserStatus;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

pub use browser::{
    BrowserError, BrowserLauncher, BrowserSession, ChromeLauncher, ElementTarget,
    PageObservation, PageSnapshot, SharedBrowser,
};
pub use llm::{
    ChatCompletion, ChatMessage, ChatRole, LlmClient, LlmConnector, LlmError, OpenAiConnector,
    SharedLlm, TokenUsage,
};

use crate::error::TaskError;

const BROWSER_NOT_STARTED: u8 = 0;
const BROWSER_STARTING: u8 = 1;
const BROWSER_READY: u8 = 2;

pub struct ResourceProvisioner {
    launcher: Arc<dyn BrowserLauncher>,
    connector: Arc<dyn LlmConnector>,
    startup_timeout: Duration,
    browser: Mutex<Option<SharedBrowser>>,
    /// Lifecycle of the browser slot, written under the slot lock and read
    /// without it.
    browser_state: AtomicU8,
    llm: Mutex<Option<SharedLlm>>,
}

impl ResourceProvisioner {
    pub fn new(
        launcher: Arc<dyn BrowserLauncher>,
        connector: Arc<dyn LlmConnector>,
        startup_timeout: Duration,
    ) -> Self {
        Self {
            launcher,
            connector,
            startup_timeout,
            browser: Mutex::new(None),
            browser_state: AtomicU8::new(BROWSER_NOT_STARTED),
            llm: Mutex::new(None),
        }
    }

    /// Shared browser session, launched on first call.
    pub async fn get_browser(&self) -> Result<SharedBrowser, TaskError> {
        let mut guard = self.browser.lock().await;
        if let Some(browser) = guard.as_ref() {
            if browser.is_alive().await {
                return Ok(browser.clone());
            }
            warn!("cached browser is no longer running, relaunching");
            if let Some(dead) = guard.take() {
                if let Err(e) = dead.close().await {
                    debug!(error = %e, "closing dead browser failed");
                }
            }
        }

        self.browser_state.store(BROWSER_STARTING, Ordering::SeqCst);
        info!(timeout_secs = self.startup_timeout.as_secs(), "starting browser");
        let browser = match tokio::time::timeout(self.startup_timeout, self.launcher.launch()).await
        {
            Ok(Ok(browser)) => browser,
            Ok(Err(e)) => {
                self.browser_state.store(BROWSER_NOT_STARTED, Ordering::SeqCst);
                error!(error = %e, "browser failed to start");
                return Err(TaskError::ResourceUnavailable(format!(
                    "Browser unavailable: {e}"
                )));
            }
            Err(_) => {
                self.browser_state.store(BROWSER_NOT_STARTED, Ordering::SeqCst);
                error!(
                    timeout_secs = self.startup_timeout.as_secs(),
                    "browser startup timeout"
                );
                return Err(TaskError::ResourceUnavailable(format!(
                    "Browser startup timeout after {}s",
                    self.startup_timeout.as_secs()
                )));
            }
        };

        *guard = Some(browser.clone());
        self.browser_state.store(BROWSER_READY, Ordering::SeqCst);
        info!("browser started");
        Ok(browser)
    }

    /// Shared LLM client, built on first call.
    pub async fn get_llm(&self) -> Result<SharedLlm, TaskError> {
        let mut guard = self.llm.lock().await;
        if let Some(llm) = guard.as_ref() {
            return Ok(llm.clone());
        }

        let llm = self.connector.connect().await.map_err(|e| {
            error!(error = %e, "LLM client failed to initialize");
            TaskError::ResourceUnavailable(format!("LLM unavailable: {e}"))
        })?;

        *guard = Some(llm.clone());
        Ok(llm)
    }

    /// Non-blocking view of the browser slot. Callers holding the slot lock
    /// to reuse a running browser do not affect it.
    pub fn browser_status(&self) -> BrowserStatus {
        match self.browser_state.load(Ordering::SeqCst) {
            BROWSER_READY => BrowserStatus::Ready,
            BROWSER_STARTING => BrowserStatus::Starting,
            _ => BrowserStatus::NotStarted,
        }
    }

    /// Close and drop the browser. A later `get_browser` launches a fresh one.
    pub async fn shutdown(&self) {
        let browser = {
            let mut guard = self.browser.lock().await;
            self.browser_state.store(BROWSER_NOT_STARTED, Ordering::SeqCst);
            guard.take()
        };
        if let Some(browser) = browser {
            if let Err(e) = browser.close().await {
                warn!(error = %e, "failed to close browser");
            }
        }
        self.llm.lock().await.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeConnector, FakeLauncher};

    fn provisioner(launcher: Arc<FakeLauncher>, connector: Arc<FakeConnector>) -> ResourceProvisioner {
        ResourceProvisioner::new(launcher, connector, Duration::from_secs(5))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_cold_start_constructs_browser_once() {
        let launcher = Arc::new(FakeLauncher::new().with_delay(Duration::from_millis(50)));
        let resources = Arc::new(provisioner(launcher.clone(), Arc::new(FakeConnector::new())));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let resources = resources.clone();
            handles.push(tokio::spawn(async move { resources.get_browser().await }));
        }

        let mut browsers = Vec::new();
        for handle in handles {
            browsers.push(handle.await.unwrap().ok().expect("browser"));
        }

        assert_eq!(launcher.launches.load(Ordering::SeqCst), 1);
        let first = &browsers[0];
        assert!(browsers.iter().all(|b| Arc::ptr_eq(b, first)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_cold_start_constructs_llm_once() {
        let connector = Arc::new(FakeConnector::new());
        let resources = Arc::new(provisioner(Arc::new(FakeLauncher::new()), connector.clone()));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let resources = resources.clone();
            handles.push(tokio::spawn(async move { resources.get_llm().await }));
        }
        let mut clients = Vec::new();
        for handle in handles {
            clients.push(handle.await.unwrap().ok().expect("llm"));
        }

        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
        assert!(clients.iter().all(|c| Arc::ptr_eq(c, &clients[0])));
    }

    #[tokio::test]
    async fn test_failed_launch_is_not_cached() {
        let launcher = Arc::new(FakeLauncher::new().failing_first(1));
        let resources = provisioner(launcher.clone(), Arc::new(FakeConnector::new()));

        let err = resources.get_browser().await.err().expect("first launch fails");
        assert!(matches!(err, TaskError::ResourceUnavailable(ref msg) if msg.starts_with("Browser unavailable")));
        assert_eq!(resources.browser_status(), BrowserStatus::NotStarted);

        assert!(resources.get_browser().await.is_ok());
        assert_eq!(launcher.launches.load(Ordering::SeqCst), 2);
        assert_eq!(resources.browser_status(), BrowserStatus::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_startup_timeout_is_resource_unavailable_and_retryable() {
        let launcher = Arc::new(FakeLauncher::new().with_delay(Duration::from_secs(120)));
        let resources = ResourceProvisioner::new(
            launcher.clone(),
            Arc::new(FakeConnector::new()),
            Duration::from_secs(60),
        );

        let err = resources.get_browser().await.err().expect("launch times out");
        assert_eq!(
            err,
            TaskError::ResourceUnavailable("Browser startup timeout after 60s".to_string())
        );
        assert_eq!(resources.browser_status(), BrowserStatus::NotStarted);
        assert_eq!(launcher.launches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_llm_connect_is_retryable() {
        let connector = Arc::new(FakeConnector::new().failing_first(1));
        let resources = provisioner(Arc::new(FakeLauncher::new()), connector.clone());

        assert!(resources.get_llm().await.is_err());
        assert!(resources.get_llm().await.is_ok());
        assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_shutdown_closes_browser() {
        let launcher = Arc::new(FakeLauncher::new());
        let resources = provisioner(launcher.clone(), Arc::new(FakeConnector::new()));

        resources.get_browser().await.ok().expect("browser");
        resources.shutdown().await;

        assert_eq!(launcher.closes.load(Ordering::SeqCst), 1);
        assert_eq!(resources.browser_status(), BrowserStatus::NotStarted);
    }

    #[tokio::test]
    async fn test_status_stays_ready_while_slot_is_locked() {
        let resources = provisioner(Arc::new(FakeLauncher::new()), Arc::new(FakeConnector::new()));
        resources.get_browser().await.ok().expect("browser");

        let _held = resources.browser.lock().await;

        assert_eq!(resources.browser_status(), BrowserStatus::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_is_starting_only_during_launch() {
        let launcher = Arc::new(FakeLauncher::new().with_delay(Duration::from_millis(200)));
        let resources = Arc::new(provisioner(launcher, Arc::new(FakeConnector::new())));

        let pending = tokio::spawn({
            let resources = resources.clone();
            async move { resources.get_browser().await.is_ok() }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(resources.browser_status(), BrowserStatus::Starting);

        assert!(pending.await.unwrap());
        assert_eq!(resources.browser_status(), BrowserStatus::Ready);
    }

    #[tokio::test]
    async fn test_dead_browser_is_relaunched() {
        let launcher = Arc::new(FakeLauncher::new());
        let resources = provisioner(launcher.clone(), Arc::new(FakeConnector::new()));
        let first = resources.get_browser().await.ok().expect("browser");

        launcher.crash_latest();
        let second = resources.get_browser().await.ok().expect("relaunched browser");

        assert!(!Arc::ptr_eq(&first, &second));
        assert!(second.is_alive().await);
        assert_eq!(launcher.launches.load(Ordering::SeqCst), 2);
        assert_eq!(resources.browser_status(), BrowserStatus::Ready);
    }

    #[tokio::test]
    async fn test_live_browser_is_reused() {
        let launcher = Arc::new(FakeLauncher::new());
        let resources = provisioner(launcher.clone(), Arc::new(FakeConnector::new()));

        let first = resources.get_browser().await.ok().expect("browser");
        let second = resources.get_browser().await.ok().expect("browser");

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(launcher.launches.load(Ordering::SeqCst), 1);
    }
}
