//! In-crate fakes for the browser, LLM, and agent capabilities.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use shared_types::UsageSummary;

use crate::agent::{AgentError, AgentRunOutput, AutomationAgent};
use crate::resources::{
    browser::validate_url, BrowserError, BrowserLauncher, BrowserSession, ChatCompletion,
    ChatMessage, ElementTarget, LlmClient, LlmConnector, LlmError, PageObservation, PageSnapshot,
    SharedBrowser, SharedLlm, TokenUsage,
};

/// Records every action. Elements are matched by exact label or selector
/// against the names given to `with_elements`.
pub(crate) struct FakeBrowser {
    navigations: Mutex<Vec<String>>,
    page: Mutex<Option<PageSnapshot>>,
    page_text: String,
    elements: Vec<String>,
    clicks: Mutex<Vec<ElementTarget>>,
    typed: Mutex<Vec<(ElementTarget, String)>>,
    closes: Arc<AtomicUsize>,
    alive: Arc<AtomicBool>,
}

impl FakeBrowser {
    pub(crate) fn new() -> Self {
        Self::with_counters(Arc::new(AtomicUsize::new(0)), Arc::new(AtomicBool::new(true)))
    }

    fn with_counters(closes: Arc<AtomicUsize>, alive: Arc<AtomicBool>) -> Self {
        Self {
            navigations: Mutex::new(Vec::new()),
            page: Mutex::new(None),
            page_text: String::new(),
            elements: Vec::new(),
            clicks: Mutex::new(Vec::new()),
            typed: Mutex::new(Vec::new()),
            closes,
            alive,
        }
    }

    pub(crate) fn with_page_text(mut self, text: impl Into<String>) -> Self {
        self.page_text = text.into();
        self
    }

    pub(crate) fn with_elements<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.elements = names.into_iter().map(Into::into).collect();
        self
    }

    pub(crate) fn navigations(&self) -> Vec<String> {
        self.navigations.lock().unwrap().clone()
    }

    pub(crate) fn clicks(&self) -> Vec<ElementTarget> {
        self.clicks.lock().unwrap().clone()
    }

    pub(crate) fn typed(&self) -> Vec<(ElementTarget, String)> {
        self.typed.lock().unwrap().clone()
    }

    fn require_page(&self) -> Result<(), BrowserError> {
        if self.page.lock().unwrap().is_none() {
            return Err(BrowserError::NoPage);
        }
        Ok(())
    }

    fn resolve(&self, target: &ElementTarget) -> Result<(), BrowserError> {
        self.require_page()?;
        let name = target.selector.as_ref().or(target.label.as_ref());
        match name {
            Some(name) if self.elements.contains(name) => Ok(()),
            _ => Err(BrowserError::ElementNotFound(target.to_string())),
        }
    }
}

#[async_trait]
impl BrowserSession for FakeBrowser {
    async fn navigate(&self, url: &str) -> Result<PageSnapshot, BrowserError> {
        let parsed = validate_url(url)?;
        self.navigations.lock().unwrap().push(url.to_string());
        let page = PageSnapshot {
            url: parsed.to_string(),
            title: format!("Page at {}", parsed.host_str().unwrap_or_default()),
        };
        *self.page.lock().unwrap() = Some(page.clone());
        Ok(page)
    }

    async fn observe(&self) -> Result<Option<PageObservation>, BrowserError> {
        Ok(self.page.lock().unwrap().clone().map(|page| PageObservation {
            url: page.url,
            title: page.title,
            text: self.page_text.clone(),
            elements: self.elements.iter().map(|name| format!("element \"{name}\"")).collect(),
        }))
    }

    async fn click(&self, target: &ElementTarget) -> Result<(), BrowserError> {
        self.resolve(target)?;
        self.clicks.lock().unwrap().push(target.clone());
        Ok(())
    }

    async fn type_text(&self, target: &ElementTarget, text: &str) -> Result<(), BrowserError> {
        self.resolve(target)?;
        self.typed
            .lock()
            .unwrap()
            .push((target.clone(), text.to_string()));
        Ok(())
    }

    async fn read_text(&self, target: Option<&ElementTarget>) -> Result<String, BrowserError> {
        match target {
            Some(target) => {
                self.resolve(target)?;
                Ok(format!("text of {target}"))
            }
            None => {
                self.require_page()?;
                Ok(self.page_text.clone())
            }
        }
    }

    async fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<(), BrowserError> {
        self.alive.store(false, Ordering::SeqCst);
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub(crate) struct FakeLauncher {
    pub(crate) launches: AtomicUsize,
    pub(crate) closes: Arc<AtomicUsize>,
    latest_alive: Mutex<Option<Arc<AtomicBool>>>,
    delay: Duration,
    fail_first: usize,
}

impl FakeLauncher {
    pub(crate) fn new() -> Self {
        Self {
            launches: AtomicUsize::new(0),
            closes: Arc::new(AtomicUsize::new(0)),
            latest_alive: Mutex::new(None),
            delay: Duration::ZERO,
            fail_first: 0,
        }
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn failing_first(mut self, n: usize) -> Self {
        self.fail_first = n;
        self
    }

    /// Simulate the most recently launched browser process dying.
    pub(crate) fn crash_latest(&self) {
        if let Some(alive) = self.latest_alive.lock().unwrap().as_ref() {
            alive.store(false, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self) -> Result<SharedBrowser, BrowserError> {
        let attempt = self.launches.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if attempt < self.fail_first {
            return Err(BrowserError::ExitedEarly("exit status: 1".to_string()));
        }
        let alive = Arc::new(AtomicBool::new(true));
        *self.latest_alive.lock().unwrap() = Some(alive.clone());
        Ok(Arc::new(FakeBrowser::with_counters(self.closes.clone(), alive)))
    }
}

pub(crate) struct FakeLlm {
    replies: Mutex<VecDeque<String>>,
    usage: Option<TokenUsage>,
    calls: Mutex<Vec<Vec<ChatMessage>>>,
}

impl FakeLlm {
    pub(crate) fn scripted<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            usage: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }

    /// Message history sent on each call, in order.
    pub(crate) fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmClient for FakeLlm {
    fn model(&self) -> &str {
        "fake-model"
    }

    async fn chat(&self, messages: &[ChatMessage]) -> Result<ChatCompletion, LlmError> {
        self.calls.lock().unwrap().push(messages.to_vec());
        let content = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(LlmError::EmptyResponse)?;
        Ok(ChatCompletion {
            content,
            usage: self.usage,
        })
    }
}

pub(crate) struct FakeConnector {
    pub(crate) connects: AtomicUsize,
    fail_first: usize,
}

impl FakeConnector {
    pub(crate) fn new() -> Self {
        Self {
            connects: AtomicUsize::new(0),
            fail_first: 0,
        }
    }

    pub(crate) fn failing_first(mut self, n: usize) -> Self {
        self.fail_first = n;
        self
    }
}

#[async_trait]
impl LlmConnector for FakeConnector {
    async fn connect(&self) -> Result<SharedLlm, LlmError> {
        let attempt = self.connects.fetch_add(1, Ordering::SeqCst);
        // Yield so concurrent callers actually contend for the slot.
        tokio::task::yield_now().await;
        if attempt < self.fail_first {
            return Err(LlmError::MissingApiKey);
        }
        Ok(Arc::new(FakeLlm::scripted(Vec::<String>::new())))
    }
}

#[derive(Debug, Clone)]
pub(crate) enum FakeOutcome {
    Succeed,
    Fail(String),
    Panic,
}

/// Records every task it receives and tracks how many runs overlap.
pub(crate) struct FakeAgent {
    outcome: FakeOutcome,
    delay: Duration,
    tasks: Mutex<Vec<String>>,
    running: AtomicUsize,
    pub(crate) max_running: AtomicUsize,
    pub(crate) saw_browser: AtomicBool,
}

impl FakeAgent {
    pub(crate) fn new(outcome: FakeOutcome) -> Self {
        Self {
            outcome,
            delay: Duration::ZERO,
            tasks: Mutex::new(Vec::new()),
            running: AtomicUsize::new(0),
            max_running: AtomicUsize::new(0),
            saw_browser: AtomicBool::new(false),
        }
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn tasks(&self) -> Vec<String> {
        self.tasks.lock().unwrap().clone()
    }
}

#[async_trait]
impl AutomationAgent for FakeAgent {
    async fn run(
        &self,
        task: &str,
        _llm: SharedLlm,
        browser: SharedBrowser,
    ) -> Result<AgentRunOutput, AgentError> {
        self.tasks.lock().unwrap().push(task.to_string());
        self.saw_browser
            .store(browser.is_alive().await, Ordering::SeqCst);

        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.running.fetch_sub(1, Ordering::SeqCst);

        match &self.outcome {
            FakeOutcome::Succeed => {
                let mut usage = UsageSummary::default();
                usage.record(120, 30);
                Ok(AgentRunOutput {
                    final_result: Some(format!("done: {task}")),
                    steps: 1,
                    usage: Some(usage),
                })
            }
            FakeOutcome::Fail(reason) => Err(AgentError::Unsuccessful(reason.clone())),
            FakeOutcome::Panic => panic!("agent exploded"),
        }
    }
}
