//! Automation agent capability.
//!
//! The task executor only sees [`AutomationAgent::run`]. [`BrowserAgent`] is the
//! implementation the binary ships: an LLM-driven step loop over a shared
//! browser session.

mod action;
mod browser_agent;
mod secrets;

use std::sync::Arc;

use async_trait::async_trait;
use shared_types::UsageSummary;

use crate::resources::{BrowserError, LlmError, SharedBrowser, SharedLlm};

pub use action::{parse_action, ActionParseError, AgentAction};
pub use browser_agent::BrowserAgent;
pub use secrets::{Secrets, UnknownSecret};

pub type SharedAgent = Arc<dyn AutomationAgent>;

/// What a finished agent run reports back.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentRunOutput {
    /// Summary the agent gave when it declared the task done
    pub final_result: Option<String>,
    /// LLM round-trips taken
    pub steps: usize,
    pub usage: Option<UsageSummary>,
}

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("LLM call failed: {0}")]
    Llm(#[from] LlmError),
    #[error("browser action failed: {0}")]
    Browser(#[from] BrowserError),
    #[error("agent did not finish within {0} steps")]
    StepBudgetExhausted(usize),
    #[error("agent reported the task as unsuccessful: {0}")]
    Unsuccessful(String),
}

#[async_trait]
pub trait AutomationAgent: Send + Sync {
    async fn run(
        &self,
        task: &str,
        llm: SharedLlm,
        browser: SharedBrowser,
    ) -> Result<AgentRunOutput, AgentError>;
}
