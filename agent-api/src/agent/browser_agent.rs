use async_trait::async_trait;
use shared_types::UsageSummary;
use tracing::{debug, info};

use super::action::{element_target, parse_action, AgentAction};
use super::secrets::Secrets;
use super::{AgentError, AgentRunOutput, AutomationAgent};
use crate::resources::{BrowserError, ChatMessage, PageObservation, SharedBrowser, SharedLlm};

const SYSTEM_PROMPT: &str = "\
You operate a web browser to complete the user's task.
Reply with exactly one JSON object per turn and nothing else.
Available actions:
  {\"action\": \"navigate\", \"url\": \"https://...\"}
  {\"action\": \"click\", \"label\": \"visible text of a link or button\"}
  {\"action\": \"type\", \"label\": \"field placeholder or name\", \"text\": \"...\"}
  {\"action\": \"read_text\"}
  {\"action\": \"done\", \"success\": true, \"summary\": \"what you observed\"}
Element actions accept \"selector\" (CSS) instead of \"label\".
read_text without selector or label returns the whole page text.
After each action you will see the page URL, title, visible text and elements.
Use done with success false if the task cannot be completed.";

/// Page text shown to the model per observation.
const OBSERVATION_TEXT_CHARS: usize = 2000;
/// Text returned by `read_text` shown to the model.
const READ_TEXT_CHARS: usize = 4000;

/// LLM-driven step loop. Each step is one chat completion followed by at most
/// one browser action.
pub struct BrowserAgent {
    max_steps: usize,
    secrets: Secrets,
}

impl BrowserAgent {
    pub fn new(max_steps: usize) -> Self {
        Self {
            max_steps: max_steps.max(1),
            secrets: Secrets::new(),
        }
    }

    /// Values the model may type by name through `<secret>name</secret>`.
    pub fn with_secrets(mut self, secrets: Secrets) -> Self {
        self.secrets = secrets;
        self
    }

    fn system_prompt(&self) -> String {
        if self.secrets.is_empty() {
            return SYSTEM_PROMPT.to_string();
        }
        let names: Vec<&str> = self.secrets.names().collect();
        format!(
            "{SYSTEM_PROMPT}\nSecrets you can type: {}. Write <secret>name</secret> \
             in a type action's text and the value is filled in for you.",
            names.join(", ")
        )
    }

    /// Perform one browser action and describe its outcome for the model.
    async fn act(
        &self,
        browser: &SharedBrowser,
        action: AgentAction,
    ) -> Result<String, BrowserError> {
        match action {
            AgentAction::Navigate { url } => {
                let page = browser.navigate(&url).await?;
                Ok(format!("Opened {}.", page.url))
            }
            AgentAction::Click { selector, label } => {
                let target = element_target(selector, label);
                browser.click(&target).await?;
                Ok(format!("Clicked {target}."))
            }
            AgentAction::Type {
                selector,
                label,
                text,
            } => {
                let target = element_target(selector, label);
                let value = match self.secrets.resolve(&text) {
                    Ok(value) => value,
                    Err(e) => {
                        let known: Vec<&str> = self.secrets.names().collect();
                        let known = if known.is_empty() {
                            "none".to_string()
                        } else {
                            known.join(", ")
                        };
                        return Ok(format!("Typing rejected: {e}. Known secrets: {known}."));
                    }
                };
                browser.type_text(&target, &value).await?;
                Ok(format!("Typed into {target}."))
            }
            AgentAction::ReadText { selector, label } => {
                let target = element_target(selector, label);
                let target = (!target.is_empty()).then_some(target);
                let text = browser.read_text(target.as_ref()).await?;
                let source = target.map_or_else(|| "page".to_string(), |t| t.to_string());
                Ok(format!(
                    "Text of {source}:\n{}",
                    truncate_chars(&text, READ_TEXT_CHARS)
                ))
            }
            AgentAction::Done { .. } => Ok(String::new()),
        }
    }
}

fn describe_page(page: Option<&PageObservation>) -> String {
    let Some(page) = page else {
        return "Current page: none (browser is idle)".to_string();
    };
    let mut described = format!("Current page: {} ({})", page.title, page.url);
    let text = page.text.trim();
    if !text.is_empty() {
        described.push_str("\nVisible text:\n");
        described.push_str(&truncate_chars(text, OBSERVATION_TEXT_CHARS));
    }
    if !page.elements.is_empty() {
        described.push_str("\nInteractive elements:");
        for element in &page.elements {
            described.push_str("\n- ");
            described.push_str(element);
        }
    }
    described
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[async_trait]
impl AutomationAgent for BrowserAgent {
    async fn run(
        &self,
        task: &str,
        llm: SharedLlm,
        browser: SharedBrowser,
    ) -> Result<AgentRunOutput, AgentError> {
        let page = browser.observe().await?;
        let mut messages = vec![
            ChatMessage::system(self.system_prompt()),
            ChatMessage::user(format!("Task:\n{task}\n\n{}", describe_page(page.as_ref()))),
        ];
        let mut usage = UsageSummary::default();

        for step in 1..=self.max_steps {
            let completion = llm.chat(&messages).await?;
            if let Some(tokens) = completion.usage {
                usage.record(tokens.prompt_tokens, tokens.completion_tokens);
            }

            let action = parse_action(&completion.content);
            messages.push(ChatMessage::assistant(completion.content));

            let feedback = match action {
                Ok(AgentAction::Done { success, summary }) => {
                    info!(step, success, "agent finished");
                    if !success {
                        return Err(AgentError::Unsuccessful(summary));
                    }
                    return Ok(AgentRunOutput {
                        final_result: Some(summary).filter(|s| !s.trim().is_empty()),
                        steps: step,
                        usage: (!usage.is_empty()).then_some(usage),
                    });
                }
                Ok(action) => {
                    debug!(step, action = action_name(&action), "agent acting");
                    let outcome = match self.act(&browser, action).await {
                        Ok(outcome) => outcome,
                        Err(e @ BrowserError::InvalidUrl { .. }) => {
                            format!("Navigation rejected: {e}. Use an absolute http(s) URL.")
                        }
                        Err(e) if e.is_recoverable() => format!("Action failed: {e}."),
                        Err(e) => return Err(e.into()),
                    };
                    let page = browser.observe().await?;
                    format!("{outcome}\n\n{}", describe_page(page.as_ref()))
                }
                Err(e) => {
                    debug!(step, error = %e, "agent reply was not an action");
                    format!("Your reply was not a valid action ({e}). Reply with one JSON action.")
                }
            };
            messages.push(ChatMessage::user(feedback));
        }

        Err(AgentError::StepBudgetExhausted(self.max_steps))
    }
}

/// Action kind for logs. Never includes typed text.
fn action_name(action: &AgentAction) -> &'static str {
    match action {
        AgentAction::Navigate { .. } => "navigate",
        AgentAction::Click { .. } => "click",
        AgentAction::Type { .. } => "type",
        AgentAction::ReadText { .. } => "read_text",
        AgentAction::Done { .. } => "done",
    }
}
