use serde::Deserialize;

use crate::resources::ElementTarget;

/// One instruction returned by the LLM per step.
///
/// Element actions address their element by `selector` or by `label`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AgentAction {
    Navigate {
        url: String,
    },
    Click {
        selector: Option<String>,
        label: Option<String>,
    },
    Type {
        selector: Option<String>,
        label: Option<String>,
        text: String,
    },
    /// Whole page when neither selector nor label is given.
    ReadText {
        selector: Option<String>,
        label: Option<String>,
    },
    Done {
        #[serde(default = "default_success")]
        success: bool,
        #[serde(default)]
        summary: String,
    },
}

fn default_success() -> bool {
    true
}

pub(crate) fn element_target(selector: Option<String>, label: Option<String>) -> ElementTarget {
    ElementTarget { selector, label }
}

#[derive(Debug, thiserror::Error)]
pub enum ActionParseError {
    #[error("reply did not contain a JSON object")]
    NoJson,
    #[error("reply was not a valid action: {0}")]
    Invalid(#[from] serde_json::Error),
}

/// Parse an LLM reply into an action. Tolerates markdown fences and prose
/// around the JSON object.
pub fn parse_action(reply: &str) -> Result<AgentAction, ActionParseError> {
    let start = reply.find('{').ok_or(ActionParseError::NoJson)?;
    let end = reply.rfind('}').ok_or(ActionParseError::NoJson)?;
    if end < start {
        return Err(ActionParseError::NoJson);
    }
    Ok(serde_json::from_str(&reply[start..=end])?)
}
