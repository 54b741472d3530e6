use std::collections::BTreeMap;
use std::fmt;

/// Opening and closing tags of a secret placeholder in typed text.
const OPEN_TAG: &str = "<secret>";
const CLOSE_TAG: &str = "</secret>";

/// Named values the agent may type without the LLM ever seeing them.
///
/// The model only learns the names and writes `<secret>name</secret>` where a
/// value belongs. Values are substituted right before they reach the browser.
#[derive(Clone, Default)]
pub struct Secrets(BTreeMap<String, String>);

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown secret '{0}'")]
pub struct UnknownSecret(pub String);

impl Secrets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Replace every placeholder in `text` with its value. An unterminated
    /// opening tag is kept literally.
    pub fn resolve(&self, text: &str) -> Result<String, UnknownSecret> {
        let mut resolved = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(open) = rest.find(OPEN_TAG) {
            let after_open = &rest[open + OPEN_TAG.len()..];
            let Some(close) = after_open.find(CLOSE_TAG) else {
                break;
            };
            let name = after_open[..close].trim();
            let value = self
                .0
                .get(name)
                .ok_or_else(|| UnknownSecret(name.to_string()))?;
            resolved.push_str(&rest[..open]);
            resolved.push_str(value);
            rest = &after_open[close + CLOSE_TAG.len()..];
        }
        resolved.push_str(rest);
        Ok(resolved)
    }
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secrets")
            .field("names", &self.0.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
