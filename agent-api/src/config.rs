use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::agent::Secrets;

/// Instruction executed when a submission carries no custom task.
pub const DEFAULT_TASK: &str = "\
1. Go to https://www.guruwalk.com/es
2. Click 'Iniciar sesión' or 'Login'.
3. Click the button that says 'Seguir con contraseña' or similar.
4. When the fields appear, type <secret>account_email</secret> into the email field.
5. Type <secret>account_password</secret> into the password field exactly as given.
6. Click 'Iniciar sesión' to complete the login.
7. Once inside, navigate to the 'Reservas' section.
8. Read the page text and confirm that the content of 'Reservas' is visible.
9. Finish by reporting that the flow succeeded.";

/// Env vars with this prefix become agent secrets, named by the lowercased rest:
/// `AGENT_SECRET_ACCOUNT_EMAIL` is typed through `<secret>account_email</secret>`.
const SECRET_ENV_PREFIX: &str = "AGENT_SECRET_";

/// Chrome/Chromium executables searched on `PATH` when `CHROME_PATH` is unset.
const CHROME_CANDIDATES: &[&str] = &[
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
    "chrome",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    fn from_env(value: &str) -> anyhow::Result<Self> {
        match value {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(anyhow::anyhow!(
                "Invalid LOG_FORMAT '{other}'. Expected 'text' or 'json'"
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BrowserConfig {
    /// Chrome/Chromium executable
    pub executable: PathBuf,
    /// CDP remote-debugging port. 0 lets Chrome pick a free one.
    pub debug_port: u16,
    /// Upper bound for launching the browser and waiting for DevTools
    pub startup_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Credential for the OpenAI-compatible endpoint. Checked lazily.
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP server binds to
    pub host: String,
    /// Port the HTTP server listens on
    pub port: u16,
    pub browser: BrowserConfig,
    pub llm: LlmConfig,
    /// Step budget for one agent run
    pub agent_max_steps: usize,
    /// Optional upper bound for one agent run
    pub task_timeout: Option<Duration>,
    /// How long shutdown waits for in-flight tasks
    pub shutdown_drain: Duration,
    /// Instruction used when a submission has no custom task
    pub default_task: String,
    /// Values the agent types by name, never shown to the LLM
    pub secrets: Secrets,
    pub log_format: LogFormat,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let task_timeout_secs: Option<u64> = env_parse_opt("TASK_TIMEOUT_SECS")?;

        Ok(Self {
            host: env_str("HOST", "0.0.0.0"),
            port: env_parse("PORT", 8000)?,
            browser: BrowserConfig {
                executable: match std::env::var("CHROME_PATH") {
                    Ok(path) => PathBuf::from(path),
                    Err(_) => find_chrome().unwrap_or_else(|| PathBuf::from(CHROME_CANDIDATES[0])),
                },
                debug_port: env_parse("BROWSER_DEBUG_PORT", 0)?,
                startup_timeout: Duration::from_secs(env_parse(
                    "BROWSER_STARTUP_TIMEOUT_SECS",
                    60,
                )?),
            },
            llm: LlmConfig {
                api_key: std::env::var("OPENAI_API_KEY")
                    .ok()
                    .filter(|key| !key.trim().is_empty()),
                base_url: env_str("OPENAI_BASE_URL", "https://api.openai.com/v1"),
                model: env_str("LLM_MODEL", "gpt-4o-mini"),
                request_timeout: Duration::from_secs(env_parse("LLM_REQUEST_TIMEOUT_SECS", 120)?),
            },
            agent_max_steps: env_parse("AGENT_MAX_STEPS", 25)?,
            task_timeout: task_timeout_secs.map(Duration::from_secs),
            shutdown_drain: Duration::from_secs(env_parse("SHUTDOWN_DRAIN_SECS", 30)?),
            default_task: env_str("DEFAULT_TASK", DEFAULT_TASK),
            secrets: secrets_from_vars(std::env::vars_os().filter_map(|(key, value)| {
                Some((key.into_string().ok()?, value.into_string().ok()?))
            })),
            log_format: LogFormat::from_env(&env_str("LOG_FORMAT", "text"))?,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> anyhow::Result<T>
where
    T::Err: std::fmt::Display,
{
    Ok(env_parse_opt(key)?.unwrap_or(default))
}

fn env_parse_opt<T: std::str::FromStr>(key: &str) -> anyhow::Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(val) => parse_value(key, &val).map(Some),
        Err(_) => Ok(None),
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, val: &str) -> anyhow::Result<T>
where
    T::Err: std::fmt::Display,
{
    val.trim()
        .parse::<T>()
        .map_err(|e| anyhow::anyhow!("Failed to parse env var {key}={val}: {e}"))
}

fn secrets_from_vars(vars: impl IntoIterator<Item = (String, String)>) -> Secrets {
    let mut secrets = Secrets::new();
    for (key, value) in vars {
        let Some(name) = key.strip_prefix(SECRET_ENV_PREFIX) else {
            continue;
        };
        if name.is_empty() || value.is_empty() {
            continue;
        }
        secrets.insert(name.to_ascii_lowercase(), value);
    }
    secrets
}

/// First Chrome/Chromium candidate found on `PATH`.
fn find_chrome() -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path).find_map(|dir| find_in_dir(&dir))
}

fn find_in_dir(dir: &Path) -> Option<PathBuf> {
    CHROME_CANDIDATES
        .iter()
        .map(|name| dir.join(name))
        .find(|candidate| candidate.is_file())
}
