use crate::error::ConfigError;
use crate::models::SenderIdentity;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const SETTINGS_FILE: &str = "settings.toml";

/// One year ahead.
const MAX_MEETING_OFFSET_HOURS: i64 = 24 * 366;
const MAX_MEETING_DURATION_HOURS: i64 = 24;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub poll_interval_secs: u64,
    pub error_backoff_secs: u64,
    pub max_results: u32,
    pub thread_context_limit: u32,
    pub database_url: String,
    pub credentials_path: String,
    pub llm: LlmSettings,
    pub slack: SlackSettings,
    pub identity: SenderIdentity,
    pub meetings: MeetingSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[default]
    Gemini,
    OpenAi,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub provider: LlmProvider,
    pub model: String,
    pub reply_model: Option<String>,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlackSettings {
    pub channel: String,
    pub api_base: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeetingSettings {
    pub start_offset_hours: i64,
    pub duration_hours: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_interval_secs: 300,
            error_backoff_secs: 600,
            max_results: 10,
            thread_context_limit: 3,
            database_url: "sqlite:emails.db?mode=rwc".to_string(),
            credentials_path: "credentials.json".to_string(),
            llm: LlmSettings::default(),
            slack: SlackSettings::default(),
            identity: SenderIdentity::default(),
            meetings: MeetingSettings::default(),
        }
    }
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: LlmProvider::Gemini,
            model: "gemini-1.5-flash".to_string(),
            reply_model: None,
            base_url: None,
        }
    }
}

impl Default for SlackSettings {
    fn default() -> Self {
        Self {
            channel: "#email-notifications".to_string(),
            api_base: "https://slack.com/api".to_string(),
        }
    }
}

impl Default for MeetingSettings {
    fn default() -> Self {
        Self {
            start_offset_hours: 24,
            duration_hours: 1,
        }
    }
}

impl LlmSettings {
    pub fn reply_model(&self) -> &str {
        self.reply_model.as_deref().unwrap_or(&self.model)
    }
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(SETTINGS_FILE)
    }

    /// A missing file means defaults; an unreadable or malformed one is fatal.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        use std::fs;
        let path = path.as_ref();
        let display = path.display().to_string();
        match fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: display,
                source,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Read {
                path: display,
                source,
            }),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.error_backoff_secs)
    }

    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.poll_interval_secs == 0 {
            errors.push("poll_interval_secs must be greater than zero".to_string());
        }
        if self.error_backoff_secs <= self.poll_interval_secs {
            errors.push("error_backoff_secs must be longer than poll_interval_secs".to_string());
        }
        if self.max_results == 0 {
            errors.push("max_results must be greater than zero".to_string());
        }
        if self.llm.model.trim().is_empty() {
            errors.push("llm.model must not be empty".to_string());
        }
        if self.slack.channel.trim().is_empty() {
            errors.push("slack.channel must not be empty".to_string());
        }
        if !(0..=MAX_MEETING_OFFSET_HOURS).contains(&self.meetings.start_offset_hours) {
            errors.push(format!(
                "meetings.start_offset_hours must be between 0 and {}",
                MAX_MEETING_OFFSET_HOURS
            ));
        }
        if !(1..=MAX_MEETING_DURATION_HOURS).contains(&self.meetings.duration_hours) {
            errors.push(format!(
                "meetings.duration_hours must be between 1 and {}",
                MAX_MEETING_DURATION_HOURS
            ));
        }
        if !Path::new(&self.credentials_path).exists() {
            errors.push(format!(
                "Gmail credentials file not found at: {}",
                self.credentials_path
            ));
        }
        errors
    }
}

/// Credentials pulled from the environment (and `.env`).
#[derive(Clone)]
pub struct Secrets {
    pub llm_api_key: String,
    pub slack_bot_token: String,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field("llm_api_key", &"<redacted>")
            .field("slack_bot_token", &"<redacted>")
            .finish()
    }
}

impl Secrets {
    pub fn from_env() -> Result<Self, Vec<String>> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, Vec<String>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut errors = Vec::new();

        let llm_api_key = read("LLM_API_KEY");
        if llm_api_key.is_none() {
            errors.push("LLM_API_KEY is missing from the environment".to_string());
        }

        let slack_bot_token = read("SLACK_BOT_TOKEN");
        match &slack_bot_token {
            None => errors.push("SLACK_BOT_TOKEN is missing from the environment".to_string()),
            Some(token) if !token.starts_with("xoxb-") => {
                errors.push("Invalid Slack Bot Token format - must start with 'xoxb-'".to_string())
            }
            Some(_) => {}
        }

        // Only checked for shape; posting needs the bot token alone.
        if let Some(token) = read("SLACK_APP_TOKEN") {
            if !token.starts_with("xapp-") {
                errors.push("Invalid Slack App Token format - must start with 'xapp-'".to_string());
            }
        }

        match (llm_api_key, slack_bot_token) {
            (Some(llm_api_key), Some(slack_bot_token)) if errors.is_empty() => Ok(Self {
                llm_api_key,
                slack_bot_token,
            }),
            _ => Err(errors),
        }
    }
}

/// Loads settings and secrets, reporting every problem at once.
pub fn load_validated() -> Result<(Config, Secrets), ConfigError> {
    let config = Config::load()?;
    let mut errors = config.validate();
    let secrets = match Secrets::from_env() {
        Ok(secrets) => Some(secrets),
        Err(mut secret_errors) => {
            errors.append(&mut secret_errors);
            None
        }
    };

    match secrets {
        Some(secrets) if errors.is_empty() => Ok((config, secrets)),
        _ => Err(ConfigError::Invalid(errors)),
    }
}
