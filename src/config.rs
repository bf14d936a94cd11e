use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::action::{self, LIMIT};

/// Hard ceiling on the configurable attempt count of one action run.
pub const MAX_ATTEMPTS: u32 = 20;

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Todo,
    Watering,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Todo => write!(f, "todo"),
            Mode::Watering => write!(f, "watering"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub bot: BotConfig,
    #[serde(default = "default_memory_config")]
    pub memory: MemoryConfig,
    #[serde(default = "default_browser_config")]
    pub browser: BrowserConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    /// Empty means every user may talk to the bot.
    #[serde(default)]
    pub allowed_user_ids: Vec<u64>,
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct BotConfig {
    #[serde(default)]
    pub mode: Mode,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MemoryConfig {
    #[serde(default = "default_db_path")]
    pub database_path: PathBuf,
    #[serde(default = "default_log_table")]
    pub log_table: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BrowserConfig {
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,
    #[serde(default = "default_trigger_selector")]
    pub trigger_selector: String,
    #[serde(default = "default_confirm_selector")]
    pub confirm_selector: String,
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    #[serde(default = "default_trigger_timeout_secs")]
    pub trigger_timeout_secs: u64,
    #[serde(default = "default_confirm_timeout_secs")]
    pub confirm_timeout_secs: u64,
    /// Upper bound for any single WebDriver request.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_headless")]
    pub headless: bool,
    /// Target used by the bare `/water` command.
    #[serde(default)]
    pub default_target: Option<String>,
}

fn default_poll_timeout_secs() -> u32 {
    30
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_poll_interval_ms() -> u64 {
    300
}

fn default_db_path() -> PathBuf {
    PathBuf::from("chorebot.db")
}

fn default_log_table() -> String {
    "logs".to_string()
}

fn default_webdriver_url() -> String {
    "http://localhost:9515".to_string()
}

fn default_trigger_selector() -> String {
    "div.f-kettle-body".to_string()
}

fn default_confirm_selector() -> String {
    "div.download-img".to_string()
}

fn default_attempts() -> u32 {
    LIMIT
}

fn default_trigger_timeout_secs() -> u64 {
    5
}

fn default_confirm_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_headless() -> bool {
    true
}

fn default_memory_config() -> MemoryConfig {
    MemoryConfig {
        database_path: default_db_path(),
        log_table: default_log_table(),
    }
}

fn default_browser_config() -> BrowserConfig {
    BrowserConfig {
        webdriver_url: default_webdriver_url(),
        trigger_selector: default_trigger_selector(),
        confirm_selector: default_confirm_selector(),
        attempts: default_attempts(),
        trigger_timeout_secs: default_trigger_timeout_secs(),
        confirm_timeout_secs: default_confirm_timeout_secs(),
        request_timeout_secs: default_request_timeout_secs(),
        headless: default_headless(),
        default_target: None,
    }
}

/// True when `name` can be spliced into SQL as a bare table name.
fn is_sql_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let token = std::env::var("TELEGRAM_BOT_TOKEN")
            .or_else(|_| std::env::var("TOKEN"))
            .ok();

        Self::from_toml(&content, token)
    }

    /// Parse and validate a config document. `token_override` wins over the
    /// `bot_token` written in the file.
    pub fn from_toml(content: &str, token_override: Option<String>) -> Result<Self> {
        let mut config: Config = toml::from_str(content).context("Failed to parse config file")?;

        if let Some(token) = token_override.filter(|t| !t.trim().is_empty()) {
            config.telegram.bot_token = token;
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.telegram.bot_token.trim().is_empty() {
            anyhow::bail!(
                "telegram.bot_token is empty (set it in the config file or via TELEGRAM_BOT_TOKEN)"
            );
        }

        if !is_sql_identifier(&self.memory.log_table) {
            anyhow::bail!(
                "memory.log_table '{}' is not a valid table name",
                self.memory.log_table
            );
        }

        if self.browser.attempts == 0 || self.browser.attempts > MAX_ATTEMPTS {
            anyhow::bail!(
                "browser.attempts must be between 1 and {}, got {}",
                MAX_ATTEMPTS,
                self.browser.attempts
            );
        }

        if self.browser.request_timeout_secs == 0 {
            anyhow::bail!("browser.request_timeout_secs must be at least 1");
        }

        reqwest::Url::parse(&self.browser.webdriver_url).with_context(|| {
            format!(
                "browser.webdriver_url '{}' is not a valid URL",
                self.browser.webdriver_url
            )
        })?;

        if let Some(target) = &self.browser.default_target {
            action::validate_target(target)
                .with_context(|| format!("browser.default_target '{}' is invalid", target))?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [telegram]
        bot_token = "123:abc"
    "#;

    #[test]
    fn test_defaults_applied() {
        let config = Config::from_toml(MINIMAL, None).unwrap();
        assert_eq!(config.bot.mode, Mode::Todo);
        assert_eq!(config.telegram.poll_timeout_secs, 30);
        assert!(config.telegram.allowed_user_ids.is_empty());
        assert_eq!(config.memory.log_table, "logs");
        assert_eq!(config.browser.attempts, LIMIT);
        assert_eq!(config.browser.trigger_selector, "div.f-kettle-body");
        assert_eq!(config.browser.confirm_selector, "div.download-img");
        assert_eq!(config.browser.request_timeout_secs, 30);
        assert!(config.browser.default_target.is_none());
    }

    #[test]
    fn test_token_override_wins() {
        let config = Config::from_toml(MINIMAL, Some("999:env".to_string())).unwrap();
        assert_eq!(config.telegram.bot_token, "999:env");
    }

    #[test]
    fn test_blank_override_ignored() {
        let config = Config::from_toml(MINIMAL, Some("  ".to_string())).unwrap();
        assert_eq!(config.telegram.bot_token, "123:abc");
    }

    #[test]
    fn test_missing_token_rejected() {
        let err = Config::from_toml("[telegram]\n", None).unwrap_err();
        assert!(err.to_string().contains("bot_token"));
    }

    #[test]
    fn test_watering_mode_parsed() {
        let content = r#"
            [telegram]
            bot_token = "t"

            [bot]
            mode = "watering"

            [browser]
            attempts = 3
            default_target = "https://plant.example/water"
        "#;
        let config = Config::from_toml(content, None).unwrap();
        assert_eq!(config.bot.mode, Mode::Watering);
        assert_eq!(config.browser.attempts, 3);
        assert_eq!(
            config.browser.default_target.as_deref(),
            Some("https://plant.example/water")
        );
    }

    #[test]
    fn test_bad_table_name_rejected() {
        let content = r#"
            [telegram]
            bot_token = "t"

            [memory]
            log_table = "logs; DROP TABLE items"
        "#;
        assert!(Config::from_toml(content, None).is_err());
    }

    #[test]
    fn test_attempts_capped() {
        let content = format!(
            "[telegram]\nbot_token = \"t\"\n\n[browser]\nattempts = {}\n",
            MAX_ATTEMPTS + 1
        );
        assert!(Config::from_toml(&content, None).is_err());

        let zero = "[telegram]\nbot_token = \"t\"\n\n[browser]\nattempts = 0\n";
        assert!(Config::from_toml(zero, None).is_err());
    }

    #[test]
    fn test_zero_request_timeout_rejected() {
        let content = "[telegram]\nbot_token = \"t\"\n\n[browser]\nrequest_timeout_secs = 0\n";
        let err = Config::from_toml(content, None).unwrap_err();
        assert!(err.to_string().contains("request_timeout_secs"));
    }

    #[test]
    fn test_invalid_default_target_rejected() {
        let content = r#"
            [telegram]
            bot_token = "t"

            [browser]
            default_target = "ftp://plant.example"
        "#;
        assert!(Config::from_toml(content, None).is_err());
    }

    #[test]
    fn test_sql_identifier() {
        assert!(is_sql_identifier("logs"));
        assert!(is_sql_identifier("_plant_log2"));
        assert!(!is_sql_identifier("2logs"));
        assert!(!is_sql_identifier(""));
        assert!(!is_sql_identifier("a-b"));
    }
}
