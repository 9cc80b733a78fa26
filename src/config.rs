//! Configuration loader and validator for the campaign dispatcher.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub email: Email,
    #[serde(default)]
    pub dispatch: Dispatch,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    pub listen_addr: String,
    /// Period of the in-process trigger. Zero leaves triggering to an external cron.
    #[serde(default)]
    pub tick_interval_secs: u64,
    /// Offset applied to UTC before evaluating campaign send windows.
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

/// Email provider settings (Resend-compatible HTTP API).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Email {
    pub api_key: String,
    pub base_url: String,
    pub from: String,
    pub reply_to: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Per-run dispatch policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Dispatch {
    #[serde(default = "default_send_delay_ms")]
    pub send_delay_ms: u64,
    #[serde(default = "default_cooldown_days")]
    pub cooldown_days: i64,
    #[serde(default = "default_lease_seconds")]
    pub lease_seconds: i64,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_send_delay_ms() -> u64 {
    600
}

fn default_cooldown_days() -> i64 {
    7
}

fn default_lease_seconds() -> i64 {
    300
}

impl Default for Dispatch {
    fn default() -> Self {
        Self {
            send_delay_ms: default_send_delay_ms(),
            cooldown_days: default_cooldown_days(),
            lease_seconds: default_lease_seconds(),
        }
    }
}

impl App {
    /// Ensure required directories exist (creates `data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.data_dir)
    }

    /// Database URL, honoring `DATABASE_URL` when set.
    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| format!("sqlite://{}/outreach.db", self.data_dir))
    }
}

impl Config {
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        self.app.ensure_dirs()
    }

    pub fn database_url(&self) -> String {
        self.app.database_url()
    }

    pub fn tick_interval(&self) -> Option<Duration> {
        (self.app.tick_interval_secs > 0).then(|| Duration::from_secs(self.app.tick_interval_secs))
    }
}

/// The `app` section alone; other sections are ignored.
#[derive(Deserialize)]
struct AppOnly {
    app: App,
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
/// - `RESEND_API_KEY` overrides `email.api_key`.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let mut cfg: Config = serde_yaml::from_str(&content)?;
    if let Ok(key) = std::env::var("RESEND_API_KEY") {
        if !key.trim().is_empty() {
            cfg.email.api_key = key;
        }
    }
    validate(&cfg)?;
    Ok(cfg)
}

/// Load only the `app` section, for tools that touch the database but never
/// talk to the email provider.
pub fn load_app(path: Option<&Path>) -> Result<App, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let AppOnly { app } = serde_yaml::from_str(&content)?;
    validate_app(&app)?;
    Ok(app)
}

fn validate_app(app: &App) -> Result<(), ConfigError> {
    if app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    // Real-world offsets span -12:00..+14:00.
    if !(-720..=840).contains(&app.utc_offset_minutes) {
        return Err(ConfigError::Invalid("app.utc_offset_minutes out of range"));
    }
    Ok(())
}

/// Validate a configuration instance.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    validate_app(&cfg.app)?;
    if cfg.app.listen_addr.parse::<std::net::SocketAddr>().is_err() {
        return Err(ConfigError::Invalid("app.listen_addr must be a socket address"));
    }

    if cfg.email.api_key.trim().is_empty() {
        return Err(ConfigError::Invalid("email.api_key must be non-empty"));
    }
    if reqwest::Url::parse(&cfg.email.base_url).is_err() {
        return Err(ConfigError::Invalid("email.base_url must be a valid URL"));
    }
    if cfg.email.from.trim().is_empty() {
        return Err(ConfigError::Invalid("email.from must be non-empty"));
    }
    if !cfg.email.reply_to.contains('@') {
        return Err(ConfigError::Invalid("email.reply_to must be an email address"));
    }
    if cfg.email.timeout_secs == 0 {
        return Err(ConfigError::Invalid("email.timeout_secs must be > 0"));
    }

    if cfg.dispatch.cooldown_days < 0 {
        return Err(ConfigError::Invalid("dispatch.cooldown_days must be >= 0"));
    }
    if cfg.dispatch.lease_seconds <= 0 {
        return Err(ConfigError::Invalid("dispatch.lease_seconds must be > 0"));
    }

    Ok(())
}

/// Example YAML printed by `outreach-dispatch example-config`.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  listen_addr: "127.0.0.1:8787"
  tick_interval_secs: 0
  utc_offset_minutes: 0

email:
  api_key: "YOUR_RESEND_API_KEY"
  base_url: "https://api.resend.com/"
  from: "Exit School <outreach@example.com>"
  reply_to: "team@example.com"
  timeout_secs: 30

dispatch:
  send_delay_ms: 600
  cooldown_days: 7
  lease_seconds: 300
"#
}
