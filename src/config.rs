//! Bot configuration, persisted as a TOML document.
//!
//! Read once at process start and optionally rewritten at process end.
//! A malformed or missing document is fatal; per-field emptiness is checked
//! by the routines that need the field, so it can be retried/reported there.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

/// Wall-clock format for `start_time` / `pre_login_time`.
const TIME_OF_DAY_FORMAT: &str = "%H:%M";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    pub web_url: String,
    pub account: String,
    pub password: String,

    /// Substring matched against listing row names.
    pub ticket_name: String,
    /// Substring matched against the pop-up item labels.
    pub ticket_item_name: String,

    /// When the booking routine fires, "HH:MM".
    pub start_time: String,
    /// When the login routine fires, "HH:MM". Configure strictly before
    /// `start_time`.
    pub pre_login_time: String,

    /// Seconds between retry attempts.
    #[serde(default)]
    pub delay_sec: u64,
    /// Attempts per routine before giving up.
    #[serde(default = "default_retry_times")]
    pub retry_times: u32,
    #[serde(default = "default_model_path")]
    pub model_path: String,
    #[serde(default = "default_headless")]
    pub headless: bool,
    #[serde(default)]
    pub proxy_server: String,
    /// Address of the WebDriver endpoint driving the browser.
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,
}

fn default_retry_times() -> u32 {
    5
}

fn default_model_path() -> String {
    "./models/captcha.onnx".to_string()
}

fn default_headless() -> bool {
    true
}

fn default_webdriver_url() -> String {
    "http://localhost:9515".to_string()
}

impl BotConfig {
    pub fn pre_login_at(&self) -> Result<NaiveTime> {
        parse_time_of_day(&self.pre_login_time).context("invalid pre_login_time")
    }

    pub fn start_at(&self) -> Result<NaiveTime> {
        parse_time_of_day(&self.start_time).context("invalid start_time")
    }
}

fn parse_time_of_day(value: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(value, TIME_OF_DAY_FORMAT)
        .with_context(|| format!("expected HH:MM, got {:?}", value))
}

/// Reads the config document. Any failure here is fatal to the run.
pub fn read_from_toml_file(path: &Path) -> Result<BotConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let config: BotConfig = toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file {}", path.display()))?;
    Ok(config)
}

/// Rewrites the config document, preserving whatever the run changed.
pub fn write_to_toml_file(path: &Path, config: &BotConfig) -> Result<()> {
    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    fs::write(path, contents)
        .with_context(|| format!("failed to write config file {}", path.display()))?;
    Ok(())
}

/// Resolves the config file path: CLI argument, then the `CONFIG_PATH`
/// environment variable, then `config.toml` in the working directory.
pub fn config_file_path() -> PathBuf {
    if let Some(arg) = std::env::args().nth(1) {
        log::info!("Config file path from argument: {}", arg);
        return PathBuf::from(arg);
    }
    if let Ok(env_path) = std::env::var("CONFIG_PATH") {
        log::info!("Config file path from environment variable: {}", env_path);
        return PathBuf::from(env_path);
    }
    log::info!("Config file path from default value: config.toml");
    PathBuf::from("config.toml")
}
