//! Runtime configuration.
//!
//! Layering, lowest first: built-in defaults, an optional TOML file, then
//! environment variables (after `.env` has been loaded by the binary).

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::brain::BackendKind;
use crate::error::ConfigError;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: BackendKind,
    /// Extra parse attempts after a transient backend failure.
    pub parse_retries: u32,
    pub perplexity: ProviderConfig,
    pub gemini: ProviderConfig,
    pub browser: BrowserConfig,
    pub automation: AutomationConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    pub api_url: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// An already running Chrome to attach to before launching our own.
    pub debugging_url: String,
    pub headless: bool,
    pub profile_dir: Option<PathBuf>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            debugging_url: "http://127.0.0.1:9222".to_string(),
            headless: false,
            profile_dir: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AutomationConfig {
    pub ready_timeout_ms: u64,
    pub locate_timeout_ms: u64,
    pub playback_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub cursor_settle_ms: u64,
    pub banner_duration_ms: u64,
    pub result_selector: String,
    pub play_control_selector: String,
    /// Substring of the URL of the page the first result leads to.
    pub video_page_marker: String,
    pub target_purpose: String,
    pub ai_selector_fallback: bool,
    pub markup_max_chars: usize,
    pub close_tab_on_failure: bool,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            ready_timeout_ms: 10_000,
            locate_timeout_ms: 10_000,
            playback_timeout_ms: 10_000,
            poll_interval_ms: 100,
            cursor_settle_ms: 300,
            banner_duration_ms: 3_000,
            result_selector: "ytd-video-renderer a#thumbnail".to_string(),
            play_control_selector: ".ytp-play-button".to_string(),
            video_page_marker: "/watch".to_string(),
            target_purpose: "first video thumbnail or link".to_string(),
            ai_selector_fallback: true,
            markup_max_chars: crate::types::PAGE_MARKUP_MAX_CHARS,
            close_tab_on_failure: false,
        }
    }
}

impl AutomationConfig {
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    pub fn locate_timeout(&self) -> Duration {
        Duration::from_millis(self.locate_timeout_ms)
    }

    pub fn playback_timeout(&self) -> Duration {
        Duration::from_millis(self.playback_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn cursor_settle(&self) -> Duration {
        Duration::from_millis(self.cursor_settle_ms)
    }
}

impl Config {
    /// Defaults, then `path` if given, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_toml(&std::fs::read_to_string(path)?)?,
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Overlay values from an environment lookup.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(key) = get("PERPLEXITY_API_KEY") {
            self.perplexity.api_key = Some(key);
        }
        if let Some(key) = get("GEMINI_API_KEY") {
            self.gemini.api_key = Some(key);
        }
        if let Some(value) = get("TABPILOT_BACKEND") {
            self.backend = value.parse().map_err(|_| ConfigError::InvalidEnv {
                name: "TABPILOT_BACKEND",
                value,
            })?;
        }
        if let Some(url) = get("TABPILOT_CHROME_URL") {
            self.browser.debugging_url = url;
        }
        Ok(())
    }
}
