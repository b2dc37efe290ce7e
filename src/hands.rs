use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::BrowserConfig;
use crate::dom::PageScript;
use crate::error::HostError;

/// Opaque reference to a tab owned by a [`BrowserHost`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TabHandle(String);

impl TabHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

/// Browser capabilities the pipeline depends on.
///
/// `open_tab` returns as soon as navigation has been requested; the page may
/// still be loading.
#[async_trait]
pub trait BrowserHost: Send + Sync {
    async fn open_tab(&self, url: &str) -> Result<TabHandle, HostError>;

    async fn evaluate(&self, tab: &TabHandle, script: &PageScript) -> Result<Value, HostError>;

    async fn close_tab(&self, tab: &TabHandle) -> Result<(), HostError>;
}

/// Chrome over the DevTools protocol. Created once, reused for every command.
pub struct ChromeHost {
    browser: Arc<Browser>,
    tabs: Mutex<HashMap<String, Arc<Tab>>>,
}

impl ChromeHost {
    /// Attach to a running Chrome, or launch one with a persistent profile.
    ///
    /// Blocking; call from `spawn_blocking`.
    pub fn launch(config: &BrowserConfig) -> Result<Self, HostError> {
        tracing::info!(url = %config.debugging_url, "attempting to attach to existing Chrome");
        if let Ok(browser) = Browser::connect(config.debugging_url.clone()) {
            tracing::info!("attached to existing Chrome");
            return Ok(Self::with_browser(browser));
        }

        let profile = match &config.profile_dir {
            Some(dir) => dir.clone(),
            None => default_profile_dir()?,
        };
        std::fs::create_dir_all(&profile).map_err(|e| HostError::Unavailable(e.to_string()))?;
        tracing::info!(
            profile = %profile.display(),
            headless = config.headless,
            "launching Chrome"
        );

        let options = LaunchOptions {
            headless: config.headless,
            user_data_dir: Some(profile),
            args: vec![
                std::ffi::OsStr::new("--no-first-run"),
                std::ffi::OsStr::new("--no-default-browser-check"),
                std::ffi::OsStr::new("--disable-infobars"),
                std::ffi::OsStr::new("--password-store=basic"),
            ],
            idle_browser_timeout: std::time::Duration::from_secs(600),
            ..Default::default()
        };

        let browser = Browser::new(options).map_err(|e| {
            tracing::error!(error = %e, "browser launch failed");
            HostError::Unavailable(e.to_string())
        })?;
        Ok(Self::with_browser(browser))
    }

    fn with_browser(browser: Browser) -> Self {
        Self {
            browser: Arc::new(browser),
            tabs: Mutex::new(HashMap::new()),
        }
    }

    /// Forget tabs that are gone from the browser, e.g. closed by the user.
    fn prune_closed_tabs(&self) {
        let live: HashSet<String> = match self.browser.get_tabs().lock() {
            Ok(tabs) => tabs.iter().map(|t| t.get_target_id().clone()).collect(),
            Err(_) => return,
        };
        let pruned = retain_live(&mut self.tabs.lock(), &live);
        if pruned > 0 {
            tracing::debug!(pruned, "forgot closed tabs");
        }
    }

    fn tab(&self, handle: &TabHandle) -> Result<Arc<Tab>, HostError> {
        self.tabs
            .lock()
            .get(handle.id())
            .cloned()
            .ok_or_else(|| HostError::UnknownTab(handle.id().to_string()))
    }
}

#[async_trait]
impl BrowserHost for ChromeHost {
    async fn open_tab(&self, url: &str) -> Result<TabHandle, HostError> {
        let browser = Arc::clone(&self.browser);
        let target = url.to_string();
        let tab = tokio::task::spawn_blocking(move || -> anyhow::Result<Arc<Tab>> {
            let tab = browser.new_tab()?;
            tab.navigate_to(&target)?;
            if let Err(e) = tab.activate() {
                tracing::debug!(error = %e, "could not bring tab to front");
            }
            Ok(tab)
        })
        .await
        .map_err(|e| HostError::Unavailable(e.to_string()))?
        .map_err(|e| HostError::TabRejected {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let handle = TabHandle::new(tab.get_target_id().clone());
        tracing::debug!(tab = handle.id(), %url, "opened tab");
        self.prune_closed_tabs();
        self.tabs.lock().insert(handle.id().to_string(), tab);
        Ok(handle)
    }

    async fn evaluate(&self, handle: &TabHandle, script: &PageScript) -> Result<Value, HostError> {
        let tab = self.tab(handle)?;
        // Objects only come back by value as strings, so serialise in the page.
        let source = format!("(async () => JSON.stringify(await ({})))()", script.source);
        let script_err = |reason: String| HostError::Script {
            script: script.name.to_string(),
            reason,
        };

        let remote = tokio::task::spawn_blocking(move || tab.evaluate(&source, true))
            .await
            .map_err(|e| HostError::Unavailable(e.to_string()))?
            .map_err(|e| script_err(e.to_string()))?;

        match remote.value {
            Some(Value::String(json)) => {
                serde_json::from_str(&json).map_err(|e| script_err(e.to_string()))
            }
            Some(other) => Ok(other),
            None => Ok(Value::Null),
        }
    }

    async fn close_tab(&self, handle: &TabHandle) -> Result<(), HostError> {
        let tab = self
            .tabs
            .lock()
            .remove(handle.id())
            .ok_or_else(|| HostError::UnknownTab(handle.id().to_string()))?;

        tokio::task::spawn_blocking(move || tab.close(true))
            .await
            .map_err(|e| HostError::Unavailable(e.to_string()))?
            .map_err(|e| HostError::Script {
                script: "close_tab".to_string(),
                reason: e.to_string(),
            })?;
        tracing::debug!(tab = handle.id(), "closed tab");
        Ok(())
    }
}

/// Drop entries whose target id is not in `live`; returns how many were dropped.
fn retain_live<T>(tabs: &mut HashMap<String, T>, live: &HashSet<String>) -> usize {
    let before = tabs.len();
    tabs.retain(|id, _| live.contains(id));
    before - tabs.len()
}

fn default_profile_dir() -> Result<PathBuf, HostError> {
    let base = dirs::data_local_dir()
        .ok_or_else(|| HostError::Unavailable("no local data directory".to_string()))?;
    Ok(base.join("tabpilot").join("chrome-profile"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_tabs_are_forgotten() {
        let mut tabs: HashMap<String, u8> = ["A1", "B2", "C3"]
            .into_iter()
            .map(|id| (id.to_string(), 0))
            .collect();
        let live: HashSet<String> = ["B2".to_string()].into_iter().collect();

        assert_eq!(retain_live(&mut tabs, &live), 2);
        assert_eq!(tabs.len(), 1);
        assert!(tabs.contains_key("B2"));
        assert_eq!(retain_live(&mut tabs, &live), 0);
    }

    #[test]
    fn test_tab_handle_id() {
        assert_eq!(TabHandle::new("A1").id(), "A1");
    }
}
