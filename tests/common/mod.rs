#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tabpilot::{
    ActionExecutor, AutomationConfig, BackendError, BrowserHost, CommandProcessor, HostError,
    LanguageModel, PageAutomation, PageScript, TabHandle,
};

/// How the fake page behaves.
#[derive(Debug, Clone)]
pub struct PageModel {
    pub ready: bool,
    /// Match counts per selector; anything unlisted matches nothing.
    pub matches: HashMap<String, i64>,
    pub clickable: bool,
    /// Whether clicking the result leaves the results page.
    pub click_navigates: bool,
    /// A muted preview player that is already on the results page.
    pub inline_preview: bool,
    pub autoplay: bool,
    pub play_button_works: bool,
    /// Never leaves the blank page the tab was created with.
    pub stuck_on_blank: bool,
}

pub const RESULTS_URL: &str = "https://www.youtube.com/results?search_query=despacito";
pub const WATCH_URL: &str = "https://www.youtube.com/watch?v=kJQP7kiw5Fk";

impl Default for PageModel {
    fn default() -> Self {
        let mut matches = HashMap::new();
        matches.insert("ytd-video-renderer a#thumbnail".to_string(), 20);
        Self {
            ready: true,
            matches,
            clickable: true,
            click_navigates: true,
            inline_preview: false,
            autoplay: true,
            play_button_works: true,
            stuck_on_blank: false,
        }
    }
}

impl PageModel {
    pub fn without_results() -> Self {
        Self {
            matches: HashMap::new(),
            ..Self::default()
        }
    }

    pub fn with_match(mut self, selector: &str, count: i64) -> Self {
        self.matches.insert(selector.to_string(), count);
        self
    }

    fn count_for(&self, script: &PageScript) -> i64 {
        self.matches
            .iter()
            .find(|(sel, _)| script.source.contains(&Value::from(sel.as_str()).to_string()))
            .map(|(_, count)| *count)
            .unwrap_or(0)
    }
}

#[derive(Default)]
struct PageState {
    navigated: bool,
    playing: bool,
}

/// In-memory [`BrowserHost`] that records what the pipeline asked for.
#[derive(Default)]
pub struct FakeHost {
    pub page: PageModel,
    pub reject_open: bool,
    pub opened: Mutex<Vec<String>>,
    pub closed: Mutex<Vec<String>>,
    pub scripts: Mutex<Vec<&'static str>>,
    state: Mutex<PageState>,
}

impl FakeHost {
    pub fn new(page: PageModel) -> Arc<Self> {
        Arc::new(Self {
            page,
            ..Self::default()
        })
    }

    pub fn rejecting() -> Arc<Self> {
        Arc::new(Self {
            reject_open: true,
            ..Self::default()
        })
    }

    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().clone()
    }

    pub fn ran(&self, name: &str) -> bool {
        self.scripts.lock().iter().any(|s| *s == name)
    }
}

#[async_trait]
impl BrowserHost for FakeHost {
    async fn open_tab(&self, url: &str) -> Result<TabHandle, HostError> {
        if self.reject_open {
            return Err(HostError::TabRejected {
                url: url.to_string(),
                reason: "blocked by policy".to_string(),
            });
        }
        let mut opened = self.opened.lock();
        opened.push(url.to_string());
        Ok(TabHandle::new(format!("tab-{}", opened.len())))
    }

    async fn evaluate(&self, _tab: &TabHandle, script: &PageScript) -> Result<Value, HostError> {
        self.scripts.lock().push(script.name);
        let page = &self.page;
        let mut state = self.state.lock();
        let value = match script.name {
            "page_location" => {
                let href = if page.stuck_on_blank {
                    "about:blank"
                } else if state.navigated {
                    WATCH_URL
                } else {
                    RESULTS_URL
                };
                json!({ "href": href, "ready": page.ready })
            }
            "count_matches" => json!(page.count_for(script)),
            "page_markup" => json!("<html><body><div id=\"results\"></div></body></html>"),
            "element_center" if page.clickable => json!({ "x": 120.0, "y": 240.0 }),
            "element_center" => Value::Null,
            "click_at" => {
                if page.click_navigates {
                    state.navigated = true;
                }
                json!(true)
            }
            "media_state" if state.navigated => {
                if page.autoplay {
                    state.playing = true;
                }
                json!({ "present": true, "paused": !state.playing })
            }
            "media_state" => json!({
                "present": page.inline_preview,
                "paused": !page.inline_preview,
            }),
            "press_play" => {
                if page.play_button_works {
                    state.playing = true;
                }
                json!(true)
            }
            "click_selector" | "type_into" | "hover" => json!(page.count_for(script) > 0),
            "render_cursor" | "show_banner" | "scroll_to" => json!(true),
            other => {
                return Err(HostError::Script {
                    script: other.to_string(),
                    reason: "not supported by the fake".to_string(),
                });
            }
        };
        Ok(value)
    }

    async fn close_tab(&self, tab: &TabHandle) -> Result<(), HostError> {
        self.closed.lock().push(tab.id().to_string());
        Ok(())
    }
}

/// Host whose tabs open but never answer a script.
pub struct UnresponsiveHost;

#[async_trait]
impl BrowserHost for UnresponsiveHost {
    async fn open_tab(&self, _url: &str) -> Result<TabHandle, HostError> {
        Ok(TabHandle::new("tab-1"))
    }

    async fn evaluate(&self, _tab: &TabHandle, _script: &PageScript) -> Result<Value, HostError> {
        std::future::pending().await
    }

    async fn close_tab(&self, _tab: &TabHandle) -> Result<(), HostError> {
        Ok(())
    }
}

/// Model that answers from a queue and records every prompt.
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<Result<String, BackendError>>>,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn new<I>(replies: I) -> Self
    where
        I: IntoIterator<Item = Result<String, BackendError>>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn replying(texts: &[&str]) -> Self {
        Self::new(texts.iter().map(|t| Ok(t.to_string())))
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().len()
    }
}

#[async_trait]
impl LanguageModel for ScriptedBackend {
    fn id(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, prompt: &str) -> Result<String, BackendError> {
        self.prompts.lock().push(prompt.to_string());
        self.replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(BackendError::InvalidResponse("no scripted reply left".into())))
    }
}

pub fn processor(host: Arc<FakeHost>, config: AutomationConfig) -> CommandProcessor {
    let host: Arc<dyn BrowserHost> = host;
    let automation = PageAutomation::new(Arc::clone(&host), config);
    CommandProcessor::new(ActionExecutor::new(host, automation))
}

pub fn automation(host: Arc<FakeHost>, config: AutomationConfig) -> PageAutomation {
    PageAutomation::new(host, config)
}
